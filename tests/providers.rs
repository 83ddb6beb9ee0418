//! HTTP provider tests against wiremock stand-ins for the real services.

use course_rag::config::{EmbeddingConfig, GenerationConfig};
use course_rag::embedding::{OllamaEmbedder, OpenAiEmbedder};
use course_rag::llm::{
    AnthropicGenerator, ChatTurn, Generation, GenerationRequest, Generator, OpenAiGenerator,
    ToolDefinition,
};
use course_rag_core::embedding::Embedder;
use course_rag_core::RagError;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn embedding_config(provider: &str, url: &str) -> EmbeddingConfig {
    EmbeddingConfig {
        provider: provider.to_string(),
        model: Some("test-embed".to_string()),
        dims: Some(2),
        url: Some(url.to_string()),
        batch_size: 2,
        ..Default::default()
    }
}

fn generation_config(provider: &str, url: &str) -> GenerationConfig {
    GenerationConfig {
        provider: provider.to_string(),
        model: "test-model".to_string(),
        url: Some(url.to_string()),
        ..Default::default()
    }
}

fn texts(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn question() -> GenerationRequest {
    GenerationRequest {
        system: "be brief".to_string(),
        turns: vec![ChatTurn::User("What reduces defects?".to_string())],
        tools: vec![ToolDefinition {
            name: "search_course_content".to_string(),
            description: "Search".to_string(),
            input_schema: json!({ "type": "object", "properties": {}, "required": [] }),
        }],
    }
}

// ─── Embeddings ─────────────────────────────────────────────────────

#[tokio::test]
async fn test_openai_embedder_batches_and_orders() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({ "input": ["a", "b"] })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [
                { "index": 1, "embedding": [0.0, 1.0] },
                { "index": 0, "embedding": [1.0, 0.0] }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .and(body_partial_json(json!({ "input": ["c"] })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{ "index": 0, "embedding": [0.5, 0.5] }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let embedder =
        OpenAiEmbedder::new(&embedding_config("openai", &server.uri()), "sk-test".into()).unwrap();
    let vectors = embedder.embed(&texts(&["a", "b", "c"])).await.unwrap();
    assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![0.5, 0.5]]);
}

#[tokio::test]
async fn test_openai_embedder_retries_server_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{ "index": 0, "embedding": [1.0, 0.0] }]
        })))
        .mount(&server)
        .await;

    let embedder =
        OpenAiEmbedder::new(&embedding_config("openai", &server.uri()), "sk-test".into()).unwrap();
    let vectors = embedder.embed(&texts(&["a"])).await.unwrap();
    assert_eq!(vectors, vec![vec![1.0, 0.0]]);
}

#[tokio::test]
async fn test_openai_embedder_client_error_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
        .expect(1)
        .mount(&server)
        .await;

    let embedder =
        OpenAiEmbedder::new(&embedding_config("openai", &server.uri()), "sk-bad".into()).unwrap();
    let err = embedder.embed(&texts(&["a"])).await.unwrap_err();
    assert!(matches!(err, RagError::Embedding(ref m) if m.contains("401")));
}

#[tokio::test]
async fn test_ollama_embedder() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .and(body_partial_json(json!({ "model": "test-embed" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "embeddings": [[0.1, 0.2]]
        })))
        .mount(&server)
        .await;

    let embedder = OllamaEmbedder::new(&embedding_config("ollama", &server.uri())).unwrap();
    assert_eq!(embedder.dims(), 2);
    let vectors = embedder.embed(&texts(&["a"])).await.unwrap();
    assert_eq!(vectors, vec![vec![0.1, 0.2]]);
}

#[tokio::test]
async fn test_ollama_embedder_count_mismatch() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "embeddings": [[0.1, 0.2]]
        })))
        .mount(&server)
        .await;

    let embedder = OllamaEmbedder::new(&embedding_config("ollama", &server.uri())).unwrap();
    let err = embedder.embed(&texts(&["a", "b"])).await.unwrap_err();
    assert!(matches!(err, RagError::Embedding(_)));
}

// ─── Generation ─────────────────────────────────────────────────────

#[tokio::test]
async fn test_anthropic_tool_use() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(header("x-api-key", "ak-test"))
        .and(header("anthropic-version", "2023-06-01"))
        .and(body_partial_json(json!({
            "model": "test-model",
            "system": "be brief",
            "tool_choice": { "type": "auto" }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "content": [
                { "type": "text", "text": "Let me look." },
                {
                    "type": "tool_use",
                    "id": "toolu_1",
                    "name": "search_course_content",
                    "input": { "query": "defects" }
                }
            ],
            "stop_reason": "tool_use"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let generator =
        AnthropicGenerator::new(&generation_config("anthropic", &server.uri()), "ak-test".into())
            .unwrap();
    match generator.generate(&question()).await.unwrap() {
        Generation::ToolUse { text, call } => {
            assert_eq!(text.as_deref(), Some("Let me look."));
            assert_eq!(call.id, "toolu_1");
            assert_eq!(call.name, "search_course_content");
            assert_eq!(call.arguments, json!({ "query": "defects" }));
        }
        other => panic!("expected tool use, got {:?}", other),
    }
}

#[tokio::test]
async fn test_anthropic_error_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(529).set_body_string("overloaded"))
        .mount(&server)
        .await;

    let generator =
        AnthropicGenerator::new(&generation_config("anthropic", &server.uri()), "ak".into())
            .unwrap();
    let err = generator.generate(&question()).await.unwrap_err();
    assert!(matches!(err, RagError::Generation(ref m) if m.contains("overloaded")));
}

#[tokio::test]
async fn test_openai_generator_text() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({ "model": "test-model" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{
                "message": { "role": "assistant", "content": "Testing reduces defects." },
                "finish_reason": "stop"
            }]
        })))
        .mount(&server)
        .await;

    let generator =
        OpenAiGenerator::new(&generation_config("openai", &server.uri()), "sk-test".into())
            .unwrap();
    assert_eq!(
        generator.generate(&question()).await.unwrap(),
        Generation::Text("Testing reduces defects.".to_string())
    );
}

#[tokio::test]
async fn test_unreachable_generator() {
    let generator =
        OpenAiGenerator::new(&generation_config("openai", "http://127.0.0.1:9"), "sk".into())
            .unwrap();
    let err = generator.generate(&question()).await.unwrap_err();
    assert!(err.is_external());
}
