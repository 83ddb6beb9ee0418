//! Generative model boundary.
//!
//! The orchestrator talks to a language model through the [`Generator`]
//! trait: it sends a system prompt, the conversation so far as
//! [`ChatTurn`]s, and optionally a tool catalog, and gets back either a
//! final text or a request to call one tool.
//!
//! Providers:
//! - [`AnthropicGenerator`] — Messages API, `tool_use` / `tool_result` blocks.
//! - [`OpenAiGenerator`] — Chat Completions API, `tool_calls` / `tool` messages.
//!
//! Neither provider retries or times out on its own; the orchestrator
//! wraps each call in the configured timeout.

use anyhow::Context;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;

use course_rag_core::{RagError, Result};

use crate::config::GenerationConfig;

const DEFAULT_ANTHROPIC_URL: &str = "https://api.anthropic.com";
const DEFAULT_OPENAI_URL: &str = "https://api.openai.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// A tool as advertised to the model.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema of the tool's arguments.
    pub input_schema: Value,
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    /// Provider-assigned id, echoed back in the matching tool result.
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

/// One entry of the conversation sent to the model.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatTurn {
    User(String),
    Assistant(String),
    /// The model's earlier tool request, replayed verbatim.
    ToolCall { text: Option<String>, call: ToolCall },
    ToolResult {
        call_id: String,
        content: String,
        is_error: bool,
    },
}

#[derive(Debug, Clone, Default)]
pub struct GenerationRequest {
    pub system: String,
    pub turns: Vec<ChatTurn>,
    /// Empty means the model may not call tools.
    pub tools: Vec<ToolDefinition>,
}

/// What the model produced.
#[derive(Debug, Clone, PartialEq)]
pub enum Generation {
    Text(String),
    ToolUse { text: Option<String>, call: ToolCall },
}

#[async_trait]
pub trait Generator: Send + Sync {
    fn name(&self) -> &str;

    /// Run one model call.
    ///
    /// # Errors
    ///
    /// [`RagError::Generation`] when the service is unreachable, answers
    /// with an error status, or returns a body that cannot be parsed.
    async fn generate(&self, request: &GenerationRequest) -> Result<Generation>;
}

/// Build the generator configured in `[generation]`.
///
/// The API key is read from the environment variable named by
/// `api_key_env` (default `ANTHROPIC_API_KEY` or `OPENAI_API_KEY`).
pub fn create_generator(config: &GenerationConfig) -> anyhow::Result<Arc<dyn Generator>> {
    let key_env = config.api_key_env();
    let api_key = std::env::var(key_env)
        .with_context(|| format!("{} environment variable not set", key_env))?;

    match config.provider.as_str() {
        "anthropic" => Ok(Arc::new(AnthropicGenerator::new(config, api_key)?)),
        "openai" => Ok(Arc::new(OpenAiGenerator::new(config, api_key)?)),
        other => anyhow::bail!("Unknown generation provider: {}", other),
    }
}

fn generation_err(provider: &str, e: impl std::fmt::Display) -> RagError {
    RagError::Generation(format!("{}: {}", provider, e))
}

async fn post_json(
    provider: &str,
    request: reqwest::RequestBuilder,
    body: &Value,
) -> Result<Value> {
    let response = request
        .json(body)
        .send()
        .await
        .map_err(|e| generation_err(provider, format!("request failed: {}", e)))?;

    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        return Err(generation_err(
            provider,
            format!("API error {}: {}", status, text),
        ));
    }

    response
        .json()
        .await
        .map_err(|e| generation_err(provider, format!("invalid JSON: {}", e)))
}

fn non_empty(text: String) -> Option<String> {
    (!text.trim().is_empty()).then_some(text)
}

// ============ Anthropic ============

pub struct AnthropicGenerator {
    client: reqwest::Client,
    url: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl AnthropicGenerator {
    pub fn new(config: &GenerationConfig, api_key: String) -> anyhow::Result<Self> {
        Ok(Self {
            client: reqwest::Client::builder().build()?,
            url: config
                .url
                .as_deref()
                .unwrap_or(DEFAULT_ANTHROPIC_URL)
                .trim_end_matches('/')
                .to_string(),
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }

    fn build_body(&self, request: &GenerationRequest) -> Value {
        let messages: Vec<Value> = request
            .turns
            .iter()
            .map(|turn| match turn {
                ChatTurn::User(text) => json!({ "role": "user", "content": text }),
                ChatTurn::Assistant(text) => json!({ "role": "assistant", "content": text }),
                ChatTurn::ToolCall { text, call } => {
                    let mut blocks = Vec::new();
                    if let Some(text) = text {
                        blocks.push(json!({ "type": "text", "text": text }));
                    }
                    blocks.push(json!({
                        "type": "tool_use",
                        "id": call.id,
                        "name": call.name,
                        "input": call.arguments,
                    }));
                    json!({ "role": "assistant", "content": blocks })
                }
                ChatTurn::ToolResult {
                    call_id,
                    content,
                    is_error,
                } => json!({
                    "role": "user",
                    "content": [{
                        "type": "tool_result",
                        "tool_use_id": call_id,
                        "content": content,
                        "is_error": is_error,
                    }]
                }),
            })
            .collect();

        let mut body = json!({
            "model": self.model,
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
            "system": request.system,
            "messages": messages,
        });

        if !request.tools.is_empty() {
            body["tools"] = Value::Array(
                request
                    .tools
                    .iter()
                    .map(|t| {
                        json!({
                            "name": t.name,
                            "description": t.description,
                            "input_schema": t.input_schema,
                        })
                    })
                    .collect(),
            );
            body["tool_choice"] = json!({ "type": "auto" });
        }
        body
    }
}

/// Parse a Messages API response: the first `tool_use` block wins, text
/// blocks are concatenated.
fn parse_anthropic_response(json: &Value) -> Result<Generation> {
    let blocks = json["content"]
        .as_array()
        .ok_or_else(|| generation_err("anthropic", "response has no content array"))?;

    let mut text = String::new();
    let mut call = None;
    for block in blocks {
        match block["type"].as_str() {
            Some("text") => text.push_str(block["text"].as_str().unwrap_or_default()),
            Some("tool_use") if call.is_none() => {
                call = Some(ToolCall {
                    id: block["id"].as_str().unwrap_or_default().to_string(),
                    name: block["name"]
                        .as_str()
                        .ok_or_else(|| generation_err("anthropic", "tool_use block without name"))?
                        .to_string(),
                    arguments: block["input"].clone(),
                });
            }
            _ => {}
        }
    }

    Ok(match call {
        Some(call) => Generation::ToolUse {
            text: non_empty(text),
            call,
        },
        None => Generation::Text(text),
    })
}

#[async_trait]
impl Generator for AnthropicGenerator {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<Generation> {
        let http = self
            .client
            .post(format!("{}/v1/messages", self.url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION);
        let json = post_json("anthropic", http, &self.build_body(request)).await?;
        parse_anthropic_response(&json)
    }
}

// ============ OpenAI ============

pub struct OpenAiGenerator {
    client: reqwest::Client,
    url: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl OpenAiGenerator {
    pub fn new(config: &GenerationConfig, api_key: String) -> anyhow::Result<Self> {
        Ok(Self {
            client: reqwest::Client::builder().build()?,
            url: config
                .url
                .as_deref()
                .unwrap_or(DEFAULT_OPENAI_URL)
                .trim_end_matches('/')
                .to_string(),
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }

    fn build_body(&self, request: &GenerationRequest) -> Value {
        let mut messages = vec![json!({ "role": "system", "content": request.system })];
        for turn in &request.turns {
            messages.push(match turn {
                ChatTurn::User(text) => json!({ "role": "user", "content": text }),
                ChatTurn::Assistant(text) => json!({ "role": "assistant", "content": text }),
                ChatTurn::ToolCall { text, call } => json!({
                    "role": "assistant",
                    "content": text,
                    "tool_calls": [{
                        "id": call.id,
                        "type": "function",
                        "function": {
                            "name": call.name,
                            "arguments": call.arguments.to_string(),
                        }
                    }]
                }),
                ChatTurn::ToolResult {
                    call_id, content, ..
                } => json!({ "role": "tool", "tool_call_id": call_id, "content": content }),
            });
        }

        let mut body = json!({
            "model": self.model,
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
            "messages": messages,
        });

        if !request.tools.is_empty() {
            body["tools"] = Value::Array(
                request
                    .tools
                    .iter()
                    .map(|t| {
                        json!({
                            "type": "function",
                            "function": {
                                "name": t.name,
                                "description": t.description,
                                "parameters": t.input_schema,
                            }
                        })
                    })
                    .collect(),
            );
            body["tool_choice"] = json!("auto");
        }
        body
    }
}

/// Parse a Chat Completions response. Tool arguments arrive as a JSON
/// string; unparseable arguments are passed through as a string value
/// and rejected later by the tool.
fn parse_openai_response(json: &Value) -> Result<Generation> {
    let message = json["choices"]
        .get(0)
        .map(|c| &c["message"])
        .ok_or_else(|| generation_err("openai", "no choices in response"))?;

    let text = message["content"].as_str().unwrap_or_default().to_string();

    if let Some(tc) = message["tool_calls"].as_array().and_then(|a| a.first()) {
        let name = tc["function"]["name"]
            .as_str()
            .ok_or_else(|| generation_err("openai", "tool call without function name"))?;
        let raw = tc["function"]["arguments"].as_str().unwrap_or("{}");
        let arguments =
            serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        return Ok(Generation::ToolUse {
            text: non_empty(text),
            call: ToolCall {
                id: tc["id"].as_str().unwrap_or_default().to_string(),
                name: name.to_string(),
                arguments,
            },
        });
    }

    Ok(Generation::Text(text))
}

#[async_trait]
impl Generator for OpenAiGenerator {
    fn name(&self) -> &str {
        "openai"
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<Generation> {
        let http = self
            .client
            .post(format!("{}/chat/completions", self.url))
            .bearer_auth(&self.api_key);
        let json = post_json("openai", http, &self.build_body(request)).await?;
        parse_openai_response(&json)
    }
}
