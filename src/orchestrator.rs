//! Two-phase query protocol.
//!
//! One query walks an explicit state machine:
//!
//! ```text
//! Compose → FirstCall ─┬─ text ────────────────────────────→ Finalize
//!                      └─ tool request → ToolExec → SecondCall → Finalize
//! ```
//!
//! The first call offers the tool catalog; the second call never does, so
//! a query triggers at most one tool execution. Every model call runs
//! under the configured timeout.

use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use course_rag_core::models::SourceRef;
use course_rag_core::{RagError, Result};

use crate::llm::{ChatTurn, Generation, GenerationRequest, Generator, ToolCall};
use crate::tools::{ToolOutput, ToolRegistry};

/// Instructions sent as the system content of every model call.
pub const SYSTEM_PROMPT: &str = "\
You are an assistant that answers questions about course materials. You have two tools.

Tools:
- get_course_outline: use it for questions about a course's structure, its lesson list, \
its link or its instructor. When you answer from it, give the course title, the course \
link and every lesson with its number and title.
- search_course_content: use it for questions about what a course or lesson teaches.

Rules:
- Call at most one tool per question.
- Answer general knowledge questions from your own knowledge without calling a tool.
- If a tool finds nothing, say so plainly.
- Give the answer only. Do not describe your search, mention the tools, or explain your \
reasoning.
- Keep answers brief, accurate and to the point. Include examples when they make the \
answer clearer.";

/// Answer used when the second call produces nothing usable.
pub const FALLBACK_ANSWER: &str = "I searched the course materials but couldn't put together an answer from what I found. Please try rephrasing your question or making it more specific.";

/// Final product of one query.
#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    pub text: String,
    pub sources: Vec<String>,
    pub source_links: Vec<SourceRef>,
}

#[derive(Debug)]
enum Phase {
    Compose,
    FirstCall(GenerationRequest),
    ToolExec {
        request: GenerationRequest,
        text: Option<String>,
        call: ToolCall,
    },
    SecondCall {
        request: GenerationRequest,
        cited: ToolOutput,
    },
    Finalize(Answer),
}

impl Phase {
    fn name(&self) -> &'static str {
        match self {
            Phase::Compose => "compose",
            Phase::FirstCall(_) => "first_call",
            Phase::ToolExec { .. } => "tool_exec",
            Phase::SecondCall { .. } => "second_call",
            Phase::Finalize(_) => "finalize",
        }
    }
}

pub struct Orchestrator {
    generator: Arc<dyn Generator>,
    tools: Arc<ToolRegistry>,
    timeout: Duration,
}

impl Orchestrator {
    pub fn new(generator: Arc<dyn Generator>, tools: Arc<ToolRegistry>, timeout: Duration) -> Self {
        Self {
            generator,
            tools,
            timeout,
        }
    }

    /// Answer `query`, with `history` as rendered session lines.
    ///
    /// # Errors
    ///
    /// [`RagError::Generation`] when a model call fails, times out, or the
    /// first call returns empty text. [`RagError::Embedding`] when the tool
    /// cannot reach the embedding service. Every other tool failure is
    /// reported to the model as an error result instead.
    pub async fn run(&self, query: &str, history: Option<&str>) -> Result<Answer> {
        let mut phase = Phase::Compose;
        loop {
            tracing::debug!(phase = phase.name(), "orchestrator");
            phase = match phase {
                Phase::Compose => Phase::FirstCall(compose(query, history, &self.tools)),

                Phase::FirstCall(request) => match self.call_model(&request).await? {
                    Generation::Text(text) if text.trim().is_empty() => {
                        return Err(RagError::Generation(format!(
                            "{} returned an empty response",
                            self.generator.name()
                        )))
                    }
                    Generation::Text(text) => Phase::Finalize(Answer {
                        text,
                        sources: Vec::new(),
                        source_links: Vec::new(),
                    }),
                    Generation::ToolUse { text, call } => Phase::ToolExec {
                        request,
                        text,
                        call,
                    },
                },

                Phase::ToolExec {
                    mut request,
                    text,
                    call,
                } => {
                    let (mut cited, is_error) =
                        self.execute_tool(&call.name, call.arguments.clone()).await?;
                    let call_id = call.id.clone();
                    request.turns.push(ChatTurn::ToolCall { text, call });
                    request.turns.push(ChatTurn::ToolResult {
                        call_id,
                        content: std::mem::take(&mut cited.content),
                        is_error,
                    });
                    request.tools.clear();
                    Phase::SecondCall { request, cited }
                }

                Phase::SecondCall { request, cited } => {
                    let text = match self.call_model(&request).await? {
                        Generation::Text(text) => text,
                        Generation::ToolUse { text, call } => {
                            tracing::warn!(tool = %call.name, "second call requested a tool; ignoring the request");
                            text.unwrap_or_default()
                        }
                    };
                    let text = if text.trim().is_empty() {
                        FALLBACK_ANSWER.to_string()
                    } else {
                        text
                    };
                    Phase::Finalize(Answer {
                        text,
                        sources: cited.sources,
                        source_links: cited.source_links,
                    })
                }

                Phase::Finalize(answer) => return Ok(answer),
            };
        }
    }

    async fn call_model(&self, request: &GenerationRequest) -> Result<Generation> {
        tokio::time::timeout(self.timeout, self.generator.generate(request))
            .await
            .map_err(|_| {
                RagError::Generation(format!(
                    "{} timed out after {}s",
                    self.generator.name(),
                    self.timeout.as_secs_f32()
                ))
            })?
    }

    /// Run one tool call, turning recoverable failures into an error result.
    async fn execute_tool(&self, name: &str, arguments: Value) -> Result<(ToolOutput, bool)> {
        match self.tools.execute(name, arguments).await {
            Ok(output) => Ok((output, false)),
            Err(e) if e.is_external() => Err(e),
            Err(e) => {
                tracing::warn!(tool = %name, error = %e, "tool failed; continuing with an error result");
                self.tools.reset_sources();
                Ok((
                    ToolOutput::text(format!("Error executing tool {}: {}", name, e)),
                    true,
                ))
            }
        }
    }
}

fn compose(query: &str, history: Option<&str>, tools: &ToolRegistry) -> GenerationRequest {
    let system = match history {
        Some(history) => format!("{}\n\nPrevious conversation:\n{}", SYSTEM_PROMPT, history),
        None => SYSTEM_PROMPT.to_string(),
    };
    GenerationRequest {
        system,
        turns: vec![ChatTurn::User(query.to_string())],
        tools: tools.definitions(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use crate::tools::Tool;

    /// Replays canned generations and records every request.
    struct Scripted {
        replies: Mutex<VecDeque<Result<Generation>>>,
        seen: Mutex<Vec<GenerationRequest>>,
    }

    impl Scripted {
        fn new(replies: Vec<Result<Generation>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn requests(&self) -> Vec<GenerationRequest> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Generator for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn generate(&self, request: &GenerationRequest) -> Result<Generation> {
            self.seen.lock().unwrap().push(request.clone());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(RagError::Generation("script exhausted".into())))
        }
    }

    struct Echo;

    #[async_trait]
    impl Tool for Echo {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echo the query"
        }
        fn input_schema(&self) -> Value {
            json!({ "type": "object", "properties": { "query": { "type": "string" } } })
        }
        async fn execute(&self, arguments: Value) -> Result<ToolOutput> {
            match arguments["query"].as_str() {
                Some("embed-down") => Err(RagError::Embedding("connection refused".into())),
                Some(q) => Ok(ToolOutput::cited(
                    format!("echo: {}", q),
                    [SourceRef {
                        label: "Echo Course - Lesson 1".to_string(),
                        course_link: None,
                        lesson_link: Some("https://example.com/echo/1".to_string()),
                    }],
                )),
                None => Err(RagError::InvalidArguments("query missing".into())),
            }
        }
    }

    fn registry() -> Arc<ToolRegistry> {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(Echo));
        Arc::new(registry)
    }

    fn tool_use(name: &str, arguments: Value) -> Generation {
        Generation::ToolUse {
            text: None,
            call: ToolCall {
                id: "call_1".to_string(),
                name: name.to_string(),
                arguments,
            },
        }
    }

    fn orchestrator(generator: Arc<Scripted>) -> Orchestrator {
        Orchestrator::new(generator, registry(), Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_direct_answer_single_call() {
        let model = Scripted::new(vec![Ok(Generation::Text("Paris.".into()))]);
        let answer = orchestrator(model.clone()).run("Capital of France?", None).await.unwrap();
        assert_eq!(answer.text, "Paris.");
        assert!(answer.sources.is_empty());
        let requests = model.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].tools.len(), 1);
        assert_eq!(requests[0].system, SYSTEM_PROMPT);
    }

    #[tokio::test]
    async fn test_history_goes_into_system_content() {
        let model = Scripted::new(vec![Ok(Generation::Text("ok".into()))]);
        orchestrator(model.clone())
            .run("and then?", Some("User: hi\nAssistant: hello"))
            .await
            .unwrap();
        assert!(model.requests()[0]
            .system
            .ends_with("\n\nPrevious conversation:\nUser: hi\nAssistant: hello"));
    }

    #[tokio::test]
    async fn test_tool_round_trip() {
        let model = Scripted::new(vec![
            Ok(tool_use("echo", json!({ "query": "defects" }))),
            Ok(Generation::Text("Testing reduces defects.".into())),
        ]);
        let answer = orchestrator(model.clone()).run("q", None).await.unwrap();
        assert_eq!(answer.text, "Testing reduces defects.");
        assert_eq!(answer.sources, vec!["Echo Course - Lesson 1"]);
        assert_eq!(
            answer.source_links[0].lesson_link.as_deref(),
            Some("https://example.com/echo/1")
        );

        let second = &model.requests()[1];
        assert!(second.tools.is_empty());
        assert_eq!(second.turns.len(), 3);
        assert_eq!(
            second.turns[2],
            ChatTurn::ToolResult {
                call_id: "call_1".into(),
                content: "echo: defects".into(),
                is_error: false,
            }
        );
    }

    #[tokio::test]
    async fn test_unknown_tool_degrades() {
        let model = Scripted::new(vec![
            Ok(tool_use("nope", json!({}))),
            Ok(Generation::Text("Sorry, I could not search.".into())),
        ]);
        let answer = orchestrator(model.clone()).run("q", None).await.unwrap();
        assert_eq!(answer.text, "Sorry, I could not search.");
        assert!(answer.sources.is_empty());
        match &model.requests()[1].turns[2] {
            ChatTurn::ToolResult { content, is_error, .. } => {
                assert!(*is_error);
                assert_eq!(content, "Error executing tool nope: Tool 'nope' not found");
            }
            other => panic!("unexpected turn: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_bad_arguments_degrade() {
        let model = Scripted::new(vec![
            Ok(tool_use("echo", json!({}))),
            Ok(Generation::Text("answer".into())),
        ]);
        let answer = orchestrator(model.clone()).run("q", None).await.unwrap();
        assert_eq!(answer.text, "answer");
        assert_eq!(model.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_embedding_failure_in_tool_is_fatal() {
        let model = Scripted::new(vec![Ok(tool_use("echo", json!({ "query": "embed-down" })))]);
        let err = orchestrator(model.clone()).run("q", None).await.unwrap_err();
        assert!(matches!(err, RagError::Embedding(_)));
        assert_eq!(model.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_second_call_tool_request_uses_text_or_fallback() {
        let model = Scripted::new(vec![
            Ok(tool_use("echo", json!({ "query": "a" }))),
            Ok(Generation::ToolUse {
                text: Some("Partial answer.".into()),
                call: ToolCall {
                    id: "call_2".into(),
                    name: "echo".into(),
                    arguments: json!({ "query": "b" }),
                },
            }),
        ]);
        let answer = orchestrator(model).run("q", None).await.unwrap();
        assert_eq!(answer.text, "Partial answer.");

        let model = Scripted::new(vec![
            Ok(tool_use("echo", json!({ "query": "a" }))),
            Ok(tool_use("echo", json!({ "query": "b" }))),
        ]);
        let answer = orchestrator(model).run("q", None).await.unwrap();
        assert_eq!(answer.text, FALLBACK_ANSWER);
    }

    #[tokio::test]
    async fn test_empty_second_text_falls_back() {
        let model = Scripted::new(vec![
            Ok(tool_use("echo", json!({ "query": "a" }))),
            Ok(Generation::Text("  ".into())),
        ]);
        let answer = orchestrator(model).run("q", None).await.unwrap();
        assert_eq!(answer.text, FALLBACK_ANSWER);
        // One tool round ran; the answer must not ask for more or mention tools.
        assert!(!FALLBACK_ANSWER.to_lowercase().contains("tool"));
        assert!(!FALLBACK_ANSWER.contains("smaller parts"));
        assert_eq!(answer.sources, vec!["Echo Course - Lesson 1"]);
    }

    #[tokio::test]
    async fn test_empty_first_text_is_an_error() {
        let model = Scripted::new(vec![Ok(Generation::Text(String::new()))]);
        let err = orchestrator(model).run("q", None).await.unwrap_err();
        assert!(matches!(err, RagError::Generation(_)));
    }

    #[tokio::test]
    async fn test_generation_failure_propagates() {
        let model = Scripted::new(vec![Err(RagError::Generation("503".into()))]);
        let err = orchestrator(model).run("q", None).await.unwrap_err();
        assert!(matches!(err, RagError::Generation(_)));
    }

    struct Slow;

    #[async_trait]
    impl Generator for Slow {
        fn name(&self) -> &str {
            "slow"
        }
        async fn generate(&self, _request: &GenerationRequest) -> Result<Generation> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(Generation::Text("late".into()))
        }
    }

    #[tokio::test]
    async fn test_timeout_is_a_generation_error() {
        let orch = Orchestrator::new(Arc::new(Slow), registry(), Duration::from_millis(20));
        let err = orch.run("q", None).await.unwrap_err();
        assert!(matches!(err, RagError::Generation(ref m) if m.contains("timed out")));
    }
}
