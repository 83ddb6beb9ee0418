//! Tools the language model can call.
//!
//! Every tool implements [`Tool`] and is registered in a [`ToolRegistry`],
//! which hands the catalog to the model and dispatches calls by name.
//!
//! # Built-in tools
//!
//! | Name | Arguments | Result |
//! |------|-----------|--------|
//! | `search_course_content` | `query`, `course_name?`, `lesson_number?` | Ranked chunks, each headed by its source label |
//! | `get_course_outline` | `course_name` | Title, link, instructor and numbered lessons |

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

use course_rag_core::models::{source_label, SourceRef};
use course_rag_core::vector_store::{SearchOutcome, SearchRequest, VectorStore};
use course_rag_core::{RagError, Result};

use crate::llm::ToolDefinition;

/// Result of one tool execution.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolOutput {
    /// Text handed back to the model.
    pub content: String,
    /// Source labels behind `content`, de-duplicated, in first-seen order.
    pub sources: Vec<String>,
    /// Links for each entry of `sources`, in the same order.
    pub source_links: Vec<SourceRef>,
}

impl ToolOutput {
    /// Output with no sources.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }

    /// Output citing `refs`, de-duplicated by label; the first links seen win.
    pub fn cited(content: impl Into<String>, refs: impl IntoIterator<Item = SourceRef>) -> Self {
        let mut source_links: Vec<SourceRef> = Vec::new();
        for r in refs {
            if !source_links.iter().any(|s| s.label == r.label) {
                source_links.push(r);
            }
        }
        Self {
            content: content.into(),
            sources: source_links.iter().map(|s| s.label.clone()).collect(),
            source_links,
        }
    }
}

#[async_trait]
pub trait Tool: Send + Sync {
    /// Identifier the model uses to call the tool.
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON Schema of the arguments object.
    fn input_schema(&self) -> Value;

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            input_schema: self.input_schema(),
        }
    }

    /// Run the tool.
    ///
    /// "Nothing found" outcomes are successful outputs with explanatory
    /// text. Errors are reserved for bad arguments and failing services.
    async fn execute(&self, arguments: Value) -> Result<ToolOutput>;
}

fn decode<T: for<'de> Deserialize<'de>>(tool: &str, arguments: Value) -> Result<T> {
    serde_json::from_value(arguments)
        .map_err(|e| RagError::InvalidArguments(format!("{}: {}", tool, e)))
}

// ============ search_course_content ============

pub struct CourseSearchTool {
    store: Arc<VectorStore>,
}

impl CourseSearchTool {
    pub fn new(store: Arc<VectorStore>) -> Self {
        Self { store }
    }
}

#[derive(Debug, Deserialize)]
struct SearchArgs {
    query: String,
    #[serde(default)]
    course_name: Option<String>,
    #[serde(default)]
    lesson_number: Option<u32>,
}

#[async_trait]
impl Tool for CourseSearchTool {
    fn name(&self) -> &str {
        "search_course_content"
    }

    fn description(&self) -> &str {
        "Search course materials with smart course name matching and lesson filtering"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "What to search for in the course content"
                },
                "course_name": {
                    "type": "string",
                    "description": "Course title (partial matches work, e.g. 'MCP', 'Introduction')"
                },
                "lesson_number": {
                    "type": "integer",
                    "description": "Specific lesson number to search within (e.g. 1, 2, 3)"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, arguments: Value) -> Result<ToolOutput> {
        let args: SearchArgs = decode(self.name(), arguments)?;
        let course_name = args.course_name.filter(|c| !c.trim().is_empty());

        let mut request = SearchRequest::new(args.query);
        request.course_name = course_name.clone();
        request.lesson_number = args.lesson_number;

        let hits = match self.store.search(&request).await? {
            SearchOutcome::Hits(hits) => hits,
            SearchOutcome::CourseNotFound(name) => {
                return Ok(ToolOutput::text(format!("No course found matching '{}'", name)))
            }
        };

        if hits.is_empty() {
            let mut content = "No relevant content found".to_string();
            if let Some(course) = &course_name {
                content.push_str(&format!(" in course '{}'", course));
            }
            if let Some(lesson) = args.lesson_number {
                content.push_str(&format!(" in lesson {}", lesson));
            }
            content.push('.');
            return Ok(ToolOutput::text(content));
        }

        let content = hits
            .iter()
            .map(|h| format!("[{}]\n{}", h.label(), h.content))
            .collect::<Vec<_>>()
            .join("\n\n");
        Ok(ToolOutput::cited(content, hits.iter().map(SourceRef::from)))
    }
}

// ============ get_course_outline ============

pub struct CourseOutlineTool {
    store: Arc<VectorStore>,
}

impl CourseOutlineTool {
    pub fn new(store: Arc<VectorStore>) -> Self {
        Self { store }
    }
}

#[derive(Debug, Deserialize)]
struct OutlineArgs {
    course_name: String,
}

#[async_trait]
impl Tool for CourseOutlineTool {
    fn name(&self) -> &str {
        "get_course_outline"
    }

    fn description(&self) -> &str {
        "Get a course's title, link and complete lesson list"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "course_name": {
                    "type": "string",
                    "description": "Course title (partial matches work)"
                }
            },
            "required": ["course_name"]
        })
    }

    async fn execute(&self, arguments: Value) -> Result<ToolOutput> {
        let args: OutlineArgs = decode(self.name(), arguments)?;

        let outline = match self.store.course_outline(&args.course_name).await {
            Ok(outline) => outline,
            Err(RagError::NotFound(_)) => {
                return Ok(ToolOutput::text(format!(
                    "No course found matching '{}'",
                    args.course_name
                )))
            }
            Err(e) => return Err(e),
        };

        let mut lines = vec![format!("Course: {}", outline.title)];
        if let Some(link) = &outline.link {
            lines.push(format!("Course Link: {}", link));
        }
        if let Some(instructor) = &outline.instructor {
            lines.push(format!("Instructor: {}", instructor));
        }
        lines.push(format!("Lessons ({} total):", outline.lessons.len()));
        for lesson in &outline.lessons {
            lines.push(format!("Lesson {}: {}", lesson.number, lesson.title));
        }

        let source = SourceRef {
            label: source_label(&outline.title, None),
            course_link: outline.link.clone(),
            lesson_link: None,
        };
        Ok(ToolOutput::cited(lines.join("\n"), [source]))
    }
}

// ============ Registry ============

/// Name-keyed tool catalog.
///
/// Also remembers the sources of the most recent execution, for callers
/// that read them after the fact. Concurrent queries should use the
/// sources in the returned [`ToolOutput`] instead.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
    last_sources: Mutex<Vec<String>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with `search_course_content` and `get_course_outline`.
    pub fn with_builtins(store: Arc<VectorStore>) -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(CourseSearchTool::new(store.clone())));
        registry.register(Box::new(CourseOutlineTool::new(store)));
        registry
    }

    /// Register a tool, replacing any tool with the same name.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        self.tools.retain(|t| t.name() != tool.name());
        self.tools.push(tool);
    }

    pub fn find(&self, name: &str) -> Option<&dyn Tool> {
        self.tools
            .iter()
            .find(|t| t.name() == name)
            .map(|t| t.as_ref())
    }

    /// Catalog handed to the model.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.definition()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Dispatch a call by name.
    ///
    /// # Errors
    ///
    /// [`RagError::UnknownTool`] when no tool has that name; otherwise
    /// whatever the tool returns.
    pub async fn execute(&self, name: &str, arguments: Value) -> Result<ToolOutput> {
        let tool = self
            .find(name)
            .ok_or_else(|| RagError::UnknownTool(name.to_string()))?;
        let output = tool.execute(arguments).await?;
        *self.lock_sources() = output.sources.clone();
        Ok(output)
    }

    pub fn last_sources(&self) -> Vec<String> {
        self.lock_sources().clone()
    }

    pub fn reset_sources(&self) {
        self.lock_sources().clear();
    }

    fn lock_sources(&self) -> std::sync::MutexGuard<'_, Vec<String>> {
        self.last_sources.lock().unwrap_or_else(|e| e.into_inner())
    }
}
