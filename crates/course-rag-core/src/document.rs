//! Course document parser.
//!
//! Turns the raw text of one course document into a [`CourseMetadata`]
//! record and an ordered list of [`Chunk`]s. Documents follow a fixed
//! labeled layout:
//!
//! ```text
//! Course Title: Intro to Testing
//! Course Link: https://example.com/testing
//! Course Instructor: Ada Lovelace
//!
//! Lesson 0: Welcome
//! Lesson Link: https://example.com/testing/0
//! Lesson body text...
//!
//! Lesson 1: Why test
//! Testing reduces defects. ...
//! ```
//!
//! Only the title line is mandatory. Text between the header and the
//! first lesson marker becomes a lesson-less preamble.
//!
//! The first chunk of every lesson is prefixed with
//! `"Course <title> Lesson <n> content: "` so the chunk stays attributable
//! when it is shown to a language model out of context.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::chunk::chunk_sentences;
use crate::error::{RagError, Result};
use crate::models::{Chunk, CourseMetadata, LessonMetadata};

static TITLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^course\s+title\s*:\s*(.*)$").expect("valid regex"));
static LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^course\s+link\s*:\s*(.*)$").expect("valid regex"));
static INSTRUCTOR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^course\s+instructor\s*:\s*(.*)$").expect("valid regex"));
static LESSON_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^lesson\s+(\d+)\s*:\s*(.*)$").expect("valid regex"));
static LESSON_LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^lesson\s+link\s*:\s*(.*)$").expect("valid regex"));

/// Output of [`DocumentProcessor::process`].
#[derive(Debug, Clone)]
pub struct ParsedCourse {
    pub metadata: CourseMetadata,
    pub chunks: Vec<Chunk>,
}

/// Parses course documents and chunks their lesson text.
#[derive(Debug, Clone)]
pub struct DocumentProcessor {
    chunk_size: usize,
    chunk_overlap: usize,
}

struct Section<'a> {
    lesson: Option<u32>,
    lines: Vec<&'a str>,
}

impl DocumentProcessor {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size,
            chunk_overlap,
        }
    }

    /// Parse one document.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Parse`] when the document is empty, the first
    /// non-blank line is not a `Course Title:` line, the title is blank,
    /// or a lesson number repeats.
    pub fn process(&self, text: &str) -> Result<ParsedCourse> {
        let lines: Vec<&str> = text.lines().collect();

        let title_idx = lines
            .iter()
            .position(|l| !l.trim().is_empty())
            .ok_or_else(|| RagError::Parse("document is empty".to_string()))?;

        let title = TITLE_RE
            .captures(lines[title_idx].trim())
            .map(|c| c[1].trim().to_string())
            .ok_or_else(|| {
                RagError::Parse(format!(
                    "expected 'Course Title:' on the first line, found '{}'",
                    lines[title_idx].trim()
                ))
            })?;
        if title.is_empty() {
            return Err(RagError::Parse("course title is blank".to_string()));
        }

        let mut metadata = CourseMetadata {
            title,
            instructor: None,
            link: None,
            lessons: Vec::new(),
        };

        let mut idx = title_idx + 1;
        while idx < lines.len() {
            let line = lines[idx].trim();
            if line.is_empty() {
                idx += 1;
            } else if let Some(c) = LINK_RE.captures(line) {
                metadata.link = non_empty(&c[1]);
                idx += 1;
            } else if let Some(c) = INSTRUCTOR_RE.captures(line) {
                metadata.instructor = non_empty(&c[1]);
                idx += 1;
            } else {
                break;
            }
        }

        let mut sections = vec![Section {
            lesson: None,
            lines: Vec::new(),
        }];
        let mut seen = HashSet::new();

        while idx < lines.len() {
            let line = lines[idx];
            idx += 1;

            let Some(caps) = LESSON_RE.captures(line.trim()) else {
                if let Some(section) = sections.last_mut() {
                    section.lines.push(line);
                }
                continue;
            };

            let number: u32 = caps[1]
                .parse()
                .map_err(|_| RagError::Parse(format!("invalid lesson number '{}'", &caps[1])))?;
            if !seen.insert(number) {
                return Err(RagError::Parse(format!(
                    "lesson {} appears more than once",
                    number
                )));
            }

            let mut lesson = LessonMetadata {
                number,
                title: caps[2].trim().to_string(),
                link: None,
            };
            if let Some(c) = lines
                .get(idx)
                .and_then(|next| LESSON_LINK_RE.captures(next.trim()))
            {
                lesson.link = non_empty(&c[1]);
                idx += 1;
            }

            metadata.lessons.push(lesson);
            sections.push(Section {
                lesson: Some(number),
                lines: Vec::new(),
            });
        }

        let mut chunks = Vec::new();
        for section in &sections {
            let body = section.lines.join("\n");
            chunks.extend(self.chunk_section(&metadata.title, section.lesson, &body));
        }

        Ok(ParsedCourse { metadata, chunks })
    }

    /// Context prefix for a lesson's first chunk, at most half a window.
    ///
    /// A title too long for the budget is cut at a char boundary; with no
    /// room for even the fixed words the prefix is dropped.
    fn lesson_prefix(&self, course_title: &str, lesson: u32) -> String {
        let budget = self.chunk_size / 2;
        let fixed = format!("Course  Lesson {} content: ", lesson).len();
        if fixed + course_title.len() <= budget {
            return format!("Course {} Lesson {} content: ", course_title, lesson);
        }
        if fixed >= budget {
            return String::new();
        }
        let mut end = budget - fixed;
        while !course_title.is_char_boundary(end) {
            end -= 1;
        }
        format!(
            "Course {} Lesson {} content: ",
            course_title[..end].trim_end(),
            lesson
        )
    }

    fn chunk_section(&self, course_title: &str, lesson: Option<u32>, body: &str) -> Vec<Chunk> {
        let prefix = lesson
            .map(|n| self.lesson_prefix(course_title, n))
            .unwrap_or_default();

        chunk_sentences(body, self.chunk_size, self.chunk_overlap, prefix.len())
            .into_iter()
            .enumerate()
            .map(|(i, text)| Chunk {
                course_title: course_title.to_string(),
                lesson_number: lesson,
                chunk_index: i as u32,
                content: if i == 0 {
                    format!("{}{}", prefix, text)
                } else {
                    text
                },
            })
            .collect()
    }
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}
