//! CLI command runners.
//!
//! Each `run_*` function loads what it needs from the config, does one
//! job and prints a human-readable result to stdout.

use anyhow::{bail, Result};
use std::path::Path;

use crate::config::Config;
use crate::ingest;
use crate::rag::{document_processor, open_vector_store, RagSystem};

/// `courserag ingest <folder> [--clear]`
pub async fn run_ingest(config: &Config, folder: &Path, clear: bool) -> Result<()> {
    let store = open_vector_store(config).await?;
    let processor = document_processor(config);
    let report = ingest::load_folder(&store, &processor, folder, clear).await?;

    println!(
        "Loaded {} course(s), {} chunk(s) from {}",
        report.courses_added,
        report.chunks_added,
        folder.display()
    );
    if !report.failures.is_empty() {
        println!("Skipped {} file(s):", report.failures.len());
        for failure in &report.failures {
            println!("  {}: {}", failure.path.display(), failure.error);
        }
    }
    Ok(())
}

/// `courserag ask "<question>"`
///
/// Sessions live in memory, so every invocation starts a new one.
pub async fn run_ask(config: &Config, question: &str) -> Result<()> {
    if question.trim().is_empty() {
        bail!("question must not be empty");
    }
    let system = RagSystem::from_config(config).await?;
    let answer = system.query(question, None).await?;

    println!("{}", answer.answer);
    if !answer.source_links.is_empty() {
        println!();
        println!("Sources:");
        for source in &answer.source_links {
            match source.lesson_link.as_ref().or(source.course_link.as_ref()) {
                Some(link) => println!("  - {} ({})", source.label, link),
                None => println!("  - {}", source.label),
            }
        }
    }
    Ok(())
}

/// `courserag courses`
pub async fn run_courses(config: &Config) -> Result<()> {
    let store = open_vector_store(config).await?;
    let stats = store.catalog_stats().await?;
    let chunks = store.chunk_count().await?;

    if stats.total_courses == 0 {
        println!("No courses loaded.");
        return Ok(());
    }
    println!("{} course(s), {} chunk(s):", stats.total_courses, chunks);
    for title in &stats.course_titles {
        println!("  {}", title);
    }
    Ok(())
}

/// `courserag outline "<course>"`
pub async fn run_outline(config: &Config, course: &str) -> Result<()> {
    let store = open_vector_store(config).await?;
    let outline = store.course_outline(course).await?;

    println!("{}", outline.title);
    if let Some(instructor) = &outline.instructor {
        println!("  instructor: {}", instructor);
    }
    if let Some(link) = &outline.link {
        println!("  link: {}", link);
    }
    println!();
    for lesson in &outline.lessons {
        match &lesson.link {
            Some(link) => println!("  Lesson {}: {} ({})", lesson.number, lesson.title, link),
            None => println!("  Lesson {}: {}", lesson.number, lesson.title),
        }
    }
    Ok(())
}
