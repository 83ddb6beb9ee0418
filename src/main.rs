//! # Course RAG CLI (`courserag`)
//!
//! Loads course documents into the index, answers questions about them,
//! and serves the HTTP API.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `courserag ingest <folder>` | Load `.txt`/`.md` course documents |
//! | `courserag ask "<question>"` | Answer one question |
//! | `courserag courses` | List loaded courses |
//! | `courserag outline "<course>"` | Show a course's lessons |
//! | `courserag serve` | Start the HTTP server |
//!
//! ## Examples
//!
//! ```bash
//! courserag --config ./config/courserag.toml ingest ./docs --clear
//! courserag ask "What does lesson 2 of the MCP course cover?"
//! courserag outline "mcp"
//! RUST_LOG=course_rag=debug courserag serve
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use course_rag::{commands, config, server};

/// Course RAG — question answering over course materials.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/courserag.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "courserag",
    about = "Course RAG — question answering over course materials",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/courserag.toml")]
    config: PathBuf,

    /// Log at debug level (overridden by RUST_LOG).
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load every course document in a folder.
    ///
    /// Reads `.txt` and `.md` files in sorted order. A file that fails to
    /// parse is reported and skipped; reloading a course replaces it.
    Ingest {
        folder: PathBuf,

        /// Empty both indexes before loading.
        #[arg(long)]
        clear: bool,
    },

    /// Answer one question about the loaded courses.
    ///
    /// Each invocation is a fresh conversation; use the HTTP API for
    /// multi-turn sessions.
    Ask { question: String },

    /// List loaded courses.
    Courses,

    /// Show a course's outline. Partial names work.
    Outline { course: String },

    /// Start the HTTP server.
    Serve,
}

fn init_logging(verbose: bool) {
    let default = if verbose {
        "course_rag=debug"
    } else {
        "course_rag=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Ingest { folder, clear } => {
            commands::run_ingest(&cfg, &folder, clear).await?;
        }
        Commands::Ask { question } => {
            commands::run_ask(&cfg, &question).await?;
        }
        Commands::Courses => {
            commands::run_courses(&cfg).await?;
        }
        Commands::Outline { course } => {
            commands::run_outline(&cfg, &course).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
