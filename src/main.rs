//! # Mnemora CLI (`mnemora`)
//!
//! Command-line front end for the Mnemora client core: check the backend,
//! finish first-run setup, index folders and ask questions.
//!
//! ## Usage
//!
//! ```bash
//! mnemora --config ./config/mnemora.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `mnemora status` | Backend and model runtime health, setup summary |
//! | `mnemora setup` | Setup status; `--pull MODEL` downloads a model |
//! | `mnemora models` | List installed models; `--select NAME` picks one |
//! | `mnemora index <path>` | Index a folder |
//! | `mnemora ask "<query>"` | Ask a question and stream the answer |
//! | `mnemora folders list` | List indexed folders |
//! | `mnemora folders remove <path>` | Remove a folder from the index |
//! | `mnemora watch` | Poll health and print every change |
//!
//! A missing config file is not an error: every setting has a default.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use mnemora::progress::ProgressMode;
use mnemora::{chat, config, indexing, monitor, setup};

/// Mnemora: chat with your own files through a local RAG backend.
#[derive(Parser)]
#[command(
    name = "mnemora",
    about = "Mnemora: chat with your own files through a local RAG backend",
    version,
    long_about = "Mnemora talks to a local backend that indexes folders into a vector store \
    and answers questions with a local language model. Answers and indexing progress are \
    streamed as they are produced."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/mnemora.toml`. If the file does not exist the
    /// built-in defaults are used.
    #[arg(long, global = true, default_value = "./config/mnemora.toml")]
    config: PathBuf,

    /// Progress output on stderr. Defaults to `human` on a terminal and
    /// `off` otherwise.
    #[arg(long, global = true, value_enum)]
    progress: Option<ProgressMode>,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Show backend and model runtime health.
    ///
    /// Performs a single health poll, then prints the setup summary when
    /// the backend is reachable. Always exits successfully so it can be
    /// used to probe a backend that is down.
    Status,

    /// Show first-run setup status and download missing models.
    Setup {
        /// Model to download (e.g. `llama3.2:3b`, `nomic-embed-text`).
        #[arg(long)]
        pull: Option<String>,

        /// Keep polling until the backend reports ready.
        #[arg(long)]
        wait: bool,
    },

    /// List installed models.
    Models {
        /// Make this model the one used by `ask`.
        #[arg(long)]
        select: Option<String>,
    },

    /// Index a folder.
    ///
    /// Streams progress while the backend extracts, chunks and embeds the
    /// files. The folder is remembered once indexing completes.
    Index {
        /// Folder to index.
        path: String,
    },

    /// Ask a question about the indexed files.
    Ask {
        /// The question.
        query: String,

        /// Model to answer with. Defaults to the selected model.
        #[arg(long)]
        model: Option<String>,
    },

    /// Manage indexed folders.
    Folders {
        #[command(subcommand)]
        action: FolderAction,
    },

    /// Poll backend health until interrupted, printing every change.
    Watch,
}

/// Folder management subcommands.
#[derive(Subcommand)]
enum FolderAction {
    /// List indexed folders.
    List,
    /// Remove a folder from the backend index and from the list.
    Remove {
        /// Folder path, exactly as listed.
        path: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_or_default(&cli.config)?;
    let progress = cli.progress.unwrap_or_else(ProgressMode::default_for_tty);

    match cli.command {
        Commands::Status => {
            monitor::run_status(&cfg).await?;
        }
        Commands::Setup { pull, wait } => {
            setup::run_setup(&cfg, pull, wait, progress).await?;
        }
        Commands::Models { select } => {
            setup::run_models(&cfg, select).await?;
        }
        Commands::Index { path } => {
            indexing::run_index(&cfg, &path, progress).await?;
        }
        Commands::Ask { query, model } => {
            chat::run_ask(&cfg, &query, model).await?;
        }
        Commands::Folders { action } => match action {
            FolderAction::List => {
                indexing::run_folders_list(&cfg)?;
            }
            FolderAction::Remove { path } => {
                indexing::run_folders_remove(&cfg, &path).await?;
            }
        },
        Commands::Watch => {
            monitor::run_watch(&cfg).await?;
        }
    }

    Ok(())
}
