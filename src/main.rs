//! # docrag CLI
//!
//! The `docrag` binary runs the HTTP server and exposes the ingestion and
//! question-answering pipeline on the command line.
//!
//! ## Usage
//!
//! ```bash
//! docrag --config ./config/docrag.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docrag init` | Create the SQLite database and run schema migrations |
//! | `docrag serve` | Start the HTTP server |
//! | `docrag ingest <path>` | Upload a local file, index it, and record it in a session |
//! | `docrag index <key>` | Re-index a document already in the document store |
//! | `docrag ask "<query>"` | Answer a question from the indexed documents |
//! | `docrag session <id>` | Show a session's files and expiry |
//! | `docrag completions <shell>` | Print shell completions |
//!
//! In-memory backends only live as long as one process, so `ingest`,
//! `index`, and `ask` are most useful with the `sqlite` index and
//! `filesystem` or `s3` storage.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use docrag::config;
use docrag::logging;
use docrag::migrate;
use docrag::server;
use docrag::services::Services;

#[derive(Parser)]
#[command(
    name = "docrag",
    about = "docrag: upload documents and ask questions about them",
    version,
    long_about = "docrag chunks uploaded documents, embeds the chunks into a vector index, \
    and answers questions with a completion model grounded on the most relevant chunks. \
    It runs as an HTTP server or from the command line."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/docrag.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Idempotent: running it multiple times is safe.
    Init,

    /// Start the HTTP server on `server.bind`.
    Serve,

    /// Upload a local file: store it, index it, and record it in a session.
    Ingest {
        /// File to upload.
        path: PathBuf,

        /// Document key; defaults to the file name.
        #[arg(long)]
        key: Option<String>,

        /// Existing session to append the document to.
        #[arg(long)]
        session: Option<String>,
    },

    /// Re-index a document that is already in the document store.
    Index {
        /// Document key.
        key: String,
    },

    /// Answer a question using the indexed documents.
    Ask {
        query: String,
    },

    /// Show a session.
    Session {
        id: String,
    },

    /// Generate shell completions.
    Completions {
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::Completions { shell } = cli.command {
        clap_complete::generate(shell, &mut Cli::command(), "docrag", &mut std::io::stdout());
        return Ok(());
    }

    logging::init();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Serve => {
            server::run_server(cfg).await?;
        }
        Commands::Ingest { path, key, session } => {
            let key = match key {
                Some(k) => k,
                None => path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .map(str::to_string)
                    .with_context(|| format!("Cannot derive a key from {}", path.display()))?,
            };
            let bytes = tokio::fs::read(&path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))?;

            let services = Services::from_config(cfg).await?;
            let receipt = services
                .uploads
                .upload(&key, bytes, session.as_deref())
                .await?;
            println!(
                "Ingested {} ({} chunks) into session {}",
                receipt.filename, receipt.chunk_count, receipt.session_id
            );
        }
        Commands::Index { key } => {
            let services = Services::from_config(cfg).await?;
            let result = services.pipeline.ingest_from_store(&key).await?;
            println!(
                "Indexed {}: {} chunks ({} previous entries replaced)",
                result.document_key, result.chunk_count, result.replaced
            );
        }
        Commands::Ask { query } => {
            let services = Services::from_config(cfg).await?;
            let answer = services.queries.answer(&query).await?;
            println!("{}", answer.text.trim());
            if !answer.supporting_chunks.is_empty() {
                println!();
                println!("Sources:");
                for chunk in &answer.supporting_chunks {
                    println!(
                        "  {}#{}  (distance {:.4})",
                        chunk.document_key.as_deref().unwrap_or("?"),
                        chunk
                            .chunk_index
                            .map(|i| i.to_string())
                            .unwrap_or_else(|| "?".to_string()),
                        chunk.distance
                    );
                }
            }
        }
        Commands::Session { id } => {
            let services = Services::from_config(cfg).await?;
            let session = services.uploads.session(&id).await?;
            let expired = session.is_expired(chrono::Utc::now());
            println!("Session:  {}", session.session_id);
            println!("Uploaded: {}", session.uploaded_at.to_rfc3339());
            println!(
                "Expires:  {}{}",
                session.expires_at.to_rfc3339(),
                if expired { " (expired)" } else { "" }
            );
            println!("Files:");
            for file in &session.files {
                println!("  {}", file);
            }
        }
        Commands::Completions { .. } => {}
    }

    Ok(())
}
