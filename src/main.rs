//! # StudyBuddy CLI (`sb`)
//!
//! ## Usage
//!
//! ```bash
//! sb --config ./config/sb.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `sb init` | Create the SQLite database and run schema migrations |
//! | `sb index <path> --owner <u>` | Extract, chunk, embed, and store a file |
//! | `sb documents --owner <u>` | List a user's documents |
//! | `sb delete <doc> --owner <u>` | Delete a document with its chunks and vectors |
//! | `sb retrieve "<query>"` | Rank stored chunks against a query |
//! | `sb card add/due/review` | Manage spaced-repetition flashcards |
//!
//! Logs go to stderr; set `RUST_LOG` to change verbosity.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use studybuddy::{config, ingest, migrate, review, search};

/// StudyBuddy CLI: index study material, retrieve grounding context, and
/// review flashcards.
#[derive(Parser)]
#[command(
    name = "sb",
    about = "StudyBuddy: study-material retrieval and spaced-repetition review",
    version
)]
struct Cli {
    /// Path to configuration file (TOML). See `config/sb.example.toml`.
    /// Built-in defaults are used when the file does not exist.
    #[arg(long, global = true, default_value = "./config/sb.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Index a text or PDF file for retrieval.
    Index {
        /// File to index (`.pdf` or UTF-8 text).
        path: PathBuf,

        /// Uploading user.
        #[arg(long)]
        owner: String,

        /// Document id. Re-using an id replaces that document's chunks.
        #[arg(long)]
        id: Option<String>,

        /// Type tag, e.g. `notes` or `textbook`.
        #[arg(long)]
        kind: Option<String>,
    },

    /// List documents uploaded by a user.
    Documents {
        #[arg(long)]
        owner: String,

        #[arg(long)]
        json: bool,
    },

    /// Delete a document together with its chunks and vectors.
    Delete {
        document_id: String,

        #[arg(long)]
        owner: String,
    },

    /// Retrieve the chunks most relevant to a query.
    Retrieve {
        query: String,

        /// Restrict to this user's documents.
        #[arg(long)]
        owner: Option<String>,

        /// Restrict to one document (requires --owner).
        #[arg(long, requires = "owner")]
        document: Option<String>,

        /// Number of chunks to return. Defaults to `[retrieval] top_k`.
        #[arg(long)]
        k: Option<usize>,

        /// Print results, citations, and rendered context as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Manage spaced-repetition flashcards.
    Card {
        #[command(subcommand)]
        action: CardAction,
    },
}

#[derive(Subcommand)]
enum CardAction {
    /// Create a card that is due today. Prints the card id.
    Add {
        #[arg(long)]
        owner: String,

        #[arg(long)]
        front: String,

        #[arg(long)]
        back: String,

        /// Where the card came from, e.g. a quiz id.
        #[arg(long, default_value = "")]
        source: String,
    },

    /// List cards due today or earlier.
    Due {
        #[arg(long)]
        owner: String,

        #[arg(long)]
        json: bool,
    },

    /// Record a review with quality 0 (blackout) to 5 (perfect recall).
    Review {
        card_id: String,

        #[arg(long)]
        owner: String,

        #[arg(long, value_parser = clap::value_parser!(u8).range(0..=5))]
        quality: u8,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("studybuddy=info,studybuddy_core=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = if cli.config.exists() {
        config::load_config(&cli.config)?
    } else {
        info!(config = %cli.config.display(), "config file not found, using defaults");
        config::Config::minimal()
    };

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Index {
            path,
            owner,
            id,
            kind,
        } => {
            ingest::run_index(&cfg, &path, &owner, id, kind).await?;
        }
        Commands::Documents { owner, json } => {
            ingest::run_documents(&cfg, &owner, json).await?;
        }
        Commands::Delete { document_id, owner } => {
            ingest::run_delete(&cfg, &owner, &document_id).await?;
        }
        Commands::Retrieve {
            query,
            owner,
            document,
            k,
            json,
        } => {
            search::run_retrieve(
                &cfg,
                &query,
                owner.as_deref(),
                document.as_deref(),
                k,
                json,
            )
            .await?;
        }
        Commands::Card { action } => match action {
            CardAction::Add {
                owner,
                front,
                back,
                source,
            } => {
                review::run_card_add(&cfg, &owner, &front, &back, &source).await?;
            }
            CardAction::Due { owner, json } => {
                review::run_card_due(&cfg, &owner, json).await?;
            }
            CardAction::Review {
                card_id,
                owner,
                quality,
            } => {
                review::run_card_review(&cfg, &owner, &card_id, quality).await?;
            }
        },
    }

    Ok(())
}
