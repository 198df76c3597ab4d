//! Upload commands: index a file, list and delete documents.
//!
//! `sb index` extracts text from the file, registers the document under its
//! owner, and runs the core [`Indexer`] (chunk → embed → store). Re-indexing
//! with the same `--id` replaces the previous chunks.

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;

use studybuddy_core::indexer::{Indexer, DEFAULT_KIND};
use studybuddy_core::store::VectorStore;

use crate::config::Config;
use crate::embedding;
use crate::extract;
use crate::sqlite_store::SqliteStore;

/// Length of generated document ids in hex characters.
const DOCUMENT_ID_LEN: usize = 8;

pub async fn run_index(
    config: &Config,
    path: &Path,
    owner: &str,
    id: Option<String>,
    kind: Option<String>,
) -> Result<()> {
    let text = extract::extract_file(path)
        .with_context(|| format!("Failed to extract text from {}", path.display()))?;

    let store = Arc::new(SqliteStore::connect(config).await?);
    let embedder = embedding::create_provider(&config.embedding)?;
    let indexer = Indexer::new(config.chunking.chunker()?, embedder, store.clone());

    let document_id = id.unwrap_or_else(new_document_id);
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| document_id.clone());
    let kind = kind.unwrap_or_else(|| DEFAULT_KIND.to_string());

    indexer
        .register_document(&document_id, owner, &filename, &kind)
        .await?;
    let chunks = indexer.index_document(&document_id, owner, &text).await?;

    println!("index {}", document_id);
    println!("  filename: {}", filename);
    println!("  owner: {}", owner);
    println!("  chunks indexed: {}", chunks);
    println!("ok");

    store.pool().close().await;
    Ok(())
}

pub async fn run_documents(config: &Config, owner: &str, json: bool) -> Result<()> {
    let store = SqliteStore::connect(config).await?;
    let docs = store.list_documents(Some(owner)).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&docs)?);
    } else if docs.is_empty() {
        println!("No documents.");
    } else {
        for doc in &docs {
            let uploaded = chrono::DateTime::from_timestamp(doc.created_at, 0)
                .map(|dt| dt.format("%Y-%m-%d").to_string())
                .unwrap_or_default();
            println!(
                "{}  {} ({}, {} chunks, {})",
                doc.id,
                doc.filename,
                doc.kind,
                doc.chunk_count,
                if doc.indexed { uploaded } else { "not indexed".to_string() }
            );
        }
    }

    store.pool().close().await;
    Ok(())
}

pub async fn run_delete(config: &Config, owner: &str, document_id: &str) -> Result<()> {
    let store = Arc::new(SqliteStore::connect(config).await?);
    let embedder = embedding::create_provider(&config.embedding)?;
    let indexer = Indexer::new(config.chunking.chunker()?, embedder, store.clone());

    indexer.delete_document(owner, document_id).await?;
    println!("deleted {}", document_id);

    store.pool().close().await;
    Ok(())
}

fn new_document_id() -> String {
    uuid::Uuid::new_v4()
        .simple()
        .to_string()
        .chars()
        .take(DOCUMENT_ID_LEN)
        .collect()
}
