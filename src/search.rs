//! `sb retrieve`: ranked chunks for a query.
//!
//! Runs the core [`RetrievalEngine`] over the SQLite store. Without
//! `--document` the search covers the owner's material (or everything when
//! no owner is given) and never fails; it degrades to keyword matching when
//! the vector path cannot answer. With `--document` the owner must own the
//! document.

use anyhow::{bail, Result};
use serde::Serialize;
use std::sync::Arc;

use studybuddy_core::retrieval::{
    citations, format_context, Citation, RetrievalEngine, RetrievedChunk,
};

use crate::config::Config;
use crate::embedding;
use crate::sqlite_store::SqliteStore;

/// Characters of each chunk included in the rendered context.
const CONTEXT_CHARS_PER_SOURCE: usize = 500;

/// JSON shape printed by `sb retrieve --json`.
#[derive(Debug, Serialize)]
pub struct RetrieveResponse {
    pub query: String,
    pub results: Vec<RetrievedChunk>,
    pub citations: Vec<Citation>,
    pub context: String,
}

pub async fn retrieve(
    config: &Config,
    query: &str,
    owner: Option<&str>,
    document: Option<&str>,
    k: usize,
) -> Result<Vec<RetrievedChunk>> {
    let store = Arc::new(SqliteStore::connect(config).await?);
    let embedder = embedding::create_provider(&config.embedding)?;
    let engine = RetrievalEngine::new(embedder, store.clone());

    let results = match (document, owner) {
        (Some(doc), Some(owner)) => engine.retrieve_in_document(owner, doc, query, k).await?,
        (Some(_), None) => bail!("--document requires --owner"),
        (None, owner) => engine.retrieve_top_k(query, owner, k).await,
    };

    store.pool().close().await;
    Ok(results)
}

pub async fn run_retrieve(
    config: &Config,
    query: &str,
    owner: Option<&str>,
    document: Option<&str>,
    k: Option<usize>,
    json: bool,
) -> Result<()> {
    let k = k.unwrap_or(config.retrieval.top_k);
    let results = retrieve(config, query, owner, document, k).await?;

    if json {
        let response = RetrieveResponse {
            query: query.to_string(),
            citations: citations(&results),
            context: format_context(&results, CONTEXT_CHARS_PER_SOURCE),
            results,
        };
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, r) in results.iter().enumerate() {
        println!(
            "{}. [{:.3}] {}#{} ({:?})",
            i + 1,
            r.score,
            r.document_id,
            r.chunk_id,
            r.path
        );
        let snippet: String = r.text.chars().take(200).collect();
        println!("    {}", snippet.replace('\n', " "));
    }

    Ok(())
}
