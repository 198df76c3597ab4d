//! Flashcard commands: create, list due, review.

use anyhow::Result;
use std::sync::Arc;

use studybuddy_core::scheduler::Scheduler;

use crate::config::Config;
use crate::sqlite_store::SqliteStore;

pub async fn run_card_add(
    config: &Config,
    owner: &str,
    front: &str,
    back: &str,
    source: &str,
) -> Result<()> {
    let store = Arc::new(SqliteStore::connect(config).await?);
    let scheduler = Scheduler::new(store.clone());

    let card_id = scheduler.create_card(owner, front, back, source).await?;
    println!("{}", card_id);

    store.pool().close().await;
    Ok(())
}

pub async fn run_card_due(config: &Config, owner: &str, json: bool) -> Result<()> {
    let store = Arc::new(SqliteStore::connect(config).await?);
    let scheduler = Scheduler::new(store.clone());
    let due = scheduler.get_due(owner).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&due)?);
    } else if due.is_empty() {
        println!("No cards due.");
    } else {
        for card in &due {
            println!("{}  {}  (due {})", card.id, card.front, card.state.due);
        }
    }

    store.pool().close().await;
    Ok(())
}

pub async fn run_card_review(config: &Config, owner: &str, card_id: &str, quality: u8) -> Result<()> {
    let store = Arc::new(SqliteStore::connect(config).await?);
    let scheduler = Scheduler::new(store.clone());

    let outcome = scheduler.review(owner, card_id, quality).await?;
    println!("{}", serde_json::to_string_pretty(&outcome)?);

    store.pool().close().await;
    Ok(())
}
