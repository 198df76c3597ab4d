//! `SqliteStore` against a real database file: cascade deletes, dimension
//! pinning, insertion-order tie-breaks, and the card compare-and-swap.

use std::sync::Arc;

use chrono::NaiveDate;
use tempfile::TempDir;

use studybuddy::sqlite_store::SqliteStore;
use studybuddy::{db, migrate};
use studybuddy_core::chunk::Chunker;
use studybuddy_core::embedding::MockProvider;
use studybuddy_core::error::StoreError;
use studybuddy_core::indexer::Indexer;
use studybuddy_core::models::{
    Card, Chunk, ChunkKey, Document, EmbeddingVector, Metadata, ReviewState,
};
use studybuddy_core::retrieval::{RetrievalEngine, RetrievalPath};
use studybuddy_core::scheduler::{FixedClock, Scheduler, MAX_INTERVAL_DAYS};
use studybuddy_core::store::{CardStore, Scope, VectorStore};

async fn open_store(tmp: &TempDir, dims: usize) -> SqliteStore {
    let pool = db::connect_path(&tmp.path().join("sb.sqlite")).await.unwrap();
    migrate::apply(&pool).await.unwrap();
    SqliteStore::open(pool, dims).await.unwrap()
}

fn doc(id: &str, owner: &str) -> Document {
    Document {
        id: id.to_string(),
        owner: owner.to_string(),
        filename: format!("{}.txt", id),
        kind: "notes".to_string(),
        chunk_count: 0,
        indexed: false,
        created_at: 1_700_000_000,
    }
}

fn vector(doc_id: &str, id: u32, values: Vec<f32>) -> EmbeddingVector {
    EmbeddingVector {
        key: ChunkKey::new(doc_id, id),
        values,
        metadata: Metadata::new(),
    }
}

fn card(id: &str, owner: &str, due: NaiveDate) -> Card {
    Card {
        id: id.to_string(),
        owner: owner.to_string(),
        front: "Q".to_string(),
        back: "A".to_string(),
        source: String::new(),
        state: ReviewState::new(due),
        version: 0,
    }
}

fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

#[tokio::test]
async fn test_dimension_pinned_on_first_open() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp, 4).await;
    assert_eq!(store.dims(), 4);
    store.pool().close().await;

    let pool = db::connect_path(&tmp.path().join("sb.sqlite")).await.unwrap();
    let err = SqliteStore::open(pool.clone(), 8).await.err().unwrap();
    assert!(matches!(
        err,
        StoreError::DimensionMismatch {
            expected: 4,
            got: 8
        }
    ));
    assert!(SqliteStore::open(pool, 4).await.is_ok());
}

#[tokio::test]
async fn test_upsert_vector_rejects_wrong_dims_and_unknown_document() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp, 3).await;
    store.upsert_document(&doc("d1", "alice")).await.unwrap();

    assert!(matches!(
        store.upsert_vector(&vector("d1", 0, vec![1.0, 0.0]), "x").await,
        Err(StoreError::DimensionMismatch {
            expected: 3,
            got: 2
        })
    ));
    assert!(matches!(
        store
            .upsert_vector(&vector("ghost", 0, vec![1.0, 0.0, 0.0]), "x")
            .await,
        Err(StoreError::UnknownDocument(_))
    ));
}

#[tokio::test]
async fn test_scan_scopes_and_overwrite_keeps_order() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp, 2).await;
    store.upsert_document(&doc("d1", "alice")).await.unwrap();
    store.upsert_document(&doc("d2", "bob")).await.unwrap();

    store.upsert_vector(&vector("d1", 0, vec![1.0, 0.0]), "first").await.unwrap();
    store.upsert_vector(&vector("d2", 0, vec![0.0, 1.0]), "second").await.unwrap();
    store.upsert_vector(&vector("d1", 1, vec![1.0, 1.0]), "third").await.unwrap();
    store.upsert_vector(&vector("d1", 0, vec![0.5, 0.5]), "first again").await.unwrap();

    let all = store.scan(Scope::All).await.unwrap();
    let texts: Vec<&str> = all.iter().map(|r| r.text.as_str()).collect();
    assert_eq!(texts, vec!["first again", "second", "third"]);
    assert_eq!(all[0].vector, vec![0.5, 0.5]);
    assert!(all.windows(2).all(|w| w[0].seq < w[1].seq));

    assert_eq!(store.scan(Scope::Owner("alice")).await.unwrap().len(), 2);
    assert_eq!(store.count_vectors(Scope::Owner("bob")).await.unwrap(), 1);
    assert_eq!(store.count_vectors(Scope::Document("d1")).await.unwrap(), 2);
    assert_eq!(store.count_vectors(Scope::Owner("carol")).await.unwrap(), 0);
}

#[tokio::test]
async fn test_delete_document_cascades() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp, 2).await;
    store.upsert_document(&doc("d1", "alice")).await.unwrap();
    store.upsert_document(&doc("d2", "alice")).await.unwrap();
    for d in ["d1", "d2"] {
        store
            .upsert_chunk(&Chunk {
                document_id: d.to_string(),
                chunk_id: 0,
                text: "text".to_string(),
                start: 0,
                end: 4,
                metadata: Metadata::new(),
            })
            .await
            .unwrap();
        store.upsert_vector(&vector(d, 0, vec![1.0, 0.0]), "text").await.unwrap();
    }

    assert!(store.delete_document("d1").await.unwrap());
    assert!(!store.delete_document("d1").await.unwrap());
    assert!(store.chunks_for_document("d1").await.unwrap().is_empty());
    assert_eq!(store.chunks_for_document("d2").await.unwrap().len(), 1);
    assert_eq!(store.count_vectors(Scope::All).await.unwrap(), 1);
    assert_eq!(store.list_documents(Some("alice")).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_index_and_retrieve_over_sqlite() {
    let tmp = TempDir::new().unwrap();
    let store = Arc::new(open_store(&tmp, 32).await);
    let provider = Arc::new(MockProvider::new(32));
    let indexer = Indexer::new(Chunker::new(40, 10).unwrap(), provider.clone(), store.clone());

    let text = "The mitochondria is the powerhouse of the cell. \
                ATP synthase makes ATP from ADP. Glycolysis happens in the cytoplasm.";
    let n = indexer.index_document("bio", "alice", text).await.unwrap();
    assert!(n > 1);

    let chunks = store.chunks_for_document("bio").await.unwrap();
    assert_eq!(chunks.len(), n);
    assert_eq!(chunks[1].start, 30);

    let engine = RetrievalEngine::new(provider, store.clone());
    let results = engine
        .retrieve_top_k(&chunks[1].text, Some("alice"), 3)
        .await;
    assert_eq!(results.len(), 3);
    assert_eq!(results[0].chunk_id, 1);
    assert_eq!(results[0].path, RetrievalPath::Vector);
    assert!(results.windows(2).all(|w| w[0].score >= w[1].score));

    assert!(engine.retrieve_top_k("ATP", Some("bob"), 3).await.is_empty());
}

#[tokio::test]
async fn test_cards_due_ordering_and_cas() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp, 2).await;

    for (id, owner, due) in [
        ("c1", "alice", "2026-10-19"),
        ("c2", "alice", "2026-10-10"),
        ("c3", "alice", "2026-11-01"),
        ("c4", "bob", "2026-10-01"),
    ] {
        assert!(store.insert_card(&card(id, owner, date(due))).await.unwrap());
    }

    let due = store.due_cards("alice", date("2026-10-19")).await.unwrap();
    let ids: Vec<&str> = due.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec!["c2", "c1"]);

    let mut next = ReviewState::new(date("2026-10-25"));
    next.repetitions = 1;
    assert!(store.compare_and_swap("c1", 0, &next).await.unwrap());
    assert!(!store.compare_and_swap("c1", 0, &next).await.unwrap());

    let card = store.get_card("c1").await.unwrap().unwrap();
    assert_eq!(card.version, 1);
    assert_eq!(card.state, next);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_reviews_serialize() {
    let tmp = TempDir::new().unwrap();
    let store = Arc::new(open_store(&tmp, 2).await);
    let scheduler = Arc::new(Scheduler::with_clock(
        store.clone(),
        Arc::new(FixedClock(date("2026-10-19"))),
    ));
    let id = scheduler.create_card("alice", "Q", "A", "").await.unwrap();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let scheduler = scheduler.clone();
            let id = id.clone();
            tokio::spawn(async move { scheduler.review("alice", &id, 5).await })
        })
        .collect();
    for h in handles {
        h.await.unwrap().unwrap();
    }

    let card = store.get_card(&id).await.unwrap().unwrap();
    assert_eq!(card.state.repetitions, 4);
    assert_eq!(card.version, 4);
}

#[tokio::test]
async fn test_insert_card_keeps_existing_on_duplicate_id() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp, 2).await;
    let today = date("2026-10-19");

    assert!(store.insert_card(&card("c1", "alice", today)).await.unwrap());
    assert!(!store.insert_card(&card("c1", "bob", today)).await.unwrap());
    assert_eq!(store.get_card("c1").await.unwrap().unwrap().owner, "alice");
}

#[tokio::test]
async fn test_far_future_due_dates_are_not_due() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp, 2).await;
    let today = date("2026-10-19");
    let far = NaiveDate::from_ymd_opt(23239, 5, 19).unwrap();

    assert!(store.insert_card(&card("far", "alice", far)).await.unwrap());
    assert!(store.insert_card(&card("now", "alice", today)).await.unwrap());

    let due = store.due_cards("alice", today).await.unwrap();
    let ids: Vec<&str> = due.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec!["now"]);
    assert_eq!(store.get_card("far").await.unwrap().unwrap().state.due, far);
}

#[tokio::test]
async fn test_long_perfect_streak_stays_scheduled() {
    let tmp = TempDir::new().unwrap();
    let store = Arc::new(open_store(&tmp, 2).await);
    let today = date("2026-10-19");
    let scheduler = Scheduler::with_clock(store.clone(), Arc::new(FixedClock(today)));
    let id = scheduler.create_card("alice", "Q", "A", "").await.unwrap();

    for _ in 0..16 {
        let outcome = scheduler.review("alice", &id, 5).await.unwrap();
        assert!(outcome.interval_days <= MAX_INTERVAL_DAYS);
        assert_eq!(
            outcome.next_due,
            today + chrono::Duration::days(outcome.interval_days as i64)
        );
        assert!(scheduler.get_due("alice").await.unwrap().is_empty());
    }

    let card = store.get_card(&id).await.unwrap().unwrap();
    assert_eq!(card.state.interval, MAX_INTERVAL_DAYS);
    assert_eq!(card.version, 16);
}
