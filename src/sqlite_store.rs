//! SQLite-backed [`VectorStore`] and [`CardStore`] implementation.
//!
//! Vectors live in the `embeddings` table as little-endian f32 BLOBs; the
//! autoincrement `seq` column is the insertion order used to break score
//! ties. The store dimension is pinned in `store_meta` the first time a
//! store is opened on a database, and every later open must agree.
//! Card due dates are stored as day numbers (`num_days_from_ce`) so the
//! due filter compares integers for any representable year.

use anyhow::Context;
use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use studybuddy_core::embedding::{blob_to_vec, vec_to_blob};
use studybuddy_core::error::StoreError;
use studybuddy_core::models::{
    Card, Chunk, ChunkKey, Document, EmbeddingVector, Metadata, ReviewState, VectorRecord,
};
use studybuddy_core::store::{check_dims, CardStore, Scope, VectorStore};

use crate::config::Config;
use crate::db;

const DIMS_KEY: &str = "dims";

pub struct SqliteStore {
    pool: SqlitePool,
    dims: usize,
}

impl SqliteStore {
    /// Open a store over a migrated database, pinning `dims` on first use.
    pub async fn open(pool: SqlitePool, dims: usize) -> Result<Self, StoreError> {
        let pinned: Option<String> =
            sqlx::query_scalar("SELECT value FROM store_meta WHERE key = ?")
                .bind(DIMS_KEY)
                .fetch_optional(&pool)
                .await
                .map_err(unavailable)?;

        match pinned {
            Some(value) => {
                let stored: usize = value
                    .parse()
                    .map_err(|_| StoreError::Corrupt(format!("store_meta dims = {:?}", value)))?;
                if stored != dims {
                    return Err(StoreError::DimensionMismatch {
                        expected: stored,
                        got: dims,
                    });
                }
            }
            None => {
                sqlx::query("INSERT INTO store_meta (key, value) VALUES (?, ?)")
                    .bind(DIMS_KEY)
                    .bind(dims.to_string())
                    .execute(&pool)
                    .await
                    .map_err(unavailable)?;
            }
        }

        Ok(Self { pool, dims })
    }

    /// Connect to the configured database and open the store on it.
    pub async fn connect(config: &Config) -> anyhow::Result<Self> {
        let pool = db::connect(config).await?;
        Self::open(pool, config.embedding.dims)
            .await
            .with_context(|| {
                format!(
                    "Failed to open store at {} (run `sb init` first)",
                    config.db.path.display()
                )
            })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn document_exists(&self, id: &str) -> Result<bool, StoreError> {
        let found: Option<i64> = sqlx::query_scalar("SELECT 1 FROM documents WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(unavailable)?;
        Ok(found.is_some())
    }
}

fn unavailable(e: sqlx::Error) -> StoreError {
    StoreError::Unavailable(e.to_string())
}

fn column<'r, T>(row: &'r SqliteRow, name: &str) -> Result<T, StoreError>
where
    T: sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    row.try_get(name)
        .map_err(|e| StoreError::Corrupt(format!("column {}: {}", name, e)))
}

fn non_negative(value: i64, name: &str) -> Result<u32, StoreError> {
    u32::try_from(value).map_err(|_| StoreError::Corrupt(format!("{} = {}", name, value)))
}

fn parse_metadata(json: &str) -> Result<Metadata, StoreError> {
    serde_json::from_str(json).map_err(|e| StoreError::Corrupt(format!("metadata_json: {}", e)))
}

fn encode_metadata(metadata: &Metadata) -> Result<String, StoreError> {
    serde_json::to_string(metadata).map_err(|e| StoreError::Corrupt(e.to_string()))
}

fn document_from_row(row: &SqliteRow) -> Result<Document, StoreError> {
    Ok(Document {
        id: column(row, "id")?,
        owner: column(row, "owner")?,
        filename: column(row, "filename")?,
        kind: column(row, "kind")?,
        chunk_count: non_negative(column(row, "chunk_count")?, "chunk_count")?,
        indexed: column::<i64>(row, "indexed")? != 0,
        created_at: column(row, "created_at")?,
    })
}

fn chunk_from_row(row: &SqliteRow) -> Result<Chunk, StoreError> {
    let metadata_json: String = column(row, "metadata_json")?;
    Ok(Chunk {
        document_id: column(row, "document_id")?,
        chunk_id: non_negative(column(row, "chunk_id")?, "chunk_id")?,
        text: column(row, "text")?,
        start: non_negative(column(row, "start_offset")?, "start_offset")? as usize,
        end: non_negative(column(row, "end_offset")?, "end_offset")? as usize,
        metadata: parse_metadata(&metadata_json)?,
    })
}

fn card_from_row(row: &SqliteRow) -> Result<Card, StoreError> {
    let due_day: i32 = column(row, "due_day")?;
    let due = NaiveDate::from_num_days_from_ce_opt(due_day)
        .ok_or_else(|| StoreError::Corrupt(format!("due_day = {}", due_day)))?;
    let version: i64 = column(row, "version")?;

    Ok(Card {
        id: column(row, "card_id")?,
        owner: column(row, "owner")?,
        front: column(row, "front")?,
        back: column(row, "back")?,
        source: column(row, "source")?,
        state: ReviewState {
            easiness: column(row, "easiness")?,
            interval: non_negative(column(row, "interval")?, "interval")?,
            repetitions: non_negative(column(row, "repetitions")?, "repetitions")?,
            due,
        },
        version: version.max(0) as u64,
    })
}

const DOCUMENT_COLUMNS: &str = "id, owner, filename, kind, chunk_count, indexed, created_at";
const CARD_COLUMNS: &str =
    "card_id, owner, front, back, source, easiness, interval, repetitions, due_day, version";

#[async_trait]
impl VectorStore for SqliteStore {
    fn dims(&self) -> usize {
        self.dims
    }

    async fn upsert_document(&self, doc: &Document) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO documents (id, owner, filename, kind, chunk_count, indexed, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                owner = excluded.owner,
                filename = excluded.filename,
                kind = excluded.kind,
                chunk_count = excluded.chunk_count,
                indexed = excluded.indexed
            "#,
        )
        .bind(&doc.id)
        .bind(&doc.owner)
        .bind(&doc.filename)
        .bind(&doc.kind)
        .bind(doc.chunk_count as i64)
        .bind(doc.indexed as i64)
        .bind(doc.created_at)
        .execute(&self.pool)
        .await
        .map_err(unavailable)?;
        Ok(())
    }

    async fn get_document(&self, id: &str) -> Result<Option<Document>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM documents WHERE id = ?",
            DOCUMENT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unavailable)?;

        row.as_ref().map(document_from_row).transpose()
    }

    async fn list_documents(&self, owner: Option<&str>) -> Result<Vec<Document>, StoreError> {
        let rows = match owner {
            Some(owner) => {
                sqlx::query(&format!(
                    "SELECT {} FROM documents WHERE owner = ? ORDER BY created_at ASC, rowid ASC",
                    DOCUMENT_COLUMNS
                ))
                .bind(owner)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {} FROM documents ORDER BY created_at ASC, rowid ASC",
                    DOCUMENT_COLUMNS
                ))
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(unavailable)?;

        rows.iter().map(document_from_row).collect()
    }

    async fn delete_document(&self, id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(unavailable)?;
        Ok(result.rows_affected() > 0)
    }

    async fn clear_chunks(&self, document_id: &str) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(unavailable)?;

        sqlx::query("DELETE FROM embeddings WHERE document_id = ?")
            .bind(document_id)
            .execute(&mut *tx)
            .await
            .map_err(unavailable)?;

        sqlx::query("DELETE FROM chunks WHERE document_id = ?")
            .bind(document_id)
            .execute(&mut *tx)
            .await
            .map_err(unavailable)?;

        tx.commit().await.map_err(unavailable)?;
        Ok(())
    }

    async fn upsert_chunk(&self, chunk: &Chunk) -> Result<(), StoreError> {
        if !self.document_exists(&chunk.document_id).await? {
            return Err(StoreError::UnknownDocument(chunk.document_id.clone()));
        }

        sqlx::query(
            r#"
            INSERT INTO chunks (document_id, chunk_id, text, start_offset, end_offset, metadata_json)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(document_id, chunk_id) DO UPDATE SET
                text = excluded.text,
                start_offset = excluded.start_offset,
                end_offset = excluded.end_offset,
                metadata_json = excluded.metadata_json
            "#,
        )
        .bind(&chunk.document_id)
        .bind(chunk.chunk_id as i64)
        .bind(&chunk.text)
        .bind(chunk.start as i64)
        .bind(chunk.end as i64)
        .bind(encode_metadata(&chunk.metadata)?)
        .execute(&self.pool)
        .await
        .map_err(unavailable)?;
        Ok(())
    }

    async fn chunks_for_document(&self, document_id: &str) -> Result<Vec<Chunk>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT document_id, chunk_id, text, start_offset, end_offset, metadata_json
            FROM chunks
            WHERE document_id = ?
            ORDER BY chunk_id ASC
            "#,
        )
        .bind(document_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unavailable)?;

        rows.iter().map(chunk_from_row).collect()
    }

    async fn upsert_vector(
        &self,
        vector: &EmbeddingVector,
        text: &str,
    ) -> Result<(), StoreError> {
        check_dims(self.dims, &vector.values)?;
        if !self.document_exists(&vector.key.document_id).await? {
            return Err(StoreError::UnknownDocument(vector.key.document_id.clone()));
        }

        sqlx::query(
            r#"
            INSERT INTO embeddings (document_id, chunk_id, vector, text, metadata_json)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(document_id, chunk_id) DO UPDATE SET
                vector = excluded.vector,
                text = excluded.text,
                metadata_json = excluded.metadata_json
            "#,
        )
        .bind(&vector.key.document_id)
        .bind(vector.key.chunk_id as i64)
        .bind(vec_to_blob(&vector.values))
        .bind(text)
        .bind(encode_metadata(&vector.metadata)?)
        .execute(&self.pool)
        .await
        .map_err(unavailable)?;
        Ok(())
    }

    async fn scan(&self, scope: Scope<'_>) -> Result<Vec<VectorRecord>, StoreError> {
        const SELECT: &str = r#"
            SELECT e.seq, e.document_id, e.chunk_id, e.vector, e.text, e.metadata_json
            FROM embeddings e
            JOIN documents d ON d.id = e.document_id
        "#;

        let rows = match scope {
            Scope::All => {
                sqlx::query(&format!("{} ORDER BY e.seq ASC", SELECT))
                    .fetch_all(&self.pool)
                    .await
            }
            Scope::Owner(owner) => {
                sqlx::query(&format!("{} WHERE d.owner = ? ORDER BY e.seq ASC", SELECT))
                    .bind(owner)
                    .fetch_all(&self.pool)
                    .await
            }
            Scope::Document(id) => {
                sqlx::query(&format!("{} WHERE e.document_id = ? ORDER BY e.seq ASC", SELECT))
                    .bind(id)
                    .fetch_all(&self.pool)
                    .await
            }
        }
        .map_err(unavailable)?;

        rows.iter()
            .map(|row| {
                let blob: Vec<u8> = column(row, "vector")?;
                let vector = blob_to_vec(&blob);
                if vector.len() != self.dims {
                    return Err(StoreError::Corrupt(format!(
                        "stored vector has {} dimensions, store holds {}",
                        vector.len(),
                        self.dims
                    )));
                }
                let document_id: String = column(row, "document_id")?;
                let chunk_id = non_negative(column(row, "chunk_id")?, "chunk_id")?;
                let metadata_json: String = column(row, "metadata_json")?;
                let seq: i64 = column(row, "seq")?;
                Ok(VectorRecord {
                    key: ChunkKey::new(document_id, chunk_id),
                    vector,
                    text: column(row, "text")?,
                    metadata: parse_metadata(&metadata_json)?,
                    seq: seq.max(0) as u64,
                })
            })
            .collect()
    }

    async fn count_vectors(&self, scope: Scope<'_>) -> Result<usize, StoreError> {
        let count: i64 = match scope {
            Scope::All => {
                sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM embeddings")
                    .fetch_one(&self.pool)
                    .await
            }
            Scope::Owner(owner) => {
                sqlx::query_scalar::<_, i64>(
                    "SELECT COUNT(*) FROM embeddings e JOIN documents d ON d.id = e.document_id WHERE d.owner = ?",
                )
                .bind(owner)
                .fetch_one(&self.pool)
                .await
            }
            Scope::Document(id) => {
                sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM embeddings WHERE document_id = ?")
                    .bind(id)
                    .fetch_one(&self.pool)
                    .await
            }
        }
        .map_err(unavailable)?;
        Ok(count.max(0) as usize)
    }
}

#[async_trait]
impl CardStore for SqliteStore {
    async fn insert_card(&self, card: &Card) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO sr_cards (card_id, owner, front, back, source, easiness, interval,
                                  repetitions, due_day, version, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(card_id) DO NOTHING
            "#,
        )
        .bind(&card.id)
        .bind(&card.owner)
        .bind(&card.front)
        .bind(&card.back)
        .bind(&card.source)
        .bind(card.state.easiness)
        .bind(card.state.interval as i64)
        .bind(card.state.repetitions as i64)
        .bind(card.state.due.num_days_from_ce())
        .bind(card.version as i64)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await
        .map_err(unavailable)?;
        Ok(result.rows_affected() == 1)
    }

    async fn get_card(&self, id: &str) -> Result<Option<Card>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM sr_cards WHERE card_id = ?",
            CARD_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unavailable)?;

        row.as_ref().map(card_from_row).transpose()
    }

    async fn due_cards(&self, owner: &str, today: NaiveDate) -> Result<Vec<Card>, StoreError> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {} FROM sr_cards
            WHERE owner = ? AND due_day <= ?
            ORDER BY due_day ASC, created_at ASC, rowid ASC
            "#,
            CARD_COLUMNS
        ))
        .bind(owner)
        .bind(today.num_days_from_ce())
        .fetch_all(&self.pool)
        .await
        .map_err(unavailable)?;

        rows.iter().map(card_from_row).collect()
    }

    async fn compare_and_swap(
        &self,
        card_id: &str,
        expected_version: u64,
        state: &ReviewState,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE sr_cards
            SET easiness = ?, interval = ?, repetitions = ?, due_day = ?, version = version + 1
            WHERE card_id = ? AND version = ?
            "#,
        )
        .bind(state.easiness)
        .bind(state.interval as i64)
        .bind(state.repetitions as i64)
        .bind(state.due.num_days_from_ce())
        .bind(card_id)
        .bind(expected_version as i64)
        .execute(&self.pool)
        .await
        .map_err(unavailable)?;
        Ok(result.rows_affected() == 1)
    }
}
