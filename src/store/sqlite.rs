//! SQLite-backed [`KnowledgeStore`].
//!
//! The canonical backend: documents and chunks live in ordinary tables,
//! embeddings as little-endian f32 BLOBs on the chunk rows, and the FTS5
//! virtual table `chunks_fts` backs degraded-mode keyword search.
//!
//! Writes that touch multiple rows (replace-on-ingest, bulk delete) run in
//! a single transaction, so callers observe all-or-nothing behavior.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::config::Config;
use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::error::StoreError;
use crate::models::{
    Category, ChunkMetadata, DocumentChunk, KnowledgeDocument, NewChunk, ScoredChunk,
};

use super::{KnowledgeStore, PendingChunk};

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open the knowledge-base database named in `[db]` config, creating
    /// the file and its parent directory on first use. WAL journaling so
    /// searches are not blocked behind an ingest write.
    pub async fn open(config: &Config) -> anyhow::Result<Self> {
        let db_path = &config.db.path;
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.db.max_connections)
            .connect_with(options)
            .await?;

        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn ts_to_datetime(ts: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(ts, 0).unwrap_or_default()
}

/// Quote each whitespace-separated term so user input can never be parsed
/// as FTS5 query syntax (`AND`, `NEAR`, unbalanced quotes).
fn fts_quote(query: &str) -> String {
    query
        .split_whitespace()
        .map(|term| format!("\"{}\"", term.replace('"', "")))
        .collect::<Vec<_>>()
        .join(" ")
}

fn chunk_from_row(row: &sqlx::sqlite::SqliteRow) -> DocumentChunk {
    let embedding: Option<Vec<u8>> = row.get("embedding");
    DocumentChunk {
        id: row.get("id"),
        text: row.get("text"),
        metadata: ChunkMetadata {
            file_name: row.get("file_name"),
            chunk_index: row.get("chunk_index"),
            uploaded_at: ts_to_datetime(row.get("uploaded_at")),
            page_number: row.get("page_number"),
        },
        embedding: embedding.map(|blob| blob_to_vec(&blob)),
    }
}

#[async_trait]
impl KnowledgeStore for SqliteStore {
    async fn store_document(
        &self,
        doc: &KnowledgeDocument,
        chunks: &[NewChunk],
        require_vectors: bool,
    ) -> Result<usize, StoreError> {
        if chunks.is_empty() {
            return Err(StoreError::Validation(
                "cannot store a document with no chunks".into(),
            ));
        }
        if require_vectors {
            if let Some(missing) = chunks.iter().find(|c| c.embedding.is_none()) {
                return Err(StoreError::Validation(format!(
                    "chunk {} of '{}' has no embedding; aborting batch",
                    missing.chunk_index, doc.filename
                )));
            }
        }

        // Unchanged content under the same filename is a duplicate, not a
        // replace. Callers report it as a skip.
        let existing_hash: Option<String> =
            sqlx::query_scalar("SELECT dedup_hash FROM documents WHERE filename = ?")
                .bind(&doc.filename)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| StoreError::from_sqlx(e, "checking existing document"))?;

        if existing_hash.as_deref() == Some(doc.dedup_hash.as_str()) {
            return Err(StoreError::DuplicateKey(format!(
                "'{}' already ingested with identical content",
                doc.filename
            )));
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::from_sqlx(e, "beginning transaction"))?;

        // Replace semantics: clear any prior version of this filename.
        sqlx::query("DELETE FROM chunks_fts WHERE file_name = ?")
            .bind(&doc.filename)
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::from_sqlx(e, "clearing prior index entries"))?;
        sqlx::query("DELETE FROM chunks WHERE file_name = ?")
            .bind(&doc.filename)
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::from_sqlx(e, "clearing prior chunks"))?;
        sqlx::query("DELETE FROM documents WHERE filename = ?")
            .bind(&doc.filename)
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::from_sqlx(e, "clearing prior document"))?;

        // A source_url held by a different document trips the UNIQUE
        // constraint here and rolls the whole batch back.
        sqlx::query(
            r#"
            INSERT INTO documents (id, filename, source_url, file_size, extracted_text, category, uploaded_at, dedup_hash)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&doc.id)
        .bind(&doc.filename)
        .bind(&doc.source_url)
        .bind(doc.file_size)
        .bind(&doc.extracted_text)
        .bind(doc.category.as_str())
        .bind(doc.uploaded_at.timestamp())
        .bind(&doc.dedup_hash)
        .execute(&mut *tx)
        .await
        .map_err(|e| StoreError::from_sqlx(e, &format!("source_url of '{}'", doc.filename)))?;

        for chunk in chunks {
            let chunk_id = Uuid::new_v4().to_string();
            let blob = chunk.embedding.as_deref().map(vec_to_blob);

            sqlx::query(
                r#"
                INSERT INTO chunks (id, document_id, file_name, chunk_index, text, uploaded_at, page_number, embedding)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&chunk_id)
            .bind(&doc.id)
            .bind(&doc.filename)
            .bind(chunk.chunk_index)
            .bind(&chunk.text)
            .bind(doc.uploaded_at.timestamp())
            .bind(chunk.page_number)
            .bind(blob)
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::from_sqlx(e, "inserting chunk"))?;

            sqlx::query("INSERT INTO chunks_fts (chunk_id, file_name, text) VALUES (?, ?, ?)")
                .bind(&chunk_id)
                .bind(&doc.filename)
                .bind(&chunk.text)
                .execute(&mut *tx)
                .await
                .map_err(|e| StoreError::from_sqlx(e, "indexing chunk"))?;
        }

        tx.commit()
            .await
            .map_err(|e| StoreError::from_sqlx(e, "committing document batch"))?;

        Ok(chunks.len())
    }

    async fn list_documents(&self) -> Result<Vec<String>, StoreError> {
        let names: Vec<String> =
            sqlx::query_scalar("SELECT DISTINCT file_name FROM chunks ORDER BY file_name")
                .fetch_all(&self.pool)
                .await
                .map_err(|e| StoreError::from_sqlx(e, "listing documents"))?;
        Ok(names)
    }

    async fn get_document(
        &self,
        file_name: &str,
    ) -> Result<Option<KnowledgeDocument>, StoreError> {
        let row = sqlx::query(
            "SELECT id, filename, source_url, file_size, extracted_text, category, uploaded_at, dedup_hash FROM documents WHERE filename = ?",
        )
        .bind(file_name)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::from_sqlx(e, "fetching document"))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let category: String = row.get("category");
        Ok(Some(KnowledgeDocument {
            id: row.get("id"),
            filename: row.get("filename"),
            source_url: row.get("source_url"),
            file_size: row.get("file_size"),
            extracted_text: row.get("extracted_text"),
            category: category.parse()?,
            uploaded_at: ts_to_datetime(row.get("uploaded_at")),
            dedup_hash: row.get("dedup_hash"),
        }))
    }

    async fn delete_document(&self, file_name: &str) -> Result<u64, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::from_sqlx(e, "beginning transaction"))?;

        sqlx::query("DELETE FROM chunks_fts WHERE file_name = ?")
            .bind(file_name)
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::from_sqlx(e, "deleting index entries"))?;

        let deleted = sqlx::query("DELETE FROM chunks WHERE file_name = ?")
            .bind(file_name)
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::from_sqlx(e, "deleting chunks"))?
            .rows_affected();

        sqlx::query("DELETE FROM documents WHERE filename = ?")
            .bind(file_name)
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::from_sqlx(e, "deleting document"))?;

        tx.commit()
            .await
            .map_err(|e| StoreError::from_sqlx(e, "committing delete"))?;

        Ok(deleted)
    }

    async fn update_category(&self, id: &str, category: Category) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE documents SET category = ? WHERE id = ?")
            .bind(category.as_str())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::from_sqlx(e, "updating category"))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("document id '{}'", id)));
        }
        Ok(())
    }

    async fn keyword_search(
        &self,
        query: &str,
        limit: i64,
    ) -> Result<Vec<ScoredChunk>, StoreError> {
        let match_expr = fts_quote(query);
        if match_expr.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            r#"
            SELECT c.id, c.file_name, c.chunk_index, c.text, c.uploaded_at, c.page_number,
                   c.embedding, f.rank
            FROM chunks_fts f
            JOIN chunks c ON c.id = f.chunk_id
            WHERE chunks_fts MATCH ?
            ORDER BY f.rank
            LIMIT ?
            "#,
        )
        .bind(&match_expr)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::from_sqlx(e, "keyword search"))?;

        let results = rows
            .iter()
            .map(|row| {
                let rank: f64 = row.get("rank");
                ScoredChunk {
                    chunk: chunk_from_row(row),
                    // BM25 rank is lower-is-better; negate so higher = better
                    score: -rank,
                }
            })
            .collect();

        Ok(results)
    }

    async fn vector_search(
        &self,
        query_vec: &[f32],
        limit: i64,
    ) -> Result<Vec<ScoredChunk>, StoreError> {
        // rowid order gives stable insertion-order tie-breaking below.
        let rows = sqlx::query(
            r#"
            SELECT id, file_name, chunk_index, text, uploaded_at, page_number, embedding
            FROM chunks
            WHERE embedding IS NOT NULL
            ORDER BY rowid
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::from_sqlx(e, "vector search"))?;

        let mut candidates: Vec<ScoredChunk> = rows
            .iter()
            .filter_map(|row| {
                let chunk = chunk_from_row(row);
                let vec = chunk.embedding.as_deref()?;
                let score = cosine_similarity(query_vec, vec) as f64;
                if !score.is_finite() {
                    return None;
                }
                Some(ScoredChunk { chunk, score })
            })
            .collect();

        // sort_by is stable: equal scores keep insertion order
        candidates.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        candidates.truncate(limit.max(0) as usize);

        Ok(candidates)
    }

    async fn pending_chunks(
        &self,
        limit: Option<usize>,
    ) -> Result<Vec<PendingChunk>, StoreError> {
        // usize::MAX as i64 would wrap negative; clamp into i64 range.
        let limit_val: i64 = match limit {
            Some(n) => i64::try_from(n).unwrap_or(i64::MAX),
            None => i64::MAX,
        };

        let rows = sqlx::query(
            r#"
            SELECT id, file_name, text
            FROM chunks
            WHERE embedding IS NULL
            ORDER BY file_name, chunk_index
            LIMIT ?
            "#,
        )
        .bind(limit_val)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::from_sqlx(e, "finding pending chunks"))?;

        Ok(rows
            .iter()
            .map(|row| PendingChunk {
                chunk_id: row.get("id"),
                file_name: row.get("file_name"),
                text: row.get("text"),
            })
            .collect())
    }

    async fn set_embedding(&self, chunk_id: &str, vector: &[f32]) -> Result<(), StoreError> {
        let blob = vec_to_blob(vector);
        let result = sqlx::query("UPDATE chunks SET embedding = ? WHERE id = ?")
            .bind(blob)
            .bind(chunk_id)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::from_sqlx(e, "storing embedding"))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("chunk id '{}'", chunk_id)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        ChunkingConfig, Config, DbConfig, EmbeddingConfig, RetrievalConfig, ServerConfig,
    };
    use crate::migrate::run_migrations;
    use tempfile::TempDir;

    #[test]
    fn test_fts_quote_neutralizes_operators() {
        assert_eq!(fts_quote("hello world"), "\"hello\" \"world\"");
        assert_eq!(fts_quote("a AND b"), "\"a\" \"AND\" \"b\"");
        assert_eq!(fts_quote("say \"hi\""), "\"say\" \"hi\"");
        assert_eq!(fts_quote("   "), "");
    }

    async fn open_migrated(dir: &TempDir) -> SqliteStore {
        let config = Config {
            db: DbConfig {
                path: dir.path().join("kb.sqlite"),
                max_connections: 2,
            },
            chunking: ChunkingConfig::default(),
            retrieval: RetrievalConfig::default(),
            embedding: EmbeddingConfig::default(),
            server: ServerConfig::default(),
        };
        let store = SqliteStore::open(&config).await.unwrap();
        run_migrations(store.pool()).await.unwrap();
        store
    }

    fn doc(filename: &str, hash: &str) -> KnowledgeDocument {
        KnowledgeDocument {
            id: Uuid::new_v4().to_string(),
            filename: filename.to_string(),
            source_url: None,
            file_size: 0,
            extracted_text: String::new(),
            category: Category::KnowledgeBase,
            uploaded_at: Utc::now(),
            dedup_hash: hash.to_string(),
        }
    }

    fn chunk(index: i64, text: &str, embedding: Option<Vec<f32>>) -> NewChunk {
        NewChunk {
            text: text.to_string(),
            chunk_index: index,
            page_number: None,
            embedding,
        }
    }

    #[tokio::test]
    async fn test_vector_search_exact_match_first_on_disk() {
        let dir = TempDir::new().unwrap();
        let store = open_migrated(&dir).await;

        let chunks = vec![
            chunk(0, "first", Some(vec![1.0, 0.0, 0.0])),
            chunk(1, "second", Some(vec![0.0, 1.0, 0.0])),
        ];
        store
            .store_document(&doc("a.pdf", "h1"), &chunks, true)
            .await
            .unwrap();

        // Vectors survive the BLOB round trip and the exact match ranks
        // first.
        let hits = store.vector_search(&[0.0, 1.0, 0.0], 10).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].chunk.metadata.chunk_index, 1);
        assert!((hits[0].score - 1.0).abs() < 1e-6);
        assert!(hits[0].score > hits[1].score);
        assert_eq!(hits[0].chunk.embedding.as_deref(), Some(&[0.0, 1.0, 0.0][..]));
    }

    #[tokio::test]
    async fn test_embedding_backfill_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = open_migrated(&dir).await;

        let chunks = vec![chunk(0, "alpha", None), chunk(1, "beta", None)];
        store
            .store_document(&doc("a.pdf", "h1"), &chunks, false)
            .await
            .unwrap();

        let pending = store.pending_chunks(None).await.unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].text, "alpha");

        assert_eq!(store.pending_chunks(Some(1)).await.unwrap().len(), 1);

        store
            .set_embedding(&pending[0].chunk_id, &[1.0, 0.0, 0.0])
            .await
            .unwrap();

        // Only the backfilled chunk is a vector-search candidate now.
        let remaining = store.pending_chunks(None).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].text, "beta");

        let hits = store.vector_search(&[1.0, 0.0, 0.0], 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk.text, "alpha");
        assert!((hits[0].score - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_set_embedding_unknown_chunk() {
        let dir = TempDir::new().unwrap();
        let store = open_migrated(&dir).await;

        let err = store
            .set_embedding("no-such-chunk", &[1.0, 0.0])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }
}
