//! Idempotent schema setup for the knowledge base.
//!
//! `documents` holds one row per ingested source; `chunks` holds the
//! searchable windows with their optional embedding BLOBs; `chunks_fts`
//! is the FTS5 index backing degraded-mode keyword search.

use anyhow::Result;
use sqlx::SqlitePool;

pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            id TEXT PRIMARY KEY,
            filename TEXT NOT NULL UNIQUE,
            source_url TEXT UNIQUE,
            file_size INTEGER NOT NULL DEFAULT 0,
            extracted_text TEXT NOT NULL,
            category TEXT NOT NULL DEFAULT 'knowledge-base',
            uploaded_at INTEGER NOT NULL,
            dedup_hash TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunks (
            id TEXT PRIMARY KEY,
            document_id TEXT NOT NULL,
            file_name TEXT NOT NULL,
            chunk_index INTEGER NOT NULL,
            text TEXT NOT NULL,
            uploaded_at INTEGER NOT NULL,
            page_number INTEGER,
            embedding BLOB,
            UNIQUE(document_id, chunk_index),
            FOREIGN KEY (document_id) REFERENCES documents(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // FTS5 CREATE is not idempotent natively, so check first
    let fts_exists: bool = sqlx::query_scalar(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='chunks_fts'",
    )
    .fetch_one(pool)
    .await?;

    if !fts_exists {
        sqlx::query(
            r#"
            CREATE VIRTUAL TABLE chunks_fts USING fts5(
                chunk_id UNINDEXED,
                file_name UNINDEXED,
                text
            )
            "#,
        )
        .execute(pool)
        .await?;
    }

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_document_id ON chunks(document_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_file_name ON chunks(file_name)")
        .execute(pool)
        .await?;

    Ok(())
}
