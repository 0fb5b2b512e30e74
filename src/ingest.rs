//! Ingestion pipeline orchestration.
//!
//! Validates caller input, chunks the extracted text, embeds the chunks
//! (when a provider is enabled), and persists the batch. Byte extraction
//! from PDFs/HTML happens upstream — callers hand over
//! `(file_name, text, source_url?)`.

use chrono::Utc;
use sha2::{Digest, Sha256};
use tracing::{debug, info};
use uuid::Uuid;

use crate::chunk::chunk_text;
use crate::config::Config;
use crate::embedding;
use crate::error::StoreError;
use crate::models::{Category, KnowledgeDocument, NewChunk};
use crate::store::KnowledgeStore;

/// What ingestion did with a document.
#[derive(Debug, Clone, Copy)]
pub struct IngestOutcome {
    pub chunks_created: usize,
    /// True when the document was already present with identical content
    /// (or its source URL was already claimed) and nothing was written.
    pub skipped_duplicate: bool,
}

/// Run the full ingest flow for one document: validate → chunk → embed →
/// store.
///
/// With an enabled provider, an embedding failure aborts the whole
/// document — no chunk is ever stored without its vector. With the
/// provider disabled, chunks are stored vector-less and will be served by
/// keyword search only (degraded mode). Duplicate content is reported as
/// a skip, not an error.
pub async fn ingest_document(
    store: &dyn KnowledgeStore,
    config: &Config,
    file_name: &str,
    text: &str,
    source_url: Option<&str>,
    category: Category,
) -> Result<IngestOutcome, StoreError> {
    if file_name.trim().is_empty() {
        return Err(StoreError::Validation("fileName is required".into()));
    }
    if text.trim().is_empty() {
        return Err(StoreError::Validation("text is required".into()));
    }

    let pieces = chunk_text(text, config.chunking.chunk_size, config.chunking.overlap)?;
    debug!(file_name, chunks = pieces.len(), "chunked document");

    // Embed all chunk texts in source order. Storage order is fixed by the
    // explicit chunk_index either way.
    let vectors = if config.embedding.is_enabled() {
        let provider = embedding::create_provider(&config.embedding)
            .map_err(|e| StoreError::ProviderUnavailable(e.to_string()))?;
        let embedded = provider
            .embed(&pieces)
            .await
            .map_err(|e| StoreError::ProviderUnavailable(e.to_string()))?;
        if embedded.len() != pieces.len() {
            return Err(StoreError::ProviderUnavailable(format!(
                "provider returned {} vectors for {} chunks",
                embedded.len(),
                pieces.len()
            )));
        }
        Some(embedded)
    } else {
        None
    };

    let chunks: Vec<NewChunk> = pieces
        .into_iter()
        .enumerate()
        .map(|(i, piece)| NewChunk {
            text: piece,
            chunk_index: i as i64,
            page_number: None,
            embedding: vectors.as_ref().map(|v| v[i].clone()),
        })
        .collect();

    let doc = KnowledgeDocument {
        id: Uuid::new_v4().to_string(),
        filename: file_name.to_string(),
        source_url: source_url.map(str::to_string),
        file_size: text.len() as i64,
        extracted_text: text.to_string(),
        category,
        uploaded_at: Utc::now(),
        dedup_hash: hash_text(text),
    };

    match store
        .store_document(&doc, &chunks, config.embedding.is_enabled())
        .await
    {
        Ok(stored) => {
            info!(file_name, chunks = stored, "ingested document");
            Ok(IngestOutcome {
                chunks_created: stored,
                skipped_duplicate: false,
            })
        }
        Err(StoreError::DuplicateKey(reason)) => {
            info!(file_name, %reason, "skipping duplicate document");
            Ok(IngestOutcome {
                chunks_created: 0,
                skipped_duplicate: true,
            })
        }
        Err(e) => Err(e),
    }
}

fn hash_text(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ChunkingConfig, Config, DbConfig, EmbeddingConfig, RetrievalConfig, ServerConfig};
    use crate::store::{KnowledgeStore, MemoryStore};

    fn test_config() -> Config {
        Config {
            db: DbConfig {
                path: "unused.sqlite".into(),
                max_connections: 1,
            },
            chunking: ChunkingConfig {
                chunk_size: 1000,
                overlap: 200,
            },
            retrieval: RetrievalConfig::default(),
            embedding: EmbeddingConfig::default(),
            server: ServerConfig::default(),
        }
    }

    fn lorem(n: usize) -> String {
        "lorem ipsum dolor sit amet consectetur adipiscing elit "
            .chars()
            .cycle()
            .take(n)
            .collect()
    }

    #[tokio::test]
    async fn test_ingest_2500_chars_creates_three_chunks() {
        let store = MemoryStore::new();
        let config = test_config();

        let outcome = ingest_document(
            &store,
            &config,
            "wcag.pdf",
            &lorem(2500),
            None,
            Category::KnowledgeBase,
        )
        .await
        .unwrap();

        assert_eq!(outcome.chunks_created, 3);
        assert!(!outcome.skipped_duplicate);

        let hits = store.keyword_search("lorem", 100).await.unwrap();
        let mut indices: Vec<i64> = hits.iter().map(|h| h.chunk.metadata.chunk_index).collect();
        indices.sort();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_ingest_rejects_missing_fields() {
        let store = MemoryStore::new();
        let config = test_config();

        let err = ingest_document(&store, &config, "", "body", None, Category::Uploads)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));

        let err = ingest_document(&store, &config, "a.pdf", "  ", None, Category::Uploads)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
    }

    #[tokio::test]
    async fn test_reingest_identical_content_is_skip_not_error() {
        let store = MemoryStore::new();
        let config = test_config();
        let text = lorem(1500);

        ingest_document(&store, &config, "a.pdf", &text, None, Category::KnowledgeBase)
            .await
            .unwrap();
        let outcome =
            ingest_document(&store, &config, "a.pdf", &text, None, Category::KnowledgeBase)
                .await
                .unwrap();

        assert!(outcome.skipped_duplicate);
        assert_eq!(outcome.chunks_created, 0);
    }

    #[tokio::test]
    async fn test_enabled_provider_failure_aborts_write() {
        let store = MemoryStore::new();
        let mut config = test_config();
        config.embedding.provider = "ollama".into();
        config.embedding.model = Some("nomic-embed-text".into());
        config.embedding.dims = Some(768);
        config.embedding.url = Some("http://127.0.0.1:9".into());
        config.embedding.max_retries = 0;
        config.embedding.timeout_secs = 1;

        let err = ingest_document(
            &store,
            &config,
            "a.pdf",
            &lorem(1500),
            None,
            Category::KnowledgeBase,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, StoreError::ProviderUnavailable(_)));
        // No partial insert: nothing stored without its vector.
        assert!(store.list_documents().await.unwrap().is_empty());
    }
}
