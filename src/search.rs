//! Similarity search with degraded-mode fallback.
//!
//! When an embedding provider is configured, the query is embedded and
//! ranked by cosine similarity against stored chunk vectors. When the
//! provider is disabled or unavailable, the search falls back to the
//! store's full-text keyword index. Scores from the two modes are not
//! comparable.

use anyhow::Result;
use tracing::warn;

use crate::config::Config;
use crate::embedding;
use crate::models::ScoredChunk;
use crate::store::KnowledgeStore;

/// Which path produced a set of search results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    Vector,
    Keyword,
}

/// Top-`limit` chunks for `query`, most similar first.
///
/// Empty or whitespace queries return no results. Provider failures
/// (quota, network, disabled) degrade to keyword search rather than
/// surfacing an error; store failures still propagate.
pub async fn search_chunks(
    store: &dyn KnowledgeStore,
    config: &Config,
    query: &str,
    limit: Option<i64>,
) -> Result<(Vec<ScoredChunk>, SearchMode)> {
    let limit = limit.unwrap_or(config.retrieval.limit);

    if query.trim().is_empty() {
        return Ok((Vec::new(), SearchMode::Keyword));
    }

    if config.embedding.is_enabled() {
        match embed_query_vec(config, query).await {
            Ok(query_vec) => {
                let results = store.vector_search(&query_vec, limit).await?;
                return Ok((results, SearchMode::Vector));
            }
            Err(e) => {
                warn!(error = %e, "embedding unavailable, falling back to keyword search");
            }
        }
    }

    let results = store.keyword_search(query, limit).await?;
    Ok((results, SearchMode::Keyword))
}

async fn embed_query_vec(config: &Config, query: &str) -> Result<Vec<f32>> {
    let provider = embedding::create_provider(&config.embedding)?;
    provider.embed_query(query).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ChunkingConfig, Config, DbConfig, EmbeddingConfig, RetrievalConfig, ServerConfig};
    use crate::models::{Category, KnowledgeDocument, NewChunk};
    use crate::store::MemoryStore;
    use chrono::Utc;

    fn test_config() -> Config {
        Config {
            db: DbConfig {
                path: "unused.sqlite".into(),
                max_connections: 1,
            },
            chunking: ChunkingConfig::default(),
            retrieval: RetrievalConfig::default(),
            embedding: EmbeddingConfig::default(),
            server: ServerConfig::default(),
        }
    }

    async fn seeded_store() -> MemoryStore {
        let store = MemoryStore::new();
        let doc = KnowledgeDocument {
            id: "d1".into(),
            filename: "wcag.pdf".into(),
            source_url: None,
            file_size: 100,
            extracted_text: String::new(),
            category: Category::KnowledgeBase,
            uploaded_at: Utc::now(),
            dedup_hash: "h1".into(),
        };
        let chunks = vec![
            NewChunk {
                text: "contrast ratios for text".into(),
                chunk_index: 0,
                page_number: None,
                embedding: None,
            },
            NewChunk {
                text: "keyboard navigation patterns".into(),
                chunk_index: 1,
                page_number: None,
                embedding: None,
            },
        ];
        store.store_document(&doc, &chunks, false).await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_disabled_provider_uses_keyword_mode() {
        let store = seeded_store().await;
        let config = test_config();

        let (results, mode) = search_chunks(&store, &config, "keyboard", None)
            .await
            .unwrap();
        assert_eq!(mode, SearchMode::Keyword);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk.metadata.chunk_index, 1);
    }

    #[tokio::test]
    async fn test_empty_query_returns_nothing() {
        let store = seeded_store().await;
        let config = test_config();

        let (results, _) = search_chunks(&store, &config, "   ", None).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_enabled_but_unreachable_provider_falls_back() {
        let store = seeded_store().await;
        let mut config = test_config();
        // Ollama provider pointed at a closed port: embedding fails, the
        // search must degrade to keyword mode instead of erroring.
        config.embedding.provider = "ollama".into();
        config.embedding.model = Some("nomic-embed-text".into());
        config.embedding.dims = Some(768);
        config.embedding.url = Some("http://127.0.0.1:9".into());
        config.embedding.max_retries = 0;
        config.embedding.timeout_secs = 1;

        let (results, mode) = search_chunks(&store, &config, "contrast", None)
            .await
            .unwrap();
        assert_eq!(mode, SearchMode::Keyword);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk.metadata.chunk_index, 0);
    }
}
