//! In-memory [`KnowledgeStore`] for tests.
//!
//! `Vec`s behind `std::sync::RwLock`; vector search is brute-force cosine
//! and keyword search is naive term matching (no FTS index, so rankings
//! differ from the SQLite backend — callers must not compare scores across
//! backends). Multi-row operations hold the write lock for their whole
//! duration, matching the SQLite backend's all-or-nothing behavior.

use std::sync::RwLock;

use async_trait::async_trait;
use uuid::Uuid;

use crate::embedding::cosine_similarity;
use crate::error::StoreError;
use crate::models::{
    Category, ChunkMetadata, DocumentChunk, KnowledgeDocument, NewChunk, ScoredChunk,
};

use super::{KnowledgeStore, PendingChunk};

#[derive(Default)]
pub struct MemoryStore {
    docs: RwLock<Vec<KnowledgeDocument>>,
    chunks: RwLock<Vec<DocumentChunk>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KnowledgeStore for MemoryStore {
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

        let mut docs = self.docs.write().unwrap();
        let mut stored = self.chunks.write().unwrap();

        if let Some(existing) = docs.iter().find(|d| d.filename == doc.filename) {
            if existing.dedup_hash == doc.dedup_hash {
                return Err(StoreError::DuplicateKey(format!(
                    "'{}' already ingested with identical content",
                    doc.filename
                )));
            }
        }
        if let Some(url) = &doc.source_url {
            if docs
                .iter()
                .any(|d| d.filename != doc.filename && d.source_url.as_ref() == Some(url))
            {
                return Err(StoreError::DuplicateKey(format!(
                    "source_url of '{}'",
                    doc.filename
                )));
            }
        }

        docs.retain(|d| d.filename != doc.filename);
        stored.retain(|c| c.metadata.file_name != doc.filename);

        docs.push(doc.clone());
        for chunk in chunks {
            stored.push(DocumentChunk {
                id: Uuid::new_v4().to_string(),
                text: chunk.text.clone(),
                metadata: ChunkMetadata {
                    file_name: doc.filename.clone(),
                    chunk_index: chunk.chunk_index,
                    uploaded_at: doc.uploaded_at,
                    page_number: chunk.page_number,
                },
                embedding: chunk.embedding.clone(),
            });
        }

        Ok(chunks.len())
    }

    async fn list_documents(&self) -> Result<Vec<String>, StoreError> {
        let chunks = self.chunks.read().unwrap();
        let mut names: Vec<String> = chunks
            .iter()
            .map(|c| c.metadata.file_name.clone())
            .collect();
        names.sort();
        names.dedup();
        Ok(names)
    }

    async fn get_document(
        &self,
        file_name: &str,
    ) -> Result<Option<KnowledgeDocument>, StoreError> {
        let docs = self.docs.read().unwrap();
        Ok(docs.iter().find(|d| d.filename == file_name).cloned())
    }

    async fn delete_document(&self, file_name: &str) -> Result<u64, StoreError> {
        let mut docs = self.docs.write().unwrap();
        let mut chunks = self.chunks.write().unwrap();

        let before = chunks.len();
        chunks.retain(|c| c.metadata.file_name != file_name);
        docs.retain(|d| d.filename != file_name);
        Ok((before - chunks.len()) as u64)
    }

    async fn update_category(&self, id: &str, category: Category) -> Result<(), StoreError> {
        let mut docs = self.docs.write().unwrap();
        match docs.iter_mut().find(|d| d.id == id) {
            Some(doc) => {
                doc.category = category;
                Ok(())
            }
            None => Err(StoreError::NotFound(format!("document id '{}'", id))),
        }
    }

    async fn keyword_search(
        &self,
        query: &str,
        limit: i64,
    ) -> Result<Vec<ScoredChunk>, StoreError> {
        let query_lower = query.to_lowercase();
        let terms: Vec<&str> = query_lower.split_whitespace().collect();
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let chunks = self.chunks.read().unwrap();
        let mut candidates: Vec<ScoredChunk> = chunks
            .iter()
            .filter_map(|chunk| {
                let text_lower = chunk.text.to_lowercase();
                let matches = terms.iter().filter(|t| text_lower.contains(*t)).count();
                if matches > 0 {
                    Some(ScoredChunk {
                        chunk: chunk.clone(),
                        score: matches as f64,
                    })
                } else {
                    None
                }
            })
            .collect();

        candidates.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        candidates.truncate(limit.max(0) as usize);
        Ok(candidates)
    }

    async fn vector_search(
        &self,
        query_vec: &[f32],
        limit: i64,
    ) -> Result<Vec<ScoredChunk>, StoreError> {
        let chunks = self.chunks.read().unwrap();
        let mut candidates: Vec<ScoredChunk> = chunks
            .iter()
            .filter_map(|chunk| {
                let vec = chunk.embedding.as_deref()?;
                let score = cosine_similarity(query_vec, vec) as f64;
                if !score.is_finite() {
                    return None;
                }
                Some(ScoredChunk {
                    chunk: chunk.clone(),
                    score,
                })
            })
            .collect();

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
        let chunks = self.chunks.read().unwrap();
        let mut pending: Vec<&DocumentChunk> =
            chunks.iter().filter(|c| c.embedding.is_none()).collect();
        pending.sort_by(|a, b| {
            (&a.metadata.file_name, a.metadata.chunk_index)
                .cmp(&(&b.metadata.file_name, b.metadata.chunk_index))
        });
        pending.truncate(limit.unwrap_or(usize::MAX));

        Ok(pending
            .into_iter()
            .map(|c| PendingChunk {
                chunk_id: c.id.clone(),
                file_name: c.metadata.file_name.clone(),
                text: c.text.clone(),
            })
            .collect())
    }

    async fn set_embedding(&self, chunk_id: &str, vector: &[f32]) -> Result<(), StoreError> {
        let mut chunks = self.chunks.write().unwrap();
        match chunks.iter_mut().find(|c| c.id == chunk_id) {
            Some(chunk) => {
                chunk.embedding = Some(vector.to_vec());
                Ok(())
            }
            None => Err(StoreError::NotFound(format!("chunk id '{}'", chunk_id))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

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

    fn plain_chunks(n: usize) -> Vec<NewChunk> {
        (0..n)
            .map(|i| NewChunk {
                text: format!("chunk {}", i),
                chunk_index: i as i64,
                page_number: None,
                embedding: None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_list_documents_deduplicates() {
        let store = MemoryStore::new();
        store
            .store_document(&doc("a.pdf", "h1"), &plain_chunks(3), false)
            .await
            .unwrap();
        store
            .store_document(&doc("b.pdf", "h2"), &plain_chunks(2), false)
            .await
            .unwrap();

        let names = store.list_documents().await.unwrap();
        assert_eq!(names, vec!["a.pdf".to_string(), "b.pdf".to_string()]);
    }

    #[tokio::test]
    async fn test_delete_document_removes_all_chunks() {
        let store = MemoryStore::new();
        store
            .store_document(&doc("a.pdf", "h1"), &plain_chunks(3), false)
            .await
            .unwrap();
        store
            .store_document(&doc("b.pdf", "h2"), &plain_chunks(2), false)
            .await
            .unwrap();

        let removed = store.delete_document("a.pdf").await.unwrap();
        assert_eq!(removed, 3);
        assert_eq!(store.list_documents().await.unwrap(), vec!["b.pdf"]);

        let hits = store.keyword_search("chunk", 10).await.unwrap();
        assert!(hits.iter().all(|h| h.chunk.metadata.file_name != "a.pdf"));
    }

    #[tokio::test]
    async fn test_unchanged_reingest_is_duplicate() {
        let store = MemoryStore::new();
        store
            .store_document(&doc("a.pdf", "h1"), &plain_chunks(2), false)
            .await
            .unwrap();
        let err = store
            .store_document(&doc("a.pdf", "h1"), &plain_chunks(2), false)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateKey(_)));
    }

    #[tokio::test]
    async fn test_changed_reingest_replaces() {
        let store = MemoryStore::new();
        store
            .store_document(&doc("a.pdf", "h1"), &plain_chunks(5), false)
            .await
            .unwrap();
        store
            .store_document(&doc("a.pdf", "h2"), &plain_chunks(2), false)
            .await
            .unwrap();

        let hits = store.keyword_search("chunk", 100).await.unwrap();
        assert_eq!(hits.len(), 2, "old chunks must not accumulate");
    }

    #[tokio::test]
    async fn test_require_vectors_rejects_missing_embedding() {
        let store = MemoryStore::new();
        let err = store
            .store_document(&doc("a.pdf", "h1"), &plain_chunks(2), true)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
        assert!(store.list_documents().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_vector_search_exact_match_first() {
        let store = MemoryStore::new();
        let chunks = vec![
            NewChunk {
                text: "first".into(),
                chunk_index: 0,
                page_number: None,
                embedding: Some(vec![1.0, 0.0, 0.0]),
            },
            NewChunk {
                text: "second".into(),
                chunk_index: 1,
                page_number: None,
                embedding: Some(vec![0.0, 1.0, 0.0]),
            },
        ];
        store
            .store_document(&doc("a.pdf", "h1"), &chunks, true)
            .await
            .unwrap();

        let hits = store.vector_search(&[0.0, 1.0, 0.0], 10).await.unwrap();
        assert_eq!(hits[0].chunk.metadata.chunk_index, 1);
        assert!((hits[0].score - 1.0).abs() < 1e-6);
        assert!(hits[0].score > hits[1].score);
    }

    #[tokio::test]
    async fn test_update_category_unknown_id() {
        let store = MemoryStore::new();
        let err = store
            .update_category("missing", Category::Uploads)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }
}
