//! Storage abstraction for the knowledge base.
//!
//! The [`KnowledgeStore`] trait defines every persistence operation the
//! pipeline needs. It is passed around as an explicit dependency
//! (constructor/parameter) rather than held in a module-level singleton,
//! so tests can substitute [`memory::MemoryStore`] for
//! [`sqlite::SqliteStore`].
//!
//! All operations return the typed [`StoreError`] kinds; backend error
//! codes are translated once inside each implementation.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::models::{Category, KnowledgeDocument, NewChunk, ScoredChunk};

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// A chunk still missing its embedding vector, as returned by
/// [`KnowledgeStore::pending_chunks`].
#[derive(Debug, Clone)]
pub struct PendingChunk {
    pub chunk_id: String,
    pub file_name: String,
    pub text: String,
}

/// Abstract storage backend.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`store_document`](KnowledgeStore::store_document) | Persist a document and its chunk batch |
/// | [`list_documents`](KnowledgeStore::list_documents) | Distinct filenames across stored chunks |
/// | [`get_document`](KnowledgeStore::get_document) | Fetch a document row by filename |
/// | [`delete_document`](KnowledgeStore::delete_document) | Bulk-delete a document and all its chunks |
/// | [`update_category`](KnowledgeStore::update_category) | Re-categorize a document |
/// | [`keyword_search`](KnowledgeStore::keyword_search) | Full-text search (degraded mode) |
/// | [`vector_search`](KnowledgeStore::vector_search) | Cosine-ranked similarity search |
/// | [`pending_chunks`](KnowledgeStore::pending_chunks) | Chunks awaiting embedding backfill |
/// | [`set_embedding`](KnowledgeStore::set_embedding) | Attach a vector to a stored chunk |
#[async_trait]
pub trait KnowledgeStore: Send + Sync {
    /// Persist a document row and its chunks as one batch, assigning chunk
    /// ids. Replaces any prior chunks stored under the same filename.
    ///
    /// When `require_vectors` is set, a chunk without an embedding fails
    /// the whole batch with [`StoreError::Validation`] before anything is
    /// written. Re-ingesting unchanged content, or a source URL already
    /// claimed by another document, fails with
    /// [`StoreError::DuplicateKey`] (callers treat that as a skip).
    ///
    /// Returns the number of chunks stored.
    async fn store_document(
        &self,
        doc: &KnowledgeDocument,
        chunks: &[NewChunk],
        require_vectors: bool,
    ) -> Result<usize, StoreError>;

    /// Distinct filenames across all stored chunks, sorted.
    async fn list_documents(&self) -> Result<Vec<String>, StoreError>;

    /// Fetch the document row for a filename, if present.
    async fn get_document(&self, file_name: &str)
        -> Result<Option<KnowledgeDocument>, StoreError>;

    /// Remove the document row and every chunk stored under `file_name`,
    /// all-or-nothing. Returns the number of chunks removed (0 when the
    /// filename was unknown).
    async fn delete_document(&self, file_name: &str) -> Result<u64, StoreError>;

    /// Change a document's category by document id.
    async fn update_category(&self, id: &str, category: Category) -> Result<(), StoreError>;

    /// Full-text keyword search. Ranking is backend-defined and not
    /// comparable with cosine scores.
    async fn keyword_search(&self, query: &str, limit: i64)
        -> Result<Vec<ScoredChunk>, StoreError>;

    /// Brute-force cosine similarity over all stored vectors, most similar
    /// first; ties keep insertion order. Chunks without vectors (and
    /// degenerate zero vectors) are skipped. Every call re-scans the full
    /// candidate set.
    async fn vector_search(
        &self,
        query_vec: &[f32],
        limit: i64,
    ) -> Result<Vec<ScoredChunk>, StoreError>;

    /// Chunks stored without an embedding, in (filename, index) order.
    async fn pending_chunks(&self, limit: Option<usize>)
        -> Result<Vec<PendingChunk>, StoreError>;

    /// Attach an embedding vector to an existing chunk.
    async fn set_embedding(&self, chunk_id: &str, vector: &[f32]) -> Result<(), StoreError>;
}
