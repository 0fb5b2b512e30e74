//! Core data models for the knowledge-base pipeline.
//!
//! One canonical chunk-level representation: a [`KnowledgeDocument`] row is
//! the parent entity and [`DocumentChunk`]s carry the searchable text. The
//! whole-document view is simply the parent row; there is no second schema.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Document category. Unknown values are rejected at the boundary with a
/// validation error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    KnowledgeBase,
    Uploads,
    Procurement,
    AnalysisOnly,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::KnowledgeBase => "knowledge-base",
            Category::Uploads => "uploads",
            Category::Procurement => "procurement",
            Category::AnalysisOnly => "analysis-only",
        }
    }
}

impl Default for Category {
    fn default() -> Self {
        Category::KnowledgeBase
    }
}

impl FromStr for Category {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "knowledge-base" => Ok(Category::KnowledgeBase),
            "uploads" => Ok(Category::Uploads),
            "procurement" => Ok(Category::Procurement),
            "analysis-only" => Ok(Category::AnalysisOnly),
            other => Err(StoreError::Validation(format!(
                "unknown category '{}'. Must be one of: knowledge-base, uploads, procurement, analysis-only",
                other
            ))),
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parent document row. `filename` and `source_url` are unique across the
/// store; re-ingesting a filename replaces its prior chunks.
#[derive(Debug, Clone)]
pub struct KnowledgeDocument {
    pub id: String,
    pub filename: String,
    pub source_url: Option<String>,
    pub file_size: i64,
    pub extracted_text: String,
    pub category: Category,
    pub uploaded_at: DateTime<Utc>,
    /// SHA-256 of the extracted text, for dedup/staleness detection.
    pub dedup_hash: String,
}

/// Per-chunk metadata persisted alongside the text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub file_name: String,
    pub chunk_index: i64,
    pub uploaded_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_number: Option<i64>,
}

/// A bounded-length slice of a source document — the unit of storage and
/// retrieval. `id` is assigned by the store at insert time.
#[derive(Debug, Clone)]
pub struct DocumentChunk {
    pub id: String,
    pub text: String,
    pub metadata: ChunkMetadata,
    /// Absent in degraded mode (embedding provider disabled or failed).
    pub embedding: Option<Vec<f32>>,
}

/// A chunk awaiting storage. Ids are assigned when the batch is persisted.
#[derive(Debug, Clone)]
pub struct NewChunk {
    pub text: String,
    pub chunk_index: i64,
    pub page_number: Option<i64>,
    pub embedding: Option<Vec<f32>>,
}

/// A search hit: a stored chunk plus its ranking score.
///
/// Scores are not comparable across search modes — cosine similarity for
/// vector search, backend-defined rank for keyword fallback.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: DocumentChunk,
    pub score: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_roundtrip() {
        for name in ["knowledge-base", "uploads", "procurement", "analysis-only"] {
            let cat: Category = name.parse().unwrap();
            assert_eq!(cat.as_str(), name);
        }
    }

    #[test]
    fn test_category_unknown_rejected() {
        let err = "archive".parse::<Category>().unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
        assert!(err.to_string().contains("archive"));
    }

    #[test]
    fn test_category_serde_kebab_case() {
        let json = serde_json::to_string(&Category::AnalysisOnly).unwrap();
        assert_eq!(json, "\"analysis-only\"");
        let cat: Category = serde_json::from_str("\"procurement\"").unwrap();
        assert_eq!(cat, Category::Procurement);
    }
}
