//! Error kinds surfaced by the document store.
//!
//! All backend-specific failures (sqlx error codes, unique-constraint
//! violations) are translated into [`StoreError`] once, at the store
//! boundary. Callers match on the variant instead of inspecting driver
//! error strings.

use thiserror::Error;

/// Typed error returned by every [`KnowledgeStore`](crate::store::KnowledgeStore)
/// operation and by the ingestion pipeline.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Missing or malformed input. Never retried; maps to HTTP 400.
    #[error("validation error: {0}")]
    Validation(String),

    /// A row with the same unique source URL already exists. Ingestion
    /// callers treat this as success-with-skip, not a failure.
    #[error("duplicate key: {0}")]
    DuplicateKey(String),

    /// The requested document or chunk does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The embedding backend is down, unauthorized, or out of quota.
    /// Aborts writes; search callers fall back to keyword mode.
    #[error("embedding provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// Store connectivity or configuration failure. Maps to HTTP 500 and
    /// is never retried.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Translate a sqlx error into a store error kind.
    ///
    /// Unique-constraint violations become [`StoreError::DuplicateKey`];
    /// everything else is treated as the store being unavailable.
    pub fn from_sqlx(err: sqlx::Error, context: &str) -> Self {
        if let sqlx::Error::Database(ref db_err) = err {
            if matches!(db_err.kind(), sqlx::error::ErrorKind::UniqueViolation) {
                return StoreError::DuplicateKey(context.to_string());
            }
        }
        StoreError::Unavailable(format!("{}: {}", context, err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_context() {
        let err = StoreError::Validation("fileName is required".into());
        assert!(err.to_string().contains("fileName is required"));

        let err = StoreError::DuplicateKey("source_url".into());
        assert!(err.to_string().contains("duplicate key"));
    }
}
