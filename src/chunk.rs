//! Fixed-size overlapping text chunker.
//!
//! Splits document text into character windows of at most `chunk_size`
//! characters, where consecutive windows share exactly `overlap` characters.
//! The overlap keeps sentence fragments from being cut off at window edges
//! when chunks are later retrieved in isolation.
//!
//! The cursor advances by `chunk_size - overlap` per step, so the
//! precondition `0 < overlap < chunk_size` is validated up front — an
//! overlap at or above the window size would never advance.

use crate::error::StoreError;

/// Split `text` into overlapping windows.
///
/// Windows are counted in characters, not bytes, so multi-byte input never
/// splits inside a code point. Returns chunks in source order:
///
/// - empty text yields an empty vec
/// - text shorter than `chunk_size` yields exactly one chunk equal to `text`
/// - every chunk except possibly the last has exactly `chunk_size` chars,
///   and shares its first `overlap` chars with the end of its predecessor
///
/// # Errors
///
/// Returns a validation error unless `0 < overlap < chunk_size`.
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Result<Vec<String>, StoreError> {
    if chunk_size == 0 {
        return Err(StoreError::Validation(
            "chunk_size must be greater than 0".into(),
        ));
    }
    if overlap == 0 || overlap >= chunk_size {
        return Err(StoreError::Validation(format!(
            "overlap must satisfy 0 < overlap < chunk_size (got overlap={}, chunk_size={})",
            overlap, chunk_size
        )));
    }

    if text.is_empty() {
        return Ok(Vec::new());
    }

    let chars: Vec<char> = text.chars().collect();
    let step = chunk_size - overlap;
    let mut chunks = Vec::new();
    let mut cursor = 0usize;

    loop {
        let end = (cursor + chunk_size).min(chars.len());
        chunks.push(chars[cursor..end].iter().collect());
        if end == chars.len() {
            break;
        }
        cursor += step;
    }

    Ok(chunks)
}
