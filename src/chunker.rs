//! Deterministic sliding-window text splitter.
//!
//! Windows are measured in characters (Unicode scalar values), never
//! bytes, so a chunk boundary can never split a UTF-8 sequence. Each
//! chunk starts `size - overlap` characters after the previous one; the
//! final chunk may be shorter than `size`.

use crate::config::TierConfig;
use crate::error::{Result, ShortstackError};
use crate::types::Chunk;

/// Split `text` into overlapping chunks per the tier's geometry.
///
/// Deterministic: the same text and config always yield the same chunk
/// sequence. Chunks cover the full input: concatenating them with the
/// first `overlap` characters dropped from every chunk after the first
/// reconstructs `text` exactly.
///
/// # Errors
///
/// Returns [`ShortstackError::InvalidConfig`] when `text` is empty or the
/// config fails [`TierConfig::validate`].
pub fn chunk(document_id: &str, text: &str, config: &TierConfig) -> Result<Vec<Chunk>> {
    config.validate()?;
    if text.is_empty() {
        return Err(ShortstackError::InvalidConfig(
            "text must not be empty".into(),
        ));
    }

    let chars: Vec<char> = text.chars().collect();
    let size = config.chunk_size;
    let stride = size - config.overlap;

    let mut chunks = Vec::with_capacity(chars.len() / stride + 1);
    let mut start = 0;
    loop {
        let end = usize::min(start + size, chars.len());
        chunks.push(Chunk {
            seq: chunks.len(),
            text: chars[start..end].iter().collect(),
            document_id: document_id.to_owned(),
        });
        if end == chars.len() {
            break;
        }
        start += stride;
    }
    Ok(chunks)
}
