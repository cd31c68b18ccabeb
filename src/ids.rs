//! Small identifier newtypes used across the pipeline.
//!
//! Mirrors the crate's index-newtype convention (see `stream`'s `BlockIdx` /
//! `RowIdx` / `RegIdx`): a thin wrapper around a primitive that serializes
//! transparently but prevents accidentally mixing up job ids and chunk
//! indices at call sites.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for a single orchestrator job (opaque short string).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a fresh job id from a random byte source.
    ///
    /// Matches the original's `str(uuid.uuid4())[:8]` shape: short, opaque,
    /// good enough for log correlation, not a security token.
    pub fn generate() -> Self {
        let bytes: [u8; 4] = rand::random();
        JobId(hex::encode(bytes))
    }

    /// Borrow the id as a plain string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        JobId(s)
    }
}

/// Index of a chunk within a job, `i ∈ {0..chunk_count-1}`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ChunkIndex(pub usize);

impl ChunkIndex {
    /// Access the underlying index.
    #[inline]
    pub fn as_usize(self) -> usize {
        self.0
    }

    /// Render the canonical chunk id string, e.g. `chunk_3`.
    pub fn chunk_id(self) -> String {
        format!("chunk_{}", self.0)
    }
}

impl fmt::Display for ChunkIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.chunk_id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_id_format() {
        assert_eq!(ChunkIndex(0).chunk_id(), "chunk_0");
        assert_eq!(ChunkIndex(12).chunk_id(), "chunk_12");
    }

    #[test]
    fn job_id_generate_is_short_and_hex() {
        let id = JobId::generate();
        assert_eq!(id.as_str().len(), 8);
        assert!(id.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }
}
