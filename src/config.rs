//! Tier configuration.
//!
//! Every recognized option is listed explicitly on [`TierConfig`]; there
//! are no free-form or nested configuration objects. Tiers form a closed
//! enum; adding a tier means adding a variant and its table entry here.

use serde::{Deserialize, Serialize};

use crate::error::{Result, ShortstackError};

/// Rolling window over which usage limits are enforced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuotaPeriod {
    Daily,
    Monthly,
}

/// Subscription tier. Determines chunking geometry, model selection, and
/// quota limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Free,
    Starter,
    Pro,
}

/// The full set of tier-selected options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierConfig {
    /// Chunk length in characters.
    pub chunk_size: usize,
    /// Characters shared between consecutive chunks. Must be `< chunk_size`.
    pub overlap: usize,
    /// Maximum hits returned per query (`k`).
    pub max_results: usize,
    pub embedding_model: String,
    pub generation_model: String,
    /// Queries allowed per quota period.
    pub query_limit: u32,
    /// Document ingestions allowed per quota period.
    pub ingest_limit: u32,
    pub period: QuotaPeriod,
}

impl TierConfig {
    /// # Errors
    ///
    /// Returns [`ShortstackError::InvalidConfig`] when the chunk geometry
    /// is unusable (`chunk_size == 0` or `overlap >= chunk_size`) or a
    /// limit is zero.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(ShortstackError::InvalidConfig(
                "chunk_size must be greater than 0".into(),
            ));
        }
        if self.overlap >= self.chunk_size {
            return Err(ShortstackError::InvalidConfig(format!(
                "overlap ({}) must be less than chunk_size ({})",
                self.overlap, self.chunk_size
            )));
        }
        if self.max_results == 0 {
            return Err(ShortstackError::InvalidConfig(
                "max_results must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

impl Tier {
    /// The configuration table for this tier.
    pub fn config(&self) -> TierConfig {
        match self {
            Tier::Free => TierConfig {
                chunk_size: 500,
                overlap: 50,
                max_results: 3,
                embedding_model: "text-embedding-3-small".into(),
                generation_model: "gpt-4o-mini".into(),
                query_limit: 50,
                ingest_limit: 10,
                period: QuotaPeriod::Daily,
            },
            Tier::Starter => TierConfig {
                chunk_size: 1000,
                overlap: 100,
                max_results: 5,
                embedding_model: "text-embedding-3-small".into(),
                generation_model: "gpt-4o-mini".into(),
                query_limit: 2_000,
                ingest_limit: 200,
                period: QuotaPeriod::Monthly,
            },
            Tier::Pro => TierConfig {
                chunk_size: 1500,
                overlap: 200,
                max_results: 8,
                embedding_model: "text-embedding-3-large".into(),
                generation_model: "gpt-4o".into(),
                query_limit: 20_000,
                ingest_limit: 2_000,
                period: QuotaPeriod::Monthly,
            },
        }
    }
}
