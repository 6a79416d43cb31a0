//! HNSW index over a tenant's chunk vectors.
//!
//! Keys are chunk positions in the tenant's append-only sequence, so the
//! index stays aligned with the text sidecar by construction.

use usearch::ffi::{IndexOptions, MetricKind, ScalarKind};
use usearch::Index;

use crate::error::{Result, ShortstackError};

fn index_options(dimensions: usize) -> IndexOptions {
    IndexOptions {
        dimensions,
        metric: MetricKind::L2sq,
        quantization: ScalarKind::F32,
        connectivity: 0,
        expansion_add: 0,
        expansion_search: 0,
        multi: false,
    }
}

/// Append-only nearest-neighbor index with a fixed dimension.
pub struct ChunkIndex {
    inner: Index,
    dimensions: usize,
    len: usize,
}

impl ChunkIndex {
    pub fn new(dimensions: usize) -> Result<Self> {
        if dimensions == 0 {
            return Err(ShortstackError::InvalidConfig(
                "index dimensions must be greater than 0".into(),
            ));
        }
        let inner = Index::new(&index_options(dimensions))
            .map_err(|e| ShortstackError::Index(e.to_string()))?;
        Ok(Self {
            inner,
            dimensions,
            len: 0,
        })
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Append `vectors` at the next sequential keys.
    ///
    /// All dimensions are validated before the first insert so a failed
    /// call never partially applies.
    ///
    /// # Errors
    ///
    /// [`ShortstackError::IndexDimensionMismatch`] on any wrong-length
    /// vector.
    pub fn append(&mut self, vectors: &[Vec<f32>]) -> Result<()> {
        for v in vectors {
            if v.len() != self.dimensions {
                return Err(ShortstackError::IndexDimensionMismatch {
                    expected: self.dimensions,
                    got: v.len(),
                });
            }
        }
        self.inner
            .reserve(self.len + vectors.len())
            .map_err(|e| ShortstackError::Index(e.to_string()))?;
        for (i, v) in vectors.iter().enumerate() {
            let key = (self.len + i) as u64;
            if let Err(e) = self.inner.add(key, v) {
                // Undo the inserts that already landed from this call.
                for undone in 0..i {
                    let _ = self.inner.remove((self.len + undone) as u64);
                }
                return Err(ShortstackError::Index(e.to_string()));
            }
        }
        self.len += vectors.len();
        Ok(())
    }

    /// Remove the last `n` appended vectors. Used to roll back an append
    /// whose persistence failed.
    pub fn truncate_last(&mut self, n: usize) {
        let n = n.min(self.len);
        for key in (self.len - n)..self.len {
            let _ = self.inner.remove(key as u64);
        }
        self.len -= n;
    }

    /// Up to `k` nearest keys, ascending distance.
    ///
    /// # Errors
    ///
    /// [`ShortstackError::IndexDimensionMismatch`] when the query vector
    /// has the wrong length.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(u64, f32)>> {
        if query.len() != self.dimensions {
            return Err(ShortstackError::IndexDimensionMismatch {
                expected: self.dimensions,
                got: query.len(),
            });
        }
        if self.len == 0 || k == 0 {
            return Ok(Vec::new());
        }
        let matches = self
            .inner
            .search(query, k)
            .map_err(|e| ShortstackError::Index(e.to_string()))?;
        let mut results: Vec<(u64, f32)> = matches
            .keys
            .iter()
            .copied()
            .zip(matches.distances.iter().copied())
            .collect();
        results.sort_by(|a, b| a.1.total_cmp(&b.1));
        Ok(results)
    }

    /// Serialize the index for blob persistence.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; self.inner.serialized_length()];
        self.inner
            .save_to_buffer(&mut buf)
            .map_err(|e| ShortstackError::Index(e.to_string()))?;
        Ok(buf)
    }

    /// Rebuild an index from a persisted buffer; `len` comes from the
    /// manifest published alongside it.
    pub fn from_bytes(dimensions: usize, len: usize, bytes: &[u8]) -> Result<Self> {
        let inner = Index::new(&index_options(dimensions))
            .map_err(|e| ShortstackError::Index(e.to_string()))?;
        if len > 0 {
            inner
                .reserve(len)
                .map_err(|e| ShortstackError::Index(e.to_string()))?;
            inner
                .load_from_buffer(bytes)
                .map_err(|e| ShortstackError::Index(e.to_string()))?;
        }
        Ok(Self {
            inner,
            dimensions,
            len,
        })
    }
}

impl std::fmt::Debug for ChunkIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkIndex")
            .field("dimensions", &self.dimensions)
            .field("len", &self.len)
            .finish()
    }
}
