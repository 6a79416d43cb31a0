//! Tenant vector store: one nearest-neighbor index plus a parallel text
//! sidecar per tenant, persisted to blob storage.
//!
//! Replaces a single shared process-wide index with a keyed registry of
//! per-tenant handles, each behind its own `RwLock`. Searches for a
//! tenant run concurrently with each other but never with an in-flight
//! `add` for that tenant; operations on different tenants never contend.
//!
//! Durability follows write-then-publish: a new index artifact and text
//! sidecar are staged under a fresh generation number, then a small
//! manifest naming that generation is written last. A crash mid-`add`
//! leaves the previous manifest pointing at the previous consistent pair,
//! never a mismatched one.

pub mod blob;
pub mod index;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::{Result, ShortstackError};
use crate::types::{Chunk, SearchHit, TenantId};

pub use blob::{BlobStore, FsBlobStore};
#[cfg(feature = "s3-snapshots")]
pub use blob::S3BlobStore;
pub use index::ChunkIndex;

const DEFAULT_MAX_LOADED_TENANTS: usize = 64;

/// Published pointer to the current durable generation of a tenant's
/// index + sidecar pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Manifest {
    generation: u64,
    dimensions: usize,
    count: usize,
}

fn manifest_path(tenant: &str) -> String {
    format!("tenants/{tenant}/manifest.json")
}

fn index_path(tenant: &str, generation: u64) -> String {
    format!("tenants/{tenant}/segments/{generation:020}.index")
}

fn texts_path(tenant: &str, generation: u64) -> String {
    format!("tenants/{tenant}/segments/{generation:020}.texts.json")
}

fn validate_tenant(tenant: &str) -> Result<()> {
    if tenant.is_empty() || tenant.contains('/') || tenant.contains("..") {
        return Err(ShortstackError::InvalidConfig(format!(
            "invalid tenant key: {tenant:?}"
        )));
    }
    Ok(())
}

/// In-memory state for one tenant. `index` is `None` until the first
/// `add` establishes the dimension. `texts[key]` is the chunk text for
/// index key `key`; the two sequences are always the same length.
pub struct TenantIndexHandle {
    tenant: TenantId,
    index: Option<ChunkIndex>,
    texts: Vec<String>,
    generation: u64,
}

impl TenantIndexHandle {
    fn empty(tenant: &str) -> Self {
        Self {
            tenant: tenant.to_owned(),
            index: None,
            texts: Vec::new(),
            generation: 0,
        }
    }

    pub fn tenant(&self) -> &str {
        &self.tenant
    }

    pub fn chunk_count(&self) -> usize {
        self.texts.len()
    }

    pub fn dimensions(&self) -> Option<usize> {
        self.index.as_ref().map(|i| i.dimensions())
    }
}

struct CachedHandle {
    handle: Arc<RwLock<TenantIndexHandle>>,
    last_access_ms: AtomicU64,
}

/// Multi-tenant vector store.
///
/// Owns the bounded cache of loaded [`TenantIndexHandle`]s, lazy loading
/// from blob storage, LRU eviction, and the per-tenant lock discipline.
/// `Send + Sync`; share it behind an `Arc`.
pub struct TenantVectorStore {
    blob: Arc<dyn BlobStore>,
    handles: DashMap<TenantId, Arc<CachedHandle>>,
    max_loaded: usize,
    started: Instant,
}

impl TenantVectorStore {
    pub fn new(blob: Arc<dyn BlobStore>) -> Arc<Self> {
        Self::with_max_loaded(blob, DEFAULT_MAX_LOADED_TENANTS)
    }

    pub fn with_max_loaded(blob: Arc<dyn BlobStore>, max_loaded: usize) -> Arc<Self> {
        Arc::new(Self {
            blob,
            handles: DashMap::new(),
            max_loaded: max_loaded.max(1),
            started: Instant::now(),
        })
    }

    /// Number of tenant handles currently resident in memory.
    pub fn loaded_tenants(&self) -> usize {
        self.handles.len()
    }

    /// Stored chunk count for a tenant (loading it on demand); 0 when the
    /// tenant has no index yet.
    pub async fn chunk_count(&self, tenant: &str) -> Result<usize> {
        match self.get_handle(tenant, false).await? {
            Some(handle) => Ok(handle.read().await.chunk_count()),
            None => Ok(0),
        }
    }

    /// Append `chunks`/`vectors` to the tenant's index and persist.
    ///
    /// Runs under the tenant's exclusive write lock. The tenant's vector
    /// dimension is established by the first call and fixed thereafter.
    /// On any failure neither in-memory nor durable state is mutated.
    ///
    /// Returns the tenant's total stored chunk count after the append.
    ///
    /// # Errors
    ///
    /// - [`ShortstackError::InvalidConfig`] when `chunks` and `vectors`
    ///   have different lengths.
    /// - [`ShortstackError::IndexDimensionMismatch`] when any vector
    ///   disagrees with the established dimension.
    /// - [`ShortstackError::Storage`] when persistence fails.
    pub async fn add(&self, tenant: &str, chunks: &[Chunk], vectors: &[Vec<f32>]) -> Result<usize> {
        validate_tenant(tenant)?;
        if chunks.len() != vectors.len() {
            return Err(ShortstackError::InvalidConfig(format!(
                "chunk/vector count mismatch: {} chunks, {} vectors",
                chunks.len(),
                vectors.len()
            )));
        }
        let handle = match self.get_handle(tenant, true).await? {
            Some(h) => h,
            // get_handle always yields a handle when create is set
            None => return Err(ShortstackError::Index("handle creation failed".into())),
        };
        if chunks.is_empty() {
            return Ok(handle.read().await.chunk_count());
        }

        let mut guard = handle.write().await;

        let expected = match guard.index.as_ref() {
            Some(idx) => idx.dimensions(),
            None => vectors[0].len(),
        };
        for v in vectors {
            if v.len() != expected {
                return Err(ShortstackError::IndexDimensionMismatch {
                    expected,
                    got: v.len(),
                });
            }
        }

        let created_now = guard.index.is_none();
        let mut idx = match guard.index.take() {
            Some(i) => i,
            None => ChunkIndex::new(expected)?,
        };
        let added = vectors.len();

        if let Err(e) = idx.append(vectors) {
            if !created_now {
                guard.index = Some(idx);
            }
            return Err(e);
        }

        let generation = guard.generation + 1;
        let mut texts_new = guard.texts.clone();
        texts_new.extend(chunks.iter().map(|c| c.text.clone()));

        let staged: Result<()> = async {
            let index_bytes = idx.to_bytes()?;
            let sidecar = serde_json::to_vec(&texts_new)?;
            let manifest = serde_json::to_vec(&Manifest {
                generation,
                dimensions: expected,
                count: texts_new.len(),
            })?;
            // Stage both artifacts, then publish the manifest.
            self.blob.put(&index_path(tenant, generation), &index_bytes).await?;
            self.blob.put(&texts_path(tenant, generation), &sidecar).await?;
            self.blob.put(&manifest_path(tenant), &manifest).await?;
            Ok(())
        }
        .await;

        if let Err(e) = staged {
            idx.truncate_last(added);
            if !created_now {
                guard.index = Some(idx);
            }
            tracing::warn!(tenant, error = %e, "add rolled back: persistence failed");
            return Err(e);
        }

        guard.index = Some(idx);
        guard.texts = texts_new;
        guard.generation = generation;
        let total = guard.texts.len();
        tracing::debug!(tenant, generation, added, total, "published tenant index generation");
        Ok(total)
    }

    /// Nearest chunks to `query`, ascending distance, at most `k` hits.
    ///
    /// Holds the tenant's read lock, so it runs concurrently with other
    /// searches for the same tenant but not with an in-flight `add`.
    /// A tenant with no index yet yields an empty result, not an error.
    ///
    /// # Errors
    ///
    /// [`ShortstackError::IndexDimensionMismatch`] when the query vector
    /// does not match the tenant's established dimension.
    pub async fn search(&self, tenant: &str, query: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        validate_tenant(tenant)?;
        let handle = match self.get_handle(tenant, false).await? {
            Some(h) => h,
            None => return Ok(Vec::new()),
        };
        let guard = handle.read().await;
        let idx = match guard.index.as_ref() {
            Some(i) => i,
            None => return Ok(Vec::new()),
        };
        let hits = idx.search(query, k)?;
        Ok(hits
            .into_iter()
            .filter_map(|(key, distance)| {
                guard.texts.get(key as usize).map(|text| SearchHit {
                    text: text.clone(),
                    distance,
                })
            })
            .collect())
    }

    /// Drop a tenant's handle from memory if it is idle. Returns whether
    /// it was evicted. The next access reloads it from blob storage.
    pub fn unload(&self, tenant: &str) -> bool {
        self.try_evict(tenant)
    }

    // ── handle cache ──

    async fn get_handle(
        &self,
        tenant: &str,
        create: bool,
    ) -> Result<Option<Arc<RwLock<TenantIndexHandle>>>> {
        if let Some(cached) = self.handles.get(tenant) {
            cached.last_access_ms.store(self.now_ms(), Ordering::Relaxed);
            return Ok(Some(Arc::clone(&cached.handle)));
        }

        let loaded = self.load_from_blob(tenant).await?;
        let built = match loaded {
            Some(h) => h,
            None if create => TenantIndexHandle::empty(tenant),
            None => return Ok(None),
        };

        // Two tasks may race to load the same tenant; the loser's copy is
        // dropped in favor of whichever entry landed first. The caller's
        // handle clone is taken before the entry is visible, so the
        // strong-count guard in `try_evict` protects it from the moment
        // another task can see it.
        let handle = match self.handles.entry(tenant.to_owned()) {
            dashmap::mapref::entry::Entry::Occupied(e) => {
                e.get().last_access_ms.store(self.now_ms(), Ordering::Relaxed);
                Arc::clone(&e.get().handle)
            }
            dashmap::mapref::entry::Entry::Vacant(v) => {
                let handle = Arc::new(RwLock::new(built));
                v.insert(Arc::new(CachedHandle {
                    handle: Arc::clone(&handle),
                    last_access_ms: AtomicU64::new(self.now_ms()),
                }));
                handle
            }
        };

        self.evict_over_capacity();
        Ok(Some(handle))
    }

    async fn load_from_blob(&self, tenant: &str) -> Result<Option<TenantIndexHandle>> {
        let manifest_bytes = match self.blob.get(&manifest_path(tenant)).await? {
            Some(b) => b,
            None => return Ok(None),
        };
        let manifest: Manifest = serde_json::from_slice(&manifest_bytes)?;

        let index_bytes = self
            .blob
            .get(&index_path(tenant, manifest.generation))
            .await?
            .ok_or_else(|| {
                ShortstackError::Storage(format!(
                    "manifest generation {} missing index artifact for tenant {tenant}",
                    manifest.generation
                ))
            })?;
        let sidecar_bytes = self
            .blob
            .get(&texts_path(tenant, manifest.generation))
            .await?
            .ok_or_else(|| {
                ShortstackError::Storage(format!(
                    "manifest generation {} missing text sidecar for tenant {tenant}",
                    manifest.generation
                ))
            })?;

        let texts: Vec<String> = serde_json::from_slice(&sidecar_bytes)?;
        if texts.len() != manifest.count {
            return Err(ShortstackError::Storage(format!(
                "tenant {tenant}: sidecar has {} texts but manifest says {}",
                texts.len(),
                manifest.count
            )));
        }
        let index = ChunkIndex::from_bytes(manifest.dimensions, manifest.count, &index_bytes)?;

        tracing::debug!(
            tenant,
            generation = manifest.generation,
            count = manifest.count,
            "loaded tenant index from blob storage"
        );
        Ok(Some(TenantIndexHandle {
            tenant: tenant.to_owned(),
            index: Some(index),
            texts,
            generation: manifest.generation,
        }))
    }

    fn now_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    /// Evict least-recently-used handles until the cache fits. A handle
    /// is only removed when its lock can be taken without waiting and the
    /// registry holds the only outstanding reference to it.
    fn evict_over_capacity(&self) {
        if self.handles.len() <= self.max_loaded {
            return;
        }
        let mut by_age: Vec<(TenantId, u64)> = self
            .handles
            .iter()
            .map(|e| (e.key().clone(), e.value().last_access_ms.load(Ordering::Relaxed)))
            .collect();
        by_age.sort_by_key(|(_, at)| *at);

        for (tenant, _) in by_age {
            if self.handles.len() <= self.max_loaded {
                break;
            }
            self.try_evict(&tenant);
        }
    }

    fn try_evict(&self, tenant: &str) -> bool {
        // remove_if holds the shard lock during the predicate, so no task
        // can clone the handle between the checks and the removal.
        let removed = self
            .handles
            .remove_if(tenant, |_, cached| {
                Arc::strong_count(&cached.handle) == 1 && cached.handle.try_write().is_ok()
            })
            .is_some();
        if removed {
            tracing::debug!(tenant, "evicted idle tenant handle");
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn chunks(texts: &[&str]) -> Vec<Chunk> {
        texts
            .iter()
            .enumerate()
            .map(|(seq, t)| Chunk {
                seq,
                text: (*t).to_owned(),
                document_id: "doc".into(),
            })
            .collect()
    }

    fn fs_store(tmp: &TempDir) -> Arc<TenantVectorStore> {
        TenantVectorStore::new(Arc::new(FsBlobStore::new(tmp.path())))
    }

    #[tokio::test]
    async fn add_then_search() {
        let tmp = TempDir::new().unwrap();
        let store = fs_store(&tmp);
        store
            .add(
                "acme",
                &chunks(&["paris", "rome"]),
                &[vec![1.0, 0.0], vec![0.0, 1.0]],
            )
            .await
            .unwrap();

        let hits = store.search("acme", &[0.9, 0.1], 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].text, "paris");
        assert!(hits[0].distance <= hits[1].distance);
        assert!(hits[0].distance >= 0.0);
    }

    #[tokio::test]
    async fn search_without_index_is_empty() {
        let tmp = TempDir::new().unwrap();
        let store = fs_store(&tmp);
        let hits = store.search("nobody", &[1.0, 0.0], 5).await.unwrap();
        assert!(hits.is_empty());
        assert_eq!(store.chunk_count("nobody").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn dimension_is_pinned_by_first_add() {
        let tmp = TempDir::new().unwrap();
        let store = fs_store(&tmp);
        store
            .add("acme", &chunks(&["a"]), &[vec![1.0, 0.0, 0.0]])
            .await
            .unwrap();

        let err = store
            .add("acme", &chunks(&["b"]), &[vec![1.0, 0.0]])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ShortstackError::IndexDimensionMismatch {
                expected: 3,
                got: 2
            }
        ));
        // Nothing mutated.
        assert_eq!(store.chunk_count("acme").await.unwrap(), 1);

        let err = store.search("acme", &[1.0, 0.0], 1).await.unwrap_err();
        assert!(matches!(err, ShortstackError::IndexDimensionMismatch { .. }));
    }

    #[tokio::test]
    async fn mismatched_chunk_vector_lengths_rejected() {
        let tmp = TempDir::new().unwrap();
        let store = fs_store(&tmp);
        let err = store
            .add("acme", &chunks(&["a", "b"]), &[vec![1.0, 0.0]])
            .await
            .unwrap_err();
        assert!(matches!(err, ShortstackError::InvalidConfig(_)));
    }

    #[tokio::test]
    async fn state_survives_reload_from_blob() {
        let tmp = TempDir::new().unwrap();
        {
            let store = fs_store(&tmp);
            store
                .add(
                    "acme",
                    &chunks(&["paris", "rome"]),
                    &[vec![1.0, 0.0], vec![0.0, 1.0]],
                )
                .await
                .unwrap();
        }
        // Fresh store over the same blobs, as after a restart.
        let store = fs_store(&tmp);
        let hits = store.search("acme", &[0.0, 1.0], 1).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].text, "rome");
        assert_eq!(store.chunk_count("acme").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn generations_accumulate_across_adds() {
        let tmp = TempDir::new().unwrap();
        let store = fs_store(&tmp);
        store
            .add("acme", &chunks(&["one"]), &[vec![1.0, 0.0]])
            .await
            .unwrap();
        let total = store
            .add("acme", &chunks(&["two"]), &[vec![0.0, 1.0]])
            .await
            .unwrap();
        assert_eq!(total, 2);

        let store2 = fs_store(&tmp);
        assert_eq!(store2.chunk_count("acme").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn lru_eviction_and_reload() {
        let tmp = TempDir::new().unwrap();
        let store =
            TenantVectorStore::with_max_loaded(Arc::new(FsBlobStore::new(tmp.path())), 1);

        store
            .add("alpha", &chunks(&["a"]), &[vec![1.0, 0.0]])
            .await
            .unwrap();
        store
            .add("beta", &chunks(&["b"]), &[vec![0.0, 1.0]])
            .await
            .unwrap();
        assert_eq!(store.loaded_tenants(), 1);

        // Evicted tenant reloads transparently.
        let hits = store.search("alpha", &[1.0, 0.0], 1).await.unwrap();
        assert_eq!(hits[0].text, "a");
    }

    #[tokio::test]
    async fn unload_refuses_while_referenced() {
        let tmp = TempDir::new().unwrap();
        let store = fs_store(&tmp);
        store
            .add("acme", &chunks(&["a"]), &[vec![1.0, 0.0]])
            .await
            .unwrap();

        let cached = store.handles.get("acme").map(|e| Arc::clone(&e.handle)).unwrap();
        let _guard = cached.write().await;
        assert!(!store.unload("acme"), "must not evict a locked handle");
        drop(_guard);
        drop(cached);
        assert!(store.unload("acme"));
    }

    #[tokio::test]
    async fn tenant_isolation() {
        let tmp = TempDir::new().unwrap();
        let store = fs_store(&tmp);
        store
            .add("alpha", &chunks(&["alpha text"]), &[vec![1.0, 0.0]])
            .await
            .unwrap();
        store
            .add("beta", &chunks(&["beta text"]), &[vec![1.0, 0.0]])
            .await
            .unwrap();

        let hits = store.search("alpha", &[1.0, 0.0], 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].text, "alpha text");
    }

    #[tokio::test]
    async fn concurrent_adds_same_tenant_lose_nothing() {
        let tmp = TempDir::new().unwrap();
        let store = fs_store(&tmp);

        let mut handles = Vec::new();
        for i in 0..8 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                let text = format!("chunk {i}");
                store
                    .add("acme", &chunks(&[text.as_str()]), &[vec![i as f32, 1.0]])
                    .await
                    .unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(store.chunk_count("acme").await.unwrap(), 8);

        // Durable state agrees.
        let store2 = fs_store(&tmp);
        assert_eq!(store2.chunk_count("acme").await.unwrap(), 8);
    }

    #[tokio::test]
    async fn concurrent_adds_under_cache_pressure_lose_nothing() {
        let tmp = TempDir::new().unwrap();
        // Cap of 1 forces eviction on nearly every access, so freshly
        // inserted handles are under eviction pressure while in use.
        let store =
            TenantVectorStore::with_max_loaded(Arc::new(FsBlobStore::new(tmp.path())), 1);

        let tenants = ["alpha", "beta", "gamma"];
        let mut tasks = Vec::new();
        for tenant in tenants {
            let store = Arc::clone(&store);
            tasks.push(tokio::spawn(async move {
                for i in 0..5 {
                    let text = format!("{tenant} chunk {i}");
                    store
                        .add(tenant, &chunks(&[text.as_str()]), &[vec![i as f32, 1.0]])
                        .await
                        .unwrap();
                }
            }));
        }
        for t in tasks {
            t.await.unwrap();
        }

        for tenant in tenants {
            assert_eq!(store.chunk_count(tenant).await.unwrap(), 5, "{tenant}");
        }
        // Durable state agrees after a cold reload.
        let store2 = fs_store(&tmp);
        for tenant in tenants {
            assert_eq!(store2.chunk_count(tenant).await.unwrap(), 5, "{tenant}");
        }
    }

    // ── persistence failure leaves state untouched ──

    struct FailingBlobStore {
        inner: FsBlobStore,
        fail_puts: std::sync::atomic::AtomicBool,
    }

    #[async_trait::async_trait]
    impl BlobStore for FailingBlobStore {
        async fn put(&self, path: &str, bytes: &[u8]) -> Result<()> {
            if self.fail_puts.load(Ordering::SeqCst) {
                return Err(ShortstackError::Storage("injected put failure".into()));
            }
            self.inner.put(path, bytes).await
        }

        async fn get(&self, path: &str) -> Result<Option<Vec<u8>>> {
            self.inner.get(path).await
        }
    }

    #[tokio::test]
    async fn failed_persistence_mutates_nothing() {
        let tmp = TempDir::new().unwrap();
        let blob = Arc::new(FailingBlobStore {
            inner: FsBlobStore::new(tmp.path()),
            fail_puts: std::sync::atomic::AtomicBool::new(false),
        });
        let store = TenantVectorStore::new(Arc::clone(&blob) as Arc<dyn BlobStore>);

        store
            .add("acme", &chunks(&["stable"]), &[vec![1.0, 0.0]])
            .await
            .unwrap();

        blob.fail_puts.store(true, Ordering::SeqCst);
        let err = store
            .add("acme", &chunks(&["lost"]), &[vec![0.0, 1.0]])
            .await
            .unwrap_err();
        assert!(matches!(err, ShortstackError::Storage(_)));

        // In-memory state unchanged.
        let hits = store.search("acme", &[0.0, 1.0], 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].text, "stable");

        // Durable state unchanged.
        blob.fail_puts.store(false, Ordering::SeqCst);
        let store2 = fs_store(&tmp);
        assert_eq!(store2.chunk_count("acme").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn invalid_tenant_key_rejected() {
        let tmp = TempDir::new().unwrap();
        let store = fs_store(&tmp);
        assert!(store.search("", &[1.0], 1).await.is_err());
        assert!(store.search("a/b", &[1.0], 1).await.is_err());
        assert!(store
            .add("..", &chunks(&["x"]), &[vec![1.0]])
            .await
            .is_err());
    }
}
