//! Shortstack: tenant-isolated retrieval-augmented query pipeline.
//!
//! Documents are chunked, embedded through an OpenAI-compatible API, and
//! indexed into per-tenant HNSW vector indexes persisted as blobs. The
//! [`QueryPipeline`] answers questions by embedding the query, searching
//! the tenant's index, and generating an answer grounded in the matched
//! chunks. Usage is budgeted per subscription tier.
//!
//! ```no_run
//! # async fn demo() -> shortstack::Result<()> {
//! use std::sync::Arc;
//! use shortstack::{
//!     FsBlobStore, MemoryMetadataStore, MemorySink, QueryPipeline,
//!     RestEmbeddingProvider, RestGenerationProvider, TenantVectorStore, Tier,
//! };
//!
//! let store = TenantVectorStore::new(Arc::new(FsBlobStore::new("/var/lib/shortstack")));
//! let metadata = Arc::new(MemoryMetadataStore::new());
//! metadata.set_tier("acme", Tier::Starter);
//!
//! let pipeline = QueryPipeline::new(
//!     store,
//!     Arc::new(RestEmbeddingProvider::new(
//!         "https://api.openai.com",
//!         "sk-...",
//!         1536,
//!     )?),
//!     Arc::new(RestGenerationProvider::new("https://api.openai.com", "sk-...")?),
//!     metadata,
//!     Arc::new(MemorySink::new()),
//! );
//!
//! pipeline.ingest("acme", "doc-1", "Paris is the capital of France.").await;
//! let response = pipeline.ask("acme", "What is the capital of France?").await;
//! # Ok(())
//! # }
//! ```

pub mod analytics;
pub mod chunker;
pub mod config;
pub mod error;
pub mod metadata;
pub mod pipeline;
pub mod providers;
pub mod quota;
pub mod store;
pub mod types;

pub use analytics::{AnalyticsEvent, AnalyticsSink, MemorySink};
pub use config::{QuotaPeriod, Tier, TierConfig};
pub use error::{Result, ShortstackError};
pub use metadata::{MemoryMetadataStore, MetadataStore};
pub use pipeline::QueryPipeline;
pub use providers::{
    EmbeddingProvider, GenerationProvider, RestEmbeddingProvider, RestGenerationProvider,
};
pub use quota::{QuotaGuard, QuotaResource};
#[cfg(feature = "s3-snapshots")]
pub use store::S3BlobStore;
pub use store::{BlobStore, FsBlobStore, TenantVectorStore};
pub use types::{
    AskResponse, AskStatus, Chunk, DocumentStatus, IngestReport, SearchHit,
};
