use std::sync::Arc;

use async_trait::async_trait;
use shortstack::{
    AnalyticsSink, EmbeddingProvider, FsBlobStore, GenerationProvider, MemoryMetadataStore,
    MemorySink, MetadataStore, QueryPipeline, Result, TenantVectorStore, Tier,
};
use tempfile::TempDir;

/// Keyword-axis embedder: one dimension per vocabulary word, 1.0 when the
/// word occurs in the lowercased text. Deterministic, so nearest-neighbor
/// assertions are stable.
pub const VOCAB: &[&str] = &[
    "paris", "france", "rome", "italy", "berlin", "germany", "capital", "river", "mountain",
    "pancake",
];

pub struct VocabEmbedder;

#[async_trait]
impl EmbeddingProvider for VocabEmbedder {
    fn dimensions(&self) -> usize {
        VOCAB.len()
    }

    async fn embed(&self, _model: &str, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|text| {
                let lowered = text.to_lowercase();
                VOCAB
                    .iter()
                    .map(|word| if lowered.contains(word) { 1.0 } else { 0.0 })
                    .collect()
            })
            .collect())
    }
}

/// Echoes the retrieved context so tests can assert the answer was
/// grounded in the right chunks.
pub struct EchoGenerator;

#[async_trait]
impl GenerationProvider for EchoGenerator {
    async fn generate(&self, _model: &str, _question: &str, context: &str) -> Result<String> {
        Ok(format!("Based on your documents: {context}"))
    }
}

#[allow(dead_code)]
pub struct Harness {
    pub pipeline: QueryPipeline,
    pub sink: Arc<MemorySink>,
    pub metadata: Arc<MemoryMetadataStore>,
    pub blob_root: TempDir,
}

/// Capture pipeline logs in test output; `RUST_LOG` controls verbosity.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[allow(dead_code)]
pub fn harness() -> Harness {
    init_tracing();
    let blob_root = TempDir::new().unwrap();
    let metadata = Arc::new(MemoryMetadataStore::new());
    let sink = Arc::new(MemorySink::new());
    let pipeline = pipeline_over(blob_root.path(), &metadata, &sink);
    Harness {
        pipeline,
        sink,
        metadata,
        blob_root,
    }
}

/// Build a pipeline over an existing blob root, sharing metadata and
/// sink. Used to simulate a process restart against the same storage.
#[allow(dead_code)]
pub fn pipeline_over(
    blob_root: &std::path::Path,
    metadata: &Arc<MemoryMetadataStore>,
    sink: &Arc<MemorySink>,
) -> QueryPipeline {
    let store = TenantVectorStore::new(Arc::new(FsBlobStore::new(blob_root)));
    QueryPipeline::new(
        store,
        Arc::new(VocabEmbedder),
        Arc::new(EchoGenerator),
        Arc::clone(metadata) as Arc<dyn MetadataStore>,
        Arc::clone(sink) as Arc<dyn AnalyticsSink>,
    )
}

#[allow(dead_code)]
pub fn register_tenant(harness: &Harness, tenant: &str, tier: Tier) {
    harness.metadata.set_tier(tenant, tier);
}
