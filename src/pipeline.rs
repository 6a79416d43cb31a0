//! Query orchestrator: composes chunker, providers, store, and quotas
//! into the ingest and ask flows.
//!
//! Ask moves through `RECEIVED → QUOTA_CHECKED → QUERY_EMBEDDED →
//! SEARCHED → {NO_DOCUMENTS | CONTEXT_BUILT → GENERATED} → RESPONDED`.
//! Every terminal transition emits exactly one analytics event; sink
//! failures are logged and never change the response.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;

use crate::analytics::{AnalyticsEvent, AnalyticsSink};
use crate::chunker;
use crate::error::{Result, ShortstackError};
use crate::metadata::MetadataStore;
use crate::providers::{EmbeddingProvider, GenerationProvider};
use crate::quota::{QuotaGuard, QuotaResource};
use crate::store::TenantVectorStore;
use crate::types::{AskResponse, AskStatus, DocumentStatus, IngestReport};

const NO_DOCUMENTS_ANSWER: &str =
    "No documents have been uploaded for this chatbot yet, so there is nothing to answer from. \
     Upload a document and ask again.";

/// The tenant-isolated retrieval-augmented query pipeline.
pub struct QueryPipeline {
    store: Arc<TenantVectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    generator: Arc<dyn GenerationProvider>,
    metadata: Arc<dyn MetadataStore>,
    sink: Arc<dyn AnalyticsSink>,
    quota: QuotaGuard,
}

impl QueryPipeline {
    pub fn new(
        store: Arc<TenantVectorStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        generator: Arc<dyn GenerationProvider>,
        metadata: Arc<dyn MetadataStore>,
        sink: Arc<dyn AnalyticsSink>,
    ) -> Self {
        Self {
            store,
            embedder,
            generator,
            metadata,
            sink,
            quota: QuotaGuard::new(),
        }
    }

    /// Chunk, embed, and index one document for a tenant.
    ///
    /// Never returns an error: failures are reported through the
    /// `failed` status (and the metadata store's document transitions),
    /// since ingestion is driven by background workers that only care
    /// about the terminal status.
    pub async fn ingest(&self, tenant: &str, document_id: &str, text: &str) -> IngestReport {
        self.record_status(tenant, document_id, DocumentStatus::Processing)
            .await;

        match self.run_ingest(tenant, document_id, text).await {
            Ok(chunk_count) => {
                self.record_status(tenant, document_id, DocumentStatus::Completed)
                    .await;
                tracing::info!(tenant, document_id, chunk_count, "document ingested");
                IngestReport {
                    status: DocumentStatus::Completed,
                    chunk_count,
                    error: None,
                }
            }
            Err(e) => {
                self.record_status(tenant, document_id, DocumentStatus::Failed)
                    .await;
                tracing::warn!(tenant, document_id, error = %e, "ingest failed");
                IngestReport {
                    status: DocumentStatus::Failed,
                    chunk_count: 0,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    async fn run_ingest(&self, tenant: &str, document_id: &str, text: &str) -> Result<usize> {
        let tier = self.metadata.tier(tenant).await?;
        let config = tier.config();
        self.quota
            .try_consume(tenant, QuotaResource::Ingestion, 1, &config)?;

        let chunks = chunker::chunk(document_id, text, &config)?;
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self.embedder.embed(&config.embedding_model, &texts).await?;
        self.store.add(tenant, &chunks, &vectors).await?;
        Ok(chunks.len())
    }

    /// Answer a question from the tenant's documents.
    ///
    /// Always responds; pipeline failures surface as the `ERROR` status
    /// with the typed error's message attached. Exactly one analytics
    /// event is emitted per call.
    pub async fn ask(&self, tenant: &str, query: &str) -> AskResponse {
        let started = Instant::now();
        let response = match self.run_ask(tenant, query).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(tenant, error = %e, "ask failed");
                AskResponse {
                    answer: None,
                    matches: Vec::new(),
                    status: AskStatus::Error,
                    error: Some(e.to_string()),
                }
            }
        };
        let elapsed_ms = started.elapsed().as_millis() as u64;
        tracing::info!(tenant, status = ?response.status, elapsed_ms, "ask responded");

        let event = AnalyticsEvent {
            event_id: uuid::Uuid::new_v4(),
            tenant: tenant.to_owned(),
            query: query.to_owned(),
            answer: response.answer.clone(),
            elapsed_ms,
            status: response.status,
            timestamp: Utc::now(),
        };
        if let Err(e) = self.sink.record(event).await {
            // Best-effort: the response stands regardless.
            tracing::warn!(tenant, error = %e, "analytics event dropped");
        }
        response
    }

    async fn run_ask(&self, tenant: &str, query: &str) -> Result<AskResponse> {
        let tier = self.metadata.tier(tenant).await?;
        let config = tier.config();

        // RECEIVED → QUOTA_CHECKED. A denial costs no provider budget.
        self.quota
            .try_consume(tenant, QuotaResource::Query, 1, &config)?;

        // QUOTA_CHECKED → QUERY_EMBEDDED
        let mut vectors = self
            .embedder
            .embed(&config.embedding_model, &[query.to_owned()])
            .await?;
        let query_vector = vectors.pop().ok_or_else(|| {
            ShortstackError::EmbeddingProvider("provider returned no vector for query".into())
        })?;

        // QUERY_EMBEDDED → SEARCHED
        let matches = self
            .store
            .search(tenant, &query_vector, config.max_results)
            .await?;

        if matches.is_empty() {
            // SEARCHED → NO_DOCUMENTS
            return Ok(AskResponse {
                answer: Some(NO_DOCUMENTS_ANSWER.to_owned()),
                matches,
                status: AskStatus::NoDocuments,
                error: None,
            });
        }

        // SEARCHED → CONTEXT_BUILT → GENERATED
        let context: String = matches
            .iter()
            .map(|hit| hit.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        let answer = self
            .generator
            .generate(&config.generation_model, query, &context)
            .await?;

        Ok(AskResponse {
            answer: Some(answer),
            matches,
            status: AskStatus::Success,
            error: None,
        })
    }

    async fn record_status(&self, tenant: &str, document_id: &str, status: DocumentStatus) {
        if let Err(e) = self
            .metadata
            .record_document_status(tenant, document_id, status)
            .await
        {
            tracing::warn!(tenant, document_id, ?status, error = %e, "status update dropped");
        }
    }
}
