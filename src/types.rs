use serde::{Deserialize, Serialize};

/// Tenant identifier: an opaque string scoping one document corpus and
/// one vector index.
pub type TenantId = String;
/// Source document identifier within a tenant's corpus.
pub type DocumentId = String;

/// A bounded span of a source document's text, used as the retrieval unit.
///
/// Immutable once produced by the chunker. `seq` is the chunk's position
/// within its source document, not within the tenant index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub seq: usize,
    pub text: String,
    pub document_id: DocumentId,
}

/// A single retrieval result: the stored chunk text and its squared
/// Euclidean distance from the query vector (non-negative, ascending =
/// more relevant).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub text: String,
    pub distance: f32,
}

/// Terminal outcome of an `ask` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AskStatus {
    Success,
    NoDocuments,
    Error,
}

/// Response to an `ask` request. `answer` is `None` only for `ERROR`
/// outcomes; `NO_DOCUMENTS` carries a canned answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AskResponse {
    pub answer: Option<String>,
    pub matches: Vec<SearchHit>,
    pub status: AskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Lifecycle of a document moving through ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Processing,
    Completed,
    Failed,
}

/// Outcome of an `ingest` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestReport {
    pub status: DocumentStatus,
    pub chunk_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
