//! Interface to the surrounding product's tenant/document metadata store.
//!
//! The pipeline consumes tenant tier resolution and reports document
//! status transitions; everything else about account management lives
//! outside this crate.

use async_trait::async_trait;
use dashmap::DashMap;

use crate::config::Tier;
use crate::error::{Result, ShortstackError};
use crate::types::{DocumentId, DocumentStatus, TenantId};

#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Resolve a tenant key to its subscription tier.
    async fn tier(&self, tenant: &str) -> Result<Tier>;

    /// Record a document status transition (`processing → completed |
    /// failed`).
    async fn record_document_status(
        &self,
        tenant: &str,
        document_id: &str,
        status: DocumentStatus,
    ) -> Result<()>;
}

/// In-memory metadata store for tests and embedded use.
#[derive(Debug, Default)]
pub struct MemoryMetadataStore {
    tiers: DashMap<TenantId, Tier>,
    documents: DashMap<(TenantId, DocumentId), DocumentStatus>,
}

impl MemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_tier(&self, tenant: &str, tier: Tier) {
        self.tiers.insert(tenant.to_owned(), tier);
    }

    pub fn document_status(&self, tenant: &str, document_id: &str) -> Option<DocumentStatus> {
        self.documents
            .get(&(tenant.to_owned(), document_id.to_owned()))
            .map(|s| *s)
    }
}

#[async_trait]
impl MetadataStore for MemoryMetadataStore {
    async fn tier(&self, tenant: &str) -> Result<Tier> {
        self.tiers
            .get(tenant)
            .map(|t| *t)
            .ok_or_else(|| ShortstackError::InvalidConfig(format!("unknown tenant: {tenant}")))
    }

    async fn record_document_status(
        &self,
        tenant: &str,
        document_id: &str,
        status: DocumentStatus,
    ) -> Result<()> {
        self.documents
            .insert((tenant.to_owned(), document_id.to_owned()), status);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolves_configured_tier() {
        let store = MemoryMetadataStore::new();
        store.set_tier("acme", Tier::Pro);
        assert_eq!(store.tier("acme").await.unwrap(), Tier::Pro);
        assert!(store.tier("ghost").await.is_err());
    }

    #[tokio::test]
    async fn tracks_document_transitions() {
        let store = MemoryMetadataStore::new();
        store
            .record_document_status("acme", "doc1", DocumentStatus::Processing)
            .await
            .unwrap();
        store
            .record_document_status("acme", "doc1", DocumentStatus::Completed)
            .await
            .unwrap();
        assert_eq!(
            store.document_status("acme", "doc1"),
            Some(DocumentStatus::Completed)
        );
    }
}
