//! Outcome events pushed to an external analytics sink.
//!
//! Delivery is best-effort: a sink failure is logged and never alters the
//! response already computed for the caller.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::{AskStatus, TenantId};

/// One record per terminal `ask` outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsEvent {
    pub event_id: uuid::Uuid,
    pub tenant: TenantId,
    pub query: String,
    /// `None` for `ERROR` outcomes.
    pub answer: Option<String>,
    pub elapsed_ms: u64,
    pub status: AskStatus,
    pub timestamp: DateTime<Utc>,
}

/// External analytics destination.
#[async_trait]
pub trait AnalyticsSink: Send + Sync {
    async fn record(&self, event: AnalyticsEvent) -> Result<()>;
}

/// In-memory sink for tests and local development.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: std::sync::Mutex<Vec<AnalyticsEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AnalyticsEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl AnalyticsSink for MemorySink {
    async fn record(&self, event: AnalyticsEvent) -> Result<()> {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
        Ok(())
    }
}
