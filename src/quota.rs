//! Per-tier usage budgets.
//!
//! Check-and-increment is atomic per `(tenant, resource)`: the counter is
//! mutated under its map entry's shard lock, so concurrent requests can
//! never admit more than the limit. Period boundaries reset lazily on the
//! first access past the boundary; there is no background sweep to
//! drift.

use chrono::{DateTime, Datelike, TimeZone, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::config::{QuotaPeriod, TierConfig};
use crate::error::{Result, ShortstackError};
use crate::types::TenantId;

/// Budgeted resource kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuotaResource {
    Ingestion,
    Query,
}

impl std::fmt::Display for QuotaResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QuotaResource::Ingestion => write!(f, "ingestion"),
            QuotaResource::Query => write!(f, "query"),
        }
    }
}

#[derive(Debug)]
struct QuotaCounter {
    period_start: DateTime<Utc>,
    count: u32,
}

/// Start of the period containing `now`.
fn period_start(period: QuotaPeriod, now: DateTime<Utc>) -> DateTime<Utc> {
    match period {
        QuotaPeriod::Daily => Utc
            .with_ymd_and_hms(now.year(), now.month(), now.day(), 0, 0, 0)
            .single()
            .unwrap_or(now),
        QuotaPeriod::Monthly => Utc
            .with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
            .single()
            .unwrap_or(now),
    }
}

/// Enforces per-tier ingestion and query budgets.
#[derive(Debug, Default)]
pub struct QuotaGuard {
    counters: DashMap<(TenantId, QuotaResource), QuotaCounter>,
}

impl QuotaGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume `amount` units of `resource` for `tenant`, or fail with
    /// [`ShortstackError::QuotaExceeded`] without consuming anything.
    pub fn try_consume(
        &self,
        tenant: &str,
        resource: QuotaResource,
        amount: u32,
        config: &TierConfig,
    ) -> Result<()> {
        self.try_consume_at(tenant, resource, amount, config, Utc::now())
    }

    /// Clock-injected variant; `try_consume` passes the current time.
    pub fn try_consume_at(
        &self,
        tenant: &str,
        resource: QuotaResource,
        amount: u32,
        config: &TierConfig,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let limit = match resource {
            QuotaResource::Ingestion => config.ingest_limit,
            QuotaResource::Query => config.query_limit,
        };
        let current_start = period_start(config.period, now);

        let mut counter = self
            .counters
            .entry((tenant.to_owned(), resource))
            .or_insert_with(|| QuotaCounter {
                period_start: current_start,
                count: 0,
            });

        if counter.period_start < current_start {
            counter.period_start = current_start;
            counter.count = 0;
        }

        match counter.count.checked_add(amount) {
            Some(next) if next <= limit => {
                counter.count = next;
                Ok(())
            }
            _ => {
                tracing::debug!(tenant, %resource, limit, "quota denied");
                Err(ShortstackError::QuotaExceeded { resource, limit })
            }
        }
    }

    /// Current usage in the period containing `now`; 0 if never consumed
    /// or the period rolled over.
    pub fn usage_at(
        &self,
        tenant: &str,
        resource: QuotaResource,
        period: QuotaPeriod,
        now: DateTime<Utc>,
    ) -> u32 {
        self.counters
            .get(&(tenant.to_owned(), resource))
            .map(|c| {
                if c.period_start < period_start(period, now) {
                    0
                } else {
                    c.count
                }
            })
            .unwrap_or(0)
    }
}
