//! Per-team usage counters.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use strata_types::TeamId;

use crate::error::{CoreError, CoreResult};

/// Sink for usage that billing reads later.
#[async_trait]
pub trait UsageMeter: Send + Sync {
    /// Add `bytes` of download bandwidth to `team` and return the new total.
    async fn record_bandwidth(&self, team: &TeamId, bytes: u64) -> CoreResult<u64>;

    async fn bandwidth(&self, team: &TeamId) -> CoreResult<u64>;
}

#[derive(Debug, Default)]
pub struct InMemoryUsageMeter {
    bandwidth: RwLock<HashMap<TeamId, u64>>,
}

impl InMemoryUsageMeter {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UsageMeter for InMemoryUsageMeter {
    async fn record_bandwidth(&self, team: &TeamId, bytes: u64) -> CoreResult<u64> {
        let mut counters = self
            .bandwidth
            .write()
            .map_err(|e| CoreError::Upstream(format!("lock poisoned: {e}")))?;
        let total = counters.entry(team.clone()).or_default();
        *total = total.saturating_add(bytes);
        Ok(*total)
    }

    async fn bandwidth(&self, team: &TeamId) -> CoreResult<u64> {
        let counters = self
            .bandwidth
            .read()
            .map_err(|e| CoreError::Upstream(format!("lock poisoned: {e}")))?;
        Ok(counters.get(team).copied().unwrap_or(0))
    }
}
