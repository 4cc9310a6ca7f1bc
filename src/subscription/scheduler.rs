//! Renewal scheduler.
//!
//! # Responsibilities
//! - Refresh every slot, one at a time, with spacing between slots
//! - Keep the last good payload when a refresh fails
//! - Pick the next sleep: short while any slot is empty, long otherwise
//!
//! # Design Decisions
//! - The first pass runs immediately at startup
//! - The loop has no exit; failures only shorten the next interval

use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;

use crate::config::RenewalConfig;
use crate::observability::metrics;
use crate::subscription::provisioner::Provisioner;
use crate::subscription::store::SubscriptionStore;

/// Two-level interval policy plus inter-slot spacing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenewalPolicy {
    pub normal_interval: Duration,
    pub retry_interval: Duration,
    pub slot_spacing: Duration,
}

impl RenewalPolicy {
    pub fn from_config(config: &RenewalConfig) -> Self {
        Self {
            normal_interval: Duration::from_secs(config.normal_interval_secs),
            retry_interval: Duration::from_secs(config.retry_interval_secs),
            slot_spacing: Duration::from_secs(config.slot_spacing_secs),
        }
    }

    /// Retry interval if any slot is still empty, normal interval otherwise.
    pub fn next_interval(&self, store: &SubscriptionStore) -> Duration {
        if store.any_absent() {
            self.retry_interval
        } else {
            self.normal_interval
        }
    }
}

/// Outcome counts of one pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassSummary {
    pub refreshed: usize,
    pub failed: usize,
}

pub struct RenewalScheduler {
    store: Arc<SubscriptionStore>,
    provisioner: Arc<dyn Provisioner>,
    policy: RenewalPolicy,
}

impl RenewalScheduler {
    pub fn new(
        store: Arc<SubscriptionStore>,
        provisioner: Arc<dyn Provisioner>,
        policy: RenewalPolicy,
    ) -> Self {
        Self {
            store,
            provisioner,
            policy,
        }
    }

    /// Refresh every slot once, in index order.
    pub async fn run_pass(&self) -> PassSummary {
        let mut summary = PassSummary::default();

        for index in 0..self.store.len() {
            if index > 0 && !self.policy.slot_spacing.is_zero() {
                sleep(self.policy.slot_spacing).await;
            }

            match self.provisioner.provision(index).await {
                Ok(payload) => {
                    let size = payload.len();
                    self.store.set(index, payload);
                    summary.refreshed += 1;
                    metrics::record_refresh(index, "refreshed");
                    tracing::info!(slot = index, bytes = size, "Subscription refreshed");
                }
                Err(e) => {
                    summary.failed += 1;
                    metrics::record_refresh(index, e.kind());
                    tracing::warn!(
                        slot = index,
                        kind = e.kind(),
                        error = %e,
                        kept_previous = self.store.get(index).is_some(),
                        "Subscription refresh failed"
                    );
                }
            }
        }

        summary
    }

    /// Run passes forever.
    pub async fn run(self) {
        tracing::info!(
            slots = self.store.len(),
            normal_interval = ?self.policy.normal_interval,
            retry_interval = ?self.policy.retry_interval,
            "Renewal scheduler started"
        );

        loop {
            let summary = self.run_pass().await;
            let next = self.policy.next_interval(&self.store);
            tracing::info!(
                refreshed = summary.refreshed,
                failed = summary.failed,
                next_in = ?next,
                "Renewal pass complete"
            );
            sleep(next).await;
        }
    }
}
