use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::agent::{DispatchUnit, ExecutionAgent};
use crate::metrics;
use crate::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BufferConfig {
    pub max_size: usize,
    pub max_attempts: u32,
    pub flush_interval_seconds: u64,
    pub expire_after_hours: i64,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            max_size: 1000,
            max_attempts: 3,
            flush_interval_seconds: 10,
            expire_after_hours: 24,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryState {
    Pending,
    Delivering,
    Delivered,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct BufferedAlert {
    pub unit: DispatchUnit,
    pub received_at: DateTime<Utc>,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub state: DeliveryState,
    // Tie-breaker for FIFO ordering when receipt timestamps collide.
    #[serde(skip)]
    pub(crate) seq: u64,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct BufferStats {
    pub total: u64,
    pub buffered: usize,
    pub delivered: u64,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct FlushReport {
    pub attempted: usize,
    pub delivered: usize,
    pub failed: usize,
    pub exhausted: usize,
    pub skipped: bool,
}

#[derive(Default)]
struct BufferInner {
    entries: HashMap<String, BufferedAlert>,
    enqueued_total: u64,
    delivered_total: u64,
}

// Holding area for alerts whose forward to the execution agent failed. All
// mutation goes through enqueue/flush/purge; reads take a copy snapshot.
pub struct DeliveryBuffer {
    config: BufferConfig,
    inner: RwLock<BufferInner>,
}

impl DeliveryBuffer {
    pub fn new(config: BufferConfig) -> Self {
        Self {
            config,
            inner: RwLock::new(BufferInner::default()),
        }
    }

    // Idempotent per dispatch id: re-enqueueing an existing entry records the
    // additional failed forward instead of duplicating it.
    pub async fn enqueue(
        &self,
        unit: DispatchUnit,
        reason: impl Into<String>,
    ) -> Result<BufferedAlert> {
        let reason = reason.into();
        let mut inner = self.inner.write().await;

        if let Some(existing) = inner.entries.get_mut(&unit.dispatch_id) {
            existing.attempts += 1;
            existing.last_error = Some(reason);
            return Ok(existing.clone());
        }

        if inner.entries.len() >= self.config.max_size {
            return Err(Error::Buffer(format!(
                "delivery buffer is full ({} entries), dropping dispatch {}",
                self.config.max_size, unit.dispatch_id
            )));
        }

        let entry = BufferedAlert {
            unit,
            received_at: Utc::now(),
            attempts: 0,
            last_error: Some(reason),
            state: DeliveryState::Pending,
            seq: inner.enqueued_total,
        };

        info!(
            dispatch_id = %entry.unit.dispatch_id,
            alert_name = %entry.unit.alert_name,
            cluster_context = %entry.unit.cluster_context,
            "Buffered alert for later delivery"
        );

        inner.entries.insert(entry.unit.dispatch_id.clone(), entry.clone());
        inner.enqueued_total += 1;
        Ok(entry)
    }

    // Attempts delivery of all pending entries, oldest first. One entry's
    // failure never aborts the rest; each state transition is atomic.
    pub async fn flush(&self, agent: &dyn ExecutionAgent) -> FlushReport {
        let mut report = FlushReport::default();

        if !agent.is_available().await {
            report.skipped = true;
            return report;
        }

        // One entry at a time, oldest pending first. Claiming an entry moves
        // it to Delivering under the write lock, so a concurrent flush cannot
        // pick it up; the lock is never held across the network call.
        let mut seen: HashSet<String> = HashSet::new();

        loop {
            let claimed: Option<DispatchUnit> = {
                let mut inner = self.inner.write().await;
                inner
                    .entries
                    .values_mut()
                    .filter(|entry| {
                        entry.state == DeliveryState::Pending
                            && !seen.contains(&entry.unit.dispatch_id)
                    })
                    .min_by_key(|entry| (entry.received_at, entry.seq))
                    .map(|entry| {
                        entry.state = DeliveryState::Delivering;
                        entry.unit.clone()
                    })
            };

            let Some(unit) = claimed else { break };
            seen.insert(unit.dispatch_id.clone());
            report.attempted += 1;

            match agent.submit_unit(&unit).await {
                Ok(()) => {
                    let mut inner = self.inner.write().await;
                    inner.entries.remove(&unit.dispatch_id);
                    inner.delivered_total += 1;
                    report.delivered += 1;
                    metrics::ALERTS_DELIVERED_TOTAL.inc();

                    info!(
                        dispatch_id = %unit.dispatch_id,
                        alert_name = %unit.alert_name,
                        "Delivered buffered alert"
                    );
                }
                Err(e) => {
                    let mut inner = self.inner.write().await;
                    if let Some(entry) = inner.entries.get_mut(&unit.dispatch_id) {
                        entry.attempts += 1;
                        entry.last_error = Some(e.to_string());

                        if entry.attempts >= self.config.max_attempts {
                            entry.state = DeliveryState::Failed;
                            report.exhausted += 1;
                            metrics::ALERTS_EXHAUSTED_TOTAL.inc();

                            warn!(
                                dispatch_id = %unit.dispatch_id,
                                attempts = entry.attempts,
                                "Alert exhausted its delivery attempts"
                            );
                        } else {
                            entry.state = DeliveryState::Pending;
                            report.failed += 1;
                        }
                    }
                }
            }
        }

        report
    }

    pub async fn stats(&self) -> BufferStats {
        let inner = self.inner.read().await;

        let mut buffered = 0;
        let mut failed = 0;
        for entry in inner.entries.values() {
            match entry.state {
                DeliveryState::Pending | DeliveryState::Delivering => buffered += 1,
                DeliveryState::Failed => failed += 1,
                DeliveryState::Delivered => {}
            }
        }

        BufferStats {
            total: inner.enqueued_total,
            buffered,
            delivered: inner.delivered_total,
            failed,
        }
    }

    // Snapshot, ordered by receipt time. The lock is held only while copying.
    pub async fn list(&self) -> Vec<BufferedAlert> {
        let mut entries: Vec<BufferedAlert> = {
            let inner = self.inner.read().await;
            inner.entries.values().cloned().collect()
        };
        entries.sort_by_key(|entry| (entry.received_at, entry.seq));
        entries
    }

    // Failed entries stay visible in list/stats until purged here.
    pub async fn purge_failed(&self) -> usize {
        let mut inner = self.inner.write().await;
        let before = inner.entries.len();
        inner.entries.retain(|_, entry| entry.state != DeliveryState::Failed);
        before - inner.entries.len()
    }

    // Drops entries older than the configured age so a dead downstream does
    // not grow the buffer without bound.
    pub async fn expire_stale(&self) -> usize {
        let cutoff = Utc::now() - ChronoDuration::hours(self.config.expire_after_hours);
        let mut inner = self.inner.write().await;
        let before = inner.entries.len();
        inner.entries.retain(|dispatch_id, entry| {
            let keep = entry.received_at > cutoff || entry.state == DeliveryState::Delivering;
            if !keep {
                warn!(%dispatch_id, "Expiring stale buffered alert");
            }
            keep
        });
        before - inner.entries.len()
    }

    pub fn start_background_flush(self: &Arc<Self>, agent: Arc<dyn ExecutionAgent>) {
        let buffer = Arc::clone(self);
        let interval = std::time::Duration::from_secs(self.config.flush_interval_seconds);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;

                let expired = buffer.expire_stale().await;
                if expired > 0 {
                    info!(expired, "Removed expired alerts from delivery buffer");
                }

                let report = buffer.flush(agent.as_ref()).await;
                if report.attempted > 0 {
                    info!(
                        delivered = report.delivered,
                        failed = report.failed,
                        exhausted = report.exhausted,
                        "Background flush completed"
                    );
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::MockExecutionAgent;
    use crate::alert::AlertStatus;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::Mutex;

    fn unit(dispatch_id: &str) -> DispatchUnit {
        DispatchUnit {
            dispatch_id: dispatch_id.to_string(),
            alert_name: "CrateDBContainerRestart".to_string(),
            status: AlertStatus::Firing,
            namespace: "cratedb-prod".to_string(),
            pod: "crate-data-hot-0".to_string(),
            cluster_context: "aks1-eastus-dev".to_string(),
            labels: HashMap::new(),
            annotations: HashMap::new(),
            correlation_id: "corr-1".to_string(),
        }
    }

    // Records delivery order and fails the configured dispatch ids.
    struct RecordingAgent {
        calls: Mutex<Vec<String>>,
        fail_ids: HashSet<String>,
    }

    impl RecordingAgent {
        fn failing(ids: &[&str]) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                fail_ids: ids.iter().map(|s| s.to_string()).collect(),
            }
        }
    }

    #[async_trait]
    impl ExecutionAgent for RecordingAgent {
        async fn submit_unit(&self, unit: &DispatchUnit) -> crate::Result<()> {
            self.calls.lock().unwrap().push(unit.dispatch_id.clone());
            if self.fail_ids.contains(&unit.dispatch_id) {
                return Err(Error::Agent("simulated delivery failure".to_string()));
            }
            Ok(())
        }

        async fn is_available(&self) -> bool {
            true
        }
    }

    #[tokio::test]
    async fn enqueue_is_idempotent_per_dispatch_id() {
        let buffer = DeliveryBuffer::new(BufferConfig::default());

        let first = buffer.enqueue(unit("d-1"), "connection refused").await.unwrap();
        assert_eq!(first.attempts, 0);

        let second = buffer.enqueue(unit("d-1"), "still refused").await.unwrap();
        assert_eq!(second.attempts, 1);
        assert_eq!(second.last_error.as_deref(), Some("still refused"));

        assert_eq!(buffer.list().await.len(), 1);
    }

    #[tokio::test]
    async fn failed_flush_leaves_entry_pending_with_one_attempt() {
        let buffer = DeliveryBuffer::new(BufferConfig::default());
        buffer.enqueue(unit("d-1"), "agent unreachable").await.unwrap();

        let mut agent = MockExecutionAgent::new();
        agent.expect_is_available().returning(|| true);
        agent
            .expect_submit_unit()
            .returning(|_| Err(Error::Agent("connection refused".to_string())));

        let report = buffer.flush(&agent).await;
        assert_eq!(report.attempted, 1);
        assert_eq!(report.delivered, 0);
        assert_eq!(report.failed, 1);

        let stats = buffer.stats().await;
        assert_eq!(stats.failed, 0);
        assert_eq!(stats.buffered, 1);

        let entries = buffer.list().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].attempts, 1);
        assert_eq!(entries[0].state, DeliveryState::Pending);
    }

    #[tokio::test]
    async fn flush_is_fifo_and_partial_failure_tolerant() {
        let buffer = DeliveryBuffer::new(BufferConfig::default());
        buffer.enqueue(unit("d-1"), "down").await.unwrap();
        buffer.enqueue(unit("d-2"), "down").await.unwrap();
        buffer.enqueue(unit("d-3"), "down").await.unwrap();

        let agent = RecordingAgent::failing(&["d-2"]);
        let report = buffer.flush(&agent).await;

        assert_eq!(report.attempted, 3);
        assert_eq!(report.delivered, 2);
        assert_eq!(report.failed, 1);

        // Oldest first, and the middle failure did not stop the third entry.
        let calls = agent.calls.lock().unwrap().clone();
        assert_eq!(calls, vec!["d-1", "d-2", "d-3"]);

        let entries = buffer.list().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].unit.dispatch_id, "d-2");
    }

    #[tokio::test]
    async fn flush_skips_when_agent_unavailable() {
        let buffer = DeliveryBuffer::new(BufferConfig::default());
        buffer.enqueue(unit("d-1"), "down").await.unwrap();

        let mut agent = MockExecutionAgent::new();
        agent.expect_is_available().returning(|| false);
        agent.expect_submit_unit().never();

        let report = buffer.flush(&agent).await;
        assert!(report.skipped);
        assert_eq!(report.attempted, 0);
        assert_eq!(buffer.stats().await.buffered, 1);
    }

    #[tokio::test]
    async fn retry_ceiling_moves_entry_to_failed_and_out_of_flush() {
        let config = BufferConfig {
            max_attempts: 2,
            ..BufferConfig::default()
        };
        let buffer = DeliveryBuffer::new(config);
        buffer.enqueue(unit("d-1"), "down").await.unwrap();

        let mut agent = MockExecutionAgent::new();
        agent.expect_is_available().returning(|| true);
        agent
            .expect_submit_unit()
            .times(2)
            .returning(|_| Err(Error::Agent("still down".to_string())));

        let first = buffer.flush(&agent).await;
        assert_eq!(first.failed, 1);
        assert_eq!(first.exhausted, 0);

        let second = buffer.flush(&agent).await;
        assert_eq!(second.exhausted, 1);

        // Failed entries are excluded from flushing but stay introspectable.
        let third = buffer.flush(&agent).await;
        assert_eq!(third.attempted, 0);

        let stats = buffer.stats().await;
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.buffered, 0);
        assert_eq!(buffer.list().await.len(), 1);

        assert_eq!(buffer.purge_failed().await, 1);
        assert!(buffer.list().await.is_empty());
    }

    #[tokio::test]
    async fn dispatch_id_is_stable_across_retries() {
        let buffer = DeliveryBuffer::new(BufferConfig::default());
        buffer.enqueue(unit("d-stable"), "down").await.unwrap();

        let agent = RecordingAgent::failing(&["d-stable"]);
        buffer.flush(&agent).await;
        buffer.flush(&agent).await;

        let calls = agent.calls.lock().unwrap().clone();
        assert_eq!(calls, vec!["d-stable", "d-stable"]);
    }

    #[tokio::test]
    async fn enqueue_refuses_new_entries_when_full() {
        let config = BufferConfig {
            max_size: 1,
            ..BufferConfig::default()
        };
        let buffer = DeliveryBuffer::new(config);
        buffer.enqueue(unit("d-1"), "down").await.unwrap();

        assert!(matches!(
            buffer.enqueue(unit("d-2"), "down").await,
            Err(Error::Buffer(_))
        ));
        // Existing ids still update at capacity.
        assert!(buffer.enqueue(unit("d-1"), "down again").await.is_ok());
    }

    #[tokio::test]
    async fn stats_on_empty_buffer_are_all_zero() {
        let buffer = DeliveryBuffer::new(BufferConfig::default());
        let stats = buffer.stats().await;

        assert_eq!(stats.total, 0);
        assert_eq!(stats.buffered, 0);
        assert_eq!(stats.delivered, 0);
        assert_eq!(stats.failed, 0);
        assert!(buffer.list().await.is_empty());
    }

    #[tokio::test]
    async fn expire_stale_removes_old_entries() {
        let config = BufferConfig {
            expire_after_hours: 0,
            ..BufferConfig::default()
        };
        let buffer = DeliveryBuffer::new(config);
        buffer.enqueue(unit("d-1"), "down").await.unwrap();

        // With a zero-hour horizon everything already buffered is stale.
        assert_eq!(buffer.expire_stale().await, 1);
        assert!(buffer.list().await.is_empty());
    }
}
