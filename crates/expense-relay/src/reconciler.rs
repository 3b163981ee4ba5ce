//! Drain of the durable buffer once the application is reachable.

use crate::channel::LOG_EXPENSE_METHOD;
use crate::{ChannelSlot, DeliveryChannel, DrainClearPolicy, DrainResult, RelayConfig, SharedLedger};
use pending_expense_store::{DurableBuffer, PendingExpense};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Signal that starts a drain pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DrainTrigger {
    /// The application returned to the foreground. Skipped when nothing is buffered.
    AppBecameActive,
    /// Explicit request to sync. Always runs.
    SyncRequested,
}

impl fmt::Display for DrainTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AppBecameActive => f.write_str("app_became_active"),
            Self::SyncRequested => f.write_str("sync_requested"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DrainOutcome {
    /// The channel was not ready after the settle delay; nothing touched.
    ChannelUnavailable,
    /// Nothing to deliver.
    Empty,
    /// Every record was tried and the clear policy applied.
    Completed,
}

/// Summary of one drain pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    pub trigger: DrainTrigger,
    pub outcome: DrainOutcome,
    /// Records sent to the channel.
    pub attempted: usize,
    pub delivered: usize,
    pub failed: usize,
    /// Records skipped because their id was already delivered.
    pub duplicates_skipped: usize,
    /// Stored entries removed by the clear policy.
    pub removed: usize,
}

impl DrainReport {
    fn new(trigger: DrainTrigger, outcome: DrainOutcome) -> Self {
        Self {
            trigger,
            outcome,
            attempted: 0,
            delivered: 0,
            failed: 0,
            duplicates_skipped: 0,
            removed: 0,
        }
    }
}

/// Walks the buffer in order and delivers each record once.
pub struct DrainReconciler {
    config: RelayConfig,
    channel: ChannelSlot,
    buffer: Arc<dyn DurableBuffer>,
    ledger: Option<SharedLedger>,
}

impl DrainReconciler {
    pub fn new(config: RelayConfig, channel: ChannelSlot, buffer: Arc<dyn DurableBuffer>) -> Self {
        Self {
            config,
            channel,
            buffer,
            ledger: None,
        }
    }

    /// Deduplicate against, and record deliveries in, the given ledger.
    pub fn with_ledger(mut self, ledger: SharedLedger) -> Self {
        self.ledger = Some(ledger);
        self
    }

    /// Run one pass. Callers must not run two passes on the same buffer at once.
    pub async fn drain(&self, trigger: DrainTrigger) -> DrainResult<DrainReport> {
        if trigger == DrainTrigger::AppBecameActive && self.buffer.is_empty()? {
            debug!(%trigger, "No pending expenses, skipping drain");
            return Ok(DrainReport::new(trigger, DrainOutcome::Empty));
        }

        tokio::time::sleep(self.config.settle_delay()).await;

        if !self.channel.is_ready().await {
            info!(%trigger, "Channel not ready, drain deferred");
            return Ok(DrainReport::new(trigger, DrainOutcome::ChannelUnavailable));
        }

        let records = self.buffer.read_all()?;
        if records.is_empty() {
            debug!(%trigger, "No pending expenses to drain");
            return Ok(DrainReport::new(trigger, DrainOutcome::Empty));
        }

        info!(%trigger, count = records.len(), "Draining pending expenses");
        let mut report = DrainReport::new(trigger, DrainOutcome::Completed);
        let mut delivered: Vec<PendingExpense> = Vec::with_capacity(records.len());

        for record in records {
            if self.already_delivered(&record) {
                debug!(id = %record.id, "Skipping already delivered expense");
                report.duplicates_skipped += 1;
                delivered.push(record);
                continue;
            }

            report.attempted += 1;
            match self.channel.invoke(LOG_EXPENSE_METHOD, record.to_payload()).await {
                Ok(_) => {
                    report.delivered += 1;
                    self.note_delivered(&record);
                    delivered.push(record);
                }
                Err(e) => {
                    report.failed += 1;
                    warn!(id = %record.id, error = %e, "Failed to sync pending expense");
                }
            }
        }

        report.removed = match self.config.clear_policy {
            DrainClearPolicy::ClearAll => {
                let stored = self.buffer.len()?;
                self.buffer.clear()?;
                if report.failed > 0 {
                    warn!(lost = report.failed, "Cleared buffer with undelivered expenses");
                }
                stored
            }
            DrainClearPolicy::RemoveDelivered => self.buffer.remove(&delivered)?,
        };

        info!(
            %trigger,
            attempted = report.attempted,
            delivered = report.delivered,
            failed = report.failed,
            duplicates = report.duplicates_skipped,
            removed = report.removed,
            "Drain complete"
        );
        Ok(report)
    }

    fn already_delivered(&self, record: &PendingExpense) -> bool {
        if !self.config.dedup_delivered_ids {
            return false;
        }
        match &self.ledger {
            Some(ledger) => ledger.lock().contains(&record.id, Instant::now()),
            None => false,
        }
    }

    fn note_delivered(&self, record: &PendingExpense) {
        if let Some(ledger) = &self.ledger {
            ledger.lock().record(&record.id, Instant::now());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ChannelError, DeliveryLedger, ScriptedChannel};
    use pending_expense_store::{Amount, Category, InMemoryBuffer};
    use std::time::Duration;

    fn record(note: &str) -> PendingExpense {
        PendingExpense::new(Amount::from_cents(100), Category::default(), note)
    }

    fn notes(buffer: &InMemoryBuffer) -> Vec<String> {
        buffer.read_all().unwrap().into_iter().map(|r| r.note).collect()
    }

    fn setup(
        channel: &ScriptedChannel,
        config: RelayConfig,
        seeded: &[&str],
    ) -> (DrainReconciler, Arc<InMemoryBuffer>) {
        let buffer = Arc::new(InMemoryBuffer::new());
        for note in seeded {
            buffer.append(&record(note)).unwrap();
        }
        let slot = ChannelSlot::with_channel(Arc::new(channel.clone()));
        (DrainReconciler::new(config, slot, buffer.clone()), buffer)
    }

    fn remove_delivered() -> RelayConfig {
        RelayConfig {
            clear_policy: DrainClearPolicy::RemoveDelivered,
            ..Default::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn drains_all_records_in_order() {
        for config in [RelayConfig::default(), remove_delivered()] {
            let channel = ScriptedChannel::accepting();
            let (reconciler, buffer) = setup(&channel, config, &["a", "b", "c", "d"]);

            let report = reconciler.drain(DrainTrigger::AppBecameActive).await.unwrap();

            assert_eq!(report.outcome, DrainOutcome::Completed);
            assert_eq!(report.delivered, 4);
            assert_eq!(report.removed, 4);
            assert_eq!(channel.delivered_notes(), vec!["a", "b", "c", "d"]);
            assert!(buffer.is_empty().unwrap());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn failure_mid_pass_clear_all_loses_record() {
        let channel = ScriptedChannel::accepting();
        channel.push_response(Ok(serde_json::json!("ok")));
        channel.push_response(Err(ChannelError::unavailable("gone")));
        let (reconciler, buffer) = setup(&channel, RelayConfig::default(), &["1", "2", "3"]);

        let report = reconciler.drain(DrainTrigger::SyncRequested).await.unwrap();

        assert_eq!(report.attempted, 3);
        assert_eq!(report.delivered, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.removed, 3);
        assert_eq!(channel.delivered_notes(), vec!["1", "2", "3"]);
        assert!(buffer.is_empty().unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn failure_mid_pass_remove_delivered_keeps_record() {
        let channel = ScriptedChannel::accepting();
        channel.push_response(Ok(serde_json::json!("ok")));
        channel.push_response(Err(ChannelError::remote("E", "rejected")));
        let (reconciler, buffer) = setup(&channel, remove_delivered(), &["1", "2", "3"]);

        let report = reconciler.drain(DrainTrigger::SyncRequested).await.unwrap();

        assert_eq!(report.removed, 2);
        assert_eq!(notes(&buffer), vec!["2"]);

        // The next pass picks it up.
        let report = reconciler.drain(DrainTrigger::SyncRequested).await.unwrap();
        assert_eq!(report.delivered, 1);
        assert!(buffer.is_empty().unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn waits_settle_delay_before_first_call() {
        let channel = ScriptedChannel::accepting();
        let (reconciler, _buffer) = setup(&channel, RelayConfig::default(), &["a"]);

        let started = Instant::now();
        reconciler.drain(DrainTrigger::SyncRequested).await.unwrap();

        let first = &channel.calls()[0];
        assert!(first.at - started >= Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn unready_channel_aborts_pass() {
        let channel = ScriptedChannel::unavailable();
        let (reconciler, buffer) = setup(&channel, RelayConfig::default(), &["a", "b"]);

        let report = reconciler.drain(DrainTrigger::SyncRequested).await.unwrap();

        assert_eq!(report.outcome, DrainOutcome::ChannelUnavailable);
        assert_eq!(channel.call_count(), 0);
        assert_eq!(notes(&buffer), vec!["a", "b"]);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_slot_skips_without_delay_on_activation() {
        let channel = ScriptedChannel::accepting();
        let (reconciler, _buffer) = setup(&channel, RelayConfig::default(), &[]);

        let started = Instant::now();
        let report = reconciler.drain(DrainTrigger::AppBecameActive).await.unwrap();

        assert_eq!(report.outcome, DrainOutcome::Empty);
        assert_eq!(Instant::now(), started);
        assert_eq!(channel.call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn sync_request_on_empty_slot_reports_empty() {
        let channel = ScriptedChannel::accepting();
        let (reconciler, _buffer) = setup(&channel, RelayConfig::default(), &[]);

        let report = reconciler.drain(DrainTrigger::SyncRequested).await.unwrap();
        assert_eq!(report.outcome, DrainOutcome::Empty);
    }

    #[tokio::test(start_paused = true)]
    async fn detached_slot_aborts_pass() {
        let buffer = Arc::new(InMemoryBuffer::new());
        buffer.append(&record("a")).unwrap();
        let reconciler = DrainReconciler::new(RelayConfig::default(), ChannelSlot::new(), buffer.clone());

        let report = reconciler.drain(DrainTrigger::AppBecameActive).await.unwrap();
        assert_eq!(report.outcome, DrainOutcome::ChannelUnavailable);
        assert_eq!(buffer.len().unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn dedup_skips_ids_already_delivered() {
        let channel = ScriptedChannel::accepting();
        let config = RelayConfig {
            dedup_delivered_ids: true,
            ..Default::default()
        };
        let ledger = DeliveryLedger::shared(Duration::from_secs(60));
        let (reconciler, buffer) = setup(&channel, config, &["a", "b"]);
        let reconciler = reconciler.with_ledger(ledger.clone());

        let first = buffer.read_all().unwrap()[0].clone();
        ledger.lock().record(&first.id, Instant::now());

        let report = reconciler.drain(DrainTrigger::SyncRequested).await.unwrap();
        assert_eq!(report.duplicates_skipped, 1);
        assert_eq!(report.attempted, 1);
        assert_eq!(channel.delivered_notes(), vec!["b"]);
        assert!(buffer.is_empty().unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn dedup_disabled_resends_everything() {
        let channel = ScriptedChannel::accepting();
        let ledger = DeliveryLedger::shared(Duration::from_secs(60));
        let (reconciler, buffer) = setup(&channel, RelayConfig::default(), &["a"]);
        let reconciler = reconciler.with_ledger(ledger.clone());
        let only = buffer.read_all().unwrap()[0].clone();
        ledger.lock().record(&only.id, Instant::now());

        let report = reconciler.drain(DrainTrigger::SyncRequested).await.unwrap();
        assert_eq!(report.duplicates_skipped, 0);
        assert_eq!(report.delivered, 1);
    }
}
