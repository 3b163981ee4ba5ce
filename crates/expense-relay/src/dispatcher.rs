//! Single-record delivery with bounded retries and fallback persistence.

use crate::channel::LOG_EXPENSE_METHOD;
use crate::{
    ChannelSlot, DeliveryChannel, DispatchError, DispatchMode, DispatchResult, DrainClearPolicy,
    RelayConfig, SharedLedger,
};
use pending_expense_store::{DurableBuffer, PendingExpense};
use serde::Serialize;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Where a dispatched record ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum DispatchOutcome {
    /// Acknowledged by the application; not left in the buffer.
    Delivered { attempts: u32 },
    /// Left in the durable buffer for the next drain.
    Buffered { attempts: u32 },
}

impl DispatchOutcome {
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Delivered { attempts } | Self::Buffered { attempts } => *attempts,
        }
    }

    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered { .. })
    }
}

/// Delivers freshly triggered expenses.
pub struct RetryDispatcher {
    config: RelayConfig,
    channel: ChannelSlot,
    buffer: Arc<dyn DurableBuffer>,
    ledger: Option<SharedLedger>,
}

impl RetryDispatcher {
    pub fn new(config: RelayConfig, channel: ChannelSlot, buffer: Arc<dyn DurableBuffer>) -> Self {
        Self {
            config,
            channel,
            buffer,
            ledger: None,
        }
    }

    /// Record successful deliveries in the given ledger.
    pub fn with_ledger(mut self, ledger: SharedLedger) -> Self {
        self.ledger = Some(ledger);
        self
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Deliver one record according to the configured dispatch mode.
    ///
    /// Channel failures never surface as errors. The only error is a failed
    /// write to the durable buffer.
    pub async fn dispatch(&self, record: PendingExpense) -> DispatchResult<DispatchOutcome> {
        match self.config.dispatch_mode {
            DispatchMode::RetryThenPersist => self.retry_then_persist(record).await,
            DispatchMode::PersistThenSend => self.persist_then_send(record).await,
        }
    }

    async fn retry_then_persist(&self, record: PendingExpense) -> DispatchResult<DispatchOutcome> {
        let max_attempts = self.config.attempts();
        let payload = record.to_payload();

        for attempt in 1..=max_attempts {
            match self.channel.invoke(LOG_EXPENSE_METHOD, payload.clone()).await {
                Ok(_) => {
                    info!(id = %record.id, attempt, "Expense delivered");
                    self.note_delivered(&record);
                    return Ok(DispatchOutcome::Delivered { attempts: attempt });
                }
                Err(e) if attempt < max_attempts => {
                    let delay = self.config.retry_delay(attempt);
                    warn!(
                        id = %record.id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Delivery failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    warn!(id = %record.id, attempt, error = %e, "Delivery attempts exhausted");
                }
            }
        }

        self.persist(&record)?;
        info!(id = %record.id, attempts = max_attempts, "Expense buffered for later sync");
        Ok(DispatchOutcome::Buffered {
            attempts: max_attempts,
        })
    }

    async fn persist_then_send(&self, record: PendingExpense) -> DispatchResult<DispatchOutcome> {
        self.persist(&record)?;

        match self
            .channel
            .invoke(LOG_EXPENSE_METHOD, record.to_payload())
            .await
        {
            Ok(_) => {
                info!(id = %record.id, "Expense delivered");
                self.note_delivered(&record);
                let cleared = match self.config.clear_policy {
                    DrainClearPolicy::ClearAll => self.buffer.clear(),
                    DrainClearPolicy::RemoveDelivered => {
                        self.buffer.remove(std::slice::from_ref(&record)).map(|_| ())
                    }
                };
                if let Err(e) = cleared {
                    warn!(id = %record.id, error = %e, "Delivered expense left in buffer");
                }
                Ok(DispatchOutcome::Delivered { attempts: 1 })
            }
            Err(e) => {
                debug!(id = %record.id, error = %e, "Delivery failed, expense stays buffered");
                Ok(DispatchOutcome::Buffered { attempts: 1 })
            }
        }
    }

    fn persist(&self, record: &PendingExpense) -> DispatchResult<()> {
        self.buffer.append(record).map_err(|e| {
            error!(id = %record.id, error = %e, "Failed to buffer expense");
            DispatchError::from(e)
        })
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
    use crate::{DeliveryLedger, ScriptedChannel};
    use pending_expense_store::{Amount, Category, InMemoryBuffer, StoreError, StoreResult};
    use std::time::Duration;

    fn record(note: &str) -> PendingExpense {
        PendingExpense::new(Amount::from_cents(500), Category::default(), note)
    }

    fn setup(channel: &ScriptedChannel, config: RelayConfig) -> (RetryDispatcher, Arc<InMemoryBuffer>) {
        let buffer = Arc::new(InMemoryBuffer::new());
        let slot = ChannelSlot::with_channel(Arc::new(channel.clone()));
        (RetryDispatcher::new(config, slot, buffer.clone()), buffer)
    }

    #[tokio::test(start_paused = true)]
    async fn unavailable_channel_buffers_every_trigger_in_order() {
        let channel = ScriptedChannel::unavailable();
        let (dispatcher, buffer) = setup(&channel, RelayConfig::default());

        for note in ["a", "b", "c"] {
            let outcome = dispatcher.dispatch(record(note)).await.unwrap();
            assert_eq!(outcome, DispatchOutcome::Buffered { attempts: 5 });
        }

        let notes: Vec<_> = buffer.read_all().unwrap().into_iter().map(|r| r.note).collect();
        assert_eq!(notes, vec!["a", "b", "c"]);
        assert_eq!(channel.call_count(), 15);
    }

    #[tokio::test(start_paused = true)]
    async fn attempts_are_bounded_and_spaced_by_delay() {
        let channel = ScriptedChannel::unavailable();
        let (dispatcher, _buffer) = setup(&channel, RelayConfig::default());

        dispatcher.dispatch(record("x")).await.unwrap();

        let calls = channel.calls();
        assert_eq!(calls.len(), 5);
        for pair in calls.windows(2) {
            assert!(pair[1].at - pair[0].at >= Duration::from_secs(1));
        }
        assert!(calls.iter().all(|c| c.method == LOG_EXPENSE_METHOD));
    }

    #[tokio::test(start_paused = true)]
    async fn exponential_backoff_spacing() {
        let channel = ScriptedChannel::unavailable();
        let config = RelayConfig {
            backoff: crate::BackoffPolicy::Exponential,
            ..Default::default()
        };
        let (dispatcher, _buffer) = setup(&channel, config);

        dispatcher.dispatch(record("x")).await.unwrap();

        let calls = channel.calls();
        let expected = [1000u64, 2000, 4000, 8000];
        assert_eq!(calls.len(), expected.len() + 1);
        for (pair, want) in calls.windows(2).zip(expected) {
            let gap = (pair[1].at - pair[0].at).as_millis() as u64;
            assert!(gap >= want && gap < want + 10, "gap {} != {}", gap, want);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn recovery_before_last_attempt_delivers_without_buffering() {
        for k in 1..5 {
            let channel = ScriptedChannel::failing_first(k);
            let (dispatcher, buffer) = setup(&channel, RelayConfig::default());

            let outcome = dispatcher.dispatch(record("late")).await.unwrap();
            assert_eq!(outcome, DispatchOutcome::Delivered { attempts: k as u32 + 1 });
            assert!(buffer.is_empty().unwrap());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn immediate_success_sends_payload_once() {
        let channel = ScriptedChannel::accepting();
        let (dispatcher, buffer) = setup(&channel, RelayConfig::default());
        let rec = PendingExpense::new(
            Amount::parse("25.5").unwrap(),
            Category::parse("food"),
            "lunch",
        );

        let outcome = dispatcher.dispatch(rec).await.unwrap();
        assert!(outcome.is_delivered());
        assert_eq!(outcome.attempts(), 1);
        assert!(buffer.is_empty().unwrap());

        let calls = channel.calls();
        assert_eq!(
            calls[0].args,
            serde_json::json!({"amount": "25.50", "category": "food", "note": "lunch"})
        );
    }

    #[tokio::test(start_paused = true)]
    async fn remote_errors_are_retried_like_unavailable() {
        let channel = ScriptedChannel::accepting();
        channel.push_response(Err(crate::ChannelError::remote("E", "rejected")));
        let (dispatcher, buffer) = setup(&channel, RelayConfig::default());

        let outcome = dispatcher.dispatch(record("x")).await.unwrap();
        assert_eq!(outcome, DispatchOutcome::Delivered { attempts: 2 });
        assert!(buffer.is_empty().unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn persist_then_send_clears_on_success() {
        let channel = ScriptedChannel::accepting();
        let config = RelayConfig {
            dispatch_mode: DispatchMode::PersistThenSend,
            ..Default::default()
        };
        let (dispatcher, buffer) = setup(&channel, config);
        buffer.append(&record("older")).unwrap();

        let outcome = dispatcher.dispatch(record("new")).await.unwrap();
        assert_eq!(outcome, DispatchOutcome::Delivered { attempts: 1 });
        // clear_all drops the older record too
        assert!(buffer.is_empty().unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn persist_then_send_remove_delivered_keeps_others() {
        let channel = ScriptedChannel::accepting();
        let config = RelayConfig {
            dispatch_mode: DispatchMode::PersistThenSend,
            clear_policy: DrainClearPolicy::RemoveDelivered,
            ..Default::default()
        };
        let (dispatcher, buffer) = setup(&channel, config);
        buffer.append(&record("older")).unwrap();

        dispatcher.dispatch(record("new")).await.unwrap();
        let notes: Vec<_> = buffer.read_all().unwrap().into_iter().map(|r| r.note).collect();
        assert_eq!(notes, vec!["older"]);
    }

    #[tokio::test(start_paused = true)]
    async fn persist_then_send_failure_leaves_record() {
        let channel = ScriptedChannel::unavailable();
        let config = RelayConfig {
            dispatch_mode: DispatchMode::PersistThenSend,
            ..Default::default()
        };
        let (dispatcher, buffer) = setup(&channel, config);

        let outcome = dispatcher.dispatch(record("kept")).await.unwrap();
        assert_eq!(outcome, DispatchOutcome::Buffered { attempts: 1 });
        assert_eq!(channel.call_count(), 1);
        assert_eq!(buffer.len().unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn delivery_is_noted_in_ledger() {
        let channel = ScriptedChannel::accepting();
        let ledger = DeliveryLedger::shared(Duration::from_secs(60));
        let (dispatcher, _buffer) = setup(&channel, RelayConfig::default());
        let dispatcher = dispatcher.with_ledger(ledger.clone());
        let rec = record("x");

        dispatcher.dispatch(rec.clone()).await.unwrap();
        assert!(ledger.lock().contains(&rec.id, Instant::now()));
    }

    struct BrokenBuffer;

    impl DurableBuffer for BrokenBuffer {
        fn append(&self, _record: &PendingExpense) -> StoreResult<()> {
            Err(StoreError::Lock("disk full".to_string()))
        }
        fn read_all(&self) -> StoreResult<Vec<PendingExpense>> {
            Ok(Vec::new())
        }
        fn clear(&self) -> StoreResult<()> {
            Ok(())
        }
        fn remove(&self, _delivered: &[PendingExpense]) -> StoreResult<usize> {
            Ok(0)
        }
        fn len(&self) -> StoreResult<usize> {
            Ok(0)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn fallback_store_failure_is_reported() {
        let slot = ChannelSlot::new();
        let dispatcher = RetryDispatcher::new(RelayConfig::default(), slot, Arc::new(BrokenBuffer));

        let err = dispatcher.dispatch(record("lost")).await.unwrap_err();
        assert!(matches!(err, DispatchError::Store(_)));
    }
}
