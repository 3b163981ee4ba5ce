//! Owner of every background dispatch and drain task.

use crate::{
    ChannelSlot, DeliveryLedger, DispatchOutcome, DispatchResult, DrainReconciler, DrainReport,
    DrainResult, DrainTrigger, RelayConfig, RetryDispatcher,
};
use pending_expense_store::{DurableBuffer, PendingExpense};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Records handed to a dispatch task that has not finished yet, in
/// submission order.
#[derive(Debug, Default)]
struct InFlight {
    next_ticket: u64,
    records: BTreeMap<u64, PendingExpense>,
}

impl InFlight {
    fn insert(&mut self, record: PendingExpense) -> u64 {
        let ticket = self.next_ticket;
        self.next_ticket += 1;
        self.records.insert(ticket, record);
        ticket
    }

    fn settle(&mut self, ticket: u64) {
        self.records.remove(&ticket);
    }

    fn take_all(&mut self) -> Vec<PendingExpense> {
        std::mem::take(&mut self.records).into_values().collect()
    }
}

/// Runs dispatches and drains as tokio tasks it can await or abort.
///
/// Dispatches run concurrently with each other and with drains. Drain
/// passes are serialized: a new pass waits for the running one to finish.
/// A dispatch cut short by [`shutdown`](Self::shutdown) leaves its record in
/// the buffer.
pub struct RelaySupervisor {
    dispatcher: Arc<RetryDispatcher>,
    reconciler: Arc<DrainReconciler>,
    buffer: Arc<dyn DurableBuffer>,
    channel: ChannelSlot,
    tasks: Mutex<JoinSet<()>>,
    in_flight: Arc<parking_lot::Mutex<InFlight>>,
    drain_gate: Arc<Mutex<()>>,
}

impl RelaySupervisor {
    pub fn new(config: RelayConfig, channel: ChannelSlot, buffer: Arc<dyn DurableBuffer>) -> Self {
        let mut dispatcher = RetryDispatcher::new(config.clone(), channel.clone(), buffer.clone());
        let mut reconciler = DrainReconciler::new(config.clone(), channel.clone(), buffer.clone());

        if config.dedup_delivered_ids {
            let ledger = DeliveryLedger::shared(config.dedup_ttl());
            dispatcher = dispatcher.with_ledger(ledger.clone());
            reconciler = reconciler.with_ledger(ledger);
        }

        Self {
            dispatcher: Arc::new(dispatcher),
            reconciler: Arc::new(reconciler),
            buffer,
            channel,
            tasks: Mutex::new(JoinSet::new()),
            in_flight: Arc::new(parking_lot::Mutex::new(InFlight::default())),
            drain_gate: Arc::new(Mutex::new(())),
        }
    }

    pub fn buffer(&self) -> &Arc<dyn DurableBuffer> {
        &self.buffer
    }

    pub fn channel(&self) -> &ChannelSlot {
        &self.channel
    }

    pub fn config(&self) -> &RelayConfig {
        self.dispatcher.config()
    }

    /// Dispatch a record in the background. Returns immediately.
    pub async fn submit(&self, record: PendingExpense) {
        let dispatcher = self.dispatcher.clone();
        let in_flight = self.in_flight.clone();
        let id = record.id.clone();
        let ticket = in_flight.lock().insert(record.clone());
        self.spawn(async move {
            let result = dispatcher.dispatch(record).await;
            in_flight.lock().settle(ticket);
            match result {
                Ok(outcome) => debug!(%id, ?outcome, "Dispatch finished"),
                Err(e) => error!(%id, error = %e, "Dispatch lost expense"),
            }
        })
        .await;
    }

    /// Dispatch a record and wait for the outcome.
    pub async fn dispatch_now(&self, record: PendingExpense) -> DispatchResult<DispatchOutcome> {
        self.dispatcher.dispatch(record).await
    }

    /// Start a drain pass in the background.
    pub async fn request_drain(&self, trigger: DrainTrigger) {
        let reconciler = self.reconciler.clone();
        let gate = self.drain_gate.clone();
        self.spawn(async move {
            let _pass = gate.lock().await;
            if let Err(e) = reconciler.drain(trigger).await {
                error!(%trigger, error = %e, "Drain failed");
            }
        })
        .await;
    }

    /// Run a drain pass and wait for its report.
    pub async fn drain_now(&self, trigger: DrainTrigger) -> DrainResult<DrainReport> {
        let _pass = self.drain_gate.lock().await;
        self.reconciler.drain(trigger).await
    }

    /// Number of tasks that have not been reaped yet.
    pub async fn pending_tasks(&self) -> usize {
        let mut tasks = self.tasks.lock().await;
        reap_finished(&mut tasks);
        tasks.len()
    }

    /// Wait until every spawned task has finished.
    ///
    /// Cancel safe: dropping the future leaves the remaining tasks running
    /// and owned by the supervisor. New submissions wait until it returns.
    pub async fn wait_idle(&self) {
        let mut tasks = self.tasks.lock().await;
        while let Some(result) = tasks.join_next().await {
            log_join_result(result);
        }
    }

    /// Abort every outstanding task and wait for them to unwind, then append
    /// the records of interrupted dispatches to the buffer.
    pub async fn shutdown(&self) {
        let mut tasks = std::mem::take(&mut *self.tasks.lock().await);
        let outstanding = tasks.len();
        tasks.abort_all();
        while let Some(result) = tasks.join_next().await {
            log_join_result(result);
        }

        let persisted = self.persist_interrupted();
        info!(outstanding, persisted, "Relay tasks stopped");
    }

    fn persist_interrupted(&self) -> usize {
        let leftovers = self.in_flight.lock().take_all();
        if leftovers.is_empty() {
            return 0;
        }

        // A persist-then-send dispatch may already have stored its record.
        let stored = match self.buffer.read_all() {
            Ok(stored) => stored,
            Err(e) => {
                warn!(error = %e, "Could not read buffer before persisting interrupted dispatches");
                Vec::new()
            }
        };

        let mut persisted = 0;
        for record in leftovers {
            if stored.contains(&record) {
                continue;
            }
            match self.buffer.append(&record) {
                Ok(()) => {
                    info!(id = %record.id, "Interrupted dispatch buffered for later sync");
                    persisted += 1;
                }
                Err(e) => error!(id = %record.id, error = %e, "Interrupted dispatch lost expense"),
            }
        }
        persisted
    }

    async fn spawn<F>(&self, task: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let mut tasks = self.tasks.lock().await;
        reap_finished(&mut tasks);
        tasks.spawn(task);
    }
}

fn reap_finished(tasks: &mut JoinSet<()>) {
    while let Some(result) = tasks.try_join_next() {
        log_join_result(result);
    }
}

fn log_join_result(result: Result<(), tokio::task::JoinError>) {
    if let Err(e) = result {
        if e.is_panic() {
            error!(error = %e, "Relay task panicked");
        } else {
            warn!(error = %e, "Relay task cancelled");
        }
    }
}
