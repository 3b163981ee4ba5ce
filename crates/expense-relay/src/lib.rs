//! Pending-expense relay.
//!
//! Expenses triggered while the consuming application is unreachable are
//! retried, then parked in a durable buffer and drained once the application
//! signals it is active again.
//!
//! - [`RetryDispatcher`]: bounded retries for one fresh record, fallback to the buffer
//! - [`DrainReconciler`]: ordered delivery of everything buffered, then the clear policy
//! - [`RelaySupervisor`]: owns the background tasks and serializes drains
//! - [`ChannelSlot`]: injected handle to the application, empty until attached
//!
//! ```ignore
//! let relay = RelaySupervisor::new(RelayConfig::default(), ChannelSlot::new(), buffer);
//! relay.submit(IntentParams::default().into_expense()).await;
//! relay.request_drain(DrainTrigger::AppBecameActive).await;
//! ```

mod channel;
mod config;
mod dispatcher;
mod error;
mod ledger;
mod reconciler;
mod supervisor;
mod trigger;

pub use channel::{
    ChannelSlot, DeliveryChannel, RecordedCall, ScriptedChannel, LOG_EXPENSE_METHOD,
};
pub use config::{compute_delay_ms, BackoffPolicy, DispatchMode, DrainClearPolicy, RelayConfig};
pub use dispatcher::{DispatchOutcome, RetryDispatcher};
pub use error::{
    ChannelError, ChannelResult, DispatchError, DispatchResult, DrainError, DrainResult,
    TriggerError, TriggerResult,
};
pub use ledger::{DeliveryLedger, SharedLedger};
pub use reconciler::{DrainOutcome, DrainReconciler, DrainReport, DrainTrigger};
pub use supervisor::RelaySupervisor;
pub use trigger::{
    parse_expense_url, validate_log_expense, IntentParams, LogExpenseArgs, DEFAULT_AMOUNT,
    URL_DEFAULT_NOTE, URL_HOST, URL_SCHEME, VOICE_DEFAULT_NOTE,
};
