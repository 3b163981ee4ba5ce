//! Relay tuning knobs.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// How the wait between delivery attempts evolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffPolicy {
    /// Same delay before every retry.
    #[default]
    Fixed,
    /// Delay doubles after each failure, capped at `max_retry_delay_ms`.
    Exponential,
}

/// What a completed drain pass does to the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrainClearPolicy {
    /// Empty the whole slot, including records whose delivery failed.
    #[default]
    ClearAll,
    /// Remove only the records that were delivered.
    RemoveDelivered,
}

impl DrainClearPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClearAll => "clear_all",
            Self::RemoveDelivered => "remove_delivered",
        }
    }
}

impl fmt::Display for DrainClearPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DrainClearPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "clear_all" => Ok(Self::ClearAll),
            "remove_delivered" => Ok(Self::RemoveDelivered),
            other => Err(format!("unknown clear policy: {}", other)),
        }
    }
}

/// Order of persisting and sending for a freshly triggered expense.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchMode {
    /// Try delivery with retries; persist only after the last failure.
    #[default]
    RetryThenPersist,
    /// Persist first, try delivery once, drop from the buffer on success.
    PersistThenSend,
}

/// Relay configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Delivery attempts per record before it is buffered.
    pub max_attempts: u32,
    /// Delay before the first retry, in milliseconds.
    pub retry_delay_ms: u64,
    /// Upper bound for exponential backoff, in milliseconds.
    pub max_retry_delay_ms: u64,
    pub backoff: BackoffPolicy,
    /// Wait after an activation signal before draining, in milliseconds.
    pub settle_delay_ms: u64,
    pub clear_policy: DrainClearPolicy,
    pub dispatch_mode: DispatchMode,
    /// Skip records whose id was already delivered within `dedup_ttl_secs`.
    pub dedup_delivered_ids: bool,
    pub dedup_ttl_secs: u64,
    /// Per-call timeout on socket channels, in milliseconds.
    pub channel_timeout_ms: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            retry_delay_ms: 1000,
            max_retry_delay_ms: 8000,
            backoff: BackoffPolicy::Fixed,
            settle_delay_ms: 500,
            clear_policy: DrainClearPolicy::ClearAll,
            dispatch_mode: DispatchMode::RetryThenPersist,
            dedup_delivered_ids: false,
            dedup_ttl_secs: 24 * 60 * 60,
            channel_timeout_ms: 5000,
        }
    }
}

impl RelayConfig {
    /// Attempts per dispatch, never less than one.
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Delay to wait after the given failed attempt (1-based).
    pub fn retry_delay(&self, failed_attempt: u32) -> Duration {
        Duration::from_millis(compute_delay_ms(
            self.backoff,
            self.retry_delay_ms,
            self.max_retry_delay_ms,
            failed_attempt,
        ))
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn dedup_ttl(&self) -> Duration {
        Duration::from_secs(self.dedup_ttl_secs)
    }

    pub fn channel_timeout(&self) -> Duration {
        Duration::from_millis(self.channel_timeout_ms)
    }

    /// Longest a single dispatch can take when every attempt runs into the
    /// channel timeout.
    pub fn dispatch_budget(&self) -> Duration {
        let attempts = self.attempts();
        let waits: Duration = (1..attempts).map(|n| self.retry_delay(n)).sum();
        self.channel_timeout().saturating_mul(attempts) + waits
    }
}

/// Backoff arithmetic: `base * 2^(attempt - 1)` capped at `max` for
/// exponential, `base` for fixed.
pub fn compute_delay_ms(policy: BackoffPolicy, base_ms: u64, max_ms: u64, attempt: u32) -> u64 {
    match policy {
        BackoffPolicy::Fixed => base_ms,
        BackoffPolicy::Exponential => {
            let exponent = attempt.saturating_sub(1).min(32);
            let factor = 1u64 << exponent;
            base_ms.saturating_mul(factor).min(max_ms.max(base_ms))
        }
    }
}
