//! Time-bounded memory of delivered expense ids.

use parking_lot::Mutex;
use pending_expense_store::ExpenseId;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// In-memory record of recently delivered expense ids.
#[derive(Debug, Clone)]
pub struct DeliveryLedger {
    ttl: Duration,
    entries: HashMap<String, Instant>,
}

/// Ledger shared by the dispatcher and the reconciler.
pub type SharedLedger = Arc<Mutex<DeliveryLedger>>;

impl Default for DeliveryLedger {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

impl DeliveryLedger {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: HashMap::new(),
        }
    }

    pub fn shared(ttl: Duration) -> SharedLedger {
        Arc::new(Mutex::new(Self::new(ttl)))
    }

    /// Remember a delivery. Empty ids are ignored.
    pub fn record(&mut self, id: &ExpenseId, now: Instant) {
        if id.is_empty() {
            return;
        }
        self.cleanup(now);
        self.entries.insert(id.as_str().to_string(), now + self.ttl);
    }

    /// Whether the id was delivered within the TTL.
    pub fn contains(&mut self, id: &ExpenseId, now: Instant) -> bool {
        if id.is_empty() {
            return false;
        }
        self.cleanup(now);
        self.entries.contains_key(id.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn cleanup(&mut self, now: Instant) {
        self.entries.retain(|_, expires_at| *expires_at > now);
    }
}
