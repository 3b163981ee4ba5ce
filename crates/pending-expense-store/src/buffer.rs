//! Durable buffer contract and the in-memory backend.
//!
//! Backends keep the slot as raw JSON values so that a record this build
//! cannot decode survives every read-modify-write until the slot is cleared.

use crate::{PendingExpense, StoreError, StoreResult};
use serde_json::Value;
use std::sync::Mutex;
use tracing::warn;

/// Name of the single slot holding the ordered pending records.
pub const PENDING_EXPENSES_SLOT: &str = "pendingSiriExpenses";

/// Ordered, append-only store of pending expenses.
///
/// Every method is atomic with respect to the others on the same buffer.
pub trait DurableBuffer: Send + Sync {
    /// Add one record at the end. Persisted before returning.
    fn append(&self, record: &PendingExpense) -> StoreResult<()>;

    /// All decodable records in insertion order.
    fn read_all(&self) -> StoreResult<Vec<PendingExpense>>;

    /// Empty the slot.
    fn clear(&self) -> StoreResult<()>;

    /// Remove the first stored occurrence of each given record.
    ///
    /// Returns how many stored entries were removed.
    fn remove(&self, delivered: &[PendingExpense]) -> StoreResult<usize>;

    /// Number of stored entries, including ones that fail to decode.
    fn len(&self) -> StoreResult<usize>;

    fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.len()? == 0)
    }
}

/// Decode a slot, skipping entries that are not valid records.
pub(crate) fn decode_records(raw: &[Value]) -> Vec<PendingExpense> {
    raw.iter()
        .enumerate()
        .filter_map(|(index, value)| {
            match serde_json::from_value::<PendingExpense>(value.clone()) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!(index, error = %e, "Skipping undecodable pending expense");
                    None
                }
            }
        })
        .collect()
}

/// Drop the first raw entry matching each delivered record.
pub(crate) fn remove_matching(raw: &mut Vec<Value>, delivered: &[PendingExpense]) -> usize {
    let mut consumed = vec![false; delivered.len()];
    let before = raw.len();

    raw.retain(|value| {
        let Ok(record) = serde_json::from_value::<PendingExpense>(value.clone()) else {
            return true;
        };
        match delivered
            .iter()
            .enumerate()
            .find(|(i, d)| !consumed[*i] && **d == record)
        {
            Some((i, _)) => {
                consumed[i] = true;
                false
            }
            None => true,
        }
    });

    before - raw.len()
}

/// Parse the stored slot text into raw entries.
pub(crate) fn parse_slot(text: &str) -> StoreResult<Vec<Value>> {
    match serde_json::from_str::<Value>(text)? {
        Value::Array(items) => Ok(items),
        other => Err(StoreError::InvalidSlot(format!(
            "expected array, found {}",
            json_kind(&other)
        ))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Process-local buffer, lost on restart. Used by tests and `--ephemeral`.
#[derive(Debug, Default)]
pub struct InMemoryBuffer {
    entries: Mutex<Vec<Value>>,
}

impl InMemoryBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the buffer with raw slot entries (e.g. records from older builds).
    pub fn with_raw_entries(entries: Vec<Value>) -> Self {
        Self {
            entries: Mutex::new(entries),
        }
    }

    fn lock(&self) -> StoreResult<std::sync::MutexGuard<'_, Vec<Value>>> {
        self.entries
            .lock()
            .map_err(|_| StoreError::Lock("in-memory buffer".to_string()))
    }
}

impl DurableBuffer for InMemoryBuffer {
    fn append(&self, record: &PendingExpense) -> StoreResult<()> {
        let value = serde_json::to_value(record)?;
        self.lock()?.push(value);
        Ok(())
    }

    fn read_all(&self) -> StoreResult<Vec<PendingExpense>> {
        Ok(decode_records(&self.lock()?))
    }

    fn clear(&self) -> StoreResult<()> {
        self.lock()?.clear();
        Ok(())
    }

    fn remove(&self, delivered: &[PendingExpense]) -> StoreResult<usize> {
        Ok(remove_matching(&mut *self.lock()?, delivered))
    }

    fn len(&self) -> StoreResult<usize> {
        Ok(self.lock()?.len())
    }
}
