//! SQLite-backed durable buffer.

use crate::buffer::{decode_records, parse_slot, remove_matching};
use crate::{migrations, DurableBuffer, PendingExpense, StoreError, StoreResult};
use crate::PENDING_EXPENSES_SLOT;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use serde_json::Value;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

/// Durable buffer stored as one JSON array in the `relay_slots` table.
pub struct SqliteBuffer {
    conn: Mutex<Connection>,
    slot: String,
}

impl SqliteBuffer {
    /// Open a database at the given path, running migrations if needed.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = FULL;
            PRAGMA busy_timeout = 5000;
        ",
        )?;
        migrations::run_migrations(&conn)?;

        debug!(path = %path.display(), "Opened pending expense store");
        Ok(Self::with_connection(conn))
    }

    /// Open an in-memory database for testing.
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        migrations::run_migrations(&conn)?;
        Ok(Self::with_connection(conn))
    }

    fn with_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
            slot: PENDING_EXPENSES_SLOT.to_string(),
        }
    }

    /// Use a different slot name (several buffers can share one file).
    pub fn with_slot(mut self, slot: &str) -> Self {
        self.slot = slot.to_string();
        self
    }

    pub fn slot(&self) -> &str {
        &self.slot
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Lock("sqlite connection".to_string()))
    }

    /// Run a read-modify-write on the slot inside one immediate transaction.
    fn modify_slot<T>(&self, f: impl FnOnce(&mut Vec<Value>) -> T) -> StoreResult<T> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let mut entries = read_slot(&tx, &self.slot)?;
        let result = f(&mut entries);
        write_slot(&tx, &self.slot, &entries)?;

        tx.commit()?;
        Ok(result)
    }
}

fn read_slot(conn: &Connection, slot: &str) -> StoreResult<Vec<Value>> {
    let text: Option<String> = conn
        .query_row(
            "SELECT value FROM relay_slots WHERE key = ?1",
            params![slot],
            |row| row.get(0),
        )
        .optional()?;

    match text {
        Some(text) => parse_slot(&text),
        None => Ok(Vec::new()),
    }
}

fn write_slot(conn: &Connection, slot: &str, entries: &[Value]) -> StoreResult<()> {
    if entries.is_empty() {
        conn.execute("DELETE FROM relay_slots WHERE key = ?1", params![slot])?;
        return Ok(());
    }

    let text = serde_json::to_string(entries)?;
    conn.execute(
        "INSERT INTO relay_slots (key, value, updated_at) VALUES (?1, ?2, datetime('now'))
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        params![slot, text],
    )?;
    Ok(())
}

impl DurableBuffer for SqliteBuffer {
    fn append(&self, record: &PendingExpense) -> StoreResult<()> {
        let value = serde_json::to_value(record)?;
        let count = self.modify_slot(|entries| {
            entries.push(value);
            entries.len()
        })?;
        debug!(slot = %self.slot, id = %record.id, count, "Appended pending expense");
        Ok(())
    }

    fn read_all(&self) -> StoreResult<Vec<PendingExpense>> {
        let conn = self.lock()?;
        let entries = read_slot(&conn, &self.slot)?;
        Ok(decode_records(&entries))
    }

    fn clear(&self) -> StoreResult<()> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM relay_slots WHERE key = ?1", params![self.slot])?;
        debug!(slot = %self.slot, "Cleared pending expenses");
        Ok(())
    }

    fn remove(&self, delivered: &[PendingExpense]) -> StoreResult<usize> {
        if delivered.is_empty() {
            return Ok(0);
        }
        let removed = self.modify_slot(|entries| remove_matching(entries, delivered))?;
        debug!(slot = %self.slot, removed, "Removed delivered expenses");
        Ok(removed)
    }

    fn len(&self) -> StoreResult<usize> {
        let conn = self.lock()?;
        Ok(read_slot(&conn, &self.slot)?.len())
    }
}
