//! Durable storage for expenses waiting to reach the consuming application.
//!
//! This crate provides:
//! - `PendingExpense` and its field types (`Amount`, `Category`, `ExpenseId`)
//! - The `DurableBuffer` contract
//! - `SqliteBuffer`: one named slot in a SQLite file, survives restarts
//! - `InMemoryBuffer`: same semantics, process-local
//!
//! The slot `pendingSiriExpenses` holds a JSON array of flat maps with keys
//! `amount`, `category`, `note`, `timestamp` and `id`, in insertion order.

mod buffer;
mod db;
mod error;
mod migrations;
mod models;

pub use buffer::{DurableBuffer, InMemoryBuffer, PENDING_EXPENSES_SLOT};
pub use db::SqliteBuffer;
pub use error::{StoreError, StoreResult};
pub use migrations::{run_migrations, CURRENT_VERSION};
pub use models::{Amount, AmountParseError, Category, ExpenseId, KnownCategory, PendingExpense};
