//! IPC handler implementations.
//!
//! Handlers stay thin: they decode parameters and hand the work to the
//! relay supervisor or the buffer behind it.

pub mod expenses;
pub mod health;
pub mod signals;
pub mod triggers;

#[cfg(test)]
pub(crate) mod test_support;
