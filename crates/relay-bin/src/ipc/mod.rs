//! IPC handler registration and implementations.

pub mod handlers;
mod register;

pub use register::register_handlers;
