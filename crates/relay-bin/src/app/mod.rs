//! Application wiring and lifecycle management.

mod client;
mod init;
mod lifecycle;
mod state;

pub use client::{add_expense, clear_pending, open_url, print_pending, sync_now};
pub use init::run_daemon;
pub use lifecycle::{check_status, stop_daemon};
pub use state::DaemonState;
