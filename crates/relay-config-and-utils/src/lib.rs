//! Configuration, paths and logging setup for the LedgerLite relay.

mod config;
mod error;
mod logging;
mod paths;

pub use config::{Config, DEFAULT_LOG_LEVEL, ENV_APP_SOCKET, ENV_CLEAR_POLICY, ENV_LOG_LEVEL};
pub use error::{CoreError, CoreResult};
pub use logging::{init_logging, init_logging_for_service, parse_level};
pub use paths::Paths;
