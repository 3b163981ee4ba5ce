//! Relay error types.

use pending_expense_store::StoreError;
use thiserror::Error;

/// Failure of a single call on the delivery channel.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    /// The consuming application is not reachable (no bridge, no socket).
    #[error("Channel unavailable: {0}")]
    Unavailable(String),

    /// The application answered with an error.
    #[error("Remote error {code}: {message}")]
    Remote { code: String, message: String },
}

impl ChannelError {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable(reason.into())
    }

    pub fn remote(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Remote {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Result type alias using ChannelError.
pub type ChannelResult<T> = Result<T, ChannelError>;

/// Dispatch error. Delivery failures never surface here, only store failures.
#[derive(Error, Debug)]
pub enum DispatchError {
    /// The fallback write to the durable buffer failed.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Result type alias using DispatchError.
pub type DispatchResult<T> = Result<T, DispatchError>;

/// Drain pass error.
#[derive(Error, Debug)]
pub enum DrainError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Result type alias using DrainError.
pub type DrainResult<T> = Result<T, DrainError>;

/// Rejected trigger input.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TriggerError {
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),
}

/// Result type alias using TriggerError.
pub type TriggerResult<T> = Result<T, TriggerError>;
