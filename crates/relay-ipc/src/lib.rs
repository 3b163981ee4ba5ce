//! IPC layer between the relay, its front-ends and the consuming application.
//!
//! This crate provides:
//! - Unix domain socket server and client
//! - JSON-RPC-like protocol with the application's camelCase method names
//! - `SocketDeliveryChannel`, the relay's outbound channel to the application

mod error;
mod protocol;
mod server;
mod socket_channel;

pub use error::{IpcError, IpcResult};
pub use protocol::{error_codes, ErrorInfo, Method, Request, Response};
pub use server::{HandlerFn, IpcClient, IpcServer};
pub use socket_channel::SocketDeliveryChannel;
