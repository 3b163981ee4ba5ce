//! Handler registration for the IPC server.

use crate::app::DaemonState;
use crate::ipc::handlers;
use relay_ipc::IpcServer;
use tracing::info;

/// Register all IPC handlers.
pub async fn register_handlers(server: &IpcServer, state: DaemonState) {
    handlers::health::register(server, state.clone()).await;
    handlers::expenses::register(server, state.clone()).await;
    handlers::triggers::register(server, state.clone()).await;
    handlers::signals::register(server, state).await;

    info!("All IPC handlers registered");
}
