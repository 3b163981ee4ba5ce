//! Daemon initialization.

use crate::app::DaemonState;
use crate::ipc::register_handlers;
use expense_relay::{ChannelSlot, DrainTrigger, RelaySupervisor};
use pending_expense_store::{DurableBuffer, InMemoryBuffer, SqliteBuffer, StoreResult};
use relay_config_and_utils::{Config, Paths};
use relay_ipc::{IpcClient, IpcServer, Method, SocketDeliveryChannel};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{info, warn};

/// Slack on top of the dispatch budget before shutdown stops waiting.
const SHUTDOWN_SLACK: Duration = Duration::from_secs(1);

/// Open the buffer the relay parks undelivered expenses in.
pub fn open_buffer(paths: &Paths, ephemeral: bool) -> StoreResult<Arc<dyn DurableBuffer>> {
    if ephemeral {
        warn!("Ephemeral buffer: pending expenses will not survive a restart");
        return Ok(Arc::new(InMemoryBuffer::new()));
    }
    Ok(Arc::new(SqliteBuffer::open(&paths.database_file())?))
}

/// Wire the buffer, the channel slot and the supervisor together.
pub(crate) async fn build_state(
    config: Config,
    paths: Paths,
    buffer: Arc<dyn DurableBuffer>,
) -> DaemonState {
    let slot = ChannelSlot::new();
    if let Some(socket) = config.app_socket() {
        info!(socket = %socket.display(), "Attaching application channel");
        let channel = SocketDeliveryChannel::new(socket, config.relay.channel_timeout());
        slot.attach(Arc::new(channel)).await;
    }

    let relay = RelaySupervisor::new(config.relay.clone(), slot, buffer);
    DaemonState::new(config, paths, relay)
}

/// Run the daemon.
pub async fn run_daemon(
    config: Config,
    paths: Paths,
    _foreground: bool,
    ephemeral: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    // Singleton enforcement: check if the relay is already running
    let socket_path = paths.socket_file();
    if socket_path.exists() {
        let client = IpcClient::new(&socket_path);
        if client.call_method(Method::Health).await.is_ok() {
            return Err(
                "Relay is already running. Use 'ledgerlite-relay stop' to stop it first.".into(),
            );
        }
        // Socket exists but nobody answers - clean up stale socket
        warn!(socket = %socket_path.display(), "Removing stale socket file");
        let _ = std::fs::remove_file(&socket_path);
    }

    let pid_file = paths.pid_file();
    if pid_file.exists() {
        let _ = std::fs::remove_file(&pid_file);
    }

    info!("Starting LedgerLite relay");
    info!(
        clear_policy = %config.relay.clear_policy,
        dispatch_mode = ?config.relay.dispatch_mode,
        max_attempts = config.relay.max_attempts,
        retry_delay_ms = config.relay.retry_delay_ms,
        dedup = config.relay.dedup_delivered_ids,
        "Configuration loaded"
    );

    paths.ensure_dirs()?;

    let pid = std::process::id();
    std::fs::write(&pid_file, pid.to_string())?;
    info!(pid = pid, "Relay started");

    let buffer = open_buffer(&paths, ephemeral)?;
    let buffered = buffer.len()?;
    let state = build_state(config, paths.clone(), buffer).await;

    let ipc_server = Arc::new(IpcServer::new(paths.socket_file()));
    register_handlers(&ipc_server, state.clone()).await;

    // Expenses left over from a previous run go out as soon as the app is reachable.
    if buffered > 0 && state.relay.channel().is_attached().await {
        info!(count = buffered, "Draining expenses buffered before startup");
        state.relay.request_drain(DrainTrigger::AppBecameActive).await;
    }

    let listener = ipc_server.bind()?;
    let mut terminate = signal(SignalKind::terminate())?;

    let server_result = tokio::select! {
        result = ipc_server.serve(listener) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupt received");
            Ok(())
        }
        _ = terminate.recv() => {
            info!("Terminate signal received");
            Ok(())
        }
    };

    // Let dispatches that are still retrying fall back to the buffer on their
    // own. Whatever is left after the grace is buffered by shutdown.
    let grace = state.config.relay.dispatch_budget() + SHUTDOWN_SLACK;
    if tokio::time::timeout(grace, state.relay.wait_idle())
        .await
        .is_err()
    {
        warn!(
            grace_ms = grace.as_millis() as u64,
            "Relay tasks still running after grace period"
        );
    }
    state.relay.shutdown().await;

    // Cleanup
    let _ = std::fs::remove_file(paths.pid_file());
    let _ = std::fs::remove_file(paths.socket_file());

    info!("Relay stopped");
    server_result?;
    Ok(())
}
