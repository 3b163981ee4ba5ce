//! Application lifecycle signals and channel management.

use crate::app::DaemonState;
use expense_relay::DrainTrigger;
use relay_ipc::{error_codes, IpcServer, Method, Response, SocketDeliveryChannel};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

/// Register signal and channel handlers.
pub async fn register(server: &IpcServer, state: DaemonState) {
    let s = state.clone();
    server
        .register_handler(Method::AppBecameActive, move |req| {
            let state = s.clone();
            async move {
                state.relay.request_drain(DrainTrigger::AppBecameActive).await;
                Response::success(&req.id, serde_json::json!({ "status": "drain_scheduled" }))
            }
        })
        .await;

    let s = state.clone();
    server
        .register_handler(Method::SyncRequested, move |req| {
            let state = s.clone();
            async move {
                let report = match state.relay.drain_now(DrainTrigger::SyncRequested).await {
                    Ok(report) => report,
                    Err(e) => {
                        error!(error = %e, "Sync failed");
                        return Response::error(
                            &req.id,
                            error_codes::INTERNAL_ERROR,
                            &format!("Sync failed: {}", e),
                        );
                    }
                };
                match serde_json::to_value(&report) {
                    Ok(value) => Response::success(&req.id, value),
                    Err(e) => Response::error(&req.id, error_codes::INTERNAL_ERROR, &e.to_string()),
                }
            }
        })
        .await;

    // Without a socket_path the configured app socket is used.
    let s = state.clone();
    server
        .register_handler(Method::AttachChannel, move |req| {
            let state = s.clone();
            async move {
                let socket = req
                    .param_str("socket_path")
                    .filter(|p| !p.trim().is_empty())
                    .map(PathBuf::from)
                    .or_else(|| state.config.app_socket());
                let Some(socket) = socket else {
                    return Response::invalid_arguments(
                        &req.id,
                        "Expected socket_path parameter",
                    );
                };

                let channel =
                    SocketDeliveryChannel::new(&socket, state.config.relay.channel_timeout());
                state.relay.channel().attach(Arc::new(channel)).await;
                info!(socket = %socket.display(), "Application channel attached");
                Response::success(
                    &req.id,
                    serde_json::json!({
                        "status": "attached",
                        "socket_path": socket.display().to_string(),
                    }),
                )
            }
        })
        .await;

    let s = state;
    server
        .register_handler(Method::DetachChannel, move |req| {
            let state = s.clone();
            async move {
                state.relay.channel().detach().await;
                info!("Application channel detached");
                Response::success(&req.id, serde_json::json!({ "status": "detached" }))
            }
        })
        .await;

    info!("Registered signal handlers");
}
