//! Health and shutdown handlers.

use crate::app::DaemonState;
use relay_ipc::{IpcServer, Method, Response};
use tracing::{info, warn};

/// Register health and shutdown handlers.
pub async fn register(server: &IpcServer, state: DaemonState) {
    // Health check
    server
        .register_handler(Method::Health, move |req| {
            let state = state.clone();
            async move {
                let pending = match state.relay.buffer().len() {
                    Ok(n) => serde_json::json!(n),
                    Err(e) => {
                        warn!(error = %e, "Could not count pending expenses");
                        serde_json::Value::Null
                    }
                };
                let channel = if state.relay.channel().is_attached().await {
                    "attached"
                } else {
                    "detached"
                };
                Response::success(
                    &req.id,
                    serde_json::json!({
                        "status": "ok",
                        "version": env!("CARGO_PKG_VERSION"),
                        "pending": pending,
                        "channel": channel,
                        "clear_policy": state.config.relay.clear_policy.as_str(),
                        "base_dir": state.paths.base_dir().display().to_string(),
                    }),
                )
            }
        })
        .await;

    // Shutdown
    let shutdown_tx = server.shutdown_sender();
    server
        .register_handler(Method::Shutdown, move |req| {
            let tx = shutdown_tx.clone();
            async move {
                let _ = tx.send(());
                Response::success(&req.id, serde_json::json!({ "status": "shutting_down" }))
            }
        })
        .await;

    info!("Registered health handlers");
}
