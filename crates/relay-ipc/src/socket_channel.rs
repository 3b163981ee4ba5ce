//! Delivery channel backed by the application's IPC socket.

use crate::{IpcClient, IpcError, Method, Request};
use async_trait::async_trait;
use expense_relay::{ChannelError, ChannelResult, DeliveryChannel};
use serde_json::Value;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

/// Sends each call as one request on a fresh connection to the application.
#[derive(Debug, Clone)]
pub struct SocketDeliveryChannel {
    client: IpcClient,
    timeout: Duration,
}

impl SocketDeliveryChannel {
    pub fn new(socket_path: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            client: IpcClient::new(socket_path),
            timeout,
        }
    }

    pub fn socket_path(&self) -> &std::path::Path {
        self.client.socket_path()
    }
}

#[async_trait]
impl DeliveryChannel for SocketDeliveryChannel {
    async fn invoke(&self, method: &str, args: Value) -> ChannelResult<Value> {
        let method = Method::from_name(method)
            .ok_or_else(|| ChannelError::remote("METHOD_NOT_FOUND", format!("unknown method {}", method)))?;
        let request = Request::with_params(method, args);

        let response = match tokio::time::timeout(self.timeout, self.client.call(request)).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return Err(map_ipc_error(e)),
            Err(_) => {
                return Err(ChannelError::unavailable(format!(
                    "no response within {} ms",
                    self.timeout.as_millis()
                )))
            }
        };

        match response.error {
            Some(error) => {
                debug!(code = error.code, message = %error.message, "Application rejected call");
                Err(ChannelError::remote(error.code_name(), error.message))
            }
            None => Ok(response.result.unwrap_or(Value::Null)),
        }
    }

    async fn is_ready(&self) -> bool {
        matches!(
            tokio::time::timeout(self.timeout, self.client.connect()).await,
            Ok(Ok(_))
        )
    }
}

fn map_ipc_error(e: IpcError) -> ChannelError {
    match e {
        IpcError::Json(e) => ChannelError::remote("PARSE_ERROR", e.to_string()),
        IpcError::Protocol(message) => ChannelError::remote("INVALID_RESPONSE", message),
        other => ChannelError::unavailable(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{IpcServer, Response};
    use expense_relay::LOG_EXPENSE_METHOD;
    use serde_json::json;
    use std::sync::Arc;

    async fn app_server(dir: &tempfile::TempDir) -> (Arc<IpcServer>, PathBuf) {
        let path = dir.path().join("app.sock");
        let server = Arc::new(IpcServer::new(&path));
        server
            .register_handler(Method::LogExpense, |req| async move {
                match req.params {
                    Some(Value::Object(_)) => {
                        Response::success(&req.id, json!("Expense logged successfully"))
                    }
                    _ => Response::invalid_arguments(&req.id, "Expected expense payload object"),
                }
            })
            .await;
        let listener = server.bind().unwrap();
        let running = server.clone();
        tokio::spawn(async move { running.serve(listener).await });
        (server, path)
    }

    #[tokio::test]
    async fn test_delivers_to_application() {
        let dir = tempfile::tempdir().unwrap();
        let (server, path) = app_server(&dir).await;
        let channel = SocketDeliveryChannel::new(&path, Duration::from_secs(2));

        assert!(channel.is_ready().await);
        let ack = channel
            .invoke(LOG_EXPENSE_METHOD, json!({"amount": "5.00", "category": "other", "note": ""}))
            .await
            .unwrap();
        assert_eq!(ack, json!("Expense logged successfully"));
        server.shutdown();
    }

    #[tokio::test]
    async fn test_error_response_is_remote() {
        let dir = tempfile::tempdir().unwrap();
        let (server, path) = app_server(&dir).await;
        let channel = SocketDeliveryChannel::new(&path, Duration::from_secs(2));

        match channel.invoke(LOG_EXPENSE_METHOD, json!("not an object")).await {
            Err(ChannelError::Remote { code, message }) => {
                assert_eq!(code, "INVALID_ARGUMENTS");
                assert_eq!(message, "Expected expense payload object");
            }
            other => panic!("expected remote error, got {:?}", other),
        }
        server.shutdown();
    }

    #[tokio::test]
    async fn test_missing_socket_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let channel = SocketDeliveryChannel::new(dir.path().join("gone.sock"), Duration::from_secs(1));

        assert!(!channel.is_ready().await);
        let err = channel.invoke(LOG_EXPENSE_METHOD, json!({})).await.unwrap_err();
        assert!(err.is_unavailable());
    }

    #[tokio::test]
    async fn test_silent_application_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("slow.sock");
        // Accepts connections but never answers.
        let listener = tokio::net::UnixListener::bind(&path).unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                held.push(stream);
            }
        });

        let channel = SocketDeliveryChannel::new(&path, Duration::from_millis(100));
        let err = channel.invoke(LOG_EXPENSE_METHOD, json!({})).await.unwrap_err();
        assert!(err.is_unavailable());
    }
}
