//! In-process relay served on a temporary socket.

use crate::app::DaemonState;
use crate::ipc::register_handlers;
use expense_relay::{ChannelSlot, DeliveryChannel, RelayConfig, RelaySupervisor};
use pending_expense_store::InMemoryBuffer;
use relay_config_and_utils::{Config, Paths};
use relay_ipc::{IpcClient, IpcResult, IpcServer, Method, Response};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::task::JoinHandle;

pub(crate) struct Harness {
    pub state: DaemonState,
    pub buffer: Arc<InMemoryBuffer>,
    pub slot: ChannelSlot,
    pub client: IpcClient,
    pub socket_path: PathBuf,
    pub served: JoinHandle<IpcResult<()>>,
    pub dir: TempDir,
}

/// Short delays so retry exhaustion takes milliseconds.
pub(crate) fn fast_relay_config() -> RelayConfig {
    RelayConfig {
        max_attempts: 3,
        retry_delay_ms: 5,
        max_retry_delay_ms: 5,
        settle_delay_ms: 0,
        channel_timeout_ms: 1000,
        ..Default::default()
    }
}

impl Harness {
    /// No application attached.
    pub async fn offline() -> Self {
        Self::start(fast_relay_config(), None).await
    }

    pub async fn with_channel(channel: Arc<dyn DeliveryChannel>) -> Self {
        Self::start(fast_relay_config(), Some(channel)).await
    }

    pub async fn start(relay: RelayConfig, channel: Option<Arc<dyn DeliveryChannel>>) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());
        let config = Config {
            relay,
            ..Default::default()
        };

        let buffer = Arc::new(InMemoryBuffer::new());
        let slot = ChannelSlot::new();
        if let Some(channel) = channel {
            slot.attach(channel).await;
        }
        let relay = RelaySupervisor::new(config.relay.clone(), slot.clone(), buffer.clone());
        let state = DaemonState::new(config, paths.clone(), relay);

        let socket_path = paths.socket_file();
        let server = Arc::new(IpcServer::new(&socket_path));
        register_handlers(&server, state.clone()).await;
        let listener = server.bind().unwrap();
        let served = tokio::spawn(async move { server.serve(listener).await });

        Self {
            state,
            buffer,
            slot,
            client: IpcClient::new(&socket_path),
            socket_path,
            served,
            dir,
        }
    }

    pub async fn call(&self, method: Method, params: Option<Value>) -> Response {
        match params {
            Some(params) => self.client.call_method_with_params(method, params).await,
            None => self.client.call_method(method).await,
        }
        .unwrap()
    }

    /// Call and unwrap a successful result.
    pub async fn ok(&self, method: Method, params: Option<Value>) -> Value {
        let response = self.call(method, params).await;
        assert!(response.is_success(), "{} failed: {:?}", method, response.error);
        response.result.unwrap_or(Value::Null)
    }

    /// Call and unwrap the error's symbolic code.
    pub async fn err(&self, method: Method, params: Option<Value>) -> String {
        let response = self.call(method, params).await;
        match response.error {
            Some(error) => error.code_name(),
            None => panic!("{} unexpectedly succeeded: {:?}", method, response.result),
        }
    }
}
