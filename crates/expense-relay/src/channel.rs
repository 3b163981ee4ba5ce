//! Delivery channel to the consuming application.
//!
//! The relay never holds a channel directly. Dispatcher and reconciler share a
//! [`ChannelSlot`] that is empty until the application's bridge attaches one,
//! and calls on an empty slot fail with [`ChannelError::Unavailable`].

use crate::{ChannelError, ChannelResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::Instant;

/// Method the application exposes for recording an expense.
pub const LOG_EXPENSE_METHOD: &str = "logExpense";

/// Call interface to the consuming application.
#[async_trait]
pub trait DeliveryChannel: Send + Sync {
    /// Invoke a method with JSON arguments and wait for the acknowledgment.
    async fn invoke(&self, method: &str, args: Value) -> ChannelResult<Value>;

    /// Whether the application side is currently able to take calls.
    async fn is_ready(&self) -> bool {
        true
    }
}

/// Shared, optionally empty handle to the current delivery channel.
#[derive(Clone, Default)]
pub struct ChannelSlot {
    inner: Arc<RwLock<Option<Arc<dyn DeliveryChannel>>>>,
}

impl ChannelSlot {
    /// An empty slot.
    pub fn new() -> Self {
        Self::default()
    }

    /// A slot that already holds a channel.
    pub fn with_channel(channel: Arc<dyn DeliveryChannel>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Some(channel))),
        }
    }

    /// Install a channel, replacing any previous one.
    pub async fn attach(&self, channel: Arc<dyn DeliveryChannel>) {
        *self.inner.write().await = Some(channel);
        tracing::info!("Delivery channel attached");
    }

    /// Drop the current channel. Later calls fail as unavailable.
    pub async fn detach(&self) {
        if self.inner.write().await.take().is_some() {
            tracing::info!("Delivery channel detached");
        }
    }

    pub async fn is_attached(&self) -> bool {
        self.inner.read().await.is_some()
    }

    async fn current(&self) -> Option<Arc<dyn DeliveryChannel>> {
        self.inner.read().await.clone()
    }
}

#[async_trait]
impl DeliveryChannel for ChannelSlot {
    async fn invoke(&self, method: &str, args: Value) -> ChannelResult<Value> {
        // Never hold the slot lock across the call.
        match self.current().await {
            Some(channel) => channel.invoke(method, args).await,
            None => Err(ChannelError::unavailable("no channel attached")),
        }
    }

    async fn is_ready(&self) -> bool {
        match self.current().await {
            Some(channel) => channel.is_ready().await,
            None => false,
        }
    }
}

/// One call observed by a [`ScriptedChannel`].
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub method: String,
    pub args: Value,
    pub at: Instant,
}

#[derive(Debug)]
struct Script {
    queued: VecDeque<ChannelResult<Value>>,
    fallback: ChannelResult<Value>,
    ready: bool,
    calls: Vec<RecordedCall>,
}

/// A channel that answers from a script and records every call.
///
/// Queued responses are consumed in order; once empty, every call gets the
/// fallback response.
#[derive(Debug, Clone)]
pub struct ScriptedChannel {
    script: Arc<Mutex<Script>>,
}

impl ScriptedChannel {
    fn with_fallback(fallback: ChannelResult<Value>, ready: bool) -> Self {
        Self {
            script: Arc::new(Mutex::new(Script {
                queued: VecDeque::new(),
                fallback,
                ready,
                calls: Vec::new(),
            })),
        }
    }

    /// Acknowledges every call.
    pub fn accepting() -> Self {
        Self::with_fallback(Ok(Value::String("ok".to_string())), true)
    }

    /// Fails every call as unavailable and reports not ready.
    pub fn unavailable() -> Self {
        Self::with_fallback(Err(ChannelError::unavailable("application not running")), false)
    }

    /// Fails the first `failures` calls, then acknowledges.
    pub fn failing_first(failures: usize) -> Self {
        let channel = Self::accepting();
        for _ in 0..failures {
            channel.push_response(Err(ChannelError::unavailable("bridge not ready")));
        }
        channel
    }

    /// Queue the response for the next unanswered call.
    pub fn push_response(&self, response: ChannelResult<Value>) {
        self.script.lock().queued.push_back(response);
    }

    pub fn set_ready(&self, ready: bool) {
        self.script.lock().ready = ready;
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.script.lock().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.script.lock().calls.len()
    }

    /// Notes carried by the recorded `logExpense` payloads, in call order.
    pub fn delivered_notes(&self) -> Vec<String> {
        self.script
            .lock()
            .calls
            .iter()
            .filter_map(|call| call.args.get("note").and_then(Value::as_str))
            .map(str::to_string)
            .collect()
    }
}

#[async_trait]
impl DeliveryChannel for ScriptedChannel {
    async fn invoke(&self, method: &str, args: Value) -> ChannelResult<Value> {
        let mut script = self.script.lock();
        script.calls.push(RecordedCall {
            method: method.to_string(),
            args,
            at: Instant::now(),
        });
        match script.queued.pop_front() {
            Some(response) => response,
            None => script.fallback.clone(),
        }
    }

    async fn is_ready(&self) -> bool {
        self.script.lock().ready
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_empty_slot_is_unavailable() {
        let slot = ChannelSlot::new();
        assert!(!slot.is_ready().await);
        assert!(!slot.is_attached().await);

        let err = slot.invoke(LOG_EXPENSE_METHOD, json!({})).await.unwrap_err();
        assert!(err.is_unavailable());
    }

    #[tokio::test]
    async fn test_attach_and_detach() {
        let slot = ChannelSlot::new();
        let channel = ScriptedChannel::accepting();
        slot.attach(Arc::new(channel.clone())).await;

        assert!(slot.is_ready().await);
        let ack = slot.invoke(LOG_EXPENSE_METHOD, json!({"note": "x"})).await.unwrap();
        assert_eq!(ack, json!("ok"));
        assert_eq!(channel.call_count(), 1);

        slot.detach().await;
        assert!(slot.invoke(LOG_EXPENSE_METHOD, json!({})).await.is_err());
        assert_eq!(channel.call_count(), 1);
    }

    #[tokio::test]
    async fn test_clones_share_the_slot() {
        let slot = ChannelSlot::new();
        let other = slot.clone();
        other.attach(Arc::new(ScriptedChannel::accepting())).await;
        assert!(slot.is_attached().await);
    }

    #[tokio::test]
    async fn test_scripted_channel_consumes_queue_then_fallback() {
        let channel = ScriptedChannel::failing_first(2);
        assert!(channel.invoke("m", json!(1)).await.is_err());
        assert!(channel.invoke("m", json!(2)).await.is_err());
        assert!(channel.invoke("m", json!(3)).await.is_ok());
        assert!(channel.invoke("m", json!(4)).await.is_ok());

        let args: Vec<_> = channel.calls().into_iter().map(|c| c.args).collect();
        assert_eq!(args, vec![json!(1), json!(2), json!(3), json!(4)]);
    }

    #[tokio::test]
    async fn test_remote_error_passes_through() {
        let channel = ScriptedChannel::accepting();
        channel.push_response(Err(ChannelError::remote("INVALID_ARGUMENTS", "bad")));
        let slot = ChannelSlot::with_channel(Arc::new(channel));

        match slot.invoke(LOG_EXPENSE_METHOD, json!({})).await {
            Err(ChannelError::Remote { code, .. }) => assert_eq!(code, "INVALID_ARGUMENTS"),
            other => panic!("expected remote error, got {:?}", other),
        }
    }
}
