//! Expense triggers: voice intents and `ledgerlite://` links.
//!
//! A trigger always succeeds once its input is valid. Delivery runs in the
//! background and falls back to the buffer, so the caller only learns the
//! record id.

use crate::app::DaemonState;
use expense_relay::{parse_expense_url, IntentParams, TriggerError};
use pending_expense_store::PendingExpense;
use relay_ipc::{IpcServer, Method, Response};
use tracing::info;

/// Register trigger handlers.
pub async fn register(server: &IpcServer, state: DaemonState) {
    let s = state.clone();
    server
        .register_handler(Method::AddExpense, move |req| {
            let state = s.clone();
            async move {
                match IntentParams::from_args(req.params.as_ref()) {
                    Ok(params) => accept(&state, &req.id, params.into_expense()).await,
                    Err(TriggerError::InvalidArguments(message)) => {
                        Response::invalid_arguments(&req.id, &message)
                    }
                }
            }
        })
        .await;

    let s = state.clone();
    server
        .register_handler(Method::OpenUrl, move |req| {
            let state = s.clone();
            async move {
                let Some(url) = req.param_str("url") else {
                    return Response::invalid_arguments(&req.id, "Expected url parameter");
                };
                match parse_expense_url(url) {
                    Ok(record) => {
                        state.remember_url(url).await;
                        accept(&state, &req.id, record).await
                    }
                    Err(TriggerError::InvalidArguments(message)) => {
                        Response::invalid_arguments(&req.id, &message)
                    }
                }
            }
        })
        .await;

    let s = state;
    server
        .register_handler(Method::GetInitialUrl, move |req| {
            let state = s.clone();
            async move { Response::success(&req.id, serde_json::json!(state.initial_url().await)) }
        })
        .await;

    info!("Registered trigger handlers");
}

async fn accept(state: &DaemonState, request_id: &str, record: PendingExpense) -> Response {
    let id = record.id.to_string();
    info!(
        %id,
        amount = %record.amount,
        category = record.category.as_str(),
        "Expense triggered"
    );
    state.relay.submit(record).await;

    Response::success(
        request_id,
        serde_json::json!({
            "id": id,
            "status": "accepted",
            "message": "Expense accepted, will sync later",
        }),
    )
}

#[cfg(test)]
mod tests {
    use crate::ipc::handlers::test_support::Harness;
    use expense_relay::ScriptedChannel;
    use pending_expense_store::DurableBuffer;
    use relay_ipc::Method;
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_add_expense_offline_buffers_with_defaults() {
        let harness = Harness::offline().await;

        let ack = harness.ok(Method::AddExpense, None).await;
        assert_eq!(ack["status"], "accepted");
        harness.state.relay.wait_idle().await;

        let stored = harness.buffer.read_all().unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].id.as_str(), ack["id"].as_str().unwrap());
        assert_eq!(stored[0].amount.to_string(), "5.00");
        assert_eq!(stored[0].category.as_str(), "other");
        assert_eq!(stored[0].note, "Added via Siri");
    }

    #[tokio::test]
    async fn test_add_expense_delivers_when_app_is_attached() {
        let channel = ScriptedChannel::accepting();
        let harness = Harness::with_channel(Arc::new(channel.clone())).await;

        harness
            .ok(Method::AddExpense, Some(json!({"amount": 25.5, "category": "food"})))
            .await;
        harness.state.relay.wait_idle().await;

        assert!(harness.buffer.is_empty().unwrap());
        let calls = channel.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].method, "logExpense");
        assert_eq!(
            calls[0].args,
            json!({"amount": "25.50", "category": "food", "note": "Added via Siri"})
        );
    }

    #[tokio::test]
    async fn test_add_expense_rejects_bad_params() {
        let harness = Harness::offline().await;
        assert_eq!(
            harness.err(Method::AddExpense, Some(json!("five dollars"))).await,
            "INVALID_ARGUMENTS"
        );
        assert_eq!(
            harness.err(Method::AddExpense, Some(json!({"amount": "lots"}))).await,
            "INVALID_ARGUMENTS"
        );
        assert_eq!(
            harness.err(Method::AddExpense, Some(json!({"category": "Pets"}))).await,
            "INVALID_ARGUMENTS"
        );
        harness.state.relay.wait_idle().await;
        assert!(harness.buffer.is_empty().unwrap());
    }

    #[tokio::test]
    async fn test_open_url_is_remembered() {
        let harness = Harness::offline().await;
        assert_eq!(harness.ok(Method::GetInitialUrl, None).await, json!(null));

        let url = "ledgerlite://add-expense?amount=12&category=transport";
        harness.ok(Method::OpenUrl, Some(json!({ "url": url }))).await;
        harness.state.relay.wait_idle().await;

        assert_eq!(harness.ok(Method::GetInitialUrl, None).await, json!(url));
        let stored = harness.buffer.read_all().unwrap();
        assert_eq!(stored[0].amount.to_string(), "12.00");
        assert_eq!(stored[0].note, "Added via shortcut link");
    }

    #[tokio::test]
    async fn test_open_url_rejects_foreign_links() {
        let harness = Harness::offline().await;

        assert_eq!(
            harness
                .err(Method::OpenUrl, Some(json!({"url": "ledgerlite://delete-all"})))
                .await,
            "INVALID_ARGUMENTS"
        );
        assert_eq!(harness.err(Method::OpenUrl, None).await, "INVALID_ARGUMENTS");
        assert_eq!(harness.ok(Method::GetInitialUrl, None).await, json!(null));
    }
}
