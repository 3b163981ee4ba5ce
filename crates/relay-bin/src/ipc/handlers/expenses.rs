//! Buffer inspection and the `logExpense` receiver.

use crate::app::DaemonState;
use expense_relay::{validate_log_expense, TriggerError};
use pending_expense_store::{Amount, Category, PendingExpense};
use relay_ipc::{error_codes, IpcServer, Method, Response};
use tracing::{error, info};

/// Register buffer handlers.
pub async fn register(server: &IpcServer, state: DaemonState) {
    let s = state.clone();
    server
        .register_handler(Method::GetPendingExpenses, move |req| {
            let state = s.clone();
            async move {
                let records = match state.relay.buffer().read_all() {
                    Ok(records) => records,
                    Err(e) => return internal_error(&req.id, "read pending expenses", e),
                };
                match serde_json::to_value(&records) {
                    Ok(value) => Response::success(&req.id, value),
                    Err(e) => internal_error(&req.id, "encode pending expenses", e),
                }
            }
        })
        .await;

    let s = state.clone();
    server
        .register_handler(Method::ClearPendingExpenses, move |req| {
            let state = s.clone();
            async move {
                match state.relay.buffer().clear() {
                    Ok(()) => {
                        info!("Pending expenses cleared");
                        Response::success(&req.id, serde_json::json!("Pending expenses cleared"))
                    }
                    Err(e) => internal_error(&req.id, "clear pending expenses", e),
                }
            }
        })
        .await;

    // Acknowledge only; the app owns the ledger.
    server
        .register_handler(Method::LogExpense, |req| async move {
            match validate_log_expense(req.params.as_ref()) {
                Ok(args) => {
                    info!(
                        amount = args.amount.as_deref().unwrap_or("0.00"),
                        category = args.category.as_deref().unwrap_or("other"),
                        note = args.note.as_deref().unwrap_or(""),
                        "Received expense"
                    );
                    Response::success(&req.id, serde_json::json!("Expense logged successfully"))
                }
                Err(TriggerError::InvalidArguments(message)) => {
                    Response::invalid_arguments(&req.id, &message)
                }
            }
        })
        .await;

    let s = state;
    server
        .register_handler(Method::TestWrite, move |req| {
            let state = s.clone();
            async move {
                let record = PendingExpense::new(
                    Amount::from_cents(1000),
                    Category::parse("test"),
                    "Test expense",
                );
                match state.relay.buffer().append(&record) {
                    Ok(()) => Response::success(&req.id, serde_json::json!("Test expense written")),
                    Err(e) => internal_error(&req.id, "write test expense", e),
                }
            }
        })
        .await;

    info!("Registered expense handlers");
}

fn internal_error(id: &str, action: &str, e: impl std::fmt::Display) -> Response {
    error!(error = %e, "Failed to {}", action);
    Response::error(
        id,
        error_codes::INTERNAL_ERROR,
        &format!("Failed to {}: {}", action, e),
    )
}

#[cfg(test)]
mod tests {
    use crate::ipc::handlers::test_support::Harness;
    use pending_expense_store::{Amount, Category, DurableBuffer, PendingExpense};
    use relay_ipc::Method;
    use serde_json::json;

    #[tokio::test]
    async fn test_get_pending_returns_flat_records_in_order() {
        let harness = Harness::offline().await;
        for (cents, note) in [(550, "first"), (1200, "second")] {
            harness
                .buffer
                .append(&PendingExpense::new(Amount::from_cents(cents), Category::parse("food"), note))
                .unwrap();
        }

        let records = harness.ok(Method::GetPendingExpenses, None).await;
        let records = records.as_array().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["amount"], "5.50");
        assert_eq!(records[0]["category"], "food");
        assert_eq!(records[0]["note"], "first");
        assert!(records[0]["timestamp"].is_number());
        assert!(records[0]["id"].is_string());
        assert_eq!(records[1]["note"], "second");
    }

    #[tokio::test]
    async fn test_clear_and_legacy_alias() {
        let harness = Harness::offline().await;
        harness.ok(Method::TestWrite, None).await;
        assert_eq!(harness.buffer.len().unwrap(), 1);

        let mut stream = harness.client.connect().await.unwrap();
        let reply =
            send_raw_line(&mut stream, r#"{"id":"c1","method":"clearSiriExpenses"}"#).await;
        assert_eq!(reply["result"], "Pending expenses cleared");
        assert!(harness.buffer.is_empty().unwrap());
    }

    async fn send_raw_line(
        stream: &mut tokio::net::UnixStream,
        line: &str,
    ) -> serde_json::Value {
        use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
        stream.write_all(line.as_bytes()).await.unwrap();
        stream.write_all(b"\n").await.unwrap();
        let mut reader = BufReader::new(stream);
        let mut reply = String::new();
        reader.read_line(&mut reply).await.unwrap();
        serde_json::from_str(reply.trim()).unwrap()
    }

    #[tokio::test]
    async fn test_test_write_appends_fixed_record() {
        let harness = Harness::offline().await;
        assert_eq!(harness.ok(Method::TestWrite, None).await, json!("Test expense written"));

        let stored = harness.buffer.read_all().unwrap();
        assert_eq!(stored[0].amount.to_string(), "10.00");
        assert_eq!(stored[0].category.as_str(), "test");
        assert_eq!(stored[0].note, "Test expense");
    }

    #[tokio::test]
    async fn test_log_expense_validates_payload_without_mutating() {
        let harness = Harness::offline().await;

        let ack = harness
            .ok(
                Method::LogExpense,
                Some(json!({"amount": "5.00", "category": "other", "note": "Added via Siri"})),
            )
            .await;
        assert_eq!(ack, json!("Expense logged successfully"));

        assert_eq!(
            harness.err(Method::LogExpense, Some(json!(["not", "an", "object"]))).await,
            "INVALID_ARGUMENTS"
        );
        assert_eq!(harness.err(Method::LogExpense, None).await, "INVALID_ARGUMENTS");
        assert!(harness.buffer.is_empty().unwrap());
    }
}
