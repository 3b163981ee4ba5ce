//! One-shot commands that talk to a running relay.
//!
//! Triggers and buffer inspection fall back to the SQLite buffer when no
//! relay answers, the same way a trigger with no reachable app still lands in
//! the buffer. `sync` needs a running relay.

use expense_relay::{parse_expense_url, IntentParams};
use pending_expense_store::{DurableBuffer, PendingExpense, SqliteBuffer};
use relay_config_and_utils::Paths;
use relay_ipc::{IpcClient, Method, Response};
use serde_json::{json, Map, Value};
use tracing::debug;

type CliResult = Result<(), Box<dyn std::error::Error>>;

/// `add`: trigger an expense with voice-intent defaults.
pub async fn add_expense(
    paths: &Paths,
    amount: Option<String>,
    category: Option<String>,
    note: Option<String>,
) -> CliResult {
    let params = intent_params(amount, category, note);

    match call_relay(paths, Method::AddExpense, Some(params.clone())).await? {
        Some(response) => print_response(response),
        None => {
            let record = IntentParams::from_args(Some(&params))?.into_expense();
            buffer_offline(paths, &record)
        }
    }
}

/// `open-url`: trigger an expense from a `ledgerlite://add-expense` link.
pub async fn open_url(paths: &Paths, url: &str) -> CliResult {
    match call_relay(paths, Method::OpenUrl, Some(json!({ "url": url }))).await? {
        Some(response) => print_response(response),
        None => {
            let record = parse_expense_url(url)?;
            buffer_offline(paths, &record)
        }
    }
}

/// `pending`: print the buffered records.
pub async fn print_pending(paths: &Paths) -> CliResult {
    match call_relay(paths, Method::GetPendingExpenses, None).await? {
        Some(response) => print_response(response),
        None => {
            let records = open_store(paths)?.read_all()?;
            println!("{}", serde_json::to_string_pretty(&records)?);
            Ok(())
        }
    }
}

/// `clear`: drop every buffered record.
pub async fn clear_pending(paths: &Paths) -> CliResult {
    match call_relay(paths, Method::ClearPendingExpenses, None).await? {
        Some(response) => print_response(response),
        None => {
            open_store(paths)?.clear()?;
            println!("Pending expenses cleared");
            Ok(())
        }
    }
}

/// `sync`: run a drain pass now and print its report.
pub async fn sync_now(paths: &Paths) -> CliResult {
    match call_relay(paths, Method::SyncRequested, None).await? {
        Some(response) => print_response(response),
        None => Err("Relay is not running; start it with 'ledgerlite-relay start'".into()),
    }
}

fn intent_params(
    amount: Option<String>,
    category: Option<String>,
    note: Option<String>,
) -> Value {
    let mut params = Map::new();
    for (key, value) in [("amount", amount), ("category", category), ("note", note)] {
        if let Some(value) = value {
            params.insert(key.to_string(), Value::String(value));
        }
    }
    Value::Object(params)
}

/// Send one request. `None` means no relay is listening.
async fn call_relay(
    paths: &Paths,
    method: Method,
    params: Option<Value>,
) -> Result<Option<Response>, Box<dyn std::error::Error>> {
    let socket_path = paths.socket_file();
    if !socket_path.exists() {
        return Ok(None);
    }

    let client = IpcClient::new(&socket_path);
    let result = match params {
        Some(params) => client.call_method_with_params(method, params).await,
        None => client.call_method(method).await,
    };
    match result {
        Ok(response) => Ok(Some(response)),
        Err(relay_ipc::IpcError::Socket(e)) => {
            debug!(error = %e, "Relay socket is stale");
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

fn print_response(response: Response) -> CliResult {
    if let Some(error) = response.error {
        return Err(format!("{}: {}", error.code_name(), error.message).into());
    }
    match response.result.unwrap_or(Value::Null) {
        Value::String(message) => println!("{}", message),
        other => println!("{}", serde_json::to_string_pretty(&other)?),
    }
    Ok(())
}

fn open_store(paths: &Paths) -> Result<SqliteBuffer, Box<dyn std::error::Error>> {
    paths.ensure_dirs()?;
    Ok(SqliteBuffer::open(&paths.database_file())?)
}

fn buffer_offline(paths: &Paths, record: &PendingExpense) -> CliResult {
    open_store(paths)?.append(record)?;
    println!(
        "Relay is not running; expense {} buffered, will sync later",
        record.id
    );
    Ok(())
}
