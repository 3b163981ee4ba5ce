//! IPC protocol definitions.
//!
//! JSON-RPC-like requests and responses, one JSON document per line, over
//! Unix domain sockets. The same envelope is used inbound (application and
//! CLI to relay) and outbound (relay to application).

use serde::{Deserialize, Serialize};
use std::fmt;

/// IPC method types. Wire names are camelCase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Method {
    // Daemon
    Health,
    Shutdown,

    // Buffer inspection
    #[serde(
        alias = "getShortcutExpenses",
        alias = "getUrlExpenses",
        alias = "getSimpleExpenses"
    )]
    GetPendingExpenses,
    #[serde(
        alias = "clearShortcutExpenses",
        alias = "clearUrlExpenses",
        alias = "clearSimpleExpenses",
        alias = "clearSiriExpenses"
    )]
    ClearPendingExpenses,
    TestWrite,

    // Delivery target (served by the application)
    LogExpense,

    // Triggers
    AddExpense,
    OpenUrl,
    GetInitialUrl,

    // Lifecycle signals
    AppBecameActive,
    SyncRequested,

    // Channel management
    AttachChannel,
    DetachChannel,
}

impl Method {
    pub const ALL: [Method; 13] = [
        Method::Health,
        Method::Shutdown,
        Method::GetPendingExpenses,
        Method::ClearPendingExpenses,
        Method::TestWrite,
        Method::LogExpense,
        Method::AddExpense,
        Method::OpenUrl,
        Method::GetInitialUrl,
        Method::AppBecameActive,
        Method::SyncRequested,
        Method::AttachChannel,
        Method::DetachChannel,
    ];

    /// Canonical wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Health => "health",
            Method::Shutdown => "shutdown",
            Method::GetPendingExpenses => "getPendingExpenses",
            Method::ClearPendingExpenses => "clearPendingExpenses",
            Method::TestWrite => "testWrite",
            Method::LogExpense => "logExpense",
            Method::AddExpense => "addExpense",
            Method::OpenUrl => "openUrl",
            Method::GetInitialUrl => "getInitialUrl",
            Method::AppBecameActive => "appBecameActive",
            Method::SyncRequested => "syncRequested",
            Method::AttachChannel => "attachChannel",
            Method::DetachChannel => "detachChannel",
        }
    }

    /// Look up a method by wire name, aliases included.
    pub fn from_name(name: &str) -> Option<Self> {
        serde_json::from_value(serde_json::Value::String(name.to_string())).ok()
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// IPC request message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Request ID for correlation.
    pub id: String,
    /// Method to invoke.
    pub method: Method,
    /// Method parameters (optional).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

/// Envelope fields readable even when the method is unknown.
#[derive(Debug, Deserialize)]
pub(crate) struct RawRequest {
    #[serde(default)]
    pub id: String,
    pub method: String,
}

impl Request {
    /// Create a new request with auto-generated ID.
    pub fn new(method: Method) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            method,
            params: None,
        }
    }

    /// Create a new request with parameters.
    pub fn with_params(method: Method, params: serde_json::Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            method,
            params: Some(params),
        }
    }

    /// Read a string parameter.
    pub fn param_str(&self, name: &str) -> Option<&str> {
        self.params
            .as_ref()
            .and_then(|p| p.get(name))
            .and_then(|v| v.as_str())
    }

    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// IPC response message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// Request ID for correlation.
    pub id: String,
    /// Result data (if successful).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    /// Error information (if failed).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

/// Error information in a response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Error code.
    pub code: i32,
    /// Error message.
    pub message: String,
    /// Additional error data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ErrorInfo {
    /// Symbolic code: `data.code` when the peer sent one, else the name of
    /// the numeric code.
    pub fn code_name(&self) -> String {
        self.data
            .as_ref()
            .and_then(|d| d.get("code"))
            .and_then(|c| c.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| error_codes::name(self.code).to_string())
    }
}

impl Response {
    /// Create a successful response.
    pub fn success(id: &str, result: serde_json::Value) -> Self {
        Self {
            id: id.to_string(),
            result: Some(result),
            error: None,
        }
    }

    /// Create an error response.
    pub fn error(id: &str, code: i32, message: &str) -> Self {
        Self {
            id: id.to_string(),
            result: None,
            error: Some(ErrorInfo {
                code,
                message: message.to_string(),
                data: None,
            }),
        }
    }

    /// Create an error response with additional data.
    pub fn error_with_data(id: &str, code: i32, message: &str, data: serde_json::Value) -> Self {
        Self {
            id: id.to_string(),
            result: None,
            error: Some(ErrorInfo {
                code,
                message: message.to_string(),
                data: Some(data),
            }),
        }
    }

    /// `INVALID_ARGUMENTS` error, carrying the symbolic code in `data`.
    pub fn invalid_arguments(id: &str, message: &str) -> Self {
        Self::error_with_data(
            id,
            error_codes::INVALID_ARGUMENTS,
            message,
            serde_json::json!({ "code": "INVALID_ARGUMENTS" }),
        )
    }

    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Check if the response is successful.
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

// Standard error codes
pub mod error_codes {
    pub const PARSE_ERROR: i32 = -32700;
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;
    pub const INVALID_ARGUMENTS: i32 = -32010;

    pub fn name(code: i32) -> &'static str {
        match code {
            PARSE_ERROR => "PARSE_ERROR",
            INVALID_REQUEST => "INVALID_REQUEST",
            METHOD_NOT_FOUND => "METHOD_NOT_FOUND",
            INVALID_PARAMS => "INVALID_PARAMS",
            INTERNAL_ERROR => "INTERNAL_ERROR",
            INVALID_ARGUMENTS => "INVALID_ARGUMENTS",
            _ => "UNKNOWN_ERROR",
        }
    }
}
