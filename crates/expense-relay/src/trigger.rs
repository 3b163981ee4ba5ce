//! Building pending expenses from voice intents and deep links.

use crate::{TriggerError, TriggerResult};
use pending_expense_store::{Amount, Category, KnownCategory, PendingExpense};
use serde::Deserialize;
use serde_json::Value;
use url::Url;

pub const DEFAULT_AMOUNT: Amount = Amount::from_cents(500);
pub const VOICE_DEFAULT_NOTE: &str = "Added via Siri";
pub const URL_DEFAULT_NOTE: &str = "Added via shortcut link";
pub const URL_SCHEME: &str = "ledgerlite";
pub const URL_HOST: &str = "add-expense";

/// Parameters of an "add expense" voice intent. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct IntentParams {
    #[serde(default)]
    pub amount: Option<Amount>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
}

impl IntentParams {
    /// Decode intent parameters from IPC arguments; `null` means no parameters.
    ///
    /// A non-blank category must be one of the known tags.
    pub fn from_args(args: Option<&Value>) -> TriggerResult<Self> {
        let params: Self = match args {
            None | Some(Value::Null) => return Ok(Self::default()),
            Some(value @ Value::Object(_)) => serde_json::from_value(value.clone())
                .map_err(|e| TriggerError::InvalidArguments(e.to_string()))?,
            Some(_) => {
                return Err(TriggerError::InvalidArguments(
                    "expected an object of intent parameters".to_string(),
                ))
            }
        };

        if let Some(tag) = params.category.as_deref() {
            if !tag.trim().is_empty() && KnownCategory::from_tag(tag).is_none() {
                return Err(TriggerError::InvalidArguments(format!(
                    "unknown category: {}",
                    tag
                )));
            }
        }
        Ok(params)
    }

    /// Apply the voice defaults: 5.00, `other`, "Added via Siri".
    pub fn into_expense(self) -> PendingExpense {
        self.into_expense_with_note(VOICE_DEFAULT_NOTE)
    }

    fn into_expense_with_note(self, default_note: &str) -> PendingExpense {
        let category = self
            .category
            .as_deref()
            .map(Category::parse)
            .unwrap_or_default();
        PendingExpense::new(
            self.amount.unwrap_or(DEFAULT_AMOUNT),
            category,
            self.note.unwrap_or_else(|| default_note.to_string()),
        )
    }
}

/// Parse `ledgerlite://add-expense?amount=..&category=..&note=..`.
pub fn parse_expense_url(input: &str) -> TriggerResult<PendingExpense> {
    let url = Url::parse(input.trim())
        .map_err(|e| TriggerError::InvalidArguments(format!("invalid url: {}", e)))?;

    if url.scheme() != URL_SCHEME {
        return Err(TriggerError::InvalidArguments(format!(
            "unsupported scheme: {}",
            url.scheme()
        )));
    }
    if url.host_str() != Some(URL_HOST) {
        return Err(TriggerError::InvalidArguments(format!(
            "unsupported action: {}",
            url.host_str().unwrap_or("")
        )));
    }

    let mut params = IntentParams::default();
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "amount" => {
                let amount = Amount::parse(&value)
                    .map_err(|e| TriggerError::InvalidArguments(e.to_string()))?;
                params.amount = Some(amount);
            }
            "category" => params.category = Some(value.into_owned()),
            "note" => params.note = Some(value.into_owned()),
            _ => {}
        }
    }

    Ok(params.into_expense_with_note(URL_DEFAULT_NOTE))
}

/// Arguments of an inbound `logExpense` call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogExpenseArgs {
    pub amount: Option<String>,
    pub category: Option<String>,
    pub note: Option<String>,
}

/// Accept any object; pick out the string fields we know about.
pub fn validate_log_expense(args: Option<&Value>) -> TriggerResult<LogExpenseArgs> {
    let Some(Value::Object(map)) = args else {
        return Err(TriggerError::InvalidArguments(
            "Expected expense payload object".to_string(),
        ));
    };

    let field = |name: &str| map.get(name).and_then(Value::as_str).map(str::to_string);
    Ok(LogExpenseArgs {
        amount: field("amount"),
        category: field("category"),
        note: field("note"),
    })
}
