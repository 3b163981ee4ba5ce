//! Pending expense record and its field types.

use chrono::{DateTime, Utc};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Currency amount held as integer minor units (cents).
///
/// Serialized as fixed 2-decimal text (`"25.50"`). Deserializes from that
/// text or from a bare JSON number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Amount {
    cents: i64,
}

/// Error returned when an amount string is not a decimal number.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid amount: {0:?}")]
pub struct AmountParseError(pub String);

impl Amount {
    pub const ZERO: Amount = Amount { cents: 0 };

    pub const fn from_cents(cents: i64) -> Self {
        Self { cents }
    }

    pub const fn cents(&self) -> i64 {
        self.cents
    }

    /// Parse decimal text such as `"25.5"`, `"$5"` or `"-3.125"`.
    ///
    /// Digits past the second decimal place are rounded half away from zero.
    pub fn parse(input: &str) -> Result<Self, AmountParseError> {
        let err = || AmountParseError(input.to_string());
        let mut text = input.trim();

        let negative = match text.as_bytes().first() {
            Some(b'-') => {
                text = &text[1..];
                true
            }
            Some(b'+') => {
                text = &text[1..];
                false
            }
            _ => false,
        };
        let text = text.strip_prefix('$').unwrap_or(text);

        let (whole, frac) = match text.split_once('.') {
            Some((whole, frac)) => (whole, frac),
            None => (text, ""),
        };
        if whole.is_empty() && frac.is_empty() {
            return Err(err());
        }
        if !whole.bytes().all(|b| b.is_ascii_digit()) || !frac.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(err());
        }

        let whole_value: i64 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| err())?
        };

        let frac_digits = frac.as_bytes();
        let digit = |i: usize| frac_digits.get(i).map(|d| i64::from(d - b'0')).unwrap_or(0);
        let mut frac_value = digit(0) * 10 + digit(1);
        if digit(2) >= 5 {
            frac_value += 1;
        }

        let cents = whole_value
            .checked_mul(100)
            .and_then(|c| c.checked_add(frac_value))
            .ok_or_else(err)?;

        Ok(Self {
            cents: if negative { -cents } else { cents },
        })
    }

    /// Convert a floating point amount, rounding to the nearest cent.
    pub fn from_f64(value: f64) -> Option<Self> {
        if !value.is_finite() {
            return None;
        }
        let cents = (value * 100.0).round();
        if cents.abs() > i64::MAX as f64 {
            return None;
        }
        Some(Self {
            cents: cents as i64,
        })
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.cents < 0 { "-" } else { "" };
        let abs = self.cents.unsigned_abs();
        write!(f, "{}{}.{:02}", sign, abs / 100, abs % 100)
    }
}

impl FromStr for Amount {
    type Err = AmountParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct AmountVisitor;

        impl<'de> Visitor<'de> for AmountVisitor {
            type Value = Amount;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a decimal amount as text or number")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Amount, E> {
                Amount::parse(v).map_err(E::custom)
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Amount, E> {
                v.checked_mul(100)
                    .map(Amount::from_cents)
                    .ok_or_else(|| E::custom("amount out of range"))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Amount, E> {
                i64::try_from(v)
                    .map_err(|_| E::custom("amount out of range"))
                    .and_then(|v| self.visit_i64(v))
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<Amount, E> {
                Amount::from_f64(v).ok_or_else(|| E::custom("amount out of range"))
            }
        }

        deserializer.deserialize_any(AmountVisitor)
    }
}

/// Closed category set offered at the voice trigger boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KnownCategory {
    Food,
    Transport,
    Shopping,
    Entertainment,
    Bills,
    Health,
    Other,
}

impl KnownCategory {
    pub const ALL: [KnownCategory; 7] = [
        KnownCategory::Food,
        KnownCategory::Transport,
        KnownCategory::Shopping,
        KnownCategory::Entertainment,
        KnownCategory::Bills,
        KnownCategory::Health,
        KnownCategory::Other,
    ];

    /// Wire tag for this category.
    pub fn as_str(&self) -> &'static str {
        match self {
            KnownCategory::Food => "food",
            KnownCategory::Transport => "transport",
            KnownCategory::Shopping => "shopping",
            KnownCategory::Entertainment => "entertainment",
            KnownCategory::Bills => "bills",
            KnownCategory::Health => "health",
            KnownCategory::Other => "other",
        }
    }

    /// Case-insensitive lookup of a wire tag.
    pub fn from_tag(tag: &str) -> Option<Self> {
        let tag = tag.trim();
        Self::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(tag))
    }
}

impl fmt::Display for KnownCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Expense category: a known tag, or free-form text kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Category {
    Known(KnownCategory),
    Custom(String),
}

impl Category {
    /// Blank input maps to `other`; unknown text becomes `Custom` (trimmed).
    pub fn parse(input: &str) -> Self {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Category::Known(KnownCategory::Other);
        }
        match KnownCategory::from_tag(trimmed) {
            Some(known) => Category::Known(known),
            None => Category::Custom(trimmed.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Category::Known(known) => known.as_str(),
            Category::Custom(text) => text,
        }
    }

    pub fn is_known(&self) -> bool {
        matches!(self, Category::Known(_))
    }
}

impl Default for Category {
    fn default() -> Self {
        Category::Known(KnownCategory::Other)
    }
}

impl From<KnownCategory> for Category {
    fn from(known: KnownCategory) -> Self {
        Category::Known(known)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Category {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Category {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Category::parse(&raw))
    }
}

/// External correlation id assigned at creation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExpenseId(String);

impl ExpenseId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string().to_uppercase())
    }

    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Records written by older builds may carry no id.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ExpenseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One expense waiting to reach the consuming application.
///
/// Stored as a flat map with keys `amount`, `category`, `note`,
/// `timestamp` (seconds since epoch) and `id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingExpense {
    pub amount: Amount,
    #[serde(default)]
    pub category: Category,
    #[serde(default)]
    pub note: String,
    #[serde(with = "epoch_seconds", default = "epoch_zero")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub id: ExpenseId,
}

impl PendingExpense {
    /// Create a record stamped with the current time and a fresh id.
    pub fn new(amount: Amount, category: Category, note: impl Into<String>) -> Self {
        Self {
            amount,
            category,
            note: note.into(),
            timestamp: now_millis(),
            id: ExpenseId::new(),
        }
    }

    pub fn with_id(mut self, id: ExpenseId) -> Self {
        self.id = id;
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = truncate_to_millis(timestamp);
        self
    }

    /// Arguments for the `logExpense` call: `{amount, category, note}`.
    pub fn to_payload(&self) -> serde_json::Value {
        serde_json::json!({
            "amount": self.amount.to_string(),
            "category": self.category.as_str(),
            "note": self.note,
        })
    }
}

fn epoch_zero() -> DateTime<Utc> {
    DateTime::<Utc>::default()
}

fn now_millis() -> DateTime<Utc> {
    truncate_to_millis(Utc::now())
}

fn truncate_to_millis(ts: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ts.timestamp_millis()).unwrap_or(ts)
}

/// Timestamps travel as floating point seconds with millisecond precision.
mod epoch_seconds {
    use chrono::{DateTime, Utc};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(ts.timestamp_millis() as f64 / 1000.0)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let seconds = f64::deserialize(deserializer)?;
        if !seconds.is_finite() {
            return Err(de::Error::custom("timestamp is not finite"));
        }
        DateTime::from_timestamp_millis((seconds * 1000.0).round() as i64)
            .ok_or_else(|| de::Error::custom("timestamp out of range"))
    }
}
