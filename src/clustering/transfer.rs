//! Transfer records
//!
//! `RawTransfer` is what producers hand to the pipeline (chain adapter,
//! replay file, direct calls). `TransferRecord` is the validated, immutable
//! form that the cluster store accepts as edge metadata.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

use crate::errors::{AmlError, Result};

/// Transfer as received, before validation.
///
/// Accepts the simulator field names (`TransactionID`, `SenderAccount`, ...)
/// as aliases. Unknown fields are kept as passthrough attributes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawTransfer {
    #[serde(default, alias = "TransactionID", alias = "hash")]
    pub id: Option<String>,
    #[serde(default, alias = "SenderAccount", alias = "from")]
    pub sender: Option<String>,
    #[serde(default, alias = "ReceiverAccount", alias = "to")]
    pub receiver: Option<String>,
    #[serde(default, alias = "Amount")]
    pub amount: f64,
    #[serde(default, alias = "Timestamp", deserialize_with = "deserialize_timestamp")]
    pub timestamp: Option<f64>,
    #[serde(flatten)]
    pub attributes: BTreeMap<String, serde_json::Value>,
}

impl RawTransfer {
    pub fn new(
        id: impl Into<String>,
        sender: impl Into<String>,
        receiver: impl Into<String>,
        amount: f64,
    ) -> Self {
        Self {
            id: Some(id.into()),
            sender: Some(sender.into()),
            receiver: Some(receiver.into()),
            amount,
            timestamp: None,
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_timestamp(mut self, timestamp: f64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    /// Best-effort id for log lines about a record that may be invalid.
    pub fn display_id(&self) -> &str {
        self.id.as_deref().unwrap_or("<missing id>")
    }

    /// Validate into an immutable record. A missing timestamp falls back to
    /// the current wall clock.
    pub fn validate(self) -> Result<TransferRecord> {
        let id = non_empty(self.id, "id")?;
        let sender = non_empty(self.sender, "sender")?;
        let receiver = non_empty(self.receiver, "receiver")?;

        if !self.amount.is_finite() || self.amount < 0.0 {
            return Err(AmlError::Validation(format!(
                "transfer {}: amount must be a finite non-negative number, got {}",
                id, self.amount
            )));
        }

        let timestamp = self.timestamp.unwrap_or_else(unix_now);

        Ok(TransferRecord {
            id,
            sender,
            receiver,
            amount: self.amount,
            timestamp,
            attributes: self.attributes,
        })
    }
}

fn non_empty(value: Option<String>, field: &str) -> Result<String> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(AmlError::Validation(format!("transfer is missing {}", field))),
    }
}

/// Validated transfer. Immutable once created; carried as edge metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransferRecord {
    id: String,
    sender: String,
    receiver: String,
    amount: f64,
    timestamp: f64,
    attributes: BTreeMap<String, serde_json::Value>,
}

impl TransferRecord {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn sender(&self) -> &str {
        &self.sender
    }

    pub fn receiver(&self) -> &str {
        &self.receiver
    }

    pub fn amount(&self) -> f64 {
        self.amount
    }

    /// Unix seconds.
    pub fn timestamp(&self) -> f64 {
        self.timestamp
    }

    pub fn attributes(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.attributes
    }
}

pub(crate) fn unix_now() -> f64 {
    Utc::now().timestamp_millis() as f64 / 1000.0
}

/// Accepts unix seconds (integer or float) or an ISO-8601 string.
fn deserialize_timestamp<'de, D>(deserializer: D) -> std::result::Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    match value {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::Number(n)) => n
            .as_f64()
            .map(Some)
            .ok_or_else(|| D::Error::custom("timestamp out of range")),
        Some(serde_json::Value::String(s)) => parse_iso_timestamp(&s)
            .map(Some)
            .ok_or_else(|| D::Error::custom(format!("unrecognized timestamp: {}", s))),
        Some(other) => Err(D::Error::custom(format!("unsupported timestamp value: {}", other))),
    }
}

fn parse_iso_timestamp(s: &str) -> Option<f64> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.timestamp_millis() as f64 / 1000.0);
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc().timestamp_millis() as f64 / 1000.0)
}
