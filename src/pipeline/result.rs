use serde::{Deserialize, Serialize};

use crate::clustering::transfer::unix_now;
use crate::clustering::Pattern;

/// Outcome of processing one transfer. Never mutated after it is produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    #[serde(rename = "TransactionID")]
    pub transaction_id: String,
    #[serde(rename = "PredictedLabel")]
    pub predicted_label: bool,
    #[serde(rename = "PredictedPattern")]
    pub predicted_pattern: Pattern,
    #[serde(rename = "RiskScore")]
    pub risk_score: f64,
    /// Unix seconds at which the result was produced
    #[serde(rename = "Timestamp")]
    pub timestamp: f64,
}

impl ClassificationResult {
    /// Result used when no model signal is available.
    pub fn zero_risk(transaction_id: impl Into<String>) -> Self {
        Self {
            transaction_id: transaction_id.into(),
            predicted_label: false,
            predicted_pattern: Pattern::None,
            risk_score: 0.0,
            timestamp: unix_now(),
        }
    }
}
