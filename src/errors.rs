//! Error types for the detection engine
//!
//! One error enum shared by the clustering core, the risk model seam, the
//! block source and the configuration layer.

use thiserror::Error;

/// Detection engine error
#[derive(Debug, Error)]
pub enum AmlError {
    /// Malformed transfer record (missing sender or receiver, empty id)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Block source failure (RPC error, timeout, malformed block)
    #[error("Block source error: {0}")]
    Source(String),

    /// Risk model failure during inference
    #[error("Risk model error: {0}")]
    Model(String),

    /// Invalid or unreadable configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A collaborator required at startup is unusable
    #[error("Startup error: {component} - {message}")]
    Startup { component: String, message: String },

    /// Serialization/deserialization failure
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unknown error: {0}")]
    Other(String),
}

/// Detection engine result type
pub type Result<T> = std::result::Result<T, AmlError>;

impl AmlError {
    pub fn startup(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Startup { component: component.into(), message: message.into() }
    }

    /// Errors that steady-state ingestion survives: the record or the poll is
    /// dropped/retried and the pipeline keeps running.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::Source(_) | Self::Model(_))
    }

    /// Errors that must stop the process before ingestion starts.
    pub fn is_critical(&self) -> bool {
        matches!(self, Self::Startup { .. } | Self::Configuration(_) | Self::Io(_))
    }
}

impl From<serde_json::Error> for AmlError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for AmlError {
    fn from(err: toml::de::Error) -> Self {
        Self::Configuration(err.to_string())
    }
}
