//! Detector configuration
//!
//! Loaded once at startup from a TOML file, then overridden by environment
//! variables. Every section has defaults so a partial file is valid.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::errors::{AmlError, Result};

/// Window served by `GET /api/alerts`.
pub const DEFAULT_READ_WINDOW: usize = 100;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub blockchain: BlockchainConfig,
    pub listener: ListenerConfig,
    pub pipeline: PipelineConfig,
    pub model: ModelConfig,
    pub alerts: AlertConfig,
    pub api: ApiConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockchainConfig {
    /// JSON-RPC endpoint of the chain node
    pub node_url: String,
    /// Only transactions sent to this address are ingested
    pub contract_address: String,
    /// Contract ABI; when set it must parse at startup
    pub contract_abi_path: Option<PathBuf>,
    /// First block to scan; defaults to the chain head at startup
    pub start_block: Option<u64>,
    pub request_timeout_secs: u64,
}

impl Default for BlockchainConfig {
    fn default() -> Self {
        Self {
            node_url: "http://localhost:8545".to_string(),
            contract_address: String::new(),
            contract_abi_path: None,
            start_block: None,
            request_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Sleep after catching up with the chain head
    pub poll_interval_ms: u64,
    /// Sleep after a failed poll before retrying the same block
    pub retry_backoff_ms: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self { poll_interval_ms: 1_000, retry_backoff_ms: 5_000 }
    }
}

impl ListenerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Minimum risk before the pattern classifier runs
    pub risk_threshold: f64,
    /// Risk above which a transfer is labelled suspicious
    pub label_threshold: f64,
    /// Drain period of a standalone consumer task; 0 leaves draining to
    /// the block listener
    pub drain_interval_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self { risk_threshold: 0.5, label_threshold: 0.75, drain_interval_ms: 0 }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// JSON weights for the node scorer; built-in weights when unset
    pub weights_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// Results retained in memory
    pub capacity: usize,
    /// Results returned by a default read
    pub read_window: usize,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self { capacity: 1_000, read_window: DEFAULT_READ_WINDOW }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub bind: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self { bind: "0.0.0.0:5000".to_string() }
    }
}

impl DetectorConfig {
    /// Parse a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            AmlError::Configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config: Self = toml::from_str(&content)?;
        info!(path = %path.display(), "Loaded detector configuration");
        Ok(config)
    }

    /// Load from `path` if it exists, otherwise start from defaults; then
    /// apply environment overrides and validate.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            Self::from_file(path)?
        } else {
            info!(path = %path.display(), "No configuration file, using defaults");
            Self::default()
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// `BLOCKCHAIN_NODE_URL` (or `blockchain_network_url`), `CONTRACT_ADDRESS`,
    /// `CONTRACT_ABI_PATH`, `MODEL_PATH`, `API_BIND`.
    pub fn apply_env_overrides(&mut self) {
        let node_url = std::env::var("BLOCKCHAIN_NODE_URL")
            .or_else(|_| std::env::var("blockchain_network_url"));
        if let Ok(url) = node_url {
            self.blockchain.node_url = url;
        }
        if let Ok(address) = std::env::var("CONTRACT_ADDRESS") {
            self.blockchain.contract_address = address;
        }
        if let Ok(path) = std::env::var("CONTRACT_ABI_PATH") {
            self.blockchain.contract_abi_path = Some(PathBuf::from(path));
        }
        if let Ok(path) = std::env::var("MODEL_PATH") {
            self.model.weights_path = Some(PathBuf::from(path));
        }
        if let Ok(bind) = std::env::var("API_BIND") {
            self.api.bind = bind;
        }
    }

    pub fn validate(&self) -> Result<()> {
        let p = &self.pipeline;
        let thresholds =
            [("risk_threshold", p.risk_threshold), ("label_threshold", p.label_threshold)];
        for (name, value) in thresholds {
            if !(0.0..=1.0).contains(&value) {
                return Err(AmlError::Configuration(format!(
                    "pipeline.{} must be between 0.0 and 1.0, got {}",
                    name, value
                )));
            }
        }
        if self.alerts.capacity == 0 || self.alerts.read_window == 0 {
            return Err(AmlError::Configuration(
                "alerts.capacity and alerts.read_window must be greater than 0".to_string(),
            ));
        }
        if self.alerts.read_window > self.alerts.capacity {
            return Err(AmlError::Configuration(format!(
                "alerts.read_window ({}) exceeds alerts.capacity ({})",
                self.alerts.read_window, self.alerts.capacity
            )));
        }
        let address = &self.blockchain.contract_address;
        if !address.is_empty() && !is_hex_address(address) {
            return Err(AmlError::Configuration(format!("invalid contract address: {}", address)));
        }
        Ok(())
    }

    /// Live mode additionally needs the watched contract, its ABI and the
    /// trained weights. Replay mode may run on built-in weights.
    pub fn validate_live(&self) -> Result<()> {
        self.validate()?;
        if self.blockchain.contract_address.is_empty() {
            return Err(AmlError::Configuration(
                "blockchain.contract_address (or CONTRACT_ADDRESS) must be set".to_string(),
            ));
        }
        if self.blockchain.contract_abi_path.is_none() {
            return Err(AmlError::Configuration(
                "blockchain.contract_abi_path (or CONTRACT_ABI_PATH) must be set".to_string(),
            ));
        }
        if self.model.weights_path.is_none() {
            return Err(AmlError::Configuration(
                "model.weights_path (or MODEL_PATH) must be set".to_string(),
            ));
        }
        Ok(())
    }
}

fn is_hex_address(value: &str) -> bool {
    value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .map(|hex| hex.len() == 40 && hex.chars().all(|c| c.is_ascii_hexdigit()))
        .unwrap_or(false)
}
