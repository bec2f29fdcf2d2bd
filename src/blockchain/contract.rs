use ethers::abi::Abi;
use std::path::Path;
use tracing::info;

use crate::errors::{AmlError, Result};

/// Load a contract ABI, either a bare ABI array or a build artifact with an
/// `abi` field. Any failure is a startup error.
pub fn load_contract_abi(path: impl AsRef<Path>) -> Result<Abi> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| {
        AmlError::startup("contract", format!("cannot read ABI {}: {}", path.display(), e))
    })?;
    let value: serde_json::Value = serde_json::from_str(&content).map_err(|e| {
        AmlError::startup("contract", format!("invalid ABI JSON {}: {}", path.display(), e))
    })?;
    let abi_value = match value {
        serde_json::Value::Object(mut artifact) => artifact.remove("abi").ok_or_else(|| {
            AmlError::startup("contract", format!("{} has no `abi` field", path.display()))
        })?,
        other => other,
    };
    let abi: Abi = serde_json::from_value(abi_value).map_err(|e| {
        AmlError::startup("contract", format!("invalid ABI {}: {}", path.display(), e))
    })?;

    info!(
        path = %path.display(),
        functions = abi.functions().count(),
        events = abi.events().count(),
        "📜 Loaded contract ABI"
    );
    Ok(abi)
}
