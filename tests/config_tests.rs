//! Configuration loading, environment overrides and startup validation

use graph_aml::blockchain::load_contract_abi;
use graph_aml::config::DetectorConfig;
use graph_aml::risk::LogisticNodeModel;
use serial_test::serial;
use std::io::Write;
use std::path::PathBuf;

const ENV_VARS: [&str; 6] = [
    "BLOCKCHAIN_NODE_URL",
    "blockchain_network_url",
    "CONTRACT_ADDRESS",
    "CONTRACT_ABI_PATH",
    "MODEL_PATH",
    "API_BIND",
];

fn clear_env() {
    for var in ENV_VARS {
        std::env::remove_var(var);
    }
}

fn write_config(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "{}", content).unwrap();
    file
}

#[test]
#[serial]
fn test_missing_file_uses_defaults() {
    clear_env();
    let config = DetectorConfig::load("/nonexistent/config.toml").unwrap();
    assert_eq!(config, DetectorConfig::default());
}

#[test]
#[serial]
fn test_file_then_env_overrides() {
    clear_env();
    let file = write_config(
        r#"
[blockchain]
node_url = "http://file-node:8545"
contract_address = "0x5fbdb2315678afecb367f032d93f642f64180aa3"

[pipeline]
risk_threshold = 0.4
label_threshold = 0.8

[api]
bind = "127.0.0.1:5000"
"#,
    );

    std::env::set_var("blockchain_network_url", "http://env-node:8545");
    std::env::set_var("MODEL_PATH", "/models/weights.json");
    let config = DetectorConfig::load(file.path());
    clear_env();

    let config = config.unwrap();
    assert_eq!(config.blockchain.node_url, "http://env-node:8545");
    assert_eq!(config.blockchain.contract_address, "0x5fbdb2315678afecb367f032d93f642f64180aa3");
    assert_eq!(config.pipeline.risk_threshold, 0.4);
    assert_eq!(config.pipeline.label_threshold, 0.8);
    assert_eq!(config.model.weights_path, Some(PathBuf::from("/models/weights.json")));
    assert_eq!(config.api.bind, "127.0.0.1:5000");
}

#[test]
#[serial]
fn test_primary_node_variable_wins() {
    clear_env();
    std::env::set_var("BLOCKCHAIN_NODE_URL", "http://primary:8545");
    std::env::set_var("blockchain_network_url", "http://legacy:8545");
    let config = DetectorConfig::load("/nonexistent/config.toml");
    clear_env();

    assert_eq!(config.unwrap().blockchain.node_url, "http://primary:8545");
}

#[test]
#[serial]
fn test_invalid_env_address_fails_validation() {
    clear_env();
    std::env::set_var("CONTRACT_ADDRESS", "not-an-address");
    let result = DetectorConfig::load("/nonexistent/config.toml");
    clear_env();

    let err = result.unwrap_err();
    assert!(err.is_critical());
}

#[test]
#[serial]
fn test_malformed_toml_is_configuration_error() {
    clear_env();
    let file = write_config("[pipeline\nrisk_threshold = ");
    let err = DetectorConfig::load(file.path()).unwrap_err();
    assert!(err.is_critical());
}

#[test]
fn test_sample_config_parses() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/config/config.example.toml");
    let config = DetectorConfig::from_file(path).unwrap();
    assert!(config.validate_live().is_ok());
}

#[test]
#[serial]
fn test_live_mode_rejects_missing_weights_and_abi() {
    clear_env();
    let file = write_config(
        r#"
[blockchain]
contract_address = "0x5fbdb2315678afecb367f032d93f642f64180aa3"
"#,
    );
    let config = DetectorConfig::load(file.path()).unwrap();
    let err = config.validate_live().unwrap_err();
    assert!(err.is_critical());
    assert!(err.to_string().contains("contract_abi_path"));

    std::env::set_var("CONTRACT_ABI_PATH", "config/Transfer.abi.json");
    let config = DetectorConfig::load(file.path());
    clear_env();

    let err = config.unwrap().validate_live().unwrap_err();
    assert!(err.to_string().contains("weights_path"));
}

#[test]
fn test_sample_abi_loads() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/config/Transfer.abi.json");
    let abi = load_contract_abi(path).unwrap();
    assert!(abi.function("transfer").is_ok());
}

#[test]
fn test_sample_weights_load() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/config/model_weights.json");
    let model = LogisticNodeModel::from_file(path).unwrap();
    assert_eq!(model.weights().node.len(), 3);
}
