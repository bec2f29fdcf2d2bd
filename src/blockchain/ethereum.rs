use async_trait::async_trait;
use ethers::{
    providers::{Http, JsonRpcClient, Middleware, Provider},
    types::{Address, Block, Transaction, H256, U256},
};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::source::{BlockSource, ChainBlock, ChainTransaction};
use crate::errors::{AmlError, Result};

/// `BlockSource` over an ethers JSON-RPC provider.
#[derive(Clone, Debug)]
pub struct EthersBlockSource<P: JsonRpcClient + Clone = Http> {
    provider: Provider<P>,
    network_name: String,
    chain_id: u64,
}

impl EthersBlockSource<Http> {
    /// Connect to `rpc_url` and identify the chain. Failing to reach the node
    /// here is a startup error.
    pub async fn connect(rpc_url: &str, timeout: Duration) -> Result<Self> {
        let rpc_url = rpc_url.trim();
        let parsed_url = reqwest::Url::parse(rpc_url).map_err(|e| {
            AmlError::startup("blockchain", format!("invalid node URL '{}': {}", rpc_url, e))
        })?;

        info!("Connecting to blockchain node: {}", parsed_url);
        let mut builder = reqwest::Client::builder().timeout(timeout);
        if let Ok(proxy) = std::env::var("HTTPS_PROXY").or_else(|_| std::env::var("HTTP_PROXY")) {
            if let Ok(p) = reqwest::Proxy::all(proxy) {
                builder = builder.proxy(p);
            }
        }
        let client = builder
            .build()
            .map_err(|e| AmlError::startup("blockchain", format!("HTTP client: {}", e)))?;

        let provider = Provider::new(Http::new_with_client(parsed_url.clone(), client));
        let chain_id = provider
            .get_chainid()
            .await
            .map_err(|e| {
                AmlError::startup(
                    "blockchain",
                    format!("failed to get chain ID from {}: {}", parsed_url, e),
                )
            })?
            .as_u64();

        let network_name = network_name(chain_id);
        info!("✅ Connected to {} (Chain ID: {})", network_name, chain_id);

        Ok(Self { provider, network_name, chain_id })
    }
}

impl<P> EthersBlockSource<P>
where
    P: JsonRpcClient + Clone + Send + Sync,
{
    /// Wrap an existing provider, e.g. a `MockProvider` in tests.
    pub fn new_with_provider(provider: Provider<P>, chain_id: u64) -> Self {
        Self { provider, network_name: network_name(chain_id), chain_id }
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn network_name(&self) -> &str {
        &self.network_name
    }
}

#[async_trait]
impl<P> BlockSource for EthersBlockSource<P>
where
    P: JsonRpcClient + Clone + Send + Sync + 'static,
{
    async fn current_block_number(&self) -> Result<u64> {
        let number = self
            .provider
            .get_block_number()
            .await
            .map_err(|e| AmlError::Source(format!("failed to get block number: {}", e)))?;
        Ok(number.as_u64())
    }

    async fn block_with_transactions(&self, number: u64) -> Result<Option<ChainBlock>> {
        debug!(block = number, "fetching block with transactions");
        let block = self
            .provider
            .get_block_with_txs(number)
            .await
            .map_err(|e| AmlError::Source(format!("failed to get block {}: {}", number, e)))?;
        Ok(block.map(|b| convert_block(number, b)))
    }
}

fn network_name(chain_id: u64) -> String {
    match chain_id {
        1 => "ethereum".to_string(),
        11155111 => "sepolia".to_string(),
        137 => "polygon".to_string(),
        56 => "bsc".to_string(),
        97 => "bsctestnet".to_string(),
        31337 => "hardhat".to_string(),
        _ => format!("ethereum-{}", chain_id),
    }
}

fn convert_block(requested: u64, block: Block<Transaction>) -> ChainBlock {
    let number = block.number.map(|n| n.as_u64()).unwrap_or(requested);
    let timestamp = block.timestamp.low_u64() as f64;
    let transactions = block
        .transactions
        .into_iter()
        .map(|tx| ChainTransaction {
            hash: format_hash(&tx.hash),
            from: format_address(&tx.from),
            to: tx.to.as_ref().map(format_address),
            value: wei_to_ether(&tx.hash, tx.value),
            timestamp: None,
        })
        .collect();
    ChainBlock { number, timestamp, transactions }
}

/// Convert a wei amount to ether. An amount that does not survive the
/// conversion is logged and counted as zero.
fn wei_to_ether(hash: &H256, value: U256) -> f64 {
    let formatted = ethers::utils::format_ether(value);
    match formatted.parse::<f64>() {
        Ok(ether) => ether,
        Err(e) => {
            warn!(
                tx = %format_hash(hash),
                wei = %value,
                error = %e,
                "Unparseable transfer amount, recording 0"
            );
            0.0
        }
    }
}

fn format_address(address: &Address) -> String {
    format!("0x{}", hex::encode(address.as_bytes()))
}

fn format_hash(hash: &H256) -> String {
    format!("0x{}", hex::encode(hash.as_bytes()))
}
