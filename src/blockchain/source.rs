use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::clustering::RawTransfer;
use crate::errors::Result;

/// One on-chain transaction as seen by the listener.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainTransaction {
    pub hash: String,
    pub from: String,
    /// `None` for contract creations
    pub to: Option<String>,
    /// Transferred value in ETH
    pub value: f64,
    /// Unix seconds; falls back to the block timestamp
    pub timestamp: Option<f64>,
}

impl ChainTransaction {
    /// Whether this transaction was sent to `address`, ignoring case.
    pub fn is_sent_to(&self, address: &str) -> bool {
        self.to.as_deref().map(|to| to.eq_ignore_ascii_case(address)).unwrap_or(false)
    }

    pub fn into_transfer(self, block: u64, block_timestamp: f64) -> RawTransfer {
        RawTransfer {
            id: Some(self.hash),
            sender: Some(self.from),
            receiver: self.to,
            amount: self.value,
            timestamp: Some(self.timestamp.unwrap_or(block_timestamp)),
            attributes: Default::default(),
        }
        .with_attribute("blockNumber", serde_json::Value::from(block))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainBlock {
    pub number: u64,
    /// Unix seconds
    pub timestamp: f64,
    pub transactions: Vec<ChainTransaction>,
}

/// Read side of a chain node, as much as the listener needs.
#[async_trait]
pub trait BlockSource: Send + Sync {
    /// Latest block number known to the node.
    async fn current_block_number(&self) -> Result<u64>;

    /// Block `number` with full transaction bodies; `None` if the node does
    /// not have it yet.
    async fn block_with_transactions(&self, number: u64) -> Result<Option<ChainBlock>>;
}
