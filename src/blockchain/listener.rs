//! Block polling listener
//!
//! Walks the chain one block at a time, feeds transactions addressed to the
//! watched contract into the pipeline and drains it once per loop. A failed
//! poll is retried from the same block after a fixed backoff, so no block is
//! ever skipped.

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::source::BlockSource;
use crate::config::{BlockchainConfig, ListenerConfig};
use crate::errors::{AmlError, Result};
use crate::monitoring::PipelineMetrics;
use crate::pipeline::Pipeline;

#[derive(Debug, Clone, PartialEq)]
pub struct ListenerSettings {
    pub contract_address: String,
    pub start_block: Option<u64>,
    pub poll_interval: Duration,
    pub retry_backoff: Duration,
}

impl ListenerSettings {
    pub fn from_config(blockchain: &BlockchainConfig, listener: &ListenerConfig) -> Self {
        Self {
            contract_address: blockchain.contract_address.clone(),
            start_block: blockchain.start_block,
            poll_interval: listener.poll_interval(),
            retry_backoff: listener.retry_backoff(),
        }
    }
}

pub struct BlockListener {
    source: Arc<dyn BlockSource>,
    pipeline: Arc<Pipeline>,
    settings: ListenerSettings,
    metrics: Option<Arc<PipelineMetrics>>,
}

impl BlockListener {
    pub fn new(
        source: Arc<dyn BlockSource>,
        pipeline: Arc<Pipeline>,
        settings: ListenerSettings,
    ) -> Self {
        Self { source, pipeline, settings, metrics: None }
    }

    pub fn with_metrics(mut self, metrics: Arc<PipelineMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Poll until `shutdown` is cancelled. Returns the next block that would
    /// have been scanned.
    pub async fn run(&self, shutdown: CancellationToken) -> u64 {
        let mut next = match self.settings.start_block {
            Some(block) => block,
            None => loop {
                match self.source.current_block_number().await {
                    Ok(block) => break block,
                    Err(e) => {
                        self.record_error(&e);
                        if self.pause(self.settings.retry_backoff, &shutdown).await {
                            return 0;
                        }
                    }
                }
            },
        };
        info!(
            start_block = next,
            contract = %self.settings.contract_address,
            "👂 Listening for contract transactions"
        );

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            let delay = match self.poll_once(&mut next).await {
                Ok(()) => self.settings.poll_interval,
                Err(e) => {
                    self.record_error(&e);
                    self.settings.retry_backoff
                }
            };
            if self.pause(delay, &shutdown).await {
                break;
            }
        }

        info!(next_block = next, "Block listener stopped");
        next
    }

    /// Scan every block up to the current head, then drain the pipeline.
    /// `next` only advances past a block once it has been fully submitted.
    async fn poll_once(&self, next: &mut u64) -> Result<()> {
        let current = self.source.current_block_number().await?;
        while *next <= current {
            let Some(block) = self.source.block_with_transactions(*next).await? else {
                debug!(block = *next, "block not yet available");
                break;
            };

            let mut matched = 0usize;
            for tx in block.transactions {
                if tx.is_sent_to(&self.settings.contract_address) {
                    self.pipeline.submit(tx.into_transfer(block.number, block.timestamp));
                    matched += 1;
                }
            }
            if matched > 0 {
                info!(
                    block = block.number,
                    transactions = matched,
                    "📥 Buffered contract transactions"
                );
            }
            if let Some(m) = &self.metrics {
                m.blocks_processed.inc();
            }
            *next += 1;
        }

        self.pipeline.process_buffer();
        Ok(())
    }

    fn record_error(&self, e: &AmlError) {
        error!(
            error = %e,
            retry_in_ms = self.settings.retry_backoff.as_millis() as u64,
            "Block source error, retrying"
        );
        if let Some(m) = &self.metrics {
            m.source_errors.inc();
        }
    }

    /// Sleep for `delay`; true if shutdown was requested meanwhile.
    async fn pause(&self, delay: Duration, shutdown: &CancellationToken) -> bool {
        tokio::select! {
            _ = shutdown.cancelled() => true,
            _ = tokio::time::sleep(delay) => false,
        }
    }
}
