//! Block listener against an in-memory chain with injectable failures

use async_trait::async_trait;
use graph_aml::blockchain::{
    BlockListener, BlockSource, ChainBlock, ChainTransaction, ListenerSettings,
};
use graph_aml::monitoring::PipelineMetrics;
use graph_aml::pipeline::{AlertFeed, Pipeline};
use graph_aml::risk::FixedRiskModel;
use graph_aml::{AmlError, Result};
use parking_lot::Mutex;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const CONTRACT: &str = "0x5FbDB2315678afecb367f032d93F642f64180aa3";

#[derive(Default)]
struct FakeChain {
    blocks: Mutex<BTreeMap<u64, ChainBlock>>,
    /// Failures returned by upcoming `block_with_transactions` calls
    block_failures: Mutex<VecDeque<u64>>,
    head_failures: Mutex<usize>,
    fetched: Mutex<Vec<u64>>,
}

impl FakeChain {
    fn push_block(&self, number: u64, transactions: Vec<ChainTransaction>) {
        let timestamp = 1_700_000_000.0 + number as f64;
        self.blocks.lock().insert(number, ChainBlock { number, timestamp, transactions });
    }

    fn fail_block_once(&self, number: u64) {
        self.block_failures.lock().push_back(number);
    }
}

#[async_trait]
impl BlockSource for FakeChain {
    async fn current_block_number(&self) -> Result<u64> {
        {
            let mut failures = self.head_failures.lock();
            if *failures > 0 {
                *failures -= 1;
                return Err(AmlError::Source("connection refused".to_string()));
            }
        }
        Ok(self.blocks.lock().keys().next_back().copied().unwrap_or(0))
    }

    async fn block_with_transactions(&self, number: u64) -> Result<Option<ChainBlock>> {
        {
            let mut failures = self.block_failures.lock();
            if failures.front() == Some(&number) {
                failures.pop_front();
                return Err(AmlError::Source(format!("timeout fetching block {}", number)));
            }
        }
        self.fetched.lock().push(number);
        Ok(self.blocks.lock().get(&number).cloned())
    }
}

fn tx(hash: &str, from: &str, to: Option<&str>) -> ChainTransaction {
    ChainTransaction {
        hash: hash.to_string(),
        from: from.to_string(),
        to: to.map(str::to_string),
        value: 1.5,
        timestamp: None,
    }
}

fn settings(start_block: Option<u64>) -> ListenerSettings {
    ListenerSettings {
        contract_address: CONTRACT.to_lowercase(),
        start_block,
        poll_interval: Duration::from_millis(5),
        retry_backoff: Duration::from_millis(20),
    }
}

fn pipeline() -> Arc<Pipeline> {
    Arc::new(Pipeline::new(Arc::new(FixedRiskModel::new(0.1)), Arc::new(AlertFeed::default())))
}

fn alert_ids(pipeline: &Pipeline) -> Vec<String> {
    pipeline.alerts().recent(100).into_iter().map(|r| r.transaction_id).collect()
}

async fn run_for(listener: BlockListener, duration: Duration) -> u64 {
    let shutdown = CancellationToken::new();
    let handle = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move { listener.run(shutdown).await })
    };
    tokio::time::sleep(duration).await;
    shutdown.cancel();
    handle.await.unwrap()
}

#[tokio::test]
async fn test_only_contract_transactions_are_ingested() {
    let chain = Arc::new(FakeChain::default());
    let shouted = CONTRACT.to_uppercase().replace("0X", "0x");
    chain.push_block(
        1,
        vec![tx("0x01", "0xaaa", Some(CONTRACT)), tx("0x02", "0xbbb", Some("0xother"))],
    );
    chain.push_block(2, vec![tx("0x03", "0xccc", None), tx("0x04", "0xddd", Some(&shouted))]);

    let pipeline = pipeline();
    let listener = BlockListener::new(chain.clone(), pipeline.clone(), settings(Some(1)));
    let next = run_for(listener, Duration::from_millis(100)).await;

    assert_eq!(next, 3);
    let ids = alert_ids(&pipeline);
    assert_eq!(ids, vec!["0x01".to_string(), "0x04".to_string()]);
    assert_eq!(pipeline.buffered(), 0);
}

#[tokio::test]
async fn test_failed_block_is_retried_not_skipped() {
    let chain = Arc::new(FakeChain::default());
    chain.push_block(1, vec![tx("0x01", "0xaaa", Some(CONTRACT))]);
    chain.push_block(2, vec![tx("0x02", "0xbbb", Some(CONTRACT))]);
    chain.push_block(3, vec![tx("0x03", "0xccc", Some(CONTRACT))]);
    chain.fail_block_once(2);

    let metrics = Arc::new(PipelineMetrics::new().unwrap());
    let pipeline = pipeline();
    let listener = BlockListener::new(chain.clone(), pipeline.clone(), settings(Some(1)))
        .with_metrics(metrics.clone());
    let next = run_for(listener, Duration::from_millis(200)).await;

    assert_eq!(next, 4);
    assert_eq!(metrics.source_errors.get(), 1);
    assert_eq!(metrics.blocks_processed.get(), 3);
    assert_eq!(*chain.fetched.lock(), vec![1, 2, 3]);

    let ids = alert_ids(&pipeline);
    assert_eq!(ids, vec!["0x01", "0x02", "0x03"]);
}

#[tokio::test]
async fn test_starts_at_chain_head_after_head_failure() {
    let chain = Arc::new(FakeChain::default());
    chain.push_block(7, vec![tx("0x07", "0xaaa", Some(CONTRACT))]);
    *chain.head_failures.lock() = 1;

    let pipeline = pipeline();
    let listener = BlockListener::new(chain.clone(), pipeline.clone(), settings(None));
    let next = run_for(listener, Duration::from_millis(150)).await;

    assert_eq!(next, 8);
    assert_eq!(*chain.fetched.lock(), vec![7]);
    assert_eq!(pipeline.alerts().len(), 1);
}

#[tokio::test]
async fn test_new_blocks_picked_up_on_later_polls() {
    let chain = Arc::new(FakeChain::default());
    chain.push_block(1, vec![tx("0x01", "0xaaa", Some(CONTRACT))]);

    let pipeline = pipeline();
    let listener = BlockListener::new(chain.clone(), pipeline.clone(), settings(Some(1)));
    let shutdown = CancellationToken::new();
    let handle = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move { listener.run(shutdown).await })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    chain.push_block(2, vec![tx("0x02", "0xaaa", Some(CONTRACT))]);
    tokio::time::sleep(Duration::from_millis(50)).await;
    shutdown.cancel();

    assert_eq!(handle.await.unwrap(), 3);
    assert_eq!(pipeline.alerts().len(), 2);
}

#[tokio::test]
async fn test_shutdown_interrupts_backoff() {
    let chain = Arc::new(FakeChain::default());
    *chain.head_failures.lock() = usize::MAX;

    let listener = BlockListener::new(
        chain,
        pipeline(),
        ListenerSettings { retry_backoff: Duration::from_secs(3600), ..settings(Some(1)) },
    );
    let shutdown = CancellationToken::new();
    let handle = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move { listener.run(shutdown).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    shutdown.cancel();

    let next = tokio::time::timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
    assert_eq!(next, 1);
}
