//! Ingestion pipeline
//!
//! Producers push raw transfers into a shared buffer; a single consumer
//! drains it by swap-and-clear and processes each record outside the buffer
//! lock:
//!
//! ```text
//! submit ─► buffer ─► drain ─► validate ─► ClusterStore::add_transfer
//!                                              │ (store lock: add, snapshot,
//!                                              │  classify)
//!                                              ▼
//!                        RiskModel::predict(snapshot) ─► threshold gate
//!                                                            │
//!                                   pattern kept or None ────┴─► AlertFeed
//! ```

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::alerts::AlertFeed;
use super::result::ClassificationResult;
use crate::clustering::transfer::unix_now;
use crate::clustering::{
    classify, hash_account, AccountHash, Cluster, ClusterId, ClusterKey, ClusterStore, MergeKind,
    Pattern, RawTransfer, StoreStats, TransferRecord,
};
use crate::config::PipelineConfig;
use crate::errors::{AmlError, Result};
use crate::monitoring::PipelineMetrics;
use crate::risk::{GraphSnapshot, NodeRisk, RiskModel};

/// Counters exposed by `GET /api/clusters/stats`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PipelineStats {
    #[serde(flatten)]
    pub store: StoreStats,
    /// Distinct cluster keys that matched a laundering pattern
    pub flagged_clusters: usize,
    /// Transfers waiting in the buffer
    pub buffered: usize,
}

pub struct Pipeline {
    model: Arc<dyn RiskModel>,
    store: Mutex<ClusterStore>,
    buffer: Mutex<Vec<RawTransfer>>,
    /// Held for the whole of one drain so results keep submission order
    consumer: Mutex<()>,
    flagged: Mutex<HashSet<ClusterKey>>,
    alerts: Arc<AlertFeed>,
    metrics: Option<Arc<PipelineMetrics>>,
    risk_threshold: f64,
    label_threshold: f64,
}

impl Pipeline {
    pub fn new(model: Arc<dyn RiskModel>, alerts: Arc<AlertFeed>) -> Self {
        let defaults = PipelineConfig::default();
        Self {
            model,
            store: Mutex::new(ClusterStore::new()),
            buffer: Mutex::new(Vec::new()),
            consumer: Mutex::new(()),
            flagged: Mutex::new(HashSet::new()),
            alerts,
            metrics: None,
            risk_threshold: defaults.risk_threshold,
            label_threshold: defaults.label_threshold,
        }
    }

    pub fn with_config(mut self, config: &PipelineConfig) -> Self {
        self.risk_threshold = config.risk_threshold;
        self.label_threshold = config.label_threshold;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<PipelineMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn alerts(&self) -> &Arc<AlertFeed> {
        &self.alerts
    }

    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    /// Queue a transfer for the next drain.
    pub fn submit(&self, raw: RawTransfer) {
        let depth = {
            let mut buffer = self.buffer.lock();
            buffer.push(raw);
            buffer.len()
        };
        if let Some(m) = &self.metrics {
            m.transfers_received.inc();
            m.buffer_depth.set(depth as i64);
        }
    }

    pub fn buffered(&self) -> usize {
        self.buffer.lock().len()
    }

    /// Drain everything buffered so far and process it. Transfers submitted
    /// while this runs wait for the next drain.
    pub fn process_buffer(&self) -> Vec<ClassificationResult> {
        let _consumer = self.consumer.lock();
        let drained = std::mem::take(&mut *self.buffer.lock());
        if let Some(m) = &self.metrics {
            m.buffer_depth.set(0);
        }
        if drained.is_empty() {
            return Vec::new();
        }

        debug!(count = drained.len(), "draining transfer buffer");
        let results: Vec<ClassificationResult> =
            drained.into_iter().filter_map(|raw| self.process_one(raw)).collect();
        debug!(results = results.len(), "buffer drained");
        results
    }

    /// Synchronous single-shot path: validate and process one transfer
    /// without going through the buffer.
    pub fn process_now(&self, raw: RawTransfer) -> Result<ClassificationResult> {
        let _consumer = self.consumer.lock();
        if let Some(m) = &self.metrics {
            m.transfers_received.inc();
        }
        let record = match raw.validate() {
            Ok(record) => record,
            Err(e) => {
                self.count_rejected();
                return Err(e);
            }
        };
        Ok(self.process_record(record))
    }

    /// Periodically drain the buffer until `shutdown` is cancelled, then
    /// drain once more.
    pub async fn run_consumer(&self, interval: Duration, shutdown: CancellationToken) {
        info!(interval_ms = interval.as_millis() as u64, "🔄 transfer consumer started");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(interval) => {
                    self.process_buffer();
                }
            }
        }
        self.process_buffer();
        info!("transfer consumer stopped");
    }

    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            store: self.store.lock().stats(),
            flagged_clusters: self.flagged.lock().len(),
            buffered: self.buffered(),
        }
    }

    /// Cluster keys flagged so far, sorted.
    pub fn flagged_clusters(&self) -> Vec<ClusterKey> {
        let mut keys: Vec<ClusterKey> = self.flagged.lock().iter().cloned().collect();
        keys.sort();
        keys
    }

    /// Run a read-only closure against the cluster store.
    pub fn with_store<R>(&self, f: impl FnOnce(&ClusterStore) -> R) -> R {
        f(&self.store.lock())
    }

    fn process_one(&self, raw: RawTransfer) -> Option<ClassificationResult> {
        let display_id = raw.display_id().to_string();
        match raw.validate() {
            Ok(record) => Some(self.process_record(record)),
            Err(e) => {
                warn!(transaction = %display_id, error = %e, "rejected transfer");
                self.count_rejected();
                None
            }
        }
    }

    fn count_rejected(&self) {
        if let Some(m) = &self.metrics {
            m.transfers_rejected.inc();
        }
    }

    fn process_record(&self, record: TransferRecord) -> ClassificationResult {
        let id = record.id().to_string();
        let sender = hash_account(record.sender());
        let receiver = hash_account(record.receiver());

        let view = {
            let mut store = self.store.lock();
            let outcome = store.add_transfer(record);
            if let Some(m) = &self.metrics {
                if matches!(outcome.kind, MergeKind::Merged { .. }) {
                    m.cluster_merges.inc();
                }
                m.clusters.set(store.len() as i64);
            }
            store.get(outcome.cluster).map(ClusterView::capture)
        };

        let result = match view {
            Some(view) => self.score(&id, &sender, &receiver, view),
            None => {
                warn!(transaction = %id, "affected cluster not found, emitting zero-risk result");
                ClassificationResult::zero_risk(id)
            }
        };

        if let Some(m) = &self.metrics {
            m.transfers_processed.inc();
            if result.predicted_label {
                m.suspicious_transfers.inc();
            }
        }
        self.alerts.append(result.clone());
        result
    }

    fn score(
        &self,
        id: &str,
        sender: &AccountHash,
        receiver: &AccountHash,
        view: ClusterView,
    ) -> ClassificationResult {
        let ClusterView { id: cluster_id, snapshot, pattern } = view;
        let risk = match self
            .model
            .predict(&snapshot)
            .and_then(|scores| transfer_risk(&snapshot, &scores, sender, receiver))
        {
            Ok(risk) => risk,
            Err(e) => {
                warn!(
                    transaction = %id,
                    model = self.model.name(),
                    error = %e,
                    "risk model failed, emitting zero-risk result"
                );
                if let Some(m) = &self.metrics {
                    m.model_failures.inc();
                }
                return ClassificationResult::zero_risk(id);
            }
        };

        let label = risk > self.label_threshold;
        let pattern = if risk >= self.risk_threshold && label { pattern } else { Pattern::None };

        if pattern.is_suspicious() {
            let key = snapshot.cluster_key;
            warn!(
                transaction = %id,
                cluster = %cluster_id,
                key = key.short(),
                pattern = %pattern,
                risk,
                "🚨 AML cluster detected"
            );
            if self.flagged.lock().insert(key) {
                if let Some(m) = &self.metrics {
                    m.flagged_clusters.inc();
                }
            }
        }

        ClassificationResult {
            transaction_id: id.to_string(),
            predicted_label: label,
            predicted_pattern: pattern,
            risk_score: risk,
            timestamp: unix_now(),
        }
    }
}

/// What leaves the store lock for one transfer: the model input and the
/// cluster's topology label, taken from the same state.
struct ClusterView {
    id: ClusterId,
    snapshot: GraphSnapshot,
    pattern: Pattern,
}

impl ClusterView {
    fn capture(cluster: &Cluster) -> Self {
        Self {
            id: cluster.id(),
            snapshot: GraphSnapshot::from_cluster(cluster),
            pattern: classify(cluster),
        }
    }
}

/// Highest suspicious probability among the transfer's own accounts.
fn transfer_risk(
    snapshot: &GraphSnapshot,
    scores: &[NodeRisk],
    sender: &AccountHash,
    receiver: &AccountHash,
) -> Result<f64> {
    if scores.len() != snapshot.len() {
        return Err(AmlError::Model(format!(
            "model returned {} rows for a snapshot of {}",
            scores.len(),
            snapshot.len()
        )));
    }
    [sender, receiver]
        .into_iter()
        .filter_map(|account| snapshot.row_of(account))
        .map(|row| scores[row][1])
        .filter(|p| p.is_finite())
        .map(|p| p.clamp(0.0, 1.0))
        .reduce(f64::max)
        .ok_or_else(|| AmlError::Model("no usable score for the transfer's accounts".to_string()))
}
