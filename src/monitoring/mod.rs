//! Prometheus metrics for the ingestion pipeline and block listener

use anyhow::Result;
use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};
use tracing::info;

pub struct PipelineMetrics {
    registry: Registry,

    // Ingestion
    pub transfers_received: IntCounter,
    pub transfers_rejected: IntCounter,
    pub transfers_processed: IntCounter,
    pub suspicious_transfers: IntCounter,
    pub flagged_clusters: IntCounter,
    pub model_failures: IntCounter,

    // Cluster store
    pub cluster_merges: IntCounter,
    pub clusters: IntGauge,
    pub buffer_depth: IntGauge,

    // Block source
    pub blocks_processed: IntCounter,
    pub source_errors: IntCounter,
}

impl PipelineMetrics {
    pub fn new() -> Result<Self> {
        info!("📊 Initializing pipeline metrics");

        let registry = Registry::new();

        let transfers_received =
            IntCounter::new("aml_transfers_received_total", "Transfers submitted to the buffer")?;
        let transfers_rejected =
            IntCounter::new("aml_transfers_rejected_total", "Transfers rejected by validation")?;
        let transfers_processed =
            IntCounter::new("aml_transfers_processed_total", "Transfers merged and classified")?;
        let suspicious_transfers =
            IntCounter::new("aml_suspicious_transfers_total", "Transfers labelled suspicious")?;
        let flagged_clusters = IntCounter::new(
            "aml_flagged_clusters_total",
            "Classifications that matched a laundering pattern",
        )?;
        let model_failures =
            IntCounter::new("aml_model_failures_total", "Risk model invocations that failed")?;

        let cluster_merges = IntCounter::new(
            "aml_cluster_merges_total",
            "Transfers that merged two or more clusters",
        )?;
        let clusters = IntGauge::new("aml_clusters", "Live clusters in the store")?;
        let buffer_depth = IntGauge::new("aml_buffer_depth", "Transfers waiting in the buffer")?;

        let blocks_processed =
            IntCounter::new("aml_blocks_processed_total", "Blocks scanned by the listener")?;
        let source_errors =
            IntCounter::new("aml_source_errors_total", "Block source polling failures")?;

        registry.register(Box::new(transfers_received.clone()))?;
        registry.register(Box::new(transfers_rejected.clone()))?;
        registry.register(Box::new(transfers_processed.clone()))?;
        registry.register(Box::new(suspicious_transfers.clone()))?;
        registry.register(Box::new(flagged_clusters.clone()))?;
        registry.register(Box::new(model_failures.clone()))?;
        registry.register(Box::new(cluster_merges.clone()))?;
        registry.register(Box::new(clusters.clone()))?;
        registry.register(Box::new(buffer_depth.clone()))?;
        registry.register(Box::new(blocks_processed.clone()))?;
        registry.register(Box::new(source_errors.clone()))?;

        Ok(Self {
            registry,
            transfers_received,
            transfers_rejected,
            transfers_processed,
            suspicious_transfers,
            flagged_clusters,
            model_failures,
            cluster_merges,
            clusters,
            buffer_depth,
            blocks_processed,
            source_errors,
        })
    }

    /// Prometheus text exposition of every registered metric.
    pub fn export(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}
