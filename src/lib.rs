//! Streaming anti-money-laundering detector
//!
//! Transfers arrive from a polling chain listener (or a replay file), are
//! merged into node-disjoint clusters of accounts, scored by a per-node risk
//! model and, when risky enough, matched against laundering topologies
//! (fan-out, fan-in, cycle, scatter-gather). Results are published to an
//! in-memory alert feed served over HTTP.

pub mod api;
pub mod blockchain;
pub mod clustering;
pub mod config;
pub mod errors;
pub mod monitoring;
pub mod pipeline;
pub mod risk;

pub use clustering::{ClusterStore, Pattern, RawTransfer, TransferRecord};
pub use config::DetectorConfig;
pub use errors::{AmlError, Result};
pub use pipeline::{AlertFeed, ClassificationResult, Pipeline};
pub use risk::{FixedRiskModel, LogisticNodeModel, RiskModel};
