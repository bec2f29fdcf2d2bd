//! Risk model seam
//!
//! The per-account fraud scorer is an external collaborator: it receives a
//! [`GraphSnapshot`] of one cluster and returns a `[p_normal, p_suspicious]`
//! distribution per snapshot row. The pipeline locates the transfer's own
//! accounts through the snapshot's account index.

pub mod features;
pub mod model;

pub use features::{GraphSnapshot, NodeFeatures, NUM_NODE_FEATURES};
pub use model::{LogisticNodeModel, ModelWeights};

use crate::errors::Result;

/// Probability distribution over `{normal, suspicious}` for one node.
pub type NodeRisk = [f64; 2];

/// Per-node fraud scorer.
pub trait RiskModel: Send + Sync {
    fn name(&self) -> &str;

    /// Returns one distribution per snapshot row, in row order.
    fn predict(&self, snapshot: &GraphSnapshot) -> Result<Vec<NodeRisk>>;
}

/// Scores every node with the same suspicious probability.
#[derive(Debug, Clone)]
pub struct FixedRiskModel {
    suspicious: f64,
}

impl FixedRiskModel {
    pub fn new(suspicious: f64) -> Self {
        Self { suspicious: suspicious.clamp(0.0, 1.0) }
    }
}

impl RiskModel for FixedRiskModel {
    fn name(&self) -> &str {
        "fixed"
    }

    fn predict(&self, snapshot: &GraphSnapshot) -> Result<Vec<NodeRisk>> {
        Ok(vec![[1.0 - self.suspicious, self.suspicious]; snapshot.len()])
    }
}
