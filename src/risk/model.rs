//! Weights-file driven node scorer
//!
//! A single-layer message-passing logistic model: each node's logit combines
//! its own scaled features with the mean logit of its neighbours. Small
//! enough to load from a JSON weights file at startup; stands in for the
//! trained graph network behind the `RiskModel` seam.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

use super::features::{GraphSnapshot, NUM_NODE_FEATURES};
use super::{NodeRisk, RiskModel};
use crate::errors::{AmlError, Result};

/// Serialized model parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelWeights {
    /// Weights for `[out_degree, in_degree, volume]`
    pub node: [f64; NUM_NODE_FEATURES],
    /// Weight of the mean neighbour logit
    pub neighbor: f64,
    pub bias: f64,
}

impl Default for ModelWeights {
    fn default() -> Self {
        Self {
            // wide fan-in/fan-out and heavy volume push towards suspicious
            node: [2.2, 2.4, 1.1],
            neighbor: 0.6,
            bias: -3.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogisticNodeModel {
    weights: ModelWeights,
}

impl LogisticNodeModel {
    pub fn new(weights: ModelWeights) -> Self {
        Self { weights }
    }

    /// Load weights from a JSON file. Any failure here is a startup error.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            AmlError::startup("model", format!("cannot read weights {}: {}", path.display(), e))
        })?;
        let weights: ModelWeights = serde_json::from_str(&content).map_err(|e| {
            AmlError::startup("model", format!("invalid weights {}: {}", path.display(), e))
        })?;
        if !weights.node.iter().chain([&weights.neighbor, &weights.bias]).all(|w| w.is_finite()) {
            return Err(AmlError::startup("model", "weights must be finite"));
        }
        info!(path = %path.display(), "🤖 loaded risk model weights");
        Ok(Self::new(weights))
    }

    pub fn weights(&self) -> &ModelWeights {
        &self.weights
    }

    fn local_logit(&self, features: &[f64; NUM_NODE_FEATURES]) -> f64 {
        features.iter().zip(self.weights.node).map(|(x, w)| x * w).sum::<f64>()
    }

    fn sigmoid(x: f64) -> f64 {
        1.0 / (1.0 + (-x).exp())
    }
}

impl Default for LogisticNodeModel {
    fn default() -> Self {
        Self::new(ModelWeights::default())
    }
}

impl RiskModel for LogisticNodeModel {
    fn name(&self) -> &str {
        "logistic-node"
    }

    fn predict(&self, snapshot: &GraphSnapshot) -> Result<Vec<NodeRisk>> {
        if snapshot.features.len() != snapshot.len() {
            return Err(AmlError::Model(format!(
                "snapshot has {} feature rows for {} accounts",
                snapshot.features.len(),
                snapshot.len()
            )));
        }

        let local: Vec<f64> = snapshot.features.iter().map(|f| self.local_logit(f)).collect();

        // undirected one-hop neighbourhoods
        let mut neighbors: HashMap<usize, Vec<usize>> = HashMap::new();
        for &(from, to) in &snapshot.edges {
            if from >= local.len() || to >= local.len() {
                return Err(AmlError::Model(format!("edge ({}, {}) out of range", from, to)));
            }
            neighbors.entry(from).or_default().push(to);
            neighbors.entry(to).or_default().push(from);
        }

        let scores = local
            .iter()
            .enumerate()
            .map(|(row, own)| {
                let aggregated = neighbors
                    .get(&row)
                    .map(|n| n.iter().map(|&i| local[i]).sum::<f64>() / n.len() as f64)
                    .unwrap_or(0.0);
                let p = Self::sigmoid(own + self.weights.neighbor * aggregated + self.weights.bias);
                [1.0 - p, p]
            })
            .collect();
        Ok(scores)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clustering::{hash_account, ClusterStore, RawTransfer};
    use std::io::Write;

    fn fan_in_snapshot(senders: usize) -> GraphSnapshot {
        let mut store = ClusterStore::new();
        let mut id = None;
        for i in 0..senders {
            let record = RawTransfer::new(format!("t{}", i), format!("S{}", i), "hub", 100.0)
                .validate()
                .unwrap();
            id = Some(store.add_transfer(record).cluster);
        }
        GraphSnapshot::from_cluster(store.get(id.unwrap()).unwrap())
    }

    #[test]
    fn test_sigmoid() {
        assert!((LogisticNodeModel::sigmoid(0.0) - 0.5).abs() < 1e-12);
        assert!(LogisticNodeModel::sigmoid(100.0) > 0.99);
        assert!(LogisticNodeModel::sigmoid(-100.0) < 0.01);
    }

    #[test]
    fn test_distribution_sums_to_one() {
        let snapshot = fan_in_snapshot(4);
        let scores = LogisticNodeModel::default().predict(&snapshot).unwrap();
        assert_eq!(scores.len(), snapshot.len());
        for [normal, suspicious] in scores {
            assert!((normal + suspicious - 1.0).abs() < 1e-9);
            assert!((0.0..=1.0).contains(&suspicious));
        }
    }

    #[test]
    fn test_hub_scores_higher_than_leaf() {
        let snapshot = fan_in_snapshot(6);
        let scores = LogisticNodeModel::default().predict(&snapshot).unwrap();
        let hub = snapshot.row_of(&hash_account("hub")).unwrap();
        let leaf = snapshot.row_of(&hash_account("S0")).unwrap();
        assert!(scores[hub][1] > scores[leaf][1]);
    }

    #[test]
    fn test_load_weights_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"node": [1.0, 2.0, 3.0], "neighbor": 0.5, "bias": -1.0}}"#).unwrap();

        let model = LogisticNodeModel::from_file(file.path()).unwrap();
        assert_eq!(model.weights().node, [1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_missing_weights_is_startup_error() {
        let err = LogisticNodeModel::from_file("/nonexistent/weights.json").unwrap_err();
        assert!(err.is_critical());
    }
}
