//! Graph snapshot and node feature extraction
//!
//! Rows are ordered by ascending account hash; `row_of` maps an account back
//! to its row so a transfer can be matched with its own scores.

use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::Serialize;
use std::collections::{HashMap, HashSet};

use crate::clustering::{AccountHash, Cluster, ClusterKey};

/// Width of a node feature vector.
pub const NUM_NODE_FEATURES: usize = 3;

/// Raw (unscaled) structural features of one account.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct NodeFeatures {
    /// Distinct accounts paid
    pub out_degree: f64,
    /// Distinct accounts paying in
    pub in_degree: f64,
    /// Total amount sent and received
    pub volume: f64,
}

impl NodeFeatures {
    pub fn to_vector(&self) -> [f64; NUM_NODE_FEATURES] {
        [self.out_degree, self.in_degree, self.volume]
    }
}

/// Read-only view of one cluster handed to the risk model.
#[derive(Debug, Clone, Serialize)]
pub struct GraphSnapshot {
    pub cluster_key: ClusterKey,
    pub accounts: Vec<AccountHash>,
    /// Column-scaled features, one row per account, each value in `[0, 1]`.
    pub features: Vec<[f64; NUM_NODE_FEATURES]>,
    /// Directed edges as `(sender row, receiver row)`, one per transfer.
    pub edges: Vec<(usize, usize)>,
    #[serde(skip)]
    index: HashMap<AccountHash, usize>,
}

impl GraphSnapshot {
    pub fn from_cluster(cluster: &Cluster) -> Self {
        let graph = cluster.graph();
        let accounts: Vec<AccountHash> = cluster.members().into_iter().cloned().collect();
        let index: HashMap<AccountHash, usize> =
            accounts.iter().enumerate().map(|(row, a)| (a.clone(), row)).collect();

        let raw: Vec<NodeFeatures> = accounts
            .iter()
            .map(|account| {
                let Some(node) = cluster.node_index(account) else {
                    return NodeFeatures::default();
                };
                let out: HashSet<_> = graph.neighbors_directed(node, Direction::Outgoing).collect();
                let inc: HashSet<_> = graph.neighbors_directed(node, Direction::Incoming).collect();
                let volume: f64 = graph
                    .edges_directed(node, Direction::Outgoing)
                    .chain(graph.edges_directed(node, Direction::Incoming))
                    .map(|e| e.weight().amount())
                    .sum();
                NodeFeatures {
                    out_degree: out.len() as f64,
                    in_degree: inc.len() as f64,
                    volume,
                }
            })
            .collect();

        let edges = graph
            .edge_references()
            .filter_map(|e| {
                let from = index.get(&graph[e.source()])?;
                let to = index.get(&graph[e.target()])?;
                Some((*from, *to))
            })
            .collect();

        Self {
            cluster_key: cluster.key().clone(),
            accounts,
            features: scale_columns(&raw),
            edges,
            index,
        }
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    pub fn row_of(&self, account: &AccountHash) -> Option<usize> {
        self.index.get(account).copied()
    }
}

/// Divide each column by its maximum; all-zero columns stay zero.
fn scale_columns(raw: &[NodeFeatures]) -> Vec<[f64; NUM_NODE_FEATURES]> {
    let mut max = [0.0f64; NUM_NODE_FEATURES];
    for row in raw {
        for (m, v) in max.iter_mut().zip(row.to_vector()) {
            *m = m.max(v);
        }
    }
    raw.iter()
        .map(|row| {
            let mut scaled = row.to_vector();
            for (v, m) in scaled.iter_mut().zip(max) {
                if m > 0.0 {
                    *v /= m;
                }
            }
            scaled
        })
        .collect()
}
