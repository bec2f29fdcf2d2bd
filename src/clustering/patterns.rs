//! Laundering pattern classifier
//!
//! Scans the nodes of a cluster in ascending account-hash order and returns
//! the first rule hit. The label therefore describes the first anomaly found
//! under that ordering, not a global optimum over the cluster.

use petgraph::graph::NodeIndex;
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use super::store::Cluster;

/// Distinct successors above this count mark a Fan-Out.
pub const FAN_OUT_THRESHOLD: usize = 5;
/// Distinct predecessors above this count mark a Fan-In.
pub const FAN_IN_THRESHOLD: usize = 5;
/// Both degrees above this count mark a Scatter-Gather hub.
pub const SCATTER_GATHER_THRESHOLD: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Pattern {
    #[serde(rename = "Fan-Out")]
    FanOut,
    #[serde(rename = "Fan-In")]
    FanIn,
    Cycle,
    #[serde(rename = "Scatter-Gather")]
    ScatterGather,
    Normal,
    /// The classifier was not run for this transfer.
    None,
}

impl Pattern {
    pub fn as_str(&self) -> &'static str {
        match self {
            Pattern::FanOut => "Fan-Out",
            Pattern::FanIn => "Fan-In",
            Pattern::Cycle => "Cycle",
            Pattern::ScatterGather => "Scatter-Gather",
            Pattern::Normal => "Normal",
            Pattern::None => "None",
        }
    }

    /// A laundering shape was detected.
    pub fn is_suspicious(&self) -> bool {
        !matches!(self, Pattern::Normal | Pattern::None)
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn distinct_neighbors(cluster: &Cluster, node: NodeIndex, dir: Direction) -> HashSet<NodeIndex> {
    cluster.graph().neighbors_directed(node, dir).collect()
}

/// Classify a cluster's topology. Pure function of the edge set.
pub fn classify(cluster: &Cluster) -> Pattern {
    let graph = cluster.graph();
    for account in cluster.members() {
        let Some(node) = cluster.node_index(account) else {
            continue;
        };
        let outgoing = distinct_neighbors(cluster, node, Direction::Outgoing).len();
        let incoming = distinct_neighbors(cluster, node, Direction::Incoming).len();

        if outgoing > FAN_OUT_THRESHOLD {
            return Pattern::FanOut;
        }
        if incoming > FAN_IN_THRESHOLD {
            return Pattern::FanIn;
        }
        // only a direct self transfer counts; longer loops are not traced
        if graph.contains_edge(node, node) {
            return Pattern::Cycle;
        }
        if outgoing > SCATTER_GATHER_THRESHOLD && incoming > SCATTER_GATHER_THRESHOLD {
            return Pattern::ScatterGather;
        }
    }

    Pattern::Normal
}
