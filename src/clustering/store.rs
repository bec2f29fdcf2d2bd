//! Cluster store
//!
//! Holds node-disjoint directed multigraphs of account hashes. Every cluster
//! lives in an arena under a stable [`ClusterId`]; its content key
//! ([`ClusterKey`]) is recomputed from membership whenever it grows, so the
//! key is never used as identity. An account index (`AccountHash -> ClusterId`)
//! makes membership lookups O(1) and is rewritten on every merge.

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, info, warn};

use super::hasher::{cluster_key, hash_account, AccountHash, ClusterKey};
use super::transfer::TransferRecord;
use crate::errors::{AmlError, Result};

/// Stable arena identifier of a live cluster. Retired when the cluster is
/// absorbed into a merge; never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ClusterId(u64);

impl ClusterId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ClusterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "c#{}", self.0)
    }
}

/// One connected group of accounts and the transfers between them.
#[derive(Debug, Clone)]
pub struct Cluster {
    id: ClusterId,
    key: ClusterKey,
    graph: DiGraph<AccountHash, TransferRecord>,
    nodes: HashMap<AccountHash, NodeIndex>,
}

impl Cluster {
    fn empty(id: ClusterId) -> Self {
        Self {
            id,
            key: cluster_key(std::iter::empty::<&AccountHash>()),
            graph: DiGraph::new(),
            nodes: HashMap::new(),
        }
    }

    pub fn id(&self) -> ClusterId {
        self.id
    }

    pub fn key(&self) -> &ClusterKey {
        &self.key
    }

    pub fn graph(&self) -> &DiGraph<AccountHash, TransferRecord> {
        &self.graph
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn contains(&self, account: &AccountHash) -> bool {
        self.nodes.contains_key(account)
    }

    pub fn node_index(&self, account: &AccountHash) -> Option<NodeIndex> {
        self.nodes.get(account).copied()
    }

    /// Member hashes in ascending order.
    pub fn members(&self) -> Vec<&AccountHash> {
        let mut members: Vec<&AccountHash> = self.nodes.keys().collect();
        members.sort();
        members
    }

    /// Sorted `(sender, receiver, transfer id)` triples. Two clusters with the
    /// same canonical edges hold the same content regardless of the order in
    /// which their transfers arrived.
    pub fn canonical_edges(&self) -> Vec<(AccountHash, AccountHash, String)> {
        let mut edges: Vec<_> = self
            .graph
            .edge_references()
            .map(|e| {
                (
                    self.graph[e.source()].clone(),
                    self.graph[e.target()].clone(),
                    e.weight().id().to_string(),
                )
            })
            .collect();
        edges.sort();
        edges
    }

    /// Returns the node and whether it was newly added.
    fn node_for(&mut self, account: &AccountHash) -> (NodeIndex, bool) {
        if let Some(idx) = self.nodes.get(account) {
            return (*idx, false);
        }
        let idx = self.graph.add_node(account.clone());
        self.nodes.insert(account.clone(), idx);
        (idx, true)
    }

    /// Adds a directed edge; returns the accounts that joined the cluster.
    fn add_edge(
        &mut self,
        sender: &AccountHash,
        receiver: &AccountHash,
        record: TransferRecord,
    ) -> Vec<AccountHash> {
        let mut joined = Vec::new();
        let (from, new_from) = self.node_for(sender);
        if new_from {
            joined.push(sender.clone());
        }
        let (to, new_to) = self.node_for(receiver);
        if new_to {
            joined.push(receiver.clone());
        }
        self.graph.add_edge(from, to, record);
        joined
    }

    /// Copies every node and edge of `other` into `self`.
    fn absorb(&mut self, other: Cluster) {
        for account in other.graph.node_weights() {
            self.node_for(account);
        }
        for edge in other.graph.edge_references() {
            let from = self.nodes[&other.graph[edge.source()]];
            let to = self.nodes[&other.graph[edge.target()]];
            self.graph.add_edge(from, to, edge.weight().clone());
        }
    }

    fn refresh_key(&mut self) {
        self.key = cluster_key(self.nodes.keys());
    }
}

/// What `add_transfer` did to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeKind {
    /// Neither account was known; a new two-node cluster was created.
    Created,
    /// The transfer touched exactly one existing cluster.
    Extended { key_changed: bool },
    /// The transfer bridged several clusters; they were replaced by one.
    Merged { absorbed: Vec<ClusterId> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutcome {
    /// The cluster now holding the transfer's edge.
    pub cluster: ClusterId,
    pub kind: MergeKind,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub clusters: usize,
    pub accounts: usize,
    pub transfers: u64,
    pub largest_cluster: usize,
}

/// Mutable collection of node-disjoint clusters.
#[derive(Debug, Default)]
pub struct ClusterStore {
    clusters: HashMap<ClusterId, Cluster>,
    keys: HashMap<ClusterKey, ClusterId>,
    account_index: HashMap<AccountHash, ClusterId>,
    next_id: u64,
    transfers: u64,
}

impl ClusterStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate_id(&mut self) -> ClusterId {
        let id = ClusterId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Insert one validated transfer, creating, extending or merging
    /// clusters as needed. The edge and any merge are applied completely
    /// before this returns.
    pub fn add_transfer(&mut self, record: TransferRecord) -> MergeOutcome {
        let sender = hash_account(record.sender());
        let receiver = hash_account(record.receiver());
        self.transfers += 1;

        let mut related: Vec<ClusterId> = [&sender, &receiver]
            .into_iter()
            .filter_map(|h| self.account_index.get(h).copied())
            .collect();
        related.sort_unstable();
        related.dedup();

        match related.len() {
            0 => self.create(sender, receiver, record),
            1 => self.extend(related[0], sender, receiver, record),
            _ => self.merge(related, sender, receiver, record),
        }
    }

    fn create(
        &mut self,
        sender: AccountHash,
        receiver: AccountHash,
        record: TransferRecord,
    ) -> MergeOutcome {
        let id = self.allocate_id();
        let mut cluster = Cluster::empty(id);
        for account in cluster.add_edge(&sender, &receiver, record) {
            self.account_index.insert(account, id);
        }
        cluster.refresh_key();

        debug!(cluster = %id, key = cluster.key.short(), "created cluster");
        self.keys.insert(cluster.key.clone(), id);
        self.clusters.insert(id, cluster);
        MergeOutcome { cluster: id, kind: MergeKind::Created }
    }

    fn extend(
        &mut self,
        id: ClusterId,
        sender: AccountHash,
        receiver: AccountHash,
        record: TransferRecord,
    ) -> MergeOutcome {
        let Some(cluster) = self.clusters.get_mut(&id) else {
            warn!(cluster = %id, "account index points at a retired cluster, rebuilding entry");
            return self.create(sender, receiver, record);
        };

        let joined = cluster.add_edge(&sender, &receiver, record);
        let key_changed = !joined.is_empty();
        if key_changed {
            self.keys.remove(&cluster.key);
            cluster.refresh_key();
            self.keys.insert(cluster.key.clone(), id);
            for account in joined {
                self.account_index.insert(account, id);
            }
        }

        MergeOutcome { cluster: id, kind: MergeKind::Extended { key_changed } }
    }

    fn merge(
        &mut self,
        related: Vec<ClusterId>,
        sender: AccountHash,
        receiver: AccountHash,
        record: TransferRecord,
    ) -> MergeOutcome {
        let id = self.allocate_id();
        let mut merged = Cluster::empty(id);

        for old_id in &related {
            if let Some(old) = self.clusters.remove(old_id) {
                self.keys.remove(&old.key);
                merged.absorb(old);
            }
        }
        merged.add_edge(&sender, &receiver, record);
        merged.refresh_key();

        for account in merged.nodes.keys() {
            self.account_index.insert(account.clone(), id);
        }

        info!(
            cluster = %id,
            key = merged.key.short(),
            absorbed = related.len(),
            nodes = merged.node_count(),
            edges = merged.edge_count(),
            "🔗 merged clusters"
        );
        self.keys.insert(merged.key.clone(), id);
        self.clusters.insert(id, merged);
        MergeOutcome { cluster: id, kind: MergeKind::Merged { absorbed: related } }
    }

    pub fn get(&self, id: ClusterId) -> Option<&Cluster> {
        self.clusters.get(&id)
    }

    pub fn get_by_key(&self, key: &ClusterKey) -> Option<&Cluster> {
        self.keys.get(key).and_then(|id| self.clusters.get(id))
    }

    pub fn cluster_of(&self, account: &AccountHash) -> Option<ClusterId> {
        self.account_index.get(account).copied()
    }

    pub fn find_cluster_containing(&self, account: &AccountHash) -> Option<&Cluster> {
        self.cluster_of(account).and_then(|id| self.clusters.get(&id))
    }

    pub fn clusters(&self) -> impl Iterator<Item = &Cluster> {
        self.clusters.values()
    }

    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            clusters: self.clusters.len(),
            accounts: self.account_index.len(),
            transfers: self.transfers,
            largest_cluster: self.clusters.values().map(Cluster::node_count).max().unwrap_or(0),
        }
    }

    /// Check node disjointness and that both indexes agree with the arena.
    pub fn verify_integrity(&self) -> Result<()> {
        let mut seen: HashMap<&AccountHash, ClusterId> = HashMap::new();
        for (id, cluster) in &self.clusters {
            if cluster.id != *id {
                return Err(AmlError::Other(format!("cluster {} stored under {}", cluster.id, id)));
            }
            if self.keys.get(&cluster.key) != Some(id) {
                return Err(AmlError::Other(format!("key index out of date for {}", id)));
            }
            for account in cluster.nodes.keys() {
                if let Some(other) = seen.insert(account, *id) {
                    return Err(AmlError::Other(format!(
                        "account {} present in {} and {}",
                        account, other, id
                    )));
                }
                if self.account_index.get(account) != Some(id) {
                    return Err(AmlError::Other(format!(
                        "account index out of date for {}",
                        account
                    )));
                }
            }
        }
        if seen.len() != self.account_index.len() || self.keys.len() != self.clusters.len() {
            return Err(AmlError::Other("index holds entries for retired clusters".to_string()));
        }
        Ok(())
    }
}
