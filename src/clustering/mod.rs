//! Transfer clustering core
//!
//! Accounts connected by transfers are grouped into node-disjoint directed
//! multigraphs ("clusters") that only ever grow or merge. Each cluster is
//! classified against known laundering shapes.

pub mod hasher;
pub mod patterns;
pub mod store;
pub mod transfer;

pub use hasher::{cluster_key, hash_account, AccountHash, ClusterKey};
pub use patterns::{classify, Pattern};
pub use store::{Cluster, ClusterId, ClusterStore, MergeKind, MergeOutcome, StoreStats};
pub use transfer::{RawTransfer, TransferRecord};
