//! Deterministic identifiers for accounts and clusters

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// SHA-256 of a raw account string, lowercase hex.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountHash(String);

impl AccountHash {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Content hash over a cluster's sorted member set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClusterKey(String);

impl ClusterKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex chars, for log lines.
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

impl fmt::Display for ClusterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Hash a raw account identifier.
pub fn hash_account(value: &str) -> AccountHash {
    AccountHash(sha256_hex(value.as_bytes()))
}

/// Key for a member set. Members are sorted and de-duplicated before
/// hashing, so the key depends on membership only.
pub fn cluster_key<'a, I>(members: I) -> ClusterKey
where
    I: IntoIterator<Item = &'a AccountHash>,
{
    let mut sorted: Vec<&str> = members.into_iter().map(AccountHash::as_str).collect();
    sorted.sort_unstable();
    sorted.dedup();
    ClusterKey(sha256_hex(sorted.join("-").as_bytes()))
}
