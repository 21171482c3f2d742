//! Core type definitions for the Cairn monitoring core.
//!
//! # Key Types
//!
//! - [`GroupId`]: packed 64-bit copyset identifier (pool id high, copyset id low)
//! - [`ChunkServerInfo`]: a chunk server as listed by the cluster gateway
//! - [`CopysetMembers`]: the configured replicas of one copyset
//! - [`CopysetScanStatus`]: a copyset from the gateway's authoritative list
//! - [`ClusterHealthSnapshot`]: the aggregate consumed by alerting and request handlers
//!
//! # Examples
//!
//! ```rust
//! use cairn::types::GroupId;
//!
//! let id = GroupId::new(1, 100);
//! assert_eq!(id.as_u64(), (1u64 << 32) | 100);
//! assert_eq!(id.unpack(), (1, 100));
//! assert_eq!(id.to_string().parse::<GroupId>().unwrap(), id);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Logical pool identifier.
pub type PoolId = u32;

/// Copyset identifier within a logical pool.
pub type CopysetId = u32;

/// Raft log position.
pub type LogIndex = u64;

/// Identifier of a copyset across the whole cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(u64);

impl GroupId {
    /// Pack a pool id and a copyset id.
    pub fn new(pool_id: PoolId, copyset_id: CopysetId) -> Self {
        Self(((pool_id as u64) << 32) | copyset_id as u64)
    }

    pub fn from_u64(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }

    pub fn pool_id(&self) -> PoolId {
        (self.0 >> 32) as PoolId
    }

    pub fn copyset_id(&self) -> CopysetId {
        (self.0 & 0xFFFF_FFFF) as CopysetId
    }

    /// Split back into `(pool_id, copyset_id)`.
    pub fn unpack(&self) -> (PoolId, CopysetId) {
        (self.pool_id(), self.copyset_id())
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for GroupId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<u64>().map(GroupId)
    }
}

impl From<u64> for GroupId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

/// Online status of a chunk server as recorded by the metadata service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnlineStatus {
    Online,
    Offline,
    Unstable,
}

/// A chunk server as listed by the cluster gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkServerInfo {
    /// `ip:port` address of the chunk server.
    pub address: String,
    /// Status reported by the metadata service.
    pub online_status: OnlineStatus,
}

impl ChunkServerInfo {
    pub fn new(address: impl Into<String>, online_status: OnlineStatus) -> Self {
        Self {
            address: address.into(),
            online_status,
        }
    }
}

/// Location of a copyset: logical pool plus copyset id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CopysetLocation {
    pub pool_id: PoolId,
    pub copyset_id: CopysetId,
}

impl CopysetLocation {
    pub fn new(pool_id: PoolId, copyset_id: CopysetId) -> Self {
        Self {
            pool_id,
            copyset_id,
        }
    }

    pub fn group_id(&self) -> GroupId {
        GroupId::new(self.pool_id, self.copyset_id)
    }
}

/// One replica host of a copyset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerEndpoint {
    pub host_ip: String,
    pub port: u16,
}

impl PeerEndpoint {
    pub fn new(host_ip: impl Into<String>, port: u16) -> Self {
        Self {
            host_ip: host_ip.into(),
            port,
        }
    }

    /// Chunk server address in `ip:port` form.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host_ip, self.port)
    }
}

/// The configured replicas of one copyset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopysetMembers {
    pub copyset_id: CopysetId,
    pub peers: Vec<PeerEndpoint>,
}

/// A copyset from the gateway's authoritative list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopysetScanStatus {
    pub pool_id: PoolId,
    pub copyset_id: CopysetId,
    /// Unix seconds of the last completed scan, zero when never scanned.
    pub last_scan_sec: u64,
    pub last_scan_consistent: bool,
}

impl CopysetScanStatus {
    pub fn group_id(&self) -> GroupId {
        GroupId::new(self.pool_id, self.copyset_id)
    }

    /// A copyset is inconsistent only when it has been scanned and the scan disagreed.
    pub fn is_inconsistent(&self) -> bool {
        self.last_scan_sec != 0 && !self.last_scan_consistent
    }
}

/// Aggregate copyset health of a cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterHealthSnapshot {
    pub healthy: bool,
    pub copyset_total: u32,
    pub copyset_unhealthy: u32,
}
