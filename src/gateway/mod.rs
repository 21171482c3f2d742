//! Remote cluster gateway.
//!
//! The gateway is how the monitoring core sees the cluster: the metadata
//! service's view of chunk servers and copysets, and each chunk server's own
//! raft status. Implementations own transport, authentication and per-call
//! timeouts; the core only consumes request/response pairs.

mod memory;

pub use memory::InMemoryGateway;

use crate::copyset::RaftStatusFields;
use crate::error::Result;
use crate::types::{
    ChunkServerInfo, CopysetId, CopysetLocation, CopysetMembers, CopysetScanStatus, PoolId,
};
use async_trait::async_trait;

/// Requests the monitoring core issues against the cluster.
#[async_trait]
pub trait ClusterGateway: Send + Sync {
    /// Chunk servers registered in the cluster.
    async fn list_chunk_servers(&self) -> Result<Vec<ChunkServerInfo>>;

    /// Copysets the metadata service places on a chunk server.
    async fn copysets_on(&self, address: &str) -> Result<Vec<CopysetLocation>>;

    /// Configured replicas of the given copysets of one logical pool.
    async fn copyset_members(
        &self,
        pool_id: PoolId,
        copyset_ids: &[CopysetId],
    ) -> Result<Vec<CopysetMembers>>;

    /// Every copyset in the cluster with its last scan result.
    async fn all_copysets(&self) -> Result<Vec<CopysetScanStatus>>;

    /// Raft status of every copyset hosted on a chunk server.
    ///
    /// An error means the chunk server could not be queried; an empty list
    /// means it answered without reporting any copyset.
    async fn raft_status(&self, address: &str) -> Result<Vec<RaftStatusFields>>;
}
