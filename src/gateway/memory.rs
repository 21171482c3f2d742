//! In-memory gateway backed by a static cluster description.

use super::ClusterGateway;
use crate::copyset::RaftStatusFields;
use crate::error::{CairnError, Result};
use crate::types::{
    ChunkServerInfo, CopysetId, CopysetLocation, CopysetMembers, CopysetScanStatus, GroupId,
    PeerEndpoint, PoolId,
};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Clone)]
enum RaftAnswer {
    Records(Vec<RaftStatusFields>),
    Unreachable,
}

#[derive(Debug, Default)]
struct GatewayState {
    chunk_servers: Vec<ChunkServerInfo>,
    resident: HashMap<String, Vec<CopysetLocation>>,
    members: HashMap<GroupId, Vec<PeerEndpoint>>,
    copysets: Vec<CopysetScanStatus>,
    raft: HashMap<String, RaftAnswer>,
    raft_delay: HashMap<String, Duration>,
    fail_listing: bool,
    fail_all_copysets: bool,
}

/// A [`ClusterGateway`] answering from memory.
///
/// Every piece of the cluster view is set explicitly, which makes it possible
/// to describe views that disagree with each other (stale membership, copysets
/// missing from raft status, unreachable chunk servers).
#[derive(Debug, Default)]
pub struct InMemoryGateway {
    state: RwLock<GatewayState>,
}

impl InMemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_chunk_server(&self, server: ChunkServerInfo) {
        self.state.write().chunk_servers.push(server);
    }

    /// Set the copysets the metadata service places on `address`.
    pub fn set_resident(&self, address: impl Into<String>, copysets: Vec<CopysetLocation>) {
        self.state.write().resident.insert(address.into(), copysets);
    }

    pub fn set_members(&self, location: CopysetLocation, peers: Vec<PeerEndpoint>) {
        self.state
            .write()
            .members
            .insert(location.group_id(), peers);
    }

    pub fn add_copyset(&self, status: CopysetScanStatus) {
        self.state.write().copysets.push(status);
    }

    /// Replace the scan result of an already listed copyset.
    pub fn set_scan_result(&self, group_id: GroupId, last_scan_sec: u64, consistent: bool) {
        let mut state = self.state.write();
        for copyset in state.copysets.iter_mut() {
            if copyset.group_id() == group_id {
                copyset.last_scan_sec = last_scan_sec;
                copyset.last_scan_consistent = consistent;
            }
        }
    }

    pub fn remove_copyset(&self, group_id: GroupId) {
        self.state
            .write()
            .copysets
            .retain(|c| c.group_id() != group_id);
    }

    pub fn set_raft_status(&self, address: impl Into<String>, records: Vec<RaftStatusFields>) {
        self.state
            .write()
            .raft
            .insert(address.into(), RaftAnswer::Records(records));
    }

    /// Make raft status queries to `address` fail.
    pub fn set_unreachable(&self, address: impl Into<String>) {
        self.state
            .write()
            .raft
            .insert(address.into(), RaftAnswer::Unreachable);
    }

    /// Delay raft status answers from `address`.
    pub fn set_raft_delay(&self, address: impl Into<String>, delay: Duration) {
        self.state.write().raft_delay.insert(address.into(), delay);
    }

    pub fn fail_chunk_server_listing(&self, fail: bool) {
        self.state.write().fail_listing = fail;
    }

    pub fn fail_copyset_listing(&self, fail: bool) {
        self.state.write().fail_all_copysets = fail;
    }
}

#[async_trait]
impl ClusterGateway for InMemoryGateway {
    async fn list_chunk_servers(&self) -> Result<Vec<ChunkServerInfo>> {
        let state = self.state.read();
        if state.fail_listing {
            return Err(CairnError::Gateway("list chunk servers failed".to_string()));
        }
        Ok(state.chunk_servers.clone())
    }

    async fn copysets_on(&self, address: &str) -> Result<Vec<CopysetLocation>> {
        Ok(self
            .state
            .read()
            .resident
            .get(address)
            .cloned()
            .unwrap_or_default())
    }

    async fn copyset_members(
        &self,
        pool_id: PoolId,
        copyset_ids: &[CopysetId],
    ) -> Result<Vec<CopysetMembers>> {
        let state = self.state.read();
        copyset_ids
            .iter()
            .map(|&copyset_id| {
                state
                    .members
                    .get(&GroupId::new(pool_id, copyset_id))
                    .map(|peers| CopysetMembers {
                        copyset_id,
                        peers: peers.clone(),
                    })
                    .ok_or_else(|| {
                        CairnError::Gateway(format!(
                            "copyset {} not found in pool {}",
                            copyset_id, pool_id
                        ))
                    })
            })
            .collect()
    }

    async fn all_copysets(&self) -> Result<Vec<CopysetScanStatus>> {
        let state = self.state.read();
        if state.fail_all_copysets {
            return Err(CairnError::Gateway("list copysets failed".to_string()));
        }
        Ok(state.copysets.clone())
    }

    async fn raft_status(&self, address: &str) -> Result<Vec<RaftStatusFields>> {
        let (answer, delay) = {
            let state = self.state.read();
            (
                state.raft.get(address).cloned(),
                state.raft_delay.get(address).copied(),
            )
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        match answer {
            Some(RaftAnswer::Records(records)) => Ok(records),
            Some(RaftAnswer::Unreachable) | None => Err(CairnError::ChunkServerUnreachable(
                address.to_string(),
            )),
        }
    }
}
