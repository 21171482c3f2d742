// Cluster simulation for integration tests
// Models copyset placement and raft state, and renders what chunk servers report

use cairn::config::CheckerConfig;
use cairn::copyset::{parse_raft_stat_page, CopysetChecker, EMPTY_LEADER};
use cairn::gateway::InMemoryGateway;
use cairn::{
    ChunkServerInfo, CopysetLocation, CopysetScanStatus, GroupId, OnlineStatus, PeerEndpoint,
    PoolId,
};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt::Write;
use std::sync::Arc;

pub const CHUNK_SERVER_PORT: u16 = 8200;
pub const LAST_LOG_INDEX: u64 = 10_000;

/// Address of the `i`th simulated chunk server.
pub fn chunk_server_address(i: usize) -> String {
    format!("10.0.0.{}:{}", i + 1, CHUNK_SERVER_PORT)
}

/// Simulated copyset
#[derive(Debug, Clone)]
pub struct SimCopyset {
    pub location: CopysetLocation,
    pub replicas: Vec<String>,
    /// Replica every member believes is leader.
    pub leader: Option<String>,
    pub last_log_index: u64,
    /// Leader's next index per follower; followers default to caught up.
    pub next_index: HashMap<String, u64>,
    /// Followers the leader is sending a snapshot to.
    pub installing_snapshot: HashSet<String>,
    /// Raft state reported by a replica instead of LEADER/FOLLOWER.
    pub state_override: HashMap<String, String>,
}

impl SimCopyset {
    pub fn group_id(&self) -> GroupId {
        self.location.group_id()
    }

    fn render(&self, out: &mut String, address: &str) {
        let peer = |a: &str| format!("{}:0", a);
        let state = match self.state_override.get(address) {
            Some(state) => state.clone(),
            None if self.leader.as_deref() == Some(address) => "LEADER".to_string(),
            None => "FOLLOWER".to_string(),
        };
        let leader = self
            .leader
            .as_deref()
            .map(peer)
            .unwrap_or_else(|| EMPTY_LEADER.to_string());
        let peers: Vec<String> = self.replicas.iter().map(|r| peer(r.as_str())).collect();

        let _ = writeln!(out, "[{}]", self.group_id());
        let _ = writeln!(out, "peer_id: {}", peer(address));
        let _ = writeln!(out, "state: {}", state);
        let _ = writeln!(out, "peers: {}", peers.join(" "));
        let _ = writeln!(out, "leader: {}", leader);
        let _ = writeln!(out, "last_log_id: (index={},term=3)", self.last_log_index);

        if state == "LEADER" {
            for follower in self.replicas.iter().filter(|r| r.as_str() != address) {
                let next_index = self
                    .next_index
                    .get(follower)
                    .copied()
                    .unwrap_or(self.last_log_index + 1);
                let status = if self.installing_snapshot.contains(follower) {
                    format!("next_index={} flying_append_entries_size=0 installing_snapshot", next_index)
                } else {
                    format!("next_index={} flying_append_entries_size=0 idle hc=4821 ac=117", next_index)
                };
                let _ = writeln!(
                    out,
                    "replicator_{}@{}: {}",
                    self.group_id(),
                    peer(follower.as_str()),
                    status
                );
            }
        }
        out.push('\n');
    }
}

/// Builder for simulated clusters
pub struct ClusterBuilder {
    name: String,
    chunk_servers: usize,
    replication: usize,
    pools: Vec<(PoolId, u32)>,
}

impl ClusterBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            chunk_servers: 3,
            replication: 3,
            pools: Vec::new(),
        }
    }

    pub fn chunk_servers(mut self, count: usize) -> Self {
        self.chunk_servers = count;
        self
    }

    pub fn replication(mut self, count: usize) -> Self {
        self.replication = count;
        self
    }

    /// Add a logical pool with copysets numbered from 1.
    pub fn pool(mut self, pool_id: PoolId, copysets: u32) -> Self {
        self.pools.push((pool_id, copysets));
        self
    }

    pub fn build(self) -> SimulatedCluster {
        let servers: Vec<String> = (0..self.chunk_servers).map(chunk_server_address).collect();
        let gateway = Arc::new(InMemoryGateway::new());
        for address in &servers {
            gateway.add_chunk_server(ChunkServerInfo::new(address.clone(), OnlineStatus::Online));
        }

        let mut copysets = BTreeMap::new();
        let mut placement = 0usize;
        for (pool_id, count) in self.pools {
            for copyset_id in 1..=count {
                let replicas: Vec<String> = (0..self.replication)
                    .map(|k| servers[(placement + k) % servers.len()].clone())
                    .collect();
                placement += 1;

                let location = CopysetLocation::new(pool_id, copyset_id);
                gateway.add_copyset(CopysetScanStatus {
                    pool_id,
                    copyset_id,
                    last_scan_sec: 0,
                    last_scan_consistent: false,
                });
                copysets.insert(
                    location.group_id(),
                    SimCopyset {
                        location,
                        leader: replicas.first().cloned(),
                        replicas,
                        last_log_index: LAST_LOG_INDEX,
                        next_index: HashMap::new(),
                        installing_snapshot: HashSet::new(),
                        state_override: HashMap::new(),
                    },
                );
            }
        }

        let cluster = SimulatedCluster {
            name: self.name,
            gateway,
            servers,
            copysets,
            down: HashSet::new(),
            silent: HashSet::new(),
            stale: Vec::new(),
        };
        cluster.sync();
        cluster
    }
}

/// Simulated cluster
pub struct SimulatedCluster {
    name: String,
    gateway: Arc<InMemoryGateway>,
    servers: Vec<String>,
    copysets: BTreeMap<GroupId, SimCopyset>,
    down: HashSet<String>,
    silent: HashSet<String>,
    /// Leaderless follower reports from servers that no longer host the copyset.
    stale: Vec<(String, GroupId)>,
}

impl SimulatedCluster {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn gateway(&self) -> Arc<InMemoryGateway> {
        Arc::clone(&self.gateway)
    }

    pub fn checker(&self) -> CopysetChecker {
        CopysetChecker::new(self.gateway(), CheckerConfig::default())
    }

    pub fn server(&self, i: usize) -> String {
        self.servers[i].clone()
    }

    pub fn group_ids(&self) -> Vec<GroupId> {
        self.copysets.keys().copied().collect()
    }

    pub fn copyset(&self, group_id: GroupId) -> &SimCopyset {
        &self.copysets[&group_id]
    }

    /// Mutate a copyset; call [`SimulatedCluster::sync`] afterwards.
    pub fn copyset_mut(&mut self, group_id: GroupId) -> &mut SimCopyset {
        self.copysets
            .get_mut(&group_id)
            .expect("copyset not in simulated cluster")
    }

    /// Copysets with a replica on `address`.
    pub fn copysets_on(&self, address: &str) -> Vec<GroupId> {
        self.copysets
            .values()
            .filter(|c| c.replicas.iter().any(|r| r == address))
            .map(|c| c.group_id())
            .collect()
    }

    /// Copysets with a replica on any of `addresses`.
    pub fn copysets_touching(&self, addresses: &[String]) -> HashSet<GroupId> {
        addresses.iter().flat_map(|a| self.copysets_on(a)).collect()
    }

    pub fn take_down(&mut self, address: &str) {
        self.down.insert(address.to_string());
        self.sync();
    }

    pub fn bring_up(&mut self, address: &str) {
        self.down.remove(address);
        self.sync();
    }

    /// Make a chunk server answer without any copyset.
    pub fn silence(&mut self, address: &str) {
        self.silent.insert(address.to_string());
        self.sync();
    }

    /// Have `address` report `group_id` as a leaderless follower it no longer hosts.
    pub fn report_stale_follower(&mut self, address: &str, group_id: GroupId) {
        self.stale.push((address.to_string(), group_id));
        self.sync();
    }

    /// Raft status page of one chunk server.
    pub fn render_stat_page(&self, address: &str) -> String {
        let mut page = String::new();
        for copyset in self.copysets.values() {
            if copyset.replicas.iter().any(|r| r == address) {
                copyset.render(&mut page, address);
            }
        }
        for (_, group_id) in self.stale.iter().filter(|(a, _)| a == address) {
            let mut ghost = self.copysets[group_id].clone();
            ghost.leader = None;
            ghost.state_override.clear();
            ghost.render(&mut page, address);
        }
        page
    }

    /// Push the simulated state into the gateway.
    pub fn sync(&self) {
        for address in &self.servers {
            let resident: Vec<CopysetLocation> = self
                .copysets
                .values()
                .filter(|c| c.replicas.contains(address))
                .map(|c| c.location)
                .collect();
            self.gateway.set_resident(address.clone(), resident);

            if self.down.contains(address) {
                self.gateway.set_unreachable(address.clone());
            } else if self.silent.contains(address) {
                self.gateway.set_raft_status(address.clone(), Vec::new());
            } else {
                let page = self.render_stat_page(address);
                self.gateway
                    .set_raft_status(address.clone(), parse_raft_stat_page(&page));
            }
        }

        for copyset in self.copysets.values() {
            let peers = copyset
                .replicas
                .iter()
                .map(|r| {
                    let (ip, port) = r.rsplit_once(':').expect("address has a port");
                    PeerEndpoint::new(ip, port.parse().expect("numeric port"))
                })
                .collect();
            self.gateway.set_members(copyset.location, peers);
        }
    }
}
