//! Cluster-wide copyset health check.
//!
//! A pass runs in a fixed order:
//!
//! 1. list chunk servers (fatal on failure);
//! 2. fetch raft status from every chunk server concurrently;
//! 3. record which group ids each server reported;
//! 4. classify every reported replica, reconstructing the copysets of
//!    unreachable servers from the gateway and deferring leaderless followers;
//! 5. resolve deferred followers against current membership;
//! 6. cross-validate the observed copysets against the gateway's list.
//!
//! Step 5 needs the complete set of reported group ids from step 3, so no
//! leaderless follower is classified before every answer has been scanned.

use super::raft_status::{peer_address, RaftState, RaftStatusRecord, ReplicatorStatus};
use super::registry::{CopysetClassification, CopysetRegistry};
use crate::config::CheckerConfig;
use crate::error::{CairnError, Result};
use crate::gateway::ClusterGateway;
use crate::scatter::{first_error, scatter_gather};
use crate::types::{ClusterHealthSnapshot, CopysetId, GroupId, PoolId};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Outcome of one completed pass.
#[derive(Debug)]
pub struct CopysetCheckReport {
    pub healthy: bool,
    /// Final classification state, kept for diagnosis.
    pub registry: CopysetRegistry,
}

impl CopysetCheckReport {
    pub fn total(&self) -> usize {
        self.registry.total_count()
    }

    pub fn unhealthy(&self) -> usize {
        self.registry.unhealthy_count()
    }

    pub fn snapshot(&self) -> ClusterHealthSnapshot {
        ClusterHealthSnapshot {
            healthy: self.healthy,
            copyset_total: saturating_u32(self.total()),
            copyset_unhealthy: saturating_u32(self.unhealthy()),
        }
    }
}

fn saturating_u32(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

/// What one chunk server answered to the raft status query.
enum ServerAnswer {
    Unreachable(CairnError),
    /// Answered, but nothing attributable to a copyset.
    Empty,
    Records(Vec<RaftStatusRecord>),
}

/// Leaderless followers per reporting chunk server: group id to peer list.
type LeaderlessCandidates = BTreeMap<String, BTreeMap<GroupId, Vec<String>>>;

/// Classify the health of one copyset from which of its peers reported it.
///
/// Peers are `ip:port` or `ip:port:index`; a peer counts as offline when its
/// chunk server did not report `group_id` in this pass.
pub fn check_peer_online_status(
    registry: &CopysetRegistry,
    group_id: GroupId,
    peers: &[String],
) -> CopysetClassification {
    let offline = peers
        .iter()
        .filter(|peer| !registry.is_reported_on(peer_address(peer), group_id))
        .count();

    // ceil((n + 1) / 2)
    let majority = (peers.len() + 2) / 2;
    if offline == 0 {
        CopysetClassification::Healthy
    } else if offline < majority {
        CopysetClassification::MinorityPeerOffline
    } else {
        CopysetClassification::MajorityPeerOffline
    }
}

/// Runs copyset health-check passes against a gateway.
pub struct CopysetChecker {
    gateway: Arc<dyn ClusterGateway>,
    config: CheckerConfig,
}

impl CopysetChecker {
    pub fn new(gateway: Arc<dyn ClusterGateway>, config: CheckerConfig) -> Self {
        Self { gateway, config }
    }

    pub fn config(&self) -> &CheckerConfig {
        &self.config
    }

    /// Check every copyset in the cluster.
    ///
    /// Unreachable or empty chunk servers degrade the result; gateway failures
    /// and disagreements between the gateway and the chunk servers abort it.
    pub async fn check_copysets_in_cluster(&self) -> Result<CopysetCheckReport> {
        let addresses: Vec<String> = self
            .gateway
            .list_chunk_servers()
            .await?
            .into_iter()
            .map(|server| server.address)
            .collect();
        info!(chunk_servers = addresses.len(), "Checking copysets in cluster");

        let answers = self.query_raft_status(addresses).await;
        let mut registry = CopysetRegistry::new();

        for (address, answer) in &answers {
            match answer {
                ServerAnswer::Records(records) => {
                    registry.set_reported(
                        address.clone(),
                        records.iter().map(|r| r.group_id).collect(),
                    );
                }
                ServerAnswer::Empty => registry.set_reported(address.clone(), HashSet::new()),
                ServerAnswer::Unreachable(_) => {}
            }
        }

        let mut candidates = LeaderlessCandidates::new();
        for (address, answer) in &answers {
            match answer {
                ServerAnswer::Unreachable(err) => {
                    warn!(chunk_server = %address, error = %err, "Chunk server raft status unavailable");
                    registry.mark_service_exception(address.clone());
                    self.check_unreachable_server(&mut registry, address).await?;
                }
                ServerAnswer::Empty => {
                    warn!(chunk_server = %address, "Chunk server reported no copysets");
                    registry.mark_load_exception(address.clone());
                }
                ServerAnswer::Records(records) => {
                    for record in records {
                        self.classify_record(&mut registry, &mut candidates, address, record);
                    }
                }
            }
        }

        self.resolve_leaderless(&mut registry, candidates).await?;
        self.cross_validate(&mut registry).await?;

        let healthy = registry.is_healthy();
        info!(
            healthy,
            total = registry.total_count(),
            unhealthy = registry.unhealthy_count(),
            service_exception = registry.service_exception_servers().len(),
            load_exception = registry.load_exception_servers().len(),
            "Copyset check complete"
        );

        Ok(CopysetCheckReport { healthy, registry })
    }

    /// Classify a copyset from its leader's raft status.
    pub fn check_health_on_leader(
        &self,
        registry: &CopysetRegistry,
        record: &RaftStatusRecord,
    ) -> CopysetClassification {
        if record.peers.len() < self.config.replication_factor {
            return CopysetClassification::PeersInsufficient;
        }

        let peer_status = check_peer_online_status(registry, record.group_id, &record.peers);
        if peer_status != CopysetClassification::Healthy {
            return peer_status;
        }

        let last_log_index = match record.last_log_id {
            Some(log_id) => log_id.index,
            None => return CopysetClassification::ParseError,
        };

        let mut gap: i64 = 0;
        for replicator in &record.replicators {
            match replicator {
                ReplicatorStatus::InstallingSnapshot => {
                    return CopysetClassification::InstallingSnapshot
                }
                ReplicatorStatus::Malformed(raw) => {
                    debug!(group_id = %record.group_id, replicator = %raw, "Unparsable replicator status");
                    return CopysetClassification::ParseError;
                }
                ReplicatorStatus::Replicating { .. } => {
                    if let Some(lag) = replicator.gap(last_log_index) {
                        gap = gap.max(lag);
                    }
                }
            }
        }

        if gap > self.config.log_gap_margin as i64 {
            CopysetClassification::LogIndexGapTooBig
        } else {
            CopysetClassification::Healthy
        }
    }

    async fn query_raft_status(&self, addresses: Vec<String>) -> BTreeMap<String, ServerAnswer> {
        let gateway = Arc::clone(&self.gateway);
        let gathered = scatter_gather(addresses, self.config.raft_status_timeout, move |address| {
            let gateway = Arc::clone(&gateway);
            async move { gateway.raft_status(&address).await }
        })
        .await;

        gathered
            .into_iter()
            .map(|g| {
                let answer = match g.result {
                    Err(err) => ServerAnswer::Unreachable(err),
                    Ok(fields) => {
                        let records: Vec<RaftStatusRecord> = fields
                            .iter()
                            .filter_map(|f| match RaftStatusRecord::parse(f) {
                                Ok(record) => Some(record),
                                Err(err) => {
                                    warn!(chunk_server = %g.target, error = %err, "Skipping raft status record");
                                    None
                                }
                            })
                            .collect();
                        if records.is_empty() {
                            ServerAnswer::Empty
                        } else {
                            ServerAnswer::Records(records)
                        }
                    }
                };
                (g.target, answer)
            })
            .collect()
    }

    fn classify_record(
        &self,
        registry: &mut CopysetRegistry,
        candidates: &mut LeaderlessCandidates,
        address: &str,
        record: &RaftStatusRecord,
    ) {
        let group_id = record.group_id;
        registry.add_total(group_id);

        match &record.state {
            _ if record.is_leader() => {
                let class = self.check_health_on_leader(registry, record);
                if class != CopysetClassification::Healthy {
                    debug!(%group_id, chunk_server = %address, %class, "Unhealthy copyset leader");
                    registry.classify(group_id, class);
                }
            }
            _ if record.is_leaderless_follower() => {
                candidates
                    .entry(address.to_string())
                    .or_default()
                    .entry(group_id)
                    .or_insert_with(|| record.peers.clone());
            }
            RaftState::Follower => {}
            state if state.is_electing() => {
                registry.classify(group_id, CopysetClassification::NoLeader);
            }
            state => {
                debug!(%group_id, chunk_server = %address, %state, "Copyset replica in unusual state");
                registry.classify(group_id, CopysetClassification::OtherState(state.to_string()));
            }
        }
    }

    /// Reconstruct the copysets of a chunk server whose raft status is unavailable.
    async fn check_unreachable_server(
        &self,
        registry: &mut CopysetRegistry,
        address: &str,
    ) -> Result<()> {
        let resident = self.gateway.copysets_on(address).await?;
        if resident.is_empty() {
            return Ok(());
        }

        let mut by_pool: BTreeMap<PoolId, Vec<CopysetId>> = BTreeMap::new();
        for location in resident {
            by_pool
                .entry(location.pool_id)
                .or_default()
                .push(location.copyset_id);
        }

        let gateway = Arc::clone(&self.gateway);
        let gathered = scatter_gather(
            by_pool.into_iter().collect(),
            self.config.gateway_timeout,
            move |(pool_id, copyset_ids): (PoolId, Vec<CopysetId>)| {
                let gateway = Arc::clone(&gateway);
                async move { gateway.copyset_members(pool_id, &copyset_ids).await }
            },
        )
        .await;

        for ((pool_id, _), members) in first_error(gathered)? {
            for copyset in members {
                let group_id = GroupId::new(pool_id, copyset.copyset_id);
                let peers: Vec<String> = copyset.peers.iter().map(|p| p.address()).collect();
                registry.add_total(group_id);

                match check_peer_online_status(registry, group_id, &peers) {
                    CopysetClassification::Healthy => {}
                    class => {
                        debug!(%group_id, chunk_server = %address, %class, "Copyset degraded by unreachable chunk server");
                        registry.classify(group_id, class);
                    }
                }
            }
        }
        Ok(())
    }

    /// Classify leaderless followers still assigned to the server that reported them.
    async fn resolve_leaderless(
        &self,
        registry: &mut CopysetRegistry,
        candidates: LeaderlessCandidates,
    ) -> Result<()> {
        if candidates.is_empty() {
            return Ok(());
        }

        let gateway = Arc::clone(&self.gateway);
        let gathered = scatter_gather(
            candidates.keys().cloned().collect(),
            self.config.gateway_timeout,
            move |address: String| {
                let gateway = Arc::clone(&gateway);
                async move { gateway.copysets_on(&address).await }
            },
        )
        .await;

        let assigned: BTreeMap<String, HashSet<GroupId>> = first_error(gathered)?
            .into_iter()
            .map(|(address, locations)| {
                (address, locations.iter().map(|l| l.group_id()).collect())
            })
            .collect();

        let mut resolved = BTreeSet::new();
        for (address, leaderless) in &candidates {
            let still_assigned = assigned.get(address);
            for (group_id, peers) in leaderless {
                if !still_assigned.is_some_and(|ids| ids.contains(group_id)) {
                    debug!(%group_id, chunk_server = %address, "Ignoring leaderless follower no longer assigned to chunk server");
                    continue;
                }
                if !resolved.insert(*group_id) {
                    continue;
                }

                let class = match check_peer_online_status(registry, *group_id, peers) {
                    CopysetClassification::MajorityPeerOffline => {
                        CopysetClassification::MajorityPeerOffline
                    }
                    _ => CopysetClassification::NoLeader,
                };
                registry.classify(*group_id, class);
            }
        }
        Ok(())
    }

    /// Compare observed copysets with the gateway's authoritative list.
    async fn cross_validate(&self, registry: &mut CopysetRegistry) -> Result<()> {
        let copysets = self.gateway.all_copysets().await?;
        let expected: BTreeSet<GroupId> = copysets.iter().map(|c| c.group_id()).collect();

        let missing: Vec<GroupId> = expected.difference(registry.total()).copied().collect();
        let unexpected: Vec<GroupId> = registry.total().difference(&expected).copied().collect();

        if copysets.len() != registry.total_count() {
            warn!(
                expected = copysets.len(),
                observed = registry.total_count(),
                "Copyset count differs between gateway and chunk servers"
            );
            return Err(CairnError::CopysetCountMismatch {
                expected: copysets.len(),
                observed: registry.total_count(),
                missing,
                unexpected,
            });
        }

        if !missing.is_empty() || !unexpected.is_empty() {
            warn!(
                missing = missing.len(),
                unexpected = unexpected.len(),
                "Copysets differ between gateway and chunk servers"
            );
            return Err(CairnError::CopysetSetMismatch {
                missing,
                unexpected,
            });
        }

        for copyset in copysets.iter().filter(|c| c.is_inconsistent()) {
            registry.flag(copyset.group_id(), CopysetClassification::Inconsistent);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::copyset::raft_status::{LogId, ReplicatorStatus};
    use crate::gateway::InMemoryGateway;
    use std::collections::HashSet;

    const PEERS: [&str; 3] = ["10.0.0.1:8200", "10.0.0.2:8200", "10.0.0.3:8200"];

    fn gid() -> GroupId {
        GroupId::new(1, 1)
    }

    fn peers() -> Vec<String> {
        PEERS.iter().map(|p| format!("{}:0", p)).collect()
    }

    fn registry_with_online(online: &[&str]) -> CopysetRegistry {
        let mut registry = CopysetRegistry::new();
        for address in PEERS {
            let ids = if online.contains(&address) {
                HashSet::from([gid()])
            } else {
                HashSet::new()
            };
            registry.set_reported(address, ids);
        }
        registry
    }

    fn checker() -> CopysetChecker {
        CopysetChecker::new(Arc::new(InMemoryGateway::new()), CheckerConfig::default())
    }

    fn leader(replicators: Vec<ReplicatorStatus>) -> RaftStatusRecord {
        RaftStatusRecord {
            group_id: gid(),
            state: RaftState::Leader,
            peer_id: Some(peers()[0].clone()),
            peers: peers(),
            leader: Some(peers()[0].clone()),
            last_log_id: Some(LogId { term: 1, index: 5000 }),
            replicators,
        }
    }

    fn replicating(next_index: u64, flying: u64) -> ReplicatorStatus {
        ReplicatorStatus::Replicating {
            next_index,
            flying_append_entries: flying,
        }
    }

    #[test]
    fn test_peer_online_tie_break() {
        let cases: [(&[&str], CopysetClassification); 4] = [
            (&PEERS, CopysetClassification::Healthy),
            (&PEERS[..2], CopysetClassification::MinorityPeerOffline),
            (&PEERS[..1], CopysetClassification::MajorityPeerOffline),
            (&[], CopysetClassification::MajorityPeerOffline),
        ];
        for (online, expected) in cases {
            let registry = registry_with_online(online);
            assert_eq!(check_peer_online_status(&registry, gid(), &peers()), expected);
        }
    }

    #[test]
    fn test_peer_online_accepts_bare_addresses() {
        let registry = registry_with_online(&PEERS);
        let bare: Vec<String> = PEERS.iter().map(|p| p.to_string()).collect();
        assert_eq!(
            check_peer_online_status(&registry, gid(), &bare),
            CopysetClassification::Healthy
        );
    }

    #[test]
    fn test_leader_healthy() {
        let registry = registry_with_online(&PEERS);
        let record = leader(vec![replicating(5001, 0), replicating(4990, 5)]);
        assert_eq!(
            checker().check_health_on_leader(&registry, &record),
            CopysetClassification::Healthy
        );
    }

    #[test]
    fn test_leader_peers_insufficient() {
        let registry = registry_with_online(&PEERS);
        let mut record = leader(vec![]);
        record.peers.truncate(2);
        assert_eq!(
            checker().check_health_on_leader(&registry, &record),
            CopysetClassification::PeersInsufficient
        );
    }

    #[test]
    fn test_leader_reports_offline_peer_first() {
        let registry = registry_with_online(&PEERS[..2]);
        let mut record = leader(vec![ReplicatorStatus::InstallingSnapshot]);
        record.last_log_id = None;
        assert_eq!(
            checker().check_health_on_leader(&registry, &record),
            CopysetClassification::MinorityPeerOffline
        );
    }

    #[test]
    fn test_leader_unparsable_log_id() {
        let registry = registry_with_online(&PEERS);
        let mut record = leader(vec![replicating(5001, 0)]);
        record.last_log_id = None;
        assert_eq!(
            checker().check_health_on_leader(&registry, &record),
            CopysetClassification::ParseError
        );
    }

    #[test]
    fn test_leader_installing_snapshot_short_circuits() {
        let registry = registry_with_online(&PEERS);
        let record = leader(vec![ReplicatorStatus::InstallingSnapshot, replicating(1, 0)]);
        assert_eq!(
            checker().check_health_on_leader(&registry, &record),
            CopysetClassification::InstallingSnapshot
        );
    }

    #[test]
    fn test_leader_malformed_replicator() {
        let registry = registry_with_online(&PEERS);
        let record = leader(vec![ReplicatorStatus::Malformed("idle".into())]);
        assert_eq!(
            checker().check_health_on_leader(&registry, &record),
            CopysetClassification::ParseError
        );
    }

    #[test]
    fn test_only_leaderless_followers_become_candidates() {
        let mut registry = registry_with_online(&PEERS);
        let mut candidates = LeaderlessCandidates::new();

        let mut follower = leader(Vec::new());
        follower.state = RaftState::Follower;
        checker().classify_record(&mut registry, &mut candidates, PEERS[1], &follower);
        assert!(candidates.is_empty());

        follower.leader = None;
        checker().classify_record(&mut registry, &mut candidates, PEERS[2], &follower);
        assert_eq!(candidates[PEERS[2]][&gid()], peers());
        assert!(registry.is_healthy());
        assert!(registry.total().contains(&gid()));
    }

    #[test]
    fn test_leader_log_gap_margin() {
        let registry = registry_with_online(&PEERS);

        // 5000 - (4001 - 1 - 0) = 1000, at the margin.
        let at_margin = leader(vec![replicating(5001, 0), replicating(4001, 0)]);
        assert_eq!(
            checker().check_health_on_leader(&registry, &at_margin),
            CopysetClassification::Healthy
        );

        let beyond = leader(vec![replicating(5001, 0), replicating(4000, 0)]);
        assert_eq!(
            checker().check_health_on_leader(&registry, &beyond),
            CopysetClassification::LogIndexGapTooBig
        );

        // In-flight entries are not acknowledged yet and widen the gap.
        // 5000 - (4011 - 1 - 10) = 1000
        let flying_at_margin = leader(vec![replicating(4011, 10)]);
        assert_eq!(
            checker().check_health_on_leader(&registry, &flying_at_margin),
            CopysetClassification::Healthy
        );

        // 5000 - (4010 - 1 - 10) = 1001
        let flying_beyond = leader(vec![replicating(4010, 10)]);
        assert_eq!(
            checker().check_health_on_leader(&registry, &flying_beyond),
            CopysetClassification::LogIndexGapTooBig
        );

        let flying = leader(vec![replicating(4000, 10)]);
        assert_eq!(
            checker().check_health_on_leader(&registry, &flying),
            CopysetClassification::LogIndexGapTooBig
        );
    }
}
