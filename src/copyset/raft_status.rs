//! Raft status records reported by chunk servers.
//!
//! A chunk server exposes one block of `key: value` lines per copyset it hosts.
//! The gateway hands those blocks over as flat [`RaftStatusFields`] maps and
//! [`RaftStatusRecord::parse`] turns each map into a typed record. Pieces that
//! only matter to a leader's health (`last_log_id`, replicator lines) stay
//! optional so that a malformed value can be classified per copyset instead of
//! rejecting the whole record.

use crate::error::{CairnError, Result};
use crate::types::{GroupId, LogIndex};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use tracing::trace;

/// Flat string-keyed status of one copyset on one chunk server.
pub type RaftStatusFields = HashMap<String, String>;

pub const KEY_STATE: &str = "state";
pub const KEY_GROUP_ID: &str = "groupId";
pub const KEY_PEER_ID: &str = "peer_id";
pub const KEY_PEERS: &str = "peers";
pub const KEY_LEADER: &str = "leader";
pub const KEY_LAST_LOG_ID: &str = "last_log_id";
pub const REPLICATOR_PREFIX: &str = "replicator_";

/// Leader value reported by a follower that does not know its leader.
pub const EMPTY_LEADER: &str = "0.0.0.0:0:0";

/// Raft role of one replica.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RaftState {
    Leader,
    Follower,
    Transferring,
    Candidate,
    Error,
    Uninitialized,
    Shutting,
    Shutdown,
    /// Any state name not listed above.
    Other(String),
}

impl RaftState {
    pub fn as_str(&self) -> &str {
        match self {
            RaftState::Leader => "LEADER",
            RaftState::Follower => "FOLLOWER",
            RaftState::Transferring => "TRANSFERRING",
            RaftState::Candidate => "CANDIDATE",
            RaftState::Error => "ERROR",
            RaftState::Uninitialized => "UNINITIALIZED",
            RaftState::Shutting => "SHUTTING",
            RaftState::Shutdown => "SHUTDOWN",
            RaftState::Other(name) => name,
        }
    }

    /// States in which the group is in the middle of changing leaders.
    pub fn is_electing(&self) -> bool {
        matches!(self, RaftState::Transferring | RaftState::Candidate)
    }
}

impl FromStr for RaftState {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s.trim() {
            "LEADER" => RaftState::Leader,
            "FOLLOWER" => RaftState::Follower,
            "TRANSFERRING" => RaftState::Transferring,
            "CANDIDATE" => RaftState::Candidate,
            "ERROR" => RaftState::Error,
            "UNINITIALIZED" => RaftState::Uninitialized,
            "SHUTTING" => RaftState::Shutting,
            "SHUTDOWN" => RaftState::Shutdown,
            other => RaftState::Other(other.to_string()),
        })
    }
}

impl fmt::Display for RaftState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Position of the last log entry on a replica.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogId {
    pub term: u64,
    pub index: LogIndex,
}

/// Parse `term=T,index=N`. The parenthesized `(index=N,term=T)` form is accepted too.
pub fn parse_log_id(raw: &str) -> Option<LogId> {
    let inner = raw.trim().trim_start_matches('(').trim_end_matches(')');
    let mut term = None;
    let mut index = None;
    for part in inner.split(',') {
        let (key, value) = part.split_once('=')?;
        match key.trim() {
            "term" => term = Some(value.trim().parse().ok()?),
            "index" => index = Some(value.trim().parse().ok()?),
            _ => {}
        }
    }
    Some(LogId {
        term: term?,
        index: index?,
    })
}

/// Replication progress of the leader towards one follower.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplicatorStatus {
    /// The follower is receiving a snapshot.
    InstallingSnapshot,
    Replicating {
        next_index: LogIndex,
        flying_append_entries: u64,
    },
    /// The line could not be interpreted.
    Malformed(String),
}

impl ReplicatorStatus {
    /// Entries the follower still lacks relative to `last_log_index`.
    pub fn gap(&self, last_log_index: LogIndex) -> Option<i64> {
        match self {
            ReplicatorStatus::Replicating {
                next_index,
                flying_append_entries,
            } => {
                let acknowledged = *next_index as i64 - 1 - *flying_append_entries as i64;
                Some(last_log_index as i64 - acknowledged)
            }
            _ => None,
        }
    }
}

/// Interpret one replicator line.
pub fn parse_replicator(raw: &str) -> ReplicatorStatus {
    let mut next_index = None;
    let mut flying = 0u64;

    for token in raw.split_whitespace() {
        match token.split_once('=') {
            None => {
                if token.contains("snapshot") {
                    return ReplicatorStatus::InstallingSnapshot;
                }
            }
            Some(("next_index", value)) => match value.parse() {
                Ok(v) => next_index = Some(v),
                Err(_) => return ReplicatorStatus::Malformed(raw.to_string()),
            },
            Some(("flying_append_entries_size", value)) => match value.parse() {
                Ok(v) => flying = v,
                Err(_) => return ReplicatorStatus::Malformed(raw.to_string()),
            },
            Some(_) => {}
        }
    }

    match next_index {
        Some(next_index) => ReplicatorStatus::Replicating {
            next_index,
            flying_append_entries: flying,
        },
        None => ReplicatorStatus::Malformed(raw.to_string()),
    }
}

/// Strip the trailing raft index from an `ip:port:index` peer id.
pub fn peer_address(peer: &str) -> &str {
    let mut colons = peer.match_indices(':').map(|(i, _)| i);
    match (colons.next(), colons.next()) {
        (Some(_), Some(second)) => &peer[..second],
        _ => peer,
    }
}

/// Typed status of one copyset replica.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RaftStatusRecord {
    pub group_id: GroupId,
    pub state: RaftState,
    /// This replica's own `ip:port:index`.
    pub peer_id: Option<String>,
    /// Configured peers, each `ip:port:index`.
    pub peers: Vec<String>,
    /// Known leader, `None` when empty or the unknown-leader sentinel.
    pub leader: Option<String>,
    /// `None` when absent or unparsable.
    pub last_log_id: Option<LogId>,
    pub replicators: Vec<ReplicatorStatus>,
}

impl RaftStatusRecord {
    /// Parse a field map. Fails only when the record cannot be attributed to a copyset.
    pub fn parse(fields: &RaftStatusFields) -> Result<Self> {
        let group_id = fields
            .get(KEY_GROUP_ID)
            .ok_or_else(|| CairnError::RaftStatus("missing groupId".to_string()))?
            .parse::<GroupId>()
            .map_err(|e| CairnError::RaftStatus(format!("invalid groupId: {}", e)))?;

        let state = match fields.get(KEY_STATE).map(|s| s.trim()) {
            Some(s) if !s.is_empty() => s.parse::<RaftState>().unwrap_or_else(|never| match never {}),
            _ => {
                return Err(CairnError::RaftStatus(format!(
                    "missing state for group {}",
                    group_id
                )))
            }
        };

        let peers = fields
            .get(KEY_PEERS)
            .map(|p| p.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default();

        let leader = fields
            .get(KEY_LEADER)
            .map(|l| l.trim())
            .filter(|l| !l.is_empty() && *l != EMPTY_LEADER)
            .map(str::to_string);

        let last_log_id = fields.get(KEY_LAST_LOG_ID).and_then(|raw| parse_log_id(raw));

        let mut replicator_keys: Vec<&String> = fields
            .keys()
            .filter(|k| k.starts_with(REPLICATOR_PREFIX))
            .collect();
        replicator_keys.sort();
        let replicators = replicator_keys
            .into_iter()
            .map(|k| parse_replicator(&fields[k]))
            .collect();

        Ok(Self {
            group_id,
            state,
            peer_id: fields.get(KEY_PEER_ID).map(|p| p.trim().to_string()),
            peers,
            leader,
            last_log_id,
            replicators,
        })
    }

    pub fn is_leader(&self) -> bool {
        self.state == RaftState::Leader
    }

    /// A follower that does not know who its leader is.
    pub fn is_leaderless_follower(&self) -> bool {
        self.state == RaftState::Follower && self.leader.is_none()
    }
}

/// Split a chunk server's raft status page into per-copyset field maps.
///
/// Each copyset block starts with a `[<groupId>]` header line followed by
/// `key: value` lines. Lines before the first header are ignored.
pub fn parse_raft_stat_page(text: &str) -> Vec<RaftStatusFields> {
    let mut records = Vec::new();
    let mut current: Option<RaftStatusFields> = None;

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if line.starts_with('[') && line.ends_with(']') {
            if let Some(done) = current.take() {
                records.push(done);
            }
            let mut fields = RaftStatusFields::new();
            fields.insert(
                KEY_GROUP_ID.to_string(),
                line[1..line.len() - 1].trim().to_string(),
            );
            current = Some(fields);
            continue;
        }

        match (current.as_mut(), line.split_once(": ")) {
            (Some(fields), Some((key, value))) => {
                fields.insert(key.trim().to_string(), value.trim().to_string());
            }
            (Some(fields), None) => {
                // `key:` with an empty value, e.g. a follower without a leader.
                if let Some(key) = line.strip_suffix(':') {
                    fields.insert(key.trim().to_string(), String::new());
                } else {
                    trace!(line, "Skipping unrecognized raft status line");
                }
            }
            (None, _) => trace!(line, "Skipping raft status line outside a copyset block"),
        }
    }

    if let Some(done) = current {
        records.push(done);
    }
    records
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(pairs: &[(&str, &str)]) -> RaftStatusFields {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_parse_log_id_forms() {
        assert_eq!(
            parse_log_id("term=2,index=120"),
            Some(LogId { term: 2, index: 120 })
        );
        assert_eq!(
            parse_log_id("(index=7,term=3)"),
            Some(LogId { term: 3, index: 7 })
        );
        assert_eq!(parse_log_id("index=7"), None);
        assert_eq!(parse_log_id("term=x,index=7"), None);
        assert_eq!(parse_log_id("garbage"), None);
    }

    #[test]
    fn test_parse_replicator() {
        assert_eq!(
            parse_replicator("next_index=101 flying_append_entries_size=2 idle hc=10"),
            ReplicatorStatus::Replicating {
                next_index: 101,
                flying_append_entries: 2
            }
        );
        assert_eq!(
            parse_replicator("installing snapshot {term=1, index=30}"),
            ReplicatorStatus::InstallingSnapshot
        );
        assert!(matches!(
            parse_replicator("flying_append_entries_size=0"),
            ReplicatorStatus::Malformed(_)
        ));
        assert!(matches!(
            parse_replicator("next_index=abc"),
            ReplicatorStatus::Malformed(_)
        ));
    }

    #[test]
    fn test_replicator_gap() {
        let replicating = ReplicatorStatus::Replicating {
            next_index: 101,
            flying_append_entries: 0,
        };
        assert_eq!(replicating.gap(100), Some(0));
        assert_eq!(replicating.gap(1100), Some(1000));
        assert_eq!(ReplicatorStatus::InstallingSnapshot.gap(100), None);
    }

    #[test]
    fn test_peer_address() {
        assert_eq!(peer_address("10.0.0.1:8200:0"), "10.0.0.1:8200");
        assert_eq!(peer_address("10.0.0.1:8200"), "10.0.0.1:8200");
        assert_eq!(peer_address("host"), "host");
    }

    #[test]
    fn test_parse_record() {
        let record = RaftStatusRecord::parse(&fields(&[
            ("groupId", "4294967297"),
            ("state", "LEADER"),
            ("peers", "10.0.0.1:8200:0 10.0.0.2:8200:0 10.0.0.3:8200:0"),
            ("leader", "10.0.0.1:8200:0"),
            ("last_log_id", "term=1,index=10"),
            ("replicator_2@10.0.0.3:8200:0", "next_index=11 flying_append_entries_size=0"),
            ("replicator_1@10.0.0.2:8200:0", "installing snapshot"),
        ]))
        .unwrap();

        assert_eq!(record.group_id, GroupId::new(1, 1));
        assert!(record.is_leader());
        assert_eq!(record.peers.len(), 3);
        assert_eq!(record.last_log_id, Some(LogId { term: 1, index: 10 }));
        assert_eq!(record.replicators[0], ReplicatorStatus::InstallingSnapshot);
        assert_eq!(record.replicators.len(), 2);
    }

    #[test]
    fn test_parse_leaderless_follower() {
        for leader in ["", EMPTY_LEADER] {
            let record = RaftStatusRecord::parse(&fields(&[
                ("groupId", "5"),
                ("state", "FOLLOWER"),
                ("leader", leader),
            ]))
            .unwrap();
            assert!(record.is_leaderless_follower());
        }
    }

    #[test]
    fn test_parse_record_unattributable() {
        assert!(RaftStatusRecord::parse(&fields(&[("state", "LEADER")])).is_err());
        assert!(RaftStatusRecord::parse(&fields(&[("groupId", "x"), ("state", "LEADER")])).is_err());
        assert!(RaftStatusRecord::parse(&fields(&[("groupId", "1")])).is_err());
    }

    #[test]
    fn test_unknown_state_is_kept() {
        let record =
            RaftStatusRecord::parse(&fields(&[("groupId", "1"), ("state", "STRANGE")])).unwrap();
        assert_eq!(record.state, RaftState::Other("STRANGE".to_string()));
        assert_eq!(record.state.to_string(), "STRANGE");
    }

    #[test]
    fn test_parse_raft_stat_page() {
        let page = "\
[4294967297]\r
peer_id: 10.0.0.1:8200:0\r
state: LEADER\r
peers: 10.0.0.1:8200:0 10.0.0.2:8200:0 10.0.0.3:8200:0\r
last_log_id: (index=12,term=2)\r
replicator_1@10.0.0.2:8200:0: next_index=13  flying_append_entries_size=0 idle\r
\r
[4294967298]\r
state: FOLLOWER\r
leader:\r
";
        let records = parse_raft_stat_page(page);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["groupId"], "4294967297");
        assert_eq!(records[0]["peers"], "10.0.0.1:8200:0 10.0.0.2:8200:0 10.0.0.3:8200:0");
        assert_eq!(
            records[0]["replicator_1@10.0.0.2:8200:0"],
            "next_index=13  flying_append_entries_size=0 idle"
        );
        assert_eq!(records[1]["leader"], "");

        let leader = RaftStatusRecord::parse(&records[0]).unwrap();
        assert_eq!(leader.last_log_id, Some(LogId { term: 2, index: 12 }));
        let follower = RaftStatusRecord::parse(&records[1]).unwrap();
        assert!(follower.is_leaderless_follower());
    }

    #[test]
    fn test_parse_empty_page() {
        assert!(parse_raft_stat_page("").is_empty());
        assert!(parse_raft_stat_page("no copysets here\n").is_empty());
    }
}
