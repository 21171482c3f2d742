//! Copyset health and consistency checking.
//!
//! This module provides:
//! - Raft status parsing for chunk server reports
//! - The per-pass classification registry
//! - The cluster-wide checker and its status reporter

mod checker;
mod raft_status;
mod registry;
mod status;

pub use checker::{check_peer_online_status, CopysetCheckReport, CopysetChecker};
pub use raft_status::{
    parse_log_id, parse_raft_stat_page, parse_replicator, peer_address, LogId, RaftState,
    RaftStatusFields, RaftStatusRecord, ReplicatorStatus, EMPTY_LEADER, KEY_GROUP_ID,
    KEY_LAST_LOG_ID, KEY_LEADER, KEY_PEERS, KEY_PEER_ID, KEY_STATE, REPLICATOR_PREFIX,
};
pub use registry::{CopysetClassification, CopysetRegistry};
pub use status::ClusterStatusReporter;
