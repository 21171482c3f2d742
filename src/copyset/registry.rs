//! Per-pass index of copyset classifications.
//!
//! A [`CopysetRegistry`] is created fresh for every health-check pass and owned
//! by that pass alone. It records every observed group id in the total set,
//! files unhealthy ones into exactly one problem bucket, and remembers which
//! group ids each chunk server reported as resident.

use crate::types::GroupId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;

/// Health classification of a copyset.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CopysetClassification {
    /// Every observed copyset. A superset, not a health state.
    Total,
    /// Observed and in no problem bucket.
    Healthy,
    NoLeader,
    PeersInsufficient,
    LogIndexGapTooBig,
    InstallingSnapshot,
    MinorityPeerOffline,
    MajorityPeerOffline,
    ParseError,
    Inconsistent,
    /// A replica in an unusual raft state, named by that state.
    OtherState(String),
}

impl CopysetClassification {
    /// Whether this classification is a problem bucket.
    pub fn is_problem(&self) -> bool {
        !matches!(
            self,
            CopysetClassification::Total | CopysetClassification::Healthy
        )
    }
}

impl fmt::Display for CopysetClassification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CopysetClassification::Total => write!(f, "total"),
            CopysetClassification::Healthy => write!(f, "healthy"),
            CopysetClassification::NoLeader => write!(f, "no leader"),
            CopysetClassification::PeersInsufficient => write!(f, "peers insufficient"),
            CopysetClassification::LogIndexGapTooBig => write!(f, "log index gap too big"),
            CopysetClassification::InstallingSnapshot => write!(f, "installing snapshot"),
            CopysetClassification::MinorityPeerOffline => write!(f, "minority peer offline"),
            CopysetClassification::MajorityPeerOffline => write!(f, "majority peer offline"),
            CopysetClassification::ParseError => write!(f, "parse error"),
            CopysetClassification::Inconsistent => write!(f, "inconsistent"),
            CopysetClassification::OtherState(state) => write!(f, "state {}", state),
        }
    }
}

/// Classification index for one health-check pass.
#[derive(Debug, Default)]
pub struct CopysetRegistry {
    total: BTreeSet<GroupId>,
    buckets: BTreeMap<CopysetClassification, BTreeSet<GroupId>>,
    /// Reverse index so a group id lives in at most one bucket.
    problem_of: HashMap<GroupId, CopysetClassification>,
    reported: HashMap<String, HashSet<GroupId>>,
    service_exception: BTreeSet<String>,
    load_exception: BTreeSet<String>,
}

impl CopysetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an observed copyset.
    pub fn add_total(&mut self, group_id: GroupId) {
        self.total.insert(group_id);
    }

    /// File `group_id` under `class`, moving it out of any other problem bucket.
    ///
    /// `Healthy` clears a previous problem; `Total` only records the id.
    pub fn classify(&mut self, group_id: GroupId, class: CopysetClassification) {
        self.total.insert(group_id);
        if !class.is_problem() {
            if class == CopysetClassification::Healthy {
                self.clear(group_id);
            }
            return;
        }

        if self.problem_of.get(&group_id) == Some(&class) {
            return;
        }
        self.clear(group_id);
        self.buckets.entry(class.clone()).or_default().insert(group_id);
        self.problem_of.insert(group_id, class);
    }

    /// File `group_id` under `class` only if it has no problem yet.
    pub fn flag(&mut self, group_id: GroupId, class: CopysetClassification) -> bool {
        if self.problem_of.contains_key(&group_id) {
            self.total.insert(group_id);
            return false;
        }
        self.classify(group_id, class);
        true
    }

    fn clear(&mut self, group_id: GroupId) {
        if let Some(previous) = self.problem_of.remove(&group_id) {
            if let Some(bucket) = self.buckets.get_mut(&previous) {
                bucket.remove(&group_id);
                if bucket.is_empty() {
                    self.buckets.remove(&previous);
                }
            }
        }
    }

    /// Problem bucket a group id currently sits in.
    pub fn problem_of(&self, group_id: GroupId) -> Option<&CopysetClassification> {
        self.problem_of.get(&group_id)
    }

    /// Classification of a group id, `None` when it was never observed.
    pub fn classification_of(&self, group_id: GroupId) -> Option<CopysetClassification> {
        if !self.total.contains(&group_id) {
            return None;
        }
        Some(
            self.problem_of
                .get(&group_id)
                .cloned()
                .unwrap_or(CopysetClassification::Healthy),
        )
    }

    pub fn total(&self) -> &BTreeSet<GroupId> {
        &self.total
    }

    pub fn total_count(&self) -> usize {
        self.total.len()
    }

    /// Number of distinct group ids in problem buckets.
    pub fn unhealthy_count(&self) -> usize {
        self.problem_of.len()
    }

    pub fn is_healthy(&self) -> bool {
        self.problem_of.is_empty()
    }

    /// Group ids filed under `class`. `Total` and `Healthy` are derived.
    pub fn bucket(&self, class: &CopysetClassification) -> BTreeSet<GroupId> {
        match class {
            CopysetClassification::Total => self.total.clone(),
            CopysetClassification::Healthy => self
                .total
                .iter()
                .filter(|id| !self.problem_of.contains_key(id))
                .copied()
                .collect(),
            other => self.buckets.get(other).cloned().unwrap_or_default(),
        }
    }

    /// Non-empty problem buckets.
    pub fn problem_buckets(&self) -> &BTreeMap<CopysetClassification, BTreeSet<GroupId>> {
        &self.buckets
    }

    /// Record the group ids a chunk server reported as resident.
    pub fn set_reported(&mut self, address: impl Into<String>, group_ids: HashSet<GroupId>) {
        self.reported.insert(address.into(), group_ids);
    }

    /// Whether `address` reported `group_id` in this pass.
    pub fn is_reported_on(&self, address: &str, group_id: GroupId) -> bool {
        self.reported
            .get(address)
            .is_some_and(|ids| ids.contains(&group_id))
    }

    pub fn mark_service_exception(&mut self, address: impl Into<String>) {
        self.service_exception.insert(address.into());
    }

    pub fn mark_load_exception(&mut self, address: impl Into<String>) {
        self.load_exception.insert(address.into());
    }

    /// Chunk servers whose raft status query failed.
    pub fn service_exception_servers(&self) -> &BTreeSet<String> {
        &self.service_exception
    }

    /// Chunk servers that answered with no usable copysets.
    pub fn load_exception_servers(&self) -> &BTreeSet<String> {
        &self.load_exception
    }
}
