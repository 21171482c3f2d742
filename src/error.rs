//! Error types for the Cairn monitoring core.
//!
//! This module provides a unified error type [`CairnError`] for all Cairn operations,
//! along with a convenient [`Result`] type alias.
//!
//! # Error Categories
//!
//! - **Transport**: a single remote target failed or timed out. At the scatter-gather
//!   boundary these are per-target results, never aborts.
//! - **Consistency**: the gateway's copyset list disagrees with what chunk servers
//!   report. These abort a health-check pass and carry the offending group ids.
//! - **Alerting**: rule, store and notification failures.
//! - **Configuration**: invalid settings or unreadable configuration files.
//!
//! # Example
//!
//! ```rust
//! use cairn::error::{CairnError, Result};
//!
//! fn threshold(rule: &str) -> Result<f64> {
//!     rule.trim().parse().map_err(|_| CairnError::InvalidRule {
//!         kind: "cluster_capacity".into(),
//!         rule: rule.into(),
//!     })
//! }
//!
//! assert!(threshold("80").is_ok());
//! assert!(!threshold("eighty").unwrap_err().is_retryable());
//! ```

use crate::types::GroupId;
use std::io;
use thiserror::Error;

/// Main error type for Cairn operations.
#[derive(Error, Debug)]
pub enum CairnError {
    // Transport errors
    #[error("Gateway request failed: {0}")]
    Gateway(String),

    #[error("Request timeout after {0}ms")]
    Timeout(u64),

    #[error("Chunk server unreachable: {0}")]
    ChunkServerUnreachable(String),

    // Consistency errors
    #[error(
        "Copyset count mismatch: gateway reports {expected}, chunk servers report {observed} \
         (missing: {}, unexpected: {})",
        format_group_ids(.missing),
        format_group_ids(.unexpected)
    )]
    CopysetCountMismatch {
        expected: usize,
        observed: usize,
        missing: Vec<GroupId>,
        unexpected: Vec<GroupId>,
    },

    #[error(
        "Copyset set mismatch (missing: {}, unexpected: {})",
        format_group_ids(.missing),
        format_group_ids(.unexpected)
    )]
    CopysetSetMismatch {
        missing: Vec<GroupId>,
        unexpected: Vec<GroupId>,
    },

    #[error("Malformed raft status: {0}")]
    RaftStatus(String),

    // Alerting errors
    #[error("Invalid rule for alert {kind}: {rule:?}")]
    InvalidRule { kind: String, rule: String },

    #[error("Unknown alert kind: {0}")]
    UnknownAlertKind(String),

    #[error("Alert store error: {0}")]
    AlertStore(String),

    #[error("Notification failed: {0}")]
    Notification(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration: {field}: {reason}")]
    InvalidConfig { field: String, reason: String },

    // External errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CairnError {
    /// Check if error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CairnError::Gateway(_) | CairnError::Timeout(_) | CairnError::ChunkServerUnreachable(_)
        )
    }

    /// Check if error reports a disagreement between the gateway and chunk servers.
    pub fn is_consistency_error(&self) -> bool {
        matches!(
            self,
            CairnError::CopysetCountMismatch { .. } | CairnError::CopysetSetMismatch { .. }
        )
    }

    /// Group ids attached to a consistency error, missing ones first.
    pub fn offending_group_ids(&self) -> Vec<GroupId> {
        match self {
            CairnError::CopysetCountMismatch {
                missing, unexpected, ..
            }
            | CairnError::CopysetSetMismatch { missing, unexpected } => {
                missing.iter().chain(unexpected.iter()).copied().collect()
            }
            _ => Vec::new(),
        }
    }
}

fn format_group_ids(ids: &[GroupId]) -> String {
    if ids.is_empty() {
        return "none".to_string();
    }
    let rendered: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
    format!("[{}]", rendered.join(", "))
}

impl From<serde_json::Error> for CairnError {
    fn from(e: serde_json::Error) -> Self {
        CairnError::Serialization(e.to_string())
    }
}

/// Result type alias for Cairn operations.
pub type Result<T> = std::result::Result<T, CairnError>;
