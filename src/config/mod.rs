//! Configuration module for Cairn.

use crate::error::{CairnError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Replicas a healthy copyset is expected to have.
pub const DEFAULT_REPLICATION_FACTOR: usize = 3;

/// Largest tolerated lag, in log entries, between a leader and its slowest follower.
pub const DEFAULT_LOG_GAP_MARGIN: u64 = 1000;

/// Main configuration for a Cairn monitor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CairnConfig {
    /// Active cluster.
    pub cluster: ClusterConfig,
    /// Copyset checker configuration.
    #[serde(default)]
    pub checker: CheckerConfig,
    /// Alert scheduler configuration.
    #[serde(default)]
    pub alerting: AlertingConfig,
    /// Observability configuration.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl CairnConfig {
    /// Load configuration from a file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| CairnError::Config(format!("Failed to read config file: {}", e)))?;

        let config: Self = serde_json::from_str(&content)
            .map_err(|e| CairnError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<()> {
        if self.cluster.name.trim().is_empty() {
            return Err(invalid("cluster.name", "Cluster name must not be empty"));
        }

        if self.checker.raft_status_timeout.is_zero() {
            return Err(invalid(
                "checker.raft_status_timeout",
                "Timeout must be non-zero",
            ));
        }

        if self.checker.gateway_timeout.is_zero() {
            return Err(invalid("checker.gateway_timeout", "Timeout must be non-zero"));
        }

        if self.checker.replication_factor == 0 {
            return Err(invalid(
                "checker.replication_factor",
                "Replication factor must be non-zero",
            ));
        }

        if self.alerting.default_interval_secs == 0 {
            return Err(invalid(
                "alerting.default_interval_secs",
                "Alert interval must be non-zero",
            ));
        }

        if self.alerting.default_trigger_times == 0 {
            return Err(invalid(
                "alerting.default_trigger_times",
                "Trigger times must be non-zero",
            ));
        }

        if self.alerting.reload_interval.is_zero() {
            return Err(invalid(
                "alerting.reload_interval",
                "Reload interval must be non-zero",
            ));
        }

        Ok(())
    }

    /// Create a development configuration with short timers.
    pub fn development() -> Self {
        Self {
            cluster: ClusterConfig {
                name: "dev-cluster".to_string(),
            },
            checker: CheckerConfig {
                raft_status_timeout: Duration::from_secs(2),
                gateway_timeout: Duration::from_secs(2),
                ..CheckerConfig::default()
            },
            alerting: AlertingConfig {
                reload_interval: Duration::from_secs(10),
                default_interval_secs: 10,
                default_trigger_times: 1,
                ..AlertingConfig::default()
            },
            observability: ObservabilityConfig {
                log_level: "debug".to_string(),
                json_logs: false,
            },
        }
    }
}

fn invalid(field: &str, reason: &str) -> CairnError {
    CairnError::InvalidConfig {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

/// Active cluster configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Name of the cluster being monitored.
    pub name: String,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
        }
    }
}

/// Copyset checker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckerConfig {
    /// Timeout for one chunk server's raft status query.
    #[serde(with = "duration_serde")]
    pub raft_status_timeout: Duration,
    /// Timeout for each gateway request fanned out by the checker.
    #[serde(with = "duration_serde")]
    pub gateway_timeout: Duration,
    /// Replicas a healthy copyset is expected to have.
    pub replication_factor: usize,
    /// Largest tolerated leader-to-follower log gap.
    pub log_gap_margin: u64,
}

impl Default for CheckerConfig {
    fn default() -> Self {
        Self {
            raft_status_timeout: Duration::from_secs(5),
            gateway_timeout: Duration::from_secs(5),
            replication_factor: DEFAULT_REPLICATION_FACTOR,
            log_gap_margin: DEFAULT_LOG_GAP_MARGIN,
        }
    }
}

/// Alert scheduler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertingConfig {
    /// How often alert settings are reloaded from the store.
    #[serde(with = "duration_serde")]
    pub reload_interval: Duration,
    /// Evaluation interval for alert kinds without stored settings.
    pub default_interval_secs: u64,
    /// Consecutive problem ticks before an alert fires, for kinds without stored settings.
    pub default_trigger_times: u32,
    /// Used-capacity percentage that triggers the capacity alert.
    pub capacity_rule: String,
}

impl Default for AlertingConfig {
    fn default() -> Self {
        Self {
            reload_interval: Duration::from_secs(60),
            default_interval_secs: 60,
            default_trigger_times: 3,
            capacity_rule: "80".to_string(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level.
    pub log_level: String,
    /// Enable JSON logging.
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

/// Serde helper for durations written as `500ms`, `5s`, `2m` or `1h`.
pub mod duration_serde {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis = duration.as_millis();
        if millis % 1000 == 0 {
            serializer.serialize_str(&format!("{}s", millis / 1000))
        } else {
            serializer.serialize_str(&format!("{}ms", millis))
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_duration(&s).map_err(serde::de::Error::custom)
    }

    /// Parse a duration; a bare number is taken as seconds.
    pub fn parse_duration(s: &str) -> Result<Duration, String> {
        let s = s.trim();
        let (value, unit) = match s.find(|c: char| !c.is_ascii_digit()) {
            Some(pos) => s.split_at(pos),
            None => (s, "s"),
        };
        let value: u64 = value
            .parse()
            .map_err(|e| format!("invalid duration {:?}: {}", s, e))?;

        match unit.trim() {
            "ms" => Ok(Duration::from_millis(value)),
            "s" => Ok(Duration::from_secs(value)),
            "m" => Ok(Duration::from_secs(value * 60)),
            "h" => Ok(Duration::from_secs(value * 3600)),
            other => Err(format!("unknown duration unit {:?} in {:?}", other, s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = CairnConfig::default();
        assert_eq!(config.checker.replication_factor, 3);
        assert_eq!(config.checker.log_gap_margin, 1000);
        assert_eq!(config.alerting.capacity_rule, "80");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_development_config() {
        let config = CairnConfig::development();
        assert_eq!(config.alerting.default_trigger_times, 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = CairnConfig::default();
        config.cluster.name = " ".to_string();
        assert!(matches!(
            config.validate(),
            Err(CairnError::InvalidConfig { ref field, .. }) if field == "cluster.name"
        ));

        let mut config = CairnConfig::default();
        config.alerting.default_trigger_times = 0;
        assert!(config.validate().is_err());

        let mut config = CairnConfig::default();
        config.checker.gateway_timeout = Duration::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_duration() {
        use duration_serde::parse_duration;
        assert_eq!(parse_duration("500ms"), Ok(Duration::from_millis(500)));
        assert_eq!(parse_duration("5s"), Ok(Duration::from_secs(5)));
        assert_eq!(parse_duration("2m"), Ok(Duration::from_secs(120)));
        assert_eq!(parse_duration("1h"), Ok(Duration::from_secs(3600)));
        assert_eq!(parse_duration("30"), Ok(Duration::from_secs(30)));
        assert!(parse_duration("fast").is_err());
        assert!(parse_duration("5d").is_err());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "cluster": {{ "name": "prod-bs" }},
                "checker": {{
                    "raft_status_timeout": "800ms",
                    "gateway_timeout": "3s",
                    "replication_factor": 3,
                    "log_gap_margin": 500
                }}
            }}"#
        )
        .unwrap();

        let config = CairnConfig::from_file(file.path()).unwrap();
        assert_eq!(config.cluster.name, "prod-bs");
        assert_eq!(config.checker.raft_status_timeout, Duration::from_millis(800));
        assert_eq!(config.checker.log_gap_margin, 500);
        assert_eq!(config.alerting.default_interval_secs, 60);
    }

    #[test]
    fn test_from_file_rejects_garbage() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(matches!(
            CairnConfig::from_file(file.path()),
            Err(CairnError::Config(_))
        ));
    }

    #[test]
    fn test_round_trip_durations() {
        let config = CairnConfig::development();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: CairnConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.checker.raft_status_timeout, Duration::from_secs(2));
        assert_eq!(parsed.alerting.reload_interval, Duration::from_secs(10));
    }
}
