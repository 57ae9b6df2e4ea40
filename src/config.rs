//! Configuration types for unidl

use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, path::PathBuf, time::Duration};

use crate::error::{Error, Result};

/// Session behaviour configuration
///
/// Governs how the orchestrator reacts to engine notifications and how it reports them
/// to subscribers.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Capacity of the broadcast channel behind [`subscribe`](crate::Session::subscribe)
    /// (default: 1000)
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,

    /// Default save directory for tasks without a `dir` option (default: "./downloads")
    #[serde(default = "default_save_path")]
    pub default_save_path: PathBuf,

    /// Force a recheck when a swarm task finishes downloading (default: false)
    #[serde(default)]
    pub recheck_on_completion: bool,

    /// Let a category filter also match its subcategories (default: true)
    #[serde(default = "default_true")]
    pub subcategories_enabled: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            event_channel_capacity: default_event_channel_capacity(),
            default_save_path: default_save_path(),
            recheck_on_completion: false,
            subcategories_enabled: true,
        }
    }
}

/// Segmented engine defaults
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SegmentedConfig {
    /// Connections per task handed to the engine (default: 16)
    #[serde(default = "default_concurrency")]
    pub default_concurrency: u32,

    /// Options merged under each request's own `--` options
    #[serde(default)]
    pub default_options: BTreeMap<String, String>,
}

impl Default for SegmentedConfig {
    fn default() -> Self {
        Self {
            default_concurrency: default_concurrency(),
            default_options: BTreeMap::new(),
        }
    }
}

/// Swarm engine defaults
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SwarmConfig {
    /// Share ratio limit for new tasks; negative values defer to the engine's global
    /// policy (default: -2.0)
    #[serde(default = "default_ratio_limit")]
    pub default_ratio_limit: f64,

    /// Seeding time limit in minutes for new tasks; negative values defer to the
    /// engine's global policy (default: -2)
    #[serde(default = "default_seeding_time_limit")]
    pub default_seeding_time_limit: i64,

    /// Add new swarm tasks as auto-managed (default: true)
    #[serde(default = "default_true")]
    pub auto_managed: bool,
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            default_ratio_limit: default_ratio_limit(),
            default_seeding_time_limit: default_seeding_time_limit(),
            auto_managed: true,
        }
    }
}

/// Resume-record storage configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Database path (default: "./unidl.db")
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// Interval between periodic resume-record saves of every task
    /// (default: 60 seconds, `None` disables the periodic save)
    #[serde(default = "default_resume_save_interval", with = "optional_duration_serde")]
    pub resume_save_interval: Option<Duration>,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            resume_save_interval: default_resume_save_interval(),
        }
    }
}

/// Main configuration for [`Session`](crate::Session)
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Orchestrator behaviour
    #[serde(default)]
    pub session: SessionConfig,

    /// Segmented engine defaults
    #[serde(default)]
    pub segmented: SegmentedConfig,

    /// Swarm engine defaults
    #[serde(default)]
    pub swarm: SwarmConfig,

    /// Resume-record storage
    #[serde(default)]
    pub persistence: PersistenceConfig,
}

impl Config {
    /// Reject settings the session cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.session.event_channel_capacity == 0 {
            return Err(Error::Config {
                message: "event channel capacity must be at least 1".to_string(),
                key: Some("session.event_channel_capacity".to_string()),
            });
        }
        if self.segmented.default_concurrency == 0 {
            return Err(Error::Config {
                message: "segmented concurrency must be at least 1".to_string(),
                key: Some("segmented.default_concurrency".to_string()),
            });
        }
        if self.persistence.resume_save_interval == Some(Duration::ZERO) {
            return Err(Error::Config {
                message: "resume save interval must be non-zero; omit it to disable".to_string(),
                key: Some("persistence.resume_save_interval".to_string()),
            });
        }
        Ok(())
    }
}

fn default_event_channel_capacity() -> usize {
    1000
}

fn default_save_path() -> PathBuf {
    PathBuf::from("./downloads")
}

fn default_concurrency() -> u32 {
    16
}

fn default_ratio_limit() -> f64 {
    -2.0
}

fn default_seeding_time_limit() -> i64 {
    -2
}

fn default_database_path() -> PathBuf {
    PathBuf::from("./unidl.db")
}

fn default_resume_save_interval() -> Option<Duration> {
    Some(Duration::from_secs(60))
}

fn default_true() -> bool {
    true
}

// Optional Duration serialization helper (whole seconds)
mod optional_duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_some(&d.as_secs()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = Option::<u64>::deserialize(deserializer)?;
        Ok(secs.map(Duration::from_secs))
    }
}
