//! Core types for unidl

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::state::CanonicalState;

/// 20-byte swarm info-hash
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InfoHash(pub [u8; 20]);

/// Error returned when a string is not a 40-character hex info-hash
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid info-hash: {0:?}")]
pub struct InvalidInfoHash(pub String);

impl InfoHash {
    /// Build an info-hash from raw bytes
    pub fn new(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Raw bytes
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Lower-case hex form, as used in external references
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }
}

impl std::fmt::Display for InfoHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl std::str::FromStr for InfoHash {
    type Err = InvalidInfoHash;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.len() != 40 || !s.is_ascii() {
            return Err(InvalidInfoHash(s.to_string()));
        }
        let mut bytes = [0u8; 20];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16)
                .map_err(|_| InvalidInfoHash(s.to_string()))?;
        }
        Ok(Self(bytes))
    }
}

impl Serialize for InfoHash {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for InfoHash {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Session-allocated identifier of a segmented-engine task
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SegmentedId(pub i64);

impl SegmentedId {
    /// Create a new SegmentedId
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Get the inner i64 value
    pub fn get(&self) -> i64 {
        self.0
    }
}

impl From<i64> for SegmentedId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for SegmentedId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for SegmentedId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

/// Backend kind owning a task
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Peer-to-peer swarm engine
    Swarm,
    /// HTTP/FTP segmented engine
    Segmented,
}

impl BackendKind {
    /// Stable lower-case name
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Swarm => "swarm",
            BackendKind::Segmented => "segmented",
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stable identity of a task, discriminated by backend
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "backend", content = "id", rename_all = "snake_case")]
pub enum TaskId {
    /// Swarm task keyed by info-hash
    Swarm(InfoHash),
    /// Segmented task keyed by the session-allocated id
    Segmented(SegmentedId),
}

impl TaskId {
    /// Backend owning this task
    pub fn backend(&self) -> BackendKind {
        match self {
            TaskId::Swarm(_) => BackendKind::Swarm,
            TaskId::Segmented(_) => BackendKind::Segmented,
        }
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskId::Swarm(hash) => write!(f, "swarm:{hash}"),
            TaskId::Segmented(id) => write!(f, "segmented:{id}"),
        }
    }
}

impl From<InfoHash> for TaskId {
    fn from(hash: InfoHash) -> Self {
        TaskId::Swarm(hash)
    }
}

impl From<SegmentedId> for TaskId {
    fn from(id: SegmentedId) -> Self {
        TaskId::Segmented(id)
    }
}

/// Set of backends a batch operation applies to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BackendMask {
    /// Include swarm tasks
    pub swarm: bool,
    /// Include segmented tasks
    pub segmented: bool,
}

impl BackendMask {
    /// Swarm tasks only
    pub const SWARM: BackendMask = BackendMask {
        swarm: true,
        segmented: false,
    };
    /// Segmented tasks only
    pub const SEGMENTED: BackendMask = BackendMask {
        swarm: false,
        segmented: true,
    };
    /// Every task
    pub const ALL: BackendMask = BackendMask {
        swarm: true,
        segmented: true,
    };

    /// Whether `kind` is selected
    pub fn contains(&self, kind: BackendKind) -> bool {
        match kind {
            BackendKind::Swarm => self.swarm,
            BackendKind::Segmented => self.segmented,
        }
    }
}

impl Default for BackendMask {
    fn default() -> Self {
        Self::ALL
    }
}

/// Which tasks a batch operation targets
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskSelection {
    /// Every task of the backends selected by the mask
    All,
    /// An explicit list; ids outside the mask are skipped
    Ids(Vec<TaskId>),
}

impl TaskSelection {
    /// Selection of a single task
    pub fn one(id: impl Into<TaskId>) -> Self {
        TaskSelection::Ids(vec![id.into()])
    }
}

impl From<Vec<TaskId>> for TaskSelection {
    fn from(ids: Vec<TaskId>) -> Self {
        TaskSelection::Ids(ids)
    }
}

/// Engine-reported error: code `0` means no error
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Engine error code
    pub code: i32,
    /// Advisory message, not meant to be parsed
    pub message: String,
}

impl ErrorInfo {
    /// Build an error record
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Whether this record describes an actual error
    pub fn is_error(&self) -> bool {
        self.code != 0
    }
}

/// How a resumed task is scheduled by the engine
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResumeMode {
    /// Let the engine's queueing decide when it runs
    #[default]
    Auto,
    /// Run immediately, bypassing the engine's queue limits
    Forced,
}

/// Queue reordering operation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueOp {
    /// Move to position 0
    Top,
    /// Move to the last position
    Bottom,
    /// Swap with the neighbor one step closer to the top
    Increase,
    /// Swap with the neighbor one step closer to the bottom
    Decrease,
}

/// Per-task result of a batch operation
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchOutcome {
    /// Tasks whose command was dispatched successfully
    pub succeeded: Vec<TaskId>,
    /// Tasks whose command failed, with the reason
    pub failed: Vec<(TaskId, String)>,
}

impl BatchOutcome {
    /// Record a successful dispatch
    pub fn ok(&mut self, id: TaskId) {
        self.succeeded.push(id);
    }

    /// Record a failed dispatch
    pub fn fail(&mut self, id: TaskId, reason: impl std::fmt::Display) {
        self.failed.push((id, reason.to_string()));
    }

    /// Fold another outcome into this one
    pub fn merge(&mut self, other: BatchOutcome) {
        self.succeeded.extend(other.succeeded);
        self.failed.extend(other.failed);
    }

    /// True when no task failed
    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }

    /// Number of tasks the batch touched
    pub fn len(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    /// True when the batch touched no task
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Event emitted by the session
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Task registered with the session
    TaskAdded {
        /// Task identity
        id: TaskId,
        /// Task name
        name: String,
    },

    /// Task changed canonical state
    StateChanged {
        /// Task identity
        id: TaskId,
        /// Previous state
        from: CanonicalState,
        /// New state
        to: CanonicalState,
    },

    /// Task finished downloading with every pending rename and move settled
    TaskFinished {
        /// Task identity
        id: TaskId,
        /// Completion time
        completed_at: DateTime<Utc>,
    },

    /// Task removed from the session
    TaskRemoved {
        /// Task identity
        id: TaskId,
    },

    /// Storage move completed
    StorageMoved {
        /// Task identity
        id: TaskId,
        /// New save path
        path: PathBuf,
    },

    /// Storage move failed; the task keeps its previous save path
    StorageMoveFailed {
        /// Task identity
        id: TaskId,
        /// Engine-supplied reason
        error: String,
    },

    /// Resume record written
    ResumeDataSaved {
        /// Task identity
        id: TaskId,
    },

    /// Queue order of a backend changed
    QueueReordered {
        /// Backend whose queue changed
        backend: BackendKind,
    },

    /// Session is shutting down
    Shutdown,
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn info_hash_hex_roundtrip() {
        let hex = "0123456789abcdef0123456789abcdef01234567";
        let hash: InfoHash = hex.parse().unwrap();
        assert_eq!(hash.to_string(), hex);
        assert_eq!(hash.as_bytes()[0], 0x01);
    }

    #[test]
    fn info_hash_accepts_upper_case_and_rejects_bad_length() {
        let hash: InfoHash = "ABCDEF0123456789ABCDEF0123456789ABCDEF01".parse().unwrap();
        assert_eq!(hash.to_string(), "abcdef0123456789abcdef0123456789abcdef01");
        assert!("abc".parse::<InfoHash>().is_err());
        assert!("zz23456789abcdef0123456789abcdef01234567".parse::<InfoHash>().is_err());
    }

    #[test]
    fn task_id_serializes_with_backend_tag() {
        let id = TaskId::Segmented(SegmentedId(7));
        let json = serde_json::to_value(id).unwrap();
        assert_eq!(json["backend"], "segmented");
        assert_eq!(json["id"], 7);

        let swarm = TaskId::Swarm(InfoHash([0xab; 20]));
        let json = serde_json::to_string(&swarm).unwrap();
        let back: TaskId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, swarm);
    }

    #[test]
    fn backend_mask_contains() {
        assert!(BackendMask::ALL.contains(BackendKind::Swarm));
        assert!(BackendMask::ALL.contains(BackendKind::Segmented));
        assert!(!BackendMask::SWARM.contains(BackendKind::Segmented));
        assert!(!BackendMask::SEGMENTED.contains(BackendKind::Swarm));
    }

    #[test]
    fn error_info_code_zero_is_not_an_error() {
        assert!(!ErrorInfo::new(0, "something").is_error());
        assert!(ErrorInfo::new(3, "").is_error());
    }

    #[test]
    fn batch_outcome_merge_keeps_both_sides() {
        let a = TaskId::Segmented(SegmentedId(1));
        let b = TaskId::Segmented(SegmentedId(2));
        let mut outcome = BatchOutcome::default();
        outcome.ok(a);
        let mut other = BatchOutcome::default();
        other.fail(b, "rejected");
        outcome.merge(other);
        assert_eq!(outcome.len(), 2);
        assert!(!outcome.all_succeeded());
        assert_eq!(outcome.failed[0], (b, "rejected".to_string()));
    }

    #[test]
    fn session_event_is_tagged() {
        let event = SessionEvent::StateChanged {
            id: TaskId::Segmented(SegmentedId(3)),
            from: CanonicalState::Paused,
            to: CanonicalState::Downloading,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "state_changed");
        assert_eq!(json["to"], "downloading");
    }
}
