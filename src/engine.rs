//! Download engine boundary
//!
//! The session drives two engines it does not implement: a swarm engine and a segmented
//! HTTP/FTP engine. Commands go out through the traits below. Notifications come back
//! as the native types in this module, pushed by the host into
//! [`Session::ingest_swarm_status`](crate::Session::ingest_swarm_status),
//! [`Session::ingest_swarm_alert`](crate::Session::ingest_swarm_alert) and
//! [`Session::ingest_segmented`](crate::Session::ingest_segmented) from whatever thread
//! the engine delivers on.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::BackendError;
use crate::types::{ErrorInfo, InfoHash, ResumeMode, SegmentedId};

/// Result type for engine commands
pub type EngineResult<T> = std::result::Result<T, BackendError>;

/// Per-task transfer limits in bytes per second (`None` = unlimited)
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimits {
    /// Download limit
    pub download: Option<u64>,
    /// Upload limit
    pub upload: Option<u64>,
}

/// Parameters for adding a swarm task
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SwarmAddParams {
    /// Magnet URI or metainfo location
    pub source: String,
    /// Expected info-hash when the source carries one
    pub info_hash: Option<InfoHash>,
    /// Task name override
    pub name: Option<String>,
    /// Save directory
    pub save_path: PathBuf,
    /// Add without starting
    pub paused: bool,
    /// Let the engine queue the task
    pub auto_managed: bool,
    /// Share ratio limit (negative = engine default)
    pub ratio_limit: f64,
    /// Seeding time limit in minutes (negative = engine default)
    pub seeding_time_limit: i64,
    /// Native fast-resume data from a previous run
    pub resume_data: Option<Vec<u8>>,
}

/// Commands accepted by the swarm engine
#[async_trait]
pub trait SwarmEngine: Send + Sync {
    /// Add a task; returns its info-hash
    async fn add(&self, params: SwarmAddParams) -> EngineResult<InfoHash>;

    /// Stop transferring
    async fn pause(&self, hash: InfoHash) -> EngineResult<()>;

    /// Start transferring
    async fn resume(&self, hash: InfoHash, mode: ResumeMode) -> EngineResult<()>;

    /// Move data to `path`; completion arrives as a [`SwarmAlert`]
    async fn move_storage(&self, hash: InfoHash, path: &Path) -> EngineResult<()>;

    /// Set per-file download priorities
    async fn prioritize_files(&self, hash: InfoHash, priorities: &[u8]) -> EngineResult<()>;

    /// Rename file `index`; completion arrives as a [`SwarmAlert`]
    async fn rename_file(&self, hash: InfoHash, index: usize, new_name: &str)
    -> EngineResult<()>;

    /// Re-verify data on disk
    async fn force_recheck(&self, hash: InfoHash) -> EngineResult<()>;

    /// Announce to trackers now
    async fn force_reannounce(&self, hash: InfoHash) -> EngineResult<()>;

    /// Apply transfer limits
    async fn set_rate_limits(&self, hash: InfoHash, limits: RateLimits) -> EngineResult<()>;

    /// Native fast-resume data, or `None` while the task has no metadata
    async fn request_resume_data(&self, hash: InfoHash) -> EngineResult<Option<Vec<u8>>>;

    /// Remove the task, optionally deleting its data
    async fn remove(&self, hash: InfoHash, delete_files: bool) -> EngineResult<()>;
}

/// Request handed to the segmented engine
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentedRequest {
    /// Download URL
    pub url: String,
    /// Output file name
    pub file_name: String,
    /// Save directory
    pub save_path: PathBuf,
    /// Request headers
    pub headers: BTreeMap<String, String>,
    /// Engine options (defaults merged under the request's own options)
    pub options: BTreeMap<String, String>,
    /// Connections per task
    pub concurrency: u32,
    /// Submit without starting
    pub paused: bool,
}

/// Commands accepted by the segmented engine
#[async_trait]
pub trait SegmentedEngine: Send + Sync {
    /// Register a request under a session-allocated id
    async fn submit(&self, id: SegmentedId, request: SegmentedRequest) -> EngineResult<()>;

    /// Start or resume
    async fn start(&self, id: SegmentedId) -> EngineResult<()>;

    /// Stop
    async fn stop(&self, id: SegmentedId) -> EngineResult<()>;

    /// Remove a single task
    async fn remove(&self, id: SegmentedId, delete_files: bool) -> EngineResult<()>;

    /// Remove several tasks in one call; `ids.len()` never exceeds
    /// [`max_batch_size`](Self::max_batch_size)
    async fn remove_batch(&self, ids: &[SegmentedId], delete_files: bool) -> EngineResult<()>;

    /// Change the number of connections used by a task
    async fn set_concurrency(&self, id: SegmentedId, connections: u32) -> EngineResult<()>;

    /// Largest batch accepted by [`remove_batch`](Self::remove_batch)
    fn max_batch_size(&self) -> usize {
        64
    }
}

/// Swarm engine's own task state
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwarmNativeState {
    /// Verifying fast-resume data
    CheckingResumeData,
    /// Verifying pieces on disk
    CheckingFiles,
    /// Fetching metadata from peers; piece layout unknown
    #[default]
    DownloadingMetadata,
    /// Transferring pieces
    Downloading,
    /// All wanted pieces present
    Finished,
    /// All pieces present and uploading
    Seeding,
    /// Allocating disk space
    Allocating,
}

impl SwarmNativeState {
    /// Whether the engine is verifying data
    pub fn is_checking(&self) -> bool {
        matches!(
            self,
            SwarmNativeState::CheckingResumeData | SwarmNativeState::CheckingFiles
        )
    }

    /// Whether the engine considers the task complete
    pub fn is_seed(&self) -> bool {
        matches!(self, SwarmNativeState::Finished | SwarmNativeState::Seeding)
    }
}

/// Level-triggered swarm status report
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwarmStatus {
    /// Engine state
    pub state: SwarmNativeState,
    /// Engine-level paused flag
    pub paused: bool,
    /// Engine queue manages the task
    pub auto_managed: bool,
    /// Piece layout known
    pub has_metadata: bool,
    /// Current engine error (code 0 = none)
    pub error: ErrorInfo,
    /// Wanted bytes
    pub total_size: u64,
    /// Wanted bytes present
    pub completed_size: u64,
    /// Instantaneous download rate
    pub download_rate: u64,
    /// Instantaneous upload rate
    pub upload_rate: u64,
}

/// Edge-triggered swarm notification
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "alert", rename_all = "snake_case")]
pub enum SwarmAlert {
    /// Metadata arrived
    MetadataReceived,
    /// File rename finished
    FileRenamed {
        /// File index
        index: usize,
        /// New file name
        new_name: String,
    },
    /// File rename failed
    FileRenameFailed {
        /// File index
        index: usize,
        /// Engine reason
        error: String,
    },
    /// Storage move finished
    StorageMoved {
        /// New save path
        path: PathBuf,
    },
    /// Storage move failed
    StorageMoveFailed {
        /// Engine reason
        error: String,
    },
    /// All wanted pieces downloaded
    Finished,
    /// Task deleted by the engine
    Removed,
    /// Engine error
    Error {
        /// Error code
        code: i32,
        /// Error message
        message: String,
    },
}

/// Segmented engine's native event codes
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SegmentedNativeEvent {
    /// No activity
    None,
    /// Started
    Start,
    /// Paused
    Pause,
    /// Stopped
    Stop,
    /// Completed
    Complete,
    /// Failed
    Error,
    /// Removed
    Remove,
}

impl SegmentedNativeEvent {
    /// Convert the engine's integer code; unknown codes map to `None`
    pub fn from_i32(code: i32) -> Self {
        match code {
            1 => SegmentedNativeEvent::Start,
            2 => SegmentedNativeEvent::Pause,
            3 => SegmentedNativeEvent::Stop,
            4 => SegmentedNativeEvent::Complete,
            5 => SegmentedNativeEvent::Error,
            6 => SegmentedNativeEvent::Remove,
            _ => SegmentedNativeEvent::None,
        }
    }

    /// Convert to the engine's integer code
    pub fn to_i32(self) -> i32 {
        match self {
            SegmentedNativeEvent::None => 0,
            SegmentedNativeEvent::Start => 1,
            SegmentedNativeEvent::Pause => 2,
            SegmentedNativeEvent::Stop => 3,
            SegmentedNativeEvent::Complete => 4,
            SegmentedNativeEvent::Error => 5,
            SegmentedNativeEvent::Remove => 6,
        }
    }
}

/// Progress report from the segmented engine
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentedProgress {
    /// File size, 0 while unknown
    pub total_size: u64,
    /// Bytes on disk
    pub completed_size: u64,
    /// Instantaneous download rate
    pub download_rate: u64,
    /// Instantaneous upload rate
    pub upload_rate: u64,
    /// Engine holds the task in its waiting list
    pub waiting: bool,
}
