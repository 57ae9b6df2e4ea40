//! Copy-on-read view of a task

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::{BackendExtras, TaskHandle};
use crate::state::CanonicalState;
use crate::types::{BackendKind, ErrorInfo, TaskId};

/// Public fields of a [`TaskHandle`] at one point in time
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskSnapshot {
    /// Task identity
    pub id: TaskId,
    /// External reference string
    pub hash: String,
    /// Display name
    pub name: String,
    /// Download URL
    pub url: String,
    /// Save directory
    pub save_path: PathBuf,
    /// Canonical state
    pub state: CanonicalState,
    /// Total bytes, 0 while unknown
    pub total_size: u64,
    /// Bytes present
    pub completed_size: u64,
    /// Smoothed download rate
    pub download_rate: u64,
    /// Smoothed upload rate
    pub upload_rate: u64,
    /// Estimated time left at the smoothed rate
    pub eta: Option<Duration>,
    /// Manual retries after an error
    pub retry_count: u32,
    /// Last engine error
    pub last_error: ErrorInfo,
    /// 0-based queue position
    pub queue_position: Option<usize>,
    /// Creation time
    pub added_at: DateTime<Utc>,
    /// First completion time
    pub completed_at: Option<DateTime<Utc>>,
    /// Renames not yet settled
    pub pending_rename_count: usize,
    /// Storage move in progress
    pub move_in_progress: bool,
    /// Piece layout known (always true for segmented tasks)
    pub has_metadata: bool,
    /// Swarm task paused outside the engine queue
    pub user_paused: bool,
    /// Segmented engine holds the task in its waiting list
    pub engine_waiting: bool,
}

impl TaskHandle {
    /// Copy the public fields
    pub fn snapshot(&self) -> TaskSnapshot {
        let (has_metadata, user_paused, engine_waiting) = match &self.extras {
            BackendExtras::Swarm(swarm) => (swarm.has_metadata, swarm.user_paused, false),
            BackendExtras::Segmented(segmented) => (true, false, segmented.engine_waiting),
        };
        let rate = self.speed.average();
        let remaining = self.total_size.saturating_sub(self.completed_size);
        let eta = match self.state {
            CanonicalState::Downloading if self.total_size > 0 => self.speed.eta(remaining),
            _ => None,
        };
        TaskSnapshot {
            id: self.id,
            hash: self.hash_string(),
            name: self.name.clone(),
            url: self.descriptor.url().to_string(),
            save_path: self.save_path.clone(),
            state: self.state,
            total_size: self.total_size,
            completed_size: self.completed_size,
            download_rate: rate.download,
            upload_rate: rate.upload,
            eta,
            retry_count: self.retry_count,
            last_error: self.last_error.clone(),
            queue_position: self.queue_position,
            added_at: self.added_at,
            completed_at: self.completed_at,
            pending_rename_count: self.pending_rename_count,
            move_in_progress: self.pending_move_in_progress,
            has_metadata,
            user_paused,
            engine_waiting,
        }
    }
}

impl TaskSnapshot {
    /// Backend owning the task
    pub fn backend(&self) -> BackendKind {
        self.id.backend()
    }

    /// Fraction of bytes present, in `0.0..=1.0`
    pub fn progress(&self) -> f64 {
        if self.state == CanonicalState::Completed {
            return 1.0;
        }
        if self.total_size == 0 {
            return 0.0;
        }
        self.completed_size as f64 / self.total_size as f64
    }

    /// Queue position as shown to users (1-based)
    pub fn display_queue_position(&self) -> Option<usize> {
        self.queue_position.map(|p| p + 1)
    }

    /// All bytes present
    pub fn is_completed(&self) -> bool {
        self.state == CanonicalState::Completed
    }

    /// Paused by the user; a completed segmented task is never paused
    pub fn is_paused(&self) -> bool {
        match self.backend() {
            BackendKind::Swarm => self.state == CanonicalState::Paused || self.user_paused,
            BackendKind::Segmented => self.state == CanonicalState::Paused,
        }
    }

    /// Still fetching data
    pub fn is_downloading(&self) -> bool {
        match self.backend() {
            BackendKind::Swarm => matches!(
                self.state,
                CanonicalState::Downloading | CanonicalState::Queued | CanonicalState::Checking
            ),
            BackendKind::Segmented => self.state == CanonicalState::Downloading,
        }
    }

    /// Completed swarm task that is still shared
    pub fn is_seeding(&self) -> bool {
        self.backend() == BackendKind::Swarm && self.is_completed() && !self.is_paused()
    }

    /// Waiting for a slot in its engine's queue
    pub fn is_queued(&self) -> bool {
        if self.is_paused() {
            return false;
        }
        match self.backend() {
            BackendKind::Swarm => self.state == CanonicalState::Queued,
            BackendKind::Segmented => self.engine_waiting,
        }
    }

    /// Engine error
    pub fn is_errored(&self) -> bool {
        self.state == CanonicalState::Error
    }

    /// Moving data right now
    ///
    /// Swarm: transferring, fetching metadata, or moving storage. Segmented: anything
    /// not paused, including idle tasks.
    pub fn is_active(&self) -> bool {
        match self.backend() {
            BackendKind::Swarm => {
                if self.is_paused() {
                    return false;
                }
                self.download_rate > 0
                    || self.upload_rate > 0
                    || self.move_in_progress
                    || (self.state == CanonicalState::Downloading && !self.has_metadata)
            }
            BackendKind::Segmented => !self.is_paused(),
        }
    }

    /// Complement of [`is_active`](Self::is_active)
    pub fn is_inactive(&self) -> bool {
        !self.is_active()
    }

    /// Swarm task downloading with no incoming data
    pub fn is_stalled_downloading(&self) -> bool {
        self.backend() == BackendKind::Swarm
            && !self.is_paused()
            && self.state == CanonicalState::Downloading
            && self.has_metadata
            && self.download_rate == 0
    }

    /// Swarm task seeding with no outgoing data
    pub fn is_stalled_uploading(&self) -> bool {
        self.is_seeding() && self.upload_rate == 0
    }
}
