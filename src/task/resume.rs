//! Resume records: what a task persists to survive a restart

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::{BackendExtras, SwarmOptions, TaskHandle};
use crate::descriptor;
use crate::state::CanonicalState;
use crate::types::TaskId;
use crate::utils;

/// Persisted form of a task
///
/// `native` holds the swarm engine's fast-resume blob and is stored next to the JSON
/// body, not inside it. A swarm record without native data is a dummy record and
/// carries `magnet_uri` instead.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResumeRecord {
    /// Task identity
    pub id: TaskId,
    /// Raw request the descriptor is re-parsed from
    pub source: String,
    /// Name supplied with the request
    pub display_name: Option<String>,
    /// Display name at save time
    pub name: String,
    /// Save directory
    pub save_path: PathBuf,
    /// State at save time
    pub state: CanonicalState,
    /// Share ratio limit
    pub ratio_limit: f64,
    /// Seeding time limit in minutes
    pub seeding_time_limit: i64,
    /// 0-based queue position
    pub queue_position: Option<usize>,
    /// Task completed at least once
    pub has_seed_status: bool,
    /// Creation time
    pub added_at: DateTime<Utc>,
    /// First completion time
    pub completed_at: Option<DateTime<Utc>>,
    /// Total bytes
    pub total_size: u64,
    /// Bytes present
    pub completed_size: u64,
    /// Manual retries after an error
    pub retry_count: u32,
    /// Segmented connections per task
    pub concurrency: Option<u32>,
    /// Magnet link of a dummy record
    pub magnet_uri: Option<String>,
    /// Native engine resume data
    #[serde(skip)]
    pub native: Option<Vec<u8>>,
}

impl ResumeRecord {
    /// Whether this swarm record lacks native data
    pub fn is_dummy(&self) -> bool {
        matches!(self.id, TaskId::Swarm(_)) && self.native.is_none()
    }
}

impl TaskHandle {
    /// Build the resume record, with native data when the engine supplied some
    pub fn resume_record(&self, native: Option<Vec<u8>>) -> ResumeRecord {
        let (ratio_limit, seeding_time_limit, has_seed_status, concurrency) = match &self.extras {
            BackendExtras::Swarm(swarm) => (
                swarm.ratio_limit,
                swarm.seeding_time_limit,
                swarm.has_seed_status,
                None,
            ),
            BackendExtras::Segmented(segmented) => {
                (-2.0, -2, false, Some(segmented.concurrency))
            }
        };
        let magnet_uri = match self.id {
            TaskId::Swarm(hash) if native.is_none() => {
                if self.descriptor.url().starts_with("magnet:") {
                    Some(self.descriptor.url().to_string())
                } else {
                    Some(utils::magnet_uri(&hash, &self.name))
                }
            }
            _ => None,
        };
        ResumeRecord {
            id: self.id,
            source: self.descriptor.source().to_string(),
            display_name: self.descriptor.display_name().map(str::to_string),
            name: self.name.clone(),
            save_path: self.save_path.clone(),
            state: self.state,
            ratio_limit,
            seeding_time_limit,
            queue_position: self.queue_position,
            has_seed_status,
            added_at: self.added_at,
            completed_at: self.completed_at,
            total_size: self.total_size,
            completed_size: self.completed_size,
            retry_count: self.retry_count,
            concurrency,
            magnet_uri,
            native,
        }
    }

    /// Rebuild a task from its record
    ///
    /// Completed tasks come back completed, everything else comes back paused or queued:
    /// the engine's first report after restart is authoritative. Queue positions are
    /// reassigned by the session.
    pub fn from_record(record: &ResumeRecord, options: SwarmOptions, concurrency: u32) -> Self {
        // Dummy records re-add through the magnet link
        let source = match (&record.magnet_uri, record.native.is_none()) {
            (Some(magnet), true) if !record.source.starts_with("magnet:") => magnet.as_str(),
            _ => record.source.as_str(),
        };
        let descriptor = descriptor::parse_with_name(source, record.display_name.as_deref());
        let was_paused = matches!(
            record.state,
            CanonicalState::Paused | CanonicalState::Error
        );

        let mut task = match record.id {
            TaskId::Swarm(hash) => {
                let options = SwarmOptions {
                    ratio_limit: record.ratio_limit,
                    seeding_time_limit: record.seeding_time_limit,
                    ..options
                };
                let mut task = TaskHandle::swarm(
                    hash,
                    descriptor,
                    record.save_path.clone(),
                    options,
                    was_paused,
                );
                if let BackendExtras::Swarm(swarm) = &mut task.extras {
                    swarm.has_seed_status = record.has_seed_status;
                    if record.native.is_some() {
                        swarm.has_metadata = true;
                        swarm.level.has_metadata = true;
                    }
                }
                task
            }
            TaskId::Segmented(id) => TaskHandle::segmented(
                id,
                descriptor,
                record.save_path.clone(),
                record.concurrency.unwrap_or(concurrency),
            ),
        };

        task.name = record.name.clone();
        task.added_at = record.added_at;
        task.completed_at = record.completed_at;
        task.retry_count = record.retry_count;
        task.total_size = record.total_size;
        task.completed_size = if record.total_size > 0 {
            record.completed_size.min(record.total_size)
        } else {
            record.completed_size
        };
        if record.state == CanonicalState::Completed && record.total_size > 0 {
            task.completed_size = record.total_size;
            task.state = CanonicalState::Completed;
            if let BackendExtras::Swarm(swarm) = &mut task.extras {
                swarm.level.class = CanonicalState::Completed;
            }
        }
        task
    }
}
