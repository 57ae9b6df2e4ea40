//! Per-download aggregate and its state machine
//!
//! A [`TaskHandle`] is only ever mutated by the session's drain loop. Everything the
//! session has to do in response (engine calls, broadcasts, resume saves) is left in
//! the handle's effect outbox and collected with [`TaskHandle::take_effects`].

mod resume;
mod snapshot;
mod triggers;

pub use resume::ResumeRecord;
pub use snapshot::TaskSnapshot;
pub use triggers::{Trigger, TriggerQueue};

use chrono::{DateTime, Utc};
use std::path::PathBuf;

use crate::config::{SessionConfig, SwarmConfig};
use crate::descriptor::RequestDescriptor;
use crate::engine::{SegmentedProgress, SwarmNativeState, SwarmStatus};
use crate::speed_monitor::SpeedMonitor;
use crate::state::{CanonicalEvent, CanonicalState, next_state};
use crate::translator::SwarmLevel;
use crate::types::{BackendKind, ErrorInfo, InfoHash, SegmentedId, TaskId};
use crate::utils;

/// Settings a swarm task is created with
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SwarmOptions {
    /// Engine queue manages the task
    pub auto_managed: bool,
    /// Share ratio limit
    pub ratio_limit: f64,
    /// Seeding time limit in minutes
    pub seeding_time_limit: i64,
    /// Recheck once after the first completion
    pub recheck_on_completion: bool,
}

impl SwarmOptions {
    /// Options taken from configuration defaults
    pub fn from_config(swarm: &SwarmConfig, session: &SessionConfig) -> Self {
        Self {
            auto_managed: swarm.auto_managed,
            ratio_limit: swarm.default_ratio_limit,
            seeding_time_limit: swarm.default_seeding_time_limit,
            recheck_on_completion: session.recheck_on_completion,
        }
    }
}

impl Default for SwarmOptions {
    fn default() -> Self {
        Self::from_config(&SwarmConfig::default(), &SessionConfig::default())
    }
}

/// Swarm-only task state
#[derive(Clone, Debug, PartialEq)]
pub struct SwarmExtras {
    /// Piece layout known
    pub has_metadata: bool,
    /// Engine queue manages the task
    pub auto_managed: bool,
    /// A pause is waiting for metadata
    pub stop_when_ready: bool,
    /// Task completed at least once
    pub has_seed_status: bool,
    /// No recheck has run since the task was added
    pub unchecked: bool,
    /// Recheck once after the first completion
    pub recheck_on_completion: bool,
    /// Share ratio limit
    pub ratio_limit: f64,
    /// Seeding time limit in minutes
    pub seeding_time_limit: i64,
    /// Engine state from the last status report
    pub native_state: SwarmNativeState,
    /// Paused outside the engine queue
    pub user_paused: bool,
    /// Level of the last status report
    pub level: SwarmLevel,
}

/// Segmented-only task state
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SegmentedExtras {
    /// Connections per task
    pub concurrency: u32,
    /// Engine holds the task in its waiting list
    pub engine_waiting: bool,
}

/// Backend-specific part of a task
#[derive(Clone, Debug, PartialEq)]
pub enum BackendExtras {
    /// Swarm task
    Swarm(SwarmExtras),
    /// Segmented task
    Segmented(SegmentedExtras),
}

/// Result of applying one event
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    /// State changed
    Changed {
        /// Previous state
        from: CanonicalState,
        /// New state
        to: CanonicalState,
    },
    /// Event accepted without a state change
    Unchanged,
    /// Event queued until pending operations settle
    Deferred,
    /// Event not legal in the current state; dropped
    Ignored,
}

/// Work the session performs after applying events
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TaskEffect {
    /// Task changed state
    StateChanged {
        /// Previous state
        from: CanonicalState,
        /// New state
        to: CanonicalState,
    },
    /// Completion settled
    Finished,
    /// Ask the engine to recheck the data
    Recheck,
    /// Issue the pause that waited for metadata
    ReissueStop,
    /// Persist the resume record
    SaveResumeData,
    /// Storage move succeeded
    StorageMoved(PathBuf),
    /// Storage move failed
    StorageMoveFailed(String),
    /// Task entered `Removing` and must be dropped
    Removed,
}

/// Unified per-download aggregate
#[derive(Debug)]
pub struct TaskHandle {
    id: TaskId,
    descriptor: RequestDescriptor,
    name: String,
    save_path: PathBuf,
    state: CanonicalState,
    total_size: u64,
    completed_size: u64,
    speed: SpeedMonitor,
    retry_count: u32,
    last_error: ErrorInfo,
    queue_position: Option<usize>,
    added_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    pending_rename_count: usize,
    pending_move_in_progress: bool,
    move_target: Option<PathBuf>,
    triggers: TriggerQueue,
    effects: Vec<TaskEffect>,
    extras: BackendExtras,
}

impl TaskHandle {
    /// New swarm task; starts `Paused` when `paused`, otherwise `Queued` until the
    /// engine reports
    pub fn swarm(
        hash: InfoHash,
        descriptor: RequestDescriptor,
        save_path: PathBuf,
        options: SwarmOptions,
        paused: bool,
    ) -> Self {
        let state = if paused {
            CanonicalState::Paused
        } else {
            CanonicalState::Queued
        };
        let has_metadata = !descriptor.url().starts_with("magnet:");
        let name = match descriptor.display_name() {
            Some(name) => name.to_string(),
            None => utils::magnet_display_name(descriptor.url()).unwrap_or_else(|| hash.to_hex()),
        };
        let extras = BackendExtras::Swarm(SwarmExtras {
            has_metadata,
            auto_managed: options.auto_managed,
            stop_when_ready: false,
            has_seed_status: false,
            unchecked: true,
            recheck_on_completion: options.recheck_on_completion,
            ratio_limit: options.ratio_limit,
            seeding_time_limit: options.seeding_time_limit,
            native_state: if has_metadata {
                SwarmNativeState::Downloading
            } else {
                SwarmNativeState::DownloadingMetadata
            },
            user_paused: paused,
            level: SwarmLevel {
                class: state,
                has_metadata,
            },
        });
        Self::build(TaskId::Swarm(hash), descriptor, name, save_path, state, extras)
    }

    /// New segmented task; starts `Paused` until the engine reports it started
    pub fn segmented(
        id: SegmentedId,
        descriptor: RequestDescriptor,
        save_path: PathBuf,
        concurrency: u32,
    ) -> Self {
        let name = descriptor.task_name().to_string();
        let extras = BackendExtras::Segmented(SegmentedExtras {
            concurrency,
            engine_waiting: false,
        });
        Self::build(
            TaskId::Segmented(id),
            descriptor,
            name,
            save_path,
            CanonicalState::Paused,
            extras,
        )
    }

    fn build(
        id: TaskId,
        descriptor: RequestDescriptor,
        name: String,
        save_path: PathBuf,
        state: CanonicalState,
        extras: BackendExtras,
    ) -> Self {
        Self {
            id,
            descriptor,
            name,
            save_path,
            state,
            total_size: 0,
            completed_size: 0,
            speed: SpeedMonitor::new(),
            retry_count: 0,
            last_error: ErrorInfo::default(),
            queue_position: None,
            added_at: Utc::now(),
            completed_at: None,
            pending_rename_count: 0,
            pending_move_in_progress: false,
            move_target: None,
            triggers: TriggerQueue::default(),
            effects: Vec::new(),
            extras,
        }
    }

    /// Task identity
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Backend owning the task
    pub fn backend(&self) -> BackendKind {
        self.id.backend()
    }

    /// Descriptor the task was created from
    pub fn descriptor(&self) -> &RequestDescriptor {
        &self.descriptor
    }

    /// Display name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current save directory
    pub fn save_path(&self) -> &PathBuf {
        &self.save_path
    }

    /// Current state
    pub fn state(&self) -> CanonicalState {
        self.state
    }

    /// Total bytes, 0 while unknown
    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    /// Bytes present
    pub fn completed_size(&self) -> u64 {
        self.completed_size
    }

    /// Rate smoother
    pub fn speed(&self) -> &SpeedMonitor {
        &self.speed
    }

    /// Manual retries after an error
    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Last engine error
    pub fn last_error(&self) -> &ErrorInfo {
        &self.last_error
    }

    /// 0-based position within the backend's active set
    pub fn queue_position(&self) -> Option<usize> {
        self.queue_position
    }

    /// Creation time
    pub fn added_at(&self) -> DateTime<Utc> {
        self.added_at
    }

    /// First completion time
    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    /// Renames issued but not yet settled
    pub fn pending_rename_count(&self) -> usize {
        self.pending_rename_count
    }

    /// Whether a storage move is in progress
    pub fn is_move_in_progress(&self) -> bool {
        self.pending_move_in_progress
    }

    /// Backend-specific state
    pub fn extras(&self) -> &BackendExtras {
        &self.extras
    }

    /// Swarm-specific state
    pub fn swarm_extras(&self) -> Option<&SwarmExtras> {
        match &self.extras {
            BackendExtras::Swarm(swarm) => Some(swarm),
            BackendExtras::Segmented(_) => None,
        }
    }

    /// Segmented-specific state
    pub fn segmented_extras(&self) -> Option<&SegmentedExtras> {
        match &self.extras {
            BackendExtras::Segmented(segmented) => Some(segmented),
            BackendExtras::Swarm(_) => None,
        }
    }

    /// External reference string (hex info-hash or segmented item hash)
    pub fn hash_string(&self) -> String {
        match self.id {
            TaskId::Swarm(hash) => hash.to_hex(),
            TaskId::Segmented(id) => utils::segmented_item_hash(id, self.descriptor.source()),
        }
    }

    /// Collect the effects produced since the last call
    pub fn take_effects(&mut self) -> Vec<TaskEffect> {
        std::mem::take(&mut self.effects)
    }

    pub(crate) fn set_queue_position(&mut self, position: Option<usize>) {
        self.queue_position = position;
    }

    /// Apply one event
    pub fn apply(&mut self, event: CanonicalEvent) -> Transition {
        let event_name = event.name();
        let transition = match event {
            CanonicalEvent::MetadataReceived => self.on_metadata_received(),
            CanonicalEvent::FileRenamed { .. } | CanonicalEvent::FileRenameFailed { .. } => {
                self.on_rename_settled();
                Transition::Unchanged
            }
            CanonicalEvent::StorageMoveFinished {
                ok,
                new_path,
                error,
            } => {
                self.on_move_finished(ok, new_path, error);
                Transition::Unchanged
            }
            CanonicalEvent::RemovalRequested
                if self.pending_move_in_progress && self.state != CanonicalState::Removing =>
            {
                self.defer(|task| {
                    task.apply(CanonicalEvent::RemovalRequested);
                });
                Transition::Deferred
            }
            CanonicalEvent::Completed => self.on_completed(),
            other => self.on_state_event(&other),
        };

        match transition {
            Transition::Ignored => {
                tracing::debug!(task = %self.id, state = %self.state, event = event_name, "Ignoring event");
            }
            Transition::Deferred => {
                tracing::debug!(task = %self.id, event = event_name, "Deferring event until storage move settles");
            }
            Transition::Changed { from, to } => {
                tracing::debug!(task = %self.id, %from, %to, event = event_name, "Task changed state");
            }
            Transition::Unchanged => {}
        }
        transition
    }

    fn on_state_event(&mut self, event: &CanonicalEvent) -> Transition {
        if self.state == CanonicalState::Removing {
            return Transition::Ignored;
        }
        match event {
            CanonicalEvent::Failed { code, message } => {
                if !event.is_fatal_failure() {
                    self.last_error = ErrorInfo::default();
                    return Transition::Unchanged;
                }
                self.last_error = ErrorInfo::new(*code, message.clone());
            }
            CanonicalEvent::None | CanonicalEvent::Started | CanonicalEvent::Stopped => {
                self.last_error = ErrorInfo::default();
            }
            _ => {}
        }

        let from = self.state;
        match next_state(from, event) {
            Some(to) => {
                self.enter(to);
                Transition::Changed { from, to }
            }
            None if already_in(from, event) => Transition::Unchanged,
            None => Transition::Ignored,
        }
    }

    fn on_completed(&mut self) -> Transition {
        match self.state {
            CanonicalState::Removing => return Transition::Ignored,
            CanonicalState::Completed => return Transition::Unchanged,
            _ => {}
        }
        if self.total_size == 0 {
            if self.completed_size == 0 {
                // Size unknown: completing now would break completed == total > 0
                return Transition::Ignored;
            }
            self.total_size = self.completed_size;
        }
        self.completed_size = self.total_size;
        self.last_error = ErrorInfo::default();

        let from = self.state;
        self.enter(CanonicalState::Completed);
        if self.is_settled() {
            self.finish();
        } else {
            self.defer(TaskHandle::finish);
        }
        Transition::Changed {
            from,
            to: CanonicalState::Completed,
        }
    }

    fn finish(&mut self) {
        if self.state != CanonicalState::Completed {
            return;
        }
        // Applies to deferred completion too: a task already checked is not rechecked
        if let BackendExtras::Swarm(swarm) = &mut self.extras
            && swarm.recheck_on_completion
            && swarm.unchecked
        {
            self.effects.push(TaskEffect::Recheck);
        }
        self.effects.push(TaskEffect::Finished);
    }

    fn enter(&mut self, to: CanonicalState) {
        let from = self.state;
        self.state = to;
        if from == CanonicalState::Error && to != CanonicalState::Error {
            self.last_error = ErrorInfo::default();
        }
        self.effects.push(TaskEffect::StateChanged { from, to });

        match to {
            CanonicalState::Paused => self.speed.reset(),
            CanonicalState::Downloading if from == CanonicalState::Error => {
                self.retry_count += 1;
                self.speed.reset();
            }
            CanonicalState::Completed => {
                self.completed_at.get_or_insert_with(Utc::now);
                if let BackendExtras::Swarm(swarm) = &mut self.extras {
                    swarm.has_seed_status = true;
                }
            }
            CanonicalState::Checking => {
                if let BackendExtras::Swarm(swarm) = &mut self.extras {
                    swarm.unchecked = false;
                }
            }
            CanonicalState::Removing => self.effects.push(TaskEffect::Removed),
            _ => {}
        }
    }

    fn on_metadata_received(&mut self) -> Transition {
        let BackendExtras::Swarm(swarm) = &mut self.extras else {
            return Transition::Ignored;
        };
        swarm.has_metadata = true;
        if swarm.native_state == SwarmNativeState::DownloadingMetadata {
            swarm.native_state = SwarmNativeState::Downloading;
        }
        if swarm.stop_when_ready {
            swarm.stop_when_ready = false;
            self.effects.push(TaskEffect::ReissueStop);
        }
        Transition::Unchanged
    }

    fn on_rename_settled(&mut self) {
        self.pending_rename_count = self.pending_rename_count.saturating_sub(1);
        if self.pending_rename_count == 0 {
            self.fire_triggers_if_settled();
            if self.state == CanonicalState::Paused {
                self.effects.push(TaskEffect::SaveResumeData);
            }
        }
    }

    fn on_move_finished(&mut self, ok: bool, new_path: Option<PathBuf>, error: Option<String>) {
        // Cleared before triggers run: they rely on the move being over
        self.pending_move_in_progress = false;
        let target = self.move_target.take();
        if ok {
            if let Some(path) = new_path.or(target) {
                self.save_path = path.clone();
                self.effects.push(TaskEffect::StorageMoved(path));
            }
        } else {
            let reason = error.unwrap_or_else(|| "storage move failed".to_string());
            self.effects.push(TaskEffect::StorageMoveFailed(reason));
        }
        self.effects.push(TaskEffect::SaveResumeData);
        self.fire_triggers_if_settled();
    }

    /// Record that a rename was sent to the engine
    pub(crate) fn begin_rename(&mut self) -> Result<(), String> {
        if self.state == CanonicalState::Removing {
            return Err("task is being removed".to_string());
        }
        self.pending_rename_count += 1;
        Ok(())
    }

    /// Undo [`begin_rename`](Self::begin_rename) when the engine rejected the command
    pub(crate) fn abort_rename(&mut self) {
        self.on_rename_settled();
    }

    /// Record that a storage move to `target` is about to be sent to the engine
    pub(crate) fn begin_move(&mut self, target: PathBuf) -> Result<(), String> {
        if self.state == CanonicalState::Removing {
            return Err("task is being removed".to_string());
        }
        if self.pending_move_in_progress {
            return Err("a storage move is already in progress".to_string());
        }
        self.pending_move_in_progress = true;
        self.move_target = Some(target);
        Ok(())
    }

    /// Hold a pause until metadata arrives
    ///
    /// If metadata already arrived the stop is re-issued right away.
    pub(crate) fn mark_stop_when_ready(&mut self) {
        if let BackendExtras::Swarm(swarm) = &mut self.extras {
            if swarm.has_metadata {
                self.effects.push(TaskEffect::ReissueStop);
            } else {
                swarm.stop_when_ready = true;
            }
        }
    }

    /// Drop a pause that was waiting for metadata
    pub(crate) fn clear_stop_when_ready(&mut self) {
        if let BackendExtras::Swarm(swarm) = &mut self.extras {
            swarm.stop_when_ready = false;
        }
    }

    pub(crate) fn set_share_limits(&mut self, ratio_limit: f64, seeding_time_limit: i64) {
        if let BackendExtras::Swarm(swarm) = &mut self.extras {
            swarm.ratio_limit = ratio_limit;
            swarm.seeding_time_limit = seeding_time_limit;
        }
    }

    pub(crate) fn set_concurrency(&mut self, connections: u32) {
        if let BackendExtras::Segmented(segmented) = &mut self.extras {
            segmented.concurrency = connections;
        }
    }

    /// Record sizes and rates
    ///
    /// `completed_size` never decreases except while checking, and is clamped to the
    /// total once known. Sizes of a completed task are frozen.
    pub fn record_progress(&mut self, total: u64, completed: u64, download: u64, upload: u64) {
        if self.state == CanonicalState::Removing {
            return;
        }
        self.speed.add_sample(download, upload);
        if self.state == CanonicalState::Completed {
            return;
        }
        if total > 0 {
            self.total_size = total;
        }
        let completed = if self.state == CanonicalState::Checking {
            completed
        } else {
            completed.max(self.completed_size)
        };
        self.completed_size = if self.total_size > 0 {
            completed.min(self.total_size)
        } else {
            completed
        };
    }

    /// Record a segmented progress report
    pub fn record_segmented_progress(&mut self, progress: &SegmentedProgress) {
        if let BackendExtras::Segmented(segmented) = &mut self.extras {
            segmented.engine_waiting = progress.waiting;
        }
        self.record_progress(
            progress.total_size,
            progress.completed_size,
            progress.download_rate,
            progress.upload_rate,
        );
    }

    /// Record a swarm status report; returns the level of the previous report
    ///
    /// Returns `None` for segmented tasks. The caller translates the delta between the
    /// returned level and `status` and applies the resulting events.
    pub fn observe_swarm_status(&mut self, status: &SwarmStatus) -> Option<SwarmLevel> {
        let BackendExtras::Swarm(swarm) = &mut self.extras else {
            return None;
        };
        let previous = swarm.level;
        swarm.level = SwarmLevel::of(status);
        swarm.native_state = status.state;
        swarm.auto_managed = status.auto_managed;
        swarm.user_paused = status.paused && !status.auto_managed;
        self.record_progress(
            status.total_size,
            status.completed_size,
            status.download_rate,
            status.upload_rate,
        );
        Some(previous)
    }
}

/// Whether `event` asks for the state the task is already in
fn already_in(state: CanonicalState, event: &CanonicalEvent) -> bool {
    matches!(
        (state, event),
        (CanonicalState::Downloading, CanonicalEvent::Started)
            | (CanonicalState::Paused, CanonicalEvent::Stopped)
            | (CanonicalState::Paused, CanonicalEvent::None)
            | (CanonicalState::Queued, CanonicalEvent::Queued)
            | (CanonicalState::Checking, CanonicalEvent::CheckingStarted)
            | (CanonicalState::Error, CanonicalEvent::Failed { .. })
    )
}
