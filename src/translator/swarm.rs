//! Swarm engine mapping
//!
//! Swarm status is level-triggered: each report describes the whole task. The
//! translator reduces a report to a [`SwarmLevel`] and emits the events needed to get
//! from the previous level to the new one. Alerts are edge-triggered and map one to one.

use crate::engine::{SwarmAlert, SwarmNativeState, SwarmStatus};
use crate::state::{CanonicalEvent, CanonicalState};

/// Canonical reading of one status report
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SwarmLevel {
    /// State the report implies
    pub class: CanonicalState,
    /// Whether the report had metadata
    pub has_metadata: bool,
}

impl SwarmLevel {
    /// Level implied by `status`
    pub fn of(status: &SwarmStatus) -> Self {
        Self {
            class: classify(status),
            has_metadata: status.has_metadata,
        }
    }
}

/// Canonical state implied by a status report
///
/// Precedence: fatal error, user pause, checking, engine queue, seed, downloading.
pub fn classify(status: &SwarmStatus) -> CanonicalState {
    if status.error.code > 0 && !status.error.message.is_empty() {
        CanonicalState::Error
    } else if status.paused && !status.auto_managed {
        CanonicalState::Paused
    } else if status.state.is_checking() {
        CanonicalState::Checking
    } else if status.paused {
        CanonicalState::Queued
    } else if status.state.is_seed() {
        CanonicalState::Completed
    } else {
        CanonicalState::Downloading
    }
}

/// Events leading from `previous` to the level of `current`
///
/// `MetadataReceived` comes first so that a deferred stop is re-issued before the new
/// state is applied.
pub fn translate_status(previous: SwarmLevel, current: &SwarmStatus) -> Vec<CanonicalEvent> {
    let next = SwarmLevel::of(current);
    let mut events = Vec::with_capacity(2);
    if next.has_metadata && !previous.has_metadata {
        events.push(CanonicalEvent::MetadataReceived);
    }
    if next.class != previous.class {
        events.push(event_for(next.class, current));
    }
    events
}

fn event_for(class: CanonicalState, status: &SwarmStatus) -> CanonicalEvent {
    match class {
        CanonicalState::Error => {
            CanonicalEvent::failed(status.error.code, status.error.message.clone())
        }
        CanonicalState::Paused => CanonicalEvent::Stopped,
        CanonicalState::Queued => CanonicalEvent::Queued,
        CanonicalState::Checking => CanonicalEvent::CheckingStarted,
        CanonicalState::Completed => CanonicalEvent::Completed,
        CanonicalState::Downloading => CanonicalEvent::Started,
        CanonicalState::Removing => CanonicalEvent::RemovalRequested,
    }
}

/// Translate an alert
pub fn translate_alert(alert: &SwarmAlert) -> CanonicalEvent {
    match alert {
        SwarmAlert::MetadataReceived => CanonicalEvent::MetadataReceived,
        SwarmAlert::FileRenamed { index, .. } => CanonicalEvent::FileRenamed { index: *index },
        SwarmAlert::FileRenameFailed { index, .. } => {
            CanonicalEvent::FileRenameFailed { index: *index }
        }
        SwarmAlert::StorageMoved { path } => CanonicalEvent::StorageMoveFinished {
            ok: true,
            new_path: Some(path.clone()),
            error: None,
        },
        SwarmAlert::StorageMoveFailed { error } => CanonicalEvent::StorageMoveFinished {
            ok: false,
            new_path: None,
            error: Some(error.clone()),
        },
        SwarmAlert::Finished => CanonicalEvent::Completed,
        SwarmAlert::Removed => CanonicalEvent::RemovalRequested,
        SwarmAlert::Error { code, message } => CanonicalEvent::failed(*code, message.clone()),
    }
}

/// How a pause request should reach the engine
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PauseDirective {
    /// Issue the native stop now
    Issue,
    /// Mark stop-when-ready and issue the stop once metadata arrives
    DeferUntilMetadata,
}

/// Decide whether a pause can be issued now
///
/// A task still fetching metadata that is not managed by the engine queue cannot honour
/// a stop reliably, so the stop waits for metadata.
pub fn pause_directive(state: SwarmNativeState, auto_managed: bool) -> PauseDirective {
    if state == SwarmNativeState::DownloadingMetadata && !auto_managed {
        PauseDirective::DeferUntilMetadata
    } else {
        PauseDirective::Issue
    }
}
