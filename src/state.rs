//! Canonical task states and events shared by both backends
//!
//! Both engines' native notifications are reduced to [`CanonicalEvent`]s, and
//! [`next_state`] is the single table deciding where an event takes a task.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Backend-agnostic lifecycle state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CanonicalState {
    /// Waiting for an engine slot
    Queued,
    /// Transferring data
    Downloading,
    /// Verifying data already on disk
    Checking,
    /// Stopped by the user or the engine
    Paused,
    /// All bytes present; still controllable
    Completed,
    /// Stopped by a fatal engine error
    Error,
    /// Being removed; the handle is dropped once its triggers drain
    Removing,
}

impl CanonicalState {
    /// Every state, in declaration order
    pub const ALL: [CanonicalState; 7] = [
        CanonicalState::Queued,
        CanonicalState::Downloading,
        CanonicalState::Checking,
        CanonicalState::Paused,
        CanonicalState::Completed,
        CanonicalState::Error,
        CanonicalState::Removing,
    ];

    /// Stable lower-case name
    pub fn as_str(&self) -> &'static str {
        match self {
            CanonicalState::Queued => "queued",
            CanonicalState::Downloading => "downloading",
            CanonicalState::Checking => "checking",
            CanonicalState::Paused => "paused",
            CanonicalState::Completed => "completed",
            CanonicalState::Error => "error",
            CanonicalState::Removing => "removing",
        }
    }

    /// Whether a task in this state holds a queue position
    pub fn in_active_set(&self) -> bool {
        !matches!(self, CanonicalState::Completed | CanonicalState::Removing)
    }
}

impl std::fmt::Display for CanonicalState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Backend-agnostic notification; the only way a task's state changes
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CanonicalEvent {
    /// Engine reported no activity
    None,
    /// Transfer started or resumed
    Started,
    /// Transfer paused or stopped
    Stopped,
    /// All bytes present
    Completed,
    /// Engine failure; fatal only with a non-zero code and a message
    Failed {
        /// Engine error code
        code: i32,
        /// Engine error message
        message: String,
    },
    /// Engine confirmed removal
    RemovalRequested,
    /// Swarm metadata (piece layout) became available
    MetadataReceived,
    /// A file rename issued earlier succeeded
    FileRenamed {
        /// File index within the task
        index: usize,
    },
    /// A file rename issued earlier failed
    FileRenameFailed {
        /// File index within the task
        index: usize,
    },
    /// A storage move issued earlier settled
    StorageMoveFinished {
        /// Whether the data now lives at `new_path`
        ok: bool,
        /// Destination of the move
        new_path: Option<PathBuf>,
        /// Engine-supplied reason when `ok` is false
        error: Option<String>,
    },
    /// Swarm task is waiting for an engine slot
    Queued,
    /// Swarm task started verifying its data
    CheckingStarted,
}

impl CanonicalEvent {
    /// Build a failure event
    pub fn failed(code: i32, message: impl Into<String>) -> Self {
        CanonicalEvent::Failed {
            code,
            message: message.into(),
        }
    }

    /// Whether this is a failure that puts the task into `Error`
    pub fn is_fatal_failure(&self) -> bool {
        matches!(self, CanonicalEvent::Failed { code, message } if *code > 0 && !message.is_empty())
    }

    /// Whether the event only updates bookkeeping and never a state
    pub fn is_bookkeeping(&self) -> bool {
        matches!(
            self,
            CanonicalEvent::MetadataReceived
                | CanonicalEvent::FileRenamed { .. }
                | CanonicalEvent::FileRenameFailed { .. }
                | CanonicalEvent::StorageMoveFinished { .. }
        )
    }

    /// Short name for log fields
    pub fn name(&self) -> &'static str {
        match self {
            CanonicalEvent::None => "none",
            CanonicalEvent::Started => "started",
            CanonicalEvent::Stopped => "stopped",
            CanonicalEvent::Completed => "completed",
            CanonicalEvent::Failed { .. } => "failed",
            CanonicalEvent::RemovalRequested => "removal_requested",
            CanonicalEvent::MetadataReceived => "metadata_received",
            CanonicalEvent::FileRenamed { .. } => "file_renamed",
            CanonicalEvent::FileRenameFailed { .. } => "file_rename_failed",
            CanonicalEvent::StorageMoveFinished { .. } => "storage_move_finished",
            CanonicalEvent::Queued => "queued",
            CanonicalEvent::CheckingStarted => "checking_started",
        }
    }
}

/// Target state of `event` applied in `from`
///
/// `None` means the state does not change: the pair is either a no-op, a bookkeeping
/// event, a non-fatal failure, or not a legal transition. Size preconditions on
/// `Completed` and the move-in-progress rule on `RemovalRequested` are enforced by the
/// task handle, not here.
pub fn next_state(from: CanonicalState, event: &CanonicalEvent) -> Option<CanonicalState> {
    use CanonicalState as S;

    if from == S::Removing {
        return None;
    }
    let to = match event {
        CanonicalEvent::None => match from {
            S::Downloading | S::Queued | S::Error => S::Paused,
            _ => return None,
        },
        CanonicalEvent::Started => match from {
            S::Paused | S::Queued | S::Checking | S::Error => S::Downloading,
            _ => return None,
        },
        CanonicalEvent::Stopped => match from {
            S::Downloading | S::Queued | S::Checking | S::Error => S::Paused,
            _ => return None,
        },
        CanonicalEvent::Completed => match from {
            S::Completed => return None,
            _ => S::Completed,
        },
        CanonicalEvent::Failed { .. } if event.is_fatal_failure() => match from {
            S::Error => return None,
            _ => S::Error,
        },
        CanonicalEvent::Failed { .. } => return None,
        CanonicalEvent::RemovalRequested => S::Removing,
        CanonicalEvent::Queued => match from {
            S::Paused | S::Downloading | S::Checking | S::Error => S::Queued,
            _ => return None,
        },
        CanonicalEvent::CheckingStarted => match from {
            S::Checking => return None,
            _ => S::Checking,
        },
        CanonicalEvent::MetadataReceived
        | CanonicalEvent::FileRenamed { .. }
        | CanonicalEvent::FileRenameFailed { .. }
        | CanonicalEvent::StorageMoveFinished { .. } => return None,
    };
    Some(to)
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use CanonicalState as S;

    #[test]
    fn started_resumes_from_paused_and_error() {
        assert_eq!(next_state(S::Paused, &CanonicalEvent::Started), Some(S::Downloading));
        assert_eq!(next_state(S::Error, &CanonicalEvent::Started), Some(S::Downloading));
        assert_eq!(next_state(S::Downloading, &CanonicalEvent::Started), None);
        assert_eq!(next_state(S::Completed, &CanonicalEvent::Started), None);
    }

    #[test]
    fn stopped_pauses_running_tasks_only() {
        assert_eq!(next_state(S::Downloading, &CanonicalEvent::Stopped), Some(S::Paused));
        assert_eq!(next_state(S::Completed, &CanonicalEvent::Stopped), None);
        assert_eq!(next_state(S::Paused, &CanonicalEvent::Stopped), None);
    }

    #[test]
    fn failure_needs_code_and_message() {
        assert_eq!(
            next_state(S::Downloading, &CanonicalEvent::failed(5, "disk full")),
            Some(S::Error)
        );
        assert_eq!(next_state(S::Downloading, &CanonicalEvent::failed(5, "")), None);
        assert_eq!(next_state(S::Downloading, &CanonicalEvent::failed(0, "oops")), None);
        assert_eq!(next_state(S::Error, &CanonicalEvent::failed(5, "again")), None);
    }

    #[test]
    fn removing_is_terminal() {
        for event in [
            CanonicalEvent::Started,
            CanonicalEvent::Completed,
            CanonicalEvent::failed(1, "x"),
            CanonicalEvent::RemovalRequested,
            CanonicalEvent::CheckingStarted,
        ] {
            assert_eq!(next_state(S::Removing, &event), None, "{}", event.name());
        }
    }

    #[test]
    fn every_state_accepts_removal_and_bookkeeping_never_moves() {
        for state in CanonicalState::ALL {
            if state != S::Removing {
                assert_eq!(
                    next_state(state, &CanonicalEvent::RemovalRequested),
                    Some(S::Removing)
                );
            }
            assert_eq!(next_state(state, &CanonicalEvent::FileRenamed { index: 0 }), None);
            assert_eq!(next_state(state, &CanonicalEvent::MetadataReceived), None);
        }
    }

    #[test]
    fn completed_can_be_rechecked() {
        assert_eq!(
            next_state(S::Completed, &CanonicalEvent::CheckingStarted),
            Some(S::Checking)
        );
        assert_eq!(next_state(S::Checking, &CanonicalEvent::Completed), Some(S::Completed));
    }

    #[test]
    fn none_event_pauses_but_leaves_completed() {
        assert_eq!(next_state(S::Downloading, &CanonicalEvent::None), Some(S::Paused));
        assert_eq!(next_state(S::Completed, &CanonicalEvent::None), None);
    }

    #[test]
    fn event_serialization_is_tagged() {
        let json = serde_json::to_value(CanonicalEvent::FileRenamed { index: 2 }).unwrap();
        assert_eq!(json["event"], "file_renamed");
        assert_eq!(json["index"], 2);
    }
}
