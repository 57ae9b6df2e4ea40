//! Engine notification entry points.
//!
//! These only enqueue; they never block and never take the state lock, so engines may
//! call them from their own threads, inside or outside a tokio runtime.

use crate::engine::{SegmentedNativeEvent, SegmentedProgress, SwarmAlert, SwarmStatus};
use crate::error::Result;
use crate::state::CanonicalEvent;
use crate::translator;
use crate::types::{InfoHash, SegmentedId, TaskId};

use super::{Envelope, Session};

impl Session {
    /// Queue a canonical event for `id`
    pub fn ingest_event(&self, id: TaskId, event: CanonicalEvent) -> Result<()> {
        self.send(Envelope::Event { id, event })
    }

    /// Queue a segmented engine notification
    pub fn ingest_segmented(
        &self,
        id: SegmentedId,
        event: SegmentedNativeEvent,
        code: i32,
        message: &str,
    ) -> Result<()> {
        let event = translator::segmented::translate(event, code, message);
        self.ingest_event(TaskId::Segmented(id), event)
    }

    /// Queue a segmented progress report
    pub fn ingest_segmented_progress(&self, id: SegmentedId, progress: SegmentedProgress) -> Result<()> {
        self.send(Envelope::SegmentedProgress { id, progress })
    }

    /// Queue a swarm status report
    ///
    /// The drain task compares it with the previous report of the same task and applies
    /// the events needed to reach the new canonical state.
    pub fn ingest_swarm_status(&self, hash: InfoHash, status: SwarmStatus) -> Result<()> {
        self.send(Envelope::SwarmStatus { hash, status })
    }

    /// Queue a swarm alert
    pub fn ingest_swarm_alert(&self, hash: InfoHash, alert: &SwarmAlert) -> Result<()> {
        let event = translator::swarm::translate_alert(alert);
        self.ingest_event(TaskId::Swarm(hash), event)
    }
}
