use super::test_helpers::*;
use super::*;

use crate::engine::{SegmentedNativeEvent, SwarmAlert, SwarmNativeState};
use crate::state::CanonicalState;
use crate::types::{BackendKind, BackendMask, QueueOp, ResumeMode, TaskSelection};


/// Every event received so far, without waiting
fn drain_events(rx: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn swarm_status(state: SwarmNativeState, has_metadata: bool) -> SwarmStatus {
    SwarmStatus {
        state,
        has_metadata,
        auto_managed: true,
        total_size: 1000,
        ..Default::default()
    }
}

async fn add_segmented(session: &Session, url: &str) -> TaskId {
    session.add_url(url, false).await.unwrap()
}

async fn state_of(session: &Session, id: TaskId) -> CanonicalState {
    session.find(id).await.unwrap().state
}
