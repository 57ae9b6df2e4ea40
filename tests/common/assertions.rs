//! Event-waiting helpers for integration tests

use std::time::Duration;
use tokio::sync::broadcast;
use unidl::{CanonicalState, SessionEvent, TaskId};

/// Default time to wait for an event
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

/// Wait for the first event matching `predicate`
pub async fn wait_for_event<F>(
    events: &mut broadcast::Receiver<SessionEvent>,
    timeout: Duration,
    predicate: F,
) -> Option<SessionEvent>
where
    F: Fn(&SessionEvent) -> bool,
{
    tokio::time::timeout(timeout, async {
        while let Ok(event) = events.recv().await {
            if predicate(&event) {
                return Some(event);
            }
        }
        None
    })
    .await
    .ok()
    .flatten()
}

/// Collect events until `stop_predicate` matches or `timeout` passes
pub async fn collect_events_until<F>(
    events: &mut broadcast::Receiver<SessionEvent>,
    timeout: Duration,
    stop_predicate: F,
) -> Vec<SessionEvent>
where
    F: Fn(&SessionEvent) -> bool,
{
    let mut collected = Vec::new();

    let _ = tokio::time::timeout(timeout, async {
        while let Ok(event) = events.recv().await {
            let should_stop = stop_predicate(&event);
            collected.push(event);
            if should_stop {
                break;
            }
        }
    })
    .await;

    collected
}

/// Wait until task `id` enters `state`, panicking on timeout
pub async fn wait_for_state(
    events: &mut broadcast::Receiver<SessionEvent>,
    id: TaskId,
    state: CanonicalState,
) {
    let found = wait_for_event(events, EVENT_TIMEOUT, |event| {
        matches!(event, SessionEvent::StateChanged { id: changed, to, .. } if *changed == id && *to == state)
    })
    .await;
    assert!(found.is_some(), "timeout waiting for {id} to become {state}");
}
