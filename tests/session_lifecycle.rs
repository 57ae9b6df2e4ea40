//! End-to-end session tests over loopback engines
//!
//! Engines answer each command with notifications sent from their own OS thread, so
//! these tests cover the full path: command, engine, ingest, drain, state, event.

mod common;

use common::*;
use unidl::{
    BackendKind, BackendMask, CanonicalState, InMemoryLabels, ResumeMode, SessionEvent,
    StateClass, TaskFilter, TaskId, TaskSelection,
};

#[tokio::test]
async fn test_segmented_download_finishes() {
    let (session, _swarm, _segmented, _temp_dir) = create_session().await;
    let mut events = session.subscribe();

    let id = session
        .add_url("https://mirror.example/releases/image.iso -- split 4", false)
        .await
        .unwrap();

    let finished = wait_for_event(&mut events, EVENT_TIMEOUT, |event| {
        matches!(event, SessionEvent::TaskFinished { id: done, .. } if *done == id)
    })
    .await;
    assert!(finished.is_some());

    let task = session.find(id).await.unwrap();
    assert_eq!(task.state, CanonicalState::Completed);
    assert_eq!(task.name, "image.iso");
    assert_eq!(task.completed_size, FILE_SIZE);
    assert_eq!(task.progress(), 1.0);
    assert!(task.is_completed());
}

#[tokio::test]
async fn test_swarm_pause_and_resume() {
    let (session, _swarm, _segmented, _temp_dir) = create_session().await;
    let mut events = session.subscribe();

    let id = session.add_url(&magnet(HEX, "distro"), false).await.unwrap();
    wait_for_state(&mut events, id, CanonicalState::Downloading).await;
    assert!(session.find(id).await.unwrap().has_metadata);

    let outcome = session
        .pause(TaskSelection::one(id), BackendMask::ALL)
        .await
        .unwrap();
    assert!(outcome.all_succeeded());
    wait_for_state(&mut events, id, CanonicalState::Paused).await;
    assert!(session.find(id).await.unwrap().is_paused());

    session
        .resume(TaskSelection::one(id), BackendMask::ALL, ResumeMode::Auto)
        .await
        .unwrap();
    wait_for_state(&mut events, id, CanonicalState::Downloading).await;
}

#[tokio::test]
async fn test_remove_everything() {
    let (session, _swarm, _segmented, _temp_dir) = create_session().await;
    let mut events = session.subscribe();
    for name in ["a", "b", "c"] {
        session
            .add_url(&format!("http://files.example/{name}.tar"), true)
            .await
            .unwrap();
    }
    session.add_url(&magnet(HEX, "distro"), true).await.unwrap();

    let outcome = session
        .remove(TaskSelection::All, BackendMask::ALL, true)
        .await
        .unwrap();
    assert_eq!(outcome.succeeded.len(), 4);

    let removed = collect_events_until(&mut events, EVENT_TIMEOUT, {
        let seen = std::sync::atomic::AtomicUsize::new(0);
        move |event| {
            matches!(event, SessionEvent::TaskRemoved { .. })
                && seen.fetch_add(1, std::sync::atomic::Ordering::SeqCst) == 3
        }
    })
    .await
    .into_iter()
    .filter(|event| matches!(event, SessionEvent::TaskRemoved { .. }))
    .count();
    assert_eq!(removed, 4);

    session.flush().await.unwrap();
    assert!(session.snapshot().await.is_empty());
    assert_eq!(session.db.count_resume_records().await.unwrap(), 0);
}

#[tokio::test]
async fn test_storage_move_updates_save_path() {
    let (session, _swarm, _segmented, temp_dir) = create_session().await;
    let mut events = session.subscribe();
    let id = session.add_url(&magnet(HEX, "distro"), true).await.unwrap();
    let target = temp_dir.path().join("archive");

    session
        .move_storage(TaskSelection::All, BackendMask::ALL, &target)
        .await
        .unwrap();

    let moved = wait_for_event(&mut events, EVENT_TIMEOUT, |event| {
        matches!(event, SessionEvent::StorageMoved { .. })
    })
    .await;
    assert_eq!(
        moved,
        Some(SessionEvent::StorageMoved {
            id,
            path: target.clone()
        })
    );
    let task = session.find(id).await.unwrap();
    assert_eq!(task.save_path, target);
    assert!(!task.move_in_progress);
}

#[tokio::test]
async fn test_session_survives_restart() {
    let temp_dir = tempfile::tempdir().unwrap();
    let (session, _swarm, _segmented) = open_session(&temp_dir).await;
    let swarm_id = session.add_url(&magnet(HEX, "distro"), true).await.unwrap();
    let segmented_id = session
        .add_url("http://files.example/big.bin", true)
        .await
        .unwrap();
    session.shutdown().await.unwrap();

    let (session, _swarm, _segmented) = open_session(&temp_dir).await;

    assert_eq!(session.resolve(HEX).await, Some(swarm_id));
    let restored = session.find(swarm_id).await.unwrap();
    assert_eq!(restored.state, CanonicalState::Paused);
    assert_eq!(restored.name, "distro");
    // Native data was saved at shutdown
    assert!(restored.has_metadata);

    assert!(session.find(segmented_id).await.is_some());
    assert_eq!(
        session.queue_order(BackendKind::Segmented).await,
        vec![segmented_id]
    );
    let next = session.add_url("http://files.example/next.bin", true).await.unwrap();
    assert!(next > segmented_id);
}

#[tokio::test]
async fn test_filtered_views() {
    let (session, _swarm, _segmented, _temp_dir) = create_session().await;
    let mut events = session.subscribe();
    let done = session
        .add_url("http://files.example/done.bin", false)
        .await
        .unwrap();
    let waiting = session
        .add_url("http://files.example/waiting.bin", true)
        .await
        .unwrap();
    wait_for_state(&mut events, done, CanonicalState::Completed).await;

    let completed = session
        .filter(&TaskFilter::by_name("completed"))
        .await
        .into_iter()
        .map(|task| task.id)
        .collect::<Vec<TaskId>>();
    assert_eq!(completed, vec![done]);

    let mut labels = InMemoryLabels::new();
    labels.add_tag(waiting, "later");
    let tagged = session
        .filter_with_labels(
            &TaskFilter::all()
                .with_state(StateClass::Paused)
                .with_tag("later"),
            &labels,
        )
        .await;
    assert_eq!(tagged.len(), 1);
    assert_eq!(tagged[0].id, waiting);
}
