use crate::db::*;
use crate::descriptor::parse;
use crate::state::{CanonicalEvent, CanonicalState};
use crate::task::{SwarmOptions, TaskHandle};
use crate::types::{InfoHash, SegmentedId, TaskId};
use std::path::PathBuf;
use tempfile::NamedTempFile;

const HEX: &str = "0123456789abcdef0123456789abcdef01234567";

fn swarm_task() -> TaskHandle {
    let hash: InfoHash = HEX.parse().unwrap();
    TaskHandle::swarm(
        hash,
        parse(&format!("magnet:?xt=urn:btih:{HEX}&dn=ubuntu.iso")),
        PathBuf::from("/downloads"),
        SwarmOptions::default(),
        false,
    )
}

fn segmented_task(id: i64) -> TaskHandle {
    TaskHandle::segmented(
        SegmentedId(id),
        parse(&format!("https://mirror.example/f{id}.bin --header \"X-Token: abc\"")),
        PathBuf::from("/downloads"),
        8,
    )
}

#[tokio::test]
async fn test_save_and_get_with_native_blob() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();

    let task = swarm_task();
    let record = task.resume_record(Some(vec![0xde, 0xad, 0xbe, 0xef]));
    db.save_resume_record(&record).await.unwrap();

    let loaded = db.get_resume_record(&task.id()).await.unwrap().unwrap();
    assert_eq!(loaded, record);
    assert_eq!(loaded.native.as_deref(), Some(&[0xde, 0xad, 0xbe, 0xef][..]));
    assert!(!loaded.is_dummy());
}

#[tokio::test]
async fn test_dummy_record_keeps_magnet() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();

    let task = swarm_task();
    db.save_resume_record(&task.resume_record(None)).await.unwrap();

    let loaded = db.get_resume_record(&task.id()).await.unwrap().unwrap();
    assert!(loaded.is_dummy());
    assert!(loaded.magnet_uri.unwrap().starts_with("magnet:?xt=urn:btih:"));
}

#[tokio::test]
async fn test_save_overwrites_previous_record() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();

    let mut task = segmented_task(1);
    db.save_resume_record(&task.resume_record(None)).await.unwrap();

    task.record_progress(100, 40, 10, 0);
    task.apply(CanonicalEvent::Started);
    db.save_resume_record(&task.resume_record(None)).await.unwrap();

    assert_eq!(db.count_resume_records().await.unwrap(), 1);
    let loaded = db.get_resume_record(&task.id()).await.unwrap().unwrap();
    assert_eq!(loaded.state, CanonicalState::Downloading);
    assert_eq!(loaded.completed_size, 40);
    assert!(loaded.native.is_none());
}

#[tokio::test]
async fn test_load_all_and_delete() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();

    let swarm = swarm_task();
    let seg = segmented_task(7);
    db.save_resume_record(&swarm.resume_record(None)).await.unwrap();
    db.save_resume_record(&seg.resume_record(None)).await.unwrap();

    let all = db.load_resume_records().await.unwrap();
    let ids: Vec<TaskId> = all.iter().map(|r| r.id).collect();
    assert_eq!(all.len(), 2);
    assert!(ids.contains(&swarm.id()));
    assert!(ids.contains(&seg.id()));

    assert!(db.delete_resume_record(&seg.id()).await.unwrap());
    assert!(!db.delete_resume_record(&seg.id()).await.unwrap());
    assert!(db.get_resume_record(&seg.id()).await.unwrap().is_none());
    assert_eq!(db.count_resume_records().await.unwrap(), 1);
}

#[tokio::test]
async fn test_unreadable_rows_are_skipped() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();

    db.save_resume_record(&segmented_task(1).resume_record(None))
        .await
        .unwrap();
    sqlx::query(
        "INSERT INTO resume_records (task_key, backend, record, native, updated_at) VALUES ('segmented:9', 'segmented', '{broken', NULL, 0)",
    )
    .execute(db.pool())
    .await
    .unwrap();

    let all = db.load_resume_records().await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].id, TaskId::Segmented(SegmentedId(1)));
}

#[tokio::test]
async fn test_runtime_state() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();

    assert!(!db.was_unclean_shutdown().await.unwrap());
    db.set_clean_start().await.unwrap();
    assert!(db.was_unclean_shutdown().await.unwrap());
    db.set_clean_shutdown().await.unwrap();
    assert!(!db.was_unclean_shutdown().await.unwrap());

    assert_eq!(db.next_segmented_id().await.unwrap(), None);
    db.set_next_segmented_id(42).await.unwrap();
    assert_eq!(db.next_segmented_id().await.unwrap(), Some(42));
}
