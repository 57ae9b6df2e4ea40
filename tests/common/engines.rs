//! Loopback engines: every command is answered with the notifications a real engine
//! would send, delivered from a separate OS thread.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, OnceLock};

use async_trait::async_trait;
use unidl::engine::EngineResult;
use unidl::{
    InfoHash, RateLimits, ResumeMode, SegmentedEngine, SegmentedId, SegmentedNativeEvent,
    SegmentedProgress, SegmentedRequest, Session, SwarmAddParams, SwarmAlert, SwarmEngine,
    SwarmNativeState, SwarmStatus,
};

/// Size every loopback download reports
pub const FILE_SIZE: u64 = 4096;

fn on_engine_thread(f: impl FnOnce() + Send + 'static) {
    std::thread::spawn(f).join().unwrap();
}

/// Swarm engine that reports the state each command leads to
#[derive(Default)]
pub struct LoopbackSwarm {
    session: OnceLock<Session>,
    names: Mutex<HashMap<InfoHash, String>>,
}

impl LoopbackSwarm {
    /// Deliver notifications to `session`
    pub fn attach(&self, session: Session) {
        self.session.set(session).ok();
    }

    fn report(&self, hash: InfoHash, status: SwarmStatus) {
        if let Some(session) = self.session.get().cloned() {
            on_engine_thread(move || {
                session.ingest_swarm_status(hash, status).ok();
            });
        }
    }

    fn alert(&self, hash: InfoHash, alert: SwarmAlert) {
        if let Some(session) = self.session.get().cloned() {
            on_engine_thread(move || {
                session.ingest_swarm_alert(hash, &alert).ok();
            });
        }
    }

    fn status(paused: bool) -> SwarmStatus {
        SwarmStatus {
            state: SwarmNativeState::Downloading,
            paused,
            auto_managed: !paused,
            has_metadata: true,
            total_size: FILE_SIZE,
            completed_size: FILE_SIZE / 2,
            download_rate: 1024,
            ..Default::default()
        }
    }
}

#[async_trait]
impl SwarmEngine for LoopbackSwarm {
    async fn add(&self, params: SwarmAddParams) -> EngineResult<InfoHash> {
        let hash = params.info_hash.unwrap_or(InfoHash::new([7; 20]));
        self.names
            .lock()
            .unwrap()
            .insert(hash, params.name.unwrap_or_default());
        if !params.paused {
            self.report(hash, Self::status(false));
        }
        Ok(hash)
    }

    async fn pause(&self, hash: InfoHash) -> EngineResult<()> {
        self.report(hash, Self::status(true));
        Ok(())
    }

    async fn resume(&self, hash: InfoHash, _mode: ResumeMode) -> EngineResult<()> {
        self.report(hash, Self::status(false));
        Ok(())
    }

    async fn move_storage(&self, hash: InfoHash, path: &Path) -> EngineResult<()> {
        self.alert(
            hash,
            SwarmAlert::StorageMoved {
                path: path.to_path_buf(),
            },
        );
        Ok(())
    }

    async fn prioritize_files(&self, _hash: InfoHash, _priorities: &[u8]) -> EngineResult<()> {
        Ok(())
    }

    async fn rename_file(&self, hash: InfoHash, index: usize, new_name: &str) -> EngineResult<()> {
        self.alert(
            hash,
            SwarmAlert::FileRenamed {
                index,
                new_name: new_name.to_string(),
            },
        );
        Ok(())
    }

    async fn force_recheck(&self, _hash: InfoHash) -> EngineResult<()> {
        Ok(())
    }

    async fn force_reannounce(&self, _hash: InfoHash) -> EngineResult<()> {
        Ok(())
    }

    async fn set_rate_limits(&self, _hash: InfoHash, _limits: RateLimits) -> EngineResult<()> {
        Ok(())
    }

    async fn request_resume_data(&self, hash: InfoHash) -> EngineResult<Option<Vec<u8>>> {
        Ok(Some(hash.to_hex().into_bytes()))
    }

    async fn remove(&self, hash: InfoHash, _delete_files: bool) -> EngineResult<()> {
        self.names.lock().unwrap().remove(&hash);
        self.alert(hash, SwarmAlert::Removed);
        Ok(())
    }
}

/// Segmented engine that finishes every started download at once
#[derive(Default)]
pub struct LoopbackSegmented {
    session: OnceLock<Session>,
}

impl LoopbackSegmented {
    /// Deliver notifications to `session`
    pub fn attach(&self, session: Session) {
        self.session.set(session).ok();
    }

    fn emit(&self, id: SegmentedId, events: Vec<SegmentedNativeEvent>) {
        if let Some(session) = self.session.get().cloned() {
            on_engine_thread(move || {
                for event in events {
                    if event == SegmentedNativeEvent::Complete {
                        let progress = SegmentedProgress {
                            total_size: FILE_SIZE,
                            completed_size: FILE_SIZE,
                            ..Default::default()
                        };
                        session.ingest_segmented_progress(id, progress).ok();
                    }
                    session.ingest_segmented(id, event, 0, "").ok();
                }
            });
        }
    }
}

#[async_trait]
impl SegmentedEngine for LoopbackSegmented {
    async fn submit(&self, id: SegmentedId, request: SegmentedRequest) -> EngineResult<()> {
        if !request.paused {
            self.emit(
                id,
                vec![SegmentedNativeEvent::Start, SegmentedNativeEvent::Complete],
            );
        }
        Ok(())
    }

    async fn start(&self, id: SegmentedId) -> EngineResult<()> {
        self.emit(
            id,
            vec![SegmentedNativeEvent::Start, SegmentedNativeEvent::Complete],
        );
        Ok(())
    }

    async fn stop(&self, id: SegmentedId) -> EngineResult<()> {
        self.emit(id, vec![SegmentedNativeEvent::Stop]);
        Ok(())
    }

    async fn remove(&self, id: SegmentedId, _delete_files: bool) -> EngineResult<()> {
        self.emit(id, vec![SegmentedNativeEvent::Remove]);
        Ok(())
    }

    async fn remove_batch(&self, ids: &[SegmentedId], _delete_files: bool) -> EngineResult<()> {
        for id in ids {
            self.emit(*id, vec![SegmentedNativeEvent::Remove]);
        }
        Ok(())
    }

    async fn set_concurrency(&self, _id: SegmentedId, _connections: u32) -> EngineResult<()> {
        Ok(())
    }
}
