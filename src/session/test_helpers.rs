//! Shared test helpers: recording engines and session construction.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::{TempDir, tempdir};

use crate::config::Config;
use crate::engine::{
    EngineResult, RateLimits, SegmentedEngine, SegmentedRequest, SwarmAddParams, SwarmEngine,
};
use crate::error::BackendError;
use crate::session::Session;
use crate::types::{InfoHash, ResumeMode, SegmentedId};

pub(crate) const HEX_A: &str = "0123456789abcdef0123456789abcdef01234567";
pub(crate) const HEX_B: &str = "89abcdef0123456789abcdef0123456789abcdef";

pub(crate) fn magnet(hex: &str) -> String {
    format!("magnet:?xt=urn:btih:{hex}&dn=task-{}", &hex[..4])
}

pub(crate) fn hash(hex: &str) -> InfoHash {
    hex.parse().unwrap()
}

/// Command received by [`MockSwarm`]
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum SwarmCall {
    Add(SwarmAddParams),
    Pause(InfoHash),
    Resume(InfoHash, ResumeMode),
    MoveStorage(InfoHash, PathBuf),
    PrioritizeFiles(InfoHash, Vec<u8>),
    RenameFile(InfoHash, usize, String),
    ForceRecheck(InfoHash),
    ForceReannounce(InfoHash),
    SetRateLimits(InfoHash, RateLimits),
    Remove(InfoHash, bool),
}

/// Swarm engine that records commands and rejects the ones named in `reject`
#[derive(Default)]
pub(crate) struct MockSwarm {
    pub(crate) calls: Mutex<Vec<SwarmCall>>,
    pub(crate) reject: Mutex<HashSet<&'static str>>,
    pub(crate) resume_data: Mutex<HashMap<InfoHash, Vec<u8>>>,
    next_hash: Mutex<u8>,
}

impl MockSwarm {
    pub(crate) fn calls(&self) -> Vec<SwarmCall> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn reject(&self, command: &'static str) {
        self.reject.lock().unwrap().insert(command);
    }

    fn record(&self, command: &'static str, call: SwarmCall) -> EngineResult<()> {
        self.calls.lock().unwrap().push(call);
        if self.reject.lock().unwrap().contains(command) {
            return Err(BackendError::rejected(command, "rejected by mock"));
        }
        Ok(())
    }
}

#[async_trait]
impl SwarmEngine for MockSwarm {
    async fn add(&self, params: SwarmAddParams) -> EngineResult<InfoHash> {
        let hash = params.info_hash.unwrap_or_else(|| {
            let mut next = self.next_hash.lock().unwrap();
            *next += 1;
            InfoHash::new([*next; 20])
        });
        self.record("add", SwarmCall::Add(params))?;
        Ok(hash)
    }

    async fn pause(&self, hash: InfoHash) -> EngineResult<()> {
        self.record("pause", SwarmCall::Pause(hash))
    }

    async fn resume(&self, hash: InfoHash, mode: ResumeMode) -> EngineResult<()> {
        self.record("resume", SwarmCall::Resume(hash, mode))
    }

    async fn move_storage(&self, hash: InfoHash, path: &Path) -> EngineResult<()> {
        self.record("move_storage", SwarmCall::MoveStorage(hash, path.to_path_buf()))
    }

    async fn prioritize_files(&self, hash: InfoHash, priorities: &[u8]) -> EngineResult<()> {
        self.record(
            "prioritize_files",
            SwarmCall::PrioritizeFiles(hash, priorities.to_vec()),
        )
    }

    async fn rename_file(
        &self,
        hash: InfoHash,
        index: usize,
        new_name: &str,
    ) -> EngineResult<()> {
        self.record(
            "rename_file",
            SwarmCall::RenameFile(hash, index, new_name.to_string()),
        )
    }

    async fn force_recheck(&self, hash: InfoHash) -> EngineResult<()> {
        self.record("force_recheck", SwarmCall::ForceRecheck(hash))
    }

    async fn force_reannounce(&self, hash: InfoHash) -> EngineResult<()> {
        self.record("force_reannounce", SwarmCall::ForceReannounce(hash))
    }

    async fn set_rate_limits(&self, hash: InfoHash, limits: RateLimits) -> EngineResult<()> {
        self.record("set_rate_limits", SwarmCall::SetRateLimits(hash, limits))
    }

    async fn request_resume_data(&self, hash: InfoHash) -> EngineResult<Option<Vec<u8>>> {
        Ok(self.resume_data.lock().unwrap().get(&hash).cloned())
    }

    async fn remove(&self, hash: InfoHash, delete_files: bool) -> EngineResult<()> {
        self.record("remove", SwarmCall::Remove(hash, delete_files))
    }
}

/// Command received by [`MockSegmented`]
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum SegmentedCall {
    Submit(SegmentedId, SegmentedRequest),
    Start(SegmentedId),
    Stop(SegmentedId),
    Remove(SegmentedId, bool),
    RemoveBatch(Vec<SegmentedId>, bool),
    SetConcurrency(SegmentedId, u32),
}

/// Segmented engine that records commands
pub(crate) struct MockSegmented {
    pub(crate) calls: Mutex<Vec<SegmentedCall>>,
    pub(crate) reject: Mutex<HashSet<&'static str>>,
    pub(crate) batch_size: usize,
}

impl Default for MockSegmented {
    fn default() -> Self {
        Self::with_batch_size(64)
    }
}

impl MockSegmented {
    pub(crate) fn with_batch_size(batch_size: usize) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            reject: Mutex::new(HashSet::new()),
            batch_size,
        }
    }

    pub(crate) fn calls(&self) -> Vec<SegmentedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn reject(&self, command: &'static str) {
        self.reject.lock().unwrap().insert(command);
    }

    fn record(&self, command: &'static str, call: SegmentedCall) -> EngineResult<()> {
        self.calls.lock().unwrap().push(call);
        if self.reject.lock().unwrap().contains(command) {
            return Err(BackendError::rejected(command, "rejected by mock"));
        }
        Ok(())
    }
}

#[async_trait]
impl SegmentedEngine for MockSegmented {
    async fn submit(&self, id: SegmentedId, request: SegmentedRequest) -> EngineResult<()> {
        self.record("submit", SegmentedCall::Submit(id, request))
    }

    async fn start(&self, id: SegmentedId) -> EngineResult<()> {
        self.record("start", SegmentedCall::Start(id))
    }

    async fn stop(&self, id: SegmentedId) -> EngineResult<()> {
        self.record("stop", SegmentedCall::Stop(id))
    }

    async fn remove(&self, id: SegmentedId, delete_files: bool) -> EngineResult<()> {
        self.record("remove", SegmentedCall::Remove(id, delete_files))
    }

    async fn remove_batch(&self, ids: &[SegmentedId], delete_files: bool) -> EngineResult<()> {
        self.record(
            "remove_batch",
            SegmentedCall::RemoveBatch(ids.to_vec(), delete_files),
        )
    }

    async fn set_concurrency(&self, id: SegmentedId, connections: u32) -> EngineResult<()> {
        self.record("set_concurrency", SegmentedCall::SetConcurrency(id, connections))
    }

    fn max_batch_size(&self) -> usize {
        self.batch_size
    }
}

/// Everything a session test needs; the tempdir must be kept alive
pub(crate) struct TestSession {
    pub(crate) session: Session,
    pub(crate) swarm: Arc<MockSwarm>,
    pub(crate) segmented: Arc<MockSegmented>,
    pub(crate) temp_dir: TempDir,
}

pub(crate) fn test_config(dir: &Path) -> Config {
    let mut config = Config::default();
    config.persistence.database_path = dir.join("test.db");
    config.persistence.resume_save_interval = None;
    config.session.default_save_path = dir.join("downloads");
    config
}

/// Session over fresh mock engines with a database in a new tempdir
pub(crate) async fn create_test_session() -> TestSession {
    create_test_session_with(MockSegmented::default(), |_| {}).await
}

/// Like [`create_test_session`] with a custom segmented engine and config tweaks
pub(crate) async fn create_test_session_with(
    segmented: MockSegmented,
    configure: impl FnOnce(&mut Config),
) -> TestSession {
    let temp_dir = tempdir().unwrap();
    let mut config = test_config(temp_dir.path());
    configure(&mut config);

    let swarm = Arc::new(MockSwarm::default());
    let segmented = Arc::new(segmented);
    let session = Session::new(config, swarm.clone(), segmented.clone())
        .await
        .unwrap();

    TestSession {
        session,
        swarm,
        segmented,
        temp_dir,
    }
}

/// Reopen a session on the database left in `temp_dir`
pub(crate) async fn reopen(temp_dir: &TempDir) -> (Session, Arc<MockSwarm>, Arc<MockSegmented>) {
    let swarm = Arc::new(MockSwarm::default());
    let segmented = Arc::new(MockSegmented::default());
    let session = Session::new(test_config(temp_dir.path()), swarm.clone(), segmented.clone())
        .await
        .unwrap();
    (session, swarm, segmented)
}
