//! Common test utilities for unidl integration tests

#[allow(dead_code)]
pub mod assertions;
#[allow(dead_code)]
pub mod engines;

#[allow(unused_imports)]
pub use assertions::*;
pub use engines::*;

use std::sync::Arc;
use tempfile::TempDir;
use unidl::{Config, Session};

/// Hex info-hash used by most tests
#[allow(dead_code)]
pub const HEX: &str = "c12fe1c06bba254a9dc9f519b335aa7c1367a88a";

/// Magnet link for `hex` named `name`
#[allow(dead_code)]
pub fn magnet(hex: &str, name: &str) -> String {
    format!("magnet:?xt=urn:btih:{hex}&dn={name}")
}

/// Config with the database and save path inside `dir`
pub fn test_config(dir: &std::path::Path) -> Config {
    let mut config = Config::default();
    config.persistence.database_path = dir.join("session.db");
    config.persistence.resume_save_interval = None;
    config.session.default_save_path = dir.join("downloads");
    config
}

/// Session over loopback engines in `dir`
pub async fn open_session(
    dir: &TempDir,
) -> (Session, Arc<LoopbackSwarm>, Arc<LoopbackSegmented>) {
    let swarm = Arc::new(LoopbackSwarm::default());
    let segmented = Arc::new(LoopbackSegmented::default());
    let session = Session::new(test_config(dir.path()), swarm.clone(), segmented.clone())
        .await
        .unwrap();
    swarm.attach(session.clone());
    segmented.attach(session.clone());
    (session, swarm, segmented)
}

/// Session over loopback engines in a fresh tempdir (which must be kept alive)
#[allow(dead_code)]
pub async fn create_session() -> (Session, Arc<LoopbackSwarm>, Arc<LoopbackSegmented>, TempDir) {
    let temp_dir = tempfile::tempdir().unwrap();
    let (session, swarm, segmented) = open_session(&temp_dir).await;
    (session, swarm, segmented, temp_dir)
}
