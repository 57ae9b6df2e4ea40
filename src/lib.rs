//! # unidl
//!
//! One task model over two download engines: a swarm (peer-to-peer) engine and a
//! segmented (multi-connection HTTP/FTP) engine.
//!
//! ## Design Philosophy
//!
//! unidl is designed to be:
//! - **Engine-agnostic** - Engines plug in through the [`SwarmEngine`] and
//!   [`SegmentedEngine`] traits; their notifications are translated into one
//!   canonical state machine
//! - **Single-writer** - Every state change goes through one queue, so notifications
//!   from engine threads never race with user commands
//! - **Library-first** - No CLI or UI, purely a Rust crate for embedding
//! - **Event-driven** - Consumers subscribe to events, no polling required
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use unidl::{BackendMask, Config, SegmentedEngine, Session, SwarmEngine, TaskSelection};
//!
//! async fn run(
//!     swarm: Arc<dyn SwarmEngine>,
//!     segmented: Arc<dyn SegmentedEngine>,
//! ) -> unidl::Result<()> {
//!     let session = Session::new(Config::default(), swarm, segmented).await?;
//!
//!     // Subscribe to events
//!     let mut events = session.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     session
//!         .add_url("https://example.com/image.iso -- split 8", false)
//!         .await?;
//!     session.pause(TaskSelection::All, BackendMask::ALL).await?;
//!
//!     session.shutdown().await
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Database persistence layer (resume records)
pub mod db;
/// Request string parsing
pub mod descriptor;
/// Engine command traits and native notification types
pub mod engine;
/// Error types
pub mod error;
/// Task filters
pub mod filter;
/// Session orchestrator (decomposed into focused submodules)
pub mod session;
/// Smoothed transfer rates
pub mod speed_monitor;
/// Canonical states, events and the transition table
pub mod state;
/// Per-download task handle
pub mod task;
/// Native notification translation
pub mod translator;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;

// Re-export commonly used types
pub use config::{Config, PersistenceConfig, SegmentedConfig, SessionConfig, SwarmConfig};
pub use db::Database;
pub use descriptor::RequestDescriptor;
pub use engine::{
    RateLimits, SegmentedEngine, SegmentedNativeEvent, SegmentedProgress, SegmentedRequest,
    SwarmAddParams, SwarmAlert, SwarmEngine, SwarmNativeState, SwarmStatus,
};
pub use error::{BackendError, DatabaseError, Error, Result};
pub use filter::{HashFilter, InMemoryLabels, LabelLookup, NoLabels, StateClass, TaskFilter};
pub use session::Session;
pub use speed_monitor::SpeedMonitor;
pub use state::{CanonicalEvent, CanonicalState};
pub use task::{ResumeRecord, TaskHandle, TaskSnapshot};
pub use types::{
    BackendKind, BackendMask, BatchOutcome, ErrorInfo, InfoHash, QueueOp, ResumeMode,
    SegmentedId, SessionEvent, TaskId, TaskSelection,
};

/// Helper function to run the session with graceful signal handling.
///
/// Waits for a termination signal and then calls the session's `shutdown()` method.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use unidl::{Config, SegmentedEngine, Session, SwarmEngine, run_with_shutdown};
///
/// async fn serve(
///     swarm: Arc<dyn SwarmEngine>,
///     segmented: Arc<dyn SegmentedEngine>,
/// ) -> unidl::Result<()> {
///     let session = Session::new(Config::default(), swarm, segmented).await?;
///
///     // Run with automatic signal handling
///     run_with_shutdown(session).await
/// }
/// ```
pub async fn run_with_shutdown(session: Session) -> Result<()> {
    wait_for_signal().await;
    session.shutdown().await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Registration may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => tracing::info!("Received SIGTERM signal"),
                _ = sigint.recv() => tracing::info!("Received SIGINT signal (Ctrl+C)"),
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            wait_or_ctrl_c(SignalKind::interrupt(), "SIGINT").await;
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            wait_or_ctrl_c(SignalKind::terminate(), "SIGTERM").await;
        }
    }
}

#[cfg(unix)]
async fn wait_or_ctrl_c(kind: tokio::signal::unix::SignalKind, name: &str) {
    match tokio::signal::unix::signal(kind) {
        Ok(mut stream) => {
            stream.recv().await;
            tracing::info!(signal = name, "Received signal");
        }
        Err(_) => {
            tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
            tokio::signal::ctrl_c().await.ok();
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Received Ctrl+C signal"),
        Err(e) => tracing::error!(error = %e, "Failed to listen for Ctrl+C signal"),
    }
}
