//! Database layer for unidl
//!
//! SQLite persistence for resume records.
//!
//! ## Submodules
//!
//! Methods on [`Database`] are organized by domain:
//! - [`migrations`] - Database lifecycle, schema migrations
//! - [`resume`] - Resume record CRUD

use sqlx::{FromRow, sqlite::SqlitePool};

mod migrations;
mod resume;

/// Resume record row as stored in SQLite
///
/// `record` is the JSON body of a [`ResumeRecord`](crate::task::ResumeRecord); the
/// native resume blob lives in its own column.
#[derive(Debug, Clone, FromRow)]
pub struct ResumeRow {
    /// Task identity in `backend:id` form
    pub task_key: String,
    /// Backend name (`swarm` or `segmented`)
    pub backend: String,
    /// JSON-encoded record
    pub record: String,
    /// Native engine resume data
    pub native: Option<Vec<u8>>,
    /// Unix timestamp of the last save
    pub updated_at: i64,
}

/// Database handle for unidl
pub struct Database {
    pool: SqlitePool,
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
