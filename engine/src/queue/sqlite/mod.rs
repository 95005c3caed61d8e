//! SQLite storage layer for docq persistence.
//!
//! Embedded, durable job table with:
//! - WAL mode for crash safety
//! - Migrations tracked in a `migrations` table
//! - Single-statement conditional updates for claim/finish/cancel

mod jobs;
mod migration;


use parking_lot::Mutex;
use rusqlite::{Connection, ErrorCode};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

use crate::protocol::{CancelOutcome, FinishOutcome, Job, JobOutcome, JobStats, JobStatus};

use super::config::RecoveryPolicy;
use super::error::StoreError;
use super::storage::JobStore;

/// SQLite storage configuration
#[derive(Debug, Clone)]
pub struct SqliteConfig {
    /// Path to the database file
    pub path: PathBuf,
    /// Enable WAL mode (recommended)
    pub wal_mode: bool,
    /// Synchronous mode: 0=OFF, 1=NORMAL, 2=FULL
    pub synchronous: i32,
    /// Cache size in pages (negative = KB)
    pub cache_size: i32,
    /// How long a statement waits on a lock held by another connection
    pub busy_timeout: Duration,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("docq.db"),
            wal_mode: true,
            synchronous: 1,     // NORMAL - good balance of safety and speed
            cache_size: -16000, // 16MB cache
            busy_timeout: Duration::from_secs(5),
        }
    }
}

impl SqliteConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let path = std::env::var("DATA_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.path);

        let synchronous = std::env::var("SQLITE_SYNCHRONOUS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.synchronous);

        let cache_size = std::env::var("SQLITE_CACHE_SIZE")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.cache_size);

        Self {
            path,
            synchronous,
            cache_size,
            ..defaults
        }
    }

    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }
}

/// SQLite-backed job store.
pub struct SqliteStore {
    /// Database connection (protected by Mutex for thread safety)
    conn: Mutex<Connection>,
    /// Path to the database file
    pub path: PathBuf,
}

impl SqliteStore {
    /// Open (creating if needed) and migrate the database.
    pub fn open(config: SqliteConfig) -> Result<Self, StoreError> {
        // Create parent directories if they don't exist
        if let Some(parent) = config.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StoreError::Unavailable(e.to_string()))?;
            }
        }

        let conn = Connection::open(&config.path)?;
        conn.busy_timeout(config.busy_timeout)?;

        // journal_mode returns a row, so it cannot go through execute_batch
        let journal = if config.wal_mode { "WAL" } else { "DELETE" };
        conn.query_row(&format!("PRAGMA journal_mode = {}", journal), [], |_| Ok(()))?;
        conn.execute_batch(&format!(
            "PRAGMA synchronous = {};
             PRAGMA cache_size = {};
             PRAGMA temp_store = MEMORY;",
            config.synchronous, config.cache_size,
        ))?;

        migration::migrate(&conn)?;

        info!(path = %config.path.display(), "SQLite initialized");

        Ok(Self {
            conn: Mutex::new(conn),
            path: config.path,
        })
    }
}

impl JobStore for SqliteStore {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn insert(&self, job: &Job) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        match jobs::insert_job(&conn, job) {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                Err(StoreError::DuplicateId(job.id.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn claim_next_up_to(&self, max_seq: u64) -> Result<Option<Job>, StoreError> {
        let conn = self.conn.lock();
        Ok(jobs::claim_next(&conn, max_seq)?)
    }

    fn last_seq(&self) -> Result<u64, StoreError> {
        let conn = self.conn.lock();
        Ok(jobs::last_seq(&conn)?)
    }

    fn update_progress(&self, id: &str, percent: u8) -> Result<bool, StoreError> {
        let conn = self.conn.lock();
        if jobs::update_progress(&conn, id, percent)? > 0 {
            return Ok(true);
        }
        match jobs::get_status(&conn, id)? {
            Some(_) => Ok(false),
            None => Err(StoreError::NotFound(id.to_string())),
        }
    }

    fn finish(&self, id: &str, outcome: JobOutcome) -> Result<FinishOutcome, StoreError> {
        let conn = self.conn.lock();
        jobs::finish_job(&conn, id, outcome)?.ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    fn request_cancel(&self, id: &str) -> Result<CancelOutcome, StoreError> {
        let conn = self.conn.lock();
        jobs::request_cancel(&conn, id)?.ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    fn is_cancel_requested(&self, id: &str) -> Result<bool, StoreError> {
        let conn = self.conn.lock();
        Ok(jobs::is_cancel_requested(&conn, id)?)
    }

    fn get(&self, id: &str) -> Result<Option<Job>, StoreError> {
        let conn = self.conn.lock();
        Ok(jobs::get_job(&conn, id)?)
    }

    fn list(&self, status: Option<JobStatus>, limit: usize) -> Result<Vec<Job>, StoreError> {
        let conn = self.conn.lock();
        Ok(jobs::list_jobs(&conn, status, limit)?)
    }

    fn stats(&self) -> Result<JobStats, StoreError> {
        let conn = self.conn.lock();
        Ok(jobs::count_by_status(&conn)?)
    }

    fn recover_interrupted(&self, policy: RecoveryPolicy) -> Result<usize, StoreError> {
        let conn = self.conn.lock();
        Ok(jobs::recover_interrupted(&conn, policy)?)
    }

    fn purge_terminal(&self, before_ms: u64) -> Result<usize, StoreError> {
        let conn = self.conn.lock();
        Ok(jobs::purge_terminal(&conn, before_ms)?)
    }
}
