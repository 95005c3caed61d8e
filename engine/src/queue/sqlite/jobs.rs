//! SQLite job operations for docq.
//!
//! Every state transition is a single conditional UPDATE, so SQLite's
//! statement atomicity provides the claim/finish/cancel exclusion even if
//! several processes share the database file.

use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::sync::Arc;

use crate::protocol::{CancelOutcome, FinishOutcome, Job, JobOutcome, JobStats, JobStatus};
use crate::queue::config::RecoveryPolicy;
use crate::queue::storage::INTERRUPTED_ERROR;
use crate::queue::types::now_ms;

const JOB_COLUMNS: &str = "id, job_type, payload, priority, status, progress, result, error, \
     created_at, started_at, completed_at, cancel_requested, seq";

/// Serialize a JSON value for a TEXT column.
#[inline]
fn to_json(value: &Value) -> Result<String, rusqlite::Error> {
    serde_json::to_string(value).map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))
}

/// Insert a new pending job and return its assigned sequence.
pub fn insert_job(conn: &Connection, job: &Job) -> Result<u64, rusqlite::Error> {
    let payload = to_json(&job.payload)?;
    let seq: i64 = conn.query_row(
        "INSERT INTO jobs (id, job_type, payload, priority, status, progress, created_at, seq)
         VALUES (?1, ?2, ?3, ?4, 'pending', 0, ?5, (SELECT COALESCE(MAX(seq), 0) + 1 FROM jobs))
         RETURNING seq",
        params![
            job.id,
            job.job_type,
            payload,
            job.priority,
            job.created_at as i64,
        ],
        |row| row.get(0),
    )?;
    Ok(seq as u64)
}

/// Claim the next pending job in priority order, ignoring jobs inserted
/// after `max_seq`.
pub fn claim_next(conn: &Connection, max_seq: u64) -> Result<Option<Job>, rusqlite::Error> {
    let sql = format!(
        "UPDATE jobs SET status = 'processing', started_at = ?1, progress = 0
         WHERE id = (
            SELECT id FROM jobs WHERE status = 'pending' AND seq <= ?2
            ORDER BY priority DESC, created_at ASC, seq ASC
            LIMIT 1
         )
         RETURNING {JOB_COLUMNS}"
    );
    let max_seq = max_seq.min(i64::MAX as u64) as i64;
    conn.query_row(&sql, params![now_ms() as i64, max_seq], row_to_job)
        .optional()
}

pub fn last_seq(conn: &Connection) -> Result<u64, rusqlite::Error> {
    let seq: i64 = conn.query_row("SELECT COALESCE(MAX(seq), 0) FROM jobs", [], |row| row.get(0))?;
    Ok(seq as u64)
}

/// Raise progress on a processing job. Returns rows changed.
pub fn update_progress(conn: &Connection, id: &str, percent: u8) -> Result<usize, rusqlite::Error> {
    conn.execute(
        "UPDATE jobs SET progress = MAX(progress, ?2) WHERE id = ?1 AND status = 'processing'",
        params![id, percent.min(100) as i64],
    )
}

/// Conditionally finish a processing job. `None` when the job is unknown.
pub fn finish_job(
    conn: &Connection,
    id: &str,
    outcome: JobOutcome,
) -> Result<Option<FinishOutcome>, rusqlite::Error> {
    let (status, result, error) = match outcome {
        JobOutcome::Completed(value) => (JobStatus::Completed, Some(to_json(&value)?), None),
        JobOutcome::Failed(message) => (JobStatus::Failed, None, Some(message)),
        JobOutcome::Cancelled => (JobStatus::Cancelled, None, None),
    };

    let recorded: Option<String> = conn
        .query_row(
            "UPDATE jobs SET
                status = CASE WHEN cancel_requested = 1 THEN 'cancelled' ELSE ?2 END,
                result = CASE WHEN cancel_requested = 1 THEN NULL ELSE ?3 END,
                error = CASE WHEN cancel_requested = 1 THEN NULL ELSE ?4 END,
                completed_at = ?5
             WHERE id = ?1 AND status = 'processing'
             RETURNING status",
            params![id, status.as_str(), result, error, now_ms() as i64],
            |row| row.get(0),
        )
        .optional()?;

    match recorded {
        Some(s) => Ok(Some(FinishOutcome::Recorded(parse_status(0, &s)?))),
        None => Ok(get_status(conn, id)?.map(FinishOutcome::Conflict)),
    }
}

/// Cancel a pending job or flag a processing one. `None` when unknown.
pub fn request_cancel(conn: &Connection, id: &str) -> Result<Option<CancelOutcome>, rusqlite::Error> {
    let cancelled = conn.execute(
        "UPDATE jobs SET status = 'cancelled', completed_at = ?2 WHERE id = ?1 AND status = 'pending'",
        params![id, now_ms() as i64],
    )?;
    if cancelled > 0 {
        return Ok(Some(CancelOutcome::Cancelled));
    }

    let flagged = conn.execute(
        "UPDATE jobs SET cancel_requested = 1 WHERE id = ?1 AND status = 'processing'",
        params![id],
    )?;
    if flagged > 0 {
        return Ok(Some(CancelOutcome::Requested));
    }

    Ok(get_status(conn, id)?.map(CancelOutcome::AlreadyTerminal))
}

pub fn is_cancel_requested(conn: &Connection, id: &str) -> Result<bool, rusqlite::Error> {
    let flag: Option<(i64, String)> = conn
        .query_row(
            "SELECT cancel_requested, status FROM jobs WHERE id = ?1",
            params![id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    Ok(flag.is_some_and(|(requested, status)| requested != 0 || status == "cancelled"))
}

pub fn get_status(conn: &Connection, id: &str) -> Result<Option<JobStatus>, rusqlite::Error> {
    let status: Option<String> = conn
        .query_row("SELECT status FROM jobs WHERE id = ?1", params![id], |row| {
            row.get(0)
        })
        .optional()?;
    status.map(|s| parse_status(0, &s)).transpose()
}

pub fn get_job(conn: &Connection, id: &str) -> Result<Option<Job>, rusqlite::Error> {
    let sql = format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?1");
    conn.query_row(&sql, params![id], row_to_job).optional()
}

/// Newest-first listing.
pub fn list_jobs(
    conn: &Connection,
    status: Option<JobStatus>,
    limit: usize,
) -> Result<Vec<Job>, rusqlite::Error> {
    let sql = format!(
        "SELECT {JOB_COLUMNS} FROM jobs
         WHERE (?1 IS NULL OR status = ?1)
         ORDER BY created_at DESC, seq DESC
         LIMIT ?2"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(
        params![status.map(|s| s.as_str()), limit.min(i64::MAX as usize) as i64],
        row_to_job,
    )?;
    rows.collect()
}

pub fn count_by_status(conn: &Connection) -> Result<JobStats, rusqlite::Error> {
    let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM jobs GROUP BY status")?;
    let mut rows = stmt.query([])?;
    let mut stats = JobStats::default();
    while let Some(row) = rows.next()? {
        let status: String = row.get(0)?;
        let count: i64 = row.get(1)?;
        stats.record(parse_status(0, &status)?, count as u64);
    }
    Ok(stats)
}

/// Resolve jobs left processing by a dead process.
pub fn recover_interrupted(conn: &Connection, policy: RecoveryPolicy) -> Result<usize, rusqlite::Error> {
    let now = now_ms() as i64;
    let tx = conn.unchecked_transaction()?;

    let mut touched = tx.execute(
        "UPDATE jobs SET status = 'cancelled', completed_at = ?1
         WHERE status = 'processing' AND cancel_requested = 1",
        params![now],
    )?;

    touched += match policy {
        RecoveryPolicy::Requeue => tx.execute(
            "UPDATE jobs SET status = 'pending', started_at = NULL, progress = 0
             WHERE status = 'processing'",
            [],
        )?,
        RecoveryPolicy::Fail => tx.execute(
            "UPDATE jobs SET status = 'failed', error = ?2, completed_at = ?1
             WHERE status = 'processing'",
            params![now, INTERRUPTED_ERROR],
        )?,
    };

    tx.commit()?;
    Ok(touched)
}

pub fn purge_terminal(conn: &Connection, before_ms: u64) -> Result<usize, rusqlite::Error> {
    conn.execute(
        "DELETE FROM jobs
         WHERE status IN ('completed', 'failed', 'cancelled') AND completed_at < ?1",
        params![before_ms as i64],
    )
}

fn parse_status(idx: usize, s: &str) -> Result<JobStatus, rusqlite::Error> {
    s.parse()
        .map_err(|e: String| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.into()))
}

fn parse_json(idx: usize, s: &str) -> Result<Value, rusqlite::Error> {
    serde_json::from_str(s)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Convert a database row to a Job struct.
fn row_to_job(row: &rusqlite::Row) -> Result<Job, rusqlite::Error> {
    let payload_str: String = row.get(2)?;
    let status_str: String = row.get(4)?;
    let progress: i64 = row.get(5)?;
    let result_str: Option<String> = row.get(6)?;
    let created_at: i64 = row.get(8)?;
    let started_at: Option<i64> = row.get(9)?;
    let completed_at: Option<i64> = row.get(10)?;
    let cancel_requested: i64 = row.get(11)?;
    let seq: i64 = row.get(12)?;

    Ok(Job {
        id: row.get(0)?,
        job_type: row.get(1)?,
        payload: Arc::new(parse_json(2, &payload_str)?),
        priority: row.get(3)?,
        status: parse_status(4, &status_str)?,
        progress: progress.clamp(0, 100) as u8,
        result: result_str.map(|s| parse_json(6, &s)).transpose()?,
        error: row.get(7)?,
        created_at: created_at as u64,
        started_at: started_at.map(|t| t as u64),
        completed_at: completed_at.map(|t| t as u64),
        cancel_requested: cancel_requested != 0,
        seq: seq as u64,
    })
}
