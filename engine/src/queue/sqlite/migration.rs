//! SQLite database migrations for docq.

use rusqlite::Connection;
use tracing::info;

/// Run all database migrations.
pub fn migrate(conn: &Connection) -> Result<(), rusqlite::Error> {
    // Create migrations table to track applied migrations
    conn.execute(
        "CREATE TABLE IF NOT EXISTS migrations (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let applied: Vec<String> = {
        let mut stmt = conn.prepare("SELECT name FROM migrations")?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        rows.collect::<Result<_, _>>()?
    };

    let mut applied_count = 0;

    // Migration 1: Create jobs table
    if !applied.iter().any(|name| name == "001_create_jobs") {
        conn.execute_batch(
            "CREATE TABLE jobs (
                id TEXT PRIMARY KEY,
                job_type TEXT NOT NULL,
                payload TEXT NOT NULL,
                priority INTEGER NOT NULL DEFAULT 0,
                status TEXT NOT NULL DEFAULT 'pending',
                progress INTEGER NOT NULL DEFAULT 0,
                result TEXT,
                error TEXT,
                created_at INTEGER NOT NULL,
                started_at INTEGER,
                completed_at INTEGER,
                seq INTEGER NOT NULL UNIQUE
            );

            CREATE INDEX idx_jobs_claim ON jobs(status, priority DESC, created_at ASC, seq ASC);
            CREATE INDEX idx_jobs_created ON jobs(created_at DESC, seq DESC);

            INSERT INTO migrations (name, applied_at) VALUES ('001_create_jobs', strftime('%s', 'now'));
            ",
        )?;
        applied_count += 1;
    }

    // Migration 2: Cooperative cancellation flag
    if !applied.iter().any(|name| name == "002_cancel_requested") {
        conn.execute_batch(
            "ALTER TABLE jobs ADD COLUMN cancel_requested INTEGER NOT NULL DEFAULT 0;

            INSERT INTO migrations (name, applied_at) VALUES ('002_cancel_requested', strftime('%s', 'now'));
            ",
        )?;
        applied_count += 1;
    }

    if applied_count > 0 {
        info!(count = applied_count, "Applied SQLite migrations");
    }

    Ok(())
}
