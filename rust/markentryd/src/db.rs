use rusqlite::{Connection, OptionalExtension};
use sha2::{Digest, Sha256};
use std::path::Path;
use uuid::Uuid;

use crate::session::SessionSnapshot;

pub const DB_FILE_NAME: &str = "markentry.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;
    conn.busy_timeout(std::time::Duration::from_secs(5))?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS session_snapshots(
            id TEXT PRIMARY KEY,
            session_id TEXT NOT NULL,
            exam_name TEXT,
            class_name TEXT,
            digest TEXT NOT NULL,
            snapshot_json TEXT NOT NULL,
            saved_at TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_session_snapshots_session ON session_snapshots(session_id, saved_at)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_session_snapshots_flow ON session_snapshots(exam_name, class_name, saved_at)",
        [],
    )?;

    Ok(conn)
}

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    match raw {
        Some(s) => Ok(Some(serde_json::from_str(&s)?)),
        None => Ok(None),
    }
}

pub fn settings_set_json(conn: &Connection, key: &str, value: &serde_json::Value) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, serde_json::to_string(value)?),
    )?;
    Ok(())
}

/// Digest of the saved content only; `takenAt` is left out so an unchanged
/// marksheet hashes the same on every autosave.
pub fn snapshot_digest(snapshot: &SessionSnapshot) -> anyhow::Result<String> {
    let body = serde_json::to_vec(&(&snapshot.meta, &snapshot.schema, &snapshot.scores))?;
    Ok(format!("{:x}", Sha256::digest(&body)))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Written,
    Unchanged,
}

pub fn save_snapshot(conn: &Connection, snapshot: &SessionSnapshot) -> anyhow::Result<SaveOutcome> {
    let digest = snapshot_digest(snapshot)?;
    let latest: Option<String> = conn
        .query_row(
            "SELECT digest FROM session_snapshots
             WHERE session_id = ?
             ORDER BY saved_at DESC, rowid DESC
             LIMIT 1",
            [&snapshot.session_id],
            |r| r.get(0),
        )
        .optional()?;
    if latest.as_deref() == Some(digest.as_str()) {
        return Ok(SaveOutcome::Unchanged);
    }

    conn.execute(
        "INSERT INTO session_snapshots(id, session_id, exam_name, class_name, digest, snapshot_json, saved_at)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        (
            Uuid::new_v4().to_string(),
            &snapshot.session_id,
            snapshot.meta.exam_name.as_deref(),
            snapshot.meta.class_name.as_deref(),
            &digest,
            serde_json::to_string(snapshot)?,
            &snapshot.taken_at,
        ),
    )?;
    Ok(SaveOutcome::Written)
}

/// Newest snapshot saved for the same exam and class, from any session.
pub fn latest_snapshot_for(
    conn: &Connection,
    exam_name: Option<&str>,
    class_name: Option<&str>,
) -> anyhow::Result<Option<SessionSnapshot>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT snapshot_json FROM session_snapshots
             WHERE exam_name IS ? AND class_name IS ?
             ORDER BY saved_at DESC, rowid DESC
             LIMIT 1",
            (exam_name, class_name),
            |r| r.get(0),
        )
        .optional()?;
    match raw {
        Some(s) => Ok(Some(serde_json::from_str(&s)?)),
        None => Ok(None),
    }
}

pub fn snapshot_count(conn: &Connection, session_id: &str) -> anyhow::Result<i64> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM session_snapshots WHERE session_id = ?",
        [session_id],
        |r| r.get(0),
    )?)
}
