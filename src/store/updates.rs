//! Append-only audit log (`job_updates`).

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use super::{enum_column, timestamp, timestamp_column, DatabaseError};
use crate::domain::{JobId, JobUpdate, NewJobUpdate, Stage, UpdateType};

pub fn append(conn: &Connection, entry: &NewJobUpdate, now: DateTime<Utc>) -> Result<i64, DatabaseError> {
    conn.execute(
        "INSERT INTO job_updates (job_id, user_id, stage, update_type, message, old_value, new_value, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            entry.job_id,
            entry.user_id,
            entry.stage.as_str(),
            entry.update_type.as_str(),
            entry.message,
            entry.old_value,
            entry.new_value,
            timestamp(now),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Newest first; entries written in the same instant keep insertion order
/// reversed.
pub fn list_for_job(conn: &Connection, job_id: JobId) -> Result<Vec<JobUpdate>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT * FROM job_updates WHERE job_id = ?1 ORDER BY created_at DESC, id DESC",
    )?;
    let rows = stmt.query_map(params![job_id], |row| {
        Ok(JobUpdate {
            id: row.get("id")?,
            job_id: row.get("job_id")?,
            user_id: row.get("user_id")?,
            stage: enum_column(row, "stage", Stage::parse)?,
            update_type: enum_column(row, "update_type", UpdateType::parse)?,
            message: row.get("message")?,
            old_value: row.get("old_value")?,
            new_value: row.get("new_value")?,
            created_at: timestamp_column(row, "created_at")?,
        })
    })?;

    let mut entries = Vec::new();
    for row in rows {
        entries.push(row?);
    }
    Ok(entries)
}

pub fn count_for_job(conn: &Connection, job_id: JobId) -> Result<i64, DatabaseError> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM job_updates WHERE job_id = ?1",
        params![job_id],
        |row| row.get(0),
    )?;
    Ok(count)
}
