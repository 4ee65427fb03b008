//! The job ledger: `pipeline_jobs` rows and the hydrated job view.

use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use tracing::warn;

use super::{enum_column, stages, timestamp, timestamp_column, updates, DatabaseError};
use crate::domain::{Assignment, JobId, JobRecord, JobStatus, PipelineJob, Stage, UserId};

/// Ledger fields supplied when a job is opened
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewJob {
    pub job_no: String,
    pub created_by: UserId,
    pub assigned_to_stage2: Option<UserId>,
    pub assigned_to_stage3: Option<UserId>,
    pub customer_id: Option<UserId>,
    pub notification_email: Option<String>,
}

/// Restricts a listing to one user's jobs inside a stage window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobFilter {
    pub assignment: Assignment,
    pub user_id: UserId,
    pub stages: Vec<Stage>,
}

const RECORD_SELECT: &str = "SELECT j.*,
        cu.username AS created_by_user,
        s2.username AS stage2_user_name,
        s3.username AS stage3_user_name,
        cs.username AS customer_name
     FROM pipeline_jobs j
     LEFT JOIN users cu ON j.created_by = cu.id
     LEFT JOIN users s2 ON j.assigned_to_stage2 = s2.id
     LEFT JOIN users s3 ON j.assigned_to_stage3 = s3.id
     LEFT JOIN users cs ON j.customer_id = cs.id";

/// Insert a ledger row at `stage1`/`active`. Fails with
/// [`DatabaseError::DuplicateKey`] when the job number is taken.
pub fn insert_job(conn: &Connection, job: &NewJob, now: DateTime<Utc>) -> Result<JobId, DatabaseError> {
    let now = timestamp(now);
    conn.execute(
        "INSERT INTO pipeline_jobs (
            job_no, current_stage, status, created_by, assigned_to_stage2,
            assigned_to_stage3, customer_id, notification_email, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
        params![
            job.job_no,
            Stage::Stage1.as_str(),
            JobStatus::Active.as_str(),
            job.created_by,
            job.assigned_to_stage2,
            job.assigned_to_stage3,
            job.customer_id,
            job.notification_email,
            now,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_job(conn: &Connection, id: JobId) -> Result<Option<PipelineJob>, DatabaseError> {
    let job = conn
        .query_row(
            "SELECT * FROM pipeline_jobs WHERE id = ?1",
            params![id],
            job_from_row,
        )
        .optional()?;
    Ok(job)
}

pub fn current_stage(conn: &Connection, id: JobId) -> Result<Option<Stage>, DatabaseError> {
    let stage = conn
        .query_row(
            "SELECT current_stage FROM pipeline_jobs WHERE id = ?1",
            params![id],
            |row| enum_column(row, "current_stage", Stage::parse),
        )
        .optional()?;
    Ok(stage)
}

pub fn set_stage(
    conn: &Connection,
    id: JobId,
    stage: Stage,
    now: DateTime<Utc>,
) -> Result<(), DatabaseError> {
    let rows = conn.execute(
        "UPDATE pipeline_jobs SET current_stage = ?2, updated_at = ?3 WHERE id = ?1",
        params![id, stage.as_str(), timestamp(now)],
    )?;
    if rows == 0 {
        return Err(DatabaseError::NotFound {
            entity: "Job",
            id: id.to_string(),
        });
    }
    Ok(())
}

pub fn touch(conn: &Connection, id: JobId, now: DateTime<Utc>) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE pipeline_jobs SET updated_at = ?2 WHERE id = ?1",
        params![id, timestamp(now)],
    )?;
    Ok(())
}

/// Fully hydrated job, or `None` if it does not exist
pub fn get_record(conn: &Connection, id: JobId) -> Result<Option<JobRecord>, DatabaseError> {
    let sql = format!("{RECORD_SELECT} WHERE j.id = ?1");
    let record = conn
        .query_row(&sql, params![id], |row| record_from_row(row, true))
        .optional()?;

    match record {
        Some(record) => Ok(Some(hydrate(conn, record)?)),
        None => Ok(None),
    }
}

/// Hydrated jobs, newest first. With a filter, only the creator's name is
/// projected.
pub fn list_records(conn: &Connection, filter: Option<&JobFilter>) -> Result<Vec<JobRecord>, DatabaseError> {
    let mut sql = RECORD_SELECT.to_string();
    let mut user_id = None;

    if let Some(filter) = filter {
        let stages = filter
            .stages
            .iter()
            .map(|s| format!("'{}'", s.as_str()))
            .collect::<Vec<_>>()
            .join(", ");
        sql.push_str(&format!(
            " WHERE j.{} = ?1 AND j.current_stage IN ({})",
            assignment_column(filter.assignment),
            stages,
        ));
        user_id = Some(filter.user_id);
    }
    sql.push_str(" ORDER BY j.created_at DESC, j.id DESC");

    let all_names = filter.is_none();
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(user_id), |row| record_from_row(row, all_names))?;

    let mut records = Vec::new();
    for row in rows {
        records.push(row?);
    }
    drop(stmt);

    records.into_iter().map(|r| hydrate(conn, r)).collect()
}

fn assignment_column(assignment: Assignment) -> &'static str {
    match assignment {
        Assignment::Creator => "created_by",
        Assignment::Stage2 => "assigned_to_stage2",
        Assignment::Stage3 => "assigned_to_stage3",
        Assignment::Customer => "customer_id",
    }
}

/// Load stage data the job has reached, its containers and audit trail.
/// Missing stage data is logged and left absent.
fn hydrate(conn: &Connection, mut record: JobRecord) -> Result<JobRecord, DatabaseError> {
    let id = record.id();
    let stage = record.current_stage();

    record.stage1 = stages::get_stage1(conn, id)?;
    if record.stage1.is_none() {
        warn!(job_id = id, "Stage 1 data missing");
    }

    if stage.has_reached(Stage::Stage2) {
        record.stage2 = stages::get_stage2(conn, id)?;
        if record.stage2.is_none() {
            warn!(job_id = id, %stage, "Stage 2 data missing");
        }
    }

    if stage.has_reached(Stage::Stage3) {
        record.stage3 = stages::get_stage3(conn, id)?;
        if record.stage3.is_none() {
            warn!(job_id = id, %stage, "Stage 3 data missing");
        }
        record.stage3_containers = stages::list_containers(conn, id)?;
    }

    if stage.has_reached(Stage::Stage4) {
        record.stage4 = stages::get_stage4(conn, id)?;
        if record.stage4.is_none() {
            warn!(job_id = id, %stage, "Stage 4 data missing");
        }
    }

    record.updates = updates::list_for_job(conn, id)?;
    Ok(record)
}

fn job_from_row(row: &Row<'_>) -> rusqlite::Result<PipelineJob> {
    Ok(PipelineJob {
        id: row.get("id")?,
        job_no: row.get("job_no")?,
        current_stage: enum_column(row, "current_stage", Stage::parse)?,
        status: enum_column(row, "status", JobStatus::parse)?,
        created_by: row.get("created_by")?,
        assigned_to_stage2: row.get("assigned_to_stage2")?,
        assigned_to_stage3: row.get("assigned_to_stage3")?,
        customer_id: row.get("customer_id")?,
        notification_email: row.get("notification_email")?,
        created_at: timestamp_column(row, "created_at")?,
        updated_at: timestamp_column(row, "updated_at")?,
    })
}

fn record_from_row(row: &Row<'_>, all_names: bool) -> rusqlite::Result<JobRecord> {
    let mut record = JobRecord::new(job_from_row(row)?);
    record.created_by_user = row.get("created_by_user")?;
    if all_names {
        record.stage2_user_name = row.get("stage2_user_name")?;
        record.stage3_user_name = row.get("stage3_user_name")?;
        record.customer_name = row.get("customer_name")?;
    }
    Ok(record)
}
