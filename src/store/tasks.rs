//! Legacy task board tables.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{enum_column, timestamp, timestamp_column, DatabaseError};
use crate::domain::fields::DATE_FORMAT;
use crate::domain::{NewTask, Priority, Task, TaskId, TaskStatus, TaskSummary, TaskUpdate, UserId};

/// Insert a task and its assignments. Run inside a transaction so a bad
/// assignee leaves no half-created task.
pub fn insert_task(conn: &Connection, task: &NewTask, now: DateTime<Utc>) -> Result<TaskId, DatabaseError> {
    let now = timestamp(now);
    conn.execute(
        "INSERT INTO tasks (job_id, description, priority, deadline, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            task.job_id,
            task.description,
            task.priority.as_str(),
            task.deadline.format(DATE_FORMAT).to_string(),
            now,
        ],
    )?;
    let task_id = conn.last_insert_rowid();

    let mut stmt = conn.prepare(
        "INSERT OR IGNORE INTO task_assignments (task_id, user_id, assigned_at) VALUES (?1, ?2, ?3)",
    )?;
    for user_id in &task.assigned_to {
        stmt.execute(params![task_id, user_id, now])?;
    }

    Ok(task_id)
}

pub fn get_task(conn: &Connection, id: TaskId) -> Result<Option<Task>, DatabaseError> {
    let task = conn
        .query_row("SELECT * FROM tasks WHERE id = ?1", params![id], |row| {
            Ok(Task {
                id: row.get("id")?,
                job_id: row.get("job_id")?,
                description: row.get("description")?,
                priority: enum_column(row, "priority", Priority::parse)?,
                deadline: deadline_column(row)?,
                created_at: timestamp_column(row, "created_at")?,
            })
        })
        .optional()?;
    Ok(task)
}

/// Every task with its assignees and the latest status posted by anyone
pub fn list_tasks(conn: &Connection) -> Result<Vec<TaskSummary>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT t.id, t.job_id, t.description, t.priority, t.deadline,
                COALESCE(
                    (SELECT tu.status FROM task_updates tu
                     WHERE tu.task_id = t.id ORDER BY tu.id DESC LIMIT 1),
                    'Assigned') AS status
         FROM tasks t
         ORDER BY t.id",
    )?;
    let rows = stmt.query_map([], summary_from_row)?;

    let mut tasks = Vec::new();
    for row in rows {
        let mut task = row?;
        task.assigned_to = assignee_names(conn, task.id)?;
        tasks.push(task);
    }
    Ok(tasks)
}

/// Tasks assigned to `user_id`, each with that user's own latest status
pub fn list_for_user(conn: &Connection, user_id: UserId) -> Result<Vec<TaskSummary>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT t.id, t.job_id, t.description, t.priority, t.deadline,
                COALESCE(
                    (SELECT tu.status FROM task_updates tu
                     WHERE tu.task_id = t.id AND tu.user_id = ?1 ORDER BY tu.id DESC LIMIT 1),
                    'Assigned') AS status
         FROM tasks t
         JOIN task_assignments ta ON ta.task_id = t.id
         WHERE ta.user_id = ?1
         ORDER BY t.deadline, t.id",
    )?;
    let rows = stmt.query_map(params![user_id], summary_from_row)?;

    let mut tasks = Vec::new();
    for row in rows {
        tasks.push(row?);
    }
    Ok(tasks)
}

pub fn is_assigned(conn: &Connection, task_id: TaskId, user_id: UserId) -> Result<bool, DatabaseError> {
    let found = conn
        .query_row(
            "SELECT 1 FROM task_assignments WHERE task_id = ?1 AND user_id = ?2",
            params![task_id, user_id],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

pub fn append_update(
    conn: &Connection,
    task_id: TaskId,
    user_id: UserId,
    status: TaskStatus,
    comment: Option<&str>,
    now: DateTime<Utc>,
) -> Result<i64, DatabaseError> {
    conn.execute(
        "INSERT INTO task_updates (task_id, user_id, status, comment, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![task_id, user_id, status.as_str(), comment, timestamp(now)],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn list_updates(conn: &Connection, task_id: TaskId) -> Result<Vec<TaskUpdate>, DatabaseError> {
    let mut stmt = conn.prepare("SELECT * FROM task_updates WHERE task_id = ?1 ORDER BY id DESC")?;
    let rows = stmt.query_map(params![task_id], |row| {
        Ok(TaskUpdate {
            id: row.get("id")?,
            task_id: row.get("task_id")?,
            user_id: row.get("user_id")?,
            status: enum_column(row, "status", TaskStatus::parse)?,
            comment: row.get("comment")?,
            updated_at: timestamp_column(row, "updated_at")?,
        })
    })?;

    let mut updates = Vec::new();
    for row in rows {
        updates.push(row?);
    }
    Ok(updates)
}

/// Delete a task; assignments and updates go with it
pub fn delete_task(conn: &Connection, id: TaskId) -> Result<(), DatabaseError> {
    let rows = conn.execute("DELETE FROM tasks WHERE id = ?1", params![id])?;
    if rows == 0 {
        return Err(DatabaseError::NotFound {
            entity: "Task",
            id: id.to_string(),
        });
    }
    Ok(())
}

fn assignee_names(conn: &Connection, task_id: TaskId) -> Result<Vec<String>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT u.username FROM task_assignments ta
         JOIN users u ON u.id = ta.user_id
         WHERE ta.task_id = ?1
         ORDER BY ta.id",
    )?;
    let rows = stmt.query_map(params![task_id], |row| row.get::<_, String>(0))?;

    let mut names = Vec::new();
    for row in rows {
        names.push(row?);
    }
    Ok(names)
}

fn summary_from_row(row: &Row<'_>) -> rusqlite::Result<TaskSummary> {
    Ok(TaskSummary {
        id: row.get("id")?,
        job_id: row.get("job_id")?,
        description: row.get("description")?,
        priority: enum_column(row, "priority", Priority::parse)?,
        deadline: deadline_column(row)?,
        assigned_to: Vec::new(),
        status: enum_column(row, "status", TaskStatus::parse)?,
    })
}

fn deadline_column(row: &Row<'_>) -> rusqlite::Result<chrono::NaiveDate> {
    super::date_column(row, "deadline")?.ok_or_else(|| {
        rusqlite::Error::InvalidColumnType(0, "deadline".to_string(), rusqlite::types::Type::Null)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{NewUser, Role};
    use crate::store::{users, Database, Deadline};
    use chrono::{NaiveDate, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap()
    }

    #[test]
    fn status_comes_from_latest_update() {
        let db = Database::open_in_memory().unwrap();
        let (all, mine_a, mine_b) = db
            .with_conn(Deadline::none(), |conn| {
                let a = users::insert_user(conn, &NewUser::new("asha", "Ops", Role::Stage1Employee), now())?;
                let b = users::insert_user(conn, &NewUser::new("bilal", "Ops", Role::Stage2Employee), now())?;
                let task_id = insert_task(
                    conn,
                    &NewTask {
                        job_id: "JOB100".into(),
                        description: "Chase original BL".into(),
                        priority: Priority::High,
                        deadline: NaiveDate::from_ymd_opt(2024, 5, 10).unwrap(),
                        assigned_to: vec![a, b],
                    },
                    now(),
                )?;

                append_update(conn, task_id, a, TaskStatus::InProgress, Some("called forwarder"), now())?;
                append_update(conn, task_id, b, TaskStatus::OnHold, None, now())?;

                Ok((list_tasks(conn)?, list_for_user(conn, a)?, list_for_user(conn, b)?))
            })
            .unwrap();

        assert_eq!(all.len(), 1);
        assert_eq!(all[0].assigned_to, ["asha", "bilal"]);
        assert_eq!(all[0].status, TaskStatus::OnHold);
        assert_eq!(mine_a[0].status, TaskStatus::InProgress);
        assert_eq!(mine_b[0].status, TaskStatus::OnHold);
    }

    #[test]
    fn delete_cascades_and_reports_missing() {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(Deadline::none(), |conn| {
            let a = users::insert_user(conn, &NewUser::new("asha", "Ops", Role::Stage1Employee), now())?;
            let task_id = insert_task(
                conn,
                &NewTask {
                    job_id: "JOB7".into(),
                    description: "File BoE".into(),
                    priority: Priority::Low,
                    deadline: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
                    assigned_to: vec![a],
                },
                now(),
            )?;
            assert!(is_assigned(conn, task_id, a)?);
            append_update(conn, task_id, a, TaskStatus::Completed, None, now())?;

            delete_task(conn, task_id)?;
            assert!(get_task(conn, task_id)?.is_none());
            assert!(list_updates(conn, task_id)?.is_empty());
            assert!(list_for_user(conn, a)?.is_empty());
            assert!(matches!(delete_task(conn, task_id), Err(DatabaseError::NotFound { .. })));
            Ok(())
        })
        .unwrap();
    }
}
