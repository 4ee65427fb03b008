//! SQLite persistence for the pipeline.
//!
//! One connection is shared by every caller behind a mutex. Repository
//! functions take a `&Connection` (or a transaction, which derefs to one)
//! and are plain synchronous code; async callers run them on the blocking
//! pool through [`Database::call`] or [`Database::transaction`].
//!
//! Each call carries a [`Deadline`]. While the call holds the connection a
//! progress handler interrupts SQLite once the deadline passes, and an
//! interrupted transaction is rolled back when it is dropped.

pub mod jobs;
pub mod stages;
pub mod tasks;
pub mod updates;
pub mod users;

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, ErrorCode, Row, Transaction};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::domain::fields::{DATE_FORMAT, DATE_TIME_FORMAT};

/// SQLite virtual machine instructions between deadline checks
const PROGRESS_OPS: i32 = 1000;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Invalid enum value for {field}: {value}")]
    InvalidEnum { field: String, value: String },

    #[error("Migration failed at version {version}: {reason}")]
    MigrationFailed { version: i64, reason: String },

    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    #[error("Operation deadline exceeded")]
    DeadlineExceeded,

    #[error("Database connection lock poisoned")]
    LockPoisoned,

    #[error("Storage task cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DatabaseError {
    /// Lift SQLite failures that callers need to tell apart into their
    /// own variants.
    fn classify(self) -> Self {
        match self {
            DatabaseError::Sqlite(rusqlite::Error::SqliteFailure(err, msg)) => {
                if err.code == ErrorCode::OperationInterrupted {
                    DatabaseError::DeadlineExceeded
                } else if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE {
                    DatabaseError::DuplicateKey(msg.unwrap_or_else(|| err.to_string()))
                } else {
                    DatabaseError::Sqlite(rusqlite::Error::SqliteFailure(err, msg))
                }
            }
            DatabaseError::Sqlite(rusqlite::Error::FromSqlConversionFailure(idx, ty, inner)) => {
                match inner.downcast::<InvalidValue>() {
                    Ok(invalid) => DatabaseError::InvalidEnum {
                        field: invalid.field.to_string(),
                        value: invalid.value,
                    },
                    Err(inner) => DatabaseError::Sqlite(
                        rusqlite::Error::FromSqlConversionFailure(idx, ty, inner),
                    ),
                }
            }
            other => other,
        }
    }
}

/// A stored value that does not map onto its Rust type
#[derive(Error, Debug)]
#[error("invalid value for {field}: {value}")]
struct InvalidValue {
    field: &'static str,
    value: String,
}

/// Point in time after which a storage call is abandoned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline(Option<Instant>);

impl Deadline {
    /// No deadline
    pub fn none() -> Self {
        Self(None)
    }

    pub fn after(timeout: Duration) -> Self {
        Self(Instant::now().checked_add(timeout))
    }

    pub fn at(instant: Instant) -> Self {
        Self(Some(instant))
    }

    pub fn is_expired(&self) -> bool {
        self.0.map_or(false, |at| Instant::now() >= at)
    }

    pub fn instant(&self) -> Option<Instant> {
        self.0
    }
}

/// Handle to the shared SQLite connection
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").finish_non_exhaustive()
    }
}

impl Database {
    /// Open (creating if needed) the database file and run migrations
    pub fn open(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        info!(path = %path.display(), "Opened database");
        Self::from_connection(conn)
    }

    /// Open a private in-memory database (for tests and dry runs)
    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, DatabaseError> {
        configure_pragmas(&conn)?;
        run_migrations(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection on the current thread.
    ///
    /// Blocks while another caller holds the connection.
    pub fn with_conn<T, F>(&self, deadline: Deadline, f: F) -> Result<T, DatabaseError>
    where
        F: FnOnce(&mut Connection) -> Result<T, DatabaseError>,
    {
        let mut conn = self.conn.lock().map_err(|_| DatabaseError::LockPoisoned)?;

        // Waiting for the lock counts against the deadline
        if deadline.is_expired() {
            return Err(DatabaseError::DeadlineExceeded);
        }

        if let Some(at) = deadline.instant() {
            conn.progress_handler(PROGRESS_OPS, Some(move || Instant::now() >= at));
        }

        let result = f(&mut *conn);

        if deadline.instant().is_some() {
            conn.progress_handler(0, None::<fn() -> bool>);
        }

        // An interrupted rollback can leave the transaction open
        if !conn.is_autocommit() {
            warn!("Connection left inside a transaction, rolling back");
            conn.execute_batch("ROLLBACK")?;
        }

        result.map_err(DatabaseError::classify)
    }

    /// Run `f` inside one transaction. Any error, or a deadline that passes
    /// before commit, rolls the whole transaction back.
    pub fn with_transaction<T, F>(&self, deadline: Deadline, f: F) -> Result<T, DatabaseError>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T, DatabaseError>,
    {
        self.with_conn(deadline, |conn| {
            let tx = conn.transaction()?;
            let value = f(&tx)?;
            if deadline.is_expired() {
                debug!("Deadline passed before commit, rolling back");
                return Err(DatabaseError::DeadlineExceeded);
            }
            tx.commit()?;
            Ok(value)
        })
    }

    /// [`Database::with_conn`] on the blocking pool
    pub async fn call<T, F>(&self, deadline: Deadline, f: F) -> Result<T, DatabaseError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, DatabaseError> + Send + 'static,
    {
        let db = self.clone();
        join_blocking(tokio::task::spawn_blocking(move || db.with_conn(deadline, f))).await
    }

    /// [`Database::with_transaction`] on the blocking pool
    pub async fn transaction<T, F>(&self, deadline: Deadline, f: F) -> Result<T, DatabaseError>
    where
        T: Send + 'static,
        F: FnOnce(&Transaction<'_>) -> Result<T, DatabaseError> + Send + 'static,
    {
        let db = self.clone();
        join_blocking(tokio::task::spawn_blocking(move || db.with_transaction(deadline, f))).await
    }
}

async fn join_blocking<T>(
    handle: tokio::task::JoinHandle<Result<T, DatabaseError>>,
) -> Result<T, DatabaseError> {
    match handle.await {
        Ok(result) => result,
        Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
        Err(_) => Err(DatabaseError::Cancelled),
    }
}

fn configure_pragmas(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute_batch(
        "PRAGMA journal_mode=DELETE;
         PRAGMA foreign_keys=ON;",
    )?;
    Ok(())
}

/// Run all pending migrations
pub fn run_migrations(conn: &Connection) -> Result<(), DatabaseError> {
    let current_version = current_version(conn);

    let migrations: [(i64, &str); 1] = [(1, include_str!("../../migrations/001_initial.sql"))];

    for (version, sql) in migrations {
        if version > current_version {
            info!("Running migration v{version}");
            conn.execute_batch(sql)
                .map_err(|e| DatabaseError::MigrationFailed {
                    version,
                    reason: e.to_string(),
                })?;
        }
    }

    Ok(())
}

/// Current schema version, 0 before the first migration
fn current_version(conn: &Connection) -> i64 {
    conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| {
        row.get::<_, Option<i64>>(0)
    })
    .ok()
    .flatten()
    .unwrap_or(0)
}

/// Count tables in the database (for verification)
pub fn count_tables(conn: &Connection) -> Result<i64, DatabaseError> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'",
        [],
        |row| row.get::<_, i64>(0),
    )?;
    Ok(count)
}

// ============================================================================
// Column encoding
// ============================================================================

/// Timestamps are fixed-width RFC 3339 so text order is time order
pub(crate) fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn date_text(date: Option<NaiveDate>) -> Option<String> {
    date.map(|d| d.format(DATE_FORMAT).to_string())
}

pub(crate) fn date_time_text(at: Option<NaiveDateTime>) -> Option<String> {
    at.map(|t| t.format(DATE_TIME_FORMAT).to_string())
}

pub(crate) fn timestamp_column(row: &Row<'_>, col: &str) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(col)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| conversion_failure(row, col, Box::new(e)))
}

pub(crate) fn date_column(row: &Row<'_>, col: &str) -> rusqlite::Result<Option<NaiveDate>> {
    let raw: Option<String> = row.get(col)?;
    raw.map(|s| {
        NaiveDate::parse_from_str(&s, DATE_FORMAT).map_err(|e| conversion_failure(row, col, Box::new(e)))
    })
    .transpose()
}

pub(crate) fn date_time_column(row: &Row<'_>, col: &str) -> rusqlite::Result<Option<NaiveDateTime>> {
    let raw: Option<String> = row.get(col)?;
    raw.map(|s| {
        NaiveDateTime::parse_from_str(&s, DATE_TIME_FORMAT)
            .map_err(|e| conversion_failure(row, col, Box::new(e)))
    })
    .transpose()
}

/// Read a text column through a domain `parse` function
pub(crate) fn enum_column<T>(
    row: &Row<'_>,
    col: &'static str,
    parse: fn(&str) -> Option<T>,
) -> rusqlite::Result<T> {
    let raw: String = row.get(col)?;
    parse(&raw).ok_or_else(|| {
        conversion_failure(row, col, Box::new(InvalidValue { field: col, value: raw.clone() }))
    })
}

pub(crate) fn optional_enum_column<T>(
    row: &Row<'_>,
    col: &'static str,
    parse: fn(&str) -> Option<T>,
) -> rusqlite::Result<Option<T>> {
    let raw: Option<String> = row.get(col)?;
    raw.map(|value| {
        parse(&value).ok_or_else(|| {
            conversion_failure(row, col, Box::new(InvalidValue { field: col, value: value.clone() }))
        })
    })
    .transpose()
}

fn conversion_failure(
    row: &Row<'_>,
    col: &str,
    err: Box<dyn std::error::Error + Send + Sync + 'static>,
) -> rusqlite::Error {
    let idx = row.as_ref().column_index(col).unwrap_or(0);
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn database_initializes_all_tables() {
        let db = Database::open_in_memory().unwrap();
        let count = db.with_conn(Deadline::none(), |conn| count_tables(conn)).unwrap();
        // schema_version, users, pipeline_jobs, 4 stage tables, containers,
        // job_updates, tasks, task_assignments, task_updates
        assert_eq!(count, 12);
    }

    #[test]
    fn migration_idempotent() {
        let db = Database::open_in_memory().unwrap();
        let result = db.with_conn(Deadline::none(), |conn| run_migrations(conn));
        assert!(result.is_ok());

        let version = db
            .with_conn(Deadline::none(), |conn| Ok(current_version(conn)))
            .unwrap();
        assert_eq!(version, 1);
    }

    #[test]
    fn foreign_keys_enabled() {
        let db = Database::open_in_memory().unwrap();
        let fk: i64 = db
            .with_conn(Deadline::none(), |conn| {
                Ok(conn.query_row("PRAGMA foreign_keys", [], |row| row.get(0))?)
            })
            .unwrap();
        assert_eq!(fk, 1);
    }

    #[test]
    fn file_database_persists_across_opens() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested").join("freightline.db");

        let db = Database::open(&path).unwrap();
        db.with_conn(Deadline::none(), |conn| {
            conn.execute(
                "INSERT INTO users (username, password_hash, designation, role, created_at)
                 VALUES ('ops', '', 'Ops', 'admin', '2024-01-01T00:00:00.000000Z')",
                [],
            )?;
            Ok(())
        })
        .unwrap();
        drop(db);

        let reopened = Database::open(&path).unwrap();
        let users: i64 = reopened
            .with_conn(Deadline::none(), |conn| {
                Ok(conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?)
            })
            .unwrap();
        assert_eq!(users, 1);
    }

    #[test]
    fn expired_deadline_is_rejected_before_running() {
        let db = Database::open_in_memory().unwrap();
        let past = Deadline::at(Instant::now());
        let err = db.with_conn(past, |_| Ok(())).unwrap_err();
        assert!(matches!(err, DatabaseError::DeadlineExceeded));
    }

    #[test]
    fn long_query_is_interrupted_at_deadline() {
        let db = Database::open_in_memory().unwrap();
        let deadline = Deadline::after(Duration::from_millis(50));
        let err = db
            .with_conn(deadline, |conn| {
                let n: i64 = conn.query_row(
                    "WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c)
                     SELECT MAX(x) FROM c",
                    [],
                    |row| row.get(0),
                )?;
                Ok(n)
            })
            .unwrap_err();
        assert!(matches!(err, DatabaseError::DeadlineExceeded));

        // The handler is removed afterwards; the connection still works
        let ok: i64 = db
            .with_conn(Deadline::none(), |conn| {
                Ok(conn.query_row("SELECT 1", [], |row| row.get(0))?)
            })
            .unwrap();
        assert_eq!(ok, 1);
    }

    #[test]
    fn unique_violation_is_classified() {
        let db = Database::open_in_memory().unwrap();
        let insert = |conn: &mut Connection| -> Result<(), DatabaseError> {
            conn.execute(
                "INSERT INTO users (username, password_hash, designation, role, created_at)
                 VALUES ('dup', '', 'Ops', 'admin', '2024-01-01T00:00:00.000000Z')",
                [],
            )?;
            Ok(())
        };
        db.with_conn(Deadline::none(), insert).unwrap();
        let err = db.with_conn(Deadline::none(), insert).unwrap_err();
        assert!(matches!(err, DatabaseError::DuplicateKey(_)));
    }

    #[test]
    fn timestamps_sort_as_text() {
        let early = DateTime::parse_from_rfc3339("2024-01-01T09:00:00Z").unwrap().with_timezone(&Utc);
        let later = early + chrono::Duration::milliseconds(5);
        assert!(timestamp(early) < timestamp(later));
        assert_eq!(timestamp(early).len(), timestamp(later).len());
    }
}
