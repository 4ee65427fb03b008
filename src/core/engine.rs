//! The pipeline engine.
//!
//! Every mutation runs as exactly one transaction covering the ledger row,
//! the stage data, the container replace (stage 3) and the audit entry. A
//! failure at any step, or a deadline that passes first, rolls back all of
//! it. Notifications go out only after commit, on their own task; the
//! engine keeps track of those tasks until they are drained.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

use crate::adapters::Notifier;
use crate::domain::fields;
use crate::domain::{
    stage_after_update, Caller, CreateJobRequest, JobId, JobRecord, NewJobUpdate, NewUser,
    PipelineJob, Role, Stage, Stage2UpdateRequest, Stage3UpdateRequest, Stage4UpdateRequest,
    StageUpdate, User, UserId,
};
use crate::store::jobs::{self, JobFilter, NewJob};
use crate::store::{stages, updates, users, Database, DatabaseError, Deadline};

use super::access::{self, Visibility};
use super::clock::Clock;
use super::error::PipelineError;

/// Default deadline for one engine operation
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_millis(5000);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    /// `None` disables the deadline
    pub operation_timeout: Option<Duration>,
    pub notifications_enabled: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            operation_timeout: Some(DEFAULT_OPERATION_TIMEOUT),
            notifications_enabled: true,
        }
    }
}

/// Outcome of a stage 2/3/4 write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StageTransition {
    pub job_id: JobId,
    /// Stage whose data was written
    pub stage: Stage,
    pub previous: Stage,
    pub current: Stage,
}

impl StageTransition {
    pub fn advanced(&self) -> bool {
        self.previous != self.current
    }
}

enum PipelineEvent {
    JobCreated { job_id: JobId, created_by: UserId },
    StageWritten { job_id: JobId, stage: Stage, user_id: UserId },
}

/// Orchestrates job creation, stage writes and role-scoped reads
#[derive(Clone)]
pub struct PipelineEngine {
    db: Database,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    settings: EngineSettings,
    /// In-flight notification deliveries, shared between clones
    notifications: Arc<Mutex<JoinSet<()>>>,
}

impl PipelineEngine {
    pub fn new(
        db: Database,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            db,
            notifier,
            clock,
            settings,
            notifications: Arc::new(Mutex::new(JoinSet::new())),
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub(crate) fn deadline(&self) -> Deadline {
        self.settings
            .operation_timeout
            .map_or_else(Deadline::none, Deadline::after)
    }

    pub(crate) fn store_error(&self, err: DatabaseError) -> PipelineError {
        let timeout_ms = self
            .settings
            .operation_timeout
            .map_or(0, |t| t.as_millis() as u64);
        if matches!(err, DatabaseError::DeadlineExceeded) {
            warn!(timeout_ms, "Operation deadline exceeded, transaction rolled back");
        }
        PipelineError::from_store(err, timeout_ms)
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Open a job at stage 1 together with its intake data.
    ///
    /// Zero or absent assignments are stored as unassigned. A taken job
    /// number fails with [`PipelineError::DuplicateJobNumber`] and writes
    /// nothing.
    #[instrument(skip(self, request), fields(job_no = %request.job_no, user_id = created_by))]
    pub async fn create_job(
        &self,
        request: CreateJobRequest,
        created_by: UserId,
    ) -> Result<JobRecord, PipelineError> {
        let stage1 = request.to_fields()?;
        if stage1.job_no.is_empty() {
            return Err(PipelineError::Validation("job_no is required".to_string()));
        }

        let new_job = NewJob {
            job_no: stage1.job_no.clone(),
            created_by,
            assigned_to_stage2: fields::user_ref(request.assigned_to_stage2),
            assigned_to_stage3: fields::user_ref(request.assigned_to_stage3),
            customer_id: fields::user_ref(request.customer_id),
            notification_email: request.notification_email.as_deref().and_then(fields::text),
        };
        let job_no = new_job.job_no.clone();
        let now = self.clock.now();

        let record = self
            .db
            .transaction(self.deadline(), move |tx| {
                for user_id in referenced_users(&new_job) {
                    if users::username(tx, user_id)?.is_none() {
                        return Err(DatabaseError::NotFound {
                            entity: "User",
                            id: user_id.to_string(),
                        });
                    }
                }

                let job_id = jobs::insert_job(tx, &new_job, now)?;
                stages::insert_stage1(tx, job_id, &stage1, now)?;
                updates::append(tx, &NewJobUpdate::job_created(job_id, created_by), now)?;

                jobs::get_record(tx, job_id)?.ok_or_else(|| DatabaseError::NotFound {
                    entity: "Job",
                    id: job_id.to_string(),
                })
            })
            .await
            .map_err(|err| match err {
                DatabaseError::DuplicateKey(_) => PipelineError::DuplicateJobNumber(job_no.clone()),
                other => self.store_error(other),
            })?;

        info!(job_id = record.id(), "Job created");
        self.dispatch(PipelineEvent::JobCreated {
            job_id: record.id(),
            created_by,
        });
        Ok(record)
    }

    #[instrument(skip(self, request), fields(stage = "stage2"))]
    pub async fn update_stage2(
        &self,
        job_id: JobId,
        request: Stage2UpdateRequest,
        user_id: UserId,
    ) -> Result<StageTransition, PipelineError> {
        let data = request.to_fields();
        self.write_stage(job_id, user_id, StageUpdate::Stage2, move |conn, now| {
            stages::upsert_stage2(conn, job_id, &data, now)
        })
        .await
    }

    /// Also replaces the job's whole container list with the request's.
    #[instrument(skip(self, request), fields(stage = "stage3", containers = request.containers.len()))]
    pub async fn update_stage3(
        &self,
        job_id: JobId,
        request: Stage3UpdateRequest,
        user_id: UserId,
    ) -> Result<StageTransition, PipelineError> {
        let data = request.to_fields();
        let containers = request.container_fields()?;
        self.write_stage(job_id, user_id, StageUpdate::Stage3, move |conn, now| {
            stages::upsert_stage3(conn, job_id, &data, now)?;
            stages::replace_containers(conn, job_id, &containers, now)?;
            Ok(())
        })
        .await
    }

    /// Always lands the job on stage 4, or on completed when the request
    /// carries an acknowledge date, whatever stage it was at.
    #[instrument(skip(self, request), fields(stage = "stage4"))]
    pub async fn update_stage4(
        &self,
        job_id: JobId,
        request: Stage4UpdateRequest,
        user_id: UserId,
    ) -> Result<StageTransition, PipelineError> {
        let acknowledged = request.is_acknowledged();
        let data = request.to_fields();
        self.write_stage(job_id, user_id, StageUpdate::Stage4 { acknowledged }, move |conn, now| {
            stages::upsert_stage4(conn, job_id, &data, now)
        })
        .await
    }

    async fn write_stage<F>(
        &self,
        job_id: JobId,
        user_id: UserId,
        update: StageUpdate,
        write: F,
    ) -> Result<StageTransition, PipelineError>
    where
        F: FnOnce(&Connection, DateTime<Utc>) -> Result<(), DatabaseError> + Send + 'static,
    {
        let stage = update.stage();
        let now = self.clock.now();

        let transition = self
            .db
            .transaction(self.deadline(), move |tx| {
                let conn: &Connection = tx;
                let previous = jobs::current_stage(conn, job_id)?.ok_or_else(|| DatabaseError::NotFound {
                    entity: "Job",
                    id: job_id.to_string(),
                })?;

                write(conn, now)?;

                let current = stage_after_update(previous, update);
                if current != previous || matches!(update, StageUpdate::Stage4 { .. }) {
                    jobs::set_stage(conn, job_id, current, now)?;
                } else {
                    jobs::touch(conn, job_id, now)?;
                }

                let entry = NewJobUpdate::stage_written(job_id, user_id, stage, previous, current);
                updates::append(conn, &entry, now)?;

                Ok(StageTransition {
                    job_id,
                    stage,
                    previous,
                    current,
                })
            })
            .await
            .map_err(|err| self.store_error(err))?;

        if transition.advanced() {
            info!(job_id, from = %transition.previous, to = %transition.current, "Job advanced");
        } else {
            debug!(job_id, %stage, "Stage data updated without advancing");
        }

        self.dispatch(PipelineEvent::StageWritten {
            job_id,
            stage,
            user_id,
        });
        Ok(transition)
    }

    // ========================================================================
    // Reads
    // ========================================================================

    #[instrument(skip(self))]
    pub async fn get_job_by_id(&self, job_id: JobId) -> Result<JobRecord, PipelineError> {
        self.db
            .call(self.deadline(), move |conn| jobs::get_record(conn, job_id))
            .await
            .map_err(|err| self.store_error(err))?
            .ok_or_else(|| PipelineError::job_not_found(job_id))
    }

    /// The bare ledger row, without stage data
    pub async fn get_job(&self, job_id: JobId) -> Result<PipelineJob, PipelineError> {
        self.db
            .call(self.deadline(), move |conn| jobs::get_job(conn, job_id))
            .await
            .map_err(|err| self.store_error(err))?
            .ok_or_else(|| PipelineError::job_not_found(job_id))
    }

    /// Every job, newest first
    #[instrument(skip(self))]
    pub async fn get_all_jobs(&self) -> Result<Vec<JobRecord>, PipelineError> {
        self.db
            .call(self.deadline(), |conn| jobs::list_records(conn, None))
            .await
            .map_err(|err| self.store_error(err))
    }

    /// Jobs visible to `user_id` acting as `role`, newest first
    #[instrument(skip(self))]
    pub async fn get_jobs_by_role(&self, user_id: UserId, role: Role) -> Result<Vec<JobRecord>, PipelineError> {
        let visibility = access::visibility(role);
        let filter = match visibility {
            Visibility::All => None,
            Visibility::Scoped { assignment, stages } => Some(JobFilter {
                assignment,
                user_id,
                stages: stages.to_vec(),
            }),
        };

        let records = self
            .db
            .call(self.deadline(), move |conn| jobs::list_records(conn, filter.as_ref()))
            .await
            .map_err(|err| self.store_error(err))?;

        debug_assert!(records.iter().all(|r| visibility.includes(user_id, &r.job)));
        debug!(count = records.len(), "Listed jobs for role");
        Ok(records)
    }

    // ========================================================================
    // Users
    // ========================================================================

    /// Resolve the identity context for `user_id`
    pub async fn caller(&self, user_id: UserId) -> Result<Caller, PipelineError> {
        self.get_user(user_id).await.map(|user| user.caller())
    }

    pub async fn get_user(&self, user_id: UserId) -> Result<User, PipelineError> {
        self.db
            .call(self.deadline(), move |conn| users::get_user(conn, user_id))
            .await
            .map_err(|err| self.store_error(err))?
            .ok_or_else(|| PipelineError::NotFound {
                entity: "User",
                id: user_id.to_string(),
            })
    }

    pub async fn list_users(&self) -> Result<Vec<User>, PipelineError> {
        self.db
            .call(self.deadline(), |conn| users::list_users(conn))
            .await
            .map_err(|err| self.store_error(err))
    }

    #[instrument(skip(self, user), fields(username = %user.username, role = %user.role))]
    pub async fn create_user(&self, user: NewUser) -> Result<User, PipelineError> {
        if user.username.trim().is_empty() {
            return Err(PipelineError::Validation("username is required".to_string()));
        }
        let username = user.username.clone();
        let now = self.clock.now();

        self.db
            .transaction(self.deadline(), move |tx| {
                let id = users::insert_user(tx, &user, now)?;
                users::get_user(tx, id)?.ok_or_else(|| DatabaseError::NotFound {
                    entity: "User",
                    id: id.to_string(),
                })
            })
            .await
            .map_err(|err| match err {
                DatabaseError::DuplicateKey(_) => {
                    PipelineError::Validation(format!("username already exists: {username}"))
                }
                other => self.store_error(other),
            })
    }

    // ========================================================================
    // Notifications
    // ========================================================================

    /// Wait for every notification dispatched so far to finish.
    ///
    /// Short-lived callers (the CLI) must drain before the runtime shuts
    /// down, or pending deliveries are dropped.
    pub async fn drain_notifications(&self) {
        let mut pending = std::mem::take(&mut *self.notification_tasks());
        while let Some(joined) = pending.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "Notification task did not finish");
            }
        }
    }

    fn notification_tasks(&self) -> MutexGuard<'_, JoinSet<()>> {
        self.notifications.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn dispatch(&self, event: PipelineEvent) {
        if !self.settings.notifications_enabled {
            return;
        }

        let notifier = Arc::clone(&self.notifier);
        let mut tasks = self.notification_tasks();
        // Reap deliveries that already finished
        while tasks.try_join_next().is_some() {}

        tasks.spawn(async move {
            let (job_id, result) = match event {
                PipelineEvent::JobCreated { job_id, created_by } => {
                    (job_id, notifier.notify_job_creation(job_id, created_by).await)
                }
                PipelineEvent::StageWritten {
                    job_id,
                    stage,
                    user_id,
                } => (
                    job_id,
                    notifier.notify_stage_completion(job_id, stage, user_id).await,
                ),
            };

            if let Err(e) = result {
                warn!(job_id, notifier = notifier.name(), error = %e, "Notification failed");
            }
        });
    }
}

fn referenced_users(job: &NewJob) -> impl Iterator<Item = UserId> {
    [
        Some(job.created_by),
        job.assigned_to_stage2,
        job.assigned_to_stage3,
        job.customer_id,
    ]
    .into_iter()
    .flatten()
}
