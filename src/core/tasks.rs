//! Legacy task board.
//!
//! Independent of the pipeline: tasks reference jobs only by a free-text
//! job number and have no stage coupling.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, instrument};

use crate::domain::{Caller, NewTask, Task, TaskId, TaskStatus, TaskSummary, TaskUpdate};
use crate::store::{tasks, users, Database, DatabaseError, Deadline};

use super::clock::Clock;
use super::engine::PipelineEngine;
use super::error::PipelineError;

#[derive(Clone)]
pub struct TaskBoard {
    db: Database,
    clock: Arc<dyn Clock>,
    timeout: Option<Duration>,
}

impl TaskBoard {
    pub fn new(db: Database, clock: Arc<dyn Clock>, timeout: Option<Duration>) -> Self {
        Self { db, clock, timeout }
    }

    /// Board sharing the engine's database, clock and deadline
    pub fn from_engine(engine: &PipelineEngine) -> Self {
        Self::new(
            engine.database().clone(),
            engine.clock(),
            engine.settings().operation_timeout,
        )
    }

    fn deadline(&self) -> Deadline {
        self.timeout.map_or_else(Deadline::none, Deadline::after)
    }

    fn store_error(&self, err: DatabaseError) -> PipelineError {
        PipelineError::from_store(err, self.timeout.map_or(0, |t| t.as_millis() as u64))
    }

    /// Admin only. The task and every assignment are written together.
    #[instrument(skip(self, task), fields(user_id = caller.user_id, job_id = %task.job_id))]
    pub async fn create_task(&self, caller: &Caller, task: NewTask) -> Result<Task, PipelineError> {
        if !caller.is_admin() {
            return Err(PipelineError::forbidden(caller.role, "create tasks"));
        }
        if task.job_id.trim().is_empty() || task.description.trim().is_empty() {
            return Err(PipelineError::Validation(
                "job_id and description are required".to_string(),
            ));
        }

        let now = self.clock.now();
        let created = self
            .db
            .transaction(self.deadline(), move |tx| {
                for &user_id in &task.assigned_to {
                    if users::username(tx, user_id)?.is_none() {
                        return Err(DatabaseError::NotFound {
                            entity: "User",
                            id: user_id.to_string(),
                        });
                    }
                }
                let id = tasks::insert_task(tx, &task, now)?;
                tasks::get_task(tx, id)?.ok_or_else(|| DatabaseError::NotFound {
                    entity: "Task",
                    id: id.to_string(),
                })
            })
            .await
            .map_err(|err| self.store_error(err))?;

        info!(task_id = created.id, "Task created");
        Ok(created)
    }

    /// Admin only
    pub async fn all_tasks(&self, caller: &Caller) -> Result<Vec<TaskSummary>, PipelineError> {
        if !caller.is_admin() {
            return Err(PipelineError::forbidden(caller.role, "list all tasks"));
        }
        self.db
            .call(self.deadline(), |conn| tasks::list_tasks(conn))
            .await
            .map_err(|err| self.store_error(err))
    }

    /// Tasks assigned to the caller, with the caller's own latest status
    pub async fn my_tasks(&self, caller: &Caller) -> Result<Vec<TaskSummary>, PipelineError> {
        let user_id = caller.user_id;
        self.db
            .call(self.deadline(), move |conn| tasks::list_for_user(conn, user_id))
            .await
            .map_err(|err| self.store_error(err))
    }

    pub async fn task(&self, task_id: TaskId) -> Result<Task, PipelineError> {
        self.db
            .call(self.deadline(), move |conn| tasks::get_task(conn, task_id))
            .await
            .map_err(|err| self.store_error(err))?
            .ok_or_else(|| PipelineError::NotFound {
                entity: "Task",
                id: task_id.to_string(),
            })
    }

    pub async fn history(&self, task_id: TaskId) -> Result<Vec<TaskUpdate>, PipelineError> {
        self.db
            .call(self.deadline(), move |conn| tasks::list_updates(conn, task_id))
            .await
            .map_err(|err| self.store_error(err))
    }

    /// Assignees post for themselves; admins may post on any task
    #[instrument(skip(self, comment), fields(user_id = caller.user_id))]
    pub async fn post_update(
        &self,
        caller: &Caller,
        task_id: TaskId,
        status: TaskStatus,
        comment: Option<String>,
    ) -> Result<(), PipelineError> {
        let caller = *caller;
        let now = self.clock.now();

        self.db
            .transaction(self.deadline(), move |tx| {
                if tasks::get_task(tx, task_id)?.is_none() {
                    return Err(DatabaseError::NotFound {
                        entity: "Task",
                        id: task_id.to_string(),
                    });
                }
                if !caller.is_admin() && !tasks::is_assigned(tx, task_id, caller.user_id)? {
                    return Ok(false);
                }
                let comment = comment.as_deref().filter(|c| !c.trim().is_empty());
                tasks::append_update(tx, task_id, caller.user_id, status, comment, now)?;
                Ok(true)
            })
            .await
            .map_err(|err| self.store_error(err))
            .and_then(|posted| {
                if posted {
                    Ok(())
                } else {
                    Err(PipelineError::forbidden(
                        caller.role,
                        format!("update task {task_id}"),
                    ))
                }
            })
    }

    /// Admin only; assignments and updates go with the task
    pub async fn delete_task(&self, caller: &Caller, task_id: TaskId) -> Result<(), PipelineError> {
        if !caller.is_admin() {
            return Err(PipelineError::forbidden(caller.role, "delete tasks"));
        }
        self.db
            .call(self.deadline(), move |conn| tasks::delete_task(conn, task_id))
            .await
            .map_err(|err| self.store_error(err))
    }
}
