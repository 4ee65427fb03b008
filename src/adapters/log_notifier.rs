//! Notifier that composes messages and writes them to the log.
//!
//! Email delivery is out of scope; the composed message is emitted as a
//! structured `tracing` event so an operator or a log shipper can act on it.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use super::{Notification, NotificationError, Notifier};
use crate::core::clock::Clock;
use crate::domain::{JobId, Stage, UserId};
use crate::store::{jobs, users, Database, Deadline};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub struct LogNotifier {
    db: Database,
    clock: Arc<dyn Clock>,
    /// Recipient when the job names none
    default_email: String,
}

impl LogNotifier {
    pub fn new(db: Database, clock: Arc<dyn Clock>, default_email: impl Into<String>) -> Self {
        Self {
            db,
            clock,
            default_email: default_email.into(),
        }
    }

    pub async fn compose_job_creation(
        &self,
        job_id: JobId,
        created_by: UserId,
    ) -> Result<Notification, NotificationError> {
        let (job_no, recipient, actor) = self.lookup(job_id, created_by).await?;
        Ok(Notification {
            recipient,
            subject: format!("New Job Created - {job_no}"),
            body: format!(
                "Job {job_no} was created by {actor} at {}.\nNext stage: {}",
                self.clock.now().format(TIMESTAMP_FORMAT),
                Stage::Stage2.display_name(),
            ),
        })
    }

    pub async fn compose_stage_completion(
        &self,
        job_id: JobId,
        stage: Stage,
        completed_by: UserId,
    ) -> Result<Notification, NotificationError> {
        let (job_no, recipient, actor) = self.lookup(job_id, completed_by).await?;
        let next = stage
            .next()
            .map(Stage::display_name)
            .unwrap_or("Job Completed");

        Ok(Notification {
            recipient,
            subject: format!("Stage Completion Notification - Job {job_no}"),
            body: format!(
                "Import/Export Job - {job_no}\n{} completed by {actor} at {}.\nNext stage: {next}",
                stage.display_name(),
                self.clock.now().format(TIMESTAMP_FORMAT),
            ),
        })
    }

    /// Job number, recipient and actor name
    async fn lookup(
        &self,
        job_id: JobId,
        user_id: UserId,
    ) -> Result<(String, String, String), NotificationError> {
        let (job, actor) = self
            .db
            .call(Deadline::none(), move |conn| {
                Ok((jobs::get_job(conn, job_id)?, users::username(conn, user_id)?))
            })
            .await?;

        let job = job.ok_or(NotificationError::JobNotFound(job_id))?;
        let actor = actor.ok_or(NotificationError::UserNotFound(user_id))?;
        let recipient = job
            .notification_email
            .filter(|email| !email.trim().is_empty())
            .unwrap_or_else(|| self.default_email.clone());

        Ok((job.job_no, recipient, actor))
    }

    fn emit(&self, notification: &Notification) {
        info!(
            notifier = self.name(),
            recipient = %notification.recipient,
            subject = %notification.subject,
            "{}",
            notification.body
        );
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &str {
        "log"
    }

    async fn notify_job_creation(&self, job_id: JobId, created_by: UserId) -> Result<(), NotificationError> {
        let notification = self.compose_job_creation(job_id, created_by).await?;
        self.emit(&notification);
        Ok(())
    }

    async fn notify_stage_completion(
        &self,
        job_id: JobId,
        stage: Stage,
        completed_by: UserId,
    ) -> Result<(), NotificationError> {
        let notification = self.compose_stage_completion(job_id, stage, completed_by).await?;
        self.emit(&notification);
        Ok(())
    }
}
