//! Notification adapters.
//!
//! The engine reports job creation and stage completion to a [`Notifier`]
//! after its transaction commits. Delivery is best effort: failures are
//! logged by the caller and never change the outcome of the operation.

pub mod log_notifier;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::domain::{JobId, Stage, UserId};
use crate::store::DatabaseError;

pub use log_notifier::LogNotifier;

/// Errors raised while composing or delivering a notification
#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("Job {0} not found")]
    JobNotFound(JobId),

    #[error("User {0} not found")]
    UserNotFound(UserId),

    #[error("Lookup failed: {0}")]
    Lookup(#[from] DatabaseError),

    #[error("Delivery failed: {0}")]
    Delivery(String),
}

/// A composed message, ready for delivery
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub recipient: String,
    pub subject: String,
    pub body: String,
}

/// Sink for pipeline events
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Human-readable notifier name
    fn name(&self) -> &str;

    /// A new job was opened
    async fn notify_job_creation(&self, job_id: JobId, created_by: UserId) -> Result<(), NotificationError>;

    /// Stage data was written for `stage`
    async fn notify_stage_completion(
        &self,
        job_id: JobId,
        stage: Stage,
        completed_by: UserId,
    ) -> Result<(), NotificationError>;
}

/// Notifier that drops everything, used when notifications are disabled
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentNotifier;

#[async_trait]
impl Notifier for SilentNotifier {
    fn name(&self) -> &str {
        "silent"
    }

    async fn notify_job_creation(&self, _job_id: JobId, _created_by: UserId) -> Result<(), NotificationError> {
        Ok(())
    }

    async fn notify_stage_completion(
        &self,
        _job_id: JobId,
        _stage: Stage,
        _completed_by: UserId,
    ) -> Result<(), NotificationError> {
        Ok(())
    }
}
