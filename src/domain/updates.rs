//! Audit trail entries for pipeline jobs.
//!
//! Every mutating operation appends exactly one entry in the same
//! transaction as its data write. Entries are never updated or deleted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::job::{JobId, Stage, UserId};

/// A single entry in a job's append-only audit log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobUpdate {
    pub id: i64,
    pub job_id: JobId,

    /// Who made the change
    pub user_id: UserId,

    /// Stage the change was made against (never `completed`)
    pub stage: Stage,

    pub update_type: UpdateType,

    /// Human-readable summary
    pub message: String,

    pub old_value: Option<String>,
    pub new_value: Option<String>,

    pub created_at: DateTime<Utc>,
}

/// Kind of change an audit entry records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateType {
    StatusChange,
    DataUpdate,
    Comment,
    StageCompletion,
    FileUpload,
}

impl UpdateType {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "status_change" => Some(Self::StatusChange),
            "data_update" => Some(Self::DataUpdate),
            "comment" => Some(Self::Comment),
            "stage_completion" => Some(Self::StageCompletion),
            "file_upload" => Some(Self::FileUpload),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::StatusChange => "status_change",
            Self::DataUpdate => "data_update",
            Self::Comment => "comment",
            Self::StageCompletion => "stage_completion",
            Self::FileUpload => "file_upload",
        }
    }
}

/// An audit entry that has not been written yet
#[derive(Debug, Clone, PartialEq)]
pub struct NewJobUpdate {
    pub job_id: JobId,
    pub user_id: UserId,
    pub stage: Stage,
    pub update_type: UpdateType,
    pub message: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
}

impl NewJobUpdate {
    pub fn new(
        job_id: JobId,
        user_id: UserId,
        stage: Stage,
        update_type: UpdateType,
        message: impl Into<String>,
    ) -> Self {
        Self {
            job_id,
            user_id,
            stage,
            update_type,
            message: message.into(),
            old_value: None,
            new_value: None,
        }
    }

    /// Entry written when a job is opened
    pub fn job_created(job_id: JobId, user_id: UserId) -> Self {
        Self::new(job_id, user_id, Stage::Stage1, UpdateType::StatusChange, "Job created")
    }

    /// Entry written for a stage 2/3/4 update.
    ///
    /// An acknowledged stage 4 update reads "Job completed"; when the update
    /// moved the job, the transition is recorded as old/new values.
    pub fn stage_written(
        job_id: JobId,
        user_id: UserId,
        stage: Stage,
        previous: Stage,
        current: Stage,
    ) -> Self {
        let message = if stage == Stage::Stage4 && current == Stage::Completed {
            "Job completed".to_string()
        } else {
            format!("{} data updated", stage_label(stage))
        };

        let entry = Self::new(job_id, user_id, stage, UpdateType::DataUpdate, message);
        if previous != current {
            entry.with_transition(previous, current)
        } else {
            entry
        }
    }

    pub fn with_transition(mut self, from: Stage, to: Stage) -> Self {
        self.old_value = Some(from.as_str().to_string());
        self.new_value = Some(to.as_str().to_string());
        self
    }
}

fn stage_label(stage: Stage) -> &'static str {
    match stage {
        Stage::Stage1 => "Stage 1",
        Stage::Stage2 => "Stage 2",
        Stage::Stage3 => "Stage 3",
        Stage::Stage4 => "Stage 4",
        Stage::Completed => "Completion",
    }
}
