//! The pipeline job ledger.
//!
//! A job is the aggregate root: stage data, containers and the audit
//! trail all hang off it and are deleted with it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::stages::{Stage1Data, Stage2Data, Stage3Container, Stage3Data, Stage4Data};
use super::updates::JobUpdate;

pub type JobId = i64;
pub type UserId = i64;

/// Ordered lifecycle position of a job.
///
/// Variant order is the pipeline order, so `Ord` compares progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Stage1,
    Stage2,
    Stage3,
    Stage4,
    Completed,
}

impl Stage {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "stage1" => Some(Self::Stage1),
            "stage2" => Some(Self::Stage2),
            "stage3" => Some(Self::Stage3),
            "stage4" => Some(Self::Stage4),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stage1 => "stage1",
            Self::Stage2 => "stage2",
            Self::Stage3 => "stage3",
            Self::Stage4 => "stage4",
            Self::Completed => "completed",
        }
    }

    /// Human-readable name used in notifications
    pub fn display_name(self) -> &'static str {
        match self {
            Self::Stage1 => "Stage 1 - Initial Setup",
            Self::Stage2 => "Stage 2 - Customs & Documentation",
            Self::Stage3 => "Stage 3 - Clearance & Logistics",
            Self::Stage4 => "Stage 4 - Billing & Completion",
            Self::Completed => "Completed",
        }
    }

    /// The stage that follows this one, `None` once completed
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Stage1 => Some(Self::Stage2),
            Self::Stage2 => Some(Self::Stage3),
            Self::Stage3 => Some(Self::Stage4),
            Self::Stage4 => Some(Self::Completed),
            Self::Completed => None,
        }
    }

    /// Whether a job sitting at `self` has reached `other`
    pub fn has_reached(self, other: Stage) -> bool {
        self >= other
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Administrative status, independent of stage progress
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Active,
    OnHold,
    Completed,
    Cancelled,
}

impl JobStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "on_hold" => Some(Self::OnHold),
            "completed" => Some(Self::Completed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::OnHold => "on_hold",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl Default for JobStatus {
    fn default() -> Self {
        Self::Active
    }
}

/// A row of the job ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineJob {
    pub id: JobId,

    /// Unique human key
    pub job_no: String,

    pub current_stage: Stage,
    pub status: JobStatus,

    pub created_by: UserId,
    pub assigned_to_stage2: Option<UserId>,
    pub assigned_to_stage3: Option<UserId>,
    pub customer_id: Option<UserId>,

    /// Recipient for notifications about this job (falls back to the
    /// configured default)
    pub notification_email: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The user reference on a job that ties it to someone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Assignment {
    Creator,
    Stage2,
    Stage3,
    Customer,
}

impl PipelineJob {
    /// The user holding `assignment` on this job, if any
    pub fn assignee(&self, assignment: Assignment) -> Option<UserId> {
        match assignment {
            Assignment::Creator => Some(self.created_by),
            Assignment::Stage2 => self.assigned_to_stage2,
            Assignment::Stage3 => self.assigned_to_stage3,
            Assignment::Customer => self.customer_id,
        }
    }
}

/// A fully hydrated job as returned to callers.
///
/// Stage data is present only once the job has reached that stage, and
/// even then may be missing; consumers must handle partial records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    #[serde(flatten)]
    pub job: PipelineJob,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage1: Option<Stage1Data>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage2: Option<Stage2Data>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage3: Option<Stage3Data>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stage3_containers: Vec<Stage3Container>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage4: Option<Stage4Data>,

    /// Audit trail, newest first
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub updates: Vec<JobUpdate>,

    pub created_by_user: Option<String>,
    pub stage2_user_name: Option<String>,
    pub stage3_user_name: Option<String>,
    pub customer_name: Option<String>,
}

impl JobRecord {
    /// Wrap a bare ledger row with no stage data loaded yet
    pub fn new(job: PipelineJob) -> Self {
        Self {
            job,
            stage1: None,
            stage2: None,
            stage3: None,
            stage3_containers: Vec::new(),
            stage4: None,
            updates: Vec::new(),
            created_by_user: None,
            stage2_user_name: None,
            stage3_user_name: None,
            customer_name: None,
        }
    }

    pub fn id(&self) -> JobId {
        self.job.id
    }

    pub fn current_stage(&self) -> Stage {
        self.job.current_stage
    }
}

/// Which stage's data an update writes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageUpdate {
    Stage2,
    Stage3,
    /// `acknowledged` is true when the request carries an acknowledge date
    Stage4 { acknowledged: bool },
}

impl StageUpdate {
    /// The stage whose data this update writes
    pub fn stage(self) -> Stage {
        match self {
            Self::Stage2 => Stage::Stage2,
            Self::Stage3 => Stage::Stage3,
            Self::Stage4 { .. } => Stage::Stage4,
        }
    }
}

/// Stage a job moves to after a stage update is written.
///
/// Stages 2 and 3 only advance a job that has not reached them yet, so a
/// correction to earlier data never moves progress backwards. Stage 4 is
/// unconditional: it always lands on `stage4`, or `completed` once
/// acknowledged.
pub fn stage_after_update(current: Stage, update: StageUpdate) -> Stage {
    match update {
        StageUpdate::Stage2 | StageUpdate::Stage3 => {
            let target = update.stage();
            if current < target {
                target
            } else {
                current
            }
        }
        StageUpdate::Stage4 { acknowledged: true } => Stage::Completed,
        StageUpdate::Stage4 { acknowledged: false } => Stage::Stage4,
    }
}
