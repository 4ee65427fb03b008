//! Legacy task board types.
//!
//! Tasks are plain to-do items, unrelated to the pipeline stages. A task's
//! status is the latest entry in its update log; a task with no updates is
//! `Assigned`.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::job::UserId;

pub type TaskId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

impl Priority {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Low" => Some(Self::Low),
            "Medium" => Some(Self::Medium),
            "High" => Some(Self::High),
            "Critical" => Some(Self::Critical),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
            Self::Critical => "Critical",
        }
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self::Medium
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    Assigned,
    #[serde(rename = "In Progress")]
    InProgress,
    Completed,
    #[serde(rename = "On Hold")]
    OnHold,
    Cancelled,
}

impl TaskStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Assigned" => Some(Self::Assigned),
            "In Progress" => Some(Self::InProgress),
            "Completed" => Some(Self::Completed),
            "On Hold" => Some(Self::OnHold),
            "Cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Assigned => "Assigned",
            Self::InProgress => "In Progress",
            Self::Completed => "Completed",
            Self::OnHold => "On Hold",
            Self::Cancelled => "Cancelled",
        }
    }
}

impl Default for TaskStatus {
    fn default() -> Self {
        Self::Assigned
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    /// Free-form job reference; not linked to the pipeline ledger
    pub job_id: String,
    pub description: String,
    pub priority: Priority,
    pub deadline: NaiveDate,
    pub created_at: DateTime<Utc>,
}

/// A task as listed, with assignee names and current status
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSummary {
    pub id: TaskId,
    pub job_id: String,
    pub description: String,
    pub priority: Priority,
    pub deadline: NaiveDate,
    pub assigned_to: Vec<String>,
    pub status: TaskStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTask {
    pub job_id: String,
    pub description: String,
    #[serde(default)]
    pub priority: Priority,
    pub deadline: NaiveDate,
    #[serde(default)]
    pub assigned_to: Vec<UserId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskUpdate {
    pub id: i64,
    pub task_id: TaskId,
    pub user_id: UserId,
    pub status: TaskStatus,
    pub comment: Option<String>,
    pub updated_at: DateTime<Utc>,
}
