//! Domain types for the freightline pipeline.
//!
//! This module contains the passive data structures:
//! - Job: the ledger row, its stage and the hydrated view
//! - Stages: per-stage data records and the requests that write them
//! - Updates: the append-only audit trail
//! - Role/User: who is acting
//! - Task: the legacy task board

pub mod fields;
pub mod job;
pub mod role;
pub mod stages;
pub mod task;
pub mod updates;
pub mod user;

// Re-export commonly used types
pub use fields::{ContainerSize, FieldError};
pub use job::{stage_after_update, Assignment, JobId, JobRecord, JobStatus, PipelineJob, Stage, StageUpdate, UserId};
pub use role::{Caller, Role};
pub use stages::{
    ContainerFields, ContainerRequest, CreateJobRequest, Stage1Data, Stage1Fields, Stage2Data,
    Stage2Fields, Stage2UpdateRequest, Stage3Container, Stage3Data, Stage3Fields,
    Stage3UpdateRequest, Stage4Data, Stage4Fields, Stage4UpdateRequest,
};
pub use task::{NewTask, Priority, Task, TaskId, TaskStatus, TaskSummary, TaskUpdate};
pub use updates::{JobUpdate, NewJobUpdate, UpdateType};
pub use user::{NewUser, User};
