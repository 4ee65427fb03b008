//! freightline - four-stage customs and logistics job pipeline
//!
//! Administrators open import/export jobs that move through four
//! data-entry stages, each owned by a different role:
//!
//! 1. Initial setup (admin)
//! 2. Customs and documentation (stage 2 employee)
//! 3. Clearance and logistics (stage 3 employee, with containers)
//! 4. Billing and completion (customer)
//!
//! # Architecture
//!
//! - Every mutation is one SQLite transaction: ledger row, stage data and
//!   the audit entry commit together or not at all
//! - Writing a stage's data advances the job to the next stage; writing
//!   stage 4 with an acknowledge date completes it
//! - Reads are scoped by role and assignment
//!
//! # Modules
//!
//! - `adapters`: Notification sinks
//! - `core`: Engine, access policy, role-checked desk, task board
//! - `domain`: Jobs, stages, users, roles, tasks
//! - `store`: SQLite persistence and migrations
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! freightline init --seed
//! freightline --as-user 1 create-job --file job.json
//! freightline --as-user 4 update-stage 1 2 --file customs.json
//! freightline --as-user 1 jobs --all
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod store;

// Re-export main types at crate root for convenience
pub use crate::adapters::{LogNotifier, NotificationError, Notifier, SilentNotifier};
pub use crate::core::{Desk, EngineSettings, PipelineEngine, PipelineError, StageTransition, TaskBoard};
pub use crate::domain::{Caller, JobRecord, JobStatus, PipelineJob, Role, Stage};
pub use crate::store::{Database, DatabaseError};
