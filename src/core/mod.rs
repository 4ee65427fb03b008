//! Core pipeline logic.
//!
//! This module contains:
//! - PipelineEngine: transactional job creation, stage writes and reads
//! - Desk: the engine bound to one caller, with access checks
//! - Access: the role policy
//! - TaskBoard: the legacy task list

pub mod access;
pub mod clock;
pub mod desk;
pub mod engine;
pub mod error;
pub mod tasks;

// Re-export commonly used types
pub use access::Visibility;
pub use clock::{Clock, SystemClock};
pub use desk::Desk;
pub use engine::{EngineSettings, PipelineEngine, StageTransition, DEFAULT_OPERATION_TIMEOUT};
pub use error::PipelineError;
pub use tasks::TaskBoard;
