//! Role-based access policy.
//!
//! Pure functions of (role, job); nothing here touches storage. Every rule
//! matches on [`Role`] exhaustively, so there is no silent default.
//!
//! | Role            | Listed jobs                 | Stage window | Writes  |
//! |-----------------|-----------------------------|--------------|---------|
//! | admin           | all                         | any          | all     |
//! | subadmin        | all                         | any          | none    |
//! | stage1_employee | created by self             | 1-4          | none    |
//! | stage2_employee | `assigned_to_stage2 = self` | 1-4          | stage 2 |
//! | stage3_employee | `assigned_to_stage3 = self` | 2-4          | stage 3 |
//! | customer        | `customer_id = self`        | 3-4          | stage 4 |

use crate::domain::{Assignment, Caller, PipelineJob, Role, Stage, UserId};

const STAGES_1_TO_4: &[Stage] = &[Stage::Stage1, Stage::Stage2, Stage::Stage3, Stage::Stage4];
const STAGES_2_TO_4: &[Stage] = &[Stage::Stage2, Stage::Stage3, Stage::Stage4];
const STAGES_3_TO_4: &[Stage] = &[Stage::Stage3, Stage::Stage4];

/// Which jobs a role's listing shows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    /// Every job, with every display name
    All,

    /// Jobs tied to the caller through `assignment` whose stage is in
    /// `stages`. The window only hides jobs with nothing to act on yet; the
    /// assignment match is the actual boundary.
    Scoped {
        assignment: Assignment,
        stages: &'static [Stage],
    },
}

impl Visibility {
    /// Whether a job held by `user_id` shows up under this visibility
    pub fn includes(&self, user_id: UserId, job: &PipelineJob) -> bool {
        match *self {
            Visibility::All => true,
            Visibility::Scoped { assignment, stages } => {
                job.assignee(assignment) == Some(user_id) && stages.contains(&job.current_stage)
            }
        }
    }
}

pub fn visibility(role: Role) -> Visibility {
    match role {
        Role::Admin | Role::Subadmin => Visibility::All,
        Role::Stage1Employee => Visibility::Scoped {
            assignment: Assignment::Creator,
            stages: STAGES_1_TO_4,
        },
        Role::Stage2Employee => Visibility::Scoped {
            assignment: Assignment::Stage2,
            stages: STAGES_1_TO_4,
        },
        Role::Stage3Employee => Visibility::Scoped {
            assignment: Assignment::Stage3,
            stages: STAGES_2_TO_4,
        },
        Role::Customer => Visibility::Scoped {
            assignment: Assignment::Customer,
            stages: STAGES_3_TO_4,
        },
    }
}

pub fn can_create_job(role: Role) -> bool {
    match role {
        Role::Admin => true,
        Role::Subadmin
        | Role::Stage1Employee
        | Role::Stage2Employee
        | Role::Stage3Employee
        | Role::Customer => false,
    }
}

/// Unfiltered listing of every job
pub fn can_list_all(role: Role) -> bool {
    match role {
        Role::Admin | Role::Subadmin => true,
        Role::Stage1Employee | Role::Stage2Employee | Role::Stage3Employee | Role::Customer => false,
    }
}

/// Whether `role` may write `stage`'s data at all
pub fn can_edit_stage(role: Role, stage: Stage) -> bool {
    match role {
        Role::Admin => stage != Stage::Completed,
        Role::Stage2Employee => stage == Stage::Stage2,
        Role::Stage3Employee => stage == Stage::Stage3,
        Role::Customer => stage == Stage::Stage4,
        Role::Subadmin | Role::Stage1Employee => false,
    }
}

/// Per-job check for single-job reads and writes.
///
/// Admins always pass. Assignees pass for the job they are assigned to;
/// creators and subadmins do not.
pub fn has_job_access(caller: &Caller, job: &PipelineJob) -> bool {
    let assignment = match caller.role {
        Role::Admin => return true,
        Role::Stage2Employee => Assignment::Stage2,
        Role::Stage3Employee => Assignment::Stage3,
        Role::Customer => Assignment::Customer,
        Role::Subadmin | Role::Stage1Employee => return false,
    };
    job.assignee(assignment) == Some(caller.user_id)
}
