//! Role-checked entry point for front ends.
//!
//! A [`Desk`] binds the engine to one authenticated caller and applies the
//! access policy before every engine call. Credentials are checked
//! upstream; the desk trusts the caller it is given.

use tracing::{debug, warn};

use crate::domain::{
    Caller, CreateJobRequest, JobId, JobRecord, Stage, Stage2UpdateRequest, Stage3UpdateRequest,
    Stage4UpdateRequest, UserId,
};

use super::access;
use super::engine::{PipelineEngine, StageTransition};
use super::error::PipelineError;

#[derive(Clone)]
pub struct Desk {
    engine: PipelineEngine,
    caller: Caller,
}

impl Desk {
    pub fn new(engine: PipelineEngine, caller: Caller) -> Self {
        Self { engine, caller }
    }

    /// Desk for a stored user; the user's admin flag wins over their role
    pub async fn for_user(engine: PipelineEngine, user_id: UserId) -> Result<Self, PipelineError> {
        let caller = engine.caller(user_id).await?;
        Ok(Self::new(engine, caller))
    }

    pub fn caller(&self) -> Caller {
        self.caller
    }

    pub fn engine(&self) -> &PipelineEngine {
        &self.engine
    }

    /// Admin only
    pub async fn create_job(&self, request: CreateJobRequest) -> Result<JobRecord, PipelineError> {
        if !access::can_create_job(self.caller.role) {
            return Err(self.deny("create jobs"));
        }
        if request.job_no.trim().is_empty() {
            return Err(PipelineError::Validation("job_no is required".to_string()));
        }
        self.engine.create_job(request, self.caller.user_id).await
    }

    /// Admin and subadmin only
    pub async fn all_jobs(&self) -> Result<Vec<JobRecord>, PipelineError> {
        if !access::can_list_all(self.caller.role) {
            return Err(self.deny("list all jobs"));
        }
        self.engine.get_all_jobs().await
    }

    /// The caller's own listing
    pub async fn my_jobs(&self) -> Result<Vec<JobRecord>, PipelineError> {
        if self.caller.is_admin() {
            return self.engine.get_all_jobs().await;
        }
        self.engine
            .get_jobs_by_role(self.caller.user_id, self.caller.role)
            .await
    }

    pub async fn job(&self, job_id: JobId) -> Result<JobRecord, PipelineError> {
        let record = self.engine.get_job_by_id(job_id).await?;
        if !access::has_job_access(&self.caller, &record.job) {
            return Err(self.deny(format!("view job {job_id}")));
        }
        Ok(record)
    }

    pub async fn update_stage2(
        &self,
        job_id: JobId,
        request: Stage2UpdateRequest,
    ) -> Result<StageTransition, PipelineError> {
        self.check_stage_write(job_id, Stage::Stage2).await?;
        self.engine
            .update_stage2(job_id, request, self.caller.user_id)
            .await
    }

    pub async fn update_stage3(
        &self,
        job_id: JobId,
        request: Stage3UpdateRequest,
    ) -> Result<StageTransition, PipelineError> {
        self.check_stage_write(job_id, Stage::Stage3).await?;
        self.engine
            .update_stage3(job_id, request, self.caller.user_id)
            .await
    }

    pub async fn update_stage4(
        &self,
        job_id: JobId,
        request: Stage4UpdateRequest,
    ) -> Result<StageTransition, PipelineError> {
        self.check_stage_write(job_id, Stage::Stage4).await?;
        self.engine
            .update_stage4(job_id, request, self.caller.user_id)
            .await
    }

    /// The role must own the stage, the job must exist, and the caller must
    /// hold the job's matching assignment (admins excepted).
    async fn check_stage_write(&self, job_id: JobId, stage: Stage) -> Result<(), PipelineError> {
        if !access::can_edit_stage(self.caller.role, stage) {
            return Err(PipelineError::stage_forbidden(self.caller.role, stage));
        }

        let job = self.engine.get_job(job_id).await?;
        if !access::has_job_access(&self.caller, &job) {
            return Err(self.deny(format!("update {stage} data of job {job_id}")));
        }

        debug!(job_id, %stage, user_id = self.caller.user_id, "Stage write allowed");
        Ok(())
    }

    fn deny(&self, action: impl Into<String>) -> PipelineError {
        let err = PipelineError::forbidden(self.caller.role, action);
        warn!(user_id = self.caller.user_id, error = %err, "Access denied");
        err
    }
}
