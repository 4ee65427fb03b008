//! Access Integration Tests
//!
//! Role-scoped listings and the role-checked desk.

mod common;

use common::Fixture;
use freightline::domain::{
    CreateJobRequest, JobId, NewUser, Role, Stage, Stage2UpdateRequest, Stage3UpdateRequest,
    Stage4UpdateRequest, UserId,
};
use freightline::{Caller, Desk, PipelineError};

impl Fixture {
    async fn job(&self, job_no: &str, stage2: Option<UserId>, stage3: Option<UserId>, customer: Option<UserId>) -> JobId {
        let request = CreateJobRequest {
            assigned_to_stage2: stage2,
            assigned_to_stage3: stage3,
            customer_id: customer,
            ..CreateJobRequest::new(job_no)
        };
        self.engine.create_job(request, self.users.admin).await.unwrap().id()
    }

    async fn desk(&self, user_id: UserId) -> Desk {
        Desk::for_user(self.engine.clone(), user_id).await.unwrap()
    }

    async fn advance_to(&self, job_id: JobId, stage: Stage) {
        let admin = self.users.admin;
        match stage {
            Stage::Stage2 => {
                self.engine
                    .update_stage2(job_id, Stage2UpdateRequest::default(), admin)
                    .await
                    .unwrap();
            }
            Stage::Stage3 => {
                self.engine
                    .update_stage3(job_id, Stage3UpdateRequest::default(), admin)
                    .await
                    .unwrap();
            }
            Stage::Stage4 => {
                self.engine
                    .update_stage4(job_id, Stage4UpdateRequest::default(), admin)
                    .await
                    .unwrap();
            }
            Stage::Completed => {
                let request = Stage4UpdateRequest {
                    acknowledge_date: "2024-05-01".into(),
                    ..Default::default()
                };
                self.engine.update_stage4(job_id, request, admin).await.unwrap();
            }
            Stage::Stage1 => {}
        }
    }
}

fn job_numbers(jobs: &[freightline::JobRecord]) -> Vec<&str> {
    let mut numbers: Vec<_> = jobs.iter().map(|j| j.job.job_no.as_str()).collect();
    numbers.sort_unstable();
    numbers
}

#[tokio::test]
async fn test_stage2_listing_matches_assignment() {
    let f = Fixture::new().await;
    f.job("MINE-1", Some(f.users.stage2), None, None).await;
    let done = f.job("MINE-DONE", Some(f.users.stage2), None, None).await;
    f.job("THEIRS", Some(f.users.other_stage2), None, None).await;
    f.job("NOBODY", None, None, None).await;
    f.advance_to(done, Stage::Completed).await;

    let jobs = f
        .engine
        .get_jobs_by_role(f.users.stage2, Role::Stage2Employee)
        .await
        .unwrap();
    assert_eq!(job_numbers(&jobs), ["MINE-1"]);

    // Only the creator's name is projected in scoped listings
    assert_eq!(jobs[0].created_by_user.as_deref(), Some("admin"));
    assert_eq!(jobs[0].stage2_user_name, None);
    assert!(jobs[0].stage1.is_some());
}

#[tokio::test]
async fn test_stage3_listing_skips_jobs_still_at_stage1() {
    let f = Fixture::new().await;
    f.job("WAITING", None, Some(f.users.stage3), None).await;
    let ready = f.job("READY", None, Some(f.users.stage3), None).await;
    f.advance_to(ready, Stage::Stage2).await;

    let jobs = f
        .engine
        .get_jobs_by_role(f.users.stage3, Role::Stage3Employee)
        .await
        .unwrap();
    assert_eq!(job_numbers(&jobs), ["READY"]);
}

#[tokio::test]
async fn test_customer_sees_stage3_and_stage4_only() {
    let f = Fixture::new().await;
    f.job("EARLY", None, None, Some(f.users.customer)).await;
    let clearing = f.job("CLEARING", None, None, Some(f.users.customer)).await;
    let billing = f.job("BILLING", None, None, Some(f.users.customer)).await;
    f.advance_to(clearing, Stage::Stage3).await;
    f.advance_to(billing, Stage::Stage4).await;

    let jobs = f
        .engine
        .get_jobs_by_role(f.users.customer, Role::Customer)
        .await
        .unwrap();
    assert_eq!(job_numbers(&jobs), ["BILLING", "CLEARING"]);
}

#[tokio::test]
async fn test_stage1_employee_sees_own_jobs() {
    let f = Fixture::new().await;
    f.engine
        .create_job(CreateJobRequest::new("INTAKE-1"), f.users.intake)
        .await
        .unwrap();
    f.job("ADMIN-1", None, None, None).await;

    let jobs = f
        .engine
        .get_jobs_by_role(f.users.intake, Role::Stage1Employee)
        .await
        .unwrap();
    assert_eq!(job_numbers(&jobs), ["INTAKE-1"]);
}

#[tokio::test]
async fn test_admin_and_subadmin_list_everything() {
    let f = Fixture::new().await;
    let done = f.job("DONE", None, None, None).await;
    f.job("OPEN", None, None, None).await;
    f.advance_to(done, Stage::Completed).await;

    for (user, role) in [(f.users.admin, Role::Admin), (f.users.subadmin, Role::Subadmin)] {
        let jobs = f.engine.get_jobs_by_role(user, role).await.unwrap();
        assert_eq!(job_numbers(&jobs), ["DONE", "OPEN"]);
    }

    let desk = f.desk(f.users.subadmin).await;
    assert_eq!(desk.all_jobs().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_only_admin_creates_jobs() {
    let f = Fixture::new().await;
    for user in [f.users.subadmin, f.users.intake, f.users.stage2, f.users.customer] {
        let err = f
            .desk(user)
            .await
            .create_job(CreateJobRequest::new("NOPE"))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Forbidden { .. }));
    }
    assert!(f.engine.get_all_jobs().await.unwrap().is_empty());

    let err = f
        .desk(f.users.admin)
        .await
        .create_job(CreateJobRequest::new(""))
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Validation(_)));
}

#[tokio::test]
async fn test_employees_cannot_list_all() {
    let f = Fixture::new().await;
    for user in [f.users.stage2, f.users.stage3, f.users.customer, f.users.intake] {
        let err = f.desk(user).await.all_jobs().await.unwrap_err();
        assert!(matches!(err, PipelineError::Forbidden { .. }));
    }
}

#[tokio::test]
async fn test_stage_writes_need_matching_role() {
    let f = Fixture::new().await;
    let job = f
        .job("JOB1", Some(f.users.stage2), Some(f.users.stage3), Some(f.users.customer))
        .await;

    let customer = f.desk(f.users.customer).await;
    let err = customer
        .update_stage2(job, Stage2UpdateRequest::default())
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Forbidden { role: Role::Customer, .. }));

    let subadmin = f.desk(f.users.subadmin).await;
    let err = subadmin
        .update_stage4(job, Stage4UpdateRequest::default())
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Forbidden { .. }));

    let t = f
        .desk(f.users.stage3)
        .await
        .update_stage3(job, Stage3UpdateRequest::default())
        .await
        .unwrap();
    assert_eq!(t.current, Stage::Stage3);

    let t = customer
        .update_stage4(job, Stage4UpdateRequest::default())
        .await
        .unwrap();
    assert_eq!(t.current, Stage::Stage4);
}

#[tokio::test]
async fn test_stage_write_needs_assignment() {
    let f = Fixture::new().await;
    let job = f.job("JOB2", Some(f.users.stage2), None, None).await;

    let err = f
        .desk(f.users.other_stage2)
        .await
        .update_stage2(job, Stage2UpdateRequest::default())
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Forbidden { .. }));

    let record = f.engine.get_job_by_id(job).await.unwrap();
    assert_eq!(record.current_stage(), Stage::Stage1);
    assert_eq!(record.updates.len(), 1);
}

#[tokio::test]
async fn test_stage_write_to_missing_job_is_not_found() {
    let f = Fixture::new().await;
    let err = f
        .desk(f.users.stage2)
        .await
        .update_stage2(404, Stage2UpdateRequest::default())
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::NotFound { entity: "Job", .. }));
}

#[tokio::test]
async fn test_single_job_fetch_checks_assignment() {
    let f = Fixture::new().await;
    let job = f.job("JOB3", None, None, Some(f.users.customer)).await;

    let record = f.desk(f.users.customer).await.job(job).await.unwrap();
    assert_eq!(record.id(), job);

    for user in [f.users.stage2, f.users.subadmin] {
        let err = f.desk(user).await.job(job).await.unwrap_err();
        assert!(matches!(err, PipelineError::Forbidden { .. }));
    }

    let err = f.desk(f.users.admin).await.job(999).await.unwrap_err();
    assert!(matches!(err, PipelineError::NotFound { .. }));
}

#[tokio::test]
async fn test_admin_flag_overrides_role() {
    let f = Fixture::new().await;
    let boss = f
        .engine
        .create_user(NewUser {
            is_admin: true,
            ..NewUser::new("boss", "Director", Role::Stage2Employee)
        })
        .await
        .unwrap();

    let desk = f.desk(boss.id).await;
    assert_eq!(desk.caller(), Caller::new(boss.id, Role::Admin));

    let job = desk.create_job(CreateJobRequest::new("BOSS-1")).await.unwrap();
    assert_eq!(desk.my_jobs().await.unwrap().len(), 1);
    desk.update_stage3(job.id(), Stage3UpdateRequest::default())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_unknown_user_has_no_desk() {
    let f = Fixture::new().await;
    let err = Desk::for_user(f.engine.clone(), 4242).await.err().unwrap();
    assert!(matches!(err, PipelineError::NotFound { entity: "User", .. }));
}
