//! Timeout Integration Tests
//!
//! Operation deadlines and rollback on expiry.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::Fixture;
use freightline::domain::{CreateJobRequest, Stage, Stage2UpdateRequest};
use freightline::store::Deadline;
use freightline::{EngineSettings, PipelineError, SilentNotifier};

fn settings(timeout_ms: Option<u64>) -> EngineSettings {
    EngineSettings {
        operation_timeout: timeout_ms.map(Duration::from_millis),
        notifications_enabled: false,
    }
}

/// Hold the connection on the blocking pool for `hold`
fn hold_connection(f: &Fixture, hold: Duration) -> tokio::task::JoinHandle<()> {
    let db = f.db().clone();
    tokio::task::spawn_blocking(move || {
        db.with_conn(Deadline::none(), |_| {
            std::thread::sleep(hold);
            Ok(())
        })
        .unwrap();
    })
}

#[test]
fn test_default_timeout() {
    let settings = EngineSettings::default();
    assert_eq!(settings.operation_timeout, Some(Duration::from_millis(5000)));
    assert!(settings.notifications_enabled);
}

#[tokio::test]
async fn test_create_job_times_out_and_writes_nothing() {
    let f = Fixture::with_notifier(Arc::new(SilentNotifier), settings(Some(100))).await;
    let before = f.row_counts().await;

    let holder = hold_connection(&f, Duration::from_millis(400));
    tokio::time::sleep(Duration::from_millis(50)).await;

    let err = f
        .engine
        .create_job(CreateJobRequest::new("SLOW-1"), f.users.admin)
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Timeout { timeout_ms: 100 }));
    assert!(err.is_retryable());

    holder.await.unwrap();
    assert_eq!(f.row_counts().await, before);
}

#[tokio::test]
async fn test_stage_update_times_out_without_advancing() {
    let f = Fixture::with_notifier(Arc::new(SilentNotifier), settings(Some(100))).await;
    let job = f
        .engine
        .create_job(CreateJobRequest::new("SLOW-2"), f.users.admin)
        .await
        .unwrap();

    let holder = hold_connection(&f, Duration::from_millis(400));
    tokio::time::sleep(Duration::from_millis(50)).await;

    let err = f
        .engine
        .update_stage2(job.id(), Stage2UpdateRequest::default(), f.users.admin)
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Timeout { .. }));
    holder.await.unwrap();

    let record = f.engine.get_job_by_id(job.id()).await.unwrap();
    assert_eq!(record.current_stage(), Stage::Stage1);
    assert!(record.stage2.is_none());
    assert_eq!(record.updates.len(), 1);
}

#[tokio::test]
async fn test_disabled_deadline_waits_for_connection() {
    let f = Fixture::with_notifier(Arc::new(SilentNotifier), settings(None)).await;

    let holder = hold_connection(&f, Duration::from_millis(150));
    tokio::time::sleep(Duration::from_millis(30)).await;

    let job = f
        .engine
        .create_job(CreateJobRequest::new("PATIENT"), f.users.admin)
        .await;
    tokio_test::assert_ok!(job);
    holder.await.unwrap();
}
