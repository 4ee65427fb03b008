//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use tokio::sync::mpsc;

use freightline::core::Clock;
use freightline::domain::{NewUser, Role, Stage, UserId};
use freightline::store::{Database, Deadline};
use freightline::{EngineSettings, NotificationError, Notifier, PipelineEngine};

/// Clock that moves one second forward on every reading
pub struct SteppingClock {
    base: DateTime<Utc>,
    ticks: AtomicI64,
}

impl SteppingClock {
    pub fn new() -> Self {
        Self {
            base: Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap(),
            ticks: AtomicI64::new(0),
        }
    }
}

impl Clock for SteppingClock {
    fn now(&self) -> DateTime<Utc> {
        let tick = self.ticks.fetch_add(1, Ordering::SeqCst);
        self.base + chrono::Duration::seconds(tick)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sent {
    JobCreated { job_id: i64, by: UserId },
    StageCompleted { job_id: i64, stage: Stage, by: UserId },
}

/// Notifier that forwards every call to a channel
pub struct RecordingNotifier {
    tx: mpsc::UnboundedSender<Sent>,
}

impl RecordingNotifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Sent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    fn name(&self) -> &str {
        "recording"
    }

    async fn notify_job_creation(&self, job_id: i64, created_by: UserId) -> Result<(), NotificationError> {
        self.tx
            .send(Sent::JobCreated { job_id, by: created_by })
            .map_err(|e| NotificationError::Delivery(e.to_string()))
    }

    async fn notify_stage_completion(
        &self,
        job_id: i64,
        stage: Stage,
        completed_by: UserId,
    ) -> Result<(), NotificationError> {
        self.tx
            .send(Sent::StageCompleted {
                job_id,
                stage,
                by: completed_by,
            })
            .map_err(|e| NotificationError::Delivery(e.to_string()))
    }
}

/// Notifier whose every delivery fails
pub struct FailingNotifier;

#[async_trait]
impl Notifier for FailingNotifier {
    fn name(&self) -> &str {
        "failing"
    }

    async fn notify_job_creation(&self, _job_id: i64, _created_by: UserId) -> Result<(), NotificationError> {
        Err(NotificationError::Delivery("smtp unreachable".into()))
    }

    async fn notify_stage_completion(
        &self,
        _job_id: i64,
        _stage: Stage,
        _completed_by: UserId,
    ) -> Result<(), NotificationError> {
        Err(NotificationError::Delivery("smtp unreachable".into()))
    }
}

/// User ids seeded by [`Fixture::new`], in insertion order
pub struct Users {
    pub admin: UserId,
    pub stage2: UserId,
    pub stage3: UserId,
    pub customer: UserId,
    pub subadmin: UserId,
    pub intake: UserId,
    pub other_stage2: UserId,
}

pub struct Fixture {
    pub engine: PipelineEngine,
    pub users: Users,
}

impl Fixture {
    pub async fn new() -> Self {
        Self::with_notifier(Arc::new(freightline::SilentNotifier), EngineSettings::default()).await
    }

    pub async fn recording() -> (Self, mpsc::UnboundedReceiver<Sent>) {
        let (notifier, rx) = RecordingNotifier::new();
        (
            Self::with_notifier(Arc::new(notifier), EngineSettings::default()).await,
            rx,
        )
    }

    pub async fn with_notifier(notifier: Arc<dyn Notifier>, settings: EngineSettings) -> Self {
        let db = Database::open_in_memory().unwrap();
        let engine = PipelineEngine::new(db, notifier, Arc::new(SteppingClock::new()), settings);

        let mut ids = Vec::new();
        for (name, role) in [
            ("admin", Role::Admin),
            ("customs", Role::Stage2Employee),
            ("clearance", Role::Stage3Employee),
            ("customer", Role::Customer),
            ("supervisor", Role::Subadmin),
            ("intake", Role::Stage1Employee),
            ("customs2", Role::Stage2Employee),
        ] {
            let user = engine.create_user(NewUser::new(name, name, role)).await.unwrap();
            ids.push(user.id);
        }

        Self {
            engine,
            users: Users {
                admin: ids[0],
                stage2: ids[1],
                stage3: ids[2],
                customer: ids[3],
                subadmin: ids[4],
                intake: ids[5],
                other_stage2: ids[6],
            },
        }
    }

    pub fn db(&self) -> &Database {
        self.engine.database()
    }

    /// Row counts of every job-related table
    pub async fn row_counts(&self) -> Vec<(&'static str, i64)> {
        self.db()
            .call(Deadline::none(), |conn| {
                let mut counts = Vec::new();
                for table in [
                    "pipeline_jobs",
                    "stage1_data",
                    "stage2_data",
                    "stage3_data",
                    "stage3_containers",
                    "stage4_data",
                    "job_updates",
                ] {
                    let n: i64 =
                        conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?;
                    counts.push((table, n));
                }
                Ok(counts)
            })
            .await
            .unwrap()
    }
}

/// Next message from the notifier, failing the test after a second
pub async fn next_sent(rx: &mut mpsc::UnboundedReceiver<Sent>) -> Sent {
    tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("notification not sent in time")
        .expect("notifier channel closed")
}
