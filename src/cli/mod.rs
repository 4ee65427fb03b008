//! Command-line interface for freightline.
//!
//! Every job and task command acts as the user given by `--as-user`; the
//! identity context (role, admin flag) is resolved from the users table.
//! Results are printed as pretty JSON.

use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::info;

use crate::adapters::LogNotifier;
use crate::config;
use crate::core::{Clock, Desk, PipelineEngine, SystemClock, TaskBoard};
use crate::domain::{
    JobId, NewUser, Role, Stage2UpdateRequest, Stage3UpdateRequest, Stage4UpdateRequest, UserId,
};
use crate::store::Database;

pub mod tasks;

/// freightline - four-stage customs and logistics job pipeline
#[derive(Parser, Debug)]
#[command(name = "freightline")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Act as this user id
    #[arg(long, global = true, env = "FREIGHTLINE_USER")]
    pub as_user: Option<UserId>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the database and the first admin user
    Init {
        /// Also create one demo user per role
        #[arg(long)]
        seed: bool,
    },

    /// List users
    Users,

    /// Open a new job (admin only)
    CreateJob {
        /// JSON request file (reads from stdin if not provided)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Write stage 2, 3 or 4 data for a job
    UpdateStage {
        job_id: JobId,

        /// Stage number
        #[arg(value_parser = clap::value_parser!(u8).range(2..=4))]
        stage: u8,

        /// JSON request file (reads from stdin if not provided)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Show one job with its stage data and history
    Job { job_id: JobId },

    /// List jobs visible to the caller
    Jobs {
        /// Every job (admin and subadmin only)
        #[arg(long)]
        all: bool,
    },

    /// Legacy task board
    Tasks {
        #[command(subcommand)]
        command: tasks::TaskCommands,
    },

    /// Show resolved configuration (debug)
    Config,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Init { seed } => init(seed).await,
            Commands::Users => {
                let engine = open_engine()?;
                print_json(&engine.list_users().await?)
            }
            Commands::CreateJob { file } => {
                let desk = open_desk(self.as_user).await?;
                let record = desk.create_job(read_request(file.as_deref())?).await?;
                desk.engine().drain_notifications().await;
                print_json(&record)
            }
            Commands::UpdateStage {
                job_id,
                stage,
                file,
            } => update_stage(self.as_user, job_id, stage, file.as_deref()).await,
            Commands::Job { job_id } => {
                let desk = open_desk(self.as_user).await?;
                print_json(&desk.job(job_id).await?)
            }
            Commands::Jobs { all } => {
                let desk = open_desk(self.as_user).await?;
                let jobs = if all {
                    desk.all_jobs().await?
                } else {
                    desk.my_jobs().await?
                };
                print_json(&jobs)
            }
            Commands::Tasks { command } => {
                let engine = open_engine()?;
                let caller = engine.caller(require_user(self.as_user)?).await?;
                tasks::execute(&TaskBoard::from_engine(&engine), &caller, command).await
            }
            Commands::Config => show_config(),
        }
    }
}

/// Build the engine from the resolved configuration
pub fn open_engine() -> Result<PipelineEngine> {
    let cfg = config::config()?;
    let db = Database::open(&cfg.database)
        .with_context(|| format!("Failed to open database: {}", cfg.database.display()))?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let notifier = LogNotifier::new(db.clone(), Arc::clone(&clock), cfg.default_email.clone());

    Ok(PipelineEngine::new(
        db,
        Arc::new(notifier),
        clock,
        cfg.engine_settings(),
    ))
}

async fn open_desk(as_user: Option<UserId>) -> Result<Desk> {
    let engine = open_engine()?;
    let user_id = require_user(as_user)?;
    Desk::for_user(engine, user_id)
        .await
        .with_context(|| format!("Failed to resolve user {user_id}"))
}

fn require_user(as_user: Option<UserId>) -> Result<UserId> {
    as_user.context("No user given. Use --as-user <id> or set FREIGHTLINE_USER")
}

/// Create the admin account on an empty database, optionally one user per role
async fn init(seed: bool) -> Result<()> {
    let engine = open_engine()?;

    if engine.list_users().await?.is_empty() {
        let admin = engine
            .create_user(NewUser::new("admin", "Administrator", Role::Admin))
            .await?;
        info!(user_id = admin.id, "Created admin user");
    }

    if seed {
        let demo = [
            ("subadmin", "Operations Supervisor", Role::Subadmin),
            ("intake", "Intake Clerk", Role::Stage1Employee),
            ("customs", "Customs Officer", Role::Stage2Employee),
            ("clearance", "Clearance Agent", Role::Stage3Employee),
            ("customer", "Customer", Role::Customer),
        ];
        let existing = engine.list_users().await?;
        for (username, designation, role) in demo {
            if existing.iter().any(|u| u.username == username) {
                continue;
            }
            engine
                .create_user(NewUser::new(username, designation, role))
                .await?;
        }
    }

    eprintln!("Database ready at {}", config::paths::database()?.display());
    print_json(&engine.list_users().await?)
}

async fn update_stage(
    as_user: Option<UserId>,
    job_id: JobId,
    stage: u8,
    file: Option<&Path>,
) -> Result<()> {
    let desk = open_desk(as_user).await?;

    let transition = match stage {
        2 => {
            let request: Stage2UpdateRequest = read_request(file)?;
            desk.update_stage2(job_id, request).await?
        }
        3 => {
            let request: Stage3UpdateRequest = read_request(file)?;
            desk.update_stage3(job_id, request).await?
        }
        4 => {
            let request: Stage4UpdateRequest = read_request(file)?;
            desk.update_stage4(job_id, request).await?
        }
        other => anyhow::bail!("Unknown stage: {other}"),
    };

    desk.engine().drain_notifications().await;
    print_json(&transition)
}

/// Read a JSON request from `file`, or from stdin
pub(crate) fn read_request<T: DeserializeOwned>(file: Option<&Path>) -> Result<T> {
    let input = if let Some(path) = file {
        std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read request file: {}", path.display()))?
    } else {
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .context("Failed to read from stdin")?;
        buffer
    };

    if input.trim().is_empty() {
        anyhow::bail!("Request is empty");
    }

    serde_json::from_str(&input).context("Failed to parse request JSON")
}

pub(crate) fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{json}");
    Ok(())
}

/// Show the resolved configuration (for debugging)
fn show_config() -> Result<()> {
    let cfg = config::config()?;

    println!("freightline configuration");
    println!();
    println!(
        "Config file: {}",
        cfg.config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!();
    println!("Paths:");
    println!("  Home:     {}", cfg.home.display());
    println!("  Database: {}", cfg.database.display());
    println!();
    println!("Engine:");
    match cfg.operation_timeout() {
        Some(timeout) => println!("  Operation timeout: {}ms", timeout.as_millis()),
        None => println!("  Operation timeout: (disabled)"),
    }
    println!();
    println!("Notifications:");
    println!("  Enabled:       {}", cfg.notifications_enabled);
    println!("  Default email: {}", cfg.default_email);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::CreateJobRequest;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_update_stage_rejects_stage_one() {
        let result = Cli::try_parse_from(["freightline", "update-stage", "7", "1"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_global_user_flag() {
        let cli = Cli::try_parse_from(["freightline", "jobs", "--all", "--as-user", "3"]).unwrap();
        assert_eq!(cli.as_user, Some(3));
        assert!(matches!(cli.command, Commands::Jobs { all: true }));
    }

    #[test]
    fn test_read_request_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"job_no": "JOB100", "consignee": "Acme"}}"#).unwrap();

        let request: CreateJobRequest = read_request(Some(file.path())).unwrap();
        assert_eq!(request.job_no, "JOB100");
        assert_eq!(request.consignee, "Acme");
    }

    #[test]
    fn test_empty_request_is_an_error() {
        let file = NamedTempFile::new().unwrap();
        let result: Result<CreateJobRequest> = read_request(Some(file.path()));
        assert!(result.is_err());
    }
}
