//! Task board subcommands.

use std::path::PathBuf;

use anyhow::Result;
use clap::Subcommand;

use crate::core::TaskBoard;
use crate::domain::{Caller, NewTask, TaskId, TaskStatus};

use super::{print_json, read_request};

#[derive(Subcommand, Debug)]
pub enum TaskCommands {
    /// Create a task from a JSON file (admin only)
    Create {
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// List every task (admin only)
    List,

    /// List tasks assigned to the caller
    Mine,

    /// Show a task and its update history
    Show { task_id: TaskId },

    /// Post a status update
    Update {
        task_id: TaskId,

        /// Assigned, In Progress, Completed, On Hold or Cancelled
        #[arg(short, long, value_parser = parse_status)]
        status: TaskStatus,

        #[arg(short, long)]
        comment: Option<String>,
    },

    /// Delete a task (admin only)
    Delete { task_id: TaskId },
}

fn parse_status(s: &str) -> Result<TaskStatus, String> {
    TaskStatus::parse(s).ok_or_else(|| format!("unknown task status: {s}"))
}

pub async fn execute(board: &TaskBoard, caller: &Caller, command: TaskCommands) -> Result<()> {
    match command {
        TaskCommands::Create { file } => {
            let task: NewTask = read_request(file.as_deref())?;
            print_json(&board.create_task(caller, task).await?)
        }
        TaskCommands::List => print_json(&board.all_tasks(caller).await?),
        TaskCommands::Mine => print_json(&board.my_tasks(caller).await?),
        TaskCommands::Show { task_id } => {
            let task = board.task(task_id).await?;
            let history = board.history(task_id).await?;
            print_json(&serde_json::json!({ "task": task, "updates": history }))
        }
        TaskCommands::Update {
            task_id,
            status,
            comment,
        } => {
            board.post_update(caller, task_id, status, comment).await?;
            eprintln!("Task {task_id} marked {}", status.as_str());
            Ok(())
        }
        TaskCommands::Delete { task_id } => {
            board.delete_task(caller, task_id).await?;
            eprintln!("Task {task_id} deleted");
            Ok(())
        }
    }
}
