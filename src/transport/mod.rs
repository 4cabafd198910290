//! CF-016: Dispatch bridge. Runs a composed task remotely or locally.
//!
//! A task goes to the task manager when its matched workers include a
//! remote one and a manager is configured. Any remote failure falls back to
//! a local shell script. The dispatcher holds no mutable state, so one
//! instance can serve many executor threads at once.

pub mod local;
pub mod protocol;
pub mod remote;

use crate::core::freshness::{collect_saved_values, is_up_to_date};
use crate::core::types::{Env, TaskDescriptor};
use crate::core::values;
use remote::ManagerClient;
use std::path::Path;
use tracing::info;

/// Output from executing a task.
#[derive(Debug, Clone)]
pub struct ExecOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// What `run` did with a task.
#[derive(Debug, Clone)]
pub enum RunStatus {
    /// Every freshness check held; nothing ran
    UpToDate,
    Ran(ExecOutput),
}

/// Routes tasks to the task manager or to a local shell.
#[derive(Debug, Clone, Default)]
pub struct Dispatcher {
    manager: Option<ManagerClient>,
}

impl Dispatcher {
    /// Never contacts a task manager.
    pub fn local_only() -> Self {
        Self::default()
    }

    pub fn with_manager(manager: ManagerClient) -> Self {
        Self {
            manager: Some(manager),
        }
    }

    /// Execute `task` and report its exit status and output.
    ///
    /// A non-zero exit is a normal result, not an error. Errors mean the task
    /// could not be started at all.
    pub fn dispatch(&self, task: &TaskDescriptor) -> Result<ExecOutput, String> {
        if let (Some(worker), Some(manager)) = (&task.worker, &self.manager) {
            if !worker.is_local_only() {
                match manager.run_task(task, worker) {
                    Ok(out) => return Ok(out),
                    Err(e) => {
                        info!(task = %task.name, error = %e, "remote dispatch failed; running locally");
                    }
                }
            }
        }

        let env = task
            .worker
            .as_ref()
            .map(|w| w.env.clone())
            .unwrap_or_else(Env::new);
        let script = local::compile_action_script(&env, &task.action_lines());
        local::exec_script(&script)
    }

    /// Dispatch unless up to date, then record the freshness values of a
    /// successful run under `state_dir`.
    pub fn run(&self, task: &TaskDescriptor, state_dir: &Path, force: bool) -> Result<RunStatus, String> {
        let previous = values::load_values(state_dir, &task.name)?;
        if !force && is_up_to_date(task, &previous) {
            return Ok(RunStatus::UpToDate);
        }

        let out = self.dispatch(task)?;
        if out.success() && !task.uptodate.is_empty() {
            values::save_values(state_dir, &task.name, &collect_saved_values(task))?;
        }
        Ok(RunStatus::Ran(out))
    }
}
