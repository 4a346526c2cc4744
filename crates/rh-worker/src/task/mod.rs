//! Task lifecycle
//!
//! Every task goes through the same steps: ask the controller whether it is
//! still runnable, decode its config, run the phase, queue the follow-ons and
//! report how it went. The status check is the only point where a task can be
//! cancelled.

mod intake;

use std::sync::Arc;

use rh_core::api::FinishTaskArgs;
use rh_core::{RpcError, TaskDescriptor, TaskError, WorkerId};

use crate::rpc::ControllerApi;
use crate::scan::{Dispatcher, ScanOrchestrator};

pub use intake::{run_intake, IntakeContext};

/// Outcome of one task
#[derive(Debug)]
pub struct TaskReport {
    /// Summary on success, error message on failure, the controller's
    /// message when the task was skipped
    pub result: String,
    pub error: Option<TaskError>,
    /// The controller said the task should not run
    pub skipped: bool,
}

impl TaskReport {
    pub fn succeeded(result: impl Into<String>) -> Self {
        Self {
            result: result.into(),
            error: None,
            skipped: false,
        }
    }

    pub fn failed(error: TaskError) -> Self {
        Self {
            result: error.to_string(),
            error: Some(error),
            skipped: false,
        }
    }

    pub fn skipped(message: impl Into<String>) -> Self {
        Self {
            result: message.into(),
            error: None,
            skipped: true,
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Runs tasks end to end
#[derive(Clone)]
pub struct TaskRunner {
    api: Arc<dyn ControllerApi>,
    orchestrator: ScanOrchestrator,
    dispatcher: Dispatcher,
}

impl TaskRunner {
    pub fn new(
        api: Arc<dyn ControllerApi>,
        orchestrator: ScanOrchestrator,
        dispatcher: Dispatcher,
    ) -> Self {
        Self {
            api,
            orchestrator,
            dispatcher,
        }
    }

    /// Run one task without reporting it
    pub async fn execute(&self, task: &TaskDescriptor) -> TaskReport {
        let check = match self.api.check_task(&task.task_id).await {
            Ok(check) => check,
            Err(e) => {
                tracing::error!(task_id = %task.task_id, "Status check failed: {}", e);
                return TaskReport::failed(e.into());
            }
        };
        if !check.runnable {
            tracing::info!(task_id = %task.task_id, "Skipping task: {}", check.message);
            return TaskReport::skipped(check.message);
        }

        let config = match task.decode_config() {
            Ok(config) => config,
            Err(e) => {
                tracing::error!(
                    task_id = %task.task_id,
                    task_type = %task.task_type,
                    "{}",
                    e
                );
                return TaskReport::failed(e);
            }
        };

        tracing::info!(task_id = %task.task_id, task_type = %task.task_type, "Running task");
        let outcome = match self.orchestrator.run(task, config).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(task_id = %task.task_id, "Task failed: {}", e);
                return TaskReport::failed(e);
            }
        };

        if let Err(e) = self.dispatcher.dispatch(task, &outcome.follow_ons).await {
            return TaskReport::failed(e);
        }
        if !outcome.follow_ons.is_empty() {
            tracing::info!(
                task_id = %task.task_id,
                "Queued {} follow-on tasks",
                outcome.follow_ons.len()
            );
        }

        TaskReport::succeeded(outcome.summary)
    }

    /// Run one task and report the outcome to the controller
    ///
    /// Skipped tasks are not reported: the controller already knows why.
    pub async fn execute_and_finish(
        &self,
        task: &TaskDescriptor,
        worker_id: &WorkerId,
    ) -> Result<TaskReport, RpcError> {
        let report = self.execute(task).await;
        if report.skipped {
            return Ok(report);
        }

        let args = FinishTaskArgs {
            task_id: task.task_id.clone(),
            worker_id: worker_id.clone(),
            result: report.result.clone(),
            error: report.error.as_ref().map(ToString::to_string),
        };
        self.api.finish_task(args).await?;
        Ok(report)
    }
}
