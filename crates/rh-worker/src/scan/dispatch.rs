//! Follow-on task submission

use std::sync::Arc;

use rh_core::{ScanConfig, TaskDescriptor, TaskError};

use crate::rpc::ControllerApi;

/// Turns follow-on configs into tasks queued on the controller
#[derive(Clone)]
pub struct Dispatcher {
    api: Arc<dyn ControllerApi>,
}

impl Dispatcher {
    pub fn new(api: Arc<dyn ControllerApi>) -> Self {
        Self { api }
    }

    /// Queue every follow-on under `parent`, stopping at the first failure
    pub async fn dispatch(
        &self,
        parent: &TaskDescriptor,
        follow_ons: &[ScanConfig],
    ) -> Result<Vec<String>, TaskError> {
        let mut task_ids = Vec::with_capacity(follow_ons.len());
        for config in follow_ons {
            let task = parent
                .follow_on(config)
                .map_err(|e| TaskError::InvalidConfig(e.to_string()))?;
            tracing::debug!(
                parent = %parent.task_id,
                task_type = %task.task_type,
                "Dispatching follow-on {}",
                task.task_id
            );
            let task_id = self.api.new_task(task).await.map_err(|e| {
                tracing::error!(parent = %parent.task_id, "Follow-on dispatch failed: {}", e);
                TaskError::Rpc(e)
            })?;
            task_ids.push(task_id);
        }
        Ok(task_ids)
    }
}
