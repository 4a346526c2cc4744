//! Typed view of the controller API used by the worker

use async_trait::async_trait;

use rh_core::api::{
    CheckTaskArgs, FetchTaskArgs, FinishTaskArgs, KeepAliveArgs, KeepAliveReply, MarkSyncedArgs,
    OrgAssetsArgs, OrgDomainsArgs, RuntimeLogArgs, ScanResultArgs, TaskCheck,
    VulnerabilityResultArgs,
};
use rh_core::result::{DomainResultMap, IpResultMap};
use rh_core::{RpcError, TaskDescriptor, TaskId, WorkerId};

use super::RpcClient;

/// Controller methods the worker calls
#[async_trait]
pub trait ControllerApi: Send + Sync {
    async fn load_ips(&self, org_id: i64) -> Result<IpResultMap, RpcError>;

    async fn load_domains(&self, org_id: i64) -> Result<DomainResultMap, RpcError>;

    async fn save_scan_result(&self, args: ScanResultArgs) -> Result<String, RpcError>;

    async fn save_vulnerabilities(&self, args: VulnerabilityResultArgs)
        -> Result<String, RpcError>;

    async fn save_runtime_log(&self, args: RuntimeLogArgs) -> Result<String, RpcError>;

    /// Queue a follow-on task, returning its id
    async fn new_task(&self, task: TaskDescriptor) -> Result<String, RpcError>;

    async fn check_task(&self, task_id: &TaskId) -> Result<TaskCheck, RpcError>;

    async fn fetch_task(&self, worker_id: &WorkerId) -> Result<Option<TaskDescriptor>, RpcError>;

    async fn finish_task(&self, args: FinishTaskArgs) -> Result<String, RpcError>;

    async fn keep_alive(&self, args: KeepAliveArgs) -> Result<KeepAliveReply, RpcError>;

    /// Returns false when the flag was raised again after `generation`
    async fn mark_synced(&self, worker_id: &WorkerId, generation: u64) -> Result<bool, RpcError>;
}

#[async_trait]
impl ControllerApi for RpcClient {
    async fn load_ips(&self, org_id: i64) -> Result<IpResultMap, RpcError> {
        self.call(&OrgAssetsArgs { org_id }).await
    }

    async fn load_domains(&self, org_id: i64) -> Result<DomainResultMap, RpcError> {
        self.call(&OrgDomainsArgs { org_id }).await
    }

    async fn save_scan_result(&self, args: ScanResultArgs) -> Result<String, RpcError> {
        self.call(&args).await
    }

    async fn save_vulnerabilities(
        &self,
        args: VulnerabilityResultArgs,
    ) -> Result<String, RpcError> {
        self.call(&args).await
    }

    async fn save_runtime_log(&self, args: RuntimeLogArgs) -> Result<String, RpcError> {
        self.call(&args).await
    }

    async fn new_task(&self, task: TaskDescriptor) -> Result<String, RpcError> {
        self.call(&task).await
    }

    async fn check_task(&self, task_id: &TaskId) -> Result<TaskCheck, RpcError> {
        self.call(&CheckTaskArgs {
            task_id: task_id.clone(),
        })
        .await
    }

    async fn fetch_task(&self, worker_id: &WorkerId) -> Result<Option<TaskDescriptor>, RpcError> {
        self.call(&FetchTaskArgs {
            worker_id: worker_id.clone(),
        })
        .await
    }

    async fn finish_task(&self, args: FinishTaskArgs) -> Result<String, RpcError> {
        self.call(&args).await
    }

    async fn keep_alive(&self, args: KeepAliveArgs) -> Result<KeepAliveReply, RpcError> {
        self.call(&args).await
    }

    async fn mark_synced(
        &self,
        worker_id: &WorkerId,
        generation: u64,
    ) -> Result<bool, RpcError> {
        self.call(&MarkSyncedArgs {
            worker_id: worker_id.clone(),
            generation,
        })
        .await
    }
}
