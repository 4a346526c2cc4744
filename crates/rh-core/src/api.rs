//! RPC method catalogue shared by the controller and the workers
//!
//! Each request type implements [`RpcRequest`], tying it to its method name
//! and response type. Bodies travel as JSON inside `Call`/`Reply` frames.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::result::{DomainResultMap, IpResultMap, VulnerabilityFinding};
use crate::task::{Scope, TaskDescriptor};
use crate::types::{TaskId, WorkerId};

/// Methods registered on the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RpcMethod {
    LoadIpByOrgId,
    LoadDomainByOrgId,
    SaveScanResult,
    SaveVulnerabilityResult,
    SaveRuntimeLog,
    NewTask,
    CheckTask,
    FetchTask,
    FinishTask,
    KeepAlive,
    MarkSynced,
}

impl RpcMethod {
    /// Every method
    pub const ALL: [RpcMethod; 11] = [
        RpcMethod::LoadIpByOrgId,
        RpcMethod::LoadDomainByOrgId,
        RpcMethod::SaveScanResult,
        RpcMethod::SaveVulnerabilityResult,
        RpcMethod::SaveRuntimeLog,
        RpcMethod::NewTask,
        RpcMethod::CheckTask,
        RpcMethod::FetchTask,
        RpcMethod::FinishTask,
        RpcMethod::KeepAlive,
        RpcMethod::MarkSynced,
    ];

    /// Name carried in the `Call` frame
    pub fn as_str(&self) -> &'static str {
        match self {
            RpcMethod::LoadIpByOrgId => "LoadIpByOrgId",
            RpcMethod::LoadDomainByOrgId => "LoadDomainByOrgId",
            RpcMethod::SaveScanResult => "SaveScanResult",
            RpcMethod::SaveVulnerabilityResult => "SaveVulnerabilityResult",
            RpcMethod::SaveRuntimeLog => "SaveRuntimeLog",
            RpcMethod::NewTask => "NewTask",
            RpcMethod::CheckTask => "CheckTask",
            RpcMethod::FetchTask => "FetchTask",
            RpcMethod::FinishTask => "FinishTask",
            RpcMethod::KeepAlive => "KeepAlive",
            RpcMethod::MarkSynced => "MarkSynced",
        }
    }

    /// Look up a method by name
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.as_str() == name)
    }
}

impl fmt::Display for RpcMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed request bound to one method
pub trait RpcRequest: Serialize + DeserializeOwned + Send + Sync {
    /// Method the request is sent to
    const METHOD: RpcMethod;
    /// Reply body type
    type Response: Serialize + DeserializeOwned + Send;
}

/// Load the stored IP assets of an organization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrgAssetsArgs {
    pub org_id: i64,
}

/// Load the stored domains of an organization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrgDomainsArgs {
    pub org_id: i64,
}

impl RpcRequest for OrgAssetsArgs {
    const METHOD: RpcMethod = RpcMethod::LoadIpByOrgId;
    type Response = IpResultMap;
}

impl RpcRequest for OrgDomainsArgs {
    const METHOD: RpcMethod = RpcMethod::LoadDomainByOrgId;
    type Response = DomainResultMap;
}

/// Persist IP and/or domain results of a task
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanResultArgs {
    pub task_id: TaskId,
    pub main_task_id: TaskId,
    pub scope: Scope,
    #[serde(skip_serializing_if = "IpResultMap::is_empty")]
    pub ip_results: IpResultMap,
    #[serde(skip_serializing_if = "DomainResultMap::is_empty")]
    pub domain_results: DomainResultMap,
}

impl RpcRequest for ScanResultArgs {
    const METHOD: RpcMethod = RpcMethod::SaveScanResult;
    type Response = String;
}

/// Persist the findings of any proof-of-concept engine
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VulnerabilityResultArgs {
    pub task_id: TaskId,
    pub main_task_id: TaskId,
    pub findings: Vec<VulnerabilityFinding>,
}

impl RpcRequest for VulnerabilityResultArgs {
    const METHOD: RpcMethod = RpcMethod::SaveVulnerabilityResult;
    type Response = String;
}

/// One forwarded log event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeLogArgs {
    pub source: String,
    pub level: String,
    pub target: String,
    pub message: String,
    pub timestamp_ms: u64,
}

impl RpcRequest for RuntimeLogArgs {
    const METHOD: RpcMethod = RpcMethod::SaveRuntimeLog;
    type Response = String;
}

impl RpcRequest for TaskDescriptor {
    const METHOD: RpcMethod = RpcMethod::NewTask;
    type Response = String;
}

/// Ask whether a task may still run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckTaskArgs {
    pub task_id: TaskId,
}

/// Controller's answer to [`CheckTaskArgs`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskCheck {
    pub runnable: bool,
    pub message: String,
}

impl TaskCheck {
    /// Task may run
    pub fn runnable() -> Self {
        Self {
            runnable: true,
            message: String::new(),
        }
    }

    /// Task must not run
    pub fn skip(message: impl Into<String>) -> Self {
        Self {
            runnable: false,
            message: message.into(),
        }
    }
}

impl RpcRequest for CheckTaskArgs {
    const METHOD: RpcMethod = RpcMethod::CheckTask;
    type Response = TaskCheck;
}

/// Pull the next queued task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchTaskArgs {
    pub worker_id: WorkerId,
}

impl RpcRequest for FetchTaskArgs {
    const METHOD: RpcMethod = RpcMethod::FetchTask;
    type Response = Option<TaskDescriptor>;
}

/// Report a task's outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinishTaskArgs {
    pub task_id: TaskId,
    pub worker_id: WorkerId,
    pub result: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RpcRequest for FinishTaskArgs {
    const METHOD: RpcMethod = RpcMethod::FinishTask;
    type Response = String;
}

/// Periodic worker heartbeat
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeepAliveArgs {
    pub worker_id: WorkerId,
    pub hostname: String,
    pub running_tasks: u32,
}

/// Heartbeat reply
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeepAliveReply {
    /// Worker must resync before its next task
    pub manual_sync: bool,
    /// Bumped on every file change; echoed back in `MarkSyncedArgs`
    pub sync_generation: u64,
}

impl RpcRequest for KeepAliveArgs {
    const METHOD: RpcMethod = RpcMethod::KeepAlive;
    type Response = KeepAliveReply;
}

/// Clear the caller's resync flag
///
/// Only clears when `generation` is still current, so a change raised while
/// the worker was resyncing keeps the flag set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkSyncedArgs {
    pub worker_id: WorkerId,
    #[serde(default)]
    pub generation: u64,
}

impl RpcRequest for MarkSyncedArgs {
    const METHOD: RpcMethod = RpcMethod::MarkSynced;
    type Response = bool;
}
