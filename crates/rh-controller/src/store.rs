//! Task queue and result persistence behind the RPC methods
//!
//! The controller's storage schema is not part of this crate; the server only
//! talks to a [`ControllerStore`]. [`MemoryStore`] keeps everything in memory
//! and is what the binary and the tests use.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use dashmap::DashMap;
use thiserror::Error;

use rh_core::api::{FinishTaskArgs, RuntimeLogArgs, ScanResultArgs, TaskCheck, VulnerabilityResultArgs};
use rh_core::result::{DomainResultMap, IpResultMap, VulnerabilityFinding};
use rh_core::time::current_time_millis;
use rh_core::types::TaskStatus;
use rh_core::{TaskDescriptor, TaskId, WorkerId};

/// Runtime log lines kept by [`MemoryStore`]
const MAX_RUNTIME_LOGS: usize = 10_000;

/// Store errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// Task id already queued
    #[error("task already exists: {0}")]
    DuplicateTask(TaskId),

    /// Unknown task id
    #[error("task not found: {0}")]
    TaskNotFound(TaskId),

    /// Backend failure
    #[error("store backend error: {0}")]
    Backend(String),
}

/// Persistence used by the RPC methods
#[async_trait]
pub trait ControllerStore: Send + Sync {
    /// Stored IP assets of an organization
    async fn load_ips(&self, org_id: i64) -> Result<IpResultMap, StoreError>;

    /// Stored domain assets of an organization
    async fn load_domains(&self, org_id: i64) -> Result<DomainResultMap, StoreError>;

    /// Persist IP/domain results, returning a short summary
    async fn save_scan_result(&self, args: ScanResultArgs) -> Result<String, StoreError>;

    /// Persist vulnerability findings, returning a short summary
    async fn save_vulnerabilities(&self, args: VulnerabilityResultArgs)
        -> Result<String, StoreError>;

    /// Record a forwarded runtime log line
    async fn save_runtime_log(&self, args: RuntimeLogArgs) -> Result<(), StoreError>;

    /// Queue a new task
    async fn enqueue_task(&self, task: TaskDescriptor) -> Result<TaskId, StoreError>;

    /// Whether a task may still run
    async fn check_task(&self, task_id: &TaskId) -> Result<TaskCheck, StoreError>;

    /// Hand the next queued task to a worker
    async fn next_task(&self, worker_id: &WorkerId) -> Result<Option<TaskDescriptor>, StoreError>;

    /// Record a task's outcome
    async fn finish_task(&self, args: FinishTaskArgs) -> Result<String, StoreError>;
}

/// A task as tracked by [`MemoryStore`]
#[derive(Debug, Clone)]
pub struct TaskRecord {
    pub descriptor: TaskDescriptor,
    pub status: TaskStatus,
    pub worker: Option<WorkerId>,
    pub result: Option<String>,
    pub error: Option<String>,
    pub created_at: u64,
    pub updated_at: u64,
}

/// In-memory [`ControllerStore`]
#[derive(Default)]
pub struct MemoryStore {
    ips: DashMap<Option<i64>, IpResultMap>,
    domains: DashMap<Option<i64>, DomainResultMap>,
    vulnerabilities: DashMap<TaskId, Vec<VulnerabilityFinding>>,
    runtime_logs: Mutex<VecDeque<RuntimeLogArgs>>,
    tasks: DashMap<TaskId, TaskRecord>,
    queue: Mutex<VecDeque<TaskId>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Current record of a task
    pub fn task(&self, task_id: &TaskId) -> Option<TaskRecord> {
        self.tasks.get(task_id).map(|r| r.clone())
    }

    /// All tasks that belong to a main task
    pub fn tasks_of(&self, main_task_id: &TaskId) -> Vec<TaskRecord> {
        let mut records: Vec<_> = self
            .tasks
            .iter()
            .filter(|r| r.descriptor.main_id() == main_task_id)
            .map(|r| r.clone())
            .collect();
        records.sort_by_key(|r| r.created_at);
        records
    }

    /// Cancel a task that has not finished
    pub fn revoke_task(&self, task_id: &TaskId) -> bool {
        match self.tasks.get_mut(task_id) {
            Some(mut record) if record.status.is_runnable() => {
                record.status = TaskStatus::Revoked;
                record.updated_at = current_time_millis();
                true
            }
            _ => false,
        }
    }

    /// Stored findings for a main task
    pub fn vulnerabilities(&self, main_task_id: &TaskId) -> Vec<VulnerabilityFinding> {
        self.vulnerabilities
            .get(main_task_id)
            .map(|v| v.clone())
            .unwrap_or_default()
    }

    /// Number of queued tasks not yet handed out
    pub fn queued(&self) -> usize {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Forwarded runtime log lines, oldest first
    pub fn runtime_logs(&self) -> Vec<RuntimeLogArgs> {
        self.runtime_logs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }
}

/// Org 0 on a result means untagged, same as on a scope
fn owner_org(tagged: Option<i64>, default_org: Option<i64>) -> Option<i64> {
    tagged.filter(|id| *id != 0).or(default_org)
}

fn summarize(ip_count: usize, domain_count: usize) -> String {
    match (ip_count, domain_count) {
        (_, 0) => format!("ip:{}", ip_count),
        (0, _) => format!("domain:{}", domain_count),
        _ => format!("ip:{},domain:{}", ip_count, domain_count),
    }
}

#[async_trait]
impl ControllerStore for MemoryStore {
    async fn load_ips(&self, org_id: i64) -> Result<IpResultMap, StoreError> {
        Ok(self
            .ips
            .get(&Some(org_id))
            .map(|m| m.clone())
            .unwrap_or_default())
    }

    async fn load_domains(&self, org_id: i64) -> Result<DomainResultMap, StoreError> {
        Ok(self
            .domains
            .get(&Some(org_id))
            .map(|m| m.clone())
            .unwrap_or_default())
    }

    async fn save_scan_result(&self, args: ScanResultArgs) -> Result<String, StoreError> {
        let default_org = args.scope.effective_org_id();
        let ip_count = args.ip_results.len();
        let domain_count = args.domain_results.len();

        for (ip, result) in args.ip_results {
            let org = owner_org(result.org_id, default_org);
            let mut stored = self.ips.entry(org).or_default();
            match stored.get_mut(&ip) {
                Some(existing) => {
                    existing.ports.extend(result.ports);
                    if result.location.is_some() {
                        existing.location = result.location;
                    }
                }
                None => {
                    let mut result = result;
                    result.org_id = org;
                    stored.insert(ip, result);
                }
            }
        }

        for (domain, result) in args.domain_results {
            let org = owner_org(result.org_id, default_org);
            let mut result = result;
            result.org_id = org;
            self.domains.entry(org).or_default().insert(domain, result);
        }

        tracing::debug!(
            task_id = %args.task_id,
            ip_count,
            domain_count,
            "Saved scan result"
        );
        Ok(summarize(ip_count, domain_count))
    }

    async fn save_vulnerabilities(
        &self,
        args: VulnerabilityResultArgs,
    ) -> Result<String, StoreError> {
        let count = args.findings.len();
        let main_task_id = if args.main_task_id.is_empty() {
            args.task_id.clone()
        } else {
            args.main_task_id.clone()
        };
        self.vulnerabilities
            .entry(main_task_id)
            .or_default()
            .extend(args.findings);
        Ok(format!("vulnerability:{}", count))
    }

    async fn save_runtime_log(&self, args: RuntimeLogArgs) -> Result<(), StoreError> {
        let mut logs = self
            .runtime_logs
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if logs.len() >= MAX_RUNTIME_LOGS {
            logs.pop_front();
        }
        logs.push_back(args);
        Ok(())
    }

    async fn enqueue_task(&self, task: TaskDescriptor) -> Result<TaskId, StoreError> {
        let task_id = task.task_id.clone();
        if self.tasks.contains_key(&task_id) {
            return Err(StoreError::DuplicateTask(task_id));
        }
        let now = current_time_millis();
        self.tasks.insert(
            task_id.clone(),
            TaskRecord {
                descriptor: task,
                status: TaskStatus::Created,
                worker: None,
                result: None,
                error: None,
                created_at: now,
                updated_at: now,
            },
        );
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(task_id.clone());
        Ok(task_id)
    }

    async fn check_task(&self, task_id: &TaskId) -> Result<TaskCheck, StoreError> {
        Ok(match self.tasks.get(task_id) {
            Some(record) if record.status.is_runnable() => TaskCheck::runnable(),
            Some(record) => TaskCheck::skip(format!("task {} is {}", task_id, record.status)),
            None => TaskCheck::skip(format!("task {} not found", task_id)),
        })
    }

    async fn next_task(&self, worker_id: &WorkerId) -> Result<Option<TaskDescriptor>, StoreError> {
        loop {
            let next = self
                .queue
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .pop_front();
            let Some(task_id) = next else {
                return Ok(None);
            };
            let Some(mut record) = self.tasks.get_mut(&task_id) else {
                continue;
            };
            // Revoked while queued
            if record.status != TaskStatus::Created {
                continue;
            }
            record.status = TaskStatus::Started;
            record.worker = Some(worker_id.clone());
            record.updated_at = current_time_millis();
            return Ok(Some(record.descriptor.clone()));
        }
    }

    async fn finish_task(&self, args: FinishTaskArgs) -> Result<String, StoreError> {
        let mut record = self
            .tasks
            .get_mut(&args.task_id)
            .ok_or_else(|| StoreError::TaskNotFound(args.task_id.clone()))?;
        if record.status == TaskStatus::Revoked {
            return Ok(format!("task {} was revoked", args.task_id));
        }
        record.status = if args.error.is_some() {
            TaskStatus::Failure
        } else {
            TaskStatus::Success
        };
        record.worker = Some(args.worker_id);
        record.result = Some(args.result);
        record.error = args.error;
        record.updated_at = current_time_millis();
        Ok(record.status.to_string())
    }
}
