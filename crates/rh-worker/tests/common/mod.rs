//! Recording controller and scripted engines shared by the worker tests

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use rh_core::api::{
    FinishTaskArgs, KeepAliveArgs, KeepAliveReply, RuntimeLogArgs, ScanResultArgs, TaskCheck,
    VulnerabilityResultArgs,
};
use rh_core::config::{FingerprintSettings, ScanSettings};
use rh_core::result::{
    DomainResult, DomainResultMap, IpResult, IpResultMap, PortResult, VulnerabilityFinding,
};
use rh_core::{RpcError, ScanConfig, TaskDescriptor, TaskId, WorkerId};
use rh_worker::engine::ports::parse_port_expr;
use rh_worker::engine::{
    DomainScanRequest, DomainScanner, Fingerprinter, OnlineSearch, OnlineSearchRequest,
    PocEngine, PocRequest, PortScanRequest, PortScanner,
};
use rh_worker::{ControllerApi, Dispatcher, EngineSet, ScanOrchestrator, StaticSettings, TaskRunner};

/// Controller that records every call
#[derive(Default)]
pub struct MockController {
    pub ips: Mutex<HashMap<i64, IpResultMap>>,
    pub domains: Mutex<HashMap<i64, DomainResultMap>>,
    pub not_runnable: Mutex<HashSet<TaskId>>,
    pub fail_new_task: AtomicBool,
    pub manual_sync: AtomicBool,
    pub sync_generation: AtomicU64,
    pub calls: Mutex<Vec<&'static str>>,
    pub scan_results: Mutex<Vec<ScanResultArgs>>,
    pub vulnerabilities: Mutex<Vec<VulnerabilityResultArgs>>,
    pub new_tasks: Mutex<Vec<TaskDescriptor>>,
    pub finished: Mutex<Vec<FinishTaskArgs>>,
    pub queue: Mutex<Vec<TaskDescriptor>>,
}

impl MockController {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn record(&self, call: &'static str) {
        self.calls.lock().unwrap().push(call);
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    /// Follow-on configs decoded back from the queued tasks
    pub fn follow_ons(&self) -> Vec<ScanConfig> {
        self.new_tasks
            .lock()
            .unwrap()
            .iter()
            .map(|task| task.decode_config().unwrap())
            .collect()
    }

    /// Raise the resync flag the way a file change does
    pub fn raise_sync(&self) {
        self.sync_generation.fetch_add(1, Ordering::SeqCst);
        self.manual_sync.store(true, Ordering::SeqCst);
    }

    pub fn set_org_ips(&self, org_id: i64, ips: IpResultMap) {
        self.ips.lock().unwrap().insert(org_id, ips);
    }
}

#[async_trait]
impl ControllerApi for MockController {
    async fn load_ips(&self, org_id: i64) -> Result<IpResultMap, RpcError> {
        self.record("load_ips");
        Ok(self.ips.lock().unwrap().get(&org_id).cloned().unwrap_or_default())
    }

    async fn load_domains(&self, org_id: i64) -> Result<DomainResultMap, RpcError> {
        self.record("load_domains");
        Ok(self
            .domains
            .lock()
            .unwrap()
            .get(&org_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn save_scan_result(&self, args: ScanResultArgs) -> Result<String, RpcError> {
        self.record("save_scan_result");
        let summary = format!("ip:{},domain:{}", args.ip_results.len(), args.domain_results.len());
        self.scan_results.lock().unwrap().push(args);
        Ok(summary)
    }

    async fn save_vulnerabilities(
        &self,
        args: VulnerabilityResultArgs,
    ) -> Result<String, RpcError> {
        self.record("save_vulnerabilities");
        let summary = format!("vulnerability:{}", args.findings.len());
        self.vulnerabilities.lock().unwrap().push(args);
        Ok(summary)
    }

    async fn save_runtime_log(&self, _args: RuntimeLogArgs) -> Result<String, RpcError> {
        self.record("save_runtime_log");
        Ok(String::new())
    }

    async fn new_task(&self, task: TaskDescriptor) -> Result<String, RpcError> {
        self.record("new_task");
        if self.fail_new_task.load(Ordering::SeqCst) {
            return Err(RpcError::ConnectionClosed);
        }
        let task_id = task.task_id.to_string();
        self.new_tasks.lock().unwrap().push(task);
        Ok(task_id)
    }

    async fn check_task(&self, task_id: &TaskId) -> Result<TaskCheck, RpcError> {
        self.record("check_task");
        if self.not_runnable.lock().unwrap().contains(task_id) {
            Ok(TaskCheck {
                runnable: false,
                message: "task revoked".to_string(),
            })
        } else {
            Ok(TaskCheck {
                runnable: true,
                message: String::new(),
            })
        }
    }

    async fn fetch_task(&self, _worker_id: &WorkerId) -> Result<Option<TaskDescriptor>, RpcError> {
        self.record("fetch_task");
        Ok(self.queue.lock().unwrap().pop())
    }

    async fn finish_task(&self, args: FinishTaskArgs) -> Result<String, RpcError> {
        self.record("finish_task");
        self.finished.lock().unwrap().push(args);
        Ok("ok".to_string())
    }

    async fn keep_alive(&self, _args: KeepAliveArgs) -> Result<KeepAliveReply, RpcError> {
        self.record("keep_alive");
        Ok(KeepAliveReply {
            manual_sync: self.manual_sync.load(Ordering::SeqCst),
            sync_generation: self.sync_generation.load(Ordering::SeqCst),
        })
    }

    async fn mark_synced(&self, _worker_id: &WorkerId, generation: u64) -> Result<bool, RpcError> {
        self.record("mark_synced");
        if self.sync_generation.load(Ordering::SeqCst) != generation {
            return Ok(false);
        }
        Ok(self.manual_sync.swap(false, Ordering::SeqCst))
    }
}

/// Reports every requested port as open; panics on `panic_on`
#[derive(Default)]
pub struct ScriptedPortScanner {
    pub calls: AtomicUsize,
    pub panic_on: Option<String>,
}

#[async_trait]
impl PortScanner for ScriptedPortScanner {
    async fn scan(&self, request: &PortScanRequest) -> anyhow::Result<IpResultMap> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.panic_on.as_deref() == Some(request.target.as_str()) {
            panic!("scanner crashed on {}", request.target);
        }
        let mut result = IpResult::new(request.target.as_str());
        for port in parse_port_expr(&request.ports)? {
            result.ports.insert(
                port,
                PortResult {
                    status: Some("open".to_string()),
                    ..Default::default()
                },
            );
        }
        Ok([(request.target.clone(), result)].into())
    }
}

/// Resolves every domain to a fixed address
pub struct StaticResolver(pub &'static str);

#[async_trait]
impl DomainScanner for StaticResolver {
    async fn scan(&self, request: &DomainScanRequest) -> anyhow::Result<DomainResultMap> {
        let mut result = DomainResult::new(request.domain.as_str());
        result.ips.insert(self.0.to_string());
        Ok([(request.domain.clone(), result)].into())
    }
}

/// Tags every target with a title
pub struct TitleProbe;

#[async_trait]
impl Fingerprinter for TitleProbe {
    async fn probe_ip(
        &self,
        ip: &str,
        ports: &[u16],
        _techniques: &FingerprintSettings,
    ) -> anyhow::Result<IpResult> {
        let mut result = IpResult::new(ip);
        for port in ports {
            result.ports.insert(
                *port,
                PortResult {
                    title: Some("It works".to_string()),
                    ..Default::default()
                },
            );
        }
        Ok(result)
    }

    async fn probe_domain(
        &self,
        domain: &str,
        _techniques: &FingerprintSettings,
    ) -> anyhow::Result<DomainResult> {
        let mut result = DomainResult::new(domain);
        result.title = Some("Welcome".to_string());
        Ok(result)
    }
}

/// One finding per target, recording what it was asked
#[derive(Default)]
pub struct RecordingPoc {
    pub requests: Mutex<Vec<PocRequest>>,
}

#[async_trait]
impl PocEngine for RecordingPoc {
    async fn verify(&self, request: &PocRequest) -> anyhow::Result<Vec<VulnerabilityFinding>> {
        self.requests.lock().unwrap().push(request.clone());
        Ok(vec![VulnerabilityFinding {
            target: request.target.clone(),
            name: "weak-login".to_string(),
            poc_file: request.poc_file.clone(),
            severity: "high".to_string(),
            ..Default::default()
        }])
    }
}

/// Returns a fixed search result
pub struct StaticSearch {
    pub ips: IpResultMap,
    pub domains: DomainResultMap,
}

#[async_trait]
impl OnlineSearch for StaticSearch {
    async fn search(
        &self,
        _request: &OnlineSearchRequest,
    ) -> anyhow::Result<(IpResultMap, DomainResultMap)> {
        Ok((self.ips.clone(), self.domains.clone()))
    }
}

pub fn ip_with_ports(ip: &str, org_id: Option<i64>, ports: &[u16]) -> (String, IpResult) {
    let mut result = IpResult::new(ip);
    result.org_id = org_id;
    for port in ports {
        result.ports.insert(*port, PortResult::default());
    }
    (ip.to_string(), result)
}

pub fn runner(
    api: Arc<MockController>,
    engines: EngineSet,
    settings: ScanSettings,
) -> TaskRunner {
    let api: Arc<dyn ControllerApi> = api;
    let orchestrator = ScanOrchestrator::new(
        Arc::clone(&api),
        Arc::new(engines),
        Arc::new(StaticSettings(settings)),
    );
    TaskRunner::new(Arc::clone(&api), orchestrator, Dispatcher::new(api))
}
