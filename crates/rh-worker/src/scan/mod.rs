//! Scan orchestration
//!
//! A task runs exactly one phase. The phase fans its targets out to engines
//! with bounded concurrency, merges their results into task-local
//! containers, submits the merged results, and returns the configs of the
//! follow-on tasks for the next phase. Follow-ons are queued on the
//! controller by the [`Dispatcher`], never run inline.

mod discovery;
mod dispatch;
mod domainscan;
mod fanout;
mod fingerprint;
pub mod partition;
mod pocscan;
mod portscan;
mod query;

use std::sync::Arc;

use rh_core::api::ScanResultArgs;
use rh_core::result::{DomainResultMap, IpResultMap};
use rh_core::task::Scope;
use rh_core::{ScanConfig, TaskDescriptor, TaskError};

use crate::engine::EngineSet;
use crate::rpc::ControllerApi;
use crate::settings::SettingsSource;

pub use dispatch::Dispatcher;
pub use fanout::{run_bounded, FanoutStats};
pub use partition::make_sub_task_targets;
pub use portscan::is_ipv4_subnet;

/// Result of one phase
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PhaseOutcome {
    /// Short result string, e.g. "ip:2"
    pub summary: String,
    /// Tasks to queue for the next phase
    pub follow_ons: Vec<ScanConfig>,
}

impl PhaseOutcome {
    pub fn new(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            follow_ons: Vec::new(),
        }
    }

    pub fn with_follow_ons(mut self, follow_ons: Vec<ScanConfig>) -> Self {
        self.follow_ons = follow_ons;
        self
    }
}

/// Runs scan phases against the registered engines
#[derive(Clone)]
pub struct ScanOrchestrator {
    api: Arc<dyn ControllerApi>,
    engines: Arc<EngineSet>,
    settings: Arc<dyn SettingsSource>,
}

impl ScanOrchestrator {
    pub fn new(
        api: Arc<dyn ControllerApi>,
        engines: Arc<EngineSet>,
        settings: Arc<dyn SettingsSource>,
    ) -> Self {
        Self {
            api,
            engines,
            settings,
        }
    }

    /// Run the phase matching the config
    pub async fn run(
        &self,
        task: &TaskDescriptor,
        config: ScanConfig,
    ) -> Result<PhaseOutcome, TaskError> {
        match config {
            ScanConfig::OrgScan(c) => self.org_scan(task, &c).await,
            ScanConfig::OnlineApiSearch(c) => self.online_search(task, &c).await,
            ScanConfig::PortScan(c) => self.port_scan(task, &c).await,
            ScanConfig::DomainScan(c) => self.domain_scan(task, &c).await,
            ScanConfig::Fingerprint(c) => self.fingerprint(task, &c).await,
            ScanConfig::Xray(c) => self.xray(task, &c).await,
            ScanConfig::Nuclei(c) => self.nuclei(task, &c).await,
            ScanConfig::Goby(c) => self.goby(task, &c).await,
            ScanConfig::IcpQuery(c) => self.icp_query(task, &c).await,
            ScanConfig::WhoisQuery(c) => self.whois_query(task, &c).await,
        }
    }

    async fn submit_results(
        &self,
        task: &TaskDescriptor,
        scope: Scope,
        ip_results: IpResultMap,
        domain_results: DomainResultMap,
    ) -> Result<String, TaskError> {
        let args = ScanResultArgs {
            task_id: task.task_id.clone(),
            main_task_id: task.main_id().clone(),
            scope,
            ip_results,
            domain_results,
        };
        let reply = self.api.save_scan_result(args).await.map_err(|e| {
            tracing::error!(task_id = %task.task_id, "Result submission failed: {}", e);
            TaskError::Rpc(e)
        })?;
        tracing::debug!(task_id = %task.task_id, "Controller stored {}", reply);
        Ok(reply)
    }
}

/// "ip:N,domain:M", leaving out empty kinds unless both are empty
fn summarize(ips: usize, domains: usize) -> String {
    match (ips, domains) {
        (_, 0) => format!("ip:{}", ips),
        (0, _) => format!("domain:{}", domains),
        _ => format!("ip:{},domain:{}", ips, domains),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summarize() {
        assert_eq!(summarize(2, 0), "ip:2");
        assert_eq!(summarize(0, 3), "domain:3");
        assert_eq!(summarize(1, 1), "ip:1,domain:1");
        assert_eq!(summarize(0, 0), "ip:0");
    }
}
