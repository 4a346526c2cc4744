//! Organization and online-search phases
//!
//! Both produce assets rather than scanning them: their follow-ons are
//! port-scans over the IPs and resolution-only domain-scans over the domains.

use rh_core::result::{DomainResultMap, IpResultMap};
use rh_core::task::{
    DomainScanConfig, OnlineSearchConfig, OrgScanConfig, PocOptions, PortScanConfig, Scope,
    TargetBatch,
};
use rh_core::{ScanConfig, TaskDescriptor, TaskError};

use super::partition::make_sub_task_targets;
use super::portscan::apply_location;
use super::{summarize, PhaseOutcome, ScanOrchestrator};
use crate::engine::OnlineSearchRequest;

/// What the discovery follow-ons inherit from their parent
struct DiscoveryChain<'a> {
    workspace_id: i64,
    poc: &'a PocOptions,
    fingerprint: bool,
    /// Port expression applied to every IP
    port_expr: Option<&'a str>,
    /// Ports for IPs without any known port
    default_ports: &'a str,
}

impl DiscoveryChain<'_> {
    fn follow_ons(&self, batches: Vec<TargetBatch>) -> Vec<ScanConfig> {
        let mut follow_ons = Vec::new();
        for batch in batches {
            let scope = Scope::new(batch.org_id, self.workspace_id);

            if !batch.ip_ports.is_empty() {
                let mut config = PortScanConfig {
                    scope,
                    poc: self.poc.clone(),
                    fingerprint: self.fingerprint,
                    ..Default::default()
                };
                for (ip, ports) in batch.ip_ports {
                    match self.port_expr {
                        Some(expr) => {
                            config.ip_port_expr.insert(ip, expr.to_string());
                        }
                        None if ports.is_empty() => {
                            config.ip_port_expr.insert(ip, self.default_ports.to_string());
                        }
                        None => {
                            config.ip_ports.insert(ip, ports);
                        }
                    }
                }
                follow_ons.push(ScanConfig::PortScan(config));
            }

            if !batch.domains.is_empty() {
                follow_ons.push(ScanConfig::DomainScan(DomainScanConfig {
                    scope,
                    poc: self.poc.clone(),
                    domains: batch.domains,
                    fingerprint: self.fingerprint,
                    ..Default::default()
                }));
            }
        }
        follow_ons
    }
}

impl ScanOrchestrator {
    /// Load an organization's stored assets and fan out scans over them
    pub async fn org_scan(
        &self,
        task: &TaskDescriptor,
        config: &OrgScanConfig,
    ) -> Result<PhaseOutcome, TaskError> {
        let org_id = config.scope.effective_org_id().ok_or_else(|| {
            tracing::error!(task_id = %task.task_id, "Organization scan without org id");
            TaskError::MissingOrgId
        })?;
        let settings = self.settings.current();

        let mut parts = Vec::new();
        let ips = if config.is_org_ip {
            let ips = self.api.load_ips(org_id).await?;
            parts.push(format!("ip:{}", ips.len()));
            ips
        } else {
            IpResultMap::new()
        };
        let domains = if config.is_org_domain {
            let domains = self.api.load_domains(org_id).await?;
            parts.push(format!("domain:{}", domains.len()));
            domains
        } else {
            DomainResultMap::new()
        };
        tracing::info!(task_id = %task.task_id, org_id, "Loaded {}", parts.join(","));

        let chain = DiscoveryChain {
            workspace_id: config.scope.workspace_id,
            poc: &config.poc,
            fingerprint: config.fingerprint,
            port_expr: config.org_ip_port.as_deref().filter(|p| !p.trim().is_empty()),
            default_ports: &settings.portscan.default_ports,
        };
        let batches =
            make_sub_task_targets(&ips, &domains, Some(org_id), settings.max_batch_targets);

        Ok(PhaseOutcome::new(parts.join(",")).with_follow_ons(chain.follow_ons(batches)))
    }

    /// Query one online intelligence source
    pub async fn online_search(
        &self,
        task: &TaskDescriptor,
        config: &OnlineSearchConfig,
    ) -> Result<PhaseOutcome, TaskError> {
        let settings = self.settings.current();
        let engine = self
            .engines
            .online_search(config.source)
            .ok_or(TaskError::EngineUnavailable(config.source.as_str()))?;
        let (query, by_keyword) = config
            .query()
            .ok_or_else(|| TaskError::InvalidConfig("no keyword or target to search".into()))?;

        let request = OnlineSearchRequest {
            query: query.to_string(),
            by_keyword,
            limit: config.search_limit,
            start_time: config.start_time.clone(),
            org_id: config.scope.effective_org_id(),
            workspace_id: config.scope.workspace_id,
            ignore_cdn: settings.domainscan.ignore_cdn,
            ignore_out_of_china: settings.domainscan.ignore_out_of_china,
        };
        let (mut ips, domains) = engine.search(&request).await.map_err(|e| {
            TaskError::Engine(format!("{} search failed: {:#}", config.source.as_str(), e))
        })?;
        if let Some(locator) = self.engines.locator() {
            apply_location(locator.as_ref(), &mut ips);
        }

        self.submit_results(task, config.scope, ips.clone(), domains.clone())
            .await?;

        let chain = DiscoveryChain {
            workspace_id: config.scope.workspace_id,
            poc: &config.poc,
            fingerprint: config.fingerprint,
            port_expr: None,
            default_ports: &settings.portscan.default_ports,
        };
        let batches = make_sub_task_targets(
            &ips,
            &domains,
            config.scope.effective_org_id(),
            settings.max_batch_targets,
        );

        Ok(PhaseOutcome::new(summarize(ips.len(), domains.len()))
            .with_follow_ons(chain.follow_ons(batches)))
    }
}
