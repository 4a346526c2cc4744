//! Domain resolution and subdomain discovery phase

use std::collections::btree_map::Entry;
use std::sync::Arc;

use rh_core::result::{DomainResultMap, DomainResults, IpResult, IpResultMap};
use rh_core::task::{DomainScanConfig, FingerprintConfig, PortScanConfig, QueryConfig, Scope};
use rh_core::{ScanConfig, ScanPhase, TaskDescriptor, TaskError};

use super::fanout::run_bounded;
use super::partition::make_sub_task_targets;
use super::{PhaseOutcome, ScanOrchestrator};
use crate::engine::{DomainScanRequest, DomainScanner, DomainStrategy};

/// Fold one strategy's findings into what the domain already has
fn combine(into: &mut DomainResultMap, found: DomainResultMap) {
    for (domain, result) in found {
        match into.entry(domain) {
            Entry::Vacant(slot) => {
                slot.insert(result);
            }
            Entry::Occupied(mut slot) => {
                let existing = slot.get_mut();
                existing.ips.extend(result.ips);
                for cname in result.cnames {
                    if !existing.cnames.contains(&cname) {
                        existing.cnames.push(cname);
                    }
                }
                if existing.title.is_none() {
                    existing.title = result.title;
                }
            }
        }
    }
}

/// IPs the domains resolved to, owned by the domain's organization
fn resolved_ips(domains: &DomainResultMap) -> IpResultMap {
    let mut ips = IpResultMap::new();
    for result in domains.values() {
        for ip in &result.ips {
            ips.entry(ip.clone()).or_insert_with(|| {
                let mut entry = IpResult::new(ip.as_str());
                entry.org_id = result.org_id;
                entry
            });
        }
    }
    ips
}

impl ScanOrchestrator {
    pub async fn domain_scan(
        &self,
        task: &TaskDescriptor,
        config: &DomainScanConfig,
    ) -> Result<PhaseOutcome, TaskError> {
        let settings = self.settings.current();

        let flagged = [
            (true, DomainStrategy::Resolve),
            (config.subfinder, DomainStrategy::Subfinder),
            (config.brute, DomainStrategy::Brute),
            (config.crawler, DomainStrategy::Crawler),
        ];
        let mut strategies: Vec<(DomainStrategy, Arc<dyn DomainScanner>)> = Vec::new();
        for (enabled, strategy) in flagged {
            if !enabled {
                continue;
            }
            let engine = self
                .engines
                .domain_scanner(strategy)
                .ok_or(TaskError::EngineUnavailable(strategy.as_str()))?;
            strategies.push((strategy, engine));
        }
        let strategies = Arc::new(strategies);

        let org_id = config.scope.effective_org_id();
        let workspace_id = config.scope.workspace_id;
        let results = Arc::new(DomainResults::new());
        let targets: Vec<String> = config
            .domains
            .iter()
            .filter(|d| !d.trim().is_empty())
            .cloned()
            .collect();

        let stats = run_bounded(
            ScanPhase::Domainscan,
            settings.limit(ScanPhase::Domainscan),
            targets,
            |domain| {
                let strategies = Arc::clone(&strategies);
                let results = Arc::clone(&results);
                let request = DomainScanRequest {
                    domain,
                    org_id,
                    workspace_id,
                    ignore_cdn: settings.domainscan.ignore_cdn,
                    ignore_out_of_china: settings.domainscan.ignore_out_of_china,
                };
                async move {
                    let mut combined = DomainResultMap::new();
                    for (strategy, engine) in strategies.iter() {
                        match engine.scan(&request).await {
                            Ok(found) => combine(&mut combined, found),
                            Err(e) => tracing::warn!(
                                domain = %request.domain,
                                "{} failed: {:#}",
                                strategy.as_str(),
                                e
                            ),
                        }
                    }
                    for result in combined.values_mut() {
                        if result.org_id.is_none() {
                            result.org_id = org_id;
                        }
                    }
                    results.merge(combined);
                    Ok(())
                }
            },
        )
        .await;
        tracing::info!(
            task_id = %task.task_id,
            "Domain scan finished: {} of {} domains scanned",
            stats.succeeded,
            stats.spawned
        );

        let domains = results.snapshot();
        self.submit_results(task, config.scope, IpResultMap::new(), domains.clone())
            .await?;

        let mut follow_ons = Vec::new();
        if config.fingerprint {
            let batches = make_sub_task_targets(
                &IpResultMap::new(),
                &domains,
                org_id,
                settings.max_batch_targets,
            );
            for batch in batches {
                follow_ons.push(ScanConfig::Fingerprint(FingerprintConfig {
                    scope: Scope::new(batch.org_id, workspace_id),
                    poc: config.poc.clone(),
                    ip_ports: batch.ip_ports,
                    domains: batch.domains,
                }));
            }
        }

        if settings.domainscan.port_scan {
            let port_expr = settings
                .domainscan
                .port_expr
                .clone()
                .filter(|p| !p.trim().is_empty())
                .unwrap_or_else(|| settings.portscan.default_ports.clone());
            let batches = make_sub_task_targets(
                &resolved_ips(&domains),
                &DomainResultMap::new(),
                org_id,
                settings.max_batch_targets,
            );
            for batch in batches {
                follow_ons.push(ScanConfig::PortScan(PortScanConfig {
                    scope: Scope::new(batch.org_id, workspace_id),
                    poc: config.poc.clone(),
                    ip_port_expr: batch
                        .ip_ports
                        .into_keys()
                        .map(|ip| (ip, port_expr.clone()))
                        .collect(),
                    fingerprint: config.fingerprint,
                    ..Default::default()
                }));
            }
        }

        for domain in &config.domains {
            if config.icp {
                follow_ons.push(ScanConfig::IcpQuery(QueryConfig {
                    target: domain.clone(),
                }));
            }
            if config.whois {
                follow_ons.push(ScanConfig::WhoisQuery(QueryConfig {
                    target: domain.clone(),
                }));
            }
        }

        Ok(PhaseOutcome::new(format!("domain:{}", domains.len())).with_follow_ons(follow_ons))
    }
}
