//! Service fingerprinting phase
//!
//! Results are seeded from the task's own targets, so a target whose probe
//! fails still reaches the proof-of-concept follow-ons.

use std::sync::Arc;

use rh_core::result::{
    DomainResult, DomainResultMap, DomainResults, IpResult, IpResultMap, IpResults, PortResult,
};
use rh_core::task::{FingerprintConfig, PocConfig, PocOptions, Scope, TargetBatch};
use rh_core::{ScanConfig, ScanPhase, TaskDescriptor, TaskError};

use super::fanout::run_bounded;
use super::partition::make_sub_task_targets;
use super::{summarize, PhaseOutcome, ScanOrchestrator};

enum Probe {
    Ip(String, Vec<u16>),
    Domain(String),
}

fn seed(config: &FingerprintConfig, org_id: Option<i64>) -> (IpResultMap, DomainResultMap) {
    let ips = config
        .ip_ports
        .iter()
        .map(|(ip, ports)| {
            let mut result = IpResult::new(ip.as_str());
            result.org_id = org_id;
            for port in ports {
                result.ports.insert(*port, PortResult::default());
            }
            (ip.clone(), result)
        })
        .collect();
    let domains = config
        .domains
        .iter()
        .map(|domain| {
            let mut result = DomainResult::new(domain.as_str());
            result.org_id = org_id;
            (domain.clone(), result)
        })
        .collect();
    (ips, domains)
}

/// One PoC follow-on per enabled engine, never combined
fn poc_follow_ons(batch: &TargetBatch, workspace_id: i64, poc: &PocOptions) -> Vec<ScanConfig> {
    let config = |poc_file: Option<String>| PocConfig {
        scope: Scope::new(batch.org_id, workspace_id),
        ip_ports: batch.ip_ports.clone(),
        domains: batch.domains.clone(),
        poc_file,
    };

    let mut follow_ons = Vec::new();
    if poc.xray {
        follow_ons.push(ScanConfig::Xray(config(poc.xray_poc_file.clone())));
    }
    if poc.nuclei {
        follow_ons.push(ScanConfig::Nuclei(config(poc.nuclei_poc_file.clone())));
    }
    if poc.goby {
        follow_ons.push(ScanConfig::Goby(config(None)));
    }
    follow_ons
}

impl ScanOrchestrator {
    pub async fn fingerprint(
        &self,
        task: &TaskDescriptor,
        config: &FingerprintConfig,
    ) -> Result<PhaseOutcome, TaskError> {
        let settings = self.settings.current();
        let org_id = config.scope.effective_org_id();
        let workspace_id = config.scope.workspace_id;

        let (seed_ips, seed_domains) = seed(config, org_id);
        let ip_results = Arc::new(IpResults::from_map(seed_ips));
        let domain_results = Arc::new(DomainResults::from_map(seed_domains));

        let techniques = settings.fingerprint.clone();
        if techniques.any() {
            let fingerprinter = self
                .engines
                .fingerprinter()
                .ok_or(TaskError::EngineUnavailable("fingerprinter"))?;

            let probes: Vec<Probe> = config
                .ip_ports
                .iter()
                .filter(|(_, ports)| !ports.is_empty())
                .map(|(ip, ports)| Probe::Ip(ip.clone(), ports.clone()))
                .chain(config.domains.iter().cloned().map(Probe::Domain))
                .collect();

            let stats = run_bounded(
                ScanPhase::Fingerprint,
                settings.limit(ScanPhase::Fingerprint),
                probes,
                |probe| {
                    let fingerprinter = Arc::clone(&fingerprinter);
                    let ip_results = Arc::clone(&ip_results);
                    let domain_results = Arc::clone(&domain_results);
                    let techniques = techniques.clone();
                    async move {
                        match probe {
                            Probe::Ip(ip, ports) => {
                                let mut result =
                                    fingerprinter.probe_ip(&ip, &ports, &techniques).await?;
                                result.org_id = result.org_id.or(org_id);
                                ip_results.insert(ip, result);
                            }
                            Probe::Domain(domain) => {
                                let mut result =
                                    fingerprinter.probe_domain(&domain, &techniques).await?;
                                result.org_id = result.org_id.or(org_id);
                                domain_results.insert(domain, result);
                            }
                        }
                        Ok(())
                    }
                },
            )
            .await;
            tracing::info!(
                task_id = %task.task_id,
                "Fingerprint finished: {} of {} targets probed",
                stats.succeeded,
                stats.spawned
            );
        } else {
            tracing::debug!(task_id = %task.task_id, "No fingerprint technique enabled");
        }

        let ips = ip_results.snapshot();
        let domains = domain_results.snapshot();
        self.submit_results(task, config.scope, ips.clone(), domains.clone())
            .await?;

        let mut follow_ons = Vec::new();
        if config.poc.any() {
            let batches =
                make_sub_task_targets(&ips, &domains, org_id, settings.max_batch_targets);
            for batch in &batches {
                follow_ons.extend(poc_follow_ons(batch, workspace_id, &config.poc));
            }
        }

        Ok(PhaseOutcome::new(summarize(ips.len(), domains.len())).with_follow_ons(follow_ons))
    }
}
