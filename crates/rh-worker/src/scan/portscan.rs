//! Port discovery phase

use std::sync::Arc;

use ipnet::Ipv4Net;

use rh_core::result::{IpResultMap, IpResults};
use rh_core::task::{FingerprintConfig, PortScanConfig, Scope};
use rh_core::{ScanConfig, ScanPhase, TaskDescriptor, TaskError};

use super::fanout::run_bounded;
use super::partition::make_sub_task_targets;
use super::{PhaseOutcome, ScanOrchestrator};
use crate::engine::ports::join_ports;
use crate::engine::{IpLocator, PortScanRequest};

/// Whether `target` is an IPv4 subnet expression such as `10.0.0.0/24`
pub fn is_ipv4_subnet(target: &str) -> bool {
    target.parse::<Ipv4Net>().is_ok()
}

/// Fill in missing locations
pub(crate) fn apply_location(locator: &dyn IpLocator, ips: &mut IpResultMap) {
    for (ip, result) in ips.iter_mut() {
        if result.location.is_none() {
            result.location = locator.locate(ip);
        }
    }
}

impl ScanOrchestrator {
    pub async fn port_scan(
        &self,
        task: &TaskDescriptor,
        config: &PortScanConfig,
    ) -> Result<PhaseOutcome, TaskError> {
        let settings = self.settings.current();
        let cmd_bin = settings.portscan.cmd_bin.as_str();
        let scanner = self.engines.port_scanner(cmd_bin).ok_or_else(|| {
            tracing::error!(task_id = %task.task_id, "No port scanner named {}", cmd_bin);
            TaskError::EngineUnavailable("port scanner")
        })?;

        let mut targets: Vec<(String, String)> = Vec::new();
        for (ip, expr) in &config.ip_port_expr {
            if !expr.trim().is_empty() {
                targets.push((ip.clone(), expr.clone()));
            }
        }
        for (ip, ports) in &config.ip_ports {
            if !ports.is_empty() {
                targets.push((ip.clone(), join_ports(ports)));
            }
        }

        let org_id = config.scope.effective_org_id();
        let workspace_id = config.scope.workspace_id;
        let results = Arc::new(IpResults::new());
        let locator = self.engines.locator();
        let portscan = settings.portscan.clone();

        let stats = run_bounded(
            ScanPhase::Portscan,
            settings.limit(ScanPhase::Portscan),
            targets,
            |(target, ports)| {
                let scanner = Arc::clone(&scanner);
                let results = Arc::clone(&results);
                let locator = locator.clone();
                let request = PortScanRequest {
                    target,
                    ports,
                    org_id,
                    workspace_id,
                    settings: portscan.clone(),
                };
                async move {
                    let mut found = scanner.scan(&request).await?;
                    for result in found.values_mut() {
                        if result.org_id.is_none() {
                            result.org_id = org_id;
                        }
                    }
                    match &locator {
                        Some(locator) if !is_ipv4_subnet(&request.target) => {
                            apply_location(locator.as_ref(), &mut found)
                        }
                        _ => {}
                    }
                    results.merge(found);
                    Ok(())
                }
            },
        )
        .await;
        tracing::info!(
            task_id = %task.task_id,
            "Port scan finished: {} of {} targets scanned",
            stats.succeeded,
            stats.spawned
        );

        let ips = results.snapshot();
        self.submit_results(task, config.scope, ips.clone(), Default::default())
            .await?;

        let mut follow_ons = Vec::new();
        if config.fingerprint {
            let batches = make_sub_task_targets(
                &ips,
                &Default::default(),
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

        Ok(PhaseOutcome::new(format!("ip:{}", ips.len())).with_follow_ons(follow_ons))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_ipv4_subnet() {
        assert!(is_ipv4_subnet("10.0.0.0/24"));
        assert!(is_ipv4_subnet("192.168.1.7/32"));
        assert!(!is_ipv4_subnet("10.0.0.1"));
        assert!(!is_ipv4_subnet("example.com"));
        assert!(!is_ipv4_subnet("10.0.0.0/33"));
    }

    struct Fixed;

    impl IpLocator for Fixed {
        fn locate(&self, _ip: &str) -> Option<String> {
            Some("lab".to_string())
        }
    }

    #[test]
    fn test_apply_location_keeps_existing() {
        let mut ips = IpResultMap::new();
        ips.insert("10.0.0.1".into(), rh_core::result::IpResult::new("10.0.0.1"));
        let mut known = rh_core::result::IpResult::new("10.0.0.2");
        known.location = Some("office".into());
        ips.insert("10.0.0.2".into(), known);

        apply_location(&Fixed, &mut ips);
        assert_eq!(ips["10.0.0.1"].location.as_deref(), Some("lab"));
        assert_eq!(ips["10.0.0.2"].location.as_deref(), Some("office"));
    }
}
