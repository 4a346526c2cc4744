//! Proof-of-concept phases (xray, nuclei, goby)

use std::sync::Arc;

use rh_core::api::VulnerabilityResultArgs;
use rh_core::result::VulnerabilityResults;
use rh_core::task::PocConfig;
use rh_core::{ScanPhase, TaskDescriptor, TaskError};

use super::fanout::run_bounded;
use super::{PhaseOutcome, ScanOrchestrator};
use crate::engine::{PocRequest, PocTool};

impl ScanOrchestrator {
    /// One xray run per `ip:port` and per domain
    pub async fn xray(
        &self,
        task: &TaskDescriptor,
        config: &PocConfig,
    ) -> Result<PhaseOutcome, TaskError> {
        self.poc_scan(task, config, PocTool::Xray, per_target(config))
            .await
    }

    /// One nuclei run per `ip:port` and per domain
    pub async fn nuclei(
        &self,
        task: &TaskDescriptor,
        config: &PocConfig,
    ) -> Result<PhaseOutcome, TaskError> {
        self.poc_scan(task, config, PocTool::Nuclei, per_target(config))
            .await
    }

    /// One goby run for all `ip:port` targets and one for all domains
    pub async fn goby(
        &self,
        task: &TaskDescriptor,
        config: &PocConfig,
    ) -> Result<PhaseOutcome, TaskError> {
        let mut targets = Vec::new();
        let ip_ports = config.ip_port_targets();
        if !ip_ports.is_empty() {
            targets.push(ip_ports.join(","));
        }
        if !config.domains.is_empty() {
            let domains: Vec<&str> = config.domains.iter().map(String::as_str).collect();
            targets.push(domains.join(","));
        }
        self.poc_scan(task, config, PocTool::Goby, targets).await
    }

    async fn poc_scan(
        &self,
        task: &TaskDescriptor,
        config: &PocConfig,
        tool: PocTool,
        targets: Vec<String>,
    ) -> Result<PhaseOutcome, TaskError> {
        let engine = self
            .engines
            .poc_engine(tool)
            .ok_or(TaskError::EngineUnavailable(tool.as_str()))?;
        let settings = self.settings.current();
        let poc_file = config.poc_file_or_default().to_string();
        let workspace_id = config.scope.workspace_id;
        let findings = Arc::new(VulnerabilityResults::new());

        let stats = run_bounded(
            ScanPhase::Pocscan,
            settings.limit(ScanPhase::Pocscan),
            targets,
            |target| {
                let engine = Arc::clone(&engine);
                let findings = Arc::clone(&findings);
                let request = PocRequest {
                    target,
                    poc_file: poc_file.clone(),
                    workspace_id,
                };
                async move {
                    let found = engine.verify(&request).await?;
                    findings.append(found);
                    Ok(())
                }
            },
        )
        .await;
        tracing::info!(
            task_id = %task.task_id,
            tool = tool.as_str(),
            "PoC scan finished: {} of {} runs completed",
            stats.succeeded,
            stats.spawned
        );

        let findings = findings.snapshot();
        let count = findings.len();
        let args = VulnerabilityResultArgs {
            task_id: task.task_id.clone(),
            main_task_id: task.main_id().clone(),
            findings,
        };
        let reply = self.api.save_vulnerabilities(args).await.map_err(|e| {
            tracing::error!(task_id = %task.task_id, "Finding submission failed: {}", e);
            TaskError::Rpc(e)
        })?;
        tracing::debug!(task_id = %task.task_id, "Controller stored {}", reply);

        Ok(PhaseOutcome::new(format!("vulnerability:{}", count)))
    }
}

fn per_target(config: &PocConfig) -> Vec<String> {
    let mut targets = config.ip_port_targets();
    targets.extend(config.domains.iter().cloned());
    targets
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_per_target_expansion() {
        let mut config = PocConfig::default();
        config.ip_ports.insert("10.0.0.1".into(), vec![80, 443]);
        config.domains.insert("a.example.com".into());

        assert_eq!(
            per_target(&config),
            vec!["10.0.0.1:80", "10.0.0.1:443", "a.example.com"]
        );
    }
}
