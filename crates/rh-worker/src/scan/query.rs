//! ICP filing and whois lookups

use rh_core::result::DomainResultMap;
use rh_core::task::{QueryConfig, Scope};
use rh_core::{TaskDescriptor, TaskError};

use super::{PhaseOutcome, ScanOrchestrator};
use crate::engine::QueryKind;

impl ScanOrchestrator {
    pub async fn icp_query(
        &self,
        task: &TaskDescriptor,
        config: &QueryConfig,
    ) -> Result<PhaseOutcome, TaskError> {
        self.asset_query(task, config, QueryKind::Icp).await
    }

    pub async fn whois_query(
        &self,
        task: &TaskDescriptor,
        config: &QueryConfig,
    ) -> Result<PhaseOutcome, TaskError> {
        self.asset_query(task, config, QueryKind::Whois).await
    }

    async fn asset_query(
        &self,
        task: &TaskDescriptor,
        config: &QueryConfig,
        kind: QueryKind,
    ) -> Result<PhaseOutcome, TaskError> {
        if config.target.trim().is_empty() {
            return Err(TaskError::InvalidConfig(format!(
                "{} query without target",
                kind.as_str()
            )));
        }
        let engine = self
            .engines
            .query(kind)
            .ok_or(TaskError::EngineUnavailable(kind.as_str()))?;

        let found = engine.query(&config.target).await.map_err(|e| {
            TaskError::Engine(format!("{} query failed: {:#}", kind.as_str(), e))
        })?;

        let mut domains = DomainResultMap::new();
        if let Some(result) = found {
            domains.insert(config.target.clone(), result);
            self.submit_results(task, Scope::default(), Default::default(), domains.clone())
                .await?;
        }

        Ok(PhaseOutcome::new(format!("{}:{}", kind.as_str(), domains.len())))
    }
}
