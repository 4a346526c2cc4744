//! Resolution-only domain scanner

use anyhow::{Context, Result};
use async_trait::async_trait;

use rh_core::result::{DomainResult, DomainResultMap};

use super::{DomainScanRequest, DomainScanner};

/// Resolves the domain through the system resolver
#[derive(Debug, Clone, Copy, Default)]
pub struct DnsResolver;

#[async_trait]
impl DomainScanner for DnsResolver {
    async fn scan(&self, request: &DomainScanRequest) -> Result<DomainResultMap> {
        let domain = request.domain.trim().trim_end_matches('.');
        let addrs = tokio::net::lookup_host((domain, 0))
            .await
            .with_context(|| format!("failed to resolve {domain}"))?;

        let mut result = DomainResult::new(domain);
        result.org_id = request.org_id;
        result.discovery = Some("resolve".to_string());
        result.ips = addrs
            .filter(|addr| addr.is_ipv4())
            .map(|addr| addr.ip().to_string())
            .collect();

        let mut results = DomainResultMap::new();
        results.insert(domain.to_string(), result);
        Ok(results)
    }
}
