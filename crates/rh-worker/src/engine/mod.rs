//! Scanning engine seam
//!
//! The orchestrator only sees these traits: it hands an engine one target
//! plus options and merges whatever typed results come back. Built-in
//! engines cover TCP-connect port discovery, DNS resolution, HTTP probing
//! and the custom IP location files; everything else is registered by the
//! embedding binary.

mod command;
mod connect;
mod http;
mod location;
pub mod ports;
mod resolver;

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use rh_core::config::{FingerprintSettings, PortscanSettings, WorkerConfig};
use rh_core::result::{
    DomainResult, DomainResultMap, IpResult, IpResultMap, VulnerabilityFinding,
};
use rh_core::task::OnlineSource;

pub use command::CommandPocEngine;
pub use connect::ConnectScanner;
pub use http::HttpProbe;
pub use location::CustomIpLocation;
pub use resolver::DnsResolver;

/// One port-scan sub-scan
#[derive(Debug, Clone)]
pub struct PortScanRequest {
    /// IP or subnet expression
    pub target: String,
    /// Port list or expression, e.g. "80,443,8000-9000"
    pub ports: String,
    pub org_id: Option<i64>,
    pub workspace_id: i64,
    pub settings: PortscanSettings,
}

/// One domain-scan sub-scan
#[derive(Debug, Clone)]
pub struct DomainScanRequest {
    pub domain: String,
    pub org_id: Option<i64>,
    pub workspace_id: i64,
    pub ignore_cdn: bool,
    pub ignore_out_of_china: bool,
}

/// One online intelligence query
#[derive(Debug, Clone)]
pub struct OnlineSearchRequest {
    pub query: String,
    /// Search by keyword rather than by IP/domain target
    pub by_keyword: bool,
    pub limit: u32,
    pub start_time: Option<String>,
    pub org_id: Option<i64>,
    pub workspace_id: i64,
    pub ignore_cdn: bool,
    pub ignore_out_of_china: bool,
}

/// One proof-of-concept invocation
#[derive(Debug, Clone)]
pub struct PocRequest {
    /// `ip:port`, a domain, or a comma-joined list for engines that take many
    pub target: String,
    pub poc_file: String,
    pub workspace_id: i64,
}

/// Port discovery backend
#[async_trait]
pub trait PortScanner: Send + Sync {
    async fn scan(&self, request: &PortScanRequest) -> Result<IpResultMap>;
}

/// One domain discovery strategy
#[async_trait]
pub trait DomainScanner: Send + Sync {
    async fn scan(&self, request: &DomainScanRequest) -> Result<DomainResultMap>;
}

/// Service identification
#[async_trait]
pub trait Fingerprinter: Send + Sync {
    /// Probe the given ports of one IP
    async fn probe_ip(
        &self,
        ip: &str,
        ports: &[u16],
        techniques: &FingerprintSettings,
    ) -> Result<IpResult>;

    /// Probe one domain
    async fn probe_domain(
        &self,
        domain: &str,
        techniques: &FingerprintSettings,
    ) -> Result<DomainResult>;
}

/// xray, nuclei or goby
#[async_trait]
pub trait PocEngine: Send + Sync {
    async fn verify(&self, request: &PocRequest) -> Result<Vec<VulnerabilityFinding>>;
}

/// fofa, hunter or quake
#[async_trait]
pub trait OnlineSearch: Send + Sync {
    async fn search(
        &self,
        request: &OnlineSearchRequest,
    ) -> Result<(IpResultMap, DomainResultMap)>;
}

/// ICP filing or whois lookup of one target
#[async_trait]
pub trait AssetQuery: Send + Sync {
    async fn query(&self, target: &str) -> Result<Option<DomainResult>>;
}

/// IP geolocation
pub trait IpLocator: Send + Sync {
    fn locate(&self, ip: &str) -> Option<String>;
}

/// Domain discovery strategies a domain-scan can combine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DomainStrategy {
    /// Plain resolution, always run
    Resolve,
    Subfinder,
    Brute,
    Crawler,
}

impl DomainStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            DomainStrategy::Resolve => "domain resolution",
            DomainStrategy::Subfinder => "subfinder",
            DomainStrategy::Brute => "subdomain brute",
            DomainStrategy::Crawler => "crawler",
        }
    }
}

/// Proof-of-concept engines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PocTool {
    Xray,
    Nuclei,
    Goby,
}

impl PocTool {
    pub fn as_str(&self) -> &'static str {
        match self {
            PocTool::Xray => "xray",
            PocTool::Nuclei => "nuclei",
            PocTool::Goby => "goby",
        }
    }
}

/// Asset lookups
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKind {
    Icp,
    Whois,
}

impl QueryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryKind::Icp => "icp",
            QueryKind::Whois => "whois",
        }
    }
}

/// Engines available to one worker
#[derive(Clone, Default)]
pub struct EngineSet {
    port_scanners: HashMap<String, Arc<dyn PortScanner>>,
    domain_scanners: HashMap<DomainStrategy, Arc<dyn DomainScanner>>,
    fingerprinter: Option<Arc<dyn Fingerprinter>>,
    poc_engines: HashMap<PocTool, Arc<dyn PocEngine>>,
    online: HashMap<OnlineSource, Arc<dyn OnlineSearch>>,
    queries: HashMap<QueryKind, Arc<dyn AssetQuery>>,
    locator: Option<Arc<dyn IpLocator>>,
}

impl EngineSet {
    /// No engines at all
    pub fn new() -> Self {
        Self::default()
    }

    /// Engines shipped with the worker binary
    pub fn builtin(config: &WorkerConfig) -> Result<Self> {
        let mut engines = Self::new()
            .with_port_scanner("connect", Arc::new(ConnectScanner::default()))
            .with_domain_scanner(DomainStrategy::Resolve, Arc::new(DnsResolver))
            .with_fingerprinter(Arc::new(HttpProbe::new()?));

        if let Some(dir) = &config.ip_location_dir {
            engines = engines.with_locator(Arc::new(CustomIpLocation::load(dir)));
        }

        let commands = [
            (PocTool::Xray, &config.engines.xray),
            (PocTool::Nuclei, &config.engines.nuclei),
            (PocTool::Goby, &config.engines.goby),
        ];
        for (tool, spec) in commands {
            if let Some(spec) = spec {
                let engine = CommandPocEngine::new(tool, spec.clone());
                engines = engines.with_poc_engine(tool, Arc::new(engine));
            }
        }

        Ok(engines)
    }

    /// Register a port scanner under its `cmd_bin` name
    pub fn with_port_scanner(
        mut self,
        name: impl Into<String>,
        engine: Arc<dyn PortScanner>,
    ) -> Self {
        self.port_scanners.insert(name.into(), engine);
        self
    }

    pub fn with_domain_scanner(
        mut self,
        strategy: DomainStrategy,
        engine: Arc<dyn DomainScanner>,
    ) -> Self {
        self.domain_scanners.insert(strategy, engine);
        self
    }

    pub fn with_fingerprinter(mut self, engine: Arc<dyn Fingerprinter>) -> Self {
        self.fingerprinter = Some(engine);
        self
    }

    pub fn with_poc_engine(mut self, tool: PocTool, engine: Arc<dyn PocEngine>) -> Self {
        self.poc_engines.insert(tool, engine);
        self
    }

    pub fn with_online_search(
        mut self,
        source: OnlineSource,
        engine: Arc<dyn OnlineSearch>,
    ) -> Self {
        self.online.insert(source, engine);
        self
    }

    pub fn with_query(mut self, kind: QueryKind, engine: Arc<dyn AssetQuery>) -> Self {
        self.queries.insert(kind, engine);
        self
    }

    pub fn with_locator(mut self, locator: Arc<dyn IpLocator>) -> Self {
        self.locator = Some(locator);
        self
    }

    pub fn port_scanner(&self, cmd_bin: &str) -> Option<Arc<dyn PortScanner>> {
        self.port_scanners.get(cmd_bin).cloned()
    }

    pub fn domain_scanner(&self, strategy: DomainStrategy) -> Option<Arc<dyn DomainScanner>> {
        self.domain_scanners.get(&strategy).cloned()
    }

    pub fn fingerprinter(&self) -> Option<Arc<dyn Fingerprinter>> {
        self.fingerprinter.clone()
    }

    pub fn poc_engine(&self, tool: PocTool) -> Option<Arc<dyn PocEngine>> {
        self.poc_engines.get(&tool).cloned()
    }

    pub fn online_search(&self, source: OnlineSource) -> Option<Arc<dyn OnlineSearch>> {
        self.online.get(&source).cloned()
    }

    pub fn query(&self, kind: QueryKind) -> Option<Arc<dyn AssetQuery>> {
        self.queries.get(&kind).cloned()
    }

    pub fn locator(&self) -> Option<Arc<dyn IpLocator>> {
        self.locator.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_engines() {
        let engines = EngineSet::builtin(&WorkerConfig::default()).unwrap();
        assert!(engines.port_scanner("connect").is_some());
        assert!(engines.port_scanner("masscan").is_none());
        assert!(engines.domain_scanner(DomainStrategy::Resolve).is_some());
        assert!(engines.domain_scanner(DomainStrategy::Brute).is_none());
        assert!(engines.fingerprinter().is_some());
        assert!(engines.poc_engine(PocTool::Nuclei).is_none());
        assert!(engines.locator().is_none());
    }

    #[test]
    fn test_builtin_registers_configured_commands() {
        let mut config = WorkerConfig::default();
        config.engines.xray = Some(rh_core::config::CommandSpec {
            program: "xray".into(),
            args: vec!["{target}".into()],
        });
        let engines = EngineSet::builtin(&config).unwrap();
        assert!(engines.poc_engine(PocTool::Xray).is_some());
        assert!(engines.poc_engine(PocTool::Goby).is_none());
    }
}
