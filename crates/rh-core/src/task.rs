//! Task descriptors and per-phase scan configurations
//!
//! A [`TaskDescriptor`] travels over the wire with its configuration as an
//! opaque JSON value. Workers decode it into a [`ScanConfig`] using the
//! descriptor's [`TaskType`], so each phase only ever sees the fields that
//! belong to it. Empty target collections and unset options are left out of
//! the encoded payload.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::TaskError;
use crate::types::TaskId;

/// Kind of work a task performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskType {
    /// Load an organization's assets and fan out port/domain scans
    OrgScan,
    /// Query an online intelligence source
    OnlineApiSearch,
    /// Port discovery
    PortScan,
    /// Domain and subdomain resolution
    DomainScan,
    /// Service fingerprinting
    Fingerprint,
    /// xray proof-of-concept engine
    Xray,
    /// nuclei proof-of-concept engine
    Nuclei,
    /// goby proof-of-concept engine
    Goby,
    /// ICP filing lookup
    IcpQuery,
    /// Whois lookup
    WhoisQuery,
}

impl TaskType {
    /// Every task type, in pipeline order
    pub const ALL: [TaskType; 10] = [
        TaskType::OrgScan,
        TaskType::OnlineApiSearch,
        TaskType::PortScan,
        TaskType::DomainScan,
        TaskType::Fingerprint,
        TaskType::Xray,
        TaskType::Nuclei,
        TaskType::Goby,
        TaskType::IcpQuery,
        TaskType::WhoisQuery,
    ];

    /// Wire name of the task type
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::OrgScan => "org-scan",
            TaskType::OnlineApiSearch => "online-api-search",
            TaskType::PortScan => "port-scan",
            TaskType::DomainScan => "domain-scan",
            TaskType::Fingerprint => "fingerprint",
            TaskType::Xray => "xray",
            TaskType::Nuclei => "nuclei",
            TaskType::Goby => "goby",
            TaskType::IcpQuery => "icp-query",
            TaskType::WhoisQuery => "whois-query",
        }
    }

    /// Parse a wire name
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == name)
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One unit of dispatched work
///
/// Immutable once handed to the controller. A root task is its own main task;
/// follow-ons inherit the root's `main_task_id` and point at their spawning
/// task through `parent_task_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDescriptor {
    /// Unique task id
    pub task_id: TaskId,
    /// Id of the umbrella task this one descends from
    pub main_task_id: TaskId,
    /// Task that dispatched this one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_task_id: Option<TaskId>,
    /// Phase to run
    pub task_type: TaskType,
    /// Phase-specific payload
    pub config: Value,
}

impl TaskDescriptor {
    /// Create a root task with a fresh id
    pub fn root(config: &ScanConfig) -> Result<Self, serde_json::Error> {
        let task_id = TaskId::generate();
        Ok(Self {
            main_task_id: task_id.clone(),
            task_id,
            parent_task_id: None,
            task_type: config.task_type(),
            config: config.encode()?,
        })
    }

    /// Create a follow-on task spawned by this one
    pub fn follow_on(&self, config: &ScanConfig) -> Result<Self, serde_json::Error> {
        Ok(Self {
            task_id: TaskId::generate(),
            main_task_id: self.main_id().clone(),
            parent_task_id: Some(self.task_id.clone()),
            task_type: config.task_type(),
            config: config.encode()?,
        })
    }

    /// The main task id, falling back to this task's own id
    pub fn main_id(&self) -> &TaskId {
        if self.main_task_id.is_empty() {
            &self.task_id
        } else {
            &self.main_task_id
        }
    }

    /// Whether this task started its own chain
    pub fn is_root(&self) -> bool {
        self.parent_task_id.is_none()
    }

    /// Decode the payload into the view for this task's type
    pub fn decode_config(&self) -> Result<ScanConfig, TaskError> {
        ScanConfig::decode(self.task_type, &self.config).map_err(TaskError::Decode)
    }
}

/// Organization and workspace a task belongs to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Scope {
    /// Owning organization, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub org_id: Option<i64>,
    /// Owning workspace
    pub workspace_id: i64,
}

impl Scope {
    /// Scope for an organization in a workspace
    pub fn new(org_id: Option<i64>, workspace_id: i64) -> Self {
        Self {
            org_id,
            workspace_id,
        }
    }

    /// Organization id, treating zero as unset
    pub fn effective_org_id(&self) -> Option<i64> {
        self.org_id.filter(|id| *id != 0)
    }
}

/// Proof-of-concept engines to chain after fingerprinting
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PocOptions {
    /// Chain an xray task
    pub xray: bool,
    /// xray poc selector
    #[serde(skip_serializing_if = "Option::is_none")]
    pub xray_poc_file: Option<String>,
    /// Chain a nuclei task
    pub nuclei: bool,
    /// nuclei template selector
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nuclei_poc_file: Option<String>,
    /// Chain a goby task
    pub goby: bool,
}

impl PocOptions {
    /// Whether any engine is enabled
    pub fn any(&self) -> bool {
        self.xray || self.nuclei || self.goby
    }
}

/// Organization scan: reload known assets and fan out
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrgScanConfig {
    #[serde(flatten)]
    pub scope: Scope,
    #[serde(flatten)]
    pub poc: PocOptions,
    /// Reload the organization's IP assets
    pub is_org_ip: bool,
    /// Reload the organization's domain assets
    pub is_org_domain: bool,
    /// Port expression to scan instead of the known ports
    #[serde(skip_serializing_if = "Option::is_none")]
    pub org_ip_port: Option<String>,
    /// Chain fingerprinting after the port/domain scans
    pub fingerprint: bool,
}

/// Online intelligence sources
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnlineSource {
    #[default]
    Fofa,
    Hunter,
    Quake,
}

impl OnlineSource {
    /// Source name
    pub fn as_str(&self) -> &'static str {
        match self {
            OnlineSource::Fofa => "fofa",
            OnlineSource::Hunter => "hunter",
            OnlineSource::Quake => "quake",
        }
    }
}

/// Online intelligence search
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OnlineSearchConfig {
    #[serde(flatten)]
    pub scope: Scope,
    #[serde(flatten)]
    pub poc: PocOptions,
    /// Which source to query
    pub source: OnlineSource,
    /// Free-form query, takes precedence over `target`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keyword: Option<String>,
    /// IP, subnet or domain to look up
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    /// Only return records newer than this date
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    /// Result cap for keyword searches
    pub search_limit: u32,
    /// Chain fingerprinting
    pub fingerprint: bool,
}

impl OnlineSearchConfig {
    /// The query string and whether it is a keyword search
    pub fn query(&self) -> Option<(&str, bool)> {
        if let Some(keyword) = self.keyword.as_deref().filter(|k| !k.is_empty()) {
            return Some((keyword, true));
        }
        self.target
            .as_deref()
            .filter(|t| !t.is_empty())
            .map(|t| (t, false))
    }
}

/// Port discovery over explicit port lists or port expressions
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortScanConfig {
    #[serde(flatten)]
    pub scope: Scope,
    #[serde(flatten)]
    pub poc: PocOptions,
    /// ip -> ports
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub ip_ports: BTreeMap<String, Vec<u16>>,
    /// ip -> port expression such as "80,443,8000-9000"
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub ip_port_expr: BTreeMap<String, String>,
    /// Chain fingerprinting
    pub fingerprint: bool,
}

/// Domain resolution and subdomain discovery
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DomainScanConfig {
    #[serde(flatten)]
    pub scope: Scope,
    #[serde(flatten)]
    pub poc: PocOptions,
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    pub domains: BTreeSet<String>,
    /// Run the subdomain finder
    pub subfinder: bool,
    /// Brute-force subdomains
    pub brute: bool,
    /// Collect subdomains from crawled pages
    pub crawler: bool,
    /// Chain fingerprinting
    pub fingerprint: bool,
    /// Chain an ICP lookup per domain
    pub icp: bool,
    /// Chain a whois lookup per domain
    pub whois: bool,
}

/// Fingerprinting over known services
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FingerprintConfig {
    #[serde(flatten)]
    pub scope: Scope,
    #[serde(flatten)]
    pub poc: PocOptions,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub ip_ports: BTreeMap<String, Vec<u16>>,
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    pub domains: BTreeSet<String>,
}

/// Targets for one proof-of-concept engine
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PocConfig {
    #[serde(flatten)]
    pub scope: Scope,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub ip_ports: BTreeMap<String, Vec<u16>>,
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    pub domains: BTreeSet<String>,
    /// Poc selector, "*" when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poc_file: Option<String>,
}

impl PocConfig {
    /// Every `ip:port` target
    pub fn ip_port_targets(&self) -> Vec<String> {
        self.ip_ports
            .iter()
            .flat_map(|(ip, ports)| ports.iter().map(move |port| format!("{}:{}", ip, port)))
            .collect()
    }

    /// Poc selector with the wildcard default applied
    pub fn poc_file_or_default(&self) -> &str {
        self.poc_file
            .as_deref()
            .filter(|f| !f.is_empty())
            .unwrap_or("*")
    }
}

/// ICP or whois lookup
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    pub target: String,
}

/// Phase-specific configuration, one variant per task type
#[derive(Debug, Clone, PartialEq)]
pub enum ScanConfig {
    OrgScan(OrgScanConfig),
    OnlineApiSearch(OnlineSearchConfig),
    PortScan(PortScanConfig),
    DomainScan(DomainScanConfig),
    Fingerprint(FingerprintConfig),
    Xray(PocConfig),
    Nuclei(PocConfig),
    Goby(PocConfig),
    IcpQuery(QueryConfig),
    WhoisQuery(QueryConfig),
}

impl ScanConfig {
    /// Task type this variant runs as
    pub fn task_type(&self) -> TaskType {
        match self {
            ScanConfig::OrgScan(_) => TaskType::OrgScan,
            ScanConfig::OnlineApiSearch(_) => TaskType::OnlineApiSearch,
            ScanConfig::PortScan(_) => TaskType::PortScan,
            ScanConfig::DomainScan(_) => TaskType::DomainScan,
            ScanConfig::Fingerprint(_) => TaskType::Fingerprint,
            ScanConfig::Xray(_) => TaskType::Xray,
            ScanConfig::Nuclei(_) => TaskType::Nuclei,
            ScanConfig::Goby(_) => TaskType::Goby,
            ScanConfig::IcpQuery(_) => TaskType::IcpQuery,
            ScanConfig::WhoisQuery(_) => TaskType::WhoisQuery,
        }
    }

    /// Decode a payload as the variant for `task_type`
    pub fn decode(task_type: TaskType, value: &Value) -> Result<Self, serde_json::Error> {
        let value = value.clone();
        Ok(match task_type {
            TaskType::OrgScan => ScanConfig::OrgScan(serde_json::from_value(value)?),
            TaskType::OnlineApiSearch => {
                ScanConfig::OnlineApiSearch(serde_json::from_value(value)?)
            }
            TaskType::PortScan => ScanConfig::PortScan(serde_json::from_value(value)?),
            TaskType::DomainScan => ScanConfig::DomainScan(serde_json::from_value(value)?),
            TaskType::Fingerprint => ScanConfig::Fingerprint(serde_json::from_value(value)?),
            TaskType::Xray => ScanConfig::Xray(serde_json::from_value(value)?),
            TaskType::Nuclei => ScanConfig::Nuclei(serde_json::from_value(value)?),
            TaskType::Goby => ScanConfig::Goby(serde_json::from_value(value)?),
            TaskType::IcpQuery => ScanConfig::IcpQuery(serde_json::from_value(value)?),
            TaskType::WhoisQuery => ScanConfig::WhoisQuery(serde_json::from_value(value)?),
        })
    }

    /// Encode only this variant's fields
    pub fn encode(&self) -> Result<Value, serde_json::Error> {
        match self {
            ScanConfig::OrgScan(c) => serde_json::to_value(c),
            ScanConfig::OnlineApiSearch(c) => serde_json::to_value(c),
            ScanConfig::PortScan(c) => serde_json::to_value(c),
            ScanConfig::DomainScan(c) => serde_json::to_value(c),
            ScanConfig::Fingerprint(c) => serde_json::to_value(c),
            ScanConfig::Xray(c) | ScanConfig::Nuclei(c) | ScanConfig::Goby(c) => {
                serde_json::to_value(c)
            }
            ScanConfig::IcpQuery(c) | ScanConfig::WhoisQuery(c) => serde_json::to_value(c),
        }
    }

    /// Organization/workspace scope, if the variant carries one
    pub fn scope(&self) -> Option<&Scope> {
        match self {
            ScanConfig::OrgScan(c) => Some(&c.scope),
            ScanConfig::OnlineApiSearch(c) => Some(&c.scope),
            ScanConfig::PortScan(c) => Some(&c.scope),
            ScanConfig::DomainScan(c) => Some(&c.scope),
            ScanConfig::Fingerprint(c) => Some(&c.scope),
            ScanConfig::Xray(c) | ScanConfig::Nuclei(c) | ScanConfig::Goby(c) => Some(&c.scope),
            ScanConfig::IcpQuery(_) | ScanConfig::WhoisQuery(_) => None,
        }
    }
}

/// Targets of one organization, sized for a single follow-on task
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetBatch {
    /// Organization all targets belong to
    pub org_id: Option<i64>,
    /// ip -> ports
    pub ip_ports: BTreeMap<String, Vec<u16>>,
    /// Domain names
    pub domains: BTreeSet<String>,
}

impl TargetBatch {
    /// Empty batch for an organization
    pub fn new(org_id: Option<i64>) -> Self {
        Self {
            org_id,
            ..Default::default()
        }
    }

    /// Number of targets (IPs plus domains)
    pub fn len(&self) -> usize {
        self.ip_ports.len() + self.domains.len()
    }

    /// Whether the batch holds no targets
    pub fn is_empty(&self) -> bool {
        self.ip_ports.is_empty() && self.domains.is_empty()
    }
}
