//! Core domain types

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for a worker process
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorkerId(pub String);

impl WorkerId {
    /// Create a new worker ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Build a worker ID from a hostname and process id
    pub fn from_host(hostname: &str, pid: u32) -> Self {
        let host = hostname
            .chars()
            .filter(|c| c.is_alphanumeric() || *c == '-' || *c == '.')
            .collect::<String>()
            .to_lowercase();
        Self(format!("{}@{}", pid, host))
    }

    /// Get the raw ID string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for WorkerId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for WorkerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Unique identifier for a dispatched task
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(pub String);

impl TaskId {
    /// Create a task ID from an existing string
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh random task ID
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Get the raw ID string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the ID is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Worker performance profile, selects the sub-scan concurrency limits
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PerformanceMode {
    /// More concurrent sub-scans
    High,
    /// Conservative default
    #[default]
    Normal,
}

/// Scan pipeline stage that fans out sub-scans
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanPhase {
    /// Port discovery
    Portscan,
    /// Domain and subdomain resolution
    Domainscan,
    /// Service fingerprinting
    Fingerprint,
    /// Proof-of-concept engines
    Pocscan,
}

impl fmt::Display for ScanPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanPhase::Portscan => write!(f, "portscan"),
            ScanPhase::Domainscan => write!(f, "domainscan"),
            ScanPhase::Fingerprint => write!(f, "fingerprint"),
            ScanPhase::Pocscan => write!(f, "pocscan"),
        }
    }
}

/// Controller-side task state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Queued, not yet handed to a worker
    Created,
    /// Handed to a worker
    Started,
    /// Finished without error
    Success,
    /// Finished with an error
    Failure,
    /// Canceled by an operator
    Revoked,
}

impl TaskStatus {
    /// Whether a worker may still run the task
    pub fn is_runnable(&self) -> bool {
        matches!(self, TaskStatus::Created | TaskStatus::Started)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStatus::Created => write!(f, "created"),
            TaskStatus::Started => write!(f, "started"),
            TaskStatus::Success => write!(f, "success"),
            TaskStatus::Failure => write!(f, "failure"),
            TaskStatus::Revoked => write!(f, "revoked"),
        }
    }
}
