//! Scan results and the containers sub-scans merge into
//!
//! Each running task owns one container per result kind. Sub-scans running in
//! parallel merge into them under the container's lock, so a snapshot taken
//! after the phase joins reflects every completed sub-scan and nothing partial.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};

/// What was found on one open port
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub banner: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fingerprints: Vec<String>,
}

/// Everything known about one IP address
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IpResult {
    pub ip: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub org_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub ports: BTreeMap<u16, PortResult>,
}

impl IpResult {
    /// Result for an IP with no ports yet
    pub fn new(ip: impl Into<String>) -> Self {
        Self {
            ip: ip.into(),
            ..Default::default()
        }
    }

    /// Builder-style port insertion
    pub fn with_port(mut self, port: u16, result: PortResult) -> Self {
        self.ports.insert(port, result);
        self
    }
}

/// Everything known about one domain name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DomainResult {
    pub domain: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub org_id: Option<i64>,
    pub ips: BTreeSet<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub cnames: Vec<String>,
    /// Strategy that discovered the name (subfinder, brute, crawler, ...)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discovery: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fingerprints: Vec<String>,
}

impl DomainResult {
    /// Result for a domain with nothing resolved yet
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            ..Default::default()
        }
    }
}

/// One proof-of-concept hit
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VulnerabilityFinding {
    /// Engine that produced the finding (xray, nuclei, goby)
    pub source: String,
    pub target: String,
    pub url: String,
    pub name: String,
    pub poc_file: String,
    pub severity: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra: Option<String>,
}

/// ip -> result
pub type IpResultMap = BTreeMap<String, IpResult>;

/// domain -> result
pub type DomainResultMap = BTreeMap<String, DomainResult>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // A panicking sub-scan never holds the lock across a partial merge
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Keyed result container, last write wins per key
#[derive(Debug)]
pub struct KeyedResults<V> {
    inner: Mutex<BTreeMap<String, V>>,
}

impl<V> Default for KeyedResults<V> {
    fn default() -> Self {
        Self {
            inner: Mutex::new(BTreeMap::new()),
        }
    }
}

impl<V: Clone> KeyedResults<V> {
    /// Empty container
    pub fn new() -> Self {
        Self::default()
    }

    /// Container seeded with existing results
    pub fn from_map(map: BTreeMap<String, V>) -> Self {
        Self {
            inner: Mutex::new(map),
        }
    }

    /// Merge a sub-scan's results, overwriting existing keys
    pub fn merge(&self, partial: BTreeMap<String, V>) {
        let mut guard = lock(&self.inner);
        for (key, value) in partial {
            guard.insert(key, value);
        }
    }

    /// Insert or replace one entry
    pub fn insert(&self, key: impl Into<String>, value: V) {
        lock(&self.inner).insert(key.into(), value);
    }

    /// Copy of the current contents
    pub fn snapshot(&self) -> BTreeMap<String, V> {
        lock(&self.inner).clone()
    }

    /// Number of keys
    pub fn len(&self) -> usize {
        lock(&self.inner).len()
    }

    /// Whether the container is empty
    pub fn is_empty(&self) -> bool {
        lock(&self.inner).is_empty()
    }

    /// Take the contents, consuming the container
    pub fn into_inner(self) -> BTreeMap<String, V> {
        self.inner.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

/// IP results of one task
pub type IpResults = KeyedResults<IpResult>;

/// Domain results of one task
pub type DomainResults = KeyedResults<DomainResult>;

/// Vulnerability findings of one task
///
/// Append-only: the same finding appended twice is stored twice.
/// Deduplication is left to the controller.
#[derive(Debug, Default)]
pub struct VulnerabilityResults {
    inner: Mutex<Vec<VulnerabilityFinding>>,
}

impl VulnerabilityResults {
    /// Empty list
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a sub-scan's findings
    pub fn append(&self, findings: Vec<VulnerabilityFinding>) {
        lock(&self.inner).extend(findings);
    }

    /// Copy of the current findings
    pub fn snapshot(&self) -> Vec<VulnerabilityFinding> {
        lock(&self.inner).clone()
    }

    /// Number of findings
    pub fn len(&self) -> usize {
        lock(&self.inner).len()
    }

    /// Whether no findings were recorded
    pub fn is_empty(&self) -> bool {
        lock(&self.inner).is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn ip_map(ip: &str, ports: &[u16]) -> IpResultMap {
        let mut result = IpResult::new(ip);
        for port in ports {
            result.ports.insert(*port, PortResult::default());
        }
        BTreeMap::from([(ip.to_string(), result)])
    }

    fn finding(target: &str) -> VulnerabilityFinding {
        VulnerabilityFinding {
            source: "nuclei".into(),
            target: target.into(),
            name: "weak-login".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_ip_merge_twice_equals_once() {
        let once = IpResults::new();
        once.merge(ip_map("10.0.0.1", &[80, 443]));

        let twice = IpResults::new();
        twice.merge(ip_map("10.0.0.1", &[80, 443]));
        twice.merge(ip_map("10.0.0.1", &[80, 443]));

        assert_eq!(once.snapshot(), twice.snapshot());
        assert_eq!(twice.len(), 1);
    }

    #[test]
    fn test_domain_merge_overwrites_key() {
        let results = DomainResults::new();
        let mut first = DomainResult::new("a.example.com");
        first.ips.insert("10.0.0.1".into());
        results.insert("a.example.com", first);

        let mut second = DomainResult::new("a.example.com");
        second.ips.insert("10.0.0.2".into());
        results.merge(BTreeMap::from([("a.example.com".to_string(), second.clone())]));

        assert_eq!(results.snapshot()["a.example.com"], second);
    }

    #[test]
    fn test_vulnerability_append_twice_duplicates() {
        let results = VulnerabilityResults::new();
        let batch = vec![finding("10.0.0.1:80")];
        results.append(batch.clone());
        results.append(batch);

        let snapshot = results.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0], snapshot[1]);
    }

    #[test]
    fn test_concurrent_merge() {
        let results = Arc::new(IpResults::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let results = Arc::clone(&results);
                std::thread::spawn(move || {
                    results.merge(ip_map(&format!("10.0.0.{}", i), &[22]));
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(results.len(), 8);
    }

    #[test]
    fn test_port_keys_roundtrip_through_json() {
        let map = ip_map("10.0.0.1", &[443]);
        let json = serde_json::to_string(&map).unwrap();
        let parsed: IpResultMap = serde_json::from_str(&json).unwrap();
        assert!(parsed["10.0.0.1"].ports.contains_key(&443));
    }
}
