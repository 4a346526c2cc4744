//! Scan settings reread by workers before every phase

use serde::{Deserialize, Serialize};

use crate::types::{PerformanceMode, ScanPhase};

/// Tunables that can change while a worker runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanSettings {
    /// Selects the concurrency limits
    pub performance_mode: PerformanceMode,

    /// Sub-scan limits per mode
    pub concurrency: ConcurrencyLimits,

    pub portscan: PortscanSettings,

    pub domainscan: DomainscanSettings,

    pub fingerprint: FingerprintSettings,

    /// Upper bound on targets per follow-on task
    pub max_batch_targets: usize,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            performance_mode: PerformanceMode::Normal,
            concurrency: ConcurrencyLimits::default(),
            portscan: PortscanSettings::default(),
            domainscan: DomainscanSettings::default(),
            fingerprint: FingerprintSettings::default(),
            max_batch_targets: 256,
        }
    }
}

impl ScanSettings {
    /// Concurrency limit for a phase under the configured mode
    pub fn limit(&self, phase: ScanPhase) -> usize {
        self.concurrency.limit(self.performance_mode, phase)
    }
}

/// Per-phase sub-scan limits for both performance modes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConcurrencyLimits {
    pub high: PhaseLimits,
    pub normal: PhaseLimits,
}

impl Default for ConcurrencyLimits {
    fn default() -> Self {
        Self {
            high: PhaseLimits::uniform(4),
            normal: PhaseLimits::uniform(2),
        }
    }
}

impl ConcurrencyLimits {
    /// Limit for a phase under a mode, never below one
    pub fn limit(&self, mode: PerformanceMode, phase: ScanPhase) -> usize {
        let limits = match mode {
            PerformanceMode::High => &self.high,
            PerformanceMode::Normal => &self.normal,
        };
        let value = match phase {
            ScanPhase::Portscan => limits.portscan,
            ScanPhase::Domainscan => limits.domainscan,
            ScanPhase::Fingerprint => limits.fingerprint,
            ScanPhase::Pocscan => limits.pocscan,
        };
        value.max(1)
    }
}

/// Sub-scan limits of one mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhaseLimits {
    pub portscan: usize,
    pub domainscan: usize,
    pub fingerprint: usize,
    pub pocscan: usize,
}

impl PhaseLimits {
    /// Same limit for every phase
    pub fn uniform(limit: usize) -> Self {
        Self {
            portscan: limit,
            domainscan: limit,
            fingerprint: limit,
            pocscan: limit,
        }
    }
}

impl Default for PhaseLimits {
    fn default() -> Self {
        Self::uniform(2)
    }
}

/// Port scanner options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortscanSettings {
    /// Backend: nmap, masscan, masnmap or connect
    pub cmd_bin: String,
    /// Packets per second
    pub rate: u32,
    /// Scan technique, e.g. "-sS"
    pub tech: String,
    /// Ping before scanning
    pub is_ping: bool,
    /// Ports used when a target has no explicit list
    pub default_ports: String,
}

impl Default for PortscanSettings {
    fn default() -> Self {
        Self {
            cmd_bin: "connect".to_string(),
            rate: 1000,
            tech: "-sS".to_string(),
            is_ping: false,
            default_ports: "80,443,8080".to_string(),
        }
    }
}

/// Domain scanner options
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DomainscanSettings {
    /// Drop results hosted behind a CDN
    pub ignore_cdn: bool,
    /// Drop results located outside mainland China
    pub ignore_out_of_china: bool,
    /// Port-scan the IPs domains resolve to
    pub port_scan: bool,
    /// Port expression for that pass
    pub port_expr: Option<String>,
}

/// Fingerprint techniques
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FingerprintSettings {
    pub httpx: bool,
    pub screenshot: bool,
    pub fingerprinthub: bool,
    pub iconhash: bool,
}

impl FingerprintSettings {
    /// At least one technique is enabled
    pub fn any(&self) -> bool {
        self.httpx || self.screenshot || self.fingerprinthub || self.iconhash
    }
}

impl Default for FingerprintSettings {
    fn default() -> Self {
        Self {
            httpx: true,
            screenshot: false,
            fingerprinthub: false,
            iconhash: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_limits() {
        let limits = ConcurrencyLimits::default();
        assert_eq!(limits.limit(PerformanceMode::High, ScanPhase::Portscan), 4);
        assert_eq!(limits.limit(PerformanceMode::Normal, ScanPhase::Portscan), 2);
        assert_eq!(limits.limit(PerformanceMode::Normal, ScanPhase::Pocscan), 2);
    }

    #[test]
    fn test_zero_limit_clamped() {
        let mut limits = ConcurrencyLimits::default();
        limits.high.domainscan = 0;
        assert_eq!(limits.limit(PerformanceMode::High, ScanPhase::Domainscan), 1);
    }

    #[test]
    fn test_settings_from_toml() {
        let settings: ScanSettings = toml::from_str(
            r#"
            performance_mode = "high"
            max_batch_targets = 50

            [concurrency.high]
            portscan = 8

            [portscan]
            cmd_bin = "masnmap"

            [domainscan]
            port_scan = true
            "#,
        )
        .unwrap();
        assert_eq!(settings.limit(ScanPhase::Portscan), 8);
        assert_eq!(settings.limit(ScanPhase::Fingerprint), 2);
        assert_eq!(settings.portscan.cmd_bin, "masnmap");
        assert!(settings.domainscan.port_scan);
        assert_eq!(settings.max_batch_targets, 50);
    }
}
