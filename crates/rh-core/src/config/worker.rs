//! Worker configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::serde_utils::duration_secs;

/// Configuration for a worker process
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Controller RPC address
    pub controller_address: String,

    /// Shared secret sent with every call
    pub auth_key: String,

    /// Transport security
    pub tls: ClientTlsSettings,

    /// Worker name (optional, defaults to hostname)
    pub worker_name: Option<String>,

    /// Per-call reply timeout
    #[serde(with = "duration_secs")]
    pub call_timeout: Duration,

    /// Delay between polls when the queue is empty
    #[serde(with = "duration_secs")]
    pub poll_interval: Duration,

    /// Heartbeat interval
    #[serde(with = "duration_secs")]
    pub keepalive_interval: Duration,

    /// Backoff while the controller is unreachable
    pub backoff: BackoffConfig,

    /// Scan settings file, reread before every phase
    pub settings_path: PathBuf,

    /// Command run when the controller requests a resync
    pub sync_command: Option<String>,

    /// Directory holding the custom IP location files
    pub ip_location_dir: Option<PathBuf>,

    /// Tasks run concurrently by this worker
    pub max_parallel_tasks: usize,

    /// External proof-of-concept engines
    pub engines: EngineCommands,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            controller_address: "127.0.0.1:5001".to_string(),
            auth_key: String::new(),
            tls: ClientTlsSettings::default(),
            worker_name: None,
            call_timeout: Duration::from_secs(60),
            poll_interval: Duration::from_secs(5),
            keepalive_interval: Duration::from_secs(30),
            backoff: BackoffConfig::default(),
            settings_path: super::default_config_path("settings.toml"),
            sync_command: None,
            ip_location_dir: None,
            max_parallel_tasks: 1,
            engines: EngineCommands::default(),
        }
    }
}

impl WorkerConfig {
    /// Local hostname
    pub fn hostname(&self) -> String {
        gethostname::gethostname().to_string_lossy().into_owned()
    }

    /// Worker name, falling back to the hostname
    pub fn worker_name(&self) -> String {
        self.worker_name.clone().unwrap_or_else(|| self.hostname())
    }
}

/// Command lines of the external proof-of-concept engines
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineCommands {
    pub xray: Option<CommandSpec>,
    pub nuclei: Option<CommandSpec>,
    pub goby: Option<CommandSpec>,
}

/// One external command
///
/// `{target}` and `{poc_file}` in the arguments are substituted per
/// invocation. The command must print one JSON finding per line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

/// Client-side TLS settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientTlsSettings {
    /// Connect with TLS
    pub enabled: bool,

    /// Extra PEM root certificate to trust
    pub ca_cert_path: Option<PathBuf>,

    /// Accept self-signed or mismatched certificates
    pub accept_invalid_certs: bool,

    /// Name to verify, defaults to the host part of the address
    pub server_name: Option<String>,
}

/// Exponential backoff configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    /// Initial delay
    #[serde(with = "duration_secs")]
    pub initial: Duration,

    /// Maximum delay
    #[serde(with = "duration_secs")]
    pub max: Duration,

    /// Multiplier for each retry
    pub multiplier: f64,

    /// Jitter factor (0.0 to 1.0)
    pub jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(60),
            multiplier: 2.0,
            jitter: 0.25,
        }
    }
}
