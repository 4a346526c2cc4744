//! Controller configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for the controller daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Address the RPC server binds to
    pub bind_address: String,

    /// Shared secret every call must present; generated at startup when empty
    pub auth_key: String,

    /// Transport security
    pub tls: TlsSettings,

    /// Directory whose changes require workers to resync
    pub sync_dir: Option<PathBuf>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:5001".to_string(),
            auth_key: String::new(),
            tls: TlsSettings::default(),
            sync_dir: None,
        }
    }
}

/// Server-side TLS settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsSettings {
    /// Serve TLS instead of plaintext
    pub enabled: bool,

    /// PEM certificate chain
    pub cert_path: PathBuf,

    /// PEM PKCS#8 private key
    pub key_path: PathBuf,
}
