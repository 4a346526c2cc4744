//! Client-side TLS setup

use tokio_native_tls::TlsConnector;

use rh_core::config::ClientTlsSettings;
use rh_core::RpcError;

/// Build a connector from the worker's TLS settings
pub fn load_connector(settings: &ClientTlsSettings) -> Result<TlsConnector, RpcError> {
    let mut builder = native_tls::TlsConnector::builder();

    if let Some(path) = &settings.ca_cert_path {
        let pem = std::fs::read(path)
            .map_err(|e| RpcError::Tls(format!("failed to read CA {}: {}", path.display(), e)))?;
        let cert = native_tls::Certificate::from_pem(&pem)
            .map_err(|e| RpcError::Tls(format!("invalid CA {}: {}", path.display(), e)))?;
        builder.add_root_certificate(cert);
    }

    if settings.accept_invalid_certs {
        tracing::warn!("TLS certificate verification is disabled");
        builder
            .danger_accept_invalid_certs(true)
            .danger_accept_invalid_hostnames(true);
    }

    let connector = builder.build().map_err(|e| RpcError::Tls(e.to_string()))?;
    Ok(TlsConnector::from(connector))
}

/// Name to verify against the server certificate
pub fn server_name(settings: &ClientTlsSettings, address: &str) -> String {
    if let Some(name) = &settings.server_name {
        return name.clone();
    }
    address
        .rsplit_once(':')
        .map(|(host, _)| host)
        .unwrap_or(address)
        .trim_start_matches('[')
        .trim_end_matches(']')
        .to_string()
}
