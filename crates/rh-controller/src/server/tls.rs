//! Server-side TLS setup

use std::path::PathBuf;

use thiserror::Error;
use tokio_native_tls::TlsAcceptor;

use rh_core::config::TlsSettings;

/// TLS-related errors
#[derive(Debug, Error)]
pub enum TlsError {
    #[error("Certificate file not found: {0}")]
    CertificateNotFound(PathBuf),

    #[error("Private key file not found: {0}")]
    PrivateKeyNotFound(PathBuf),

    #[error("Failed to build TLS identity: {0}")]
    Identity(#[from] native_tls::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Load the PEM certificate chain and PKCS#8 key into an acceptor
pub fn load_acceptor(settings: &TlsSettings) -> Result<TlsAcceptor, TlsError> {
    if !settings.cert_path.exists() {
        return Err(TlsError::CertificateNotFound(settings.cert_path.clone()));
    }
    if !settings.key_path.exists() {
        return Err(TlsError::PrivateKeyNotFound(settings.key_path.clone()));
    }

    let cert = std::fs::read(&settings.cert_path)?;
    let key = std::fs::read(&settings.key_path)?;
    let identity = native_tls::Identity::from_pkcs8(&cert, &key)?;
    let acceptor = native_tls::TlsAcceptor::new(identity)?;

    tracing::info!("Loaded TLS certificate from {:?}", settings.cert_path);
    Ok(TlsAcceptor::from(acceptor))
}
