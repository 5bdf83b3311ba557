//! TLS configuration and certificate loading.

use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;

use thiserror::Error;

use crate::config::schema::TlsSettings;

/// Error type for TLS material loading.
#[derive(Debug, Error)]
pub enum TlsError {
    #[error("failed to read '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("no certificates found in '{0}'")]
    NoCertificates(String),

    #[error("no private key found in '{0}'")]
    NoPrivateKey(String),

    #[error("encrypted private keys are not supported; '{0}' requires a passphrase")]
    EncryptedKey(String),

    #[error("invalid TLS material: {0}")]
    Rustls(#[from] rustls::Error),
}

/// Server-side TLS context built from configured material.
///
/// Disabled unless both a certificate and a private key were configured;
/// a disabled acceptor silently leaves connections in plaintext, so a
/// half-configured listener (certificate without key) never attempts a
/// handshake. Client certificates are never requested.
#[derive(Debug, Clone, Default)]
pub struct TlsAcceptor {
    config: Option<Arc<rustls::ServerConfig>>,
}

impl TlsAcceptor {
    /// An acceptor that performs no TLS upgrade.
    pub fn disabled() -> Self {
        Self { config: None }
    }

    /// Load certificate and key from the configured paths.
    ///
    /// Returns a disabled acceptor when the settings do not enable TLS.
    pub fn from_settings(settings: &TlsSettings) -> Result<Self, TlsError> {
        if !settings.is_enabled() {
            return Ok(Self::disabled());
        }

        let certs = rustls_pemfile::certs(&mut open(&settings.cert_path)?)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|source| TlsError::Io {
                path: settings.cert_path.clone(),
                source,
            })?;
        if certs.is_empty() {
            return Err(TlsError::NoCertificates(settings.cert_path.clone()));
        }

        let key = rustls_pemfile::private_key(&mut open(&settings.key_path)?)
            .map_err(|source| TlsError::Io {
                path: settings.key_path.clone(),
                source,
            })?
            .ok_or_else(|| {
                // rustls-pemfile yields nothing for passphrase-protected PEM.
                if settings.passphrase.is_some() {
                    TlsError::EncryptedKey(settings.key_path.clone())
                } else {
                    TlsError::NoPrivateKey(settings.key_path.clone())
                }
            })?;

        if settings.passphrase.is_some() {
            tracing::debug!(
                key_path = %settings.key_path,
                "private key is not encrypted; ignoring configured passphrase"
            );
        }

        let config = rustls::ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(certs, key)?;

        Ok(Self {
            config: Some(Arc::new(config)),
        })
    }

    /// Whether accepted connections should be upgraded to TLS.
    pub fn is_enabled(&self) -> bool {
        self.config.is_some()
    }

    /// The rustls server config backing new sessions, when enabled.
    pub fn server_config(&self) -> Option<Arc<rustls::ServerConfig>> {
        self.config.clone()
    }
}

fn open(path: &str) -> Result<BufReader<File>, TlsError> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|source| TlsError::Io {
            path: path.to_string(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn half_configured_settings_stay_disabled() {
        let settings = TlsSettings {
            cert_path: "certs/server.crt".into(),
            key_path: String::new(),
            passphrase: None,
        };

        let acceptor = TlsAcceptor::from_settings(&settings).unwrap();
        assert!(!acceptor.is_enabled());
        assert!(acceptor.server_config().is_none());
    }

    #[test]
    fn missing_certificate_file_is_an_io_error() {
        let settings = TlsSettings {
            cert_path: "/nonexistent/server.crt".into(),
            key_path: "/nonexistent/server.key".into(),
            passphrase: None,
        };

        let err = TlsAcceptor::from_settings(&settings).unwrap_err();
        assert!(matches!(err, TlsError::Io { .. }));
    }
}
