//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from config files.
//! Defaults mirror the documented tunables: wildcard bind address, backlog
//! hint of 100, per-tick accept cap of 3000.

use std::io;
use std::net::{IpAddr, SocketAddr};

use serde::{Deserialize, Serialize};

/// Root configuration for the server process.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct Config {
    /// Listener and event-loop settings.
    pub server: ServerSettings,

    /// Protocol wrapper selection.
    pub wrapper: WrapperSelection,
}

/// Listener and event-loop settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Address to bind (IP literal; wildcard by default).
    pub bind_address: String,

    /// Port to listen on.
    pub port: u16,

    /// Hint for the OS-level pending-connection queue depth.
    pub backlog: u32,

    /// Maximum connections admitted in a single tick. Bounds how long one
    /// tick can spend accepting so a connection flood cannot starve
    /// already-open connections.
    pub accept_limit: usize,

    /// Optional TLS material for the listener.
    pub tls: Option<TlsSettings>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 65000,
            backlog: 100,
            accept_limit: 3000,
            tls: None,
        }
    }
}

impl ServerSettings {
    /// Resolve the configured bind address and port to a socket address.
    pub fn socket_addr(&self) -> io::Result<SocketAddr> {
        let ip: IpAddr = self
            .bind_address
            .parse()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        Ok(SocketAddr::new(ip, self.port))
    }

    /// Whether the listener should upgrade accepted connections to TLS.
    pub fn tls_enabled(&self) -> bool {
        self.tls.as_ref().is_some_and(TlsSettings::is_enabled)
    }
}

/// TLS material for the listener.
///
/// TLS is active iff both `cert_path` and `key_path` are non-empty. The
/// server side never authenticates clients, so self-signed certificates
/// work without extra configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct TlsSettings {
    /// Path to the certificate chain file (PEM).
    pub cert_path: String,

    /// Path to the private key file (PEM).
    pub key_path: String,

    /// Passphrase for the private key, if any.
    pub passphrase: Option<String>,
}

impl TlsSettings {
    /// TLS is enabled only when both the certificate and the key are set.
    pub fn is_enabled(&self) -> bool {
        !self.cert_path.is_empty() && !self.key_path.is_empty()
    }
}

/// Protocol wrapper selection: a name resolved through the registry plus an
/// opaque options table passed through to the wrapper's factory.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WrapperSelection {
    /// Registered wrapper name.
    pub name: String,

    /// Wrapper-specific options; the core never inspects these.
    pub options: toml::Table,
}

impl Default for WrapperSelection {
    fn default() -> Self {
        Self {
            name: "raw_tcp".to_string(),
            options: toml::Table::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_tunables() {
        let config = Config::default();
        assert_eq!(config.server.bind_address, "0.0.0.0");
        assert_eq!(config.server.port, 65000);
        assert_eq!(config.server.backlog, 100);
        assert_eq!(config.server.accept_limit, 3000);
        assert!(config.server.tls.is_none());
        assert_eq!(config.wrapper.name, "raw_tcp");
    }

    #[test]
    fn tls_enabled_requires_both_paths() {
        let mut tls = TlsSettings::default();
        assert!(!tls.is_enabled());

        tls.cert_path = "server.crt".into();
        assert!(!tls.is_enabled(), "certificate alone must not enable TLS");

        tls.key_path = "server.key".into();
        assert!(tls.is_enabled());
    }

    #[test]
    fn parses_full_config() {
        let raw = r#"
            [server]
            bind_address = "127.0.0.1"
            port = 9000
            backlog = 50
            accept_limit = 10

            [server.tls]
            cert_path = "certs/server.crt"
            key_path = "certs/server.key"

            [wrapper]
            name = "raw_tcp"

            [wrapper.options]
            greeting = "hello"
        "#;

        let config: Config = toml::from_str(raw).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.accept_limit, 10);
        assert!(config.server.tls_enabled());
        assert_eq!(
            config.wrapper.options.get("greeting").and_then(|v| v.as_str()),
            Some("hello")
        );
    }

    #[test]
    fn socket_addr_rejects_hostnames() {
        let mut settings = ServerSettings::default();
        settings.bind_address = "not-an-ip".into();
        assert!(settings.socket_addr().is_err());
    }
}
