//! Launch configuration.
//!
//! `LaunchSettings` holds what the operator supplied (flags or `ETHVAL_*`
//! environment variables). `ServerConfig::from_settings` validates it once at
//! startup; every later component receives the validated values.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use validator_services::BackendConfig;
use validator_transport::TransportConfig;

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_SHUTDOWN_GRACE_SECS: u64 = 5;
pub const DEFAULT_SESSION_TTL_SECS: u64 = 30 * 60;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("required env var not set: {0}")]
    Missing(&'static str),
    #[error("required config value not set or bad value: {key} ({reason})")]
    Invalid { key: &'static str, reason: String },
}

impl ConfigError {
    /// What the operator should do about it.
    pub fn hint(&self) -> &'static str {
        match self {
            ConfigError::Missing("DEFAULT_API_KEY") | ConfigError::Invalid { key: "DEFAULT_API_KEY", .. } => {
                "This application requires an API Key for security reasons. Set ETHVAL_DEFAULT_API_KEY or pass --default-api-key."
            }
            ConfigError::Missing("PORT") | ConfigError::Invalid { key: "PORT", .. } => {
                "Set ETHVAL_PORT or pass --port with a value between 1024 and 65535."
            }
            ConfigError::Missing("BACKEND_ENDPOINT") | ConfigError::Invalid { key: "BACKEND_ENDPOINT", .. } => {
                "Set ETHVAL_BACKEND_ENDPOINT to the http(s) URL of your Ethereum node provider."
            }
            _ => "Check the ETHVAL_* environment variables and command line flags.",
        }
    }
}

/// Raw launch options, before validation.
#[derive(Debug, Clone, Default)]
pub struct LaunchSettings {
    pub port: Option<u16>,
    pub host: Option<String>,
    pub default_api_key: Option<SecretString>,
    pub backend_endpoint: Option<String>,
    pub backend_token: Option<SecretString>,
    pub log_file: bool,
    pub request_timeout_secs: Option<u64>,
    pub shutdown_grace_secs: Option<u64>,
    /// 0 disables idle expiry
    pub session_ttl_secs: Option<u64>,
    pub no_cors: bool,
}

/// Validated server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    pub api_key: SecretString,
    pub backend: BackendConfig,
    pub log_file: bool,
    pub request_timeout: Duration,
    pub shutdown_grace: Duration,
    pub session_ttl: Option<Duration>,
    pub enable_cors: bool,
}

impl ServerConfig {
    pub fn from_settings(settings: LaunchSettings) -> Result<Self, ConfigError> {
        let api_key = settings
            .default_api_key
            .filter(|key| !key.expose_secret().trim().is_empty())
            .ok_or(ConfigError::Missing("DEFAULT_API_KEY"))?;

        let port = settings.port.ok_or(ConfigError::Missing("PORT"))?;
        if port < 1024 {
            return Err(ConfigError::Invalid {
                key: "PORT",
                reason: format!("{port} is below 1024"),
            });
        }

        let endpoint = settings
            .backend_endpoint
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty())
            .ok_or(ConfigError::Missing("BACKEND_ENDPOINT"))?;
        if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
            return Err(ConfigError::Invalid {
                key: "BACKEND_ENDPOINT",
                reason: "must start with http:// or https://".into(),
            });
        }

        let host = settings
            .host
            .filter(|h| !h.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_HOST.to_string());

        let request_timeout = positive_secs(
            "REQUEST_TIMEOUT_SECS",
            settings.request_timeout_secs.unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
        )?;
        let shutdown_grace = positive_secs(
            "SHUTDOWN_GRACE_SECS",
            settings.shutdown_grace_secs.unwrap_or(DEFAULT_SHUTDOWN_GRACE_SECS),
        )?;
        let session_ttl = match settings.session_ttl_secs.unwrap_or(DEFAULT_SESSION_TTL_SECS) {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };

        Ok(Self {
            port,
            host,
            api_key,
            backend: BackendConfig {
                endpoint,
                token: settings.backend_token.unwrap_or_else(|| SecretString::from("")),
            },
            log_file: settings.log_file,
            request_timeout,
            shutdown_grace,
            session_ttl,
            enable_cors: !settings.no_cors,
        })
    }

    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig {
            port: self.port,
            hostname: self.host.clone(),
            api_key: self.api_key.clone(),
            enable_cors: self.enable_cors,
            request_timeout: self.request_timeout,
            shutdown_grace: self.shutdown_grace,
            session_ttl: self.session_ttl,
        }
    }
}

fn positive_secs(key: &'static str, secs: u64) -> Result<Duration, ConfigError> {
    if secs == 0 {
        return Err(ConfigError::Invalid { key, reason: "must be greater than 0".into() });
    }
    Ok(Duration::from_secs(secs))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> LaunchSettings {
        LaunchSettings {
            port: Some(8080),
            default_api_key: Some(SecretString::from("key")),
            backend_endpoint: Some("https://node.example".into()),
            backend_token: Some(SecretString::from("tok")),
            ..Default::default()
        }
    }

    #[test]
    fn applies_defaults() {
        let config = ServerConfig::from_settings(settings()).unwrap();
        assert_eq!(config.host, DEFAULT_HOST);
        assert_eq!(config.request_timeout, Duration::from_secs(60));
        assert_eq!(config.shutdown_grace, Duration::from_secs(5));
        assert_eq!(config.session_ttl, Some(Duration::from_secs(1800)));
        assert!(config.enable_cors);
        assert!(!config.log_file);
        assert_eq!(config.backend.token.expose_secret(), "tok");
    }

    #[test]
    fn api_key_is_required() {
        let missing = LaunchSettings { default_api_key: None, ..settings() };
        assert_eq!(
            ServerConfig::from_settings(missing).unwrap_err(),
            ConfigError::Missing("DEFAULT_API_KEY")
        );

        let blank = LaunchSettings { default_api_key: Some(SecretString::from("  ")), ..settings() };
        let err = ServerConfig::from_settings(blank).unwrap_err();
        assert_eq!(err, ConfigError::Missing("DEFAULT_API_KEY"));
        assert!(err.hint().contains("API Key"));
    }

    #[test]
    fn port_bounds() {
        let missing = LaunchSettings { port: None, ..settings() };
        assert_eq!(ServerConfig::from_settings(missing).unwrap_err(), ConfigError::Missing("PORT"));

        let low = LaunchSettings { port: Some(1023), ..settings() };
        assert!(matches!(
            ServerConfig::from_settings(low),
            Err(ConfigError::Invalid { key: "PORT", .. })
        ));

        let edge = LaunchSettings { port: Some(1024), ..settings() };
        assert_eq!(ServerConfig::from_settings(edge).unwrap().port, 1024);
    }

    #[test]
    fn backend_endpoint_must_be_http() {
        let missing = LaunchSettings { backend_endpoint: Some("   ".into()), ..settings() };
        assert_eq!(
            ServerConfig::from_settings(missing).unwrap_err(),
            ConfigError::Missing("BACKEND_ENDPOINT")
        );

        let bad = LaunchSettings { backend_endpoint: Some("ws://node".into()), ..settings() };
        assert!(matches!(
            ServerConfig::from_settings(bad),
            Err(ConfigError::Invalid { key: "BACKEND_ENDPOINT", .. })
        ));
    }

    #[test]
    fn zero_timeouts_rejected_but_zero_ttl_disables_expiry() {
        let zero = LaunchSettings { request_timeout_secs: Some(0), ..settings() };
        assert!(ServerConfig::from_settings(zero).is_err());

        let zero = LaunchSettings { shutdown_grace_secs: Some(0), ..settings() };
        assert!(ServerConfig::from_settings(zero).is_err());

        let no_ttl = LaunchSettings { session_ttl_secs: Some(0), ..settings() };
        assert_eq!(ServerConfig::from_settings(no_ttl).unwrap().session_ttl, None);
    }

    #[test]
    fn transport_config_carries_values() {
        let settings = LaunchSettings {
            host: Some("127.0.0.1".into()),
            no_cors: true,
            ..settings()
        };
        let transport = ServerConfig::from_settings(settings).unwrap().transport_config();
        assert_eq!(transport.port, 8080);
        assert_eq!(transport.hostname, "127.0.0.1");
        assert!(!transport.enable_cors);
        assert_eq!(transport.api_key.expose_secret(), "key");
        assert!(transport.validate().is_ok());
    }
}
