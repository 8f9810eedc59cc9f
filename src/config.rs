use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::fetch::FetchPolicy;
use crate::logging::LogLevel;

pub const CONFIG_PATH_VAR: &str = "RESEARCH_PROXY_CONFIG";
pub const PORT_VAR: &str = "RESEARCH_PROXY_PORT";

/// How callers name the upstream. One mode per deployment, never both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressingMode {
    /// Caller picks a key from the static endpoint table.
    FixedEndpoint,
    /// Caller supplies a URL that must pass the host allowlist and address checks.
    RawUrl,
}

/// One row of the fixed endpoint table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EndpointConfig {
    pub key: String,
    pub base_url: String,
    #[serde(default = "default_symbol_param")]
    pub symbol_param: String,
}

fn default_symbol_param() -> String {
    "symbols".to_string()
}

/// Process-wide configuration, loaded once at startup and never mutated.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    pub bind_address: String,
    pub port: u16,
    pub log_level: LogLevel,
    pub addressing: AddressingMode,
    pub endpoints: Vec<EndpointConfig>,
    pub allowed_hosts: Vec<String>,
    pub fetch: FetchPolicy,
    pub dns_timeout_ms: u64,
    /// Trusted header carrying the user id, set by the session layer in front of us.
    pub identity_header: String,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self::yahoo_fixed_endpoint()
    }
}

/// Where [`ProxyConfig::load`] found its settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    File(PathBuf),
    Preset,
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigSource::File(path) => write!(f, "{}", path.display()),
            ConfigSource::Preset => write!(f, "built-in yahoo preset ({CONFIG_PATH_VAR} not set)"),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid RESEARCH_PROXY_PORT value: {0}")]
    InvalidPort(String),

    #[error("endpoint '{key}': {reason}")]
    InvalidEndpoint { key: String, reason: String },

    #[error("duplicate endpoint key '{0}'")]
    DuplicateEndpoint(String),

    #[error("allowed host entries must be non-empty hostnames: {0:?}")]
    InvalidAllowedHost(String),

    #[error("fetch policy: {0}")]
    InvalidFetchPolicy(&'static str),

    #[error("identity header name must not be empty")]
    InvalidIdentityHeader,
}

impl ProxyConfig {
    /// Fixed-endpoint deployment against Yahoo Finance, with the raw-URL
    /// allowlist pre-populated for operators who switch modes.
    pub fn yahoo_fixed_endpoint() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 3000,
            log_level: LogLevel::Info,
            addressing: AddressingMode::FixedEndpoint,
            endpoints: vec![EndpointConfig {
                key: "yahoo".to_string(),
                base_url: "https://query1.finance.yahoo.com/v7/finance/quote".to_string(),
                symbol_param: default_symbol_param(),
            }],
            allowed_hosts: vec![
                "api.github.com".to_string(),
                "query1.finance.yahoo.com".to_string(),
                "jsonplaceholder.typicode.com".to_string(),
            ],
            fetch: FetchPolicy::default(),
            dns_timeout_ms: 5_000,
            identity_header: "x-authenticated-user".to_string(),
        }
    }

    /// Reads the TOML file named by `RESEARCH_PROXY_CONFIG`, or falls back to
    /// the Yahoo preset. `RESEARCH_PROXY_PORT` overrides the port either way.
    ///
    /// Runs before the subscriber exists, so it reports where the config came
    /// from instead of logging it.
    pub fn load() -> Result<(Self, ConfigSource), ConfigError> {
        Self::load_from(env::var(CONFIG_PATH_VAR).ok(), env::var(PORT_VAR).ok())
    }

    fn load_from(
        path: Option<String>,
        port: Option<String>,
    ) -> Result<(Self, ConfigSource), ConfigError> {
        let (mut config, source) = match path {
            Some(path) => {
                let path = PathBuf::from(path);
                (Self::from_file(&path)?, ConfigSource::File(path))
            }
            None => (Self::yahoo_fixed_endpoint(), ConfigSource::Preset),
        };

        if let Some(port) = port {
            config.port = port
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidPort(port.clone()))?;
        }

        config.validate()?;
        Ok((config, source))
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    /// Scalar checks. Endpoint URLs are validated when the tables are frozen.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.fetch.validate()?;
        if self.dns_timeout_ms == 0 {
            return Err(ConfigError::InvalidFetchPolicy("dns_timeout_ms must be > 0"));
        }
        if self.identity_header.trim().is_empty() {
            return Err(ConfigError::InvalidIdentityHeader);
        }
        if let Some(host) = self
            .allowed_hosts
            .iter()
            .find(|h| h.trim().is_empty() || h.contains(|c: char| matches!(c, '/' | ':' | '@' | ' ')))
        {
            return Err(ConfigError::InvalidAllowedHost(host.clone()));
        }
        Ok(())
    }

    pub fn dns_timeout(&self) -> Duration {
        Duration::from_millis(self.dns_timeout_ms)
    }

    pub fn bind_target(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preset_is_valid_fixed_endpoint_deployment() {
        let config = ProxyConfig::yahoo_fixed_endpoint();
        assert!(config.validate().is_ok());
        assert_eq!(config.addressing, AddressingMode::FixedEndpoint);
        assert_eq!(config.endpoints[0].key, "yahoo");
        assert_eq!(config.endpoints[0].symbol_param, "symbols");
        assert_eq!(config.fetch.max_response_bytes, 1_000_000);
        assert_eq!(config.bind_target(), "0.0.0.0:3000");
    }

    #[test]
    fn parses_raw_url_deployment_from_toml() {
        let config = ProxyConfig::from_toml_str(
            r#"
            port = 8081
            log_level = "debug"
            addressing = "raw_url"
            allowed_hosts = ["query1.finance.yahoo.com"]

            [fetch]
            connect_timeout_ms = 1000
            response_timeout_ms = 2000
            read_timeout_ms = 3000
            max_response_bytes = 4096
            "#,
        )
        .unwrap();

        assert_eq!(config.port, 8081);
        assert_eq!(config.log_level, LogLevel::Debug);
        assert_eq!(config.addressing, AddressingMode::RawUrl);
        assert_eq!(config.allowed_hosts, vec!["query1.finance.yahoo.com"]);
        assert_eq!(config.fetch.read_timeout_ms, 3000);
        assert_eq!(config.fetch.max_response_bytes, 4096);
        // unspecified fields keep preset defaults
        assert_eq!(config.bind_address, "0.0.0.0");
        assert_eq!(config.endpoints.len(), 1);
    }

    #[test]
    fn endpoint_symbol_param_defaults() {
        let config = ProxyConfig::from_toml_str(
            r#"
            [[endpoints]]
            key = "finnhub"
            base_url = "https://finnhub.io/api/v1/quote"
            "#,
        )
        .unwrap();
        assert_eq!(config.endpoints.len(), 1);
        assert_eq!(config.endpoints[0].symbol_param, "symbols");
    }

    #[test]
    fn rejects_unknown_addressing_mode() {
        let err = ProxyConfig::from_toml_str(r#"addressing = "anything""#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn validation_rejects_bad_values() {
        let mut config = ProxyConfig::yahoo_fixed_endpoint();
        config.fetch.max_response_bytes = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidFetchPolicy(_))
        ));

        let mut config = ProxyConfig::yahoo_fixed_endpoint();
        config.allowed_hosts.push("evil.com/path".to_string());
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidAllowedHost(_))
        ));

        let mut config = ProxyConfig::yahoo_fixed_endpoint();
        config.identity_header = " ".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidIdentityHeader)
        ));
    }

    #[test]
    fn load_reports_source_and_applies_port_override() {
        let (config, source) = ProxyConfig::load_from(None, Some(" 8080 ".to_string())).unwrap();
        assert_eq!(source, ConfigSource::Preset);
        assert_eq!(config.port, 8080);
        assert!(source.to_string().contains(CONFIG_PATH_VAR));

        let err = ProxyConfig::load_from(None, Some("http".to_string())).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPort(p) if p == "http"));
    }

    #[test]
    fn load_reads_named_file() {
        let path = env::temp_dir().join(format!("research-proxy-{}.toml", std::process::id()));
        fs::write(&path, "port = 9090\nlog_level = \"warn\"\n").unwrap();

        let (config, source) =
            ProxyConfig::load_from(Some(path.display().to_string()), None).unwrap();
        assert_eq!(config.port, 9090);
        assert_eq!(config.log_level, LogLevel::Warn);
        assert_eq!(source, ConfigSource::File(path.clone()));

        fs::remove_file(&path).unwrap();
        let err = ProxyConfig::load_from(Some(path.display().to_string()), None).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
