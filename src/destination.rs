//! Destination policy engine.
//!
//! Decides which upstream URL a lookup may reach. Two strategies exist and a
//! deployment runs exactly one of them:
//!
//! - [`EndpointTable`]: the caller names a key, the URL comes from a frozen
//!   table. No caller-controlled URL text and no network I/O.
//! - [`RawUrlPolicy`]: the caller supplies a URL which must pass scheme and
//!   exact-host allowlists, and whose host must not resolve to any private or
//!   reserved address.
//!
//! The resolved addresses are only used for the check. The connection is still
//! opened by hostname, so a DNS answer that changes between check and connect
//! is not caught here.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use reqwest::Url;
use tracing::debug;

use crate::address_policy::is_blocked_address;
use crate::config::{AddressingMode, ConfigError, EndpointConfig, ProxyConfig};
use crate::dns_resolver::DnsResolver;
use crate::error::RejectionError;
use crate::symbol::Symbol;

const ALLOWED_SCHEMES: [&str; 2] = ["http", "https"];

/// Statically configured upstream. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowedEndpoint {
    pub key: String,
    pub base_url: Url,
    pub symbol_param: String,
}

impl AllowedEndpoint {
    /// The base URL with the symbol attached as a query value. Host, scheme and
    /// path are those of the configured base.
    pub fn target_for(&self, symbol: &Symbol) -> ValidatedTarget {
        let mut url = self.base_url.clone();
        url.query_pairs_mut()
            .append_pair(&self.symbol_param, symbol.as_str());
        ValidatedTarget { url }
    }
}

/// URL that passed the destination policy. Only this type reaches the fetch client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedTarget {
    url: Url,
}

impl ValidatedTarget {
    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn host(&self) -> &str {
        self.url.host_str().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default)]
pub struct EndpointTable {
    endpoints: HashMap<String, AllowedEndpoint>,
}

impl EndpointTable {
    pub fn from_config(entries: &[EndpointConfig]) -> Result<Self, ConfigError> {
        let mut endpoints = HashMap::new();
        for entry in entries {
            let endpoint = parse_endpoint(entry)?;
            if endpoints.insert(endpoint.key.clone(), endpoint).is_some() {
                return Err(ConfigError::DuplicateEndpoint(entry.key.clone()));
            }
        }
        Ok(Self { endpoints })
    }

    /// Pure table lookup.
    pub fn resolve_endpoint(&self, source_key: &str) -> Result<&AllowedEndpoint, RejectionError> {
        self.endpoints
            .get(source_key)
            .ok_or_else(|| RejectionError::UnsupportedSource(source_key.to_string()))
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}

fn parse_endpoint(entry: &EndpointConfig) -> Result<AllowedEndpoint, ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidEndpoint {
        key: entry.key.clone(),
        reason: reason.to_string(),
    };

    if entry.key.trim().is_empty() {
        return Err(invalid("key must not be empty"));
    }
    if entry.symbol_param.trim().is_empty() {
        return Err(invalid("symbol_param must not be empty"));
    }
    let base_url = Url::parse(&entry.base_url).map_err(|e| invalid(&e.to_string()))?;
    if !ALLOWED_SCHEMES.contains(&base_url.scheme()) {
        return Err(invalid("base_url scheme must be http or https"));
    }
    if base_url.host_str().is_none() {
        return Err(invalid("base_url must have a host"));
    }
    if base_url.fragment().is_some() {
        return Err(invalid("base_url must not carry a fragment"));
    }

    Ok(AllowedEndpoint {
        key: entry.key.clone(),
        base_url,
        symbol_param: entry.symbol_param.clone(),
    })
}

/// Exact hostname allowlist. No wildcard or subdomain matching.
#[derive(Debug, Clone, Default)]
pub struct AllowedHosts {
    hosts: HashSet<String>,
}

impl AllowedHosts {
    pub fn new<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            hosts: hosts
                .into_iter()
                .map(|h| h.as_ref().trim().to_ascii_lowercase())
                .collect(),
        }
    }

    pub fn contains(&self, host: &str) -> bool {
        self.hosts.contains(host)
    }
}

pub struct RawUrlPolicy {
    hosts: Arc<AllowedHosts>,
    resolver: Arc<dyn DnsResolver>,
}

impl RawUrlPolicy {
    pub fn new(hosts: Arc<AllowedHosts>, resolver: Arc<dyn DnsResolver>) -> Self {
        Self { hosts, resolver }
    }

    /// Runs the checks in order and stops at the first failure.
    pub async fn resolve_url(
        &self,
        raw_url: &str,
        symbol: &Symbol,
    ) -> Result<ValidatedTarget, RejectionError> {
        let mut base = Url::parse(raw_url.trim())
            .map_err(|e| RejectionError::MalformedUrl(e.to_string()))?;

        if !ALLOWED_SCHEMES.contains(&base.scheme()) {
            return Err(RejectionError::UnsupportedScheme(base.scheme().to_string()));
        }

        let host = base
            .host_str()
            .ok_or_else(|| RejectionError::MalformedUrl("missing host".to_string()))?
            .to_string();
        if !self.hosts.contains(&host) {
            return Err(RejectionError::HostNotAllowed(host));
        }

        let addresses = self
            .resolver
            .resolve(&host)
            .await
            .map_err(|e| RejectionError::DnsResolutionError(format!("{host}: {e}")))?;
        debug!(%host, ?addresses, "resolved upstream host");

        if let Some(blocked) = addresses.iter().find(|ip| is_blocked_address(**ip)) {
            return Err(RejectionError::BlockedInternalAddress {
                host,
                address: blocked.to_string(),
            });
        }
        drop(addresses);

        base.set_fragment(None);
        append_symbol(&base, &host, symbol)
    }
}

/// Concatenates the symbol onto the checked URL text, then confirms the result
/// still points at the same scheme and host.
fn append_symbol(base: &Url, host: &str, symbol: &Symbol) -> Result<ValidatedTarget, RejectionError> {
    let joined = format!("{}{}", base.as_str(), symbol.as_str());
    let url = Url::parse(&joined).map_err(|e| RejectionError::MalformedUrl(e.to_string()))?;
    if url.scheme() != base.scheme() || url.host_str() != Some(host) || url.port() != base.port() {
        return Err(RejectionError::MalformedUrl(
            "symbol changed the target origin".to_string(),
        ));
    }
    Ok(ValidatedTarget { url })
}

/// The one strategy active for this deployment.
pub enum DestinationPolicy {
    FixedEndpoint(EndpointTable),
    RawUrl(RawUrlPolicy),
}

impl DestinationPolicy {
    pub fn from_config(
        config: &ProxyConfig,
        resolver: Arc<dyn DnsResolver>,
    ) -> Result<Self, ConfigError> {
        Ok(match config.addressing {
            AddressingMode::FixedEndpoint => {
                DestinationPolicy::FixedEndpoint(EndpointTable::from_config(&config.endpoints)?)
            }
            AddressingMode::RawUrl => DestinationPolicy::RawUrl(RawUrlPolicy::new(
                Arc::new(AllowedHosts::new(&config.allowed_hosts)),
                resolver,
            )),
        })
    }

    pub fn mode(&self) -> AddressingMode {
        match self {
            DestinationPolicy::FixedEndpoint(_) => AddressingMode::FixedEndpoint,
            DestinationPolicy::RawUrl(_) => AddressingMode::RawUrl,
        }
    }

    /// `address` is the source key or the raw URL, depending on the mode.
    pub async fn decide(
        &self,
        address: &str,
        symbol: &Symbol,
    ) -> Result<ValidatedTarget, RejectionError> {
        match self {
            DestinationPolicy::FixedEndpoint(table) => {
                Ok(table.resolve_endpoint(address)?.target_for(symbol))
            }
            DestinationPolicy::RawUrl(policy) => policy.resolve_url(address, symbol).await,
        }
    }
}
