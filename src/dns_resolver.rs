use std::collections::HashMap;
use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

#[async_trait]
pub trait DnsResolver: Send + Sync {
    /// Every address the host maps to, not just the first.
    async fn resolve(&self, hostname: &str) -> Result<Vec<IpAddr>, DnsError>;
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DnsError {
    #[error("resolution failed")]
    ResolutionFailed,
    #[error("resolution timed out")]
    Timeout,
}

/// Resolver backed by the operating system, bounded by a timeout.
pub struct SystemDnsResolver {
    timeout: Duration,
}

impl SystemDnsResolver {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl DnsResolver for SystemDnsResolver {
    async fn resolve(&self, hostname: &str) -> Result<Vec<IpAddr>, DnsError> {
        if let Some(ip) = literal_address(hostname) {
            return Ok(vec![ip]);
        }

        let lookup = tokio::net::lookup_host((hostname, 0u16));
        let addrs = tokio::time::timeout(self.timeout, lookup)
            .await
            .map_err(|_| DnsError::Timeout)?
            .map_err(|_| DnsError::ResolutionFailed)?;

        let mut ips: Vec<IpAddr> = Vec::new();
        for addr in addrs {
            if !ips.contains(&addr.ip()) {
                ips.push(addr.ip());
            }
        }

        if ips.is_empty() {
            Err(DnsError::ResolutionFailed)
        } else {
            Ok(ips)
        }
    }
}

/// Fixed host table. IP literals resolve to themselves.
#[derive(Default)]
pub struct StaticDnsResolver {
    entries: HashMap<String, Vec<IpAddr>>,
}

impl StaticDnsResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_host(mut self, hostname: &str, ips: Vec<IpAddr>) -> Self {
        self.entries.insert(hostname.to_string(), ips);
        self
    }
}

#[async_trait]
impl DnsResolver for StaticDnsResolver {
    async fn resolve(&self, hostname: &str) -> Result<Vec<IpAddr>, DnsError> {
        if let Some(ip) = literal_address(hostname) {
            return Ok(vec![ip]);
        }
        match self.entries.get(hostname) {
            Some(ips) if !ips.is_empty() => Ok(ips.clone()),
            _ => Err(DnsError::ResolutionFailed),
        }
    }
}

/// Parses `127.0.0.1`, `::1` and the bracketed `[::1]` form used in URLs.
pub fn literal_address(hostname: &str) -> Option<IpAddr> {
    let bare = hostname
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(hostname);
    bare.parse().ok()
}
