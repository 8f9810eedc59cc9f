use std::time::Duration;

use reqwest::header::ACCEPT;
use reqwest::redirect;
use serde::Deserialize;
use tokio::time::timeout;
use tracing::debug;

use crate::config::ConfigError;
use crate::destination::ValidatedTarget;
use crate::error::RejectionError;
use crate::observability;

pub const DEFAULT_MAX_RESPONSE_BYTES: usize = 1_000_000;
const DEFAULT_TIMEOUT_MS: u64 = 8_000;
const USER_AGENT: &str = concat!("research-fetch-proxy/", env!("CARGO_PKG_VERSION"));

/// Hard limits for one outbound GET. Not influenced by the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FetchPolicy {
    pub connect_timeout_ms: u64,
    pub response_timeout_ms: u64,
    pub read_timeout_ms: u64,
    pub max_response_bytes: usize,
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self {
            connect_timeout_ms: DEFAULT_TIMEOUT_MS,
            response_timeout_ms: DEFAULT_TIMEOUT_MS,
            read_timeout_ms: DEFAULT_TIMEOUT_MS,
            max_response_bytes: DEFAULT_MAX_RESPONSE_BYTES,
        }
    }
}

impl FetchPolicy {
    /// Redirects are never followed; a 3xx is a terminal response.
    pub const FOLLOW_REDIRECTS: bool = false;

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.connect_timeout_ms == 0 || self.response_timeout_ms == 0 || self.read_timeout_ms == 0
        {
            return Err(ConfigError::InvalidFetchPolicy("timeouts must be > 0"));
        }
        if self.max_response_bytes == 0 {
            return Err(ConfigError::InvalidFetchPolicy("max_response_bytes must be > 0"));
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// Worst case for a single fetch, connect through last body byte.
    pub fn worst_case(&self) -> Duration {
        self.connect_timeout() + self.response_timeout() + self.read_timeout()
    }
}

/// Successful upstream reply. The body is opaque bytes and is only ever
/// served back as plain text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResult {
    pub status: u16,
    pub body: Vec<u8>,
    /// What the upstream claimed. Kept for logs, never used for output.
    pub declared_content_type: Option<String>,
}

pub struct BoundedFetchClient {
    client: reqwest::Client,
    policy: FetchPolicy,
}

impl BoundedFetchClient {
    pub fn new(policy: FetchPolicy) -> Result<Self, ConfigError> {
        // No pooled connections: nothing to the upstream outlives its lookup.
        // read_timeout starts once the connection is up, so the wait for the
        // first response bytes is bounded on its own.
        let client = reqwest::Client::builder()
            .redirect(redirect::Policy::none())
            .connect_timeout(policy.connect_timeout())
            .read_timeout(policy.response_timeout())
            .pool_max_idle_per_host(0)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|_| ConfigError::InvalidFetchPolicy("failed to build HTTP client"))?;

        Ok(Self { client, policy })
    }

    /// One GET, no retries. Caller headers are never forwarded.
    pub async fn fetch(&self, target: &ValidatedTarget) -> Result<FetchResult, RejectionError> {
        debug!(host = target.host(), "fetching upstream");

        let request = self
            .client
            .get(target.url().clone())
            .header(ACCEPT, "*/*")
            .send();

        // Upper bound for headers trickled in under the per-read timeout.
        let headers_deadline = self.policy.connect_timeout() + self.policy.response_timeout();
        let response = match timeout(headers_deadline, request).await {
            Err(_) => return Err(RejectionError::UpstreamTimeout("response")),
            Ok(Err(e)) => return Err(classify(e)),
            Ok(Ok(response)) => response,
        };

        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            // dropped unread; the body never reaches the caller
            return Err(RejectionError::UpstreamError(status));
        }

        let max = self.policy.max_response_bytes;
        if response.content_length().is_some_and(|len| len > max as u64) {
            return Err(RejectionError::ResponseTooLarge(max));
        }

        let declared_content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let body = timeout(self.policy.read_timeout(), read_bounded(response, max))
            .await
            .map_err(|_| RejectionError::UpstreamTimeout("read"))??;

        debug!(status, declared = ?declared_content_type, bytes = body.len(), "upstream replied");
        if body.is_empty() {
            return Err(RejectionError::EmptyUpstreamResponse);
        }
        observability::record_upstream_bytes(body.len());

        Ok(FetchResult {
            status,
            body,
            declared_content_type,
        })
    }
}

/// Reads chunk by chunk and gives up as soon as the running total passes `max`.
async fn read_bounded(mut response: reqwest::Response, max: usize) -> Result<Vec<u8>, RejectionError> {
    let mut body = Vec::new();
    while let Some(chunk) = response.chunk().await.map_err(|e| {
        if e.is_timeout() {
            RejectionError::UpstreamTimeout("read")
        } else {
            classify(e)
        }
    })? {
        if body.len() + chunk.len() > max {
            return Err(RejectionError::ResponseTooLarge(max));
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}

fn classify(err: reqwest::Error) -> RejectionError {
    if err.is_timeout() {
        if err.is_connect() {
            RejectionError::UpstreamTimeout("connect")
        } else {
            RejectionError::UpstreamTimeout("response")
        }
    } else {
        RejectionError::Unclassified(err.to_string())
    }
}
