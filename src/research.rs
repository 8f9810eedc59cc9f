//! Lookup pipeline: symbol validator, destination policy, bounded fetch,
//! sanitizer. Stages run strictly in order and the first rejection ends the
//! lookup, so nothing reaches the fetch client without passing both checks.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::{AddressingMode, ConfigError, ProxyConfig};
use crate::destination::DestinationPolicy;
use crate::dns_resolver::DnsResolver;
use crate::error::{RejectionError, Stage};
use crate::fetch::BoundedFetchClient;
use crate::observability::{self, ErrorClass};
use crate::sanitize::{sanitize, DisplayText};
use crate::symbol::validate_symbol;

/// What the caller asked for. Only the address field of the active mode is read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LookupRequest {
    pub symbol: String,
    pub source_key: Option<String>,
    pub raw_url: Option<String>,
}

impl LookupRequest {
    pub fn address(&self, mode: AddressingMode) -> Option<&str> {
        match mode {
            AddressingMode::FixedEndpoint => self.source_key.as_deref(),
            AddressingMode::RawUrl => self.raw_url.as_deref(),
        }
    }
}

pub struct ResearchService {
    policy: DestinationPolicy,
    fetcher: BoundedFetchClient,
}

impl ResearchService {
    pub fn new(policy: DestinationPolicy, fetcher: BoundedFetchClient) -> Self {
        Self { policy, fetcher }
    }

    pub fn from_config(
        config: &ProxyConfig,
        resolver: Arc<dyn DnsResolver>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let policy = DestinationPolicy::from_config(config, resolver)?;
        let fetcher = BoundedFetchClient::new(config.fetch)?;
        Ok(Self::new(policy, fetcher))
    }

    pub fn mode(&self) -> AddressingMode {
        self.policy.mode()
    }

    pub async fn lookup(&self, request: &LookupRequest) -> Result<DisplayText, RejectionError> {
        observability::record_lookup_started();

        let outcome = self.run(request).await;
        match &outcome {
            Ok(text) => {
                observability::record_lookup_succeeded();
                info!(bytes = text.as_bytes().len(), "lookup served");
            }
            Err(err) => {
                observability::record_rejection(error_class(err));
                warn!(
                    stage = err.stage().as_str(),
                    status = err.status().as_u16(),
                    kind = err.public_message(),
                    "lookup rejected"
                );
                debug!(detail = %err, "rejection detail");
            }
        }
        if observability::OBS_DEV {
            debug!(snapshot = ?observability::snapshot(), "lookup counters");
        }
        outcome
    }

    async fn run(&self, request: &LookupRequest) -> Result<DisplayText, RejectionError> {
        let symbol = validate_symbol(&request.symbol)?;

        let mode = self.mode();
        let address = request.address(mode).ok_or_else(|| match mode {
            AddressingMode::FixedEndpoint => RejectionError::UnsupportedSource(String::new()),
            AddressingMode::RawUrl => RejectionError::MalformedUrl("missing url".to_string()),
        })?;

        let target = self.policy.decide(address, &symbol).await?;
        let result = self.fetcher.fetch(&target).await?;
        Ok(sanitize(result))
    }
}

fn error_class(err: &RejectionError) -> ErrorClass {
    match (err.stage(), err) {
        (Stage::Validation, _) => ErrorClass::VALIDATION_REJECTED,
        (_, RejectionError::ResponseTooLarge(_)) => ErrorClass::RESOURCE_LIMIT,
        (_, RejectionError::Unclassified(_)) => ErrorClass::INTERNAL,
        _ => ErrorClass::UPSTREAM_FAILURE,
    }
}
