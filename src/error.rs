use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Pipeline stage a rejection originated from. Only affects logging detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Validation,
    Execution,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Validation => "validation",
            Stage::Execution => "execution",
        }
    }
}

/// Terminal outcome of a rejected lookup.
///
/// `Display` carries internal diagnostic detail for logs. Callers only ever
/// see [`RejectionError::public_message`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RejectionError {
    #[error("invalid symbol")]
    InvalidSymbol,

    #[error("malformed url: {0}")]
    MalformedUrl(String),

    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("host not allowed: {0}")]
    HostNotAllowed(String),

    #[error("unsupported source: {0}")]
    UnsupportedSource(String),

    #[error("dns resolution failed for {0}")]
    DnsResolutionError(String),

    #[error("{host} resolves to blocked address {address}")]
    BlockedInternalAddress { host: String, address: String },

    #[error("upstream timed out during {0}")]
    UpstreamTimeout(&'static str),

    #[error("upstream returned status {0}")]
    UpstreamError(u16),

    #[error("upstream returned an empty body")]
    EmptyUpstreamResponse,

    #[error("upstream body exceeded {0} bytes")]
    ResponseTooLarge(usize),

    #[error("unclassified failure: {0}")]
    Unclassified(String),
}

impl RejectionError {
    pub fn stage(&self) -> Stage {
        match self {
            RejectionError::InvalidSymbol
            | RejectionError::MalformedUrl(_)
            | RejectionError::UnsupportedScheme(_)
            | RejectionError::HostNotAllowed(_)
            | RejectionError::UnsupportedSource(_)
            | RejectionError::DnsResolutionError(_)
            | RejectionError::BlockedInternalAddress { .. } => Stage::Validation,
            RejectionError::UpstreamTimeout(_)
            | RejectionError::UpstreamError(_)
            | RejectionError::EmptyUpstreamResponse
            | RejectionError::ResponseTooLarge(_)
            | RejectionError::Unclassified(_) => Stage::Execution,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            RejectionError::ResponseTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            RejectionError::UpstreamTimeout(_)
            | RejectionError::UpstreamError(_)
            | RejectionError::EmptyUpstreamResponse => StatusCode::BAD_GATEWAY,
            _ => StatusCode::BAD_REQUEST,
        }
    }

    /// Caller-facing text. Never includes hosts, allowlist entries or addresses.
    pub fn public_message(&self) -> &'static str {
        match self {
            RejectionError::InvalidSymbol => "Invalid symbol",
            RejectionError::MalformedUrl(_) => "Malformed URL",
            RejectionError::UnsupportedScheme(_) => "Unsupported scheme",
            RejectionError::HostNotAllowed(_) => "Host not allowed",
            RejectionError::UnsupportedSource(_) => "Unsupported source",
            RejectionError::BlockedInternalAddress { .. } => "Blocked internal address",
            RejectionError::UpstreamTimeout(_) => "Upstream timeout",
            RejectionError::UpstreamError(_) => "Upstream error",
            RejectionError::EmptyUpstreamResponse => "Empty upstream response",
            RejectionError::ResponseTooLarge(_) => "Response too large",
            RejectionError::DnsResolutionError(_) | RejectionError::Unclassified(_) => {
                "Bad request"
            }
        }
    }
}

impl IntoResponse for RejectionError {
    fn into_response(self) -> Response {
        let mut response = (self.status(), self.public_message()).into_response();
        let headers = response.headers_mut();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        headers.insert(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        );
        response
    }
}
