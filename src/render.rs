use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};

use crate::config::AddressingMode;
use crate::error::RejectionError;
use crate::sanitize::{DisplayText, TEXT_PLAIN};

/// Display collaborator. Receives sanitized text or a rejection and decides
/// how the page looks; the lookup core never produces markup itself.
pub trait ResearchRenderer: Send + Sync {
    /// Shown when the request does not carry the parameters for a lookup.
    fn form(&self, mode: AddressingMode) -> Response;
    fn result(&self, text: DisplayText) -> Response;
    fn rejection(&self, err: &RejectionError) -> Response;
}

pub struct PlainTextRenderer;

impl ResearchRenderer for PlainTextRenderer {
    fn form(&self, mode: AddressingMode) -> Response {
        let hint = match mode {
            AddressingMode::FixedEndpoint => {
                "Stock research\n\nProvide `symbol` and `source` to look up a quote.\n"
            }
            AddressingMode::RawUrl => {
                "Stock research\n\nProvide `symbol` and `url` to look up a quote.\n"
            }
        };
        plain_text(StatusCode::OK, hint.as_bytes().to_vec())
    }

    fn result(&self, text: DisplayText) -> Response {
        let content_type = text.content_type();
        respond(StatusCode::OK, content_type, text.into_bytes())
    }

    fn rejection(&self, err: &RejectionError) -> Response {
        err.clone().into_response()
    }
}

fn plain_text(status: StatusCode, body: Vec<u8>) -> Response {
    respond(status, TEXT_PLAIN, body)
}

fn respond(status: StatusCode, content_type: &'static str, body: Vec<u8>) -> Response {
    (
        status,
        [
            (header::CONTENT_TYPE, HeaderValue::from_static(content_type)),
            (header::X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff")),
        ],
        body,
    )
        .into_response()
}
