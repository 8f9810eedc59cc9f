use crate::fetch::FetchResult;

pub const TEXT_PLAIN: &str = "text/plain; charset=utf-8";
pub const PREAMBLE: &str = "The following is the stock information you requested.\n\n";

/// Upstream payload wrapped for display. Always served as plain text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayText {
    body: Vec<u8>,
}

impl DisplayText {
    pub fn content_type(&self) -> &'static str {
        TEXT_PLAIN
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.body
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.body
    }
}

/// Prepends the fixed preamble. The payload is copied verbatim and never parsed.
pub fn sanitize(result: FetchResult) -> DisplayText {
    let mut body = Vec::with_capacity(PREAMBLE.len() + result.body.len());
    body.extend_from_slice(PREAMBLE.as_bytes());
    body.extend_from_slice(&result.body);
    DisplayText { body }
}
