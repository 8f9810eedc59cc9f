use std::fmt;

use crate::error::RejectionError;

pub const MAX_SYMBOL_LEN: usize = 10;

/// Ticker token that passed validation: 1-10 chars of `[A-Z0-9.-]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol(String);

impl Symbol {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn is_symbol_char(c: char) -> bool {
    c.is_ascii_uppercase() || c.is_ascii_digit() || c == '.' || c == '-'
}

/// Trim, upper-case and check the caller's ticker token. Pure and total.
pub fn validate_symbol(raw: &str) -> Result<Symbol, RejectionError> {
    let normalized = raw.trim().to_uppercase();

    let len = normalized.chars().count();
    if len == 0 || len > MAX_SYMBOL_LEN {
        return Err(RejectionError::InvalidSymbol);
    }
    if !normalized.chars().all(is_symbol_char) {
        return Err(RejectionError::InvalidSymbol);
    }

    Ok(Symbol(normalized))
}
