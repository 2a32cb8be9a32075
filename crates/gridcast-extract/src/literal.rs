//! Dual-mode literal decoding.
//!
//! Extracted text is decoded as strict JSON first. Script literals that are
//! not valid JSON (unquoted keys, single quotes, trailing commas, comments)
//! fall back to a JSON5 parser. The fallback is a pure text-to-value
//! transform: nothing is evaluated, so the embedded page can neither reach
//! the environment nor cause side effects.

use serde_json::Value;

use gridcast_types::{GridcastError, ParseMode};

/// A decoded literal and the mode that accepted it.
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    pub value: Value,
    pub mode: ParseMode,
}

/// Decode `text` strictly, falling back to permissive JSON5.
pub fn parse_literal(text: &str) -> Result<Decoded, GridcastError> {
    let strict_err = match serde_json::from_str::<Value>(text) {
        Ok(value) => {
            return Ok(Decoded {
                value,
                mode: ParseMode::Strict,
            })
        }
        Err(e) => e,
    };

    tracing::debug!(error = %strict_err, "strict decode failed, trying permissive literal");

    match json5::from_str::<Value>(text) {
        Ok(value) => Ok(Decoded {
            value,
            mode: ParseMode::Permissive,
        }),
        Err(permissive_err) => Err(GridcastError::Parse {
            strict: strict_err.to_string(),
            permissive: permissive_err.to_string(),
        }),
    }
}
