//! Balanced literal scanner.
//!
//! Finds a named assignment marker in raw markup and returns the object or
//! array literal that follows it, verbatim. This is a lexical balance
//! scanner only: it counts `{}` and `[]` independently and stops at the first
//! position where both counters are back to zero. No semantic parsing.
//!
//! In [`ScanMode::Lexical`] delimiters inside quoted strings are counted like
//! any other, so a literal such as `{"a": "}"}` ends early (pinned by
//! tests); [`ScanMode::StringAware`] closes that gap.

use gridcast_types::GridcastError;

/// How delimiters inside string literals are treated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ScanMode {
    /// Count every delimiter, including those inside strings.
    #[default]
    Lexical,
    /// Skip delimiters inside `'…'`, `"…"`, and `` `…` `` strings, honoring
    /// backslash escapes.
    StringAware,
}

/// A literal located in the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiteralSpan<'a> {
    /// The literal, inclusive of its opening and closing delimiters.
    pub text: &'a str,
    /// Byte offset of the opening delimiter.
    pub start: usize,
    /// Byte offset one past the closing delimiter.
    pub end: usize,
}

/// Extract the literal assigned after the first occurrence of `marker`.
///
/// An occurrence only counts when it is not part of a longer identifier:
/// `X.fact` does not match inside `X.factor` or `XX.fact`.
///
/// After the marker and any whitespace, a single `=` is skipped when the
/// marker does not already end with one, so `X.fact` matches both
/// `X.fact = {…}` and `X.fact={…}`.
pub fn extract_balanced<'a>(
    text: &'a str,
    marker: &str,
    mode: ScanMode,
) -> Result<LiteralSpan<'a>, GridcastError> {
    let marker_at = find_marker(text, marker).ok_or_else(|| GridcastError::NotFound {
        what: format!("marker {marker:?}"),
    })?;

    let mut pos = skip_whitespace(text, marker_at + marker.len());
    if !marker.trim_end().ends_with('=') && text[pos..].starts_with('=') {
        pos = skip_whitespace(text, pos + 1);
    }

    let opener = text[pos..].chars().next();
    if !matches!(opener, Some('{') | Some('[')) {
        return Err(GridcastError::Syntax {
            offset: pos,
            found: opener,
        });
    }

    let end = scan_to_balance(text, pos, mode)?;
    Ok(LiteralSpan {
        text: &text[pos..end],
        start: pos,
        end,
    })
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

fn find_marker(text: &str, marker: &str) -> Option<usize> {
    let check_before = marker.chars().next().is_some_and(is_ident_char);
    let check_after = marker.chars().next_back().is_some_and(is_ident_char);
    text.match_indices(marker).map(|(at, _)| at).find(|&at| {
        let before_ok = !check_before || !text[..at].chars().next_back().is_some_and(is_ident_char);
        let after_ok =
            !check_after || !text[at + marker.len()..].chars().next().is_some_and(is_ident_char);
        before_ok && after_ok
    })
}

fn skip_whitespace(text: &str, from: usize) -> usize {
    text[from..]
        .find(|c: char| !c.is_whitespace())
        .map_or(text.len(), |i| from + i)
}

/// Scan from the opener at `start`; returns the byte offset one past the
/// delimiter where both counters reach zero.
fn scan_to_balance(text: &str, start: usize, mode: ScanMode) -> Result<usize, GridcastError> {
    let bytes = text.as_bytes();
    let mut braces: i64 = 0;
    let mut brackets: i64 = 0;
    let mut quote: Option<u8> = None;
    let mut escaped = false;

    // Delimiters and quotes are ASCII, so scanning bytes never splits a
    // multi-byte character at a reported boundary.
    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == q {
                quote = None;
            }
            continue;
        }

        match b {
            b'{' => braces += 1,
            b'}' => braces -= 1,
            b'[' => brackets += 1,
            b']' => brackets -= 1,
            b'"' | b'\'' | b'`' if mode == ScanMode::StringAware => {
                quote = Some(b);
                continue;
            }
            _ => continue,
        }

        if braces == 0 && brackets == 0 {
            return Ok(i + 1);
        }
    }

    Err(GridcastError::Unbalanced {
        start,
        braces,
        brackets,
    })
}
