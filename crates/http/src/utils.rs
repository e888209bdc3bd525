//! Utility macros and functions for the engine crate.
//!
//! This module provides helper macros and functions that are used internally
//! by the parser and the response pipeline.

use std::borrow::Cow;

/// A macro for early returns with an error if a condition is not met.
///
/// This is similar to the `assert!` macro, but returns an error instead of panicking.
/// It's useful for validation checks where you want to return early with an error
/// if some condition is not satisfied.
///
/// # Example
///
/// ```ignore
/// ensure!(headers.len() < MAX_HEADERS, ParseError::too_many_headers(MAX_HEADERS));
/// ```
macro_rules! ensure {
    ($predicate:expr, $error:expr) => {
        if !$predicate {
            return Err($error);
        }
    };
}

pub(crate) use ensure;

/// Decodes a url component: `+` becomes a space and `%XX` escapes are resolved.
///
/// Malformed escapes and invalid utf-8 never fail, the raw text is kept instead.
pub fn url_decode(text: &str) -> Cow<'_, str> {
    if !text.contains(['+', '%']) {
        return Cow::Borrowed(text);
    }

    let spaced = text.replace('+', " ");
    match urlencoding::decode(&spaced) {
        Ok(decoded) => Cow::Owned(decoded.into_owned()),
        Err(_) => Cow::Owned(String::from_utf8_lossy(&urlencoding::decode_binary(spaced.as_bytes())).into_owned()),
    }
}

/// Parses a leading decimal number the way `atoi` does: digits after optional
/// whitespace are read until the first non digit, anything else yields zero.
pub fn parse_leading_u64(text: &str) -> u64 {
    text.trim_start()
        .bytes()
        .take_while(u8::is_ascii_digit)
        .try_fold(0u64, |acc, b| acc.checked_mul(10)?.checked_add(u64::from(b - b'0')))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_decode_plain() {
        assert!(matches!(url_decode("/index.html"), Cow::Borrowed("/index.html")));
    }

    #[test]
    fn test_url_decode_escapes() {
        assert_eq!(url_decode("a+b%20c%2Fd"), "a b c/d");
        assert_eq!(url_decode("%E4%BD%A0"), "你");
    }

    #[test]
    fn test_url_decode_keeps_malformed_escape() {
        assert_eq!(url_decode("100%"), "100%");
        assert_eq!(url_decode("%zz"), "%zz");
    }

    #[test]
    fn test_parse_leading_u64() {
        assert_eq!(parse_leading_u64("42"), 42);
        assert_eq!(parse_leading_u64(" 17abc"), 17);
        assert_eq!(parse_leading_u64("abc"), 0);
        assert_eq!(parse_leading_u64(""), 0);
        assert_eq!(parse_leading_u64("99999999999999999999999"), 0);
    }
}
