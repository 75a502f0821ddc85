//! `Cookie` header parsing
//!
//! Lenient by construction: malformed pairs are skipped and undecodable
//! values are kept raw, so parsing never fails.

use std::collections::HashMap;

use percent_encoding::percent_decode_str;

/// Cookie name to decoded value; first occurrence of a name wins
pub type CookieMap = HashMap<String, String>;

/// Parse a raw `Cookie` header value into a [`CookieMap`].
#[must_use]
pub fn parse_cookie_header(header: &str) -> CookieMap {
    let mut cookies = CookieMap::new();

    for pair in header.split(';') {
        let Some((key, value)) = pair.split_once('=') else {
            continue;
        };

        let key = key.trim();
        if cookies.contains_key(key) {
            continue;
        }

        let mut value = value.trim();
        if value.starts_with('"') {
            value = strip_first_and_last(value);
        }

        let decoded = decode_component(value).unwrap_or_else(|| value.to_string());
        cookies.insert(key.to_string(), decoded);
    }

    cookies
}

/// Drop one character from each end; does not check the last one is a quote.
fn strip_first_and_last(value: &str) -> &str {
    let mut chars = value.chars();
    chars.next();
    chars.next_back();
    chars.as_str()
}

/// Strict percent-decoding: every `%` must introduce two hex digits and the
/// decoded bytes must be UTF-8. Returns `None` otherwise.
fn decode_component(value: &str) -> Option<String> {
    let bytes = value.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let well_formed = bytes
                .get(i + 1..i + 3)
                .is_some_and(|hex| hex.iter().all(u8::is_ascii_hexdigit));
            if !well_formed {
                return None;
            }
            i += 3;
        } else {
            i += 1;
        }
    }

    percent_decode_str(value)
        .decode_utf8()
        .ok()
        .map(std::borrow::Cow::into_owned)
}
