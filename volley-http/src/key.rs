//! Dedup key derivation for HTTP requests.
//!
//! The key covers the URI, the method and a fixed whitelist of headers:
//! `Accept`, `Accept-Encoding`, `Referer`, `User-Agent` and `Authorization`.
//! Other headers do not take part, so two requests differing only in, say,
//! `Cookie` share one key.
//!
//! The canonical form is hashed with xxh3. Collisions are possible and are
//! treated as dedup joins.

use http::header::{ACCEPT, ACCEPT_ENCODING, AUTHORIZATION, HeaderMap, REFERER, USER_AGENT};
use http::{Method, Uri};
use volley_core::CacheKey;
use xxhash_rust::xxh3::xxh3_64;

/// Prefix of every key derived here.
pub const KEY_PREFIX: &str = "VolleyCache_";

/// Referer used in the canonical form when the header is absent.
const DEFAULT_REFERER: &str = "http://example/";

/// Derives the dedup key of a request.
pub fn derive_key(method: &Method, uri: &Uri, headers: &HeaderMap) -> CacheKey {
    CacheKey::from_hash(KEY_PREFIX, xxh3_64(canonical_form(method, uri, headers).as_bytes()))
}

/// Builds the string that is hashed into the key, one field per line.
pub fn canonical_form(method: &Method, uri: &Uri, headers: &HeaderMap) -> String {
    let mut out = String::with_capacity(256);

    out.push_str(&uri.to_string());
    out.push('\n');
    out.push_str(method.as_str());
    out.push('\n');

    for range in list_values(headers, ACCEPT.as_str()) {
        let mut params = range.split(';').map(str::trim);
        let media_type = params.next().unwrap_or_default();
        let charset = params
            .filter_map(|param| param.split_once('='))
            .find(|(name, _)| name.trim().eq_ignore_ascii_case("charset"))
            .map(|(_, value)| value.trim().trim_matches('"'))
            .unwrap_or_default();
        out.push_str(charset);
        out.push_str(media_type);
        out.push('|');
    }
    out.push('\n');

    for coding in list_values(headers, ACCEPT_ENCODING.as_str()) {
        let coding = coding.split(';').next().unwrap_or_default().trim();
        out.push_str(coding);
        out.push('|');
    }
    out.push('\n');

    let referer = headers
        .get(REFERER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(DEFAULT_REFERER);
    out.push_str(referer);
    out.push('\n');

    for value in headers.get_all(USER_AGENT) {
        if let Ok(value) = value.to_str() {
            for token in product_tokens(value) {
                out.push_str(token);
                out.push('|');
            }
        }
    }
    out.push('\n');

    if let Some(authorization) = headers.get(AUTHORIZATION).and_then(|value| value.to_str().ok()) {
        let authorization = authorization.trim();
        let (scheme, parameter) = authorization
            .split_once(char::is_whitespace)
            .map(|(scheme, parameter)| (scheme, parameter.trim()))
            .unwrap_or((authorization, ""));
        out.push_str(parameter);
        out.push_str(scheme);
        out.push('\n');
    }

    out
}

/// Non-empty comma separated elements of every value of `name`.
fn list_values<'a>(headers: &'a HeaderMap, name: &str) -> impl Iterator<Item = &'a str> {
    headers
        .get_all(name)
        .into_iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(str::trim)
        .filter(|element| !element.is_empty())
}

/// Splits a `User-Agent` value into products (`name/version`) and
/// parenthesized comments. Comments may nest and contain spaces.
fn product_tokens(value: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    let bytes = value.as_bytes();
    let mut pos = 0;

    while pos < bytes.len() {
        if bytes[pos].is_ascii_whitespace() {
            pos += 1;
            continue;
        }

        let start = pos;
        if bytes[pos] == b'(' {
            let mut depth = 0usize;
            while pos < bytes.len() {
                match bytes[pos] {
                    b'(' => depth += 1,
                    b')' => {
                        depth = depth.saturating_sub(1);
                        if depth == 0 {
                            pos += 1;
                            break;
                        }
                    }
                    b'\\' => pos += 1,
                    _ => {}
                }
                pos += 1;
            }
        } else {
            while pos < bytes.len() && !bytes[pos].is_ascii_whitespace() && bytes[pos] != b'(' {
                pos += 1;
            }
        }
        tokens.push(&value[start..pos.min(bytes.len())]);
    }

    tokens
}
