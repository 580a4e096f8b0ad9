//! URL building helpers.
//!
//! Query values are percent-encoded as URI components; xAPI paths in the
//! command URL keep their dots.

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

/// Everything except RFC 3986 unreserved characters is escaped.
const COMPONENT_ESCAPE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Percent-encode a single query value or path segment.
///
/// # Examples
///
/// ```
/// use wsi_http::encode_component;
///
/// assert_eq!(encode_component("Audio.Volume"), "Audio.Volume");
/// assert_eq!(encode_component("a b&c"), "a%20b%26c");
/// ```
#[must_use]
pub fn encode_component(value: &str) -> String {
    utf8_percent_encode(value, COMPONENT_ESCAPE).to_string()
}

/// Build `key=value&...` from pairs, in the given order.
#[must_use]
pub fn query_string<K, V>(params: &[(K, V)]) -> String
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    params
        .iter()
        .map(|(key, value)| {
            format!(
                "{}={}",
                encode_component(key.as_ref()),
                encode_component(value.as_ref())
            )
        })
        .collect::<Vec<_>>()
        .join("&")
}

/// Resolve `partial` against `base`.
///
/// Absolute URLs are returned unchanged; otherwise exactly one `/` joins the
/// two parts.
#[must_use]
pub fn join_url(base: &str, partial: &str) -> String {
    if partial.starts_with("http://") || partial.starts_with("https://") {
        return partial.to_string();
    }
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        partial.trim_start_matches('/')
    )
}
