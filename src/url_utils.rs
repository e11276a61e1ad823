//! URL helpers for image sources and navigation checks.

use url::Url;

use crate::error::{Error, Result};

/// Parse an absolute URL, rejecting anything without an `http(s)` scheme.
pub fn parse_http_url(s: &str) -> Result<Url> {
    let url = Url::parse(s.trim()).map_err(|e| Error::Configuration(format!("invalid URL {s}: {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(Error::Configuration(format!("unsupported URL scheme {other} in {s}"))),
    }
}

/// `//host/path` becomes `https://host/path`; anything else is returned as is.
#[must_use]
pub fn upgrade_protocol_relative(url: &str) -> String {
    if url.starts_with("//") {
        format!("https:{url}")
    } else {
        url.to_string()
    }
}

/// First URL of a set-of-sources value (`srcset`), or the value itself.
///
/// `"a.jpg 1x, b.jpg 2x"` gives `"a.jpg"`.
#[must_use]
pub fn first_srcset_url(value: &str) -> Option<&str> {
    value
        .split(',')
        .next()
        .and_then(|candidate| candidate.split_whitespace().next())
        .filter(|url| !url.is_empty())
}

/// Whether an image `src` is missing in practice: empty or an inline `data:` placeholder.
#[must_use]
pub fn is_placeholder_src(src: Option<&str>) -> bool {
    match src.map(str::trim) {
        None | Some("") => true,
        Some(s) => s.get(..5).is_some_and(|p| p.eq_ignore_ascii_case("data:")),
    }
}

/// Whether a navigation ended on a login or sign-in page.
#[must_use]
pub fn is_login_redirect(url: &str) -> bool {
    url.contains("/login") || url.contains("/signin")
}

/// oEmbed request URL for `target`, with `target` properly query-encoded.
pub fn oembed_request_url(endpoint: &str, target: &str) -> Result<String> {
    Url::parse_with_params(endpoint, &[("url", target)])
        .map(String::from)
        .map_err(|e| Error::Configuration(format!("invalid oEmbed endpoint {endpoint}: {e}")))
}
