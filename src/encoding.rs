//! Character encoding detection for fetched pages.
//!
//! Static responses arrive as bytes. The charset is taken from the
//! `Content-Type` header, then from the document's own meta declaration,
//! then UTF-8 is assumed. Undecodable bytes become U+FFFD.

use encoding_rs::{Encoding, UTF_8};
use regex::Regex;
use std::sync::LazyLock;

/// Match `<meta charset="...">` tag
#[allow(clippy::expect_used)]
static CHARSET_META_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<meta[^>]+charset\s*=\s*["']?([^"'\s/>;]+)"#).expect("valid regex")
});

/// Match the `charset` parameter of a media type
#[allow(clippy::expect_used)]
static MEDIA_TYPE_CHARSET_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)charset\s*=\s*["']?([^"'\s;]+)"#).expect("valid regex")
});

/// Charset label from a `Content-Type` header value.
#[must_use]
pub fn charset_from_content_type(content_type: &str) -> Option<&str> {
    MEDIA_TYPE_CHARSET_RE
        .captures(content_type)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// Encoding declared inside the document.
///
/// Covers both `<meta charset>` and the `http-equiv` form; only the first
/// 1024 bytes are examined.
#[must_use]
pub fn detect_meta_encoding(html: &[u8]) -> Option<&'static Encoding> {
    let head = String::from_utf8_lossy(&html[..html.len().min(1024)]);
    CHARSET_META_RE
        .captures(&head)
        .and_then(|c| c.get(1))
        .and_then(|m| Encoding::for_label(m.as_str().as_bytes()))
}

/// Pick the encoding for a response body.
#[must_use]
pub fn detect_encoding(html: &[u8], content_type: Option<&str>) -> &'static Encoding {
    content_type
        .and_then(charset_from_content_type)
        .and_then(|label| Encoding::for_label(label.as_bytes()))
        .or_else(|| detect_meta_encoding(html))
        .unwrap_or(UTF_8)
}

/// Decode a response body to UTF-8.
#[must_use]
pub fn decode_html(html: &[u8], content_type: Option<&str>) -> String {
    let encoding = detect_encoding(html, content_type);
    if encoding == UTF_8 {
        return String::from_utf8_lossy(html).into_owned();
    }
    let (decoded, _, _) = encoding.decode(html);
    decoded.into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_charset_wins_over_meta() {
        let html = b"<meta charset=\"utf-8\"><p>Caf\xE9</p>";
        let encoding = detect_encoding(html, Some("text/html; charset=ISO-8859-1"));
        // encoding_rs maps ISO-8859-1 to windows-1252 per WHATWG
        assert_eq!(encoding.name(), "windows-1252");
    }

    #[test]
    fn meta_charset_used_without_header_charset() {
        let html = br#"<html><head><meta charset="gbk"></head></html>"#;
        assert_eq!(detect_encoding(html, Some("text/html")).name(), "GBK");
    }

    #[test]
    fn http_equiv_declaration() {
        let html = br#"<meta http-equiv="Content-Type" content="text/html; charset=Shift_JIS">"#;
        assert_eq!(detect_encoding(html, None).name(), "Shift_JIS");
    }

    #[test]
    fn default_is_utf8() {
        assert_eq!(detect_encoding(b"<p>plain</p>", None), UTF_8);
        assert_eq!(detect_encoding(b"<p>plain</p>", Some("text/html; charset=bogus")), UTF_8);
    }

    #[test]
    fn decode_gbk_body() {
        // "中文" in GBK
        let html = b"<meta charset=\"gbk\"><p>\xD6\xD0\xCE\xC4</p>";
        assert!(decode_html(html, None).contains("中文"));
    }

    #[test]
    fn invalid_utf8_is_replaced() {
        let result = decode_html(b"<p>Test \xFF\xFE Invalid</p>", None);
        assert!(result.contains("Test"));
        assert!(result.contains('\u{FFFD}'));
    }

    #[test]
    fn quoted_header_charset() {
        assert_eq!(charset_from_content_type(r#"text/html; charset="utf-8""#), Some("utf-8"));
        assert_eq!(charset_from_content_type("text/html"), None);
    }
}
