//! Logical request bodies and their wire encodings.
//!
//! A caller hands the engine a *logical* body; the encoder turns it into a
//! wire-ready payload and content headers at request-fill time. The set of
//! body kinds is a closed tagged union with one encoder per variant, resolved
//! once per wire attempt (retries and redirects re-encode from the logical
//! value rather than reusing a spent payload).

mod multipart;

use std::path::PathBuf;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

pub use multipart::{FieldValue, FormField, build_form};

use crate::engine::WebError;

/// A logical request body, prior to encoding.
///
/// Dispatch precedence at fill time: explicit multipart form fields (carried
/// separately on the operation) → [`Body::Dictionary`] → [`Body::Xml`] →
/// [`Body::File`] → [`Body::Bytes`] → [`Body::Form`] → [`Body::Text`].
#[derive(Debug, Clone)]
pub enum Body {
    /// URL-encoded form pairs, unless the method is GET (then the pairs are
    /// merged into the query string at URI-preparation time). A `None` value
    /// drops the whole pair silently.
    Dictionary(Vec<(String, Option<String>)>),
    /// An XML document, serialized with the encoding declared in its
    /// `<?xml ?>` declaration if present, else UTF-8.
    Xml(String),
    /// A raw byte stream read from a file, reopened on every wire attempt.
    File(PathBuf),
    /// A raw byte buffer.
    Bytes(Vec<u8>),
    /// A pre-built multipart payload.
    Form(Vec<FormField>),
    /// Fallback: any other value in its string representation, encoded with
    /// the charset declared in the `Content-Type` header if parseable.
    Text(String),
}

/// Encodes dictionary pairs as `key=value` joined with `&`, percent-encoding
/// both sides. Pairs with a `None` value are dropped silently.
#[must_use]
pub fn format_dictionary(pairs: &[(String, Option<String>)]) -> String {
    let mut encoded = String::new();
    for (key, value) in pairs {
        let Some(value) = value else { continue };
        if !encoded.is_empty() {
            encoded.push('&');
        }
        encoded.push_str(&urlencoding::encode(key));
        encoded.push('=');
        encoded.push_str(&urlencoding::encode(value));
    }
    encoded
}

/// Extracts the `charset` parameter from a Content-Type header value.
#[must_use]
pub fn charset_from_content_type(content_type: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|param| {
        let (name, value) = param.split_once('=')?;
        if name.trim().eq_ignore_ascii_case("charset") {
            Some(value.trim().trim_matches('"').to_string())
        } else {
            None
        }
    })
}

fn is_supported_charset(charset: &str) -> bool {
    matches!(
        charset.to_ascii_lowercase().as_str(),
        "utf-8" | "utf8" | "us-ascii" | "ascii"
    )
}

/// Encodes text using the charset declared in the Content-Type header.
///
/// A malformed content type or an unsupported charset is tolerated (UTF-8 is
/// used) unless `strict` is set, in which case it surfaces as a terminating
/// content-type error.
///
/// # Errors
///
/// Returns [`WebError::ContentType`] under strict validation.
pub fn encode_text(
    text: &str,
    content_type: Option<&str>,
    strict: bool,
) -> Result<Vec<u8>, WebError> {
    if let Some(content_type) = content_type {
        if !content_type.contains('/') {
            if strict {
                return Err(WebError::content_type(format!(
                    "malformed Content-Type: {content_type}"
                )));
            }
        } else if let Some(charset) = charset_from_content_type(content_type) {
            if !is_supported_charset(&charset) && strict {
                return Err(WebError::content_type(format!(
                    "unsupported charset: {charset}"
                )));
            }
        }
    }
    Ok(text.as_bytes().to_vec())
}

#[allow(clippy::expect_used)]
static XML_DECLARED_ENCODING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\s*<\?xml[^>]*\bencoding\s*=\s*["']([^"']+)["']"#)
        .expect("XML declaration regex is valid") // Static pattern, safe to panic
});

/// Serializes an XML document to bytes, honoring the encoding declared in
/// its `<?xml ?>` declaration when it names a supported charset; anything
/// else falls back to UTF-8.
#[must_use]
pub fn encode_xml(document: &str) -> Vec<u8> {
    if let Some(declared) = XML_DECLARED_ENCODING
        .captures(document)
        .and_then(|captures| captures.get(1))
    {
        if !is_supported_charset(declared.as_str()) {
            debug!(
                encoding = declared.as_str(),
                "declared XML encoding has no encoder; emitting UTF-8"
            );
        }
    }
    document.as_bytes().to_vec()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    // ==================== Dictionary Encoding Tests ====================

    #[test]
    fn test_format_dictionary_joins_pairs() {
        let pairs = vec![
            ("a".to_string(), Some("1".to_string())),
            ("b".to_string(), Some("2".to_string())),
        ];
        assert_eq!(format_dictionary(&pairs), "a=1&b=2");
    }

    #[test]
    fn test_format_dictionary_drops_null_values() {
        let pairs = vec![
            ("a".to_string(), Some("1".to_string())),
            ("b".to_string(), None),
        ];
        assert_eq!(format_dictionary(&pairs), "a=1");
    }

    #[test]
    fn test_format_dictionary_percent_encodes_both_sides() {
        let pairs = vec![("key name".to_string(), Some("a&b=c".to_string()))];
        assert_eq!(format_dictionary(&pairs), "key%20name=a%26b%3Dc");
    }

    #[test]
    fn test_format_dictionary_empty_input() {
        assert_eq!(format_dictionary(&[]), "");
    }

    // ==================== Charset Tests ====================

    #[test]
    fn test_charset_from_content_type_found() {
        assert_eq!(
            charset_from_content_type("text/plain; charset=utf-8"),
            Some("utf-8".to_string())
        );
        assert_eq!(
            charset_from_content_type("text/plain; boundary=x; charset=\"US-ASCII\""),
            Some("US-ASCII".to_string())
        );
    }

    #[test]
    fn test_charset_from_content_type_absent() {
        assert_eq!(charset_from_content_type("text/plain"), None);
        assert_eq!(charset_from_content_type("text/plain; boundary=x"), None);
    }

    #[test]
    fn test_encode_text_default_utf8() {
        let bytes = encode_text("héllo", None, false).unwrap();
        assert_eq!(bytes, "héllo".as_bytes());
    }

    #[test]
    fn test_encode_text_malformed_content_type_tolerated() {
        assert!(encode_text("body", Some("not-a-content-type"), false).is_ok());
    }

    #[test]
    fn test_encode_text_malformed_content_type_strict_fails() {
        let result = encode_text("body", Some("not-a-content-type"), true);
        assert!(matches!(result, Err(WebError::ContentType { .. })));
    }

    #[test]
    fn test_encode_text_unsupported_charset_strict_fails() {
        let result = encode_text("body", Some("text/plain; charset=shift_jis"), true);
        assert!(matches!(result, Err(WebError::ContentType { .. })));
    }

    #[test]
    fn test_encode_text_unsupported_charset_lenient_falls_back() {
        let bytes = encode_text("body", Some("text/plain; charset=shift_jis"), false).unwrap();
        assert_eq!(bytes, b"body");
    }

    // ==================== XML Tests ====================

    #[test]
    fn test_encode_xml_with_declaration() {
        let doc = r#"<?xml version="1.0" encoding="utf-8"?><root/>"#;
        assert_eq!(encode_xml(doc), doc.as_bytes());
    }

    #[test]
    fn test_encode_xml_without_declaration() {
        let doc = "<root><child/></root>";
        assert_eq!(encode_xml(doc), doc.as_bytes());
    }
}
