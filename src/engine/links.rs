//! RFC-8288 `Link` header parsing for pagination.
//!
//! Only the angle-bracketed URL and the `rel` attribute are supported;
//! other attributes are ignored. Callers wanting more can read the raw
//! headers themselves.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use reqwest::header::{HeaderMap, LINK};
use url::Url;

#[allow(clippy::expect_used)]
static LINK_SEGMENT: LazyLock<Regex> = LazyLock::new(|| {
    // Quoted and bare rel values are separate alternates; quotes around the
    // value are optional per RFC 8288.
    Regex::new(r#"<(?P<url>[^>]*)>\s*;\s*rel=(?:"(?P<quoted>[^"]*)"|(?P<bare>[^;,\s"]+))"#)
        .expect("Link header regex is valid") // Static pattern, safe to panic
});

/// Extracts `rel`-keyed pagination URLs from the response headers.
///
/// Every `Link` header value is read (the header may repeat), each is split
/// on `,`, and each segment is matched for `<url>; rel=value`. URLs are
/// resolved against `base_url` before storing. Relation names are
/// case-insensitive (keys are stored lowercased) and the first occurrence of
/// a relation wins. The map is rebuilt from scratch on every call - no
/// accumulation across pages.
#[must_use]
pub fn parse_link_header(headers: &HeaderMap, base_url: &Url) -> HashMap<String, String> {
    let mut relation_links = HashMap::new();

    for header in headers.get_all(LINK) {
        let Ok(header) = header.to_str() else {
            continue;
        };
        for segment in header.split(',') {
            let Some(captures) = LINK_SEGMENT.captures(segment) else {
                continue;
            };
            let target = captures.name("url").map_or("", |m| m.as_str());
            let rel = captures
                .name("quoted")
                .or_else(|| captures.name("bare"))
                .map_or("", |m| m.as_str());
            if target.is_empty() || rel.is_empty() {
                continue;
            }
            let rel = rel.to_ascii_lowercase();
            if relation_links.contains_key(&rel) {
                continue;
            }
            if let Ok(absolute) = base_url.join(target) {
                relation_links.insert(rel, absolute.to_string());
            }
        }
    }

    relation_links
}
