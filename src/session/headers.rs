//! Header storage and the content-header classification table.
//!
//! Request headers live in two disjoint sets: envelope headers that belong on
//! the request itself, and content headers that belong on the body. The
//! classification table below decides which set a caller-supplied header is
//! routed to on every request build.

/// Header names that belong on the request content rather than the request
/// envelope. Matching is case-insensitive.
const CONTENT_HEADER_NAMES: &[&str] = &[
    "Allow",
    "Content-Disposition",
    "Content-Encoding",
    "Content-Language",
    "Content-Length",
    "Content-Location",
    "Content-MD5",
    "Content-Range",
    "Content-Type",
    "Expires",
    "Last-Modified",
];

/// Returns true if the header name is classified as a content header.
#[must_use]
pub fn is_content_header(name: &str) -> bool {
    CONTENT_HEADER_NAMES
        .iter()
        .any(|known| known.eq_ignore_ascii_case(name))
}

/// An insertion-ordered, case-insensitive string-to-string header map.
///
/// Lookup and overwrite ignore ASCII case, but the name casing and position
/// of the first insertion are preserved so requests go out with the headers
/// in the order the caller supplied them.
#[derive(Debug, Clone, Default)]
pub struct HeaderBag {
    entries: Vec<(String, String)>,
}

impl HeaderBag {
    /// Creates an empty header bag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a header, overwriting the value of an existing entry with the
    /// same (case-insensitive) name in place.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        if let Some(entry) = self
            .entries
            .iter_mut()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(&name))
        {
            entry.1 = value;
        } else {
            self.entries.push((name, value));
        }
    }

    /// Returns the value for a header name, if present.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Removes a header, returning its value if it was present.
    pub fn remove(&mut self, name: &str) -> Option<String> {
        let index = self
            .entries
            .iter()
            .position(|(existing, _)| existing.eq_ignore_ascii_case(name))?;
        Some(self.entries.remove(index).1)
    }

    /// Returns true if the header name is present.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Iterates entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true when no headers are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Removes all entries.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl<'a> IntoIterator for &'a HeaderBag {
    type Item = (&'a str, &'a str);
    type IntoIter = Box<dyn Iterator<Item = (&'a str, &'a str)> + 'a>;

    fn into_iter(self) -> Self::IntoIter {
        Box::new(self.iter())
    }
}
