//! Case-insensitive header lookup.
//!
//! The hosting platform hands us headers as a flat `name → value` map with
//! whatever casing and stray whitespace the client sent. [`HeaderMap`]
//! canonicalizes the keys once (trimmed, ASCII-lowercased) so every later
//! lookup is a plain map access.
//!
//! The same type holds multipart part headers, which have identical
//! case-insensitivity rules.
//!
//! ## Duplicates
//!
//! When two raw keys normalize to the same key (`Content-Type` and
//! ` content-type `), the first one inserted wins. Envelope headers arrive
//! in a `BTreeMap`, so "first" is the byte order of the raw keys and the
//! outcome is deterministic.

use std::collections::BTreeMap;

/// Header names the pipeline looks up.
pub const CONTENT_TYPE: &str = "content-type";
pub const CONTENT_DISPOSITION: &str = "content-disposition";

/// Normalized, case-insensitive header lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderMap {
    entries: BTreeMap<String, String>,
}

impl HeaderMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a header unless its normalized name is already present.
    pub fn insert(&mut self, name: &str, value: impl Into<String>) {
        self.entries
            .entry(normalize(name))
            .or_insert_with(|| value.into());
    }

    /// Append a continuation to an existing header value.
    ///
    /// Returns `false` when there is no header of that name to extend.
    pub(crate) fn extend_value(&mut self, name: &str, continuation: &str) -> bool {
        match self.entries.get_mut(&normalize(name)) {
            Some(value) => {
                value.push(' ');
                value.push_str(continuation);
                true
            }
            None => false,
        }
    }

    /// Look up a header, returning `""` when absent.
    pub fn get(&self, name: &str) -> &str {
        self.get_opt(name).unwrap_or("")
    }

    pub fn get_opt(&self, name: &str) -> Option<&str> {
        self.entries.get(&normalize(name)).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate normalized names and their values in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K, V> FromIterator<(K, V)> for HeaderMap
where
    K: AsRef<str>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = HeaderMap::new();
        for (name, value) in iter {
            map.insert(name.as_ref(), value);
        }
        map
    }
}

/// Canonicalize a platform header mapping.
pub fn normalize_headers(raw: &BTreeMap<String, String>) -> HeaderMap {
    raw.iter().map(|(k, v)| (k, v.clone())).collect()
}

fn normalize(name: &str) -> String {
    name.trim().to_ascii_lowercase()
}
