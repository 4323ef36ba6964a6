//! Ordered, case-preserving header mapping
//!
//! Header keys arrive from callers with inconsistent spelling
//! (`Content-Type`, `content_type`, `CONTENT-TYPE`). Lookups for the
//! content-type key are pattern based; everything else is exact.

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Canonical spelling used when a content-type key has to be created
pub const CONTENT_TYPE: &str = "Content-Type";

/// Canonical spelling of the accept key
pub const ACCEPT: &str = "Accept";

static CONTENT_TYPE_KEY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^content[-_]type$").expect("content-type key pattern is valid"));

/// Whether a key names the content type (`content` + `-`/`_` + `type`, any case)
#[inline]
#[must_use]
pub fn is_content_type_key(key: &str) -> bool {
    CONTENT_TYPE_KEY.is_match(key.trim())
}

/// Whether a key names the accept header
#[inline]
#[must_use]
pub fn is_accept_key(key: &str) -> bool {
    key.trim().eq_ignore_ascii_case(ACCEPT)
}

/// Outgoing request headers in insertion order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Headers(IndexMap<String, String>);

impl Headers {
    /// Create empty headers
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a header, keeping the original position on replace
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.0.insert(key.into(), value.into())
    }

    /// Builder-style insert
    #[inline]
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    /// Exact-key lookup
    #[inline]
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Case-insensitive lookup, first match wins
    #[must_use]
    pub fn get_ignore_case(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// First key matching the content-type pattern
    #[must_use]
    pub fn content_type_key(&self) -> Option<&str> {
        self.0.keys().find(|k| is_content_type_key(k)).map(String::as_str)
    }

    /// Value of the first content-type key
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.content_type_key().and_then(|k| self.get(k))
    }

    /// Set the content type on the first matching key, or add `Content-Type`
    pub fn set_content_type(&mut self, value: impl Into<String>) {
        let key = self
            .content_type_key()
            .map_or_else(|| CONTENT_TYPE.to_string(), str::to_string);
        self.insert(key, value);
    }

    /// Keys naming the accept header, in order
    #[must_use]
    pub fn accept_keys(&self) -> Vec<String> {
        self.0.keys().filter(|k| is_accept_key(k)).cloned().collect()
    }

    /// Iterate over entries in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of entries
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no entries
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl<K: Into<String>, V: Into<String>, const N: usize> From<[(K, V); N]> for Headers {
    fn from(entries: [(K, V); N]) -> Self {
        entries.into_iter().collect()
    }
}

impl IntoIterator for Headers {
    type Item = (String, String);
    type IntoIter = indexmap::map::IntoIter<String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_type_key_pattern() {
        assert!(is_content_type_key("Content-Type"));
        assert!(is_content_type_key("content_type"));
        assert!(is_content_type_key("CONTENT-TYPE"));
        assert!(!is_content_type_key("contenttype"));
        assert!(!is_content_type_key("X-Content-Type-Options"));
        assert!(!is_content_type_key("Accept"));
    }

    #[test]
    fn first_match_in_insertion_order() {
        let headers = Headers::from([
            ("Accept", "application/json"),
            ("content_type", "application/x-ndjson"),
            ("Content-Type", "application/json"),
        ]);
        assert_eq!(headers.content_type_key(), Some("content_type"));
        assert_eq!(headers.content_type(), Some("application/x-ndjson"));
    }

    #[test]
    fn set_content_type_keeps_existing_key() {
        let mut headers = Headers::from([("content_type", "application/json")]);
        headers.set_content_type("application/x-ndjson");
        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get("content_type"), Some("application/x-ndjson"));

        let mut empty = Headers::new();
        empty.set_content_type("application/json");
        assert_eq!(empty.get(CONTENT_TYPE), Some("application/json"));
    }

    #[test]
    fn replace_keeps_position() {
        let mut headers = Headers::from([("a", "1"), ("b", "2")]);
        headers.insert("a", "3");
        let keys: Vec<_> = headers.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["a", "b"]);
    }

    #[test]
    fn accept_keys_any_case() {
        let headers = Headers::from([("accept", "x"), ("ACCEPT", "y"), ("Accept-Encoding", "gzip")]);
        assert_eq!(headers.accept_keys(), vec!["accept".to_string(), "ACCEPT".to_string()]);
        assert_eq!(headers.get_ignore_case("Accept"), Some("x"));
    }
}
