//! Custom headers derived from secrets.
//!
//! # Data Flow
//! ```text
//! SecretStore
//!     → source.rs (prefix filter, strip, fetch values)   = HeaderSet
//!     → cache.rs (on-start / per-request / ttl policy)   = Arc<HeaderSet>
//!     → http::forward (overlay onto the inbound headers)
//! ```
//!
//! # Design Decisions
//! - Header names compare case-insensitively, so `Token` and `token`
//!   are one entry
//! - Values are marked sensitive so they never show up in `Debug` output
//! - Sets are replaced, never mutated, once handed to the cache

pub mod cache;
pub mod source;

pub use cache::{header_provider, HeaderProvider};
pub use source::SecretHeaderSource;

use axum::http::{HeaderMap, HeaderName, HeaderValue};

/// Resolved custom headers: name → value, names unique.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HeaderSet {
    headers: HeaderMap,
}

impl HeaderSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a header, returning the replaced value.
    pub fn insert(&mut self, name: HeaderName, mut value: HeaderValue) -> Option<HeaderValue> {
        value.set_sensitive(true);
        self.headers.insert(name, value)
    }

    pub fn get(&self, name: &str) -> Option<&HeaderValue> {
        self.headers.get(name)
    }

    pub fn len(&self) -> usize {
        self.headers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&HeaderName, &HeaderValue)> {
        self.headers.iter()
    }

    /// Overlay onto `target`; every value already present under one of our
    /// names is replaced, so custom headers win over client headers.
    pub fn apply_to(&self, target: &mut HeaderMap) {
        for (name, value) in self.headers.iter() {
            target.insert(name.clone(), value.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(entries: &[(&'static str, &'static str)]) -> HeaderSet {
        let mut set = HeaderSet::new();
        for (name, value) in entries {
            set.insert(
                HeaderName::from_static(name),
                HeaderValue::from_static(value),
            );
        }
        set
    }

    #[test]
    fn custom_headers_win_over_client_headers() {
        let mut target = HeaderMap::new();
        target.insert("api-key", HeaderValue::from_static("client"));
        target.append("api-key", HeaderValue::from_static("client-dup"));
        target.insert("accept", HeaderValue::from_static("*/*"));

        set(&[("api-key", "secret")]).apply_to(&mut target);

        let values: Vec<_> = target.get_all("api-key").iter().collect();
        assert_eq!(values, vec![&HeaderValue::from_static("secret")]);
        assert_eq!(target.get("accept").unwrap(), "*/*");
    }

    #[test]
    fn names_are_case_insensitive() {
        let mut headers = HeaderSet::new();
        headers.insert(
            HeaderName::from_bytes(b"Token").unwrap(),
            HeaderValue::from_static("a"),
        );
        let replaced = headers.insert(
            HeaderName::from_bytes(b"token").unwrap(),
            HeaderValue::from_static("b"),
        );
        assert_eq!(replaced.unwrap(), "a");
        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get("TOKEN").unwrap(), "b");
    }

    #[test]
    fn values_are_marked_sensitive() {
        let headers = set(&[("api-key", "secret")]);
        assert!(headers.get("api-key").unwrap().is_sensitive());
    }
}
