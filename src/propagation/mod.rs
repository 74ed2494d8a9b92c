//! # Propagation layer
//!
//! Cross-process correlation works by writing a span's identity into the
//! transport metadata of an outbound call and reading it back on the inbound
//! side. The carrier is a flat mapping from string keys to ordered string
//! values (the shape protocol headers take) accessed through the
//! [`Injector`] and [`Extractor`] traits so the propagator stays independent
//! of the concrete transport.
//!
//! Absent or malformed propagation data is never an error: extraction simply
//! yields no parent and the receiving side starts a root span.
use std::collections::HashMap;

pub mod header;

pub use header::HeaderPropagator;

/// Injector provides an interface for adding fields to an underlying carrier
/// such as a header map.
pub trait Injector {
    /// Add a key and value to the underlying data.
    fn set(&mut self, key: &str, value: String);
}

/// Extractor provides an interface for reading fields from an underlying
/// carrier such as a header map.
pub trait Extractor {
    /// Get the first value for a key from the underlying data.
    fn get(&self, key: &str) -> Option<&str>;

    /// Collect all the keys from the underlying data.
    fn keys(&self) -> Vec<&str>;
}

impl<S: std::hash::BuildHasher> Injector for HashMap<String, Vec<String>, S> {
    /// Set a key and value in the header map, replacing any previous values.
    fn set(&mut self, key: &str, value: String) {
        self.insert(key.to_lowercase(), vec![value]);
    }
}

impl<S: std::hash::BuildHasher> Extractor for HashMap<String, Vec<String>, S> {
    /// Get the first value for a key from the header map.
    fn get(&self, key: &str) -> Option<&str> {
        self.get(&key.to_lowercase())
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    /// Collect all the keys from the header map.
    fn keys(&self) -> Vec<&str> {
        self.keys().map(String::as_str).collect::<Vec<_>>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_map_get() {
        let mut carrier: HashMap<String, Vec<String>> = HashMap::new();
        carrier.set("headerName", "value".to_string());

        assert_eq!(
            Extractor::get(&carrier, "HEADERNAME"),
            Some("value"),
            "case insensitive extraction"
        );
    }

    #[test]
    fn header_map_get_missing_key() {
        let carrier: HashMap<String, Vec<String>> = HashMap::new();
        assert_eq!(Extractor::get(&carrier, "missing_key"), None);
    }

    #[test]
    fn header_map_first_value_wins() {
        let mut carrier: HashMap<String, Vec<String>> = HashMap::new();
        carrier.insert(
            "headername".to_string(),
            vec!["first".to_string(), "second".to_string()],
        );

        assert_eq!(Extractor::get(&carrier, "headerName"), Some("first"));
    }

    #[test]
    fn header_map_set_replaces_values() {
        let mut carrier: HashMap<String, Vec<String>> = HashMap::new();
        carrier.set("headerName", "old".to_string());
        carrier.set("headerName", "new".to_string());

        assert_eq!(Extractor::get(&carrier, "headername"), Some("new"));
    }

    #[test]
    fn header_map_keys() {
        let mut carrier: HashMap<String, Vec<String>> = HashMap::new();
        carrier.set("headerName1", "value1".to_string());
        carrier.set("headerName2", "value2".to_string());

        let got = Extractor::keys(&carrier);
        assert_eq!(got.len(), 2);
        assert!(got.contains(&"headername1"));
        assert!(got.contains(&"headername2"));
    }
}
