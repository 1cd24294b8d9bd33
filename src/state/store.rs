//! Per-connection key/value state.

use std::collections::HashMap;
use std::sync::Arc;

use crate::state::codec::{Base64Codec, Codec};

/// Key/value state owned by exactly one connection.
///
/// Keys and values pass through the codec on the way in and out; the
/// encoded representation never leaves this type.
#[derive(Debug)]
pub struct ConnectionState {
    entries: HashMap<String, String>,
    codec: Arc<dyn Codec>,
}

impl ConnectionState {
    /// Create an empty state using the given codec.
    pub fn new(codec: Arc<dyn Codec>) -> Self {
        Self {
            entries: HashMap::new(),
            codec,
        }
    }

    /// Read a value.
    ///
    /// A missing key decodes the empty string, so there is no "not found"
    /// sentinel distinct from whatever `Codec::decode("")` yields.
    pub fn get(&self, key: &str) -> String {
        let stored = self
            .entries
            .get(&self.codec.encode(key))
            .map(String::as_str)
            .unwrap_or("");
        self.codec.decode(stored)
    }

    /// Store a value, returning `self` for chaining.
    pub fn set(&mut self, key: &str, value: &str) -> &mut Self {
        let key = self.codec.encode(key);
        let value = self.codec.encode(value);
        self.entries.insert(key, value);
        self
    }
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::new(Arc::new(Base64Codec))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_get() {
        let mut state = ConnectionState::default();
        state.set("k", "v");
        assert_eq!(state.get("k"), "v");
    }

    #[test]
    fn miss_returns_decoded_empty() {
        let state = ConnectionState::default();
        assert_eq!(state.get("absent"), "");
    }

    #[test]
    fn set_chains_and_overwrites() {
        let mut state = ConnectionState::default();
        state.set("a", "1").set("b", "2").set("a", "3");
        assert_eq!(state.get("a"), "3");
        assert_eq!(state.get("b"), "2");
    }

    #[test]
    fn stored_form_is_encoded() {
        let codec = Base64Codec;
        let mut state = ConnectionState::default();
        state.set("user", "alice");

        assert!(!state.entries.contains_key("user"));
        assert_eq!(
            state.entries.get(&codec.encode("user")),
            Some(&codec.encode("alice"))
        );
    }

    #[test]
    fn corrupted_entry_reads_empty() {
        let codec = Base64Codec;
        let mut state = ConnectionState::default();
        state
            .entries
            .insert(codec.encode("broken"), "%%%".to_string());
        assert_eq!(state.get("broken"), "");
    }
}
