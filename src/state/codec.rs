//! Reversible string transforms applied to state at rest.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

use crate::config::CodecKind;

/// A reversible string transform.
///
/// `decode(encode(s)) == s` must hold for every string. `decode` never fails:
/// input it cannot interpret decodes to the empty string.
pub trait Codec: Send + Sync + std::fmt::Debug {
    fn encode(&self, value: &str) -> String;
    fn decode(&self, value: &str) -> String;
}

/// URL-safe base64 without padding.
#[derive(Debug, Clone, Copy, Default)]
pub struct Base64Codec;

impl Codec for Base64Codec {
    fn encode(&self, value: &str) -> String {
        URL_SAFE_NO_PAD.encode(value.as_bytes())
    }

    fn decode(&self, value: &str) -> String {
        URL_SAFE_NO_PAD
            .decode(value.as_bytes())
            .ok()
            .and_then(|bytes| String::from_utf8(bytes).ok())
            .unwrap_or_default()
    }
}

/// Identity transform.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainCodec;

impl Codec for PlainCodec {
    fn encode(&self, value: &str) -> String {
        value.to_string()
    }

    fn decode(&self, value: &str) -> String {
        value.to_string()
    }
}

/// Build the codec selected in configuration.
pub fn codec_for(kind: CodecKind) -> std::sync::Arc<dyn Codec> {
    match kind {
        CodecKind::Base64 => std::sync::Arc::new(Base64Codec),
        CodecKind::Plain => std::sync::Arc::new(PlainCodec),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base64_round_trips() {
        let codec = Base64Codec;
        for s in ["", "k", "hello world", "ünïcødé ✓", "a/b+c=d?", "\0\n\t"] {
            assert_eq!(codec.decode(&codec.encode(s)), s);
        }
    }

    #[test]
    fn base64_obscures_value() {
        let codec = Base64Codec;
        assert_eq!(codec.encode("hello"), "aGVsbG8");
        assert_ne!(codec.encode("secret"), "secret");
    }

    #[test]
    fn malformed_input_decodes_empty() {
        let codec = Base64Codec;
        assert_eq!(codec.decode("!!!not base64!!!"), "");
        // valid base64, invalid UTF-8
        assert_eq!(codec.decode("_w"), "");
        assert_eq!(codec.decode(""), "");
    }

    #[test]
    fn plain_is_identity() {
        let codec = PlainCodec;
        assert_eq!(codec.encode("x"), "x");
        assert_eq!(codec.decode("x"), "x");
    }
}
