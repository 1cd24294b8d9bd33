//! Dispatch failures and their rendered form.

use serde_json::{json, Value};

/// A failure produced while dispatching one event.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// No layer defines the event name.
    #[error("unknown event {0:?}")]
    UnknownEvent(String),
    /// The handler returned an error.
    #[error("{0:#}")]
    Handler(anyhow::Error),
    /// The handler panicked.
    #[error("handler panicked: {0}")]
    Panicked(String),
}

impl DispatchError {
    /// Failure payload delivered through the reply handle.
    ///
    /// Always the rendered description, never the raw error value.
    pub fn to_payload(&self) -> Value {
        json!({ "error": self.to_string() })
    }

    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            DispatchError::UnknownEvent(_) => "unknown_event",
            DispatchError::Handler(_) => "handler",
            DispatchError::Panicked(_) => "panic",
        }
    }
}

/// Extract a printable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn unknown_event_payload() {
        let err = DispatchError::UnknownEvent("nope".into());
        assert_eq!(err.to_payload(), json!({ "error": "unknown event \"nope\"" }));
        assert_eq!(err.kind(), "unknown_event");
    }

    #[test]
    fn handler_error_renders_chain() {
        let inner: anyhow::Result<()> = Err(anyhow::anyhow!("disk full"));
        let err = DispatchError::Handler(inner.context("saving profile").unwrap_err());
        assert_eq!(err.to_string(), "saving profile: disk full");
    }

    #[test]
    fn panic_payloads() {
        assert_eq!(panic_message(&"boom"), "boom");
        assert_eq!(panic_message(&String::from("bang")), "bang");
        assert_eq!(panic_message(&42u8), "non-string panic payload");
    }
}
