//! Inbound events, reply handles and the connection handle given to handlers.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

use crate::net::{ConnectionId, PhaseCell};

/// A named event with typed arguments and an optional reply handle.
///
/// The transport decides whether a reply was requested before the event
/// reaches the dispatcher.
#[derive(Debug)]
pub struct InboundEvent {
    pub name: String,
    pub args: Vec<Value>,
    pub reply: Option<Reply>,
}

impl InboundEvent {
    pub fn new(name: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            args,
            reply: None,
        }
    }

    pub fn with_reply(mut self, reply: Reply) -> Self {
        self.reply = Some(reply);
        self
    }
}

/// One-shot reply channel back to the caller of an event.
pub struct Reply(Box<dyn FnOnce(Value) + Send>);

impl Reply {
    /// Wrap a callback that delivers the reply value.
    pub fn new(f: impl FnOnce(Value) + Send + 'static) -> Self {
        Self(Box::new(f))
    }

    /// A reply handle paired with a receiver, for in-process callers.
    pub fn channel() -> (Self, oneshot::Receiver<Value>) {
        let (tx, rx) = oneshot::channel();
        let reply = Self::new(move |value| {
            let _ = tx.send(value);
        });
        (reply, rx)
    }

    pub fn send(self, value: Value) {
        (self.0)(value)
    }
}

impl std::fmt::Debug for Reply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Reply")
    }
}

/// Messages queued for delivery to the client.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    /// Server-initiated event.
    Event { name: String, args: Vec<Value> },
    /// Acknowledgement of a client event that requested a reply.
    Ack { id: u64, legacy: bool, data: Value },
}

/// Opaque reference to one client session, handed to every handler.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    phase: Arc<PhaseCell>,
    outbound: mpsc::Sender<Outbound>,
}

impl ConnectionHandle {
    pub fn new(outbound: mpsc::Sender<Outbound>) -> Self {
        Self {
            id: ConnectionId::new(),
            phase: Arc::new(PhaseCell::new()),
            outbound,
        }
    }

    /// A handle plus the receiving end of its outbound queue.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn phase(&self) -> &PhaseCell {
        &self.phase
    }

    /// Push an event to the client. Returns false if the connection is
    /// closed or its outbound queue is full.
    pub fn emit(&self, name: impl Into<String>, args: Vec<Value>) -> bool {
        self.push(Outbound::Event {
            name: name.into(),
            args,
        })
    }

    pub(crate) fn push(&self, message: Outbound) -> bool {
        if self.phase.is_closed() {
            return false;
        }
        match self.outbound.try_send(message) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(connection_id = %self.id, "Outbound queue full, dropping message");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn reply_channel_delivers_value() {
        let (reply, rx) = Reply::channel();
        reply.send(json!("done"));
        assert_eq!(rx.await.unwrap(), json!("done"));
    }

    #[tokio::test]
    async fn emit_queues_event() {
        let (handle, mut rx) = ConnectionHandle::channel(4);
        assert!(handle.emit("tick", vec![json!(1)]));
        assert_eq!(
            rx.recv().await.unwrap(),
            Outbound::Event {
                name: "tick".into(),
                args: vec![json!(1)]
            }
        );
    }

    #[test]
    fn emit_after_close_is_dropped() {
        let (handle, mut rx) = ConnectionHandle::channel(4);
        handle.phase().close();
        assert!(!handle.emit("tick", vec![]));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn emit_reports_full_queue() {
        let (handle, _rx) = ConnectionHandle::channel(1);
        assert!(handle.emit("a", vec![]));
        assert!(!handle.emit("b", vec![]));
    }
}
