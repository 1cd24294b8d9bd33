//! Per-connection event dispatch.
//!
//! # Responsibilities
//! - Allocate one ConnectionState per accepted connection
//! - Serialise each connection's events in arrival order
//! - Resolve, invoke, and reply (or apply the missing-reply policy)
//! - Drop the state and discard late replies once the connection closes
//!
//! # Design Decisions
//! - One worker task per connection: slow handlers only delay their own connection
//! - Handler panics are caught and rendered like any other failure
//! - Closing never cancels an in-flight handler; its result is discarded

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use futures_util::FutureExt;
use serde_json::Value;
use tokio::sync::{mpsc, Notify};

use crate::config::{DispatchConfig, MissingReplyPolicy};
use crate::dispatch::error::{panic_message, DispatchError};
use crate::dispatch::message::{ConnectionHandle, InboundEvent};
use crate::dispatch::registry::HandlerRegistry;
use crate::net::{ConnectionId, ConnectionPhase};
use crate::observability::metrics;
use crate::state::{Base64Codec, Codec, ConnectionState};

/// Routes events from every live connection to the handler registry.
pub struct Dispatcher {
    registry: Arc<HandlerRegistry>,
    codec: Arc<dyn Codec>,
    sessions: DashMap<ConnectionId, Live>,
    missing_reply: MissingReplyPolicy,
    queue_capacity: usize,
}

impl Dispatcher {
    pub fn new(registry: Arc<HandlerRegistry>, config: &DispatchConfig, codec: Arc<dyn Codec>) -> Self {
        Self {
            registry,
            codec,
            sessions: DashMap::new(),
            missing_reply: config.missing_reply,
            queue_capacity: config.queue_capacity.max(1),
        }
    }

    /// Dispatcher with default settings and the base64 codec.
    pub fn with_registry(registry: Arc<HandlerRegistry>) -> Self {
        Self::new(registry, &DispatchConfig::default(), Arc::new(Base64Codec))
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// Accept a connection: allocate its state, start its worker, mark it Active.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn open(self: &Arc<Self>, handle: ConnectionHandle) -> Session {
        let (events_tx, events_rx) = mpsc::channel(self.queue_capacity);
        let state = ConnectionState::new(Arc::clone(&self.codec));
        let live = Live {
            handle: handle.clone(),
            wake: Arc::new(Notify::new()),
        };

        self.sessions.insert(handle.id(), live.clone());
        handle.phase().activate();
        metrics::connection_opened();

        tracing::debug!(connection_id = %handle.id(), "Connection active");

        let dispatcher = Arc::clone(self);
        let worker = live.clone();
        tokio::spawn(async move {
            dispatcher.run_worker(worker, state, events_rx).await;
        });

        Session {
            live,
            events: events_tx,
            dispatcher: Arc::clone(self),
        }
    }

    /// Number of connections currently Active.
    pub fn active_connections(&self) -> usize {
        self.sessions.len()
    }

    /// Phase of a live connection, `None` once it has been released.
    pub fn phase(&self, id: ConnectionId) -> Option<ConnectionPhase> {
        self.sessions.get(&id).map(|live| live.handle.phase().get())
    }

    /// Transition a connection to Closed and forget it. Its worker stops and
    /// drops the connection state once any in-flight handler returns.
    pub fn close(&self, id: ConnectionId) {
        if let Some((_, live)) = self.sessions.remove(&id) {
            self.release(&live);
        }
    }

    fn release(&self, live: &Live) {
        self.sessions.remove(&live.handle.id());
        if live.handle.phase().close() {
            live.wake.notify_one();
            metrics::connection_closed();
            tracing::debug!(connection_id = %live.handle.id(), "Connection closed");
        }
    }

    async fn run_worker(
        &self,
        live: Live,
        mut state: ConnectionState,
        mut events: mpsc::Receiver<InboundEvent>,
    ) {
        let Live { handle, wake } = live;
        loop {
            let event = tokio::select! {
                biased;
                _ = wake.notified() => break,
                event = events.recv() => event,
            };
            let Some(event) = event else { break };
            if handle.phase().is_closed() {
                break;
            }
            self.dispatch_one(&handle, &mut state, event).await;
        }
        // state dropped here: released with the connection
        tracing::trace!(connection_id = %handle.id(), "Connection state released");
    }

    async fn dispatch_one(
        &self,
        handle: &ConnectionHandle,
        state: &mut ConnectionState,
        event: InboundEvent,
    ) {
        let InboundEvent { name, args, reply } = event;
        let start = Instant::now();
        let outcome = self.invoke(handle, state, &name, args).await;

        metrics::record_event(
            outcome.as_ref().err().map(DispatchError::kind).unwrap_or("ok"),
            start,
        );

        if handle.phase().is_closed() {
            tracing::trace!(connection_id = %handle.id(), event = %name, "Discarding result after close");
            return;
        }

        match (outcome, reply) {
            (Ok(value), Some(reply)) => reply.send(value),
            (Ok(_), None) => {}
            (Err(err), Some(reply)) => {
                tracing::debug!(connection_id = %handle.id(), event = %name, error = %err, "Event failed");
                reply.send(err.to_payload());
            }
            (Err(err), None) => match self.missing_reply {
                MissingReplyPolicy::Drop => {}
                MissingReplyPolicy::Log => tracing::warn!(
                    connection_id = %handle.id(),
                    event = %name,
                    kind = err.kind(),
                    error = %err,
                    "Event failed with no reply channel"
                ),
            },
        }
    }

    async fn invoke(
        &self,
        handle: &ConnectionHandle,
        state: &mut ConnectionState,
        name: &str,
        args: Vec<Value>,
    ) -> Result<Value, DispatchError> {
        let handler = self.registry.resolve(name)?;

        match AssertUnwindSafe(handler.call(handle, state, args))
            .catch_unwind()
            .await
        {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => Err(DispatchError::Handler(err)),
            Err(payload) => Err(DispatchError::Panicked(panic_message(&*payload))),
        }
    }
}

/// Registry entry for a live connection; `wake` stops its worker on close.
#[derive(Clone)]
struct Live {
    handle: ConnectionHandle,
    wake: Arc<Notify>,
}

/// The dispatcher's side of one live connection.
///
/// Dropping the session closes the connection.
pub struct Session {
    live: Live,
    events: mpsc::Sender<InboundEvent>,
    dispatcher: Arc<Dispatcher>,
}

impl Session {
    pub fn handle(&self) -> &ConnectionHandle {
        &self.live.handle
    }

    pub fn id(&self) -> ConnectionId {
        self.live.handle.id()
    }

    /// Queue an event for this connection. Waits only on this connection's
    /// queue. Returns false if the connection is closed.
    pub async fn submit(&self, event: InboundEvent) -> bool {
        if self.live.handle.phase().is_closed() {
            return false;
        }
        self.events.send(event).await.is_ok()
    }

    /// Close the connection. Queued events are not dispatched.
    pub fn close(self) {}
}

impl Drop for Session {
    fn drop(&mut self) {
        self.dispatcher.release(&self.live);
    }
}
