//! WebSocket event transport.
//!
//! # Responsibilities
//! - Complete the upgrade handshake with transport limits applied
//! - Open one dispatcher session per socket
//! - Decode inbound text frames into events (with reply handles)
//! - Write replies and server pushes back, plus heartbeat pings
//!
//! # Data Flow
//! ```text
//! Client ──text frame──→ reader ──InboundEvent──→ Dispatcher worker
//! Client ←──text frame── writer ←──Outbound────── ConnectionHandle / Reply
//! ```
//!
//! # Design Decisions
//! - Reader and writer are separate tasks; either ending closes the session
//! - Undecodable frames are logged and skipped, the socket stays open
//! - Replies use the dialect of the frame that requested them

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};

use crate::config::TransportConfig;
use crate::dispatch::{ConnectionHandle, Dispatcher, InboundEvent, Outbound, Reply, Session};
use crate::http::frame::{encode_outbound, parse_frame};
use crate::lifecycle::Shutdown;

/// State injected into the upgrade handler.
#[derive(Clone)]
pub struct SocketState {
    pub dispatcher: Arc<Dispatcher>,
    pub transport: Arc<TransportConfig>,
    pub shutdown: Shutdown,
}

/// WebSocket upgrade handler.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<SocketState>) -> Response {
    ws.max_message_size(state.transport.max_message_size)
        .max_frame_size(state.transport.max_frame_size)
        .on_upgrade(move |socket| handle_socket(socket, state))
}

/// Drive one upgraded socket until either side closes or the gateway shuts down.
async fn handle_socket(socket: WebSocket, state: SocketState) {
    let (handle, mut outbound) = ConnectionHandle::channel(state.transport.outbound_queue);
    let session = state.dispatcher.open(handle.clone());
    let connection_id = session.id();
    tracing::info!(connection_id = %connection_id, "WebSocket client connected");

    let (mut ws_tx, mut ws_rx) = socket.split();

    // Writer task: outbound queue → socket, plus periodic ping
    let ping_every = state.transport.ping_interval_secs;
    let mut writer = tokio::spawn(async move {
        let mut ping = tokio::time::interval(Duration::from_secs(ping_every.max(1)));
        ping.tick().await; // first tick is immediate

        loop {
            tokio::select! {
                message = outbound.recv() => {
                    let Some(message) = message else { break };
                    let text = encode_outbound(&message);
                    if ws_tx.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                _ = ping.tick(), if ping_every > 0 => {
                    if ws_tx.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                }
            }
        }
        let _ = ws_tx.close().await;
    });

    let legacy = state.transport.legacy_protocol;
    let reader = async {
        while let Some(Ok(message)) = ws_rx.next().await {
            match message {
                Message::Text(text) => {
                    if !submit_frame(&session, text.as_str(), legacy).await {
                        break;
                    }
                }
                Message::Close(_) => break,
                Message::Binary(bytes) => {
                    tracing::debug!(connection_id = %connection_id, len = bytes.len(), "Ignoring binary frame");
                }
                // axum answers pings itself
                Message::Ping(_) | Message::Pong(_) => {}
            }
        }
    };

    tokio::select! {
        _ = reader => {},
        _ = &mut writer => {},
        _ = state.shutdown.subscribe().wait() => {},
    }

    session.close();
    writer.abort();
    tracing::info!(connection_id = %connection_id, "WebSocket client disconnected");
}

/// Decode one text frame and queue it. Returns false once the session is closed.
async fn submit_frame(session: &Session, text: &str, legacy: bool) -> bool {
    let frame = match parse_frame(text, legacy) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::debug!(connection_id = %session.id(), error = %e, "Dropping undecodable frame");
            return true;
        }
    };

    let mut event = InboundEvent::new(frame.name, frame.args);
    if let Some(id) = frame.ack {
        let handle = session.handle().clone();
        let dialect = frame.legacy;
        event = event.with_reply(Reply::new(move |data| {
            handle.push(Outbound::Ack {
                id,
                legacy: dialect,
                data,
            });
        }));
    }
    session.submit(event).await
}
