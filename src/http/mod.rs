//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, CORS, tracing)
//!     → forward.rs (prefix match? stream to upstream : pass through)
//!     → websocket.rs (upgrade at the socket path)
//!         → frame.rs (decode event frames, encode replies)
//!         → [dispatcher runs the handler]
//!     → application routes
//! ```

pub mod forward;
pub mod frame;
pub mod server;
pub mod websocket;

pub use forward::{forward_middleware, ErrorHandler, ForwardError, ForwardRule, ForwardingGate};
pub use frame::{encode_outbound, parse_frame, EventFrame, FrameError};
pub use server::{Gateway, GatewayBuilder, GatewayError};
pub use websocket::{ws_handler, SocketState};
