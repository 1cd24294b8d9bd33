//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! set_port(requested)
//!     → ports.rs (coerce, dedupe, bind)
//!     → HTTP server starts serving the new listener
//!
//! Incoming WebSocket connection
//!     → connection.rs (id, phase: Connecting → Active → Closed)
//!     → Hand off to the dispatcher
//! ```
//!
//! # Design Decisions
//! - Port binding is idempotent per requested port
//! - Each connection carries its own phase for late-reply suppression

pub mod connection;
pub mod ports;

pub use connection::{ConnectionId, ConnectionPhase, PhaseCell};
pub use ports::{BindError, PortBindingTable, PortSpec};
