//! Event dispatch gateway library.
//!
//! Accepts WebSocket connections, gives each one private key/value state,
//! dispatches named events to a layered handler registry, and forwards
//! configured HTTP path prefixes to upstream services.

pub mod builtin;
pub mod config;
pub mod dispatch;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod state;

pub use builtin::builtin_layer;
pub use config::schema::GatewayConfig;
pub use dispatch::{async_handler, handler_fn, Handler, Layer};
pub use http::{Gateway, GatewayBuilder, GatewayError};
pub use lifecycle::Shutdown;
