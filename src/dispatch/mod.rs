//! Event dispatch subsystem.
//!
//! # Data Flow
//! ```text
//! Transport decodes a frame
//!     → message.rs (InboundEvent: name, typed args, optional Reply)
//!     → dispatcher.rs (per-connection queue, arrival order)
//!     → registry.rs (newest layer defining the name)
//!     → handler.rs (Handler::call(conn, &mut state, args))
//!     → Reply::send(value | {"error": rendered})
//!
//! Registry Compilation (at startup):
//!     Descriptor[] (layers, nested lists)
//!     → flattened left to right
//!     → frozen as immutable HandlerRegistry
//! ```
//!
//! # Design Decisions
//! - Registry immutable at runtime, shared via Arc
//! - Failures are rendered to text before they reach a reply handle
//! - Missing reply channels follow an explicit policy (drop | log)

pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod message;
pub mod registry;

pub use dispatcher::{Dispatcher, Session};
pub use error::DispatchError;
pub use handler::{async_handler, handler_fn, Handler, HandlerFuture, HandlerResult};
pub use message::{ConnectionHandle, InboundEvent, Outbound, Reply};
pub use registry::{Descriptor, HandlerRegistry, Layer, RegistryBuilder};
