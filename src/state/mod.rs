//! Per-connection state subsystem.
//!
//! # Data Flow
//! ```text
//! handler calls state.set(k, v)
//!     → codec.rs (encode key and value)
//!     → store.rs (raw map, owned by the connection's worker)
//!
//! handler calls state.get(k)
//!     → codec.rs (encode key) → lookup → codec.rs (decode hit or "")
//! ```
//!
//! # Design Decisions
//! - State is created on accept and dropped when the connection's worker ends
//! - Reads never fail: corrupted or missing entries decode to ""
//! - No deletion or iteration; state only grows for the connection's lifetime

pub mod codec;
pub mod store;

pub use codec::{codec_for, Base64Codec, Codec, PlainCodec};
pub use store::ConnectionState;
