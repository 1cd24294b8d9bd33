//! Connection identity and lifecycle phase.
//!
//! # Responsibilities
//! - Generate unique connection IDs for tracing
//! - Track connection phase (Connecting → Active → Closed)
//!
//! # Design Decisions
//! - Closed is terminal; a closed connection never becomes active again
//! - Phase lives in an atomic so reply paths can check it without locking

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};

/// Global atomic counter for connection IDs.
/// Using relaxed ordering is sufficient since we only need uniqueness, not synchronization.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Lifecycle phase of a connection.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    /// Accepted, state not yet allocated.
    Connecting = 0,
    /// Events are being dispatched.
    Active = 1,
    /// Terminal. No further events are dispatched; late replies are discarded.
    Closed = 2,
}

impl From<u8> for ConnectionPhase {
    fn from(val: u8) -> Self {
        match val {
            1 => ConnectionPhase::Active,
            2 => ConnectionPhase::Closed,
            _ => ConnectionPhase::Connecting,
        }
    }
}

/// Atomic holder for a [`ConnectionPhase`].
#[derive(Debug)]
pub struct PhaseCell(AtomicU8);

impl PhaseCell {
    pub fn new() -> Self {
        Self(AtomicU8::new(ConnectionPhase::Connecting as u8))
    }

    pub fn get(&self) -> ConnectionPhase {
        self.0.load(Ordering::Acquire).into()
    }

    /// Move `Connecting → Active`. Returns false if the connection already closed.
    pub fn activate(&self) -> bool {
        self.0
            .compare_exchange(
                ConnectionPhase::Connecting as u8,
                ConnectionPhase::Active as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Move to `Closed`. Returns true only for the call that performed the transition.
    pub fn close(&self) -> bool {
        self.0.swap(ConnectionPhase::Closed as u8, Ordering::AcqRel) != ConnectionPhase::Closed as u8
    }

    pub fn is_closed(&self) -> bool {
        self.get() == ConnectionPhase::Closed
    }
}

impl Default for PhaseCell {
    fn default() -> Self {
        Self::new()
    }
}
