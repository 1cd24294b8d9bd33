//! Idempotent port binding.
//!
//! # Responsibilities
//! - Coerce requested port values (numbers or numeric strings)
//! - Bind each requested port at most once per process
//! - Remember which listening port each request resolved to
//!
//! # Design Decisions
//! - Binding is synchronous (`std::net`) so the table lock is never held across an await
//! - Re-requesting a bound port is a no-op returning the original binding
//! - Only binds whose listener was handed off successfully mutate the table

use std::net::TcpListener as StdTcpListener;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// A requested port, as it appears in configuration or API calls.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum PortSpec {
    Number(i64),
    Text(String),
}

impl PortSpec {
    /// Coerce to a numeric port.
    pub fn to_port(&self) -> Result<u16, BindError> {
        match self {
            PortSpec::Number(n) => {
                u16::try_from(*n).map_err(|_| BindError::InvalidPort(n.to_string()))
            }
            PortSpec::Text(s) => s
                .trim()
                .parse::<u16>()
                .map_err(|_| BindError::InvalidPort(s.clone())),
        }
    }
}

impl From<u16> for PortSpec {
    fn from(port: u16) -> Self {
        PortSpec::Number(port.into())
    }
}

impl From<i64> for PortSpec {
    fn from(port: i64) -> Self {
        PortSpec::Number(port)
    }
}

impl From<&str> for PortSpec {
    fn from(port: &str) -> Self {
        PortSpec::Text(port.to_string())
    }
}

impl From<String> for PortSpec {
    fn from(port: String) -> Self {
        PortSpec::Text(port)
    }
}

/// Error type for bind operations.
#[derive(Debug, thiserror::Error)]
pub enum BindError {
    /// The requested value is not a port number.
    #[error("invalid port {0:?}")]
    InvalidPort(String),
    /// The OS refused the bind (e.g., address already in use).
    #[error("failed to bind port {port}: {source}")]
    Io {
        port: u16,
        #[source]
        source: std::io::Error,
    },
    /// The listener was bound but could not be served.
    #[error("cannot serve port {port}: {reason}")]
    Serve { port: u16, reason: String },
}

#[derive(Debug, Default)]
struct Table {
    /// (requested, bound) pairs; each requested port appears once.
    entries: Vec<(u16, u16)>,
    current: Option<u16>,
}

/// Table of ports bound by this process.
#[derive(Debug)]
pub struct PortBindingTable {
    host: String,
    table: Mutex<Table>,
}

impl PortBindingTable {
    /// Create an empty table binding on `host`.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            table: Mutex::new(Table::default()),
        }
    }

    /// Bind `requested` unless it is already bound, returning the listening port.
    ///
    /// A fresh listener is passed to `start`; the port is recorded only if
    /// `start` returns `Ok`. Concurrent calls are serialised: the lock is held
    /// across the (synchronous) bind and hand-off so the same port is never
    /// bound twice.
    pub fn bind<F>(&self, requested: impl Into<PortSpec>, start: F) -> Result<u16, BindError>
    where
        F: FnOnce(u16, StdTcpListener) -> Result<(), BindError>,
    {
        let requested = requested.into().to_port()?;
        let mut table = self.table.lock();

        if let Some(&(_, bound)) = table
            .entries
            .iter()
            .find(|&&(r, b)| r == requested || (requested != 0 && b == requested))
        {
            table.current = Some(bound);
            tracing::debug!(requested, port = bound, "Port already bound");
            return Ok(bound);
        }

        let listener = StdTcpListener::bind((self.host.as_str(), requested))
            .and_then(|l| l.set_nonblocking(true).map(|_| l))
            .map_err(|source| BindError::Io {
                port: requested,
                source,
            })?;
        let bound = listener
            .local_addr()
            .map_err(|source| BindError::Io {
                port: requested,
                source,
            })?
            .port();

        start(bound, listener)?;

        table.entries.push((requested, bound));
        table.current = Some(bound);

        tracing::info!(host = %self.host, requested, port = bound, "Port bound");
        Ok(bound)
    }

    /// The most recently resolved port, if any bind succeeded.
    pub fn current(&self) -> Option<u16> {
        self.table.lock().current
    }

    /// Every bound listening port, in bind order.
    pub fn ports(&self) -> Vec<u16> {
        self.table.lock().entries.iter().map(|(_, b)| *b).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Keeps every started listener open for the duration of a test.
    #[derive(Default)]
    struct Listeners(Vec<StdTcpListener>);

    impl Listeners {
        fn keep(&mut self) -> impl FnOnce(u16, StdTcpListener) -> Result<(), BindError> + '_ {
            move |_, listener| {
                self.0.push(listener);
                Ok(())
            }
        }
    }

    #[test]
    fn coerces_numbers_and_strings() {
        assert_eq!(PortSpec::from(8080u16).to_port().unwrap(), 8080);
        assert_eq!(PortSpec::from(" 9000 ").to_port().unwrap(), 9000);
        assert!(matches!(
            PortSpec::from("http").to_port(),
            Err(BindError::InvalidPort(_))
        ));
        assert!(matches!(
            PortSpec::from(70_000i64).to_port(),
            Err(BindError::InvalidPort(_))
        ));
        assert!(matches!(
            PortSpec::from(-1i64).to_port(),
            Err(BindError::InvalidPort(_))
        ));
    }

    #[test]
    fn binding_same_port_twice_is_noop() {
        let table = PortBindingTable::new("127.0.0.1");
        let mut listeners = Listeners::default();

        let port = table.bind(0u16, listeners.keep()).unwrap();
        let again = table
            .bind("0", |_, _| panic!("already bound port was bound again"))
            .unwrap();

        assert_eq!(again, port);
        assert_eq!(listeners.0.len(), 1);
        assert_eq!(table.ports(), vec![port]);
        assert_eq!(table.current(), Some(port));
    }

    #[test]
    fn explicit_request_for_ephemeral_port_reuses_it() {
        let table = PortBindingTable::new("127.0.0.1");
        let mut listeners = Listeners::default();
        let port = table.bind(0u16, listeners.keep()).unwrap();

        let again = table
            .bind(port, |_, _| panic!("already bound port was bound again"))
            .unwrap();
        assert_eq!(again, port);
        assert_eq!(table.ports(), vec![port]);
    }

    #[test]
    fn invalid_port_leaves_table_untouched() {
        let table = PortBindingTable::new("127.0.0.1");
        assert!(table.bind("nope", |_, _| Ok(())).is_err());
        assert!(table.ports().is_empty());
        assert_eq!(table.current(), None);
    }

    #[test]
    fn port_in_use_is_reported() {
        let holder = StdTcpListener::bind("127.0.0.1:0").unwrap();
        let taken = holder.local_addr().unwrap().port();

        let table = PortBindingTable::new("127.0.0.1");
        match table.bind(taken, |_, _| Ok(())) {
            Err(BindError::Io { port, .. }) => assert_eq!(port, taken),
            other => panic!("expected bind error, got {other:?}"),
        }
        assert!(table.ports().is_empty());
    }

    #[test]
    fn failed_hand_off_is_not_recorded() {
        let table = PortBindingTable::new("127.0.0.1");

        let result = table.bind(0u16, |port, _| {
            Err(BindError::Serve {
                port,
                reason: "refused".into(),
            })
        });
        assert!(matches!(result, Err(BindError::Serve { .. })));
        assert!(table.ports().is_empty());
        assert_eq!(table.current(), None);

        // the next request binds for real
        let mut listeners = Listeners::default();
        let port = table.bind(0u16, listeners.keep()).unwrap();
        assert_eq!(listeners.0.len(), 1);
        assert_eq!(table.ports(), vec![port]);
    }

    #[test]
    fn different_ports_accumulate() {
        let table = PortBindingTable::new("127.0.0.1");
        let mut listeners = Listeners::default();
        let a = table.bind(0u16, listeners.keep()).unwrap();

        let spare = StdTcpListener::bind("127.0.0.1:0").unwrap();
        let b_requested = spare.local_addr().unwrap().port();
        drop(spare);

        let b = table.bind(b_requested, listeners.keep()).unwrap();
        assert_eq!(b, b_requested);
        assert_eq!(table.ports(), vec![a, b]);
        assert_eq!(table.current(), Some(b));
    }
}
