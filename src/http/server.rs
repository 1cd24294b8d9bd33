//! Gateway assembly and serving.
//!
//! # Responsibilities
//! - Build the handler registry from layer descriptors
//! - Create the Axum Router: event socket, application routes, middleware
//! - Bind listening ports (idempotently) and serve each on its own task
//! - Install forwarding rules, from config or at runtime
//!
//! # Design Decisions
//! - Cross-origin requests are always permitted
//! - The legacy packet dialect is always accepted by gateway-built sockets
//! - The request timeout covers application routes only; sockets and
//!   forwarded streams are long-lived

use std::sync::Arc;
use std::time::Duration;

use axum::{middleware, routing::get, Router};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::validation::{validate_config, ValidationError};
use crate::config::GatewayConfig;
use crate::dispatch::{Descriptor, Dispatcher, HandlerRegistry, RegistryBuilder};
use crate::http::forward::{forward_middleware, ForwardError, ForwardRule, ForwardingGate};
use crate::http::websocket::{ws_handler, SocketState};
use crate::lifecycle::Shutdown;
use crate::net::{BindError, PortBindingTable, PortSpec};
use crate::state::codec_for;

/// Errors raised while building a gateway.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("invalid configuration: {}", render(.0))]
    Config(Vec<ValidationError>),
    #[error(transparent)]
    Bind(#[from] BindError),
    #[error(transparent)]
    Forward(#[from] ForwardError),
}

fn render(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Collects handler layers and application routes for a [`Gateway`].
pub struct GatewayBuilder {
    config: GatewayConfig,
    registry: RegistryBuilder,
    routes: Router,
}

impl GatewayBuilder {
    fn new(config: GatewayConfig) -> Self {
        Self {
            config,
            registry: HandlerRegistry::builder(),
            routes: Router::new(),
        }
    }

    /// Add a handler layer (or nested list of layers). Later layers
    /// override earlier ones.
    pub fn layer(mut self, descriptor: impl Into<Descriptor>) -> Self {
        self.registry.add(descriptor);
        self
    }

    pub fn layers<I, D>(mut self, descriptors: I) -> Self
    where
        I: IntoIterator<Item = D>,
        D: Into<Descriptor>,
    {
        self.registry.extend(descriptors);
        self
    }

    /// Merge plain HTTP routes served next to the event socket.
    pub fn routes(mut self, routes: Router) -> Self {
        self.routes = self.routes.merge(routes);
        self
    }

    /// Assemble the gateway. If the config names a port it is bound (and
    /// served) immediately, which requires a Tokio runtime.
    pub fn build(self) -> Result<Gateway, GatewayError> {
        let mut config = self.config;
        validate_config(&config).map_err(GatewayError::Config)?;
        config.transport.legacy_protocol = true;

        let registry = Arc::new(self.registry.build());
        tracing::debug!(
            layers = registry.layer_count(),
            events = ?registry.event_names(),
            "Handler registry built"
        );

        let dispatcher = Arc::new(Dispatcher::new(
            registry,
            &config.dispatch,
            codec_for(config.state.codec),
        ));
        let shutdown = Shutdown::new();
        let gate = ForwardingGate::new(Duration::from_secs(config.timeouts.upstream_secs));
        for rule in &config.forward.rules {
            gate.install(ForwardRule::new(rule.prefix.clone(), &rule.upstream)?);
        }

        let socket_state = SocketState {
            dispatcher: Arc::clone(&dispatcher),
            transport: Arc::new(config.transport.clone()),
            shutdown: shutdown.clone(),
        };
        let router = build_router(&config, socket_state, self.routes, gate.clone());

        let gateway = Gateway {
            router,
            ports: PortBindingTable::new(config.listener.host.clone()),
            dispatcher,
            gate,
            shutdown,
            servers: Mutex::new(Vec::new()),
        };

        if let Some(port) = config.listener.port.clone() {
            gateway.set_port(port)?;
        }
        Ok(gateway)
    }
}

/// Build the Axum router with all middleware layers.
#[allow(deprecated)]
fn build_router(
    config: &GatewayConfig,
    socket_state: SocketState,
    routes: Router,
    gate: ForwardingGate,
) -> Router {
    let routes = routes.layer(TimeoutLayer::new(Duration::from_secs(
        config.timeouts.request_secs,
    )));

    Router::new()
        .route(&config.transport.path, get(ws_handler))
        .with_state(socket_state)
        .merge(routes)
        .layer(middleware::from_fn_with_state(gate, forward_middleware))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// A running event gateway.
pub struct Gateway {
    router: Router,
    ports: PortBindingTable,
    dispatcher: Arc<Dispatcher>,
    gate: ForwardingGate,
    shutdown: Shutdown,
    servers: Mutex<Vec<JoinHandle<()>>>,
}

impl Gateway {
    pub fn builder(config: GatewayConfig) -> GatewayBuilder {
        GatewayBuilder::new(config)
    }

    /// Bind and serve `port` unless it is already bound. Returns the actual
    /// listening port. Serving needs a Tokio runtime; without one the bind
    /// fails and nothing is recorded.
    pub fn set_port(&self, port: impl Into<PortSpec>) -> Result<u16, BindError> {
        self.ports.bind(port, |port, listener| {
            let runtime = tokio::runtime::Handle::try_current().map_err(|e| BindError::Serve {
                port,
                reason: e.to_string(),
            })?;
            let listener = {
                let _guard = runtime.enter();
                tokio::net::TcpListener::from_std(listener)
                    .map_err(|source| BindError::Io { port, source })?
            };
            self.serve(&runtime, port, listener);
            Ok(())
        })
    }

    fn serve(&self, runtime: &tokio::runtime::Handle, port: u16, listener: tokio::net::TcpListener) {
        let app = self.router.clone();
        let signal = self.shutdown.subscribe();
        let handle = runtime.spawn(async move {
            tracing::info!(port, "Gateway listening");
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(signal.wait())
                .await
            {
                tracing::error!(port, error = %e, "Server error");
            }
            tracing::info!(port, "Gateway stopped listening");
        });
        self.servers.lock().push(handle);
    }

    /// The most recently resolved listening port.
    pub fn port(&self) -> Option<u16> {
        self.ports.current()
    }

    /// Every port this gateway listens on.
    pub fn ports(&self) -> Vec<u16> {
        self.ports.ports()
    }

    /// Forward every request under `prefix` to `upstream`, reporting
    /// failures to `on_error`.
    pub fn forward(
        &self,
        prefix: impl Into<String>,
        upstream: impl AsRef<str>,
        on_error: impl Fn(&ForwardError) + Send + Sync + 'static,
    ) -> Result<(), ForwardError> {
        let rule = ForwardRule::new(prefix, upstream)?.with_error_handler(on_error);
        self.gate.install(rule);
        Ok(())
    }

    /// [`Gateway::forward`] with the default (log-only) error handler.
    pub fn forward_default(
        &self,
        prefix: impl Into<String>,
        upstream: impl AsRef<str>,
    ) -> Result<(), ForwardError> {
        self.gate.install(ForwardRule::new(prefix, upstream)?);
        Ok(())
    }

    pub fn forward_rules(&self) -> Vec<Arc<ForwardRule>> {
        self.gate.rules()
    }

    /// The fully layered router, for serving on a custom listener.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Stop accepting, close every socket, and wait for the listeners to drain.
    pub async fn shutdown(&self) {
        self.shutdown.trigger();
        let servers: Vec<_> = std::mem::take(&mut *self.servers.lock());
        for server in servers {
            let _ = server.await;
        }
        tracing::info!("Gateway shut down");
    }
}
