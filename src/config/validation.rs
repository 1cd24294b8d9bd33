//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate forwarding rules (prefix shape, upstream URL scheme)
//! - Validate value ranges (ports numeric, sizes > 0)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use url::Url;

use crate::config::schema::GatewayConfig;

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("listener.port: {0}")]
    Port(String),
    #[error("transport.path must start with '/' (got {0:?})")]
    TransportPath(String),
    #[error("transport.{0} must be greater than zero")]
    ZeroSize(&'static str),
    #[error("dispatch.queue_capacity must be greater than zero")]
    QueueCapacity,
    #[error("forward rule {index}: prefix must start with '/' (got {prefix:?})")]
    RulePrefix { index: usize, prefix: String },
    #[error("forward rule {index}: upstream {upstream:?} is not an http URL")]
    RuleUpstream { index: usize, upstream: String },
    #[error("observability.metrics_address {0:?} is not a socket address")]
    MetricsAddress(String),
}

/// Check a parsed configuration for semantic errors.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if let Some(port) = &config.listener.port {
        if let Err(e) = port.to_port() {
            errors.push(ValidationError::Port(e.to_string()));
        }
    }

    if !config.transport.path.starts_with('/') {
        errors.push(ValidationError::TransportPath(config.transport.path.clone()));
    }
    if config.transport.max_message_size == 0 {
        errors.push(ValidationError::ZeroSize("max_message_size"));
    }
    if config.transport.max_frame_size == 0 {
        errors.push(ValidationError::ZeroSize("max_frame_size"));
    }
    if config.transport.outbound_queue == 0 {
        errors.push(ValidationError::ZeroSize("outbound_queue"));
    }
    if config.dispatch.queue_capacity == 0 {
        errors.push(ValidationError::QueueCapacity);
    }

    for (index, rule) in config.forward.rules.iter().enumerate() {
        if !rule.prefix.starts_with('/') {
            errors.push(ValidationError::RulePrefix {
                index,
                prefix: rule.prefix.clone(),
            });
        }
        let upstream_ok = Url::parse(&rule.upstream)
            .map(|u| u.scheme() == "http")
            .unwrap_or(false);
        if !upstream_ok {
            errors.push(ValidationError::RuleUpstream {
                index,
                upstream: rule.upstream.clone(),
            });
        }
    }

    if config.observability.metrics_enabled
        && config
            .observability
            .metrics_address
            .parse::<std::net::SocketAddr>()
            .is_err()
    {
        errors.push(ValidationError::MetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
