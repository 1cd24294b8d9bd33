//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

use crate::net::ports::PortSpec;

/// Root configuration for the event gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (initial port, bind host).
    pub listener: ListenerConfig,

    /// Options handed to the WebSocket transport.
    pub transport: TransportConfig,

    /// Event dispatch settings.
    pub dispatch: DispatchConfig,

    /// Per-connection state settings.
    pub state: StateConfig,

    /// HTTP forwarding rules installed at startup.
    pub forward: ForwardConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Port to bind at construction. Accepts a number or a numeric string.
    /// When absent nothing is bound until `Gateway::set_port` is called.
    pub port: Option<PortSpec>,

    /// Host/interface every bound port listens on.
    pub host: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            port: None,
            host: "0.0.0.0".to_string(),
        }
    }
}

/// WebSocket transport options.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Path the WebSocket upgrade is served on.
    pub path: String,

    /// Maximum size of one incoming message in bytes.
    pub max_message_size: usize,

    /// Maximum size of one incoming frame in bytes.
    pub max_frame_size: usize,

    /// Capacity of the per-connection outbound queue.
    pub outbound_queue: usize,

    /// Interval between heartbeat pings in seconds (0 disables pings).
    pub ping_interval_secs: u64,

    /// Accept the legacy `42[...]` packet dialect.
    /// Always forced on by the gateway builder.
    pub legacy_protocol: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            path: "/socket".to_string(),
            max_message_size: 1024 * 1024,
            max_frame_size: 256 * 1024,
            outbound_queue: 256,
            ping_interval_secs: 25,
            legacy_protocol: true,
        }
    }
}

/// What to do with a rendered failure when the caller supplied no reply handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MissingReplyPolicy {
    /// Discard silently.
    Drop,
    /// Emit a `warn` level log event, then discard.
    #[default]
    Log,
}

/// Event dispatch configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Policy applied to failures that have no reply channel.
    pub missing_reply: MissingReplyPolicy,

    /// Capacity of the per-connection inbound event queue.
    pub queue_capacity: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            missing_reply: MissingReplyPolicy::Log,
            queue_capacity: 1024,
        }
    }
}

/// Codec applied to state keys and values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CodecKind {
    /// URL-safe base64 without padding.
    #[default]
    Base64,
    /// Identity transform.
    Plain,
}

/// Per-connection state configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct StateConfig {
    pub codec: CodecKind,
}

/// Forwarding rules.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ForwardConfig {
    pub rules: Vec<ForwardRuleConfig>,
}

/// One forwarding rule.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ForwardRuleConfig {
    /// Path prefix to match (e.g., "/api").
    pub prefix: String,

    /// Upstream base URL (e.g., "http://127.0.0.1:3000/v1").
    pub upstream: String,
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Time allowed for the upstream to produce response headers, in seconds.
    pub upstream_secs: u64,

    /// Timeout for ordinary application routes, in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            upstream_secs: 30,
            request_secs: 30,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
