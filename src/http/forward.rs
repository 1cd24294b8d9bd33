//! HTTP forwarding gate.
//!
//! # Responsibilities
//! - Match request paths against installed prefix rules (registration order)
//! - Rewrite the remainder of the path onto the rule's upstream base URL
//! - Stream the upstream response (status, end-to-end headers, body) back
//! - Route every failure to the rule's error handler
//!
//! # Design Decisions
//! - Rules can be installed at any time; reads are lock-free (ArcSwap)
//! - Prefixes match on segment boundaries ("/x" matches "/x/.." but not "/xy")
//! - Bodies are streamed in both directions, never buffered whole
//! - A failed forward answers 502 (504 on timeout) and affects no other request

use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderName, Request, StatusCode, Uri},
    middleware::Next,
    response::{IntoResponse, Response},
};
use futures_util::TryStreamExt;
use hyper::body::Incoming;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use url::Url;

use crate::observability::metrics;

/// Headers that describe one hop and are not forwarded in either direction.
static HOP_BY_HOP: [HeaderName; 7] = [
    header::CONNECTION,
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// A failure while forwarding one request.
#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    #[error("invalid upstream base URL {0:?}")]
    InvalidUpstream(String),
    #[error("invalid upstream target: {0}")]
    InvalidTarget(String),
    #[error("failed to build upstream request: {0}")]
    Request(#[from] axum::http::Error),
    #[error("upstream request failed: {0}")]
    Upstream(#[from] hyper_util::client::legacy::Error),
    #[error("upstream did not respond within {0:?}")]
    Timeout(Duration),
    #[error("upstream body stream failed: {0}")]
    Stream(String),
}

impl ForwardError {
    pub fn kind(&self) -> &'static str {
        match self {
            ForwardError::InvalidUpstream(_) => "invalid_upstream",
            ForwardError::InvalidTarget(_) => "invalid_target",
            ForwardError::Request(_) => "request",
            ForwardError::Upstream(_) => "upstream",
            ForwardError::Timeout(_) => "timeout",
            ForwardError::Stream(_) => "stream",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            ForwardError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::BAD_GATEWAY,
        }
    }
}

/// Callback receiving every forwarding failure of one rule.
pub type ErrorHandler = Arc<dyn Fn(&ForwardError) + Send + Sync>;

/// (prefix, upstream base, error handler).
pub struct ForwardRule {
    prefix: String,
    upstream: Url,
    on_error: ErrorHandler,
}

impl ForwardRule {
    /// Create a rule with a no-op error handler.
    pub fn new(prefix: impl Into<String>, upstream: impl AsRef<str>) -> Result<Self, ForwardError> {
        let upstream = upstream.as_ref();
        let url = Url::parse(upstream)
            .ok()
            .filter(|u| u.has_host())
            .ok_or_else(|| ForwardError::InvalidUpstream(upstream.to_string()))?;

        Ok(Self {
            prefix: prefix.into(),
            upstream: url,
            on_error: Arc::new(|_| {}),
        })
    }

    pub fn with_error_handler(mut self, on_error: impl Fn(&ForwardError) + Send + Sync + 'static) -> Self {
        self.on_error = Arc::new(on_error);
        self
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn upstream(&self) -> &Url {
        &self.upstream
    }

    /// The part of `path` after the prefix, if the prefix matches on a
    /// segment boundary.
    pub fn strip<'a>(&self, path: &'a str) -> Option<&'a str> {
        let rest = path.strip_prefix(self.prefix.as_str())?;
        if rest.is_empty() || rest.starts_with('/') || self.prefix.ends_with('/') {
            Some(rest)
        } else {
            None
        }
    }

    /// Upstream URL for a remainder path and optional query string.
    pub fn target(&self, remainder: &str, query: Option<&str>) -> Url {
        let mut url = self.upstream.clone();
        let base = url.path().trim_end_matches('/');
        let rest = remainder.trim_start_matches('/');
        let path = match (base.is_empty(), rest.is_empty()) {
            (true, true) => "/".to_string(),
            (false, true) => base.to_string(),
            _ => format!("{base}/{rest}"),
        };
        url.set_path(&path);
        if query.is_some() {
            url.set_query(query);
        }
        url
    }

    fn fail(&self, error: &ForwardError) {
        metrics::record_forward_error(error.kind());
        tracing::warn!(prefix = %self.prefix, upstream = %self.upstream, error = %error, "Forwarding failed");
        (self.on_error)(error);
    }
}

impl std::fmt::Debug for ForwardRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForwardRule")
            .field("prefix", &self.prefix)
            .field("upstream", &self.upstream.as_str())
            .finish()
    }
}

/// Interceptor that forwards matching requests and passes the rest through.
#[derive(Clone)]
pub struct ForwardingGate {
    rules: Arc<ArcSwap<Vec<Arc<ForwardRule>>>>,
    client: Client<HttpConnector, Body>,
    upstream_timeout: Duration,
}

impl ForwardingGate {
    pub fn new(upstream_timeout: Duration) -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Self {
            rules: Arc::new(ArcSwap::from_pointee(Vec::new())),
            client,
            upstream_timeout,
        }
    }

    /// Append a rule. Takes effect for the next request.
    pub fn install(&self, rule: ForwardRule) {
        tracing::info!(prefix = %rule.prefix, upstream = %rule.upstream, "Forward rule installed");
        let rule = Arc::new(rule);
        self.rules.rcu(|rules| {
            let mut next = Vec::clone(rules);
            next.push(Arc::clone(&rule));
            next
        });
    }

    pub fn rules(&self) -> Vec<Arc<ForwardRule>> {
        Vec::clone(&self.rules.load())
    }

    /// Forward `request` if a rule matches; otherwise hand it back untouched.
    pub async fn handle(&self, request: Request<Body>) -> Result<Response, Request<Body>> {
        let rules = self.rules.load_full();
        let matched = rules
            .iter()
            .find_map(|rule| rule.strip(request.uri().path()).map(|rest| (rule, rest.to_string())));

        let Some((rule, remainder)) = matched else {
            return Err(request);
        };

        let start = Instant::now();
        let response = match self.forward(rule, &remainder, request).await {
            Ok(response) => response,
            Err(error) => {
                rule.fail(&error);
                (error.status(), error.status().canonical_reason().unwrap_or("Bad Gateway"))
                    .into_response()
            }
        };
        metrics::record_forward(&rule.prefix, response.status().as_u16(), start);
        Ok(response)
    }

    async fn forward(
        &self,
        rule: &Arc<ForwardRule>,
        remainder: &str,
        request: Request<Body>,
    ) -> Result<Response, ForwardError> {
        let target = rule.target(remainder, request.uri().query());
        let uri = Uri::try_from(target.as_str())
            .map_err(|e| ForwardError::InvalidTarget(format!("{target}: {e}")))?;

        tracing::debug!(
            method = %request.method(),
            path = %request.uri().path(),
            target = %target,
            "Forwarding request"
        );

        let (parts, body) = request.into_parts();
        let mut upstream = Request::builder()
            .method(parts.method)
            .uri(uri)
            .body(body)?;

        let headers = upstream.headers_mut();
        for (name, value) in parts.headers.iter() {
            if name == header::HOST || HOP_BY_HOP.contains(name) {
                continue;
            }
            headers.append(name.clone(), value.clone());
        }

        let response: hyper::Response<Incoming> =
            tokio::time::timeout(self.upstream_timeout, self.client.request(upstream))
                .await
                .map_err(|_| ForwardError::Timeout(self.upstream_timeout))??;

        let (mut parts, incoming) = response.into_parts();
        for name in &HOP_BY_HOP {
            parts.headers.remove(name);
        }
        let stream_rule = Arc::clone(rule);
        let stream = Body::new(incoming)
            .into_data_stream()
            .inspect_err(move |e| stream_rule.fail(&ForwardError::Stream(e.to_string())));

        Ok(Response::from_parts(parts, Body::from_stream(stream)))
    }
}

/// Axum middleware running every request through the gate first.
pub async fn forward_middleware(
    State(gate): State<ForwardingGate>,
    request: Request<Body>,
    next: Next,
) -> Response {
    match gate.handle(request).await {
        Ok(response) => response,
        Err(request) => next.run(request).await,
    }
}
