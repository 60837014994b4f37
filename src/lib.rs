//! # httplog
//!
//! A tower middleware for axum that emits one access-log line per request:
//! elapsed wall-clock time, response-body bytes sent, method, and path.
//!
//! ```text
//! [12.34ms 1.0 KB] GET /foo
//! ```
//!
//! ## Features
//!
//! - **Exact byte counts**: the response body is wrapped, not buffered; each
//!   data frame is counted as it streams to the client
//! - **Guaranteed emission**: the line fires when the body completes *or* is
//!   dropped mid-stream, so cancelled and disconnected requests still log
//! - **Pluggable rendering**: swap the output sink, the formatter, or both
//! - **No global state**: all configuration is passed at construction
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use axum::{routing::get, Router};
//! use httplog::AccessLogLayer;
//!
//! async fn hello() -> &'static str {
//!     "Hello, World!"
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let app = Router::new()
//!         .route("/hello", get(hello))
//!         .layer(AccessLogLayer::new());
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await.unwrap();
//!     axum::serve(listener, app).await.unwrap();
//! }
//! ```
//!
//! ## Custom sink and formatter
//!
//! Log lines go to standard error by default. Both the destination and the
//! rendering are injectable:
//!
//! ```rust
//! # use std::io::Write;
//! use std::sync::Arc;
//! use httplog::{AccessLogLayer, Formatter, MakeSink};
//!
//! let sink: MakeSink = Arc::new(|| Box::new(std::io::stdout()));
//! let formatter: Formatter = Arc::new(|sink, info, bytes_sent, elapsed| {
//!     let _ = writeln!(sink, "{} {} {bytes_sent}B {elapsed:?}", info.method, info.path);
//! });
//!
//! let layer = AccessLogLayer::with_sink_and_formatter(sink, formatter);
//! ```

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;

use axum::{body::Body, extract::Request, response::Response};
use tower::{Layer, Service};
use tracing::debug;

pub mod counter;
pub mod format;

pub use counter::CountingBody;
pub use format::{
    BoxSink, Formatter, MakeSink, RequestInfo, default_formatter, human_bytes, stderr_sink,
};

use counter::LogGuard;

/// Where log lines go and how they are rendered.
///
/// Defaults to standard error and the `[<ms>ms <bytes>] <METHOD> <PATH>`
/// formatter. A config value is cloned into each in-flight request; it is
/// never stored or mutated globally.
///
/// # Examples
///
/// ```rust
/// use httplog::{AccessLogConfig, default_formatter, stderr_sink};
///
/// // Default configuration
/// let config = AccessLogConfig::default();
///
/// // Explicit configuration
/// let config = AccessLogConfig {
///     make_sink: stderr_sink(),
///     formatter: default_formatter(),
/// };
/// ```
#[derive(Clone)]
pub struct AccessLogConfig {
    /// Produces a fresh writer for each emitted line.
    pub make_sink: MakeSink,
    /// Renders one completed request as text.
    pub formatter: Formatter,
}

impl Default for AccessLogConfig {
    fn default() -> Self {
        Self {
            make_sink: stderr_sink(),
            formatter: default_formatter(),
        }
    }
}

impl fmt::Debug for AccessLogConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessLogConfig").finish_non_exhaustive()
    }
}

/// Tower layer for the access-log middleware.
///
/// This is the main entry point. Apply it to a router (or any tower stack)
/// and every request passing through produces exactly one log line.
///
/// # Examples
///
/// ```rust,no_run
/// use axum::{routing::get, Router};
/// use httplog::AccessLogLayer;
///
/// # async fn hello() -> &'static str { "Hello" }
/// let app: Router = Router::new()
///     .route("/hello", get(hello))
///     .layer(AccessLogLayer::new());
/// ```
#[derive(Clone, Debug, Default)]
pub struct AccessLogLayer {
    config: AccessLogConfig,
}

impl AccessLogLayer {
    /// Log to standard error with the default formatter.
    pub fn new() -> Self {
        Self::with_config(AccessLogConfig::default())
    }

    /// Log to a custom sink with the default formatter.
    pub fn with_sink(make_sink: MakeSink) -> Self {
        Self::with_config(AccessLogConfig {
            make_sink,
            ..AccessLogConfig::default()
        })
    }

    /// Log to standard error with a custom formatter.
    pub fn with_formatter(formatter: Formatter) -> Self {
        Self::with_config(AccessLogConfig {
            formatter,
            ..AccessLogConfig::default()
        })
    }

    /// Log to a custom sink with a custom formatter.
    pub fn with_sink_and_formatter(make_sink: MakeSink, formatter: Formatter) -> Self {
        Self::with_config(AccessLogConfig {
            make_sink,
            formatter,
        })
    }

    /// Build from an explicit [`AccessLogConfig`].
    pub fn with_config(config: AccessLogConfig) -> Self {
        Self { config }
    }
}

impl<S> Layer<S> for AccessLogLayer {
    type Service = AccessLogService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AccessLogService {
            inner,
            config: self.config.clone(),
        }
    }
}

/// Tower service implementation for the access-log middleware.
///
/// Wraps an inner service; requests pass through untouched, responses come
/// back with their body wrapped in a [`CountingBody`]. Users typically don't
/// interact with this type directly; it is created by [`AccessLogLayer`].
#[derive(Clone, Debug)]
pub struct AccessLogService<S> {
    inner: S,
    config: AccessLogConfig,
}

impl<S> Service<Request> for AccessLogService<S>
where
    S: Service<Request, Response = Response> + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let start = Instant::now();
        let info = RequestInfo {
            method: request.method().clone(),
            path: request.uri().path().to_owned(),
        };

        debug!(method = %info.method, path = %info.path, "request received");

        let guard = LogGuard::new(self.config.clone(), info, start);
        let future = self.inner.call(request);

        Box::pin(async move {
            match future.await {
                Ok(response) => {
                    // The line fires when this body finishes (or is dropped),
                    // so streamed responses are timed to their last byte.
                    Ok(response.map(|body| Body::new(CountingBody::new(body, guard))))
                }
                // Inner-service errors pass through untouched. The guard is
                // dropped right here, which still emits a line (zero bytes).
                Err(error) => Err(error),
            }
        })
    }
}
