//! Log-line rendering: the formatter contract, the default formatter, and
//! the sink factory.
//!
//! A formatter is a plain function of `(sink, request info, bytes sent,
//! elapsed time)`. It is invoked exactly once per request, after the response
//! body has finished (or been dropped). Supplying your own formatter replaces
//! the rendered line wholesale:
//!
//! ```rust
//! # use std::io::Write;
//! use std::sync::Arc;
//! use httplog::{AccessLogLayer, Formatter};
//!
//! let formatter: Formatter = Arc::new(|sink, info, bytes_sent, elapsed| {
//!     let _ = writeln!(
//!         sink,
//!         "{} {} -> {bytes_sent} bytes in {:?}",
//!         info.method, info.path, elapsed
//!     );
//! });
//! let layer = AccessLogLayer::with_formatter(formatter);
//! ```

use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;

use axum::http::Method;
use tracing::debug;

/// The request fields a formatter receives: everything the middleware reads
/// from the request before delegating to the inner service.
#[derive(Debug, Clone)]
pub struct RequestInfo {
    /// HTTP method (GET, POST, ...).
    pub method: Method,
    /// Request path, without query string.
    pub path: String,
}

/// Renders one completed request as text on the given sink.
///
/// Arguments: sink, request info, total response-body bytes, elapsed
/// wall-clock time. Write failures are the formatter's to handle (the
/// default formatter ignores them; log output is best-effort).
pub type Formatter =
    Arc<dyn Fn(&mut dyn Write, &RequestInfo, u64, Duration) + Send + Sync>;

/// A boxed, single-use log writer handed to the formatter.
pub type BoxSink = Box<dyn Write + Send>;

/// Factory producing a fresh writer per emitted line, in the shape of
/// `tracing_subscriber`'s `MakeWriter`. Cloned into every in-flight request.
pub type MakeSink = Arc<dyn Fn() -> BoxSink + Send + Sync>;

/// The default sink factory: one locked `write_all` to standard error per
/// line, so concurrent requests cannot interleave within a line.
pub fn stderr_sink() -> MakeSink {
    Arc::new(|| Box::new(io::stderr()))
}

/// The default formatter: `[12.34ms 1.0 KB] GET /foo` plus a newline.
///
/// The whole line is rendered into one buffer and written with a single
/// `write_all`, relying on the sink's own write atomicity.
pub fn default_formatter() -> Formatter {
    Arc::new(|sink, info, bytes_sent, elapsed| {
        let line = format!(
            "[{:.2}ms {}] {} {}\n",
            elapsed.as_secs_f64() * 1000.0,
            human_bytes(bytes_sent),
            info.method,
            info.path,
        );
        if let Err(error) = sink.write_all(line.as_bytes()) {
            debug!(%error, "access-log sink write failed, line dropped");
        }
    })
}

/// Formats a byte count as a unit-scaled string: `512 B`, `1.0 KB`, `3.4 MB`.
///
/// Base-1024 with one decimal once scaled. Counts below 1 KB are printed as
/// plain integers.
pub fn human_bytes(bytes: u64) -> String {
    const UNITS: [&str; 6] = ["KB", "MB", "GB", "TB", "PB", "EB"];

    if bytes < 1024 {
        return format!("{bytes} B");
    }

    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit + 1 < UNITS.len() {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}
