//! Byte-counting response body and the log-emission guard.
//!
//! [`CountingBody`] wraps the response body handed back by the inner service
//! and forwards every frame unmodified, adding the length of each data frame
//! to a per-request counter. The embedded [`LogGuard`] fires the log line
//! once the body reaches end-of-stream; its `Drop` impl fires it if the body
//! is discarded early (client disconnect, cancelled request future), so one
//! line is emitted on every exit path.

use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;

use axum::body::Body;
use bytes::Bytes;
use http_body::{Body as HttpBody, Frame, SizeHint};
use tracing::debug;

use crate::AccessLogConfig;
use crate::format::RequestInfo;

/// Emits the access-log line exactly once, at body completion or on drop.
pub(crate) struct LogGuard {
    config: AccessLogConfig,
    info: RequestInfo,
    start: Instant,
    bytes: u64,
    emitted: bool,
}

impl LogGuard {
    pub(crate) fn new(config: AccessLogConfig, info: RequestInfo, start: Instant) -> Self {
        Self {
            config,
            info,
            start,
            bytes: 0,
            emitted: false,
        }
    }

    /// Renders and writes the line. Idempotent: the second and later calls
    /// (including the one from `Drop`) are no-ops.
    fn finish(&mut self) {
        if self.emitted {
            return;
        }
        self.emitted = true;

        let elapsed = self.start.elapsed();
        debug!(
            method = %self.info.method,
            path = %self.info.path,
            bytes_sent = self.bytes,
            elapsed_ms = elapsed.as_secs_f64() * 1000.0,
            "request completed"
        );

        let mut sink = (self.config.make_sink)();
        (self.config.formatter)(&mut *sink, &self.info, self.bytes, elapsed);
    }
}

impl Drop for LogGuard {
    fn drop(&mut self) {
        self.finish();
    }
}

/// Pass-through response body that tallies the data bytes it yields.
///
/// Created by the middleware; not constructible directly. Frames, errors,
/// and size hints are forwarded unchanged from the wrapped body. Only data
/// frames are counted, never trailers.
pub struct CountingBody {
    inner: Body,
    guard: LogGuard,
}

impl CountingBody {
    pub(crate) fn new(inner: Body, guard: LogGuard) -> Self {
        Self { inner, guard }
    }

    /// Data bytes yielded so far. Zero before the first data frame.
    pub fn bytes_sent(&self) -> u64 {
        self.guard.bytes
    }
}

impl HttpBody for CountingBody {
    type Data = Bytes;
    type Error = axum::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        // axum's Body is Unpin, so no projection gymnastics are needed.
        let this = self.get_mut();

        match Pin::new(&mut this.inner).poll_frame(cx) {
            Poll::Ready(Some(Ok(frame))) => {
                if let Some(data) = frame.data_ref() {
                    this.guard.bytes += data.len() as u64;
                }
                Poll::Ready(Some(Ok(frame)))
            }
            // Inner-body errors pass through untouched; the guard's Drop
            // still emits the line with whatever was counted so far.
            Poll::Ready(Some(Err(error))) => Poll::Ready(Some(Err(error))),
            Poll::Ready(None) => {
                this.guard.finish();
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{Formatter, MakeSink};
    use std::io;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use axum::http::Method;
    use futures::stream;
    use http_body_util::BodyExt;

    /// One record per formatter invocation, for asserting call count + args.
    type Records = Arc<Mutex<Vec<(String, String, u64, Duration)>>>;

    fn capture_formatter(records: Records) -> Formatter {
        Arc::new(move |_sink, info, bytes_sent, elapsed| {
            records.lock().unwrap().push((
                info.method.to_string(),
                info.path.clone(),
                bytes_sent,
                elapsed,
            ));
        })
    }

    fn null_sink() -> MakeSink {
        Arc::new(|| Box::new(io::sink()))
    }

    fn test_guard(records: Records, path: &str) -> LogGuard {
        let config = AccessLogConfig {
            make_sink: null_sink(),
            formatter: capture_formatter(records),
        };
        let info = RequestInfo {
            method: Method::GET,
            path: path.to_owned(),
        };
        LogGuard::new(config, info, Instant::now())
    }

    #[tokio::test]
    async fn counts_full_body_and_emits_once() {
        let records: Records = Arc::new(Mutex::new(Vec::new()));
        let guard = test_guard(records.clone(), "/full");

        let body = CountingBody::new(Body::from("hello world"), guard);
        let collected = body.collect().await.unwrap().to_bytes();
        assert_eq!(collected, "hello world");

        let records = records.lock().unwrap();
        assert_eq!(records.len(), 1);
        let (method, path, bytes_sent, elapsed) = &records[0];
        assert_eq!(method, "GET");
        assert_eq!(path, "/full");
        assert_eq!(*bytes_sent, 11);
        assert!(*elapsed >= Duration::ZERO);
    }

    #[tokio::test]
    async fn zero_before_any_poll() {
        let records: Records = Arc::new(Mutex::new(Vec::new()));
        let guard = test_guard(records.clone(), "/idle");

        let body = CountingBody::new(Body::from("payload"), guard);
        assert_eq!(body.bytes_sent(), 0);

        drop(body);
        assert_eq!(records.lock().unwrap()[0].2, 0);
    }

    #[tokio::test]
    async fn empty_body_emits_zero() {
        let records: Records = Arc::new(Mutex::new(Vec::new()));
        let guard = test_guard(records.clone(), "/empty");

        let body = CountingBody::new(Body::empty(), guard);
        body.collect().await.unwrap();

        let records = records.lock().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].2, 0);
    }

    #[tokio::test]
    async fn drop_mid_stream_emits_partial_count() {
        let records: Records = Arc::new(Mutex::new(Vec::new()));
        let guard = test_guard(records.clone(), "/partial");

        let chunks = stream::iter(vec![
            Ok::<_, std::convert::Infallible>(Bytes::from("chunk1")),
            Ok(Bytes::from("chunk2")),
        ]);
        let mut body = CountingBody::new(Body::from_stream(chunks), guard);

        let frame = body.frame().await.unwrap().unwrap();
        assert_eq!(frame.into_data().unwrap(), "chunk1");
        assert_eq!(body.bytes_sent(), 6);

        // Client went away: the guard still fires, with the partial tally.
        drop(body);

        let records = records.lock().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].2, 6);
    }

    #[tokio::test]
    async fn streamed_chunks_accumulate() {
        let records: Records = Arc::new(Mutex::new(Vec::new()));
        let guard = test_guard(records.clone(), "/stream");

        let chunks = stream::iter(vec![
            Ok::<_, std::convert::Infallible>(Bytes::from("aa")),
            Ok(Bytes::from("bbb")),
            Ok(Bytes::from("cccc")),
        ]);
        let body = CountingBody::new(Body::from_stream(chunks), guard);
        let collected = body.collect().await.unwrap().to_bytes();

        assert_eq!(collected, "aabbbcccc");
        let records = records.lock().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].2, 9);
    }
}
