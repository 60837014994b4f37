use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    body::Body,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use bytes::Bytes;
use httplog::{AccessLogLayer, Formatter};
use tokio::{net::TcpListener, time::sleep};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{Level, info};

// Test handlers for our demo server
async fn hello_handler() -> impl IntoResponse {
    sleep(Duration::from_millis(100)).await; // Simulate some work
    "Hello, World!"
}

async fn echo_handler(body: Bytes) -> impl IntoResponse {
    format!("Echo: {}", String::from_utf8_lossy(&body))
}

async fn streaming_handler() -> impl IntoResponse {
    use futures::stream;
    use tokio::time::interval;

    let stream = stream::unfold(0u32, |count| async move {
        if count >= 5 {
            None
        } else {
            let mut interval = interval(Duration::from_millis(200));
            interval.tick().await;
            Some((
                Ok::<_, std::convert::Infallible>(Bytes::from(format!("chunk-{count}\n"))),
                count + 1,
            ))
        }
    });

    Response::builder()
        .header("content-type", "text/plain")
        .body(Body::from_stream(stream))
        .unwrap()
}

async fn large_handler() -> impl IntoResponse {
    "x".repeat(4096) // 4 KB, shows up as "4.0 KB" in the log
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(Level::DEBUG)
        .init();

    info!("Starting access-log demo server");

    // Default: `[12.34ms 1.0 KB] GET /foo` to stderr. The custom formatter
    // below writes an apache-ish line instead; swap it in via
    // `AccessLogLayer::with_formatter(custom)` to compare.
    let _custom: Formatter = Arc::new(|sink, info, bytes_sent, elapsed| {
        use std::io::Write;
        let _ = writeln!(
            sink,
            "{} {} sent={bytes_sent}B took={:?}",
            info.method, info.path, elapsed
        );
    });

    let app = Router::new()
        .route("/hello", get(hello_handler))
        .route("/echo", post(echo_handler))
        .route("/streaming", get(streaming_handler))
        .route("/large", get(large_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(AccessLogLayer::new())
                .into_inner(),
        );

    info!("Demo server endpoints:");
    info!("  GET  /hello      - Simple greeting (100ms of simulated work)");
    info!("  POST /echo       - Echo request body");
    info!("  GET  /streaming  - Streaming response (timed to the last chunk)");
    info!("  GET  /large      - 4 KB response");
    info!("");
    info!("Try these commands and watch stderr for the access log:");
    info!("  curl http://localhost:3000/hello");
    info!("  curl -X POST -d 'Hello from client' http://localhost:3000/echo");
    info!("  curl http://localhost:3000/streaming");
    info!("  curl http://localhost:3000/large");

    let listener = TcpListener::bind("0.0.0.0:3000").await?;
    info!("Demo server listening on http://localhost:3000");

    axum::serve(listener, app).await?;

    Ok(())
}
