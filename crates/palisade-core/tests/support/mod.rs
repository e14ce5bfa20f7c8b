//! Shared helper for the end-to-end tests: a canned HTTP backend with no
//! dependency beyond `tokio`'s own TCP primitives, since the dependency
//! stack carries no HTTP mocking crate.
//!
//! Each accepted connection is handled independently so a backend can serve
//! several requests across the lifetime of a test.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        404 => "Not Found",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Status",
    }
}

/// Spawns a backend bound to an ephemeral loopback port that answers every
/// request with the same `status`/`body`. Returns the backend's base URL and
/// a shared counter of requests it has served.
pub async fn spawn_canned_backend(status: u16, body: &'static str) -> (String, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");
    let calls = Arc::new(AtomicUsize::new(0));
    let calls_for_task = Arc::clone(&calls);

    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            let calls = Arc::clone(&calls_for_task);
            tokio::spawn(async move {
                serve_one(stream, status, body, calls).await;
            });
        }
    });

    (format!("http://{addr}"), calls)
}

async fn serve_one(mut stream: tokio::net::TcpStream, status: u16, body: &str, calls: Arc<AtomicUsize>) {
    let mut buf = [0u8; 4096];
    let mut received = Vec::new();
    loop {
        match stream.read(&mut buf).await {
            Ok(0) => return,
            Ok(n) => {
                received.extend_from_slice(&buf[..n]);
                if received.windows(4).any(|w| w == b"\r\n\r\n") {
                    break;
                }
            }
            Err(_) => return,
        }
    }

    calls.fetch_add(1, Ordering::SeqCst);
    let response = format!(
        "HTTP/1.1 {status} {reason}\r\nContent-Type: application/json\r\nContent-Length: {len}\r\nConnection: close\r\n\r\n{body}",
        status = status,
        reason = reason_phrase(status),
        len = body.len(),
        body = body,
    );
    let _ = stream.write_all(response.as_bytes()).await;
    let _ = stream.shutdown().await;
}

/// A backend that never listens: `connect` fails immediately rather than
/// timing out, the fastest way to force `UpstreamUnreachable`.
pub fn unreachable_backend_url() -> String {
    "http://127.0.0.1:1".to_string()
}
