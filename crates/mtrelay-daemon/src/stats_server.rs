//! A minimal, loopback-only `GET /stats` responder. No HTTP framework: the
//! surface is one route, one method, one content type — the same
//! "implement exactly the wire format in play" approach `mtrelay-ingress`
//! takes for the MTProto transport detection, just aimed at HTTP/1.0
//! instead.

use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use crate::runtime::Runtime;

/// Bind `127.0.0.1:<port>` and serve `GET /stats` until `shutdown` fires.
/// Any other path or method gets a 404; nothing here is reachable from
/// outside loopback, matching the "Only loopback" requirement.
pub async fn serve(
    port: u16,
    runtime: Arc<Runtime>,
    mut shutdown: tokio::sync::broadcast::Receiver<()>,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(("127.0.0.1", port)).await?;
    tracing::info!(port, "stats endpoint listening on loopback");

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, _addr)) => {
                        let runtime = runtime.clone();
                        tokio::spawn(async move {
                            if let Err(err) = handle(stream, &runtime).await {
                                tracing::debug!(error = %err, "stats connection ended with error");
                            }
                        });
                    }
                    Err(err) => tracing::warn!(error = %err, "stats accept failed"),
                }
            }
            _ = shutdown.recv() => {
                tracing::info!("stats endpoint shutting down");
                return Ok(());
            }
        }
    }
}

async fn handle(mut stream: tokio::net::TcpStream, runtime: &Runtime) -> anyhow::Result<()> {
    let mut buf = [0u8; 4096];
    let n = tokio::time::timeout(std::time::Duration::from_secs(5), stream.read(&mut buf)).await??;
    let request = String::from_utf8_lossy(&buf[..n]);
    let request_line = request.lines().next().unwrap_or("");
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or("");
    let path = parts.next().unwrap_or("");

    let response = if method == "GET" && path == "/stats" {
        let body = runtime.render_stats().await;
        format!(
            "HTTP/1.0 200 OK\r\nContent-Type: text/plain; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            body.len(),
            body
        )
    } else {
        let body = "not found";
        format!(
            "HTTP/1.0 404 Not Found\r\nContent-Type: text/plain; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            body.len(),
            body
        )
    };

    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await?;
    Ok(())
}
