//! HTTP API for relay statistics
//!
//! Provides JSON endpoints for viewing per-mapping traffic counters.

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use crate::server::Server;

/// Start the statistics API server
///
/// This runs a simple HTTP server that responds to:
/// - GET /stats - Per-mapping upload/download/connection counters
///
/// Returns the bound address.
pub async fn start_api_server(addr: SocketAddr, server: Arc<Server>) -> Result<SocketAddr> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind statistics API on {}", addr))?;
    let local_addr = listener.local_addr()?;

    tokio::spawn(run_api_server(listener, server));
    info!(%local_addr, "Statistics API server started");

    Ok(local_addr)
}

async fn run_api_server(listener: TcpListener, server: Arc<Server>) {
    loop {
        match listener.accept().await {
            Ok((stream, _)) => {
                let server = server.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_request(stream, &server).await {
                        debug!(error = %e, "Request handling error");
                    }
                });
            }
            Err(e) => {
                warn!(error = %e, "Failed to accept connection");
            }
        }
    }
}

async fn handle_request(mut stream: TcpStream, server: &Server) -> std::io::Result<()> {
    let mut buffer = [0u8; 1024];
    let n = stream.read(&mut buffer).await?;

    if n == 0 {
        return Ok(());
    }

    let request = String::from_utf8_lossy(&buffer[..n]);
    let first_line = request.lines().next().unwrap_or("");

    // Parse request path
    let path = first_line
        .split_whitespace()
        .nth(1)
        .unwrap_or("/");

    let (status, body) = route(path, server);

    let response = format!(
        "HTTP/1.1 {}\r\n\
         Content-Type: application/json\r\n\
         Content-Length: {}\r\n\
         Access-Control-Allow-Origin: *\r\n\
         Connection: close\r\n\
         \r\n\
         {}",
        status,
        body.len(),
        body
    );

    stream.write_all(response.as_bytes()).await?;
    stream.flush().await?;

    Ok(())
}

fn route(path: &str, server: &Server) -> (&'static str, String) {
    match path {
        "/stats" => {
            let stats = server.get_stats();
            ("200 OK", serde_json::to_string(&stats).unwrap_or_else(|_| "[]".to_string()))
        }
        "/" => {
            let help = r#"{
  "endpoints": {
    "/stats": "Per-mapping traffic statistics"
  }
}"#;
            ("200 OK", help.to_string())
        }
        _ => ("404 Not Found", r#"{"error": "Not found"}"#.to_string()),
    }
}
