//! TCP relay: accept loop and per-connection flows

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::{debug, warn};

use super::stop_requested;
use crate::error::RelayError;
use crate::metrics::{RelayStats, METRICS};
use crate::util::create_tcp_listener;

/// Copy buffer per direction
const BUFFER_SIZE: usize = 16384;

#[derive(Debug, Clone, Copy)]
enum Direction {
    /// client -> target
    Upload,
    /// target -> client
    Download,
}

pub(super) fn bind(addr: SocketAddr) -> io::Result<TcpListener> {
    TcpListener::from_std(create_tcp_listener(addr)?)
}

pub(super) async fn accept_loop(
    listener: TcpListener,
    target: String,
    stats: Arc<RelayStats>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = stop_requested(&mut shutdown_rx) => break,
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer)) => {
                        stats.connections.increment();
                        tokio::spawn(run_flow(stream, peer, target.clone(), stats.clone()));
                    }
                    Err(e) => {
                        METRICS.accept_error();
                        warn!(to = %target, error = %e, "Failed to accept connection");
                    }
                }
            }
        }
    }

    debug!(to = %target, "Accept loop exited");
}

/// Relay one accepted connection until either side is done
async fn run_flow(client: TcpStream, peer: SocketAddr, target: String, stats: Arc<RelayStats>) {
    let upstream = match TcpStream::connect(&target).await {
        Ok(stream) => stream,
        Err(source) => {
            METRICS.flow_failed();
            let err = RelayError::Dial { addr: target, source };
            warn!(%peer, error = %err, "Closing client, target unreachable");
            return;
        }
    };

    METRICS.flow_opened();
    debug!(%peer, to = %target, "Flow established");

    let _ = client.set_nodelay(true);
    let _ = upstream.set_nodelay(true);

    let (client_read, client_write) = client.into_split();
    let (upstream_read, upstream_write) = upstream.into_split();

    // Whichever direction finishes first tears down the other
    let (closing, _) = watch::channel(false);
    let closing = Arc::new(closing);

    let upload = tokio::spawn(pump(
        client_read,
        upstream_write,
        closing.clone(),
        closing.subscribe(),
        stats.clone(),
        Direction::Upload,
    ));
    let download = tokio::spawn(pump(
        upstream_read,
        client_write,
        closing.clone(),
        closing.subscribe(),
        stats,
        Direction::Download,
    ));

    let (uploaded, downloaded) = tokio::join!(upload, download);

    METRICS.flow_closed();
    debug!(
        %peer,
        to = %target,
        uploaded = uploaded.unwrap_or_default(),
        downloaded = downloaded.unwrap_or_default(),
        "Flow closed"
    );
}

/// Copy until EOF, an I/O error, or the sibling pump finishing.
///
/// Bytes count once the peer has taken them, partial writes included. The
/// total is added to the relay counters once the copy is over.
async fn pump<R, W>(
    mut reader: R,
    mut writer: W,
    closing: Arc<watch::Sender<bool>>,
    mut closed: watch::Receiver<bool>,
    stats: Arc<RelayStats>,
    direction: Direction,
) -> u64
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; BUFFER_SIZE];
    let mut total: u64 = 0;

    let result: io::Result<()> = 'copy: loop {
        let n = tokio::select! {
            read = reader.read(&mut buf) => match read {
                Ok(0) => break Ok(()),
                Ok(n) => n,
                Err(e) => break Err(e),
            },
            _ = closed.changed() => break Ok(()),
        };

        let mut pos = 0;
        while pos < n {
            tokio::select! {
                written = writer.write(&buf[pos..n]) => match written {
                    Ok(0) => break 'copy Err(io::ErrorKind::WriteZero.into()),
                    Ok(m) => {
                        pos += m;
                        total += m as u64;
                    }
                    Err(e) => break 'copy Err(e),
                },
                _ = closed.changed() => break 'copy Ok(()),
            }
        }
    };

    if let Err(e) = result {
        debug!(?direction, error = %e, "Copy failed");
    }

    let _ = writer.shutdown().await;
    closing.send_replace(true);

    match direction {
        Direction::Upload => stats.record_upload(total),
        Direction::Download => stats.record_download(total),
    }
    total
}
