//! UDP relay: one request/response exchange per inbound datagram
//!
//! Each datagram gets its own outbound socket connected to the target, so
//! replies can only come from the target and go to the original sender.
//! There is no session table.

use anyhow::{anyhow, Context};
use bytes::Bytes;
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::net::{lookup_host, UdpSocket};
use tokio::sync::watch;
use tracing::{debug, warn};

use super::stop_requested;
use crate::error::RelayError;
use crate::metrics::{RelayStats, METRICS};
use crate::util::{create_udp_socket, unspecified_for};

/// Largest payload of a UDP datagram over IPv4
pub const MAX_DATAGRAM_SIZE: usize = 65_507;

pub(super) fn bind(addr: SocketAddr) -> io::Result<UdpSocket> {
    UdpSocket::from_std(create_udp_socket(addr)?)
}

pub(super) async fn receive_loop(
    socket: Arc<UdpSocket>,
    target: String,
    stats: Arc<RelayStats>,
    reply_timeout: Option<Duration>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];

    loop {
        tokio::select! {
            _ = stop_requested(&mut shutdown_rx) => break,
            received = socket.recv_from(&mut buf) => {
                match received {
                    Ok((n, sender)) => {
                        stats.connections.increment();
                        METRICS.datagram_rx();

                        let exchange = Exchange {
                            socket: Arc::downgrade(&socket),
                            sender,
                            target: target.clone(),
                            stats: stats.clone(),
                            reply_timeout,
                        };
                        tokio::spawn(exchange.run(Bytes::copy_from_slice(&buf[..n])));
                    }
                    Err(e) => {
                        METRICS.recv_error();
                        warn!(to = %target, error = %e, "Failed to receive datagram");
                    }
                }
            }
        }
    }

    debug!(to = %target, "Receive loop exited");
}

/// A single datagram's round trip to the target
struct Exchange {
    /// The relay's bound socket, used to answer the sender. Held weakly so a
    /// stopped relay releases its port while exchanges are still waiting.
    socket: Weak<UdpSocket>,
    sender: SocketAddr,
    target: String,
    stats: Arc<RelayStats>,
    reply_timeout: Option<Duration>,
}

impl Exchange {
    async fn run(self, payload: Bytes) {
        if let Err(e) = self.forward(&payload).await {
            METRICS.exchange_failed();
            warn!(
                sender = %self.sender,
                to = %self.target,
                error = %e,
                "UDP exchange aborted"
            );
        }
    }

    async fn forward(&self, payload: &[u8]) -> anyhow::Result<()> {
        let target_addr = lookup_host(self.target.as_str())
            .await
            .with_context(|| format!("Failed to resolve {}", self.target))?
            .next()
            .ok_or_else(|| anyhow!("Failed to resolve {}", self.target))?;

        let outbound = UdpSocket::bind(unspecified_for(target_addr))
            .await
            .context("Failed to bind outbound UDP socket")?;
        outbound
            .connect(target_addr)
            .await
            .map_err(|source| RelayError::Dial {
                addr: self.target.clone(),
                source,
            })?;

        let sent = outbound
            .send(payload)
            .await
            .context("Failed to send datagram to target")?;
        self.stats.record_upload(sent as u64);

        let mut reply = vec![0u8; MAX_DATAGRAM_SIZE];
        let received = match self.reply_timeout {
            Some(limit) => match tokio::time::timeout(limit, outbound.recv(&mut reply)).await {
                Ok(received) => received,
                Err(_) => {
                    METRICS.reply_timeout();
                    debug!(
                        sender = %self.sender,
                        to = %self.target,
                        timeout_ms = limit.as_millis() as u64,
                        "No reply from target"
                    );
                    return Ok(());
                }
            },
            None => outbound.recv(&mut reply).await,
        };
        let n = received.context("Failed to read reply from target")?;

        let Some(socket) = self.socket.upgrade() else {
            debug!(sender = %self.sender, to = %self.target, reply = n, "Relay stopped, reply dropped");
            return Ok(());
        };
        socket
            .send_to(&reply[..n], self.sender)
            .await
            .context("Failed to send reply to client")?;
        self.stats.record_download(n as u64);

        debug!(sender = %self.sender, to = %self.target, request = sent, reply = n, "UDP exchange done");
        Ok(())
    }
}
