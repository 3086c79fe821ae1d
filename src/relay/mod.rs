//! Relay implementations
//!
//! A relay owns one listening socket for one `from -> to` mapping and runs
//! its accept (TCP) or receive (UDP) loop as a background task. Every
//! accepted connection or received datagram is forwarded on its own task;
//! there is no cap on how many run at once.

mod tcp;
mod udp;

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::{Mapping, Protocol};
use crate::error::{RelayError, Result};
use crate::metrics::{RelayStats, StatsRecord};
use crate::util::parse_listen_addr;

pub use udp::MAX_DATAGRAM_SIZE;

/// Relay lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayPhase {
    /// Constructed, nothing bound yet
    Created,
    /// Socket bound and background loop running
    Running,
    /// Loop exited and socket released; terminal
    Stopped,
}

impl fmt::Display for RelayPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A running port forward
pub struct Relay {
    mapping: Mapping,
    stats: Arc<RelayStats>,
    phase: RelayPhase,
    local_addr: Option<SocketAddr>,
    udp_reply_timeout: Option<Duration>,
    shutdown_tx: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl Relay {
    /// Create a relay in the `Created` phase
    pub fn new(mapping: Mapping) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            mapping,
            stats: Arc::new(RelayStats::new()),
            phase: RelayPhase::Created,
            local_addr: None,
            udp_reply_timeout: None,
            shutdown_tx,
            task: None,
        }
    }

    /// Bound the wait for a UDP reply (`None` waits forever)
    pub fn with_udp_reply_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.udp_reply_timeout = timeout;
        self
    }

    /// Bind the listen address and spawn the background loop.
    ///
    /// The listen address must be an IP literal (`ip:port` or `:port`).
    /// Returns as soon as the socket is bound. Must be called from within a
    /// tokio runtime.
    pub fn start(&mut self) -> Result<()> {
        if self.phase != RelayPhase::Created {
            return Err(RelayError::AlreadyStarted(self.mapping.from.clone()));
        }

        let listen = self.mapping.listen_addr();
        let addr = parse_listen_addr(&listen).map_err(|source| RelayError::Resolve {
            addr: listen.clone(),
            source,
        })?;
        let bind_error = |source: std::io::Error| RelayError::Bind {
            addr: listen.clone(),
            source,
        };

        let shutdown_rx = self.shutdown_tx.subscribe();
        let target = self.mapping.to.clone();
        let stats = self.stats.clone();

        let (local_addr, task) = match self.mapping.protocol {
            Protocol::Tcp => {
                let listener = tcp::bind(addr).map_err(bind_error)?;
                let local_addr = listener.local_addr().map_err(bind_error)?;
                let task = tokio::spawn(tcp::accept_loop(listener, target, stats, shutdown_rx));
                (local_addr, task)
            }
            Protocol::Udp => {
                let socket = udp::bind(addr).map_err(bind_error)?;
                let local_addr = socket.local_addr().map_err(bind_error)?;
                let task = tokio::spawn(udp::receive_loop(
                    Arc::new(socket),
                    target,
                    stats,
                    self.udp_reply_timeout,
                    shutdown_rx,
                ));
                (local_addr, task)
            }
        };

        self.local_addr = Some(local_addr);
        self.task = Some(task);
        self.phase = RelayPhase::Running;

        info!(
            from = %self.mapping.from,
            to = %self.mapping.to,
            protocol = %self.mapping.protocol,
            %local_addr,
            "Relay started"
        );
        Ok(())
    }

    /// Stop accepting and release the listening socket.
    ///
    /// In-flight flows and exchanges are left to finish on their own.
    /// Calling this again is a no-op.
    pub async fn stop(&mut self) {
        if self.phase == RelayPhase::Stopped {
            return;
        }

        self.shutdown_tx.send_replace(true);
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(from = %self.mapping.from, error = %e, "Relay loop ended abnormally");
            }
        }

        self.phase = RelayPhase::Stopped;
        info!(from = %self.mapping.from, to = %self.mapping.to, "Relay stopped");
    }

    pub fn mapping(&self) -> &Mapping {
        &self.mapping
    }

    pub fn phase(&self) -> RelayPhase {
        self.phase
    }

    /// Actual bound address once running
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn stats(&self) -> &Arc<RelayStats> {
        &self.stats
    }

    /// Current counters for this mapping
    pub fn record(&self) -> StatsRecord {
        self.stats.record(&self.mapping.from, &self.mapping.to)
    }
}

impl Drop for Relay {
    fn drop(&mut self) {
        self.shutdown_tx.send_replace(true);
    }
}

impl fmt::Debug for Relay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Relay")
            .field("mapping", &self.mapping)
            .field("phase", &self.phase)
            .field("local_addr", &self.local_addr)
            .finish()
    }
}

/// Wait until the relay's shutdown flag flips (or its owner is gone)
async fn stop_requested(shutdown_rx: &mut watch::Receiver<bool>) {
    loop {
        if shutdown_rx.changed().await.is_err() {
            return;
        }
        let stop = *shutdown_rx.borrow_and_update();
        if stop {
            return;
        }
    }
}
