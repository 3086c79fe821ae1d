//! Atomic counters for hot-path metrics
//!
//! Lock-free counters that can be safely updated from any task. Readers
//! never block writers; a snapshot is a series of independent loads.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics instance
pub static METRICS: Metrics = Metrics::new();

/// Monotonic unsigned accumulator
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub const fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    #[inline]
    pub fn add(&self, count: u64) {
        self.0.fetch_add(count, Ordering::Relaxed);
    }

    #[inline]
    pub fn increment(&self) {
        self.add(1);
    }

    #[inline]
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Live traffic counters owned by one relay
#[derive(Debug, Default)]
pub struct RelayStats {
    /// Bytes copied from clients to the target
    pub uploaded: Counter,
    /// Bytes copied from the target back to clients
    pub downloaded: Counter,
    /// Accepted connections (TCP) or received datagrams (UDP)
    pub connections: Counter,
}

impl RelayStats {
    pub const fn new() -> Self {
        Self {
            uploaded: Counter::new(),
            downloaded: Counter::new(),
            connections: Counter::new(),
        }
    }

    #[inline]
    pub fn record_upload(&self, bytes: u64) {
        self.uploaded.add(bytes);
        METRICS.bytes_up(bytes);
    }

    #[inline]
    pub fn record_download(&self, bytes: u64) {
        self.downloaded.add(bytes);
        METRICS.bytes_down(bytes);
    }

    /// Materialize a record for the given mapping
    pub fn record(&self, from: &str, to: &str) -> StatsRecord {
        StatsRecord {
            from: from.to_string(),
            to: to.to_string(),
            upload: self.uploaded.get(),
            download: self.downloaded.get(),
            connections: self.connections.get(),
        }
    }
}

/// Per-mapping statistics as served by `/stats`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatsRecord {
    pub from: String,
    pub to: String,
    pub upload: u64,
    pub download: u64,
    pub connections: u64,
}

/// Process-wide relay metrics
pub struct Metrics {
    // Flow metrics
    pub flows_total: AtomicU64,
    pub flows_active: AtomicU64,
    pub flows_failed: AtomicU64,
    pub accept_errors: AtomicU64,

    // Traffic metrics
    pub bytes_uploaded: AtomicU64,
    pub bytes_downloaded: AtomicU64,

    // UDP relay metrics
    pub datagrams_received: AtomicU64,
    pub recv_errors: AtomicU64,
    pub exchanges_failed: AtomicU64,
    pub reply_timeouts: AtomicU64,
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            flows_total: AtomicU64::new(0),
            flows_active: AtomicU64::new(0),
            flows_failed: AtomicU64::new(0),
            accept_errors: AtomicU64::new(0),
            bytes_uploaded: AtomicU64::new(0),
            bytes_downloaded: AtomicU64::new(0),
            datagrams_received: AtomicU64::new(0),
            recv_errors: AtomicU64::new(0),
            exchanges_failed: AtomicU64::new(0),
            reply_timeouts: AtomicU64::new(0),
        }
    }

    // Flow tracking
    #[inline]
    pub fn flow_opened(&self) {
        self.flows_total.fetch_add(1, Ordering::Relaxed);
        self.flows_active.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn flow_closed(&self) {
        self.flows_active.fetch_sub(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn flow_failed(&self) {
        self.flows_failed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn accept_error(&self) {
        self.accept_errors.fetch_add(1, Ordering::Relaxed);
    }

    // Traffic tracking
    #[inline]
    pub fn bytes_up(&self, count: u64) {
        self.bytes_uploaded.fetch_add(count, Ordering::Relaxed);
    }

    #[inline]
    pub fn bytes_down(&self, count: u64) {
        self.bytes_downloaded.fetch_add(count, Ordering::Relaxed);
    }

    // Datagram tracking
    #[inline]
    pub fn datagram_rx(&self) {
        self.datagrams_received.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn recv_error(&self) {
        self.recv_errors.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn exchange_failed(&self) {
        self.exchanges_failed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn reply_timeout(&self) {
        self.reply_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            flows_total: self.flows_total.load(Ordering::Relaxed),
            flows_active: self.flows_active.load(Ordering::Relaxed),
            flows_failed: self.flows_failed.load(Ordering::Relaxed),
            accept_errors: self.accept_errors.load(Ordering::Relaxed),
            bytes_uploaded: self.bytes_uploaded.load(Ordering::Relaxed),
            bytes_downloaded: self.bytes_downloaded.load(Ordering::Relaxed),
            datagrams_received: self.datagrams_received.load(Ordering::Relaxed),
            recv_errors: self.recv_errors.load(Ordering::Relaxed),
            exchanges_failed: self.exchanges_failed.load(Ordering::Relaxed),
            reply_timeouts: self.reply_timeouts.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of metrics for reporting
#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    pub flows_total: u64,
    pub flows_active: u64,
    pub flows_failed: u64,
    pub accept_errors: u64,
    pub bytes_uploaded: u64,
    pub bytes_downloaded: u64,
    pub datagrams_received: u64,
    pub recv_errors: u64,
    pub exchanges_failed: u64,
    pub reply_timeouts: u64,
}
