//! Prometheus metrics exporter
//!
//! HTTP endpoint for Prometheus scraping.

use anyhow::Result;
use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;

use super::counters::{MetricsSnapshot, METRICS};
use crate::config::MetricsConfig;

/// Initialize the Prometheus metrics exporter
pub fn init_metrics(config: &MetricsConfig) -> Result<()> {
    // Register metric descriptions
    describe_counter!("port_relay_flows_total", "Total TCP flows accepted");
    describe_gauge!("port_relay_flows_active", "Currently open TCP flows");
    describe_counter!("port_relay_flows_failed", "TCP flows whose target dial failed");
    describe_counter!("port_relay_accept_errors", "Transient accept failures");
    describe_counter!("port_relay_bytes_uploaded", "Bytes relayed client to target");
    describe_counter!("port_relay_bytes_downloaded", "Bytes relayed target to client");
    describe_counter!("port_relay_datagrams_received", "Total UDP datagrams received");
    describe_counter!("port_relay_recv_errors", "Failed UDP receives on relay sockets");
    describe_counter!("port_relay_exchanges_failed", "UDP exchanges aborted by an error");
    describe_counter!("port_relay_reply_timeouts", "UDP exchanges that got no reply in time");

    // Build and install the Prometheus exporter
    PrometheusBuilder::new()
        .with_http_listener(config.bind_addr)
        .install()?;

    // Start background task to sync atomic counters to metrics crate
    tokio::spawn(sync_metrics_task());

    Ok(())
}

fn increment_by_delta(name: &'static str, current: u64, last: u64) {
    let delta = current.saturating_sub(last);
    if delta > 0 {
        counter!(name).increment(delta);
    }
}

/// Background task that periodically syncs our atomic counters to the metrics crate
async fn sync_metrics_task() {
    let mut interval = tokio::time::interval(std::time::Duration::from_secs(1));

    let mut last = MetricsSnapshot::default();

    loop {
        interval.tick().await;

        let snapshot = METRICS.snapshot();

        increment_by_delta("port_relay_flows_total", snapshot.flows_total, last.flows_total);
        gauge!("port_relay_flows_active").set(snapshot.flows_active as f64);
        increment_by_delta("port_relay_flows_failed", snapshot.flows_failed, last.flows_failed);
        increment_by_delta("port_relay_accept_errors", snapshot.accept_errors, last.accept_errors);
        increment_by_delta(
            "port_relay_bytes_uploaded",
            snapshot.bytes_uploaded,
            last.bytes_uploaded,
        );
        increment_by_delta(
            "port_relay_bytes_downloaded",
            snapshot.bytes_downloaded,
            last.bytes_downloaded,
        );
        increment_by_delta(
            "port_relay_datagrams_received",
            snapshot.datagrams_received,
            last.datagrams_received,
        );
        increment_by_delta("port_relay_recv_errors", snapshot.recv_errors, last.recv_errors);
        increment_by_delta(
            "port_relay_exchanges_failed",
            snapshot.exchanges_failed,
            last.exchanges_failed,
        );
        increment_by_delta("port_relay_reply_timeouts", snapshot.reply_timeouts, last.reply_timeouts);

        last = snapshot;
    }
}
