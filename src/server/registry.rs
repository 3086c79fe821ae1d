//! Relay registry
//!
//! Owns every active relay keyed by its listen address.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::info;

use crate::config::{Mapping, RelayConfig};
use crate::error::{RelayError, Result};
use crate::metrics::StatsRecord;
use crate::relay::Relay;

/// Registry of running relays
#[derive(Debug)]
pub struct Server {
    relays: DashMap<String, Relay>,
    udp_reply_timeout: Option<Duration>,
}

impl Server {
    /// Create an empty registry with default relay settings
    pub fn new() -> Self {
        Self::with_relay_config(&RelayConfig::default())
    }

    pub fn with_relay_config(config: &RelayConfig) -> Self {
        Self {
            relays: DashMap::new(),
            udp_reply_timeout: config.udp_reply_timeout(),
        }
    }

    /// Start a relay for `mapping` and register it under `mapping.from`.
    ///
    /// Nothing is registered if the address is taken or the bind fails.
    pub fn add_forwarder(&self, mapping: Mapping) -> Result<()> {
        match self.relays.entry(mapping.from.clone()) {
            Entry::Occupied(_) => Err(RelayError::DuplicateMapping(mapping.from)),
            Entry::Vacant(slot) => {
                let mut relay = Relay::new(mapping).with_udp_reply_timeout(self.udp_reply_timeout);
                relay.start()?;
                slot.insert(relay);
                Ok(())
            }
        }
    }

    /// Stop and forget the relay listening on `from`, if any
    pub async fn remove_forwarder(&self, from: &str) {
        if let Some((_, mut relay)) = self.relays.remove(from) {
            relay.stop().await;
        }
    }

    /// Read every relay's counters; not a consistent cut across relays
    pub fn get_stats(&self) -> Vec<StatsRecord> {
        self.relays.iter().map(|entry| entry.value().record()).collect()
    }

    /// Bound address of the relay registered under `from`
    pub fn local_addr(&self, from: &str) -> Option<SocketAddr> {
        self.relays.get(from).and_then(|relay| relay.local_addr())
    }

    pub fn contains(&self, from: &str) -> bool {
        self.relays.contains_key(from)
    }

    pub fn len(&self) -> usize {
        self.relays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.relays.is_empty()
    }

    /// Stop every relay
    pub async fn shutdown(&self) {
        let keys: Vec<String> = self.relays.iter().map(|entry| entry.key().clone()).collect();
        info!(relays = keys.len(), "Stopping all relays");

        for from in keys {
            self.remove_forwarder(&from).await;
        }
    }
}

impl Default for Server {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_duplicate_from_rejected() {
        let server = Server::new();
        server.add_forwarder(Mapping::tcp("127.0.0.1:0", "127.0.0.1:1")).unwrap();
        let addr = server.local_addr("127.0.0.1:0").unwrap();

        let err = server
            .add_forwarder(Mapping::tcp("127.0.0.1:0", "127.0.0.1:2"))
            .unwrap_err();
        assert!(matches!(err, RelayError::DuplicateMapping(ref from) if from == "127.0.0.1:0"));

        // Original relay untouched
        assert_eq!(server.len(), 1);
        assert_eq!(server.local_addr("127.0.0.1:0"), Some(addr));
        assert_eq!(server.get_stats()[0].to, "127.0.0.1:1");

        server.shutdown().await;
    }

    #[tokio::test]
    async fn test_bind_failure_not_registered() {
        let server = Server::new();
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let from = taken.local_addr().unwrap().to_string();

        let err = server.add_forwarder(Mapping::tcp(from.clone(), "127.0.0.1:1")).unwrap_err();
        assert!(err.is_bind_error());
        assert!(!server.contains(&from));
        assert!(server.is_empty());
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let server = Server::new();
        server.remove_forwarder("127.0.0.1:1").await;

        server.add_forwarder(Mapping::udp("127.0.0.1:0", "127.0.0.1:1")).unwrap();
        server.remove_forwarder("127.0.0.1:0").await;
        server.remove_forwarder("127.0.0.1:0").await;
        assert!(server.is_empty());
        assert!(server.get_stats().is_empty());
    }

    #[tokio::test]
    async fn test_stats_for_every_relay() {
        let udp_port = std::net::UdpSocket::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();

        let server = Server::new();
        server.add_forwarder(Mapping::tcp("127.0.0.1:0", "127.0.0.1:1")).unwrap();
        server
            .add_forwarder(Mapping::udp(format!("127.0.0.1:{udp_port}"), "127.0.0.1:1"))
            .unwrap();

        let stats = server.get_stats();
        assert_eq!(stats.len(), 2);
        assert!(stats.iter().all(|r| r.upload == 0 && r.download == 0 && r.connections == 0));

        server.shutdown().await;
        assert!(server.is_empty());
    }
}
