//! Port Relay - TCP/UDP port forwarding with live statistics
//!
//! This library provides the relay engine: per-mapping TCP and UDP
//! forwarders, the registry that owns them, and the counters it reports.

pub mod config;
pub mod error;
pub mod metrics;
pub mod relay;
pub mod server;
pub mod util;

pub use config::{Config, Mapping, Protocol};
pub use error::{RelayError, Result};
pub use metrics::StatsRecord;
pub use relay::{Relay, RelayPhase};
pub use server::Server;

/// Relay version for display
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
