//! Relay registry and lifecycle
//!
//! Creates, tracks and tears down relays for configured mappings.

mod registry;

pub use registry::Server;
