//! Relay error types

use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RelayError>;

/// Errors surfaced synchronously by relay creation and registry calls.
///
/// Per-flow failures (dial, copy, transient accept/read) are logged inside
/// their task and never reach a caller; `Dial` exists for the flow code to
/// report through its own log line.
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to resolve {addr}: {source}")]
    Resolve {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("listen address {0} is already forwarded")]
    DuplicateMapping(String),
    #[error("failed to connect to {addr}: {source}")]
    Dial {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("relay for {0} was already started")]
    AlreadyStarted(String),
}

impl RelayError {
    /// Whether the listen socket could not be created
    pub fn is_bind_error(&self) -> bool {
        matches!(self, RelayError::Bind { .. } | RelayError::Resolve { .. })
    }
}
