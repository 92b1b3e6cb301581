//! Custom error types for the ranging engine.
//!
//! This module defines the primary error type, `SonarError`, for the whole crate.
//! Using the `thiserror` crate, it provides a centralized and consistent way to handle
//! the different kinds of failures the engine can run into, from GPIO acquisition to
//! malformed rate strings written to the control surface.
//!
//! ## Error Hierarchy
//!
//! - **`ResourceUnavailable`**: A trigger or echo line could not be acquired. Fatal to
//!   `start()`; every line acquired so far has already been released when this is returned.
//! - **`InvalidConfig`**: A rate string was malformed or out of range, or a configuration
//!   value failed validation. The existing configuration is left untouched.
//! - **`MeasurementTimeout`**: An echo never returned before the guard expired. This is a
//!   routine outcome that produces the invalid-distance sentinel; it is logged, never
//!   returned from a public API as a failure.
//! - **`SpuriousEdge`**: An edge arrived that does not fit the channel phase. Ignored.
//! - **`Config`**: Wraps errors from `figment` while loading configuration files.
//! - **`Io`**: Wraps `std::io::Error` (stdin control loop, config files).
//! - **`Runtime`**: The engine was started outside a tokio runtime, or one of its tasks
//!   failed to join during shutdown.
//!
//! Hardware backends report failures as `anyhow::Error`; the engine wraps them into
//! `ResourceUnavailable` together with the line number and its role.

use thiserror::Error;

use crate::ranging::{ChannelId, EdgeKind};

/// Convenience alias for results using the crate error type.
pub type SonarResult<T> = std::result::Result<T, SonarError>;

/// Which part of the wiring a GPIO line serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineRole {
    /// Shared trigger output.
    Trigger,
    /// Echo input of one channel.
    Echo(ChannelId),
}

impl std::fmt::Display for LineRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LineRole::Trigger => write!(f, "trigger"),
            LineRole::Echo(channel) => write!(f, "echo {}", channel),
        }
    }
}

#[allow(missing_docs)]
#[derive(Error, Debug)]
pub enum SonarError {
    #[error("GPIO {line} ({role}) unavailable: {source}")]
    ResourceUnavailable {
        line: u32,
        role: LineRole,
        #[source]
        source: anyhow::Error,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Echo on channel {channel} timed out")]
    MeasurementTimeout { channel: ChannelId },

    #[error("Spurious {edge:?} edge on channel {channel}")]
    SpuriousEdge { channel: ChannelId, edge: EdgeKind },

    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Engine is already running")]
    AlreadyRunning,

    #[error("Async runtime error: {0}")]
    Runtime(String),

    #[error("Shutdown failed with errors")]
    ShutdownFailed(Vec<SonarError>),
}

impl From<figment::Error> for SonarError {
    fn from(value: figment::Error) -> Self {
        SonarError::Config(Box::new(value))
    }
}

impl SonarError {
    /// Whether the engine keeps running normally after this error.
    ///
    /// Timeouts and spurious edges are part of regular operation, and a rejected
    /// rate string leaves the previous configuration in force.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            SonarError::MeasurementTimeout { .. }
                | SonarError::SpuriousEdge { .. }
                | SonarError::InvalidConfig(_)
                | SonarError::AlreadyRunning
        )
    }
}
