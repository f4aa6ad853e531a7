//! Error types shared across the fleet health monitor.

use thiserror::Error;

/// Top-level error type for the fleet health monitor.
#[derive(Error, Debug)]
pub enum FleetError {
    /// Bus connect/poll/publish failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// Persistence-port read/write failure.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// PMS RPC call failed after exhausting retries.
    #[error("remote RPC error: {0}")]
    RemoteRpc(String),

    /// PMS circuit breaker is open; call was not attempted.
    #[error("circuit breaker open for {0}")]
    CircuitOpen(String),

    /// Inbound payload could not be decoded into a known event.
    #[error("decode error: {0}")]
    Decode(String),

    /// A core invariant was violated. Fatal; the process should terminate.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// Configuration could not be loaded or was invalid.
    #[error("config error: {0}")]
    Config(String),

    /// Wraps `std::io::Error` encountered while loading config or state.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias used throughout the fleet crates.
pub type FleetResult<T> = Result<T, FleetError>;
