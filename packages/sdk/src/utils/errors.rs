// packages/sdk/src/utils/errors.rs
//! Error types for the monitoring core

use thiserror::Error;

/// Errors produced by the monitoring core.
///
/// No variant is ever allowed to escape into host application code; the
/// orchestrator converts failures into warnings and degraded capability.
#[derive(Debug, Error)]
pub enum MonitorError {
    /// Invalid or incomplete configuration (refused at construction)
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// HTTP delivery failed after all retries
    #[error("transport failed: {0}")]
    TransportFailed(String),

    /// A single request exceeded its deadline
    #[error("request timed out")]
    RequestTimeout,

    /// Backing key/value store failed
    #[error("storage failed: {0}")]
    StorageFailed(String),

    /// A capture hook or observer could not be installed
    #[error("capture failed: {0}")]
    CaptureFailed(String),

    /// Replay recording could not start or record
    #[error("replay failed: {0}")]
    ReplayFailed(String),

    /// Event body compression failed
    #[error("compression failed: {0}")]
    CompressionFailed(String),

    /// Event (de)serialization failed
    #[error("serialization failed: {0}")]
    SerializationFailed(String),
}

/// Convenience result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, MonitorError>;
