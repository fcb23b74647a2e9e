//! Destination store error types.

use cachelift_core::MigrateError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("timeout after {0}ms")]
    Timeout(u64),

    #[error("command error: {0}")]
    Command(String),

    #[error("invalid remote configuration: {0}")]
    Config(String),
}

impl RemoteError {
    /// Whether another attempt could succeed.
    ///
    /// Server-side rejections are final; lost connections and timeouts are not.
    pub fn is_transient(&self) -> bool {
        matches!(self, RemoteError::Connection(_) | RemoteError::Timeout(_))
    }
}

impl From<redis::RedisError> for RemoteError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_timeout() {
            RemoteError::Timeout(0)
        } else if err.is_io_error() || err.is_connection_dropped() || err.is_connection_refusal() {
            RemoteError::Connection(err.to_string())
        } else {
            RemoteError::Command(err.to_string())
        }
    }
}

impl From<RemoteError> for MigrateError {
    /// Used on the startup path; per-entry failures become
    /// [`MigrateError::Insert`] in the inserter itself.
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::Config(msg) => MigrateError::Configuration(msg),
            other => MigrateError::Connection(other.to_string()),
        }
    }
}
