//! Error types for relay tracking.
//!
//! Only transport failures and failures reported by the host's own
//! collaborators surface to callers. Store and classification failures are
//! typed so that the hooks can log them, but the hooks never let them abort
//! the send or receive they are attached to.

use std::io;

use thiserror::Error;

/// Error returned by the hook entry points.
#[derive(Debug, Error)]
pub enum TrackingError {
    /// The wrapped transport failed; passed through unchanged.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The tracking store failed.
    #[error("Tracking store error: {0}")]
    Store(#[from] StoreError),

    /// The host's native router or bounce handler failed.
    #[error(transparent)]
    Host(#[from] anyhow::Error),
}

/// Errors raised by a [`TrackingStore`](crate::TrackingStore) implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No record exists for the given id.
    #[error("Tracking record not found: {0}")]
    NotFound(crate::TraceId),

    /// Backend failure (lock poisoning, lost connection, ...).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl<T> From<std::sync::PoisonError<T>> for StoreError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        Self::Internal(format!("Lock poisoned: {e}"))
    }
}

/// Errors raised by a [`MailTransport`](crate::MailTransport).
#[derive(Debug, Error)]
pub enum TransportError {
    /// IO error occurred during network operations.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// The server closed the connection.
    #[error("Server disconnected")]
    Disconnected,

    /// Failed to parse an SMTP reply.
    #[error("Failed to parse SMTP response: {0}")]
    Parse(String),

    /// The server returned an error status code (4xx or 5xx).
    #[error("SMTP error: {code} - {message}")]
    Smtp { code: u16, message: String },

    /// UTF-8 decoding error.
    #[error("UTF-8 error: {0}")]
    Utf8(#[from] std::str::Utf8Error),
}

/// Why a bounce report could not be classified.
#[derive(Debug, Error)]
pub enum ClassificationError {
    /// The report is not a parseable MIME message.
    #[error("Unable to parse report: {0}")]
    Mime(#[from] mailparse::MailParseError),
}

/// Errors loading a [`TrackingConfig`](crate::TrackingConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unable to read configuration: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Specialized `Result` type for the hook entry points.
pub type Result<T> = std::result::Result<T, TrackingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_error_is_transparent() {
        let err = TrackingError::from(TransportError::Disconnected);
        assert_eq!(err.to_string(), "Server disconnected");
    }

    #[test]
    fn test_host_error_is_transparent() {
        let err = TrackingError::from(anyhow::anyhow!("router exploded"));
        assert_eq!(err.to_string(), "router exploded");
    }

    #[test]
    fn test_poisoned_lock_conversion() {
        let lock = std::sync::Arc::new(std::sync::RwLock::new(()));
        let poisoner = lock.clone();
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.write();
            panic!("poison");
        })
        .join();

        let err: StoreError = lock.read().unwrap_err().into();
        assert!(matches!(err, StoreError::Internal(_)));
        assert!(err.to_string().contains("Lock poisoned"));
    }
}
