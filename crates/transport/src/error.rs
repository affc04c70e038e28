//! Shared error types for transport implementations.

use thiserror::Error;

use crate::ids::ConnectionId;

pub type TransportResult<T> = Result<T, TransportError>;

/// Generic transport level error surfaced to higher layers.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The address scheme is not handled by this transport.
    ///
    /// Aggregating layers treat this kind, and only this kind, as "try the
    /// next transport" during connect dispatch.
    #[error("unsupported address scheme `{scheme}`")]
    UnsupportedScheme { scheme: String },
    /// No configured transport was both available and accepting of the
    /// address.
    #[error("no transport available for `{address}`")]
    NoTransportAvailable { address: String },
    /// A client-role operation was attempted without an established
    /// connection.
    #[error("transport not connected")]
    NotConnected,
    /// A server-role operation referenced a connection this transport does
    /// not know about.
    #[error("unknown connection {0}")]
    InvalidConnection(ConnectionId),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("other: {0}")]
    Other(String),
}

impl TransportError {
    pub fn unsupported_scheme(scheme: impl Into<String>) -> Self {
        Self::UnsupportedScheme {
            scheme: scheme.into(),
        }
    }

    /// Whether this error means the address format was rejected, as opposed
    /// to a failed connection attempt.
    pub fn is_unsupported_scheme(&self) -> bool {
        matches!(self, Self::UnsupportedScheme { .. })
    }
}
