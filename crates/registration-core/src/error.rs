//! Error types for the registration subsystem

use thiserror::Error;

use crate::types::Aor;

/// Result type alias for registration operations
pub type Result<T> = std::result::Result<T, RegistrationError>;

/// Main error type for registration operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegistrationError {
    /// A registration update is already waiting for the in-flight request
    /// to complete; only one modification may be queued at a time.
    #[error("a registration update is already queued for {0}")]
    ModificationPending(Aor),

    /// The contact URI does not match any binding owned by this session
    #[error("no binding for contact {0}")]
    NoSuchBinding(String),

    /// The operation requires an established registration
    #[error("session for {0} is not registered")]
    NotRegistered(Aor),

    /// The session has been discarded after a final failure or removal
    #[error("session for {0} has ended")]
    SessionEnded(Aor),

    /// Malformed or unexpected response content
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// Failure reported by the message transport
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// URI could not be parsed
    #[error("invalid URI: {0}")]
    InvalidUri(String),
}

/// Errors surfaced by the message transport when a request cannot be sent
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// No connection to the registrar is available
    #[error("connection to the registrar is not available")]
    NotConnected,

    /// The transport accepted the request but could not deliver it
    #[error("send failed: {0}")]
    SendFailed(String),
}
