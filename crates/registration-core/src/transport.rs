//! Message transport seam
//!
//! The SIP wire layer lives outside this crate. A session only needs to
//! hand requests to something that will eventually deliver responses back
//! into its dispatch loop; this trait is that seam.

use crate::error::TransportError;
use crate::messages::RegisterRequest;

/// Outbound side of the message layer.
///
/// `send` must not block: implementations are expected to enqueue the
/// request and return. Responses and connection loss come back through the
/// owning dispatch loop as calls to
/// [`ClientRegistrationSession::dispatch_response`](crate::session::ClientRegistrationSession::dispatch_response)
/// and
/// [`ClientRegistrationSession::connection_lost`](crate::session::ClientRegistrationSession::connection_lost).
pub trait MessageTransport: Send + Sync {
    /// Queue a REGISTER request for delivery
    fn send(&self, request: &RegisterRequest) -> Result<(), TransportError>;
}
