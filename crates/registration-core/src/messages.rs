//! REGISTER request/response boundary types
//!
//! The generic SIP parser and transport live outside this crate; what
//! crosses the seam is the already-parsed registration content of a
//! message. [`RegisterRequest`] is what a session hands to its
//! [`MessageTransport`](crate::transport::MessageTransport), and
//! [`RegisterResponse`] is what the owning dispatch loop feeds back into
//! [`ClientRegistrationSession::dispatch_response`](crate::session::ClientRegistrationSession::dispatch_response).

use serde::{Deserialize, Serialize};

use crate::types::Aor;
use crate::uri::SipUri;

/// One Contact header entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactHeader {
    /// Contact URI
    pub uri: SipUri,
    /// q-value preference weight (0.0..=1.0)
    pub q: Option<f32>,
    /// Per-contact expires parameter, seconds
    pub expires: Option<u32>,
}

impl ContactHeader {
    /// Contact with no q-value and no per-contact expiry
    pub fn new(uri: SipUri) -> Self {
        Self {
            uri,
            q: None,
            expires: None,
        }
    }

    /// Set the q-value, clamped into 0.0..=1.0
    pub fn with_q(mut self, q: f32) -> Self {
        self.q = Some(q.clamp(0.0, 1.0));
        self
    }

    /// Set the per-contact expires parameter
    pub fn with_expires(mut self, expires: u32) -> Self {
        self.expires = Some(expires);
        self
    }
}

/// Registration content of an outgoing REGISTER request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterRequest {
    /// Address-of-record being registered (request target / To URI)
    pub aor: Aor,
    /// Call-ID correlating the whole registration exchange
    pub call_id: String,
    /// CSeq number, incremented for every request this session sends
    pub cseq: u32,
    /// Top-level Expires header value, seconds
    pub expires: Option<u32>,
    /// Contact entries carried by the request
    pub contacts: Vec<ContactHeader>,
    /// True for a `Contact: *` remove-all request (always sent with Expires: 0)
    pub wildcard: bool,
}

/// Registration content of an incoming REGISTER response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterResponse {
    /// Status code, e.g. 200, 423, 503
    pub status: u16,
    /// Reason phrase
    pub reason: String,
    /// CSeq echoed from the request; 0 when the transport could not recover it
    pub cseq: u32,
    /// Top-level Expires header value, seconds
    pub expires: Option<u32>,
    /// Min-Expires header (423 responses)
    pub min_expires: Option<u32>,
    /// Retry-After header, seconds
    pub retry_after: Option<u32>,
    /// Contact entries returned by the registrar
    pub contacts: Vec<ContactHeader>,
    /// Service-Route header URIs; empty when the header is absent
    pub service_route: Vec<SipUri>,
}

impl RegisterResponse {
    /// Response with the given status and echoed CSeq
    pub fn new(status: u16, cseq: u32) -> Self {
        Self {
            status,
            reason: String::new(),
            cseq,
            expires: None,
            min_expires: None,
            retry_after: None,
            contacts: Vec::new(),
            service_route: Vec::new(),
        }
    }

    /// Set the reason phrase
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    /// Append a Contact entry
    pub fn with_contact(mut self, contact: ContactHeader) -> Self {
        self.contacts.push(contact);
        self
    }

    /// Set the top-level Expires header
    pub fn with_expires(mut self, expires: u32) -> Self {
        self.expires = Some(expires);
        self
    }

    /// Set the Min-Expires header
    pub fn with_min_expires(mut self, min_expires: u32) -> Self {
        self.min_expires = Some(min_expires);
        self
    }

    /// Set the Retry-After header
    pub fn with_retry_after(mut self, retry_after: u32) -> Self {
        self.retry_after = Some(retry_after);
        self
    }

    /// Set the Service-Route URIs
    pub fn with_service_route(mut self, route: Vec<SipUri>) -> Self {
        self.service_route = route;
        self
    }

    /// Whether this is a 2xx final response
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Whether this is a provisional (1xx) response
    pub fn is_provisional(&self) -> bool {
        self.status < 200
    }
}
