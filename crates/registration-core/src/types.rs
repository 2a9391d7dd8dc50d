//! Core data types shared by the client session and the registrar store

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::RegistrationError;
use crate::uri::SipUri;

/// Address-of-record: the normalized URI identity a registration is for.
///
/// An `Aor` is the canonical `scheme:user@host[:port]` rendering of a SIP
/// URI with parameters stripped and the host lowercased, which makes it
/// usable as a map key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Aor(String);

impl Aor {
    /// Canonicalize a URI into its address-of-record form
    pub fn from_uri(uri: &SipUri) -> Self {
        let mut canonical = format!("{}:", uri.scheme);
        if let Some(user) = &uri.user {
            canonical.push_str(user);
            canonical.push('@');
        }
        canonical.push_str(&uri.host.to_ascii_lowercase());
        if let Some(port) = uri.port {
            canonical.push_str(&format!(":{}", port));
        }
        Aor(canonical)
    }

    /// The canonical string form
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Aor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Aor {
    type Err = RegistrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let uri: SipUri = s.parse()?;
        Ok(Aor::from_uri(&uri))
    }
}

/// One contact binding held by the registrar for an AOR
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactBinding {
    /// Contact URI; binding identity is decided by URI matching alone
    pub uri: SipUri,
    /// Absolute instant at which the binding expires
    pub expires_at: DateTime<Utc>,
    /// Preference weight (0.0..=1.0), `None` when the contact carried none
    pub q: Option<f32>,
    /// Call-ID of the REGISTER that created or last refreshed the binding
    pub call_id: String,
}

impl ContactBinding {
    /// Whether the binding has expired at `now`
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Outcome of [`RegistrationStore::update_contact`](crate::store::RegistrationStore::update_contact)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactUpdate {
    /// No binding matched the contact URI; a new one was appended
    Created,
    /// An existing binding was overwritten in place
    Updated,
}
