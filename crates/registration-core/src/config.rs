//! Configuration for client registration sessions

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for a [`ClientRegistrationSession`](crate::session::ClientRegistrationSession)
///
/// # Examples
///
/// ```rust
/// use std::time::Duration;
/// use sipline_registration_core::RegistrationConfig;
///
/// let config = RegistrationConfig::new()
///     .with_expires(1800)
///     .with_retry_interval(Duration::from_secs(30));
///
/// assert_eq!(config.default_expires, 1800);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationConfig {
    /// Requested registration lifetime in seconds, used as the initial
    /// Expires value of the REGISTER template
    pub default_expires: u32,

    /// Largest Min-Expires value this client will accept from a
    /// 423 Interval Too Short response; anything above it is treated as a
    /// plain failure
    pub max_registration_expires: u32,

    /// Delay before a failed REGISTER is retried. `None` disables retries:
    /// any non-recoverable failure is reported to the application instead.
    /// A server-supplied Retry-After takes precedence over this value.
    pub retry_interval: Option<Duration>,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            default_expires: 3600,
            max_registration_expires: 86400,
            retry_interval: None,
        }
    }
}

impl RegistrationConfig {
    /// Configuration with defaults: one hour registrations, Min-Expires
    /// accepted up to a day, retries disabled
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the requested registration lifetime in seconds
    pub fn with_expires(mut self, expires: u32) -> Self {
        self.default_expires = expires;
        self
    }

    /// Set the largest acceptable Min-Expires value
    pub fn with_max_registration_expires(mut self, max: u32) -> Self {
        self.max_registration_expires = max;
        self
    }

    /// Enable retries with the given default delay
    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = Some(interval);
        self
    }
}
