//! Application-facing registration callbacks

use std::time::Duration;

use crate::messages::RegisterResponse;
use crate::types::Aor;

/// What to do about a 408 Request Timeout response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutAction {
    /// Resend the request immediately, keeping the current state
    RetryNow,
    /// Enter the matching retry state and resend after the delay
    RetryAfter(Duration),
    /// Give up and report the failure
    Fail,
}

/// Callbacks a [`ClientRegistrationSession`](crate::session::ClientRegistrationSession)
/// invokes as its registration progresses.
///
/// Handlers are shared (`&self`) because the owning application typically
/// keeps its own handle to observe events; use interior mutability for any
/// state the callbacks record.
pub trait RegistrationHandler: Send + Sync {
    /// The registration was established or refreshed
    fn on_success(&self, aor: &Aor, response: &RegisterResponse);

    /// The registration failed and the session is being discarded.
    /// `response` is `None` for transport-level failures.
    fn on_failure(&self, aor: &Aor, response: Option<&RegisterResponse>);

    /// A removal request completed (or the session is being torn down while
    /// removing)
    fn on_removed(&self, aor: &Aor, response: Option<&RegisterResponse>);

    /// Policy decision for a 408 Request Timeout. The default gives up.
    fn on_request_timeout(&self, aor: &Aor) -> TimeoutAction {
        let _ = aor;
        TimeoutAction::Fail
    }
}
