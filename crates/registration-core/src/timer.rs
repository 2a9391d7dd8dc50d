//! Software timers for registration sessions
//!
//! Sessions never cancel a scheduled timer. Every timer carries the
//! session's sequence value at schedule time, and a firing whose sequence
//! no longer matches is simply ignored by the session. That keeps the
//! timer service trivial: schedule, wait, deliver.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// The two timers a registration session schedules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimerKind {
    /// Re-REGISTER ahead of the registrar expiring our bindings
    Refresh,
    /// Resend a failed request after a backoff delay
    Retry,
}

impl fmt::Display for TimerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimerKind::Refresh => f.write_str("refresh"),
            TimerKind::Retry => f.write_str("retry"),
        }
    }
}

/// A timer firing, to be fed into
/// [`ClientRegistrationSession::dispatch_timer`](crate::session::ClientRegistrationSession::dispatch_timer)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerFired {
    /// Which timer fired
    pub kind: TimerKind,
    /// Session sequence value captured when the timer was scheduled
    pub seq: u64,
}

/// Scheduling side of the timer seam
pub trait TimerService: Send + Sync {
    /// Schedule a one-shot timer. `seq` is the session's current timer
    /// sequence and must be delivered back unchanged with the firing.
    fn schedule(&self, kind: TimerKind, delay: Duration, seq: u64);
}

/// Tokio-backed timer service.
///
/// Each `schedule` call spawns a sleep task that delivers a [`TimerFired`]
/// over an unbounded channel. The owner of the receiving end feeds firings
/// into the session's dispatch loop. Must be used from within a Tokio
/// runtime.
///
/// # Examples
///
/// ```rust,no_run
/// use std::time::Duration;
/// use sipline_registration_core::{TimerKind, TimerService, TokioTimerService};
///
/// # async fn example() {
/// let (timers, mut firings) = TokioTimerService::new();
/// timers.schedule(TimerKind::Refresh, Duration::from_secs(3240), 1);
/// let fired = firings.recv().await.unwrap();
/// assert_eq!(fired.seq, 1);
/// # }
/// ```
pub struct TokioTimerService {
    tx: mpsc::UnboundedSender<TimerFired>,
}

impl TokioTimerService {
    /// Create the service and the channel its firings arrive on
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TimerFired>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl TimerService for TokioTimerService {
    fn schedule(&self, kind: TimerKind, delay: Duration, seq: u64) {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // receiver dropped means the session owner is gone; nothing to do
            let _ = tx.send(TimerFired { kind, seq });
        });
    }
}
