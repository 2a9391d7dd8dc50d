//! # SIP Registration Core
//!
//! The registration subsystem of the sipline stack: the client-side
//! REGISTER state machine and the registrar-side binding store.
//!
//! This crate provides:
//! - [`ClientRegistrationSession`] - per-AOR client state machine driving
//!   REGISTER exchanges: admission control for modifications, refresh ahead
//!   of expiry, 423/408 handling, retry with backoff
//! - [`RegistrationStore`] - concurrent AOR to contact-binding store with
//!   per-AOR logical locking and lazy expiry
//! - The seams to the rest of the stack: [`MessageTransport`],
//!   [`TimerService`] (with a Tokio implementation), and the
//!   [`RegistrationHandler`] application callbacks
//!
//! The generic SIP parser/transport, the proxy request pipeline, and
//! authentication live in their own crates; what crosses into this one is
//! already-parsed registration content ([`RegisterRequest`] /
//! [`RegisterResponse`]).
//!
//! # Architecture
//!
//! ```text
//!  application        ┌────────────────────────────┐      MessageTransport
//!  callbacks  ◀───────│  ClientRegistrationSession │──────▶  (wire layer)
//!                     └──────────▲─────────────────┘
//!                                │ dispatch loop (responses, timer firings)
//!                     ┌──────────┴─────────────────┐
//!                     │       TimerService         │
//!                     └────────────────────────────┘
//!
//!  registrar request  ┌────────────────────────────┐
//!  handler   ────────▶│     RegistrationStore      │  (per-AOR logical lock)
//!                     └────────────────────────────┘
//! ```
//!
//! Sessions are single-threaded by contract: serialize all `dispatch_*`
//! calls per session. The store is fully thread-safe and is meant to be
//! shared across request-handling threads.

pub mod config;
pub mod error;
pub mod events;
pub mod messages;
pub mod session;
pub mod store;
pub mod timer;
pub mod transport;
pub mod types;
pub mod uri;

// Re-exports for convenience
pub use config::RegistrationConfig;
pub use error::{RegistrationError, Result, TransportError};
pub use events::{RegistrationHandler, TimeoutAction};
pub use messages::{ContactHeader, RegisterRequest, RegisterResponse};
pub use session::{ClientRegistrationSession, SessionState};
pub use store::RegistrationStore;
pub use timer::{TimerFired, TimerKind, TimerService, TokioTimerService};
pub use transport::MessageTransport;
pub use types::{Aor, ContactBinding, ContactUpdate};
pub use uri::{Scheme, SipUri};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
