//! Shared test doubles for the registration session's collaborators

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use sipline_registration_core::{
    Aor, ClientRegistrationSession, ContactHeader, MessageTransport, RegisterRequest,
    RegisterResponse, RegistrationConfig, RegistrationHandler, TimeoutAction, TimerKind,
    TimerService, TransportError,
};

/// Records outgoing requests; can be told to fail sends
#[derive(Default)]
pub struct MockTransport {
    pub sent: Mutex<Vec<RegisterRequest>>,
    pub fail_sends: Mutex<bool>,
}

impl MockTransport {
    pub fn last_sent(&self) -> RegisterRequest {
        self.sent.lock().last().expect("nothing sent").clone()
    }
}

impl MessageTransport for MockTransport {
    fn send(&self, request: &RegisterRequest) -> Result<(), TransportError> {
        if *self.fail_sends.lock() {
            return Err(TransportError::NotConnected);
        }
        self.sent.lock().push(request.clone());
        Ok(())
    }
}

/// Records scheduled timers instead of running them
#[derive(Default)]
pub struct MockTimers {
    pub scheduled: Mutex<Vec<(TimerKind, Duration, u64)>>,
}

impl MockTimers {
    pub fn last_scheduled(&self) -> (TimerKind, Duration, u64) {
        *self.scheduled.lock().last().expect("nothing scheduled")
    }
}

impl TimerService for MockTimers {
    fn schedule(&self, kind: TimerKind, delay: Duration, seq: u64) {
        self.scheduled.lock().push((kind, delay, seq));
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerEvent {
    Success,
    Failure { with_response: bool },
    Removed,
}

/// Records callbacks; the 408 policy is configurable per test
pub struct RecordingHandler {
    pub events: Mutex<Vec<HandlerEvent>>,
    pub timeout_action: Mutex<TimeoutAction>,
}

impl Default for RecordingHandler {
    fn default() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            timeout_action: Mutex::new(TimeoutAction::Fail),
        }
    }
}

impl RegistrationHandler for RecordingHandler {
    fn on_success(&self, _aor: &Aor, _response: &RegisterResponse) {
        self.events.lock().push(HandlerEvent::Success);
    }

    fn on_failure(&self, _aor: &Aor, response: Option<&RegisterResponse>) {
        self.events.lock().push(HandlerEvent::Failure {
            with_response: response.is_some(),
        });
    }

    fn on_removed(&self, _aor: &Aor, _response: Option<&RegisterResponse>) {
        self.events.lock().push(HandlerEvent::Removed);
    }

    fn on_request_timeout(&self, _aor: &Aor) -> TimeoutAction {
        *self.timeout_action.lock()
    }
}

pub struct TestRig {
    pub transport: Arc<MockTransport>,
    pub timers: Arc<MockTimers>,
    pub handler: Arc<RecordingHandler>,
    pub session: ClientRegistrationSession,
}

pub fn rig(config: RegistrationConfig) -> TestRig {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
    let transport = Arc::new(MockTransport::default());
    let timers = Arc::new(MockTimers::default());
    let handler = Arc::new(RecordingHandler::default());
    let session = ClientRegistrationSession::new(
        "sip:alice@example.com".parse().unwrap(),
        None,
        config,
        transport.clone(),
        timers.clone(),
        handler.clone(),
    );
    TestRig {
        transport,
        timers,
        handler,
        session,
    }
}

pub fn contact(s: &str) -> ContactHeader {
    ContactHeader::new(s.parse().unwrap())
}

/// Build a 200 OK echoing the contacts of the last request sent through
/// `transport`, each stamped with a per-contact expiry, the way a
/// cooperative registrar answers
pub fn ok_echoing_last(transport: &MockTransport, expires: u32) -> RegisterResponse {
    let sent = transport.last_sent();
    let mut response = RegisterResponse::new(200, sent.cseq).with_reason("OK");
    for c in sent.contacts {
        response = response.with_contact(ContactHeader {
            expires: Some(expires),
            ..c
        });
    }
    response
}
