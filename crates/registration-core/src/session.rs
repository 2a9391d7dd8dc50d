//! Client-side REGISTER state machine
//!
//! A [`ClientRegistrationSession`] owns one address-of-record's
//! registration with a registrar: it builds REGISTER requests, interprets
//! responses and timer firings, refreshes bindings ahead of expiry, and
//! decides when to retry or give up.
//!
//! # Driving the machine
//!
//! A session is not internally thread-safe. The owner runs a single
//! dispatch loop per user agent and feeds every input through it:
//! responses via [`dispatch_response`](ClientRegistrationSession::dispatch_response),
//! timer firings via [`dispatch_timer`](ClientRegistrationSession::dispatch_timer),
//! and transport loss via [`connection_lost`](ClientRegistrationSession::connection_lost).
//! None of these block; they issue non-blocking sends and timer schedules
//! and return.
//!
//! # One request in flight
//!
//! At most one REGISTER is ever outstanding. A modification attempted
//! while one is in flight is queued (at most one deep; a second attempt
//! fails with [`RegistrationError::ModificationPending`]) and promoted
//! once the exchange completes. A modification attempted while a retry
//! timer is pending jumps the queue: the timer sequence is bumped, which
//! renders the scheduled firing inert without touching the timer service.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::config::RegistrationConfig;
use crate::error::{RegistrationError, Result};
use crate::events::{RegistrationHandler, TimeoutAction};
use crate::messages::{ContactHeader, RegisterRequest, RegisterResponse};
use crate::timer::{TimerKind, TimerService};
use crate::transport::MessageTransport;
use crate::types::Aor;
use crate::uri::SipUri;

/// URI parameter carrying the session's correlation token.
///
/// Placed on every contact this session registers so it can recognize its
/// own contacts among those a 200 response returns. Interim heuristic
/// until GRUU is in place: proxies that rewrite Contact URIs are expected,
/// but not guaranteed, to echo the parameter.
const CORRELATION_PARAM: &str = "rinstance";

/// States of a client registration session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Initial registration (or query) is being sent or awaited
    AddingOrQuerying,
    /// Bindings are established; a refresh timer is pending
    Registered,
    /// A refresh request is in flight
    Refreshing,
    /// A removal request is in flight
    Removing,
    /// Initial registration failed; waiting for the retry timer
    RetryAdding,
    /// Refresh failed; waiting for the retry timer
    RetryRefreshing,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::AddingOrQuerying => "AddingOrQuerying",
            SessionState::Registered => "Registered",
            SessionState::Refreshing => "Refreshing",
            SessionState::Removing => "Removing",
            SessionState::RetryAdding => "RetryAdding",
            SessionState::RetryRefreshing => "RetryRefreshing",
        };
        f.write_str(name)
    }
}

/// The single modification allowed to wait for the in-flight exchange
#[derive(Debug, Clone)]
struct QueuedModification {
    target: SessionState,
    request: RegisterRequest,
}

/// Per-AOR client registration state machine
pub struct ClientRegistrationSession {
    aor: Aor,
    config: RegistrationConfig,
    transport: Arc<dyn MessageTransport>,
    timers: Arc<dyn TimerService>,
    handler: Arc<dyn RegistrationHandler>,

    state: SessionState,
    call_id: String,
    corr_token: String,
    cseq: u32,
    /// Last request sent; resent on retry and rewritten for 423 handling
    request: RegisterRequest,
    my_contacts: Vec<ContactHeader>,
    all_contacts: Vec<ContactHeader>,
    service_route: Vec<SipUri>,
    queued: Option<QueuedModification>,
    timer_seq: u64,
    in_flight: bool,
    end_when_done: bool,
    ended: bool,
}

impl ClientRegistrationSession {
    /// Build a session and its initial REGISTER template. Nothing is sent
    /// until the first binding operation.
    ///
    /// `expires` overrides the configured default registration lifetime.
    pub fn new(
        aor: Aor,
        expires: Option<u32>,
        config: RegistrationConfig,
        transport: Arc<dyn MessageTransport>,
        timers: Arc<dyn TimerService>,
        handler: Arc<dyn RegistrationHandler>,
    ) -> Self {
        let call_id = Uuid::new_v4().to_string();
        let mut corr_token = Uuid::new_v4().simple().to_string();
        corr_token.truncate(12);
        let expires = expires.unwrap_or(config.default_expires);
        let request = RegisterRequest {
            aor: aor.clone(),
            call_id: call_id.clone(),
            cseq: 0,
            expires: Some(expires),
            contacts: Vec::new(),
            wildcard: false,
        };
        Self {
            aor,
            config,
            transport,
            timers,
            handler,
            state: SessionState::AddingOrQuerying,
            call_id,
            corr_token,
            cseq: 0,
            request,
            my_contacts: Vec::new(),
            all_contacts: Vec::new(),
            service_route: Vec::new(),
            queued: None,
            timer_seq: 0,
            in_flight: false,
            end_when_done: false,
            ended: false,
        }
    }

    /// The address-of-record this session registers
    pub fn aor(&self) -> &Aor {
        &self.aor
    }

    /// Current state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// True once the session has been discarded; the owner should drop it
    pub fn is_ended(&self) -> bool {
        self.ended
    }

    /// Contacts this session believes it owns at the registrar
    pub fn my_contacts(&self) -> &[ContactHeader] {
        &self.my_contacts
    }

    /// Full contact set the registrar last returned for the AOR
    pub fn all_contacts(&self) -> &[ContactHeader] {
        &self.all_contacts
    }

    /// Service route from the last successful response; empty when the
    /// registrar returned none
    pub fn service_route(&self) -> &[SipUri] {
        &self.service_route
    }

    /// Token this session stamps into its contact URIs
    pub fn correlation_token(&self) -> &str {
        &self.corr_token
    }

    /// Register a contact (or update an already-owned one).
    ///
    /// The contact URI is tagged with the session's correlation token and
    /// the full owned contact set is (re)registered, subject to admission
    /// control.
    pub fn add_binding(&mut self, contact: ContactHeader) -> Result<()> {
        self.check_alive()?;
        let ContactHeader { uri, q, expires } = contact;
        let tagged = ContactHeader {
            uri: uri.with_parameter(CORRELATION_PARAM, Some(self.corr_token.clone())),
            q,
            expires,
        };
        match self.my_contacts.iter_mut().find(|c| c.uri.matches(&tagged.uri)) {
            Some(existing) => *existing = tagged,
            None => self.my_contacts.push(tagged),
        }
        let request = self.snapshot(self.my_contacts.clone(), false);
        self.try_modification(SessionState::AddingOrQuerying, request)
    }

    /// Unregister a single owned contact.
    ///
    /// Fails with [`RegistrationError::NoSuchBinding`] when the URI matches
    /// none of the session's contacts.
    pub fn remove_binding(&mut self, contact: &SipUri) -> Result<()> {
        self.check_alive()?;
        let position = self
            .my_contacts
            .iter()
            .position(|c| c.uri.matches(contact))
            .ok_or_else(|| RegistrationError::NoSuchBinding(contact.to_string()))?;
        let mut removed = self.my_contacts.remove(position);
        removed.expires = Some(0);
        let request = self.snapshot(vec![removed], false);
        self.try_modification(SessionState::Removing, request)
    }

    /// Unregister every contact this session owns. With `stop` set, the
    /// session tears itself down once the removal completes.
    pub fn remove_my_bindings(&mut self, stop: bool) -> Result<()> {
        self.check_alive()?;
        let contacts: Vec<ContactHeader> = self
            .my_contacts
            .drain(..)
            .map(|mut c| {
                c.expires = Some(0);
                c
            })
            .collect();
        self.end_when_done |= stop;
        let request = self.snapshot(contacts, false);
        self.try_modification(SessionState::Removing, request)
    }

    /// Unregister every binding for the AOR (`Contact: *`, `Expires: 0`),
    /// including bindings registered by other user agents. With `stop`
    /// set, the session tears itself down once the removal completes.
    pub fn remove_all(&mut self, stop: bool) -> Result<()> {
        self.check_alive()?;
        self.my_contacts.clear();
        self.end_when_done |= stop;
        let mut request = self.snapshot(Vec::new(), true);
        request.expires = Some(0);
        self.try_modification(SessionState::Removing, request)
    }

    /// Application-driven refresh of an established registration.
    ///
    /// `expires` updates the requested lifetime for this and subsequent
    /// refreshes. Fails with [`RegistrationError::NotRegistered`] unless
    /// the session is in [`SessionState::Registered`].
    pub fn request_refresh(&mut self, expires: Option<u32>) -> Result<()> {
        self.check_alive()?;
        if self.state != SessionState::Registered {
            return Err(RegistrationError::NotRegistered(self.aor.clone()));
        }
        if let Some(expires) = expires {
            self.request.expires = Some(expires);
        }
        debug!(aor = %self.aor, "refresh requested by application");
        self.refresh()
    }

    /// Feed a REGISTER response into the state machine.
    ///
    /// Any protocol or transport error raised while handling the response
    /// is reported through the handler's `on_failure` and the session is
    /// discarded; it is never left half-updated.
    pub fn dispatch_response(&mut self, response: RegisterResponse) {
        if self.ended {
            debug!(aor = %self.aor, "ignoring response for ended session");
            return;
        }
        if response.is_provisional() {
            trace!(aor = %self.aor, status = response.status, "ignoring provisional response");
            return;
        }
        // With one request in flight a CSeq mismatch can only be a late
        // retransmission of an earlier exchange.
        if response.cseq != 0 && response.cseq != self.cseq {
            debug!(
                aor = %self.aor,
                got = response.cseq,
                expected = self.cseq,
                "ignoring stale response"
            );
            return;
        }

        let outcome = if response.is_success() {
            self.handle_success(&response)
        } else {
            self.handle_failure(&response)
        };
        if let Err(error) = outcome {
            warn!(aor = %self.aor, %error, "failed handling REGISTER response");
            self.fail_and_discard(Some(&response));
        }
    }

    /// Feed a timer firing into the state machine.
    ///
    /// Firings whose sequence no longer matches the session's current
    /// value are ignored; that is the cancellation mechanism.
    pub fn dispatch_timer(&mut self, kind: TimerKind, seq: u64) {
        if self.ended {
            return;
        }
        if seq != self.timer_seq {
            trace!(
                aor = %self.aor,
                %kind,
                got = seq,
                current = self.timer_seq,
                "ignoring stale timer"
            );
            return;
        }
        let outcome = match kind {
            TimerKind::Refresh => self.handle_refresh_timer(),
            TimerKind::Retry => self.handle_retry_timer(),
        };
        if let Err(error) = outcome {
            warn!(aor = %self.aor, %error, "failed handling {kind} timer");
            self.fail_and_discard(None);
        }
    }

    /// The transport lost its connection to the registrar. Reported as a
    /// failure; the session is discarded.
    pub fn connection_lost(&mut self) {
        if self.ended {
            return;
        }
        warn!(aor = %self.aor, "connection to registrar lost");
        self.fail_and_discard(None);
    }

    fn check_alive(&self) -> Result<()> {
        if self.ended {
            return Err(RegistrationError::SessionEnded(self.aor.clone()));
        }
        Ok(())
    }

    /// Build a request carrying the given contacts on this session's
    /// dialog-like identity (Call-ID, current Expires). CSeq is assigned
    /// at send time.
    fn snapshot(&self, contacts: Vec<ContactHeader>, wildcard: bool) -> RegisterRequest {
        RegisterRequest {
            aor: self.aor.clone(),
            call_id: self.call_id.clone(),
            cseq: 0,
            expires: self.request.expires,
            contacts,
            wildcard,
        }
    }

    /// Admission control for modification requests.
    ///
    /// Sends immediately when the session is idle (`Registered`, waiting
    /// on a retry timer, or never having sent anything); otherwise queues
    /// the request behind the in-flight exchange, one deep.
    fn try_modification(&mut self, target: SessionState, request: RegisterRequest) -> Result<()> {
        match self.state {
            SessionState::Registered => {
                self.state = target;
                self.send_request(request)
            }
            SessionState::RetryAdding | SessionState::RetryRefreshing => {
                // jump the queue; the pending retry timer becomes stale
                self.timer_seq += 1;
                self.state = target;
                self.send_request(request)
            }
            _ if !self.in_flight => {
                self.state = target;
                self.send_request(request)
            }
            _ => {
                if self.queued.is_some() {
                    return Err(RegistrationError::ModificationPending(self.aor.clone()));
                }
                debug!(aor = %self.aor, state = %self.state, "queueing modification behind in-flight request");
                self.queued = Some(QueuedModification { target, request });
                Ok(())
            }
        }
    }

    fn send_request(&mut self, mut request: RegisterRequest) -> Result<()> {
        self.cseq += 1;
        request.cseq = self.cseq;
        trace!(aor = %self.aor, cseq = request.cseq, state = %self.state, "sending REGISTER");
        self.transport.send(&request)?;
        self.request = request;
        self.in_flight = true;
        Ok(())
    }

    fn handle_success(&mut self, response: &RegisterResponse) -> Result<()> {
        self.in_flight = false;
        // Service-Route is authoritative on every 2xx: absent means cleared
        self.service_route = response.service_route.clone();
        self.all_contacts = response.contacts.clone();
        let expiry = self.response_expiry(response);

        match self.state {
            SessionState::Removing => {
                debug!(aor = %self.aor, "removal confirmed by registrar");
                self.handler.on_removed(&self.aor, Some(response));
                if self.end_when_done {
                    if self.queued.take().is_some() {
                        warn!(aor = %self.aor, "discarding queued modification on teardown");
                    }
                    self.ended = true;
                    return Ok(());
                }
                self.state = SessionState::Registered;
            }
            _ => {
                debug!(aor = %self.aor, from = %self.state, "registration established");
                self.state = SessionState::Registered;
                self.handler.on_success(&self.aor, response);
            }
        }

        if !self.my_contacts.is_empty() {
            let expiry = expiry.ok_or_else(|| {
                RegistrationError::ProtocolViolation(
                    "2xx REGISTER response carries no expiry".to_string(),
                )
            })?;
            if expiry > 0 {
                self.timer_seq += 1;
                let delay = refresh_delay(expiry);
                trace!(aor = %self.aor, expiry, delay, seq = self.timer_seq, "scheduling refresh");
                self.timers
                    .schedule(TimerKind::Refresh, Duration::from_secs(delay.into()), self.timer_seq);
            }
        }

        if let Some(queued) = self.queued.take() {
            debug!(aor = %self.aor, "promoting queued modification");
            self.state = queued.target;
            self.send_request(queued.request)?;
        }
        Ok(())
    }

    /// Authoritative registration lifetime from a 2xx response.
    ///
    /// Prefers the minimum expiry among contacts recognized as ours; when
    /// nothing correlates (a proxy that neither echoes our token nor our
    /// exact URI), falls back to the minimum among all expiry-bearing
    /// contacts, then to the top-level Expires header.
    fn response_expiry(&self, response: &RegisterResponse) -> Option<u32> {
        let mut ours: Option<u32> = None;
        let mut any: Option<u32> = None;
        for contact in &response.contacts {
            let Some(expires) = contact.expires else {
                continue;
            };
            any = Some(any.map_or(expires, |e| e.min(expires)));
            if self.is_own_contact(&contact.uri) {
                ours = Some(ours.map_or(expires, |e| e.min(expires)));
            }
        }
        ours.or(any).or(response.expires)
    }

    fn is_own_contact(&self, uri: &SipUri) -> bool {
        uri.parameter_value(CORRELATION_PARAM) == Some(self.corr_token.as_str())
            || self.my_contacts.iter().any(|c| c.uri.matches(uri))
    }

    fn handle_failure(&mut self, response: &RegisterResponse) -> Result<()> {
        self.in_flight = false;
        let retryable = matches!(
            self.state,
            SessionState::AddingOrQuerying | SessionState::Refreshing
        ) && !self.end_when_done;

        if retryable {
            match response.status {
                423 => {
                    if let Some(min_expires) = response.min_expires {
                        // resend once with the registrar's minimum; a repeat
                        // 423 at the same value falls through to failure
                        if min_expires <= self.config.max_registration_expires
                            && self.request.expires != Some(min_expires)
                        {
                            debug!(aor = %self.aor, min_expires, "interval too short, resending");
                            self.request.expires = Some(min_expires);
                            for contact in &mut self.request.contacts {
                                if contact.expires.is_some() {
                                    contact.expires = Some(min_expires);
                                }
                            }
                            let request = self.request.clone();
                            return self.send_request(request);
                        }
                    }
                }
                408 => match self.handler.on_request_timeout(&self.aor) {
                    TimeoutAction::RetryNow => {
                        debug!(aor = %self.aor, "request timed out, retrying immediately");
                        let request = self.request.clone();
                        return self.send_request(request);
                    }
                    TimeoutAction::RetryAfter(delay) => {
                        self.enter_retry(delay);
                        return Ok(());
                    }
                    TimeoutAction::Fail => {
                        self.fail_and_discard(Some(response));
                        return Ok(());
                    }
                },
                _ => {}
            }

            if let Some(default_delay) = self.config.retry_interval {
                let delay = response
                    .retry_after
                    .map(|secs| Duration::from_secs(secs.into()))
                    .unwrap_or(default_delay);
                self.enter_retry(delay);
                return Ok(());
            }
        }

        self.fail_and_discard(Some(response));
        Ok(())
    }

    fn enter_retry(&mut self, delay: Duration) {
        self.state = match self.state {
            SessionState::Refreshing => SessionState::RetryRefreshing,
            _ => SessionState::RetryAdding,
        };
        self.timer_seq += 1;
        debug!(aor = %self.aor, state = %self.state, ?delay, seq = self.timer_seq, "scheduling retry");
        self.timers.schedule(TimerKind::Retry, delay, self.timer_seq);
    }

    fn handle_refresh_timer(&mut self) -> Result<()> {
        if self.state != SessionState::Registered || self.my_contacts.is_empty() {
            return Ok(());
        }
        debug!(aor = %self.aor, "refresh timer fired");
        self.refresh()
    }

    fn refresh(&mut self) -> Result<()> {
        let request = self.snapshot(self.my_contacts.clone(), false);
        self.state = SessionState::Refreshing;
        self.send_request(request)
    }

    fn handle_retry_timer(&mut self) -> Result<()> {
        let next = match self.state {
            SessionState::RetryAdding => SessionState::AddingOrQuerying,
            SessionState::RetryRefreshing => SessionState::Refreshing,
            _ => return Ok(()),
        };
        debug!(aor = %self.aor, state = %next, "retry timer fired, resending");
        self.state = next;
        let request = self.request.clone();
        self.send_request(request)
    }

    /// Final failure path: notify the application and mark the session
    /// unusable. When the session was tearing down, removal completion is
    /// signaled as well so the owner does not wait for it.
    fn fail_and_discard(&mut self, response: Option<&RegisterResponse>) {
        let ending = self.end_when_done || self.state == SessionState::Removing;
        self.handler.on_failure(&self.aor, response);
        if ending {
            self.handler.on_removed(&self.aor, response);
        }
        self.queued = None;
        self.in_flight = false;
        self.ended = true;
    }
}

/// Refresh a bit ahead of the registrar's expiry so the re-REGISTER lands
/// before the binding lapses.
fn refresh_delay(expiry: u32) -> u32 {
    let shortened = expiry - expiry / 10;
    if shortened == expiry {
        expiry.saturating_sub(1).max(1)
    } else {
        shortened
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;

    use crate::error::TransportError;

    #[derive(Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<RegisterRequest>>,
    }

    impl MessageTransport for RecordingTransport {
        fn send(&self, request: &RegisterRequest) -> std::result::Result<(), TransportError> {
            self.sent.lock().push(request.clone());
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingTimers {
        scheduled: Mutex<Vec<(TimerKind, Duration, u64)>>,
    }

    impl TimerService for RecordingTimers {
        fn schedule(&self, kind: TimerKind, delay: Duration, seq: u64) {
            self.scheduled.lock().push((kind, delay, seq));
        }
    }

    #[derive(Default)]
    struct RecordingHandler {
        events: Mutex<Vec<String>>,
    }

    impl RegistrationHandler for RecordingHandler {
        fn on_success(&self, _aor: &Aor, _response: &RegisterResponse) {
            self.events.lock().push("success".into());
        }
        fn on_failure(&self, _aor: &Aor, _response: Option<&RegisterResponse>) {
            self.events.lock().push("failure".into());
        }
        fn on_removed(&self, _aor: &Aor, _response: Option<&RegisterResponse>) {
            self.events.lock().push("removed".into());
        }
    }

    struct Fixture {
        transport: Arc<RecordingTransport>,
        timers: Arc<RecordingTimers>,
        handler: Arc<RecordingHandler>,
        session: ClientRegistrationSession,
    }

    fn fixture(config: RegistrationConfig) -> Fixture {
        let transport = Arc::new(RecordingTransport::default());
        let timers = Arc::new(RecordingTimers::default());
        let handler = Arc::new(RecordingHandler::default());
        let session = ClientRegistrationSession::new(
            "sip:alice@example.com".parse().unwrap(),
            None,
            config,
            transport.clone(),
            timers.clone(),
            handler.clone(),
        );
        Fixture {
            transport,
            timers,
            handler,
            session,
        }
    }

    fn contact() -> ContactHeader {
        ContactHeader::new("sip:alice@192.168.1.10:5060".parse().unwrap())
    }

    fn ok_response(session: &ClientRegistrationSession, expires: u32) -> RegisterResponse {
        let sent = session.request.clone();
        let mut response = RegisterResponse::new(200, sent.cseq);
        for c in sent.contacts {
            response = response.with_contact(ContactHeader { expires: Some(expires), ..c });
        }
        response
    }

    #[test]
    fn add_binding_sends_and_success_registers() {
        let mut f = fixture(RegistrationConfig::new());
        f.session.add_binding(contact()).unwrap();
        assert_eq!(f.session.state(), SessionState::AddingOrQuerying);
        assert_eq!(f.transport.sent.lock().len(), 1);

        let response = ok_response(&f.session, 3600);
        f.session.dispatch_response(response);
        assert_eq!(f.session.state(), SessionState::Registered);
        assert_eq!(f.handler.events.lock().as_slice(), ["success"]);

        // refresh scheduled ahead of expiry with the current sequence
        let scheduled = f.timers.scheduled.lock();
        assert_eq!(scheduled.len(), 1);
        let (kind, delay, seq) = scheduled[0];
        assert_eq!(kind, TimerKind::Refresh);
        assert_eq!(delay, Duration::from_secs(3240));
        assert_eq!(seq, 1);
    }

    #[test]
    fn second_queued_modification_is_rejected() {
        let mut f = fixture(RegistrationConfig::new());
        f.session.add_binding(contact()).unwrap();

        // in flight: the next two modifications queue, then reject
        let second = ContactHeader::new("sip:alice@10.0.0.2".parse().unwrap());
        let third = ContactHeader::new("sip:alice@10.0.0.3".parse().unwrap());
        f.session.add_binding(second).unwrap();
        let err = f.session.add_binding(third).unwrap_err();
        assert!(matches!(err, RegistrationError::ModificationPending(_)));
        assert_eq!(f.transport.sent.lock().len(), 1);
    }

    #[test]
    fn queued_modification_is_promoted_after_success() {
        let mut f = fixture(RegistrationConfig::new());
        f.session.add_binding(contact()).unwrap();
        let second = ContactHeader::new("sip:alice@10.0.0.2".parse().unwrap());
        f.session.add_binding(second).unwrap();

        let response = ok_response(&f.session, 600);
        f.session.dispatch_response(response);
        // promoted request went out with a bumped CSeq
        let sent = f.transport.sent.lock();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1].cseq, 2);
        assert_eq!(sent[1].contacts.len(), 2);
        assert_eq!(f.session.state(), SessionState::AddingOrQuerying);
    }

    #[test]
    fn interval_too_short_resends_with_min_expires() {
        let mut f = fixture(
            RegistrationConfig::new()
                .with_expires(600)
                .with_max_registration_expires(7200),
        );
        f.session.add_binding(contact()).unwrap();

        let response = RegisterResponse::new(423, f.session.cseq).with_min_expires(3600);
        f.session.dispatch_response(response);

        let sent = f.transport.sent.lock();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1].expires, Some(3600));
        drop(sent);
        // no state change, no handler event
        assert_eq!(f.session.state(), SessionState::AddingOrQuerying);
        assert!(f.handler.events.lock().is_empty());
    }

    #[test]
    fn repeated_interval_too_short_at_same_value_fails() {
        let mut f = fixture(
            RegistrationConfig::new()
                .with_expires(600)
                .with_max_registration_expires(7200),
        );
        f.session.add_binding(contact()).unwrap();

        f.session
            .dispatch_response(RegisterResponse::new(423, f.session.cseq).with_min_expires(3600));
        assert!(!f.session.is_ended());
        // registrar keeps demanding the value we already sent
        f.session
            .dispatch_response(RegisterResponse::new(423, f.session.cseq).with_min_expires(3600));
        assert!(f.session.is_ended());
        assert_eq!(f.handler.events.lock().as_slice(), ["failure"]);
    }

    #[test]
    fn interval_too_short_beyond_max_fails() {
        let mut f = fixture(RegistrationConfig::new().with_max_registration_expires(7200));
        f.session.add_binding(contact()).unwrap();

        let response = RegisterResponse::new(423, f.session.cseq).with_min_expires(10000);
        f.session.dispatch_response(response);

        assert!(f.session.is_ended());
        assert_eq!(f.handler.events.lock().as_slice(), ["failure"]);
    }

    #[test]
    fn refresh_timer_with_matching_seq_refreshes() {
        let mut f = fixture(RegistrationConfig::new());
        f.session.add_binding(contact()).unwrap();
        let response = ok_response(&f.session, 3600);
        f.session.dispatch_response(response);
        let cseq_before = f.session.cseq;

        f.session.dispatch_timer(TimerKind::Refresh, f.session.timer_seq);
        assert_eq!(f.session.state(), SessionState::Refreshing);
        assert_eq!(f.session.cseq, cseq_before + 1);
    }

    #[test]
    fn stale_timer_is_ignored() {
        let mut f = fixture(RegistrationConfig::new());
        f.session.add_binding(contact()).unwrap();
        let response = ok_response(&f.session, 3600);
        f.session.dispatch_response(response);

        f.session.dispatch_timer(TimerKind::Refresh, f.session.timer_seq + 1);
        f.session.dispatch_timer(TimerKind::Retry, f.session.timer_seq.wrapping_sub(1));
        assert_eq!(f.session.state(), SessionState::Registered);
        assert_eq!(f.transport.sent.lock().len(), 1);
    }

    #[test]
    fn failure_without_retry_interval_discards_session() {
        let mut f = fixture(RegistrationConfig::new());
        f.session.add_binding(contact()).unwrap();

        f.session.dispatch_response(RegisterResponse::new(503, f.session.cseq));
        assert!(f.session.is_ended());
        assert_eq!(f.handler.events.lock().as_slice(), ["failure"]);
        assert!(f.session.add_binding(contact()).is_err());
    }

    #[test]
    fn failure_with_retry_interval_schedules_retry() {
        let mut f =
            fixture(RegistrationConfig::new().with_retry_interval(Duration::from_secs(30)));
        f.session.add_binding(contact()).unwrap();

        f.session.dispatch_response(RegisterResponse::new(503, f.session.cseq));
        assert_eq!(f.session.state(), SessionState::RetryAdding);
        let (kind, delay, seq) = f.timers.scheduled.lock()[0];
        assert_eq!(kind, TimerKind::Retry);
        assert_eq!(delay, Duration::from_secs(30));

        // the retry timer resends the stored request
        f.session.dispatch_timer(TimerKind::Retry, seq);
        assert_eq!(f.session.state(), SessionState::AddingOrQuerying);
        assert_eq!(f.transport.sent.lock().len(), 2);
    }

    #[test]
    fn retry_after_header_overrides_configured_interval() {
        let mut f =
            fixture(RegistrationConfig::new().with_retry_interval(Duration::from_secs(30)));
        f.session.add_binding(contact()).unwrap();

        let response = RegisterResponse::new(503, f.session.cseq).with_retry_after(120);
        f.session.dispatch_response(response);
        let (_, delay, _) = f.timers.scheduled.lock()[0];
        assert_eq!(delay, Duration::from_secs(120));
    }

    #[test]
    fn modification_during_retry_jumps_the_queue() {
        let mut f =
            fixture(RegistrationConfig::new().with_retry_interval(Duration::from_secs(30)));
        f.session.add_binding(contact()).unwrap();
        f.session.dispatch_response(RegisterResponse::new(503, f.session.cseq));
        assert_eq!(f.session.state(), SessionState::RetryAdding);
        let stale_seq = f.timers.scheduled.lock()[0].2;

        let second = ContactHeader::new("sip:alice@10.0.0.2".parse().unwrap());
        f.session.add_binding(second).unwrap();
        assert_eq!(f.session.state(), SessionState::AddingOrQuerying);
        assert_eq!(f.transport.sent.lock().len(), 2);

        // the pending retry firing is now inert
        f.session.dispatch_timer(TimerKind::Retry, stale_seq);
        assert_eq!(f.transport.sent.lock().len(), 2);
    }

    #[test]
    fn remove_all_with_stop_tears_down() {
        let mut f = fixture(RegistrationConfig::new());
        f.session.add_binding(contact()).unwrap();
        f.session.dispatch_response(ok_response(&f.session, 3600));

        f.session.remove_all(true).unwrap();
        assert_eq!(f.session.state(), SessionState::Removing);
        let sent = f.transport.sent.lock();
        assert!(sent[1].wildcard);
        assert_eq!(sent[1].expires, Some(0));
        drop(sent);

        f.session.dispatch_response(RegisterResponse::new(200, f.session.cseq));
        assert!(f.session.is_ended());
        assert_eq!(
            f.handler.events.lock().as_slice(),
            ["success", "removed"]
        );
    }

    #[test]
    fn remove_unknown_binding_errors() {
        let mut f = fixture(RegistrationConfig::new());
        f.session.add_binding(contact()).unwrap();
        let unknown: SipUri = "sip:alice@somewhere.else".parse().unwrap();
        let err = f.session.remove_binding(&unknown).unwrap_err();
        assert!(matches!(err, RegistrationError::NoSuchBinding(_)));
    }

    #[test]
    fn refresh_requires_registered_state() {
        let mut f = fixture(RegistrationConfig::new());
        f.session.add_binding(contact()).unwrap();
        let err = f.session.request_refresh(None).unwrap_err();
        assert!(matches!(err, RegistrationError::NotRegistered(_)));
    }

    #[test]
    fn connection_lost_reports_failure_without_response() {
        let mut f = fixture(RegistrationConfig::new());
        f.session.add_binding(contact()).unwrap();
        f.session.connection_lost();
        assert!(f.session.is_ended());
        assert_eq!(f.handler.events.lock().as_slice(), ["failure"]);
    }

    #[test]
    fn success_without_any_expiry_is_a_protocol_violation() {
        let mut f = fixture(RegistrationConfig::new());
        f.session.add_binding(contact()).unwrap();
        // 200 with neither per-contact nor top-level expiry
        f.session.dispatch_response(RegisterResponse::new(200, f.session.cseq));
        assert!(f.session.is_ended());
        assert!(f
            .handler
            .events
            .lock()
            .iter()
            .any(|e| e == "failure"));
    }

    #[test]
    fn stale_response_cseq_is_ignored() {
        let mut f = fixture(RegistrationConfig::new());
        f.session.add_binding(contact()).unwrap();
        f.session.dispatch_response(RegisterResponse::new(503, f.session.cseq + 5));
        assert!(!f.session.is_ended());
        assert_eq!(f.session.state(), SessionState::AddingOrQuerying);
    }

    #[test]
    fn refresh_delay_is_shorter_than_expiry() {
        assert_eq!(refresh_delay(3600), 3240);
        assert_eq!(refresh_delay(100), 90);
        assert_eq!(refresh_delay(10), 9);
        assert_eq!(refresh_delay(5), 4);
        assert_eq!(refresh_delay(1), 1);
    }
}
