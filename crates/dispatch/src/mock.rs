//! Scripted environment for testing.
//!
//! Provides deterministic native transports whose replies are fixed up front
//! and whose every call is written to a shared [`Journal`], so tests can
//! assert both what the caller received and what went over the "wire".
//! Compiled only for tests and under the `test-util` feature.
//!
//! # Example
//!
//! ```
//! use dispatch::mock::{RequestScript, ScriptedEnvironment};
//!
//! let env = ScriptedEnvironment::new()
//!     .with_request(RequestScript::reply(200, r#"{"a":1}"#));
//! env.set_online(false);
//! assert_eq!(env.journal().connections_opened(), 0);
//! ```

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use protocol::{
    Environment, LegacyConnection, LegacyEvent, ReadyState, RequestConnection, RequestEvent,
    SocketConnection, SocketEvent, SocketFrame, TransportFault, Verb,
};
use url::Url;

/// A user agent that identifies a legacy-only client.
pub const LEGACY_USER_AGENT: &str =
    "Mozilla/4.0 (compatible; MSIE 8.0; Windows NT 6.1; Trident/4.0)";

/// A user agent for a modern client.
pub const MODERN_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0";

/// Where a fresh [`ScriptedEnvironment`] is located.
pub const DEFAULT_LOCATION: &str = "https://app.example/";

// ---------------------------------------------------------------------------
// Scripts
// ---------------------------------------------------------------------------

/// How the request/response primitive behaves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestScript {
    /// Completes with a status, body and response headers.
    Reply {
        /// HTTP status.
        status: u16,
        /// Response body.
        body: String,
        /// Response headers.
        headers: BTreeMap<String, String>,
    },
    /// Raises a network error after `send`.
    Fail(String),
    /// Reports a timeout after `send`.
    TimeOut,
    /// Rejects `open`.
    RejectOpen(String),
}

impl RequestScript {
    /// A reply without response headers.
    pub fn reply(status: u16, body: impl Into<String>) -> Self {
        Self::Reply {
            status,
            body: body.into(),
            headers: BTreeMap::new(),
        }
    }

    /// Adds a response header to a [`RequestScript::Reply`].
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let Self::Reply { headers, .. } = &mut self {
            headers.insert(name.to_owned(), value.to_owned());
        }
        self
    }
}

/// How the legacy cross-domain primitive behaves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LegacyScript {
    /// Loads with this body.
    Load(String),
    /// Raises an error.
    Error(String),
    /// Reports a timeout.
    TimeOut,
}

/// How the socket primitive behaves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketScript {
    /// Events raised after the connection is constructed, in order.
    pub events: Vec<SocketEvent>,
    /// When set, `send` fails with this detail.
    pub send_fault: Option<String>,
    /// When set, the connection goes quiet instead of ending once the
    /// events run out.
    pub stall: bool,
}

impl SocketScript {
    /// Opens, answers with `reply`, then closes.
    pub fn echo(reply: impl Into<String>) -> Self {
        Self {
            events: vec![
                SocketEvent::Open,
                SocketEvent::Message(SocketFrame::Text(reply.into())),
                SocketEvent::Closed,
            ],
            send_fault: None,
            stall: false,
        }
    }

    /// Raises exactly these events.
    pub fn events(events: Vec<SocketEvent>) -> Self {
        Self {
            events,
            send_fault: None,
            stall: false,
        }
    }

    /// Opens and then never answers.
    pub fn silent() -> Self {
        Self {
            events: vec![SocketEvent::Open],
            send_fault: None,
            stall: true,
        }
    }

    /// Makes `send` fail.
    pub fn with_send_fault(mut self, detail: impl Into<String>) -> Self {
        self.send_fault = Some(detail.into());
        self
    }
}

// ---------------------------------------------------------------------------
// Journal
// ---------------------------------------------------------------------------

/// A request/response call as the primitive saw it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    /// Method passed to `open`.
    pub verb: Verb,
    /// URL passed to `open`.
    pub url: Url,
    /// Asynchronous flag passed to `open`.
    pub asynchronous: bool,
    /// Headers set before `send`.
    pub headers: BTreeMap<String, String>,
    /// Credential flag at `send` time.
    pub with_credentials: bool,
    /// Timeout at `send` time.
    pub timeout: Option<Duration>,
    /// Body passed to `send`.
    pub body: Option<Vec<u8>>,
}

impl RecordedRequest {
    /// Body as UTF-8 text.
    pub fn body_text(&self) -> Option<String> {
        self.body
            .as_ref()
            .map(|b| String::from_utf8_lossy(b).into_owned())
    }
}

/// A legacy call as the primitive saw it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedLegacy {
    /// Method passed to `open`.
    pub verb: Verb,
    /// URL passed to `open`.
    pub url: Url,
    /// Body passed to `send`.
    pub body: Option<String>,
    /// Timeout at `send` time.
    pub timeout: Option<Duration>,
}

/// A socket conversation as the primitive saw it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedSocket {
    /// Destination.
    pub url: Url,
    /// Frames written.
    pub sent: Vec<SocketFrame>,
    /// Whether `close` completed.
    pub closed: bool,
}

/// Everything the scripted primitives were asked to do.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Journal {
    /// Sent request/response calls.
    pub requests: Vec<RecordedRequest>,
    /// Sent legacy calls.
    pub legacy: Vec<RecordedLegacy>,
    /// Socket conversations.
    pub sockets: Vec<RecordedSocket>,
    /// Connections constructed, of any kind.
    pub constructed: usize,
}

impl Journal {
    /// Connections constructed so far.
    pub fn connections_opened(&self) -> usize {
        self.constructed
    }
}

type SharedJournal = Arc<Mutex<Journal>>;

fn lock(journal: &SharedJournal) -> MutexGuard<'_, Journal> {
    match journal.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

// ---------------------------------------------------------------------------
// Environment
// ---------------------------------------------------------------------------

/// A deterministic [`Environment`].
///
/// Starts online, with a modern user agent, located at
/// `https://app.example/`, answering every request/response call with
/// `200 OK` and an empty body, with no legacy constructor, and with a socket
/// that opens, answers `""` and closes.
#[derive(Debug)]
pub struct ScriptedEnvironment {
    online: AtomicBool,
    user_agent: String,
    location: Url,
    request: RequestScript,
    legacy: Option<LegacyScript>,
    socket: SocketScript,
    journal: SharedJournal,
}

impl Default for ScriptedEnvironment {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedEnvironment {
    /// Creates the default scripted environment.
    pub fn new() -> Self {
        Self {
            online: AtomicBool::new(true),
            user_agent: MODERN_USER_AGENT.to_owned(),
            location: Url::parse(DEFAULT_LOCATION).expect("default location is a valid URL"),
            request: RequestScript::reply(200, ""),
            legacy: None,
            socket: SocketScript::echo(""),
            journal: SharedJournal::default(),
        }
    }

    /// Sets the user agent.
    pub fn with_user_agent(mut self, user_agent: &str) -> Self {
        self.user_agent = user_agent.to_owned();
        self
    }

    /// Sets the current location.
    ///
    /// # Panics
    ///
    /// Panics if `location` is not an absolute URL.
    pub fn with_location(mut self, location: &str) -> Self {
        self.location = Url::parse(location).expect("scripted location must be a valid URL");
        self
    }

    /// Scripts the request/response primitive.
    pub fn with_request(mut self, script: RequestScript) -> Self {
        self.request = script;
        self
    }

    /// Installs a legacy constructor following `script`.
    pub fn with_legacy(mut self, script: LegacyScript) -> Self {
        self.legacy = Some(script);
        self
    }

    /// Scripts the socket primitive.
    pub fn with_socket(mut self, script: SocketScript) -> Self {
        self.socket = script;
        self
    }

    /// Flips the reachability flag.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Snapshot of the journal.
    pub fn journal(&self) -> Journal {
        lock(&self.journal).clone()
    }

    fn constructed(&self) {
        lock(&self.journal).constructed += 1;
    }
}

impl Environment for ScriptedEnvironment {
    fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    fn user_agent(&self) -> &str {
        &self.user_agent
    }

    fn location(&self) -> &Url {
        &self.location
    }

    fn request_connection(&self) -> Result<Box<dyn RequestConnection>, TransportFault> {
        self.constructed();
        Ok(Box::new(ScriptedRequest {
            script: self.request.clone(),
            journal: Arc::clone(&self.journal),
            record: None,
            events: VecDeque::new(),
            status: 0,
            body: String::new(),
            headers: BTreeMap::new(),
        }))
    }

    fn has_legacy_transport(&self) -> bool {
        self.legacy.is_some()
    }

    fn legacy_connection(&self) -> Option<Box<dyn LegacyConnection>> {
        let script = self.legacy.clone()?;
        self.constructed();
        Some(Box::new(ScriptedLegacy {
            script,
            journal: Arc::clone(&self.journal),
            opened: None,
            timeout: None,
            events: VecDeque::new(),
        }))
    }

    fn socket_connection(&self, url: &Url) -> Result<Box<dyn SocketConnection>, TransportFault> {
        self.constructed();
        let index = {
            let mut journal = lock(&self.journal);
            journal.sockets.push(RecordedSocket {
                url: url.clone(),
                sent: Vec::new(),
                closed: false,
            });
            journal.sockets.len() - 1
        };
        Ok(Box::new(ScriptedSocket {
            events: self.socket.events.iter().cloned().collect(),
            send_fault: self.socket.send_fault.clone(),
            stall: self.socket.stall,
            journal: Arc::clone(&self.journal),
            index,
        }))
    }
}

// ---------------------------------------------------------------------------
// Primitives
// ---------------------------------------------------------------------------

struct ScriptedRequest {
    script: RequestScript,
    journal: SharedJournal,
    record: Option<RecordedRequest>,
    events: VecDeque<RequestEvent>,
    status: u16,
    body: String,
    headers: BTreeMap<String, String>,
}

#[async_trait]
impl RequestConnection for ScriptedRequest {
    fn open(&mut self, verb: Verb, url: &Url, asynchronous: bool) -> Result<(), TransportFault> {
        if let RequestScript::RejectOpen(detail) = &self.script {
            return Err(TransportFault::Failed(detail.clone()));
        }
        self.record = Some(RecordedRequest {
            verb,
            url: url.clone(),
            asynchronous,
            headers: BTreeMap::new(),
            with_credentials: false,
            timeout: None,
            body: None,
        });
        Ok(())
    }

    fn set_header(&mut self, name: &str, value: &str) -> Result<(), TransportFault> {
        let record = self
            .record
            .as_mut()
            .ok_or_else(|| TransportFault::Failed("set_header before open".into()))?;
        record.headers.insert(name.to_owned(), value.to_owned());
        Ok(())
    }

    fn set_with_credentials(&mut self, enabled: bool) {
        if let Some(record) = self.record.as_mut() {
            record.with_credentials = enabled;
        }
    }

    fn set_timeout(&mut self, timeout: Duration) {
        if let Some(record) = self.record.as_mut() {
            record.timeout = Some(timeout);
        }
    }

    fn send(&mut self, body: Option<Vec<u8>>) -> Result<(), TransportFault> {
        let mut record = self
            .record
            .take()
            .ok_or_else(|| TransportFault::Failed("send before open".into()))?;
        record.body = body;
        lock(&self.journal).requests.push(record);

        match &self.script {
            RequestScript::Reply {
                status,
                body,
                headers,
            } => {
                self.status = *status;
                self.body = body.clone();
                self.headers = headers.clone();
                self.events.extend([
                    RequestEvent::StateChanged(ReadyState::HeadersReceived),
                    RequestEvent::StateChanged(ReadyState::Loading),
                    RequestEvent::StateChanged(ReadyState::Done),
                ]);
            }
            RequestScript::Fail(detail) => self.events.push_back(RequestEvent::Error(detail.clone())),
            RequestScript::TimeOut => self.events.push_back(RequestEvent::TimedOut),
            RequestScript::RejectOpen(_) => {}
        }
        Ok(())
    }

    async fn next_event(&mut self) -> Option<RequestEvent> {
        self.events.pop_front()
    }

    fn status(&self) -> u16 {
        self.status
    }

    fn response_text(&self) -> String {
        self.body.clone()
    }

    fn response_header(&self, name: &str) -> Option<String> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.clone())
    }
}

struct ScriptedLegacy {
    script: LegacyScript,
    journal: SharedJournal,
    opened: Option<(Verb, Url)>,
    timeout: Option<Duration>,
    events: VecDeque<LegacyEvent>,
}

#[async_trait]
impl LegacyConnection for ScriptedLegacy {
    fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = Some(timeout);
    }

    fn open(&mut self, verb: Verb, url: &Url) -> Result<(), TransportFault> {
        if !matches!(verb, Verb::Get | Verb::Post) {
            return Err(TransportFault::Failed(format!("{verb} is not supported")));
        }
        self.opened = Some((verb, url.clone()));
        Ok(())
    }

    fn send(&mut self, body: Option<String>) -> Result<(), TransportFault> {
        let (verb, url) = self
            .opened
            .take()
            .ok_or_else(|| TransportFault::Failed("send before open".into()))?;
        lock(&self.journal).legacy.push(RecordedLegacy {
            verb,
            url,
            body,
            timeout: self.timeout,
        });
        match &self.script {
            LegacyScript::Load(body) => self
                .events
                .extend([LegacyEvent::Progress, LegacyEvent::Load(body.clone())]),
            LegacyScript::Error(detail) => self.events.push_back(LegacyEvent::Error(detail.clone())),
            LegacyScript::TimeOut => self.events.push_back(LegacyEvent::TimedOut),
        }
        Ok(())
    }

    async fn next_event(&mut self) -> Option<LegacyEvent> {
        self.events.pop_front()
    }
}

struct ScriptedSocket {
    events: VecDeque<SocketEvent>,
    send_fault: Option<String>,
    stall: bool,
    journal: SharedJournal,
    index: usize,
}

#[async_trait]
impl SocketConnection for ScriptedSocket {
    async fn send(&mut self, frame: SocketFrame) -> Result<(), TransportFault> {
        if let Some(detail) = &self.send_fault {
            return Err(TransportFault::Failed(detail.clone()));
        }
        if let Some(record) = lock(&self.journal).sockets.get_mut(self.index) {
            record.sent.push(frame);
        }
        Ok(())
    }

    async fn next_event(&mut self) -> Option<SocketEvent> {
        match self.events.pop_front() {
            Some(event) => Some(event),
            None if self.stall => std::future::pending().await,
            None => None,
        }
    }

    async fn close(&mut self) {
        self.events.clear();
        self.stall = false;
        if let Some(record) = lock(&self.journal).sockets.get_mut(self.index) {
            record.closed = true;
        }
    }
}
