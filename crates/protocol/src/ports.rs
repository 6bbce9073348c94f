//! Port traits supplied by the execution environment.
//!
//! The dispatch core never touches a network API directly. Everything it
//! needs from the outside world comes through [`Environment`]: the online
//! flag, the client identity, the current location, and constructors for the
//! three native transport primitives. Each primitive exposes its native
//! callbacks as an async event source (`next_event`) that adapters consume
//! one event at a time.
//!
//! Implementations:
//! - `host::NativeEnvironment`: reqwest and tokio-tungstenite backed.
//! - `dispatch::mock::ScriptedEnvironment`: deterministic, for tests
//!   (`test-util` feature).

use std::time::Duration;

use async_trait::async_trait;
use url::Url;

use crate::descriptor::Verb;
use crate::errors::TransportFault;

// ---------------------------------------------------------------------------
// Environment
// ---------------------------------------------------------------------------

/// The execution environment a dispatcher runs in.
pub trait Environment: Send + Sync + 'static {
    /// Current value of the network-reachability flag. Never cached by callers.
    fn is_online(&self) -> bool;

    /// Client identification string (a browser user agent, or a host label).
    fn user_agent(&self) -> &str;

    /// Location requests are issued from; decides same-origin checks.
    fn location(&self) -> &Url;

    /// Constructs a request/response connection.
    fn request_connection(&self) -> Result<Box<dyn RequestConnection>, TransportFault>;

    /// `true` when the legacy cross-domain constructor exists.
    fn has_legacy_transport(&self) -> bool;

    /// Constructs a legacy cross-domain connection, or `None` when the
    /// constructor is absent.
    fn legacy_connection(&self) -> Option<Box<dyn LegacyConnection>>;

    /// Constructs a socket connection to `url`. The connection starts opening
    /// immediately and reports [`SocketEvent::Open`] once ready.
    fn socket_connection(&self, url: &Url) -> Result<Box<dyn SocketConnection>, TransportFault>;
}

// ---------------------------------------------------------------------------
// Request/response primitive
// ---------------------------------------------------------------------------

/// Ready states of a request/response connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ReadyState {
    /// Created, not opened.
    Unsent,
    /// `open` was called.
    Opened,
    /// Response headers arrived.
    HeadersReceived,
    /// Response body is arriving.
    Loading,
    /// The exchange is complete; status and body are readable.
    Done,
}

/// Events a request/response connection raises after `send`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestEvent {
    /// The ready state changed.
    StateChanged(ReadyState),
    /// A network-level error; no status is available.
    Error(String),
    /// The configured timeout elapsed.
    TimedOut,
}

/// A standard request/response connection.
#[async_trait]
pub trait RequestConnection: Send {
    /// Prepares the request. `asynchronous = false` asks the transport to
    /// complete before `send` returns control to its event source.
    fn open(&mut self, verb: Verb, url: &Url, asynchronous: bool) -> Result<(), TransportFault>;

    /// Adds a request header. Only valid after `open`.
    fn set_header(&mut self, name: &str, value: &str) -> Result<(), TransportFault>;

    /// Sends cookies/credentials on cross-origin requests.
    fn set_with_credentials(&mut self, enabled: bool);

    /// Bounds the whole exchange.
    fn set_timeout(&mut self, timeout: Duration);

    /// Starts the exchange.
    fn send(&mut self, body: Option<Vec<u8>>) -> Result<(), TransportFault>;

    /// Next event; `None` once the connection has nothing more to report.
    async fn next_event(&mut self) -> Option<RequestEvent>;

    /// Response status, meaningful once `Done`.
    fn status(&self) -> u16;

    /// Response body text, meaningful once `Done`.
    fn response_text(&self) -> String;

    /// A response header, meaningful once `HeadersReceived`.
    fn response_header(&self, name: &str) -> Option<String>;
}

// ---------------------------------------------------------------------------
// Legacy cross-domain primitive
// ---------------------------------------------------------------------------

/// Events a legacy cross-domain connection raises.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LegacyEvent {
    /// Data is arriving.
    Progress,
    /// The response completed with this body.
    Load(String),
    /// The request failed.
    Error(String),
    /// The configured timeout elapsed.
    TimedOut,
}

/// A legacy cross-domain connection: GET/POST only, no custom headers,
/// no status code.
#[async_trait]
pub trait LegacyConnection: Send {
    /// Bounds the whole exchange.
    fn set_timeout(&mut self, timeout: Duration);

    /// Prepares the request.
    fn open(&mut self, verb: Verb, url: &Url) -> Result<(), TransportFault>;

    /// Starts the exchange.
    fn send(&mut self, body: Option<String>) -> Result<(), TransportFault>;

    /// Next event; `None` once the connection has nothing more to report.
    async fn next_event(&mut self) -> Option<LegacyEvent>;
}

// ---------------------------------------------------------------------------
// Socket primitive
// ---------------------------------------------------------------------------

/// One socket message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketFrame {
    /// A text message.
    Text(String),
    /// A binary message.
    Binary(Vec<u8>),
}

/// Events a socket connection raises.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    /// The connection is ready to send.
    Open,
    /// A message arrived.
    Message(SocketFrame),
    /// The connection reported an error.
    Error(String),
    /// The connection is closed.
    Closed,
}

/// A persistent socket connection.
#[async_trait]
pub trait SocketConnection: Send {
    /// Writes one message. Only valid after [`SocketEvent::Open`].
    async fn send(&mut self, frame: SocketFrame) -> Result<(), TransportFault>;

    /// Next event; `None` once the connection has nothing more to report.
    async fn next_event(&mut self) -> Option<SocketEvent>;

    /// Closes the connection and waits for the close to complete.
    async fn close(&mut self);
}

// ---------------------------------------------------------------------------
// Origin
// ---------------------------------------------------------------------------

/// `true` when `target` shares scheme, host and port with `location`.
pub fn is_same_origin(location: &Url, target: &Url) -> bool {
    location.origin() == target.origin()
}

/// `true` when a user agent identifies a client whose request/response
/// transport cannot reach cross-origin destinations.
pub fn is_legacy_client(user_agent: &str) -> bool {
    user_agent.to_ascii_lowercase().contains("msie")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn same_origin_compares_scheme_host_and_port() {
        let here = url("https://api.example/app");
        assert!(is_same_origin(&here, &url("https://api.example/resource")));
        assert!(is_same_origin(&here, &url("https://api.example:443/x")));
        assert!(!is_same_origin(&here, &url("http://api.example/resource")));
        assert!(!is_same_origin(&here, &url("https://other.example/resource")));
        assert!(!is_same_origin(&here, &url("https://api.example:8443/resource")));
    }

    #[test]
    fn legacy_client_detection_is_case_insensitive() {
        assert!(is_legacy_client(
            "Mozilla/4.0 (compatible; MSIE 8.0; Windows NT 6.1; Trident/4.0)"
        ));
        assert!(is_legacy_client("msie"));
        assert!(!is_legacy_client(
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36"
        ));
    }
}
