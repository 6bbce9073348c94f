//! The native [`Environment`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use protocol::{
    Environment, LegacyConnection, RequestConnection, SocketConnection, TransportFault,
};
use url::Url;

use crate::errors::HostError;
use crate::http::{HttpClients, HttpConnection};
use crate::websocket::WebSocketConnection;

/// User agent sent when none is configured.
pub const DEFAULT_USER_AGENT: &str = concat!("relay/", env!("CARGO_PKG_VERSION"));

/// Location used for same-origin checks when none is configured.
pub const DEFAULT_LOCATION: &str = "http://localhost/";

/// Shared reachability flag. Clones observe and flip the same flag.
#[derive(Debug, Clone)]
pub struct Reachability(Arc<AtomicBool>);

impl Reachability {
    /// A flag starting at `online`.
    pub fn new(online: bool) -> Self {
        Self(Arc::new(AtomicBool::new(online)))
    }

    /// Current value.
    pub fn is_online(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Updates the flag. Dispatches waiting on a retry pick it up when their
    /// timer fires.
    pub fn set_online(&self, online: bool) {
        let previous = self.0.swap(online, Ordering::SeqCst);
        if previous != online {
            tracing::info!(online, "reachability changed");
        }
    }
}

impl Default for Reachability {
    fn default() -> Self {
        Self::new(true)
    }
}

/// Environment backed by reqwest (request/response) and tokio-tungstenite
/// (sockets). There is no legacy cross-domain primitive on a native host.
#[derive(Debug, Clone)]
pub struct NativeEnvironment {
    clients: HttpClients,
    user_agent: String,
    location: Url,
    reachability: Reachability,
}

impl NativeEnvironment {
    /// Builds an environment identifying itself as `user_agent` and issuing
    /// requests from `location`.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::InvalidLocation`] if `location` does not parse and
    /// [`HostError::Client`] if the HTTP client cannot be built.
    pub fn new(user_agent: impl Into<String>, location: &str) -> Result<Self, HostError> {
        let user_agent = user_agent.into();
        let location = Url::parse(location).map_err(|source| HostError::InvalidLocation {
            location: location.to_owned(),
            source,
        })?;
        let clients = HttpClients::new(&user_agent)?;
        Ok(Self {
            clients,
            user_agent,
            location,
            reachability: Reachability::default(),
        })
    }

    /// Uses `reachability` as the online flag instead of a private one.
    pub fn with_reachability(mut self, reachability: Reachability) -> Self {
        self.reachability = reachability;
        self
    }

    /// Cookies shared by every request/response connection of this host.
    pub fn cookies(&self) -> &Arc<reqwest::cookie::Jar> {
        self.clients.cookies()
    }

    /// The online flag, for the embedding application to drive.
    pub fn reachability(&self) -> &Reachability {
        &self.reachability
    }
}

impl Environment for NativeEnvironment {
    fn is_online(&self) -> bool {
        self.reachability.is_online()
    }

    fn user_agent(&self) -> &str {
        &self.user_agent
    }

    fn location(&self) -> &Url {
        &self.location
    }

    fn request_connection(&self) -> Result<Box<dyn RequestConnection>, TransportFault> {
        Ok(Box::new(HttpConnection::new(
            self.clients.clone(),
            self.location.clone(),
        )))
    }

    fn has_legacy_transport(&self) -> bool {
        false
    }

    fn legacy_connection(&self) -> Option<Box<dyn LegacyConnection>> {
        None
    }

    fn socket_connection(&self, url: &Url) -> Result<Box<dyn SocketConnection>, TransportFault> {
        match url.scheme() {
            "ws" | "wss" => Ok(Box::new(WebSocketConnection::connect(url.clone()))),
            other => Err(TransportFault::Failed(format!(
                "'{other}' is not a socket scheme"
            ))),
        }
    }
}
