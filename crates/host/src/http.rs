//! Request/response connection over reqwest.
//!
//! The whole HTTP exchange happens on the first `next_event` after `send`;
//! its result is then replayed as ready-state events.
//!
//! Cookies live in one jar per host. Same-origin requests always carry them;
//! cross-origin requests carry them only when credentials are enabled.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use protocol::ports::is_same_origin;
use protocol::{ReadyState, RequestConnection, RequestEvent, TransportFault, Verb};
use reqwest::cookie::Jar;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Method;
use url::Url;

/// The pair of clients a native host sends through.
///
/// Both share one cookie jar, but only `credentialed` reads and writes it.
#[derive(Debug, Clone)]
pub struct HttpClients {
    anonymous: reqwest::Client,
    credentialed: reqwest::Client,
    cookies: Arc<Jar>,
}

impl HttpClients {
    /// Builds both clients, identifying as `user_agent`.
    pub fn new(user_agent: &str) -> Result<Self, reqwest::Error> {
        let cookies = Arc::new(Jar::default());
        let anonymous = reqwest::Client::builder().user_agent(user_agent).build()?;
        let credentialed = reqwest::Client::builder()
            .user_agent(user_agent)
            .cookie_provider(Arc::clone(&cookies))
            .build()?;
        Ok(Self {
            anonymous,
            credentialed,
            cookies,
        })
    }

    /// The shared cookie jar.
    pub fn cookies(&self) -> &Arc<Jar> {
        &self.cookies
    }
}

struct Prepared {
    verb: Verb,
    url: Url,
    headers: HeaderMap,
}

/// A [`RequestConnection`] backed by the host's [`HttpClients`].
pub struct HttpConnection {
    clients: HttpClients,
    location: Url,
    prepared: Option<Prepared>,
    timeout: Option<Duration>,
    with_credentials: bool,
    pending: Option<reqwest::RequestBuilder>,
    events: VecDeque<RequestEvent>,
    status: u16,
    body: String,
    response_headers: HeaderMap,
}

impl HttpConnection {
    /// A fresh connection on `clients`, issued from `location`.
    pub fn new(clients: HttpClients, location: Url) -> Self {
        Self {
            clients,
            location,
            prepared: None,
            timeout: None,
            with_credentials: false,
            pending: None,
            events: VecDeque::new(),
            status: 0,
            body: String::new(),
            response_headers: HeaderMap::new(),
        }
    }

    async fn perform(&mut self, request: reqwest::RequestBuilder) {
        let response = match request.send().await {
            Ok(response) => response,
            Err(error) => {
                self.events.push_back(fault_event(&error));
                return;
            }
        };
        self.status = response.status().as_u16();
        self.response_headers = response.headers().clone();
        self.events
            .push_back(RequestEvent::StateChanged(ReadyState::HeadersReceived));
        self.events
            .push_back(RequestEvent::StateChanged(ReadyState::Loading));

        match response.text().await {
            Ok(body) => {
                self.body = body;
                self.events
                    .push_back(RequestEvent::StateChanged(ReadyState::Done));
            }
            Err(error) => self.events.push_back(fault_event(&error)),
        }
    }
}

fn method(verb: Verb) -> Method {
    match verb {
        Verb::Get => Method::GET,
        Verb::Post => Method::POST,
        Verb::Put => Method::PUT,
        Verb::Delete => Method::DELETE,
    }
}

fn fault_event(error: &reqwest::Error) -> RequestEvent {
    if error.is_timeout() {
        RequestEvent::TimedOut
    } else {
        RequestEvent::Error(error.to_string())
    }
}

#[async_trait]
impl RequestConnection for HttpConnection {
    fn open(&mut self, verb: Verb, url: &Url, asynchronous: bool) -> Result<(), TransportFault> {
        if !asynchronous {
            tracing::trace!("native requests never block the executor; running asynchronously");
        }
        self.prepared = Some(Prepared {
            verb,
            url: url.clone(),
            headers: HeaderMap::new(),
        });
        Ok(())
    }

    fn set_header(&mut self, name: &str, value: &str) -> Result<(), TransportFault> {
        let prepared = self
            .prepared
            .as_mut()
            .ok_or_else(|| TransportFault::Failed("set_header before open".into()))?;
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| TransportFault::Failed(format!("header name '{name}': {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| TransportFault::Failed(format!("header '{name}': {e}")))?;
        prepared.headers.insert(name, value);
        Ok(())
    }

    fn set_with_credentials(&mut self, enabled: bool) {
        self.with_credentials = enabled;
    }

    fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = Some(timeout);
    }

    fn send(&mut self, body: Option<Vec<u8>>) -> Result<(), TransportFault> {
        let prepared = self
            .prepared
            .take()
            .ok_or_else(|| TransportFault::Failed("send before open".into()))?;
        let credentialed =
            self.with_credentials || is_same_origin(&self.location, &prepared.url);
        let client = if credentialed {
            &self.clients.credentialed
        } else {
            &self.clients.anonymous
        };
        let mut request = client
            .request(method(prepared.verb), prepared.url)
            .headers(prepared.headers);
        if let Some(timeout) = self.timeout {
            request = request.timeout(timeout);
        }
        if let Some(body) = body {
            request = request.body(body);
        }
        tracing::trace!(credentialed, "http request queued");
        self.pending = Some(request);
        Ok(())
    }

    async fn next_event(&mut self) -> Option<RequestEvent> {
        if let Some(request) = self.pending.take() {
            self.perform(request).await;
        }
        self.events.pop_front()
    }

    fn status(&self) -> u16 {
        self.status
    }

    fn response_text(&self) -> String {
        self.body.clone()
    }

    fn response_header(&self, name: &str) -> Option<String> {
        self.response_headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned)
    }
}
