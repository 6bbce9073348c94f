//! The immutable description of one outbound call.
//!
//! A [`RequestDescriptor`] is built once (usually from
//! [`crate::InvokeOptions`]) and then shared behind an `Arc` for the lifetime
//! of the dispatch, including any offline retries. Payload typing happens here
//! and only here: adapters match on [`Payload`] and never sniff contents.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::errors::ProtocolError;
use crate::integrity;

/// Default per-call timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(10_000);

/// Default delay before an offline dispatch is retried.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_millis(3_600);

const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";
const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded; charset=utf-8";
const TEXT_CONTENT_TYPE: &str = "text/plain; charset=utf-8";
const BINARY_CONTENT_TYPE: &str = "application/octet-stream";

// ---------------------------------------------------------------------------
// Verb
// ---------------------------------------------------------------------------

/// Request method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verb {
    /// `GET`
    #[default]
    Get,
    /// `POST`
    Post,
    /// `PUT`
    Put,
    /// `DELETE`
    Delete,
}

impl Verb {
    /// Canonical upper-case method name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }

    /// `true` for verbs whose structured payload travels in the query string.
    pub fn carries_query(self) -> bool {
        matches!(self, Self::Get | Self::Delete)
    }
}

impl FromStr for Verb {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "DELETE" => Ok(Self::Delete),
            _ => Err(ProtocolError::UnsupportedMethod {
                method: s.to_owned(),
            }),
        }
    }
}

impl std::fmt::Display for Verb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Payload
// ---------------------------------------------------------------------------

/// Request payload, typed once at construction.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Payload {
    /// No payload.
    #[default]
    Empty,
    /// Plain text.
    Text(String),
    /// A JSON object or array.
    Structured(Value),
    /// Raw bytes.
    Binary(Vec<u8>),
}

impl Payload {
    /// Types an options-object `data` value.
    ///
    /// Objects and arrays (and strings that parse as one) become
    /// [`Payload::Structured`]; other strings become [`Payload::Text`], or
    /// [`Payload::Binary`] when `binary` is set; scalars are rendered as text.
    pub fn from_value(value: Option<Value>, binary: bool) -> Self {
        match value {
            None | Some(Value::Null) => Self::Empty,
            Some(value @ (Value::Object(_) | Value::Array(_))) => Self::Structured(value),
            Some(Value::String(text)) if binary => Self::Binary(text.into_bytes()),
            Some(Value::String(text)) => match serde_json::from_str::<Value>(&text) {
                Ok(value @ (Value::Object(_) | Value::Array(_))) => Self::Structured(value),
                _ => Self::Text(text),
            },
            Some(scalar) => Self::Text(scalar.to_string()),
        }
    }

    /// `true` for [`Payload::Empty`].
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// Renders the payload as a request body.
    ///
    /// Returns `Ok(None)` for an empty payload.
    pub fn render(&self, encoding: BodyEncoding) -> Result<Option<RenderedBody>, ProtocolError> {
        let rendered = match self {
            Self::Empty => return Ok(None),
            Self::Text(text) => RenderedBody::text(TEXT_CONTENT_TYPE, text.clone()),
            Self::Binary(bytes) => RenderedBody {
                content_type: BINARY_CONTENT_TYPE,
                bytes: bytes.clone(),
                is_text: false,
            },
            Self::Structured(value) => match encoding {
                BodyEncoding::Json => {
                    let text = serde_json::to_string(value)
                        .map_err(|e| ProtocolError::Serialization(e.to_string()))?;
                    RenderedBody::text(JSON_CONTENT_TYPE, text)
                }
                BodyEncoding::Form => RenderedBody::text(FORM_CONTENT_TYPE, form_encode(value)?),
            },
        };
        Ok(Some(rendered))
    }

    /// Text form used for single-frame transports (socket, legacy).
    pub fn to_text(&self) -> Result<Option<String>, ProtocolError> {
        match self {
            Self::Empty => Ok(None),
            Self::Text(text) => Ok(Some(text.clone())),
            Self::Structured(value) => serde_json::to_string(value)
                .map(Some)
                .map_err(|e| ProtocolError::Serialization(e.to_string())),
            Self::Binary(bytes) => Ok(Some(integrity::encode(bytes))),
        }
    }
}

/// Renders a flat JSON object as `key=value&...`.
///
/// Nested objects and arrays cannot be expressed and are rejected.
pub fn form_encode(value: &Value) -> Result<String, ProtocolError> {
    let Value::Object(map) = value else {
        return Err(ProtocolError::Serialization(
            "only objects can be form-encoded".into(),
        ));
    };
    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    for (key, field) in map {
        serializer.append_pair(key, &scalar_text(key, field)?);
    }
    Ok(serializer.finish())
}

fn scalar_text(key: &str, value: &Value) -> Result<String, ProtocolError> {
    match value {
        Value::Null => Ok(String::new()),
        Value::String(text) => Ok(text.clone()),
        Value::Bool(_) | Value::Number(_) => Ok(value.to_string()),
        Value::Array(_) | Value::Object(_) => Err(ProtocolError::Serialization(format!(
            "field '{key}' is nested and cannot be form-encoded"
        ))),
    }
}

/// A payload rendered for the wire with its matching content type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedBody {
    /// Value for the `Content-Type` header.
    pub content_type: &'static str,
    /// Body bytes.
    pub bytes: Vec<u8>,
    is_text: bool,
}

impl RenderedBody {
    fn text(content_type: &'static str, text: String) -> Self {
        Self {
            content_type,
            bytes: text.into_bytes(),
            is_text: true,
        }
    }

    /// Bytes the integrity digest is computed over.
    ///
    /// Text bodies are normalized first so the digest matches what other
    /// clients compute for the same characters; binary bodies are digested
    /// as-is.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        match std::str::from_utf8(&self.bytes) {
            Ok(text) if self.is_text => integrity::normalize(text),
            _ => self.bytes.clone(),
        }
    }
}

/// How a [`Payload::Structured`] body is written for request/response calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BodyEncoding {
    /// `application/json`
    #[default]
    Json,
    /// `application/x-www-form-urlencoded`
    Form,
}

/// Explicit adapter request for `http`/`https` destinations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportPreference {
    /// Let the selector decide from client capability.
    #[default]
    Auto,
    /// Always use the legacy cross-domain transport.
    Legacy,
}

// ---------------------------------------------------------------------------
// Scheme
// ---------------------------------------------------------------------------

/// Destination scheme family; fully determines the eligible adapters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchemeFamily {
    /// `http` or `https`
    Http,
    /// `ws` or `wss`
    Socket,
}

impl SchemeFamily {
    /// Classifies a URL, rejecting schemes no adapter can reach.
    pub fn of(url: &Url) -> Result<Self, ProtocolError> {
        match url.scheme() {
            "http" | "https" => Ok(Self::Http),
            "ws" | "wss" => Ok(Self::Socket),
            other => Err(ProtocolError::UnsupportedScheme {
                scheme: other.to_owned(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Descriptor
// ---------------------------------------------------------------------------

/// Fully resolved, immutable representation of one outbound call.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestDescriptor {
    destination: Url,
    scheme: SchemeFamily,
    verb: Verb,
    payload: Payload,
    headers: BTreeMap<String, String>,
    asynchronous: bool,
    timeout: Duration,
    retry_interval: Duration,
    retry_limit: Option<u32>,
    binary: bool,
    encoding: BodyEncoding,
    transport: TransportPreference,
}

impl RequestDescriptor {
    /// Starts a descriptor for `destination` with every other field defaulted.
    pub fn builder(destination: &str) -> Result<DescriptorBuilder, ProtocolError> {
        let destination = Url::parse(destination).map_err(|e| ProtocolError::InvalidDestination {
            url: destination.to_owned(),
            reason: e.to_string(),
        })?;
        let scheme = SchemeFamily::of(&destination)?;
        Ok(DescriptorBuilder {
            inner: Self {
                destination,
                scheme,
                verb: Verb::default(),
                payload: Payload::default(),
                headers: BTreeMap::new(),
                asynchronous: true,
                timeout: DEFAULT_TIMEOUT,
                retry_interval: DEFAULT_RETRY_INTERVAL,
                retry_limit: None,
                binary: false,
                encoding: BodyEncoding::default(),
                transport: TransportPreference::default(),
            },
        })
    }

    /// Destination URL.
    pub fn destination(&self) -> &Url {
        &self.destination
    }

    /// Scheme family of the destination.
    pub fn scheme(&self) -> SchemeFamily {
        self.scheme
    }

    /// Request method.
    pub fn verb(&self) -> Verb {
        self.verb
    }

    /// Request payload.
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Caller-supplied headers.
    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    /// Whether the request/response transport runs asynchronously.
    pub fn is_asynchronous(&self) -> bool {
        self.asynchronous
    }

    /// Per-call timeout. Zero means unbounded; see [`Self::deadline`].
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// The timeout adapters enforce, or `None` when the call is unbounded.
    ///
    /// A zero timeout disables the limit, as it does for native request
    /// primitives.
    pub fn deadline(&self) -> Option<Duration> {
        (!self.timeout.is_zero()).then_some(self.timeout)
    }

    /// Delay before an offline dispatch is retried.
    pub fn retry_interval(&self) -> Duration {
        self.retry_interval
    }

    /// Maximum number of offline retries; `None` retries until online.
    pub fn retry_limit(&self) -> Option<u32> {
        self.retry_limit
    }

    /// Whether socket responses are binary and should be base64 encoded.
    pub fn is_binary(&self) -> bool {
        self.binary
    }

    /// Encoding for structured request/response bodies.
    pub fn encoding(&self) -> BodyEncoding {
        self.encoding
    }

    /// Explicit adapter preference.
    pub fn transport(&self) -> TransportPreference {
        self.transport
    }

    /// Destination with a structured payload folded into the query string
    /// when the verb carries one.
    pub fn effective_url(&self) -> Result<Url, ProtocolError> {
        let mut url = self.destination.clone();
        if let (true, Payload::Structured(value)) = (self.verb.carries_query(), &self.payload) {
            let Value::Object(map) = value else {
                return Err(ProtocolError::Serialization(format!(
                    "{} payload must be an object to travel in the query string",
                    self.verb
                )));
            };
            {
                let mut pairs = url.query_pairs_mut();
                for (key, field) in map {
                    pairs.append_pair(key, &scalar_text(key, field)?);
                }
            }
        }
        Ok(url)
    }

    /// Body for the request/response transport, or `None` when there is none.
    pub fn body(&self) -> Result<Option<RenderedBody>, ProtocolError> {
        if self.verb.carries_query() && matches!(self.payload, Payload::Structured(_)) {
            return Ok(None);
        }
        self.payload.render(self.encoding)
    }
}

/// Builder for [`RequestDescriptor`].
#[derive(Debug, Clone)]
pub struct DescriptorBuilder {
    inner: RequestDescriptor,
}

impl DescriptorBuilder {
    /// Sets the request method.
    pub fn verb(mut self, verb: Verb) -> Self {
        self.inner.verb = verb;
        self
    }

    /// Sets the payload.
    pub fn payload(mut self, payload: Payload) -> Self {
        self.inner.payload = payload;
        self
    }

    /// Adds or replaces one header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.inner.headers.insert(name.into(), value.into());
        self
    }

    /// Replaces all headers.
    pub fn headers(mut self, headers: BTreeMap<String, String>) -> Self {
        self.inner.headers = headers;
        self
    }

    /// Sets the asynchronous flag.
    pub fn asynchronous(mut self, asynchronous: bool) -> Self {
        self.inner.asynchronous = asynchronous;
        self
    }

    /// Sets the per-call timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.inner.timeout = timeout;
        self
    }

    /// Sets the offline retry interval.
    pub fn retry_interval(mut self, interval: Duration) -> Self {
        self.inner.retry_interval = interval;
        self
    }

    /// Bounds the number of offline retries.
    pub fn retry_limit(mut self, limit: Option<u32>) -> Self {
        self.inner.retry_limit = limit;
        self
    }

    /// Marks socket responses as binary.
    pub fn binary(mut self, binary: bool) -> Self {
        self.inner.binary = binary;
        self
    }

    /// Sets the structured body encoding.
    pub fn encoding(mut self, encoding: BodyEncoding) -> Self {
        self.inner.encoding = encoding;
        self
    }

    /// Sets the adapter preference.
    pub fn transport(mut self, transport: TransportPreference) -> Self {
        self.inner.transport = transport;
        self
    }

    /// Finishes the descriptor.
    pub fn build(self) -> RequestDescriptor {
        self.inner
    }
}
