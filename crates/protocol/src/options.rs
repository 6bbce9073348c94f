//! Caller-facing options object and its merge over defaults.
//!
//! Recognized keys: `async`, `data`, `headers`, `interval`, `method`,
//! `timeout`, `url`, `binary`, plus `encoding`, `transport` and `retries`.
//! Every key is optional; [`InvokeOptions::merge`] layers caller options over
//! configured defaults and [`InvokeOptions::into_descriptor`] resolves the
//! result into an immutable [`RequestDescriptor`].

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::descriptor::{
    BodyEncoding, Payload, RequestDescriptor, TransportPreference, Verb, DEFAULT_RETRY_INTERVAL,
    DEFAULT_TIMEOUT,
};
use crate::errors::ProtocolError;

/// The options object accepted by `invoke`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InvokeOptions {
    /// Run the request/response transport asynchronously.
    #[serde(rename = "async", skip_serializing_if = "Option::is_none")]
    pub asynchronous: Option<bool>,

    /// Payload; typed into a [`Payload`] when the descriptor is built.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    /// Extra request headers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<BTreeMap<String, String>>,

    /// Offline retry interval in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval: Option<u64>,

    /// Request method, case-insensitive.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,

    /// Timeout in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,

    /// Destination URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Treat string data and socket responses as binary.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub binary: Option<bool>,

    /// Encoding for structured request/response bodies.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encoding: Option<BodyEncoding>,

    /// Explicit adapter preference for `http`/`https` destinations.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transport: Option<TransportPreference>,

    /// Maximum offline retries; unset retries until online.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retries: Option<u32>,
}

impl InvokeOptions {
    /// Options for `url` with everything else unset.
    pub fn for_url(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::default()
        }
    }

    /// Built-in defaults: GET, asynchronous, 10 s timeout, 3.6 s retry interval.
    pub fn documented_defaults() -> Self {
        Self {
            asynchronous: Some(true),
            interval: Some(DEFAULT_RETRY_INTERVAL.as_millis() as u64),
            method: Some(Verb::Get.as_str().to_owned()),
            timeout: Some(DEFAULT_TIMEOUT.as_millis() as u64),
            binary: Some(false),
            encoding: Some(BodyEncoding::Json),
            transport: Some(TransportPreference::Auto),
            ..Self::default()
        }
    }

    /// Layers `overrides` over `defaults`. Set override fields win; header
    /// maps merge key-wise; JSON object payloads merge recursively.
    pub fn merge(defaults: &Self, overrides: Self) -> Self {
        let headers = match (defaults.headers.clone(), overrides.headers) {
            (Some(mut base), Some(extra)) => {
                base.extend(extra);
                Some(base)
            }
            (base, extra) => extra.or(base),
        };
        let data = match (defaults.data.clone(), overrides.data) {
            (Some(mut base), Some(extra)) => {
                merge_values(&mut base, extra);
                Some(base)
            }
            (base, extra) => extra.or(base),
        };
        Self {
            asynchronous: overrides.asynchronous.or(defaults.asynchronous),
            data,
            headers,
            interval: overrides.interval.or(defaults.interval),
            method: overrides.method.or_else(|| defaults.method.clone()),
            timeout: overrides.timeout.or(defaults.timeout),
            url: overrides.url.or_else(|| defaults.url.clone()),
            binary: overrides.binary.or(defaults.binary),
            encoding: overrides.encoding.or(defaults.encoding),
            transport: overrides.transport.or(defaults.transport),
            retries: overrides.retries.or(defaults.retries),
        }
    }

    /// Resolves these options into a descriptor. Unset fields fall back to
    /// the documented defaults.
    pub fn into_descriptor(self) -> Result<RequestDescriptor, ProtocolError> {
        let url = self.url.ok_or_else(|| ProtocolError::InvalidOption {
            key: "url".into(),
            reason: "a destination is required".into(),
        })?;
        let verb = match self.method {
            Some(method) => method.parse()?,
            None => Verb::default(),
        };
        let binary = self.binary.unwrap_or(false);
        Ok(RequestDescriptor::builder(&url)?
            .verb(verb)
            .payload(Payload::from_value(self.data, binary))
            .headers(self.headers.unwrap_or_default())
            .asynchronous(self.asynchronous.unwrap_or(true))
            .timeout(self.timeout.map(Duration::from_millis).unwrap_or(DEFAULT_TIMEOUT))
            .retry_interval(
                self.interval
                    .map(Duration::from_millis)
                    .unwrap_or(DEFAULT_RETRY_INTERVAL),
            )
            .retry_limit(self.retries)
            .binary(binary)
            .encoding(self.encoding.unwrap_or_default())
            .transport(self.transport.unwrap_or_default())
            .build())
    }
}

/// Recursive override-wins merge of two JSON values.
pub fn merge_values(base: &mut Value, overrides: Value) {
    match (base, overrides) {
        (Value::Object(base), Value::Object(overrides)) => {
            for (key, value) in overrides {
                match base.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overrides) => *base = overrides,
    }
}
