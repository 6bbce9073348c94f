//! Chooses the adapter for a descriptor.
//!
//! First match wins:
//! 1. `ws`/`wss` destinations go to the socket adapter.
//! 2. `http`/`https` destinations go to the legacy adapter when it was asked
//!    for explicitly, or when the client is legacy-only, the destination is
//!    cross-origin, and the legacy constructor exists.
//! 3. Everything else goes to the request/response adapter.

use protocol::ports::{is_legacy_client, is_same_origin};
use protocol::{Environment, RequestDescriptor, SchemeFamily, TransportPreference};
use serde::{Deserialize, Serialize};

/// The three adapters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterKind {
    /// Standard request/response.
    RequestResponse,
    /// Legacy cross-domain request.
    Legacy,
    /// Persistent socket.
    Socket,
}

impl std::fmt::Display for AdapterKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::RequestResponse => "request_response",
            Self::Legacy => "legacy",
            Self::Socket => "socket",
        })
    }
}

/// Picks the adapter for `descriptor` under `env`.
pub fn select<E: Environment + ?Sized>(descriptor: &RequestDescriptor, env: &E) -> AdapterKind {
    match descriptor.scheme() {
        SchemeFamily::Socket => AdapterKind::Socket,
        SchemeFamily::Http => {
            if descriptor.transport() == TransportPreference::Legacy {
                return AdapterKind::Legacy;
            }
            let cross_origin = !is_same_origin(env.location(), descriptor.destination());
            if cross_origin && is_legacy_client(env.user_agent()) && env.has_legacy_transport() {
                AdapterKind::Legacy
            } else {
                AdapterKind::RequestResponse
            }
        }
    }
}
