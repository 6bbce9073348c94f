//! Relay native host.
//!
//! Implements the [`protocol::Environment`] port for native processes:
//! request/response calls over reqwest, sockets over tokio-tungstenite, and a
//! reachability flag the embedding application drives. A native host has no
//! legacy cross-domain primitive, so the selector never routes to it here
//! and an explicit legacy preference resolves to `TransportUnavailable`.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** All network I/O lives here. The `dispatch` crate sees
//! only [`protocol::Environment`] and the connection traits.
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`environment`] | `NativeEnvironment`, `Reachability` |
//! | [`http`] | `HttpConnection` (reqwest) |
//! | [`websocket`] | `WebSocketConnection` (tokio-tungstenite) |
//! | [`errors`] | `HostError` |

pub mod environment;
pub mod errors;
pub mod http;
pub mod websocket;

pub use environment::{NativeEnvironment, Reachability, DEFAULT_LOCATION, DEFAULT_USER_AGENT};
pub use errors::HostError;
pub use http::{HttpClients, HttpConnection};
pub use websocket::WebSocketConnection;
