//! Relay orchestration: connectivity, transport selection and delivery.
//!
//! This crate turns a caller's options into exactly one
//! [`protocol::TransportOutcome`]. It asks the connectivity monitor whether
//! the environment is online, defers to a one-shot retry timer when it is
//! not, picks one of three transport adapters, and hands the adapter's
//! outcome to the caller's continuation.
//!
//! ## Architectural Layer
//!
//! **Orchestration layer.** The dispatcher sequences calls between the
//! domain rules in the [`protocol`] crate and the native primitives an
//! [`protocol::Environment`] supplies. It performs no I/O of its own.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`dispatcher`] | `Dispatcher`, `invoke`, `dispatch`, retry wiring |
//! | [`selector`] | Adapter choice per descriptor |
//! | [`adapters`] | Request/response, legacy and socket adapters |
//! | [`monitor`] | Online flag, retry policy and timers |
//! | [`signing`] | Application id session and request signatures |
//! | `mock` | Scripted environment for tests, behind the `test-util` feature |

pub mod adapters;
pub mod dispatcher;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;
pub mod monitor;
pub mod selector;
pub mod signing;

pub use adapters::{Adapter, LegacyAdapter, RequestResponseAdapter, SocketAdapter};
pub use dispatcher::{Continuation, Dispatch, DispatchFuture, Dispatcher};
pub use monitor::{ConnectivityMonitor, RetryAction, RetryHandle, RetryPolicy};
pub use selector::{select, AdapterKind};
pub use signing::SigningSession;
