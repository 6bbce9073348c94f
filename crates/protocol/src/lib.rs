//! Core domain for relay.
//!
//! This crate contains every domain concept used to describe, sign and
//! complete one remote call: the immutable request descriptor, the
//! single-outcome result type, the exchange state machine every adapter
//! drives, the digest and codec behind the integrity signature, and the port
//! traits an execution environment implements. Orchestration lives in
//! `dispatch`; native transports live in `host`.
//!
//! ## Architectural Layer
//!
//! **Domain + port definitions.** This crate has no I/O dependencies.
//! It defines *what* a transport must provide; infrastructure crates define
//! *how*.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`identifiers`] | `ApplicationId`, `DispatchId` |
//! | [`descriptor`] | `RequestDescriptor`, `Verb`, `Payload`, rendering |
//! | [`options`] | `InvokeOptions` and the defaults merge |
//! | [`outcome`] | `TransportOutcome`, `ErrorKind` |
//! | [`exchange`] | Per-call state machine |
//! | [`integrity`] | Normalization, MD5 digest, base64 codec, signature |
//! | [`ports`] | `Environment` and native connection traits |
//! | [`errors`] | `ProtocolError`, `TransportFault` |

pub mod descriptor;
pub mod errors;
pub mod exchange;
pub mod identifiers;
pub mod integrity;
pub mod options;
pub mod outcome;
pub mod ports;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use descriptor::{
    BodyEncoding, DescriptorBuilder, Payload, RenderedBody, RequestDescriptor, SchemeFamily,
    TransportPreference, Verb,
};
pub use errors::{ProtocolError, TransportFault};
pub use exchange::{Exchange, ExchangePhase};
pub use identifiers::{ApplicationId, DispatchId};
pub use integrity::IntegritySignature;
pub use options::InvokeOptions;
pub use outcome::{ErrorKind, TransportOutcome};
pub use ports::{
    Environment, LegacyConnection, LegacyEvent, ReadyState, RequestConnection, RequestEvent,
    SocketConnection, SocketEvent, SocketFrame,
};
