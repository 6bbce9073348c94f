//! Error types for the relay domain.
//!
//! [`ProtocolError`] covers conditions detected before or around a transport
//! call: a descriptor that cannot be built, text the codec cannot decode, or a
//! state-machine transition that is not allowed. [`TransportFault`] is what a
//! native connection reports when one of its calls fails; adapters turn it
//! into a [`crate::TransportOutcome::Failure`] and never let it escape.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::exchange::ExchangePhase;

// ---------------------------------------------------------------------------
// Domain errors
// ---------------------------------------------------------------------------

/// Errors raised while building descriptors, decoding codec text, or driving
/// an exchange.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProtocolError {
    /// The destination is missing or does not parse as an absolute URL.
    #[error("Invalid destination '{url}': {reason}")]
    InvalidDestination {
        /// The destination text as supplied.
        url: String,
        /// Parser explanation.
        reason: String,
    },

    /// The destination scheme has no eligible adapter.
    #[error("Unsupported scheme '{scheme}' (expected http, https, ws or wss)")]
    UnsupportedScheme {
        /// The rejected scheme.
        scheme: String,
    },

    /// The request method is not one of GET, POST, PUT or DELETE.
    #[error("Unsupported method '{method}'")]
    UnsupportedMethod {
        /// The rejected method text.
        method: String,
    },

    /// An option value has the wrong shape (e.g. a negative timeout).
    #[error("Invalid option '{key}': {reason}")]
    InvalidOption {
        /// Option key as it appears in the options object.
        key: String,
        /// What was wrong with it.
        reason: String,
    },

    /// Text handed to the codec is not valid base64.
    #[error("Codec error: {0}")]
    Codec(String),

    /// The payload cannot be rendered into the shape the transport needs.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// An exchange was asked to make a transition its current phase forbids.
    #[error("Invalid exchange transition '{action}' from {from:?}")]
    InvalidTransition {
        /// Phase the exchange was in.
        from: ExchangePhase,
        /// The rejected action.
        action: &'static str,
    },
}

// ---------------------------------------------------------------------------
// Native transport faults
// ---------------------------------------------------------------------------

/// A failure reported by a native connection primitive.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum TransportFault {
    /// The primitive does not exist in this environment.
    #[error("Transport unavailable: {0}")]
    Unavailable(String),

    /// The primitive raised an error during open, send or receive.
    #[error("Transport error: {0}")]
    Failed(String),
}

impl TransportFault {
    /// Human-readable detail without the variant prefix.
    pub fn detail(&self) -> &str {
        match self {
            Self::Unavailable(detail) | Self::Failed(detail) => detail,
        }
    }
}
