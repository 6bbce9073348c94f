//! The single result of dispatching one descriptor.

use serde::{Deserialize, Serialize};

use crate::errors::{ProtocolError, TransportFault};

/// Failure taxonomy surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The environment was unreachable. Recovered by the retry scheduler;
    /// only surfaced when a configured retry limit is exhausted.
    NetworkOffline,
    /// A required native transport constructor is absent.
    TransportUnavailable,
    /// The native transport raised an error during open, send or receive.
    TransportError,
    /// The remote end answered with a status other than 2xx or 304.
    HttpError,
    /// The payload could not be rendered into the transport's shape.
    SerializationError,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::NetworkOffline => "network offline",
            Self::TransportUnavailable => "transport unavailable",
            Self::TransportError => "transport error",
            Self::HttpError => "http error",
            Self::SerializationError => "serialization error",
        };
        f.write_str(name)
    }
}

/// Exactly one of these is produced per dispatched descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TransportOutcome {
    /// The remote end answered; `body` is the response text.
    Success {
        /// Response body.
        body: String,
    },
    /// The call did not succeed.
    Failure {
        /// Failure category.
        kind: ErrorKind,
        /// Human-readable detail.
        detail: String,
    },
}

impl TransportOutcome {
    /// Builds a [`TransportOutcome::Success`].
    pub fn success(body: impl Into<String>) -> Self {
        Self::Success { body: body.into() }
    }

    /// Builds a [`TransportOutcome::Failure`].
    pub fn failure(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self::Failure {
            kind,
            detail: detail.into(),
        }
    }

    /// Returns `true` for [`TransportOutcome::Success`].
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Returns the failure kind, if any.
    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Success { .. } => None,
            Self::Failure { kind, .. } => Some(*kind),
        }
    }
}

impl From<TransportFault> for TransportOutcome {
    fn from(fault: TransportFault) -> Self {
        let kind = match fault {
            TransportFault::Unavailable(_) => ErrorKind::TransportUnavailable,
            TransportFault::Failed(_) => ErrorKind::TransportError,
        };
        Self::failure(kind, fault.detail())
    }
}

impl From<ProtocolError> for TransportOutcome {
    fn from(error: ProtocolError) -> Self {
        let kind = match error {
            ProtocolError::Serialization(_) | ProtocolError::Codec(_) => {
                ErrorKind::SerializationError
            }
            _ => ErrorKind::TransportError,
        };
        Self::failure(kind, error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn faults_map_to_matching_kinds() {
        let unavailable = TransportOutcome::from(TransportFault::Unavailable("no xdr".into()));
        assert_eq!(unavailable.error_kind(), Some(ErrorKind::TransportUnavailable));

        let failed = TransportOutcome::from(TransportFault::Failed("reset".into()));
        assert_eq!(
            failed,
            TransportOutcome::failure(ErrorKind::TransportError, "reset")
        );
    }

    #[test]
    fn serialization_errors_keep_their_kind() {
        let outcome = TransportOutcome::from(ProtocolError::Serialization("nested".into()));
        assert_eq!(outcome.error_kind(), Some(ErrorKind::SerializationError));
    }

    #[test]
    fn outcome_serializes_with_tag() {
        let json = serde_json::to_value(TransportOutcome::success("pong")).unwrap();
        assert_eq!(json, serde_json::json!({"outcome": "success", "body": "pong"}));
    }
}
