//! Newtype identifiers.
//!
//! Every identity carried through a dispatch is a distinct newtype wrapping a
//! primitive, so an [`ApplicationId`] (a wire-level header value) is never
//! confused with a [`DispatchId`] (a local correlation id for tracing).

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Macro for String-wrapped newtypes.
// Generates: struct, new() returning Option<Self>, as_str(), Display.
// ---------------------------------------------------------------------------
macro_rules! string_id {
    (
        $(#[$attr:meta])*
        $name:ident
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier, returning `None` if the value is empty.
            pub fn new(value: impl Into<String>) -> Option<Self> {
                let v = value.into();
                if v.is_empty() { None } else { Some(Self(v)) }
            }

            /// Returns the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

string_id! {
    /// Identifies the calling application to the remote end.
    ///
    /// Sent in the `X-Alt-Referer` header of signed requests and used as the
    /// logging tag. A server may hand back a UUID-shaped replacement, see
    /// [`ApplicationId::from_echo`].
    ApplicationId
}

impl ApplicationId {
    /// Accepts a server-echoed `X-Alt-Referer` value as a new application id.
    ///
    /// Only the hyphenated 8-4-4-4-12 hexadecimal form is accepted (either
    /// case). Braced, URN and unhyphenated spellings are rejected even though
    /// they name a valid UUID.
    pub fn from_echo(value: &str) -> Option<Self> {
        let value = value.trim();
        if value.len() != 36 {
            return None;
        }
        Uuid::try_parse(value).ok().map(|_| Self(value.to_owned()))
    }
}

impl Default for ApplicationId {
    fn default() -> Self {
        Self(String::from("relay"))
    }
}

/// Correlates the tracing output of one dispatch, including its retries.
///
/// Generated fresh for every `dispatch` call; never leaves the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DispatchId(Uuid);

impl DispatchId {
    /// Generates a new random dispatch identifier.
    pub fn new_random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying [`Uuid`].
    pub fn as_uuid(self) -> Uuid {
        self.0
    }
}

impl std::fmt::Display for DispatchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
