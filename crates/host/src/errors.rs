//! Errors raised while building the native host.

use thiserror::Error;

/// Failure to construct a [`crate::NativeEnvironment`].
#[derive(Debug, Error)]
pub enum HostError {
    /// The configured location is not an absolute URL.
    #[error("Invalid location '{location}': {source}")]
    InvalidLocation {
        /// The rejected value.
        location: String,
        /// Why it was rejected.
        #[source]
        source: url::ParseError,
    },

    /// The HTTP client could not be built.
    #[error("HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}
