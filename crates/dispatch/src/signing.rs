//! Session state for the signing-enabled variant.
//!
//! A [`SigningSession`] is injected into the dispatcher and shared by every
//! dispatch it performs. It supplies the `X-Alt-Referer` application id and
//! the `Content-MD5` signature for outgoing requests, and adopts a
//! UUID-shaped application id echoed back by the server.

use std::sync::{Arc, RwLock};

use protocol::{ApplicationId, IntegritySignature, RenderedBody};

/// Application id plus signing for outgoing requests.
#[derive(Debug, Clone)]
pub struct SigningSession {
    app: Arc<RwLock<ApplicationId>>,
}

impl SigningSession {
    /// Starts a session with `app` as the current application id.
    pub fn new(app: ApplicationId) -> Self {
        Self {
            app: Arc::new(RwLock::new(app)),
        }
    }

    /// The current application id.
    pub fn application_id(&self) -> ApplicationId {
        match self.app.read() {
            Ok(app) => app.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Signature for a request carrying `body` (or no body).
    pub fn sign(&self, body: Option<&RenderedBody>) -> IntegritySignature {
        match body {
            Some(body) => IntegritySignature::over(&body.canonical_bytes()),
            None => IntegritySignature::over_application(&self.application_id()),
        }
    }

    /// Adopts a server-echoed id if it is UUID-shaped. Returns `true` when the
    /// session id changed.
    pub fn accept_echo(&self, echoed: Option<&str>) -> bool {
        let Some(candidate) = echoed.and_then(ApplicationId::from_echo) else {
            return false;
        };
        let mut app = match self.app.write() {
            Ok(app) => app,
            Err(poisoned) => poisoned.into_inner(),
        };
        if *app == candidate {
            return false;
        }
        tracing::debug!(previous = %app, adopted = %candidate, "application id replaced by server");
        *app = candidate;
        true
    }
}

impl Default for SigningSession {
    fn default() -> Self {
        Self::new(ApplicationId::default())
    }
}
