//! Transport dispatcher: the public entry point of the crate.
//!
//! A [`Dispatcher`] owns the collaborators every dispatch shares (the
//! environment, the connectivity monitor, the optional signing session and
//! the configured default options). Each call to [`Dispatcher::dispatch`]
//! owns its descriptor, continuation and retry chain; nothing is kept in a
//! global table.
//!
//! While offline, a dispatch arms one retry timer and returns
//! [`Dispatch::RetryScheduled`] without touching an adapter. When the timer
//! fires the whole dispatch is re-run with the same descriptor and
//! continuation; a dispatch that is still offline re-arms on the same handle.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use protocol::{
    ApplicationId, DispatchId, Environment, ErrorKind, InvokeOptions, ProtocolError,
    RequestDescriptor, TransportOutcome,
};
use tokio::sync::oneshot;
use tracing::Instrument;

use crate::adapters::{Adapter, LegacyAdapter, RequestResponseAdapter, SocketAdapter};
use crate::monitor::{ConnectivityMonitor, RetryAction, RetryHandle, RetryPolicy};
use crate::selector::{select, AdapterKind};
use crate::signing::SigningSession;

/// Receives the single outcome of a dispatch.
pub type Continuation = Box<dyn FnOnce(TransportOutcome) + Send>;

/// A dispatch in progress, resolving once the call was delivered or deferred.
pub type DispatchFuture = Pin<Box<dyn Future<Output = Dispatch> + Send>>;

/// What a dispatch did.
#[derive(Debug, Clone)]
pub enum Dispatch {
    /// An adapter ran and the continuation received its outcome.
    Delivered(AdapterKind),
    /// The environment was offline; a retry timer is armed and the
    /// continuation has not been called.
    RetryScheduled(RetryHandle),
    /// The retry limit was reached while offline; the continuation received
    /// a `NetworkOffline` failure.
    Exhausted,
    /// The retry chain was cancelled; the continuation will never be called.
    Cancelled,
}

/// Selects an adapter for each call and delivers its outcome.
pub struct Dispatcher<E: Environment> {
    env: Arc<E>,
    monitor: ConnectivityMonitor<E>,
    signing: Option<SigningSession>,
    defaults: InvokeOptions,
}

impl<E: Environment> Clone for Dispatcher<E> {
    fn clone(&self) -> Self {
        Self {
            env: Arc::clone(&self.env),
            monitor: self.monitor.clone(),
            signing: self.signing.clone(),
            defaults: self.defaults.clone(),
        }
    }
}

impl<E: Environment> Dispatcher<E> {
    /// Creates a dispatcher without signing, using the documented defaults.
    pub fn new(env: Arc<E>) -> Self {
        Self {
            monitor: ConnectivityMonitor::new(Arc::clone(&env)),
            env,
            signing: None,
            defaults: InvokeOptions::documented_defaults(),
        }
    }

    /// Enables the signing variant for request/response calls.
    pub fn with_signing(mut self, session: SigningSession) -> Self {
        self.signing = Some(session);
        self
    }

    /// Replaces the defaults that `invoke` options are merged over.
    pub fn with_defaults(mut self, defaults: InvokeOptions) -> Self {
        self.defaults = defaults;
        self
    }

    /// The connectivity monitor.
    pub fn monitor(&self) -> &ConnectivityMonitor<E> {
        &self.monitor
    }

    /// The signing session, when signing is enabled.
    pub fn signing(&self) -> Option<&SigningSession> {
        self.signing.as_ref()
    }

    /// Merges `options` over the configured defaults and dispatches the
    /// result.
    ///
    /// # Errors
    ///
    /// Returns a [`ProtocolError`] when the merged options do not describe a
    /// valid call; nothing is dispatched in that case.
    pub fn invoke(
        &self,
        options: InvokeOptions,
        continuation: Continuation,
    ) -> Result<DispatchFuture, ProtocolError> {
        let descriptor = InvokeOptions::merge(&self.defaults, options).into_descriptor()?;
        Ok(self.dispatch(Arc::new(descriptor), continuation))
    }

    /// Like [`Dispatcher::invoke`], but waits for the outcome, including any
    /// offline retries.
    pub async fn invoke_and_wait(
        &self,
        options: InvokeOptions,
    ) -> Result<TransportOutcome, ProtocolError> {
        let (tx, rx) = oneshot::channel();
        let dispatch = self.invoke(
            options,
            Box::new(move |outcome| {
                let _ = tx.send(outcome);
            }),
        )?;
        dispatch.await;
        Ok(rx.await.unwrap_or_else(|_| {
            TransportOutcome::failure(ErrorKind::NetworkOffline, "dispatch was cancelled")
        }))
    }

    /// Dispatches `descriptor`, handing its outcome to `continuation` exactly
    /// once (or never, if the retry chain is cancelled).
    pub fn dispatch(
        &self,
        descriptor: Arc<RequestDescriptor>,
        continuation: Continuation,
    ) -> DispatchFuture {
        self.attempt(descriptor, continuation, DispatchId::new_random(), 0, None)
    }

    fn attempt(
        &self,
        descriptor: Arc<RequestDescriptor>,
        continuation: Continuation,
        id: DispatchId,
        retries: u32,
        handle: Option<RetryHandle>,
    ) -> DispatchFuture {
        let this = self.clone();
        let app = log_tag(self.signing.as_ref());
        let span = tracing::info_span!(
            "dispatch",
            id = %id,
            app = %app,
            url = %descriptor.destination(),
            retries,
        );

        Box::pin(
            async move {
                if this.monitor.is_online() {
                    this.deliver(&descriptor, continuation).await
                } else {
                    this.defer(descriptor, continuation, id, retries, handle)
                }
            }
            .instrument(span),
        )
    }

    async fn deliver(
        &self,
        descriptor: &RequestDescriptor,
        continuation: Continuation,
    ) -> Dispatch {
        let kind = select(descriptor, self.env.as_ref());
        tracing::debug!(adapter = %kind, verb = %descriptor.verb(), "adapter selected");

        let outcome = self.adapter(kind).send(descriptor).await;
        match &outcome {
            TransportOutcome::Success { body } => {
                tracing::debug!(bytes = body.len(), "dispatch delivered");
            }
            TransportOutcome::Failure { kind: error, detail } => {
                tracing::warn!(%error, %detail, "dispatch failed");
            }
        }
        continuation(outcome);
        Dispatch::Delivered(kind)
    }

    fn defer(
        &self,
        descriptor: Arc<RequestDescriptor>,
        continuation: Continuation,
        id: DispatchId,
        retries: u32,
        handle: Option<RetryHandle>,
    ) -> Dispatch {
        let policy = RetryPolicy::for_descriptor(&descriptor);
        if !policy.allows(retries) {
            tracing::warn!(retries, "offline and out of retries");
            continuation(TransportOutcome::failure(
                ErrorKind::NetworkOffline,
                format!("network offline after {retries} retries"),
            ));
            return Dispatch::Exhausted;
        }

        let handle = handle.unwrap_or_default();
        let next = self.clone();
        let timer = handle.clone();
        let action: RetryAction = Box::new(move || {
            Box::pin(async move {
                next.attempt(descriptor, continuation, id, retries + 1, Some(timer))
                    .await;
            })
        });

        if !self.monitor.rearm(&handle, policy.interval, action) {
            tracing::debug!("retry chain cancelled");
            return Dispatch::Cancelled;
        }
        tracing::info!(
            interval_ms = policy.interval.as_millis() as u64,
            "offline; retry scheduled"
        );
        Dispatch::RetryScheduled(handle)
    }

    fn adapter(&self, kind: AdapterKind) -> Box<dyn Adapter> {
        match kind {
            AdapterKind::RequestResponse => Box::new(RequestResponseAdapter::new(
                Arc::clone(&self.env),
                self.signing.clone(),
            )),
            AdapterKind::Legacy => Box::new(LegacyAdapter::new(Arc::clone(&self.env))),
            AdapterKind::Socket => Box::new(SocketAdapter::new(Arc::clone(&self.env))),
        }
    }
}

impl<E: Environment> std::fmt::Debug for Dispatcher<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("signing", &self.signing)
            .field("defaults", &self.defaults)
            .finish_non_exhaustive()
    }
}

// Application id used as the logging tag.
fn log_tag(session: Option<&SigningSession>) -> ApplicationId {
    session
        .map(SigningSession::application_id)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{RequestScript, ScriptedEnvironment};
    use std::sync::Mutex;
    use std::time::Duration;

    type Received = Arc<Mutex<Vec<TransportOutcome>>>;

    fn recorder() -> (Received, Continuation) {
        let received = Received::default();
        let sink = Arc::clone(&received);
        let continuation: Continuation = Box::new(move |outcome| {
            sink.lock().unwrap().push(outcome);
        });
        (received, continuation)
    }

    #[tokio::test]
    async fn invalid_options_are_rejected_before_dispatch() {
        let env = Arc::new(ScriptedEnvironment::new());
        let dispatcher = Dispatcher::new(Arc::clone(&env));
        let (received, continuation) = recorder();

        let error = dispatcher
            .invoke(InvokeOptions::default(), continuation)
            .err()
            .unwrap();
        assert!(matches!(error, ProtocolError::InvalidOption { ref key, .. } if key == "url"));
        assert!(received.lock().unwrap().is_empty());
        assert_eq!(env.journal().connections_opened(), 0);
    }

    #[tokio::test]
    async fn defaults_fill_unset_options() {
        let env = Arc::new(ScriptedEnvironment::new());
        let defaults = InvokeOptions {
            method: Some("put".into()),
            headers: Some([("X-Tenant".to_owned(), "acme".to_owned())].into()),
            ..InvokeOptions::documented_defaults()
        };
        let dispatcher = Dispatcher::new(Arc::clone(&env)).with_defaults(defaults);

        let outcome = dispatcher
            .invoke_and_wait(InvokeOptions::for_url("https://api.test/item"))
            .await
            .unwrap();
        assert!(outcome.is_success());

        let request = &env.journal().requests[0];
        assert_eq!(request.verb, protocol::Verb::Put);
        assert_eq!(request.headers.get("X-Tenant").map(String::as_str), Some("acme"));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_retry_never_delivers() {
        let env = Arc::new(ScriptedEnvironment::new());
        env.set_online(false);
        let dispatcher = Dispatcher::new(Arc::clone(&env));
        let (received, continuation) = recorder();

        let descriptor = RequestDescriptor::builder("https://api.test/x").unwrap().build();
        let Dispatch::RetryScheduled(handle) =
            dispatcher.dispatch(Arc::new(descriptor), continuation).await
        else {
            panic!("expected a scheduled retry");
        };
        handle.cancel();
        env.set_online(true);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(received.lock().unwrap().is_empty());
        assert_eq!(env.journal().connections_opened(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn still_offline_rearms_the_same_handle() {
        let env = Arc::new(ScriptedEnvironment::new());
        env.set_online(false);
        let dispatcher = Dispatcher::new(Arc::clone(&env));
        let (received, continuation) = recorder();

        let descriptor = RequestDescriptor::builder("https://api.test/x")
            .unwrap()
            .retry_interval(Duration::from_millis(100))
            .build();
        let Dispatch::RetryScheduled(handle) =
            dispatcher.dispatch(Arc::new(descriptor), continuation).await
        else {
            panic!("expected a scheduled retry");
        };

        tokio::time::sleep(Duration::from_millis(350)).await;
        assert_eq!(handle.fired(), 3);
        assert!(handle.is_armed());
        assert!(received.lock().unwrap().is_empty());

        env.set_online(true);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(handle.fired(), 4);
        assert!(!handle.is_armed());
        assert_eq!(received.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_interval_retries_are_paced() {
        let env = Arc::new(ScriptedEnvironment::new());
        env.set_online(false);
        let dispatcher = Dispatcher::new(Arc::clone(&env));
        let (_received, continuation) = recorder();

        let descriptor = RequestDescriptor::builder("https://api.test/x")
            .unwrap()
            .retry_interval(Duration::ZERO)
            .build();
        let Dispatch::RetryScheduled(handle) =
            dispatcher.dispatch(Arc::new(descriptor), continuation).await
        else {
            panic!("expected a scheduled retry");
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        let fired = handle.fired();
        assert!((9..=10).contains(&fired), "fired {fired} times in 10 ms");
        handle.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn retry_limit_delivers_network_offline() {
        let env = Arc::new(ScriptedEnvironment::new().with_request(RequestScript::reply(200, "")));
        env.set_online(false);
        let dispatcher = Dispatcher::new(Arc::clone(&env));

        let options = InvokeOptions {
            retries: Some(2),
            interval: Some(50),
            ..InvokeOptions::for_url("https://api.test/x")
        };
        let outcome = dispatcher.invoke_and_wait(options).await.unwrap();
        assert_eq!(
            outcome,
            TransportOutcome::failure(ErrorKind::NetworkOffline, "network offline after 2 retries")
        );
        assert_eq!(env.journal().connections_opened(), 0);
    }

    #[test]
    fn log_tag_defaults_without_signing() {
        assert_eq!(log_tag(None), ApplicationId::default());
        let session = SigningSession::new(ApplicationId::new("shop").unwrap());
        assert_eq!(log_tag(Some(&session)).as_str(), "shop");
    }
}
