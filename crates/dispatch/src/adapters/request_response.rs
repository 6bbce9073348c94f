//! Standard request/response adapter.

use std::sync::Arc;

use async_trait::async_trait;
use protocol::integrity::{REFERER_HEADER, SIGNATURE_HEADER};
use protocol::ports::is_same_origin;
use protocol::{
    Environment, ErrorKind, Exchange, ReadyState, RequestConnection, RequestDescriptor,
    RequestEvent, TransportOutcome,
};

use super::{settle, Adapter};
use crate::selector::AdapterKind;
use crate::signing::SigningSession;

/// Header that marks asynchronous calls.
pub const REQUESTED_WITH_HEADER: &str = "X-Requested-With";

const REQUESTED_WITH_VALUE: &str = "XMLHttpRequest";

/// Sends descriptors over the environment's request/response primitive.
///
/// When a [`SigningSession`] is attached every request carries the
/// application id and a body signature, and a UUID-shaped id echoed in a
/// successful response replaces the session id.
pub struct RequestResponseAdapter<E: Environment> {
    env: Arc<E>,
    signing: Option<SigningSession>,
}

impl<E: Environment> RequestResponseAdapter<E> {
    /// Creates the adapter.
    pub fn new(env: Arc<E>, signing: Option<SigningSession>) -> Self {
        Self { env, signing }
    }

    async fn run(
        &self,
        descriptor: &RequestDescriptor,
        exchange: &mut Exchange,
    ) -> Result<(), TransportOutcome> {
        let url = descriptor.effective_url()?;
        let body = descriptor.body()?;

        let mut conn = self.env.request_connection()?;
        conn.open(descriptor.verb(), &url, descriptor.is_asynchronous())?;
        if let Some(deadline) = descriptor.deadline() {
            conn.set_timeout(deadline);
        }
        for (name, value) in descriptor.headers() {
            conn.set_header(name, value)?;
        }
        if descriptor.is_asynchronous() {
            conn.set_header(REQUESTED_WITH_HEADER, REQUESTED_WITH_VALUE)?;
        }
        if let Some(body) = &body {
            conn.set_header("Content-Type", body.content_type)?;
        }
        if let Some(session) = &self.signing {
            let signature = session.sign(body.as_ref());
            conn.set_header(REFERER_HEADER, session.application_id().as_str())?;
            conn.set_header(SIGNATURE_HEADER, signature.as_str())?;
        }
        if !is_same_origin(self.env.location(), &url) {
            conn.set_with_credentials(true);
        }
        let _ = exchange.opened();

        conn.send(body.map(|body| body.bytes))?;
        let _ = exchange.sent();
        tracing::debug!(verb = %descriptor.verb(), %url, "request sent");

        self.await_completion(conn.as_mut(), descriptor, exchange).await
    }

    async fn await_completion(
        &self,
        conn: &mut dyn RequestConnection,
        descriptor: &RequestDescriptor,
        exchange: &mut Exchange,
    ) -> Result<(), TransportOutcome> {
        while let Some(event) = conn.next_event().await {
            match event {
                RequestEvent::StateChanged(ReadyState::Done) => {
                    let status = conn.status();
                    if (200..300).contains(&status) || status == 304 {
                        if let Some(session) = &self.signing {
                            session.accept_echo(conn.response_header(REFERER_HEADER).as_deref());
                        }
                        settle(exchange, TransportOutcome::success(conn.response_text()));
                    } else {
                        settle(
                            exchange,
                            TransportOutcome::failure(ErrorKind::HttpError, format!("HTTP {status}")),
                        );
                    }
                    return Ok(());
                }
                RequestEvent::StateChanged(state) => {
                    tracing::trace!(?state, "ready state changed");
                }
                RequestEvent::Error(detail) => {
                    return Err(TransportOutcome::failure(ErrorKind::TransportError, detail));
                }
                RequestEvent::TimedOut => {
                    return Err(TransportOutcome::failure(
                        ErrorKind::TransportError,
                        format!("timed out after {} ms", descriptor.timeout().as_millis()),
                    ));
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl<E: Environment> Adapter for RequestResponseAdapter<E> {
    fn kind(&self) -> AdapterKind {
        AdapterKind::RequestResponse
    }

    async fn send(&self, descriptor: &RequestDescriptor) -> TransportOutcome {
        let mut exchange = Exchange::new();
        let _ = exchange.begin();
        if let Err(outcome) = self.run(descriptor, &mut exchange).await {
            settle(&mut exchange, outcome);
        }
        exchange.finish()
    }
}
