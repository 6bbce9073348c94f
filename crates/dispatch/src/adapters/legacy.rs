//! Legacy cross-domain adapter.
//!
//! The legacy primitive knows only GET and POST, cannot carry custom headers
//! and reports no status code: a load is a success, anything else a
//! transport error. Verbs other than GET are sent as POST, and so is a GET
//! whose payload cannot travel in the query string.

use std::sync::Arc;

use async_trait::async_trait;
use protocol::{
    Environment, ErrorKind, Exchange, LegacyConnection, LegacyEvent, Payload, RequestDescriptor,
    TransportOutcome, Verb,
};

use super::{settle, Adapter};
use crate::selector::AdapterKind;

/// Sends descriptors over the environment's legacy cross-domain primitive.
pub struct LegacyAdapter<E: Environment> {
    env: Arc<E>,
}

impl<E: Environment> LegacyAdapter<E> {
    /// Creates the adapter.
    pub fn new(env: Arc<E>) -> Self {
        Self { env }
    }

    async fn run(
        &self,
        descriptor: &RequestDescriptor,
        exchange: &mut Exchange,
    ) -> Result<(), TransportOutcome> {
        let Some(mut conn) = self.env.legacy_connection() else {
            return Err(TransportOutcome::failure(
                ErrorKind::TransportUnavailable,
                "legacy cross-domain transport is not available",
            ));
        };

        let query_only = matches!(descriptor.payload(), Payload::Empty | Payload::Structured(_));
        let (verb, url, body) = match descriptor.verb() {
            Verb::Get if query_only => (Verb::Get, descriptor.effective_url()?, None),
            other => {
                if other != Verb::Post {
                    tracing::debug!(verb = %other, "legacy transport sends this verb as POST");
                }
                (
                    Verb::Post,
                    descriptor.destination().clone(),
                    descriptor.payload().to_text()?,
                )
            }
        };
        if !descriptor.headers().is_empty() {
            tracing::debug!(
                count = descriptor.headers().len(),
                "legacy transport drops custom headers"
            );
        }

        if let Some(deadline) = descriptor.deadline() {
            conn.set_timeout(deadline);
        }
        conn.open(verb, &url)?;
        let _ = exchange.opened();
        conn.send(body)?;
        let _ = exchange.sent();
        tracing::debug!(%verb, %url, "legacy request sent");

        await_completion(conn.as_mut(), descriptor, exchange).await
    }
}

async fn await_completion(
    conn: &mut dyn LegacyConnection,
    descriptor: &RequestDescriptor,
    exchange: &mut Exchange,
) -> Result<(), TransportOutcome> {
    while let Some(event) = conn.next_event().await {
        match event {
            LegacyEvent::Progress => tracing::trace!("legacy progress"),
            LegacyEvent::Load(body) => {
                settle(exchange, TransportOutcome::success(body));
                return Ok(());
            }
            LegacyEvent::Error(detail) => {
                return Err(TransportOutcome::failure(ErrorKind::TransportError, detail));
            }
            LegacyEvent::TimedOut => {
                return Err(TransportOutcome::failure(
                    ErrorKind::TransportError,
                    format!("timed out after {} ms", descriptor.timeout().as_millis()),
                ));
            }
        }
    }
    Ok(())
}

#[async_trait]
impl<E: Environment> Adapter for LegacyAdapter<E> {
    fn kind(&self) -> AdapterKind {
        AdapterKind::Legacy
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{LegacyScript, ScriptedEnvironment};
    use serde_json::json;
    use std::time::Duration;

    #[tokio::test]
    async fn missing_constructor_is_unavailable() {
        let env = Arc::new(ScriptedEnvironment::new());
        let descriptor = RequestDescriptor::builder("https://api.test/x").unwrap().build();

        let outcome = LegacyAdapter::new(env).send(&descriptor).await;
        assert_eq!(outcome.error_kind(), Some(ErrorKind::TransportUnavailable));
    }

    #[tokio::test]
    async fn load_event_delivers_body() {
        let env = Arc::new(
            ScriptedEnvironment::new().with_legacy(LegacyScript::Load("stored".into())),
        );
        let descriptor = RequestDescriptor::builder("https://api.test/save")
            .unwrap()
            .verb(Verb::Post)
            .payload(Payload::Structured(json!({"k": "v"})))
            .header("X-Custom", "dropped")
            .timeout(Duration::from_millis(250))
            .build();

        let outcome = LegacyAdapter::new(Arc::clone(&env)).send(&descriptor).await;
        assert_eq!(outcome, TransportOutcome::success("stored"));

        let sent = &env.journal().legacy[0];
        assert_eq!(sent.verb, Verb::Post);
        assert_eq!(sent.body.as_deref(), Some(r#"{"k":"v"}"#));
        assert_eq!(sent.timeout, Some(Duration::from_millis(250)));
    }

    #[tokio::test]
    async fn unsupported_verbs_are_sent_as_post() {
        let env = Arc::new(ScriptedEnvironment::new().with_legacy(LegacyScript::Load(String::new())));
        let descriptor = RequestDescriptor::builder("https://api.test/item/7")
            .unwrap()
            .verb(Verb::Delete)
            .build();

        LegacyAdapter::new(Arc::clone(&env)).send(&descriptor).await;
        let sent = &env.journal().legacy[0];
        assert_eq!(sent.verb, Verb::Post);
        assert_eq!(sent.url.as_str(), "https://api.test/item/7");
    }

    #[tokio::test]
    async fn get_sends_query_and_no_body() {
        let env = Arc::new(ScriptedEnvironment::new().with_legacy(LegacyScript::Load(String::new())));
        let descriptor = RequestDescriptor::builder("https://api.test/find")
            .unwrap()
            .payload(Payload::Structured(json!({"id": 7})))
            .build();

        LegacyAdapter::new(Arc::clone(&env)).send(&descriptor).await;
        let sent = &env.journal().legacy[0];
        assert_eq!(sent.verb, Verb::Get);
        assert_eq!(sent.url.as_str(), "https://api.test/find?id=7");
        assert_eq!(sent.body, None);
    }

    #[tokio::test]
    async fn get_with_text_payload_is_sent_as_post() {
        let env = Arc::new(ScriptedEnvironment::new().with_legacy(LegacyScript::Load(String::new())));
        let descriptor = RequestDescriptor::builder("https://api.test/find")
            .unwrap()
            .payload(Payload::Text("important".into()))
            .build();

        LegacyAdapter::new(Arc::clone(&env)).send(&descriptor).await;
        let sent = &env.journal().legacy[0];
        assert_eq!(sent.verb, Verb::Post);
        assert_eq!(sent.url.as_str(), "https://api.test/find");
        assert_eq!(sent.body.as_deref(), Some("important"));
    }

    #[tokio::test]
    async fn zero_timeout_is_not_forwarded() {
        let env = Arc::new(ScriptedEnvironment::new().with_legacy(LegacyScript::Load("ok".into())));
        let descriptor = RequestDescriptor::builder("https://api.test/slow")
            .unwrap()
            .timeout(Duration::ZERO)
            .build();

        let outcome = LegacyAdapter::new(Arc::clone(&env)).send(&descriptor).await;
        assert_eq!(outcome, TransportOutcome::success("ok"));
        assert_eq!(env.journal().legacy[0].timeout, None);
    }

    #[tokio::test]
    async fn error_and_timeout_are_transport_errors() {
        let descriptor = RequestDescriptor::builder("https://api.test/x").unwrap().build();
        for script in [LegacyScript::Error("denied".into()), LegacyScript::TimeOut] {
            let env = Arc::new(ScriptedEnvironment::new().with_legacy(script));
            let outcome = LegacyAdapter::new(env).send(&descriptor).await;
            assert_eq!(outcome.error_kind(), Some(ErrorKind::TransportError));
        }
    }
}
