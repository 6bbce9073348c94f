//! End-to-end dispatch scenarios against the scripted environment.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use dispatch::mock::{
    LegacyScript, RequestScript, ScriptedEnvironment, SocketScript, LEGACY_USER_AGENT,
};
use dispatch::{AdapterKind, Continuation, Dispatch, Dispatcher, SigningSession};
use pretty_assertions::assert_eq;
use protocol::integrity::{REFERER_HEADER, SIGNATURE_HEADER};
use protocol::{
    ApplicationId, ErrorKind, IntegritySignature, InvokeOptions, TransportOutcome,
};
use serde_json::json;

type Received = Arc<Mutex<Vec<TransportOutcome>>>;

fn recorder() -> (Received, Continuation) {
    let received = Received::default();
    let sink = Arc::clone(&received);
    (
        received,
        Box::new(move |outcome| sink.lock().unwrap().push(outcome)),
    )
}

fn options(value: serde_json::Value) -> InvokeOptions {
    serde_json::from_value(value).unwrap()
}

#[tokio::test]
async fn post_echo_delivers_success_exactly_once() {
    let env = Arc::new(
        ScriptedEnvironment::new().with_request(RequestScript::reply(200, r#"{"a":1}"#)),
    );
    let dispatcher = Dispatcher::new(Arc::clone(&env));
    let (received, continuation) = recorder();

    let dispatch = dispatcher
        .invoke(
            options(json!({"url": "https://api.test/echo", "method": "post", "data": {"a": 1}})),
            continuation,
        )
        .unwrap()
        .await;

    assert!(matches!(dispatch, Dispatch::Delivered(AdapterKind::RequestResponse)));
    assert_eq!(
        *received.lock().unwrap(),
        vec![TransportOutcome::success(r#"{"a":1}"#)]
    );
    assert_eq!(env.journal().requests.len(), 1);
}

#[tokio::test]
async fn socket_ping_pong() {
    let env = Arc::new(ScriptedEnvironment::new().with_socket(SocketScript::echo("pong")));
    let dispatcher = Dispatcher::new(Arc::clone(&env));

    let outcome = dispatcher
        .invoke_and_wait(options(json!({"url": "wss://test/echo", "data": "ping"})))
        .await
        .unwrap();

    assert_eq!(outcome, TransportOutcome::success("pong"));
    let socket = &env.journal().sockets[0];
    assert!(socket.closed);
    assert_eq!(socket.sent.len(), 1);
}

#[tokio::test]
async fn socket_is_chosen_even_for_legacy_clients() {
    let env = Arc::new(
        ScriptedEnvironment::new()
            .with_user_agent(LEGACY_USER_AGENT)
            .with_legacy(LegacyScript::Load("wrong adapter".into()))
            .with_socket(SocketScript::echo("pong")),
    );
    let dispatcher = Dispatcher::new(Arc::clone(&env));
    let (_, continuation) = recorder();

    let dispatch = dispatcher
        .invoke(InvokeOptions::for_url("wss://example/socket"), continuation)
        .unwrap()
        .await;
    assert!(matches!(dispatch, Dispatch::Delivered(AdapterKind::Socket)));
    assert!(env.journal().legacy.is_empty());
}

#[tokio::test]
async fn legacy_requested_without_constructor_is_unavailable() {
    let env = Arc::new(ScriptedEnvironment::new());
    let dispatcher = Dispatcher::new(Arc::clone(&env));

    let outcome = dispatcher
        .invoke_and_wait(options(json!({
            "url": "https://api.test/legacy",
            "transport": "legacy",
        })))
        .await
        .unwrap();

    assert_eq!(outcome.error_kind(), Some(ErrorKind::TransportUnavailable));
    assert!(env.journal().requests.is_empty());
}

#[tokio::test]
async fn cross_origin_legacy_client_uses_legacy_transport() {
    let env = Arc::new(
        ScriptedEnvironment::new()
            .with_user_agent(LEGACY_USER_AGENT)
            .with_location("https://app.example/")
            .with_legacy(LegacyScript::Load("via legacy".into())),
    );
    let dispatcher = Dispatcher::new(Arc::clone(&env));

    let outcome = dispatcher
        .invoke_and_wait(InvokeOptions::for_url("https://api.example/resource"))
        .await
        .unwrap();

    assert_eq!(outcome, TransportOutcome::success("via legacy"));
    assert_eq!(env.journal().legacy.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn offline_arms_one_timer_and_delivers_once_online() {
    let env = Arc::new(ScriptedEnvironment::new().with_request(RequestScript::reply(200, "late")));
    env.set_online(false);
    let dispatcher = Dispatcher::new(Arc::clone(&env));
    let (received, continuation) = recorder();

    let dispatch = dispatcher
        .invoke(InvokeOptions::for_url("https://api.test/x"), continuation)
        .unwrap()
        .await;
    let Dispatch::RetryScheduled(handle) = dispatch else {
        panic!("expected a scheduled retry, got {dispatch:?}");
    };
    assert!(handle.is_armed());
    assert_eq!(env.journal().connections_opened(), 0);

    env.set_online(true);
    tokio::time::sleep(Duration::from_millis(3_599)).await;
    assert!(received.lock().unwrap().is_empty());

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(handle.fired(), 1);
    assert!(!handle.is_armed());
    assert_eq!(
        *received.lock().unwrap(),
        vec![TransportOutcome::success("late")]
    );

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(received.lock().unwrap().len(), 1);
    assert_eq!(env.journal().requests.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_report_network_offline() {
    let env = Arc::new(ScriptedEnvironment::new());
    env.set_online(false);
    let dispatcher = Dispatcher::new(Arc::clone(&env));

    let outcome = dispatcher
        .invoke_and_wait(options(json!({
            "url": "https://api.test/x",
            "interval": 10,
            "retries": 0,
        })))
        .await
        .unwrap();

    assert_eq!(outcome.error_kind(), Some(ErrorKind::NetworkOffline));
    assert_eq!(env.journal().connections_opened(), 0);
}

#[tokio::test]
async fn signed_requests_carry_id_and_digest() {
    let env = Arc::new(ScriptedEnvironment::new().with_request(RequestScript::reply(200, "{}")));
    let session = SigningSession::new(ApplicationId::new("storefront").unwrap());
    let dispatcher = Dispatcher::new(Arc::clone(&env)).with_signing(session);

    dispatcher
        .invoke_and_wait(options(json!({
            "url": "https://api.test/save",
            "method": "POST",
            "data": {"cart": "42"},
        })))
        .await
        .unwrap();
    dispatcher
        .invoke_and_wait(InvokeOptions::for_url("https://api.test/load"))
        .await
        .unwrap();

    let journal = env.journal();
    let with_body = &journal.requests[0];
    assert_eq!(
        with_body.headers.get(REFERER_HEADER).map(String::as_str),
        Some("storefront")
    );
    assert_eq!(
        with_body.headers.get(SIGNATURE_HEADER).map(String::as_str),
        Some(IntegritySignature::over(br#"{"cart":"42"}"#).as_str())
    );

    let without_body = &journal.requests[1];
    assert_eq!(
        without_body.headers.get(SIGNATURE_HEADER).map(String::as_str),
        Some(IntegritySignature::over(b"storefront").as_str())
    );
}

#[tokio::test]
async fn failures_travel_through_the_continuation() {
    let env = Arc::new(ScriptedEnvironment::new().with_request(RequestScript::reply(404, "")));
    let dispatcher = Dispatcher::new(Arc::clone(&env));
    let (received, continuation) = recorder();

    dispatcher
        .invoke(InvokeOptions::for_url("https://api.test/missing"), continuation)
        .unwrap()
        .await;

    assert_eq!(
        *received.lock().unwrap(),
        vec![TransportOutcome::failure(ErrorKind::HttpError, "HTTP 404")]
    );
}
