//! Reply-style dispatch tests
//!
//! Tests for:
//! - Successful replies
//! - Exactly one outbound message per request
//! - Error replies for invalid envelopes, empty payloads and failing handlers
//! - Missing reply-to addresses
//! - Request timeouts when nobody answers
//! - The client's view of success and error replies

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use nd_dispatch::{
    DispatchClient, DispatchError, DispatchOutcome, Dispatcher, ErrorKind, InMemoryBus, InboundMessage,
    MessageRequester, ReplyHandler, ReplyOutcome, ReplyRequest, Subscription, SubscriptionRegistry,
};

const SUBJECT: &str = "reply-test.subject";
const FAULTY_SUBJECT: &str = "faulty.reply-test.subject";
const NOT_FOUND_SUBJECT: &str = "missing.reply-test.subject";
const PANIC_SUBJECT: &str = "panic.reply-test.subject";
const TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TestData {
    test_property: String,
}

#[derive(Debug, Serialize)]
struct TestResponse {
    result: TestResult,
}

#[derive(Debug, Serialize)]
struct TestResult {
    reply: bool,
}

#[derive(Clone, Copy)]
enum Behaviour {
    Succeed,
    Fail,
    NotFound,
    Panic,
}

struct TestReplyHandler {
    behaviour: Behaviour,
}

#[async_trait]
impl ReplyHandler for TestReplyHandler {
    type Payload = TestData;
    type Response = TestResponse;

    async fn handle(&self, payload: TestData) -> nd_dispatch::Result<TestResponse> {
        match self.behaviour {
            Behaviour::Succeed => Ok(TestResponse {
                result: TestResult {
                    reply: payload.test_property == "test",
                },
            }),
            Behaviour::Fail => Err(anyhow::anyhow!("Error thrown for testing purposes").into()),
            Behaviour::NotFound => Err(DispatchError::not_found(format!(
                "Couldn't find anything for {}",
                payload.test_property
            ))),
            Behaviour::Panic => panic!("reply handler panicked"),
        }
    }
}

struct Harness {
    bus: Arc<InMemoryBus>,
    dispatcher: Arc<Dispatcher>,
}

fn harness() -> Harness {
    nd_common::logging::init_test_logging();

    let mut registry = SubscriptionRegistry::new("test-group");
    for (subject, behaviour) in [
        (SUBJECT, Behaviour::Succeed),
        (FAULTY_SUBJECT, Behaviour::Fail),
        (NOT_FOUND_SUBJECT, Behaviour::NotFound),
        (PANIC_SUBJECT, Behaviour::Panic),
    ] {
        registry
            .register(Subscription::reply(subject, TestReplyHandler { behaviour }))
            .unwrap();
    }

    let bus = InMemoryBus::new();
    let dispatcher = Arc::new(Dispatcher::new(registry, bus.clone()));
    bus.attach(&dispatcher);

    Harness { bus, dispatcher }
}

async fn request(h: &Harness, subject: &str, body: &str) -> Value {
    let reply = h
        .bus
        .request(subject, Bytes::copy_from_slice(body.as_bytes()), TIMEOUT)
        .await
        .unwrap();
    serde_json::from_slice(&reply).unwrap()
}

fn error_reply(name: &str, message: &str) -> Value {
    json!({"error": {"name": name, "message": message}})
}

#[tokio::test]
async fn test_valid_request_gets_reply() {
    let h = harness();

    let reply = request(
        &h,
        SUBJECT,
        r#"{"params":{"userId":"123"},"correlationId":"123","data":{"testProperty":"test"},"ignored":true}"#,
    )
    .await;

    assert_eq!(reply, json!({"result": {"reply": true}}));
    h.bus.settle().await;
    assert_eq!(h.bus.published().len(), 1);
    assert_eq!(h.dispatcher.metrics().outcome_count(SUBJECT, "OK"), 1);
}

#[tokio::test]
async fn test_missing_correlation_id_gets_bad_request() {
    let h = harness();

    let reply = request(&h, SUBJECT, r#"{"params":{"userId":"123"},"data":{"testProperty":"test"}}"#).await;

    assert_eq!(
        reply,
        error_reply(
            "BadRequestError",
            "Incoming message is invalid: Message is missing value for correlationId"
        )
    );
    h.bus.settle().await;
    assert_eq!(h.bus.published().len(), 1);
    assert_eq!(h.dispatcher.metrics().outcome_count(SUBJECT, "BadRequestError"), 1);
}

#[tokio::test]
async fn test_missing_params_gets_bad_request() {
    let h = harness();

    let reply = request(&h, SUBJECT, r#"{"correlationId":"123","data":{"testProperty":"test"}}"#).await;

    assert_eq!(
        reply,
        error_reply(
            "BadRequestError",
            "Incoming message is invalid: Message is missing value for params"
        )
    );
}

#[tokio::test]
async fn test_missing_data_gets_bad_request() {
    let h = harness();

    let reply = request(&h, SUBJECT, r#"{"params":{"userId":"123"},"correlationId":"123"}"#).await;

    assert_eq!(
        reply,
        error_reply(
            "BadRequestError",
            "Incoming message is invalid: Message data is missing value for data"
        )
    );
}

#[tokio::test]
async fn test_missing_payload_field_gets_bad_request() {
    let h = harness();

    let reply = request(
        &h,
        SUBJECT,
        r#"{"params":{"userId":"123"},"correlationId":"123","data":{"unknownProperty":"test"}}"#,
    )
    .await;

    assert_eq!(
        reply,
        error_reply(
            "BadRequestError",
            "Incoming message is invalid: Message data is missing value for testProperty"
        )
    );
    h.bus.settle().await;
    assert_eq!(h.bus.published().len(), 1);
}

#[tokio::test]
async fn test_non_object_message_gets_bad_request() {
    let h = harness();

    let reply = request(&h, SUBJECT, "null").await;

    assert_eq!(
        reply,
        error_reply("BadRequestError", "Incoming message is invalid: Message is not a JSON object")
    );
}

#[tokio::test]
async fn test_failing_handler_gets_unexpected_error() {
    let h = harness();

    let reply = request(
        &h,
        FAULTY_SUBJECT,
        r#"{"params":{},"correlationId":"123","data":{"testProperty":"test"}}"#,
    )
    .await;

    assert_eq!(reply, error_reply("UnexpectedError", "Error thrown for testing purposes"));
    h.bus.settle().await;
    assert_eq!(h.bus.published().len(), 1);
    assert_eq!(h.dispatcher.metrics().outcome_count(FAULTY_SUBJECT, "UnexpectedError"), 1);
}

#[tokio::test]
async fn test_empty_payload_names_subject() {
    let h = harness();

    let reply = request(&h, FAULTY_SUBJECT, "").await;

    assert_eq!(
        reply,
        error_reply(
            "BadRequestError",
            "Incoming subscription faulty.reply-test.subject message has no data"
        )
    );
    h.bus.settle().await;
    assert_eq!(h.bus.published().len(), 1);
}

#[tokio::test]
async fn test_not_found_from_handler() {
    let h = harness();

    let reply = request(
        &h,
        NOT_FOUND_SUBJECT,
        r#"{"params":{},"correlationId":"123","data":{"testProperty":"cat-5"}}"#,
    )
    .await;

    assert_eq!(reply, error_reply("NotFoundError", "Couldn't find anything for cat-5"));
    h.bus.settle().await;
    assert_eq!(h.bus.published().len(), 1);
    assert_eq!(h.dispatcher.metrics().outcome_count(NOT_FOUND_SUBJECT, "NotFoundError"), 1);
}

#[tokio::test]
async fn test_panicking_handler_still_replies() {
    let h = harness();

    let reply = request(
        &h,
        PANIC_SUBJECT,
        r#"{"params":{},"correlationId":"123","data":{"testProperty":"test"}}"#,
    )
    .await;

    assert_eq!(reply["error"]["name"], "UnexpectedError");
    assert_eq!(reply["error"]["message"], "Handler panicked: reply handler panicked");
    h.bus.settle().await;
    assert_eq!(h.bus.published().len(), 1);
}

#[tokio::test]
async fn test_missing_reply_to_publishes_nothing() {
    let h = harness();

    let message = InboundMessage::new(
        SUBJECT,
        Bytes::from_static(br#"{"params":{},"correlationId":"123","data":{"testProperty":"test"}}"#),
    );
    let outcome = h.dispatcher.on_message(message).await;

    assert_eq!(
        outcome,
        DispatchOutcome::Failed {
            kind: ErrorKind::Unexpected,
            replied: false
        }
    );
    assert!(h.bus.published().is_empty());
    assert_eq!(h.dispatcher.metrics().outcome_count(SUBJECT, "UnexpectedError"), 1);
}

#[tokio::test]
async fn test_request_to_unregistered_subject_times_out() {
    let h = harness();

    let result = h
        .bus
        .request("nobody.listens", Bytes::from_static(b"{}"), Duration::from_millis(50))
        .await;

    assert!(matches!(
        result,
        Err(DispatchError::RequestTimeout { ref subject, .. }) if subject == "nobody.listens"
    ));
}

#[tokio::test]
async fn test_client_decodes_success_and_error_replies() {
    let h = harness();
    let client = DispatchClient::new(h.bus.clone(), TIMEOUT);

    let ok = client
        .request_json(SUBJECT, &ReplyRequest::new(json!({"testProperty": "test"})))
        .await
        .unwrap();
    assert_eq!(ok, ReplyOutcome::Success(json!({"result": {"reply": true}})));

    let err = client
        .request_json(FAULTY_SUBJECT, &ReplyRequest::new(json!({"testProperty": "test"})))
        .await
        .unwrap();
    match err {
        ReplyOutcome::Error(reply) => {
            assert_eq!(reply.kind(), Some(ErrorKind::Unexpected));
            assert_eq!(reply.error.message, "Error thrown for testing purposes");
        }
        other => panic!("expected error reply, got {:?}", other),
    }
}

#[tokio::test]
async fn test_concurrent_requests_are_all_answered() {
    let h = Arc::new(harness());

    let tasks: Vec<_> = (0..16)
        .map(|i| {
            let h = h.clone();
            tokio::spawn(async move {
                let subject = if i % 2 == 0 { SUBJECT } else { FAULTY_SUBJECT };
                let body = r#"{"params":{},"correlationId":"c","data":{"testProperty":"test"}}"#;
                request(&h, subject, body).await
            })
        })
        .collect();

    for task in tasks {
        let reply = task.await.unwrap();
        assert!(reply.get("result").is_some() || reply.get("error").is_some());
    }

    h.bus.settle().await;
    assert_eq!(h.bus.published().len(), 16);
    let metrics = h.dispatcher.metrics();
    assert_eq!(metrics.outcome_count(SUBJECT, "OK"), 8);
    assert_eq!(metrics.outcome_count(FAULTY_SUBJECT, "UnexpectedError"), 8);
}
