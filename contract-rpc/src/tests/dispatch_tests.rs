//! Dispatcher tests over an in-memory request

use crate::prelude::*;
use crate::tests::fixtures::{
    CallCounter, GreetingInput, MockRequest, greeting_contract, greeting_handler, greeting_router,
    meta_only_handler,
};
use crate::ConfigValidationError;
use bytes::Bytes;
use http::{Method, StatusCode};
use serde_json::{Value, json};

fn matched(outcome: DispatchOutcome) -> RpcHttpResponse {
    outcome.into_response().expect("request should match a procedure")
}

// =============================================================================
// Routing
// =============================================================================

#[tokio::test]
async fn requests_outside_the_prefix_fall_through() {
    let handler = greeting_handler(CallCounter::default(), CallCounter::default());

    for path in ["/", "/health", "/rpcx/public/greeting", "/api/public/greeting"] {
        let mut request = MockRequest::post(path, json!({}));
        assert_eq!(handler.handle(&mut request).await, DispatchOutcome::Unmatched, "{}", path);
        assert_eq!(request.generic_reads, 0);
    }
}

#[tokio::test]
async fn undeclared_paths_under_the_prefix_fall_through() {
    let handler = greeting_handler(CallCounter::default(), CallCounter::default());

    for path in ["/rpc", "/rpc/", "/rpc/public", "/rpc/public/farewell", "/rpc/public/greeting/x"] {
        let mut request = MockRequest::post(path, json!({}));
        assert!(!handler.handle(&mut request).await.is_matched(), "{}", path);
    }
}

#[tokio::test]
async fn custom_prefix_is_honoured() {
    let contract = greeting_contract();
    let router = greeting_router(&contract, CallCounter::default(), CallCounter::default());
    let handler = RpcHandler::new(router, RpcConfig::new().with_prefix("/api/v1")).unwrap();

    let mut request = MockRequest::post("/api/v1/public/greeting", json!({}));
    assert_eq!(matched(handler.handle(&mut request).await).status, StatusCode::OK);

    let mut request = MockRequest::post("/rpc/public/greeting", json!({}));
    assert!(!handler.handle(&mut request).await.is_matched());
}

#[test]
fn invalid_configuration_is_rejected() {
    let contract = greeting_contract();
    let router = greeting_router(&contract, CallCounter::default(), CallCounter::default());

    let err = RpcHandler::new(router.clone(), RpcConfig::new().with_prefix("rpc")).unwrap_err();
    assert!(matches!(err, ConfigValidationError::InvalidPrefix(_)));

    let err = RpcHandler::new(router, RpcConfig::new().with_max_input_size(0)).unwrap_err();
    assert!(matches!(err, ConfigValidationError::InvalidMaxInputSize));
}

// =============================================================================
// Calls
// =============================================================================

#[tokio::test]
async fn post_public_greeting() {
    let handler = greeting_handler(CallCounter::default(), CallCounter::default());
    let mut request = MockRequest::post("/rpc/public/greeting", json!({ "name": "Ada" }));

    let response = matched(handler.handle(&mut request).await);
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.headers[http::header::CONTENT_TYPE], "application/json");
    assert_eq!(
        response.json_body().unwrap(),
        json!({ "text": "Hello, Ada from public greeting procedure!" })
    );
}

#[tokio::test]
async fn private_greeting_without_session_is_unauthorized() {
    let private_calls = CallCounter::default();
    let handler = greeting_handler(CallCounter::default(), private_calls.clone());

    for token in [None, Some("anonymous"), Some("forged")] {
        let mut request = MockRequest::post("/rpc/private/greeting", json!({}));
        if let Some(token) = token {
            request = request.with_bearer(token);
        }
        let response = matched(handler.handle(&mut request).await);
        assert_eq!(response.status, StatusCode::UNAUTHORIZED);
        assert_eq!(response.json_body().unwrap()["kind"], json!("UNAUTHORIZED"));
    }
    assert_eq!(private_calls.count(), 0);
}

#[tokio::test]
async fn private_greeting_with_session() {
    let private_calls = CallCounter::default();
    let handler = greeting_handler(CallCounter::default(), private_calls.clone());
    let mut request = MockRequest::post("/rpc/private/greeting", json!({})).with_bearer("valid");

    let response = matched(handler.handle(&mut request).await);
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(
        response.json_body().unwrap(),
        json!({ "text": "Hello, Anonymous from private greeting procedure!" })
    );
    assert_eq!(private_calls.count(), 1);
}

#[tokio::test]
async fn get_reads_input_from_the_query() {
    let handler = greeting_handler(CallCounter::default(), CallCounter::default());
    let mut request = MockRequest::new(Method::GET, "/rpc/public/greeting");
    request.query = Some("input=%7B%22name%22%3A%22Bob%22%7D".to_string());

    let response = matched(handler.handle(&mut request).await);
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json_body().unwrap()["text"], json!("Hello, Bob from public greeting procedure!"));
    assert_eq!(request.generic_reads, 0);
}

#[tokio::test]
async fn other_methods_are_not_supported() {
    let public_calls = CallCounter::default();
    let handler = greeting_handler(public_calls.clone(), CallCounter::default());

    for method in [Method::PUT, Method::DELETE, Method::PATCH] {
        let mut request = MockRequest::new(method, "/rpc/public/greeting");
        let response = matched(handler.handle(&mut request).await);
        assert_eq!(response.status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.json_body().unwrap()["kind"], json!("METHOD_NOT_SUPPORTED"));
    }
    assert_eq!(public_calls.count(), 0);
}

#[tokio::test]
async fn oversized_body_is_rejected() {
    let contract = greeting_contract();
    let router = greeting_router(&contract, CallCounter::default(), CallCounter::default());
    let handler = RpcHandler::new(router, RpcConfig::new().with_max_input_size(16)).unwrap();

    let mut request = MockRequest::post("/rpc/public/greeting", json!({ "name": "a".repeat(64) }));
    let response = matched(handler.handle(&mut request).await);
    assert_eq!(response.status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(response.json_body().unwrap()["kind"], json!("PAYLOAD_TOO_LARGE"));
}

#[tokio::test]
async fn malformed_json_is_bad_request() {
    let public_calls = CallCounter::default();
    let handler = greeting_handler(public_calls.clone(), CallCounter::default());
    let mut request = MockRequest::new(Method::POST, "/rpc/public/greeting");
    request.body = Bytes::from_static(b"{\"name\":");

    let response = matched(handler.handle(&mut request).await);
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(public_calls.count(), 0);
}

#[tokio::test]
async fn invalid_input_is_bad_request_with_issues() {
    let handler = greeting_handler(CallCounter::default(), CallCounter::default());
    let mut request = MockRequest::post("/rpc/public/greeting", json!({ "name": 42 }));

    let response = matched(handler.handle(&mut request).await);
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    let body = response.json_body().unwrap();
    assert_eq!(body["kind"], json!("BAD_REQUEST"));
    assert!(body["metadata"]["issues"].is_array());
}

#[tokio::test]
async fn native_json_accessor_is_preferred() {
    let handler = greeting_handler(CallCounter::default(), CallCounter::default());
    let mut request = MockRequest::post("/rpc/public/greeting", json!({ "name": "Ada" }));
    request.native_json = true;

    let response = matched(handler.handle(&mut request).await);
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(request.native_reads, 1);
    assert_eq!(request.generic_reads, 0);
}

async fn echo(_ctx: Context, input: Value) -> RpcResult<Value> {
    Ok(input)
}

fn formats_handler() -> RpcHandler {
    let contract = define_contract(
        ContractTree::new()
            .procedure("form", oc().input::<Value>().body_format(BodyFormat::Form))
            .procedure("text", oc().input::<Value>().body_format(BodyFormat::Text)),
    )
    .unwrap();
    let base = implement(&contract);
    let router = RouterTree::new()
        .procedure(
            "form",
            base.procedure(&contract.procedure::<Value, Value>("form").unwrap()).handler(echo),
        )
        .procedure(
            "text",
            base.procedure(&contract.procedure::<Value, Value>("text").unwrap()).handler(echo),
        )
        .build(&contract)
        .unwrap();
    meta_only_handler(router)
}

fn raw_post(path: &str, body: &'static str) -> MockRequest {
    let mut request = MockRequest::new(Method::POST, path);
    request.body = Bytes::from_static(body.as_bytes());
    request
}

#[tokio::test]
async fn native_form_accessor_is_preferred() {
    let handler = formats_handler();
    let mut request = raw_post("/rpc/form", "name=Ada&city=London");
    request.native_form = true;
    request.native_text = true;

    let response = matched(handler.handle(&mut request).await);
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json_body().unwrap(), json!({ "name": "Ada", "city": "London" }));
    assert_eq!(request.native_reads, 1);
    assert_eq!(request.generic_reads, 0);
}

#[tokio::test]
async fn native_text_accessor_is_preferred() {
    let handler = formats_handler();
    let mut request = raw_post("/rpc/text", "hello there");
    request.native_text = true;
    request.native_json = true;

    let response = matched(handler.handle(&mut request).await);
    assert_eq!(response.json_body().unwrap(), json!("hello there"));
    assert_eq!(request.native_reads, 1);
    assert_eq!(request.generic_reads, 0);
}

#[tokio::test]
async fn generic_body_is_the_fallback_for_every_format() {
    let handler = formats_handler();

    let mut form = raw_post("/rpc/form", "name=Ada+L");
    let response = matched(handler.handle(&mut form).await);
    assert_eq!(response.json_body().unwrap(), json!({ "name": "Ada L" }));
    assert_eq!((form.native_reads, form.generic_reads), (0, 1));

    let mut text = raw_post("/rpc/text", "plain");
    let response = matched(handler.handle(&mut text).await);
    assert_eq!(response.json_body().unwrap(), json!("plain"));
    assert_eq!((text.native_reads, text.generic_reads), (0, 1));
}

#[tokio::test]
async fn json_procedures_ignore_other_native_accessors() {
    let handler = greeting_handler(CallCounter::default(), CallCounter::default());
    let mut request = MockRequest::post("/rpc/public/greeting", json!({ "name": "Ada" }));
    request.native_form = true;
    request.native_text = true;

    let response = matched(handler.handle(&mut request).await);
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!((request.native_reads, request.generic_reads), (0, 1));
}

// =============================================================================
// Failures inside procedures
// =============================================================================

async fn explode(_ctx: Context, _input: NoInput) -> RpcResult<Value> {
    panic!("database password is hunter2");
}

async fn leak(_ctx: Context, _input: NoInput) -> RpcResult<Value> {
    Err(RpcError::internal("connection string postgres://admin:secret@db").with_cause("refused"))
}

fn failing_handler() -> RpcHandler {
    let contract = define_contract(
        ContractTree::new()
            .procedure("explode", oc())
            .procedure("leak", oc()),
    )
    .unwrap();
    let base = implement(&contract);
    let router = RouterTree::new()
        .procedure(
            "explode",
            base.procedure(&contract.procedure::<NoInput, Value>("explode").unwrap()).handler(explode),
        )
        .procedure("leak", base.procedure(&contract.procedure::<NoInput, Value>("leak").unwrap()).handler(leak))
        .build(&contract)
        .unwrap();
    meta_only_handler(router)
}

#[tokio::test]
async fn panics_become_sanitized_internal_errors() {
    let handler = failing_handler();
    let mut request = MockRequest::post("/rpc/explode", Value::Null);

    let response = matched(handler.handle(&mut request).await);
    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        response.json_body().unwrap(),
        json!({ "kind": "INTERNAL", "message": "Internal server error" })
    );
}

#[tokio::test]
async fn internal_errors_never_leak_details() {
    let handler = failing_handler();
    let mut request = MockRequest::post("/rpc/leak", Value::Null);

    let response = matched(handler.handle(&mut request).await);
    let body = String::from_utf8(response.body.to_vec()).unwrap();
    assert!(!body.contains("secret"));
    assert!(!body.contains("refused"));
}

#[tokio::test]
async fn handler_is_shared_across_concurrent_requests() {
    let public_calls = CallCounter::default();
    let handler = greeting_handler(public_calls.clone(), CallCounter::default());

    let tasks: Vec<_> = (0..16)
        .map(|i| {
            let handler = handler.clone();
            tokio::spawn(async move {
                let input = GreetingInput {
                    name: Some(format!("user{}", i)),
                };
                let mut request =
                    MockRequest::post("/rpc/public/greeting", serde_json::to_value(input).unwrap());
                matched(handler.handle(&mut request).await).json_body().unwrap()
            })
        })
        .collect();

    for (i, task) in tasks.into_iter().enumerate() {
        let body = task.await.unwrap();
        assert_eq!(
            body["text"],
            json!(format!("Hello, user{} from public greeting procedure!", i))
        );
    }
    assert_eq!(public_calls.count(), 16);
}
