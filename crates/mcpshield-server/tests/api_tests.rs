//! Integration tests for the mcpshield-server API routes.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::json;
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use mcpshield_core::config::EngineConfig;
use mcpshield_server::state::AppState;

/// Create the test router pointed at a mock policy store.
fn test_router(policy_store_url: &str, enabled: bool) -> axum::Router {
    let config = EngineConfig {
        policy_store_url: policy_store_url.to_string(),
        policy_store_token: "test-token".to_string(),
        guardrails_enabled: enabled,
        ..EngineConfig::default()
    };
    mcpshield_server::build_router(Arc::new(AppState::from_config(config)))
}

/// Mount guardrail and audit endpoints returning the given policy lists.
async fn mock_policy_store(
    guardrail_policies: serde_json::Value,
    audit_policies: serde_json::Value,
) -> MockServer {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/fetchGuardrailPolicies"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&guardrail_policies))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/fetchMcpAuditInfo"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&audit_policies))
        .mount(&server)
        .await;

    server
}

/// Helper: send a POST request with a JSON body and parse the response.
async fn post_json(
    router: axum::Router,
    uri: &str,
    body: serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    let req = Request::builder()
        .method("POST")
        .uri(uri)
        .header("Content-Type", "application/json")
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .expect("build request");

    let response = router.oneshot(req).await.expect("send request");
    let status = response.status();
    let bytes = response.into_body().collect().await.expect("read body");
    let json: serde_json::Value = serde_json::from_slice(&bytes.to_bytes()).expect("parse JSON");

    (status, json)
}

#[tokio::test]
async fn health_endpoint_reports_healthy() {
    let store = mock_policy_store(json!([]), json!([])).await;
    let router = test_router(&store.uri(), true);

    let req = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .expect("build request");
    let response = router.oneshot(req).await.expect("send request");
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = response.into_body().collect().await.expect("read body");
    let body: serde_json::Value = serde_json::from_slice(&bytes.to_bytes()).expect("json");
    assert_eq!(body["success"], true);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn validate_request_allows_safe_method() {
    let store = mock_policy_store(
        json!([{
            "name": "default",
            "active": true,
            "applyOnRequest": true,
            "contentFilters": {"harmfulCategories": true}
        }]),
        json!([]),
    )
    .await;
    let router = test_router(&store.uri(), true);

    let (status, body) = post_json(
        router,
        "/api/validate/request",
        json!({"payload": "{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"ping\"}"}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["allowed"], true);
    assert_eq!(body["modified"], false);
}

#[tokio::test]
async fn validate_request_redacts_pii() {
    let store = mock_policy_store(
        json!([{
            "name": "default",
            "active": true,
            "applyOnRequest": true,
            "piiTypes": [{"type": "email", "behavior": "mask"}]
        }]),
        json!([]),
    )
    .await;
    let router = test_router(&store.uri(), true);

    let (status, body) = post_json(
        router,
        "/api/validate/request",
        json!({"payload": "Contact me at alice@example.com"}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["allowed"], true);
    assert_eq!(body["modified"], true);
    assert_eq!(body["modifiedPayload"], "Contact me at [EMAIL_REDACTED]");
}

#[tokio::test]
async fn validate_request_blocks_rejected_audit_resource() {
    let store = mock_policy_store(
        json!([]),
        json!([{"resourceName": "delete_all", "remarks": "Rejected", "markedBy": "admin"}]),
    )
    .await;
    let router = test_router(&store.uri(), true);

    let (status, body) = post_json(
        router,
        "/api/validate/request",
        json!({"payload":
            "{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"tools/call\",\"params\":{\"name\":\"delete_all\"}}"
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["allowed"], false);
    assert_eq!(
        body["reason"],
        "Resource access has been rejected by Audit Policy"
    );
}

#[tokio::test]
async fn validate_surfaces_policy_store_outage() {
    let store = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/fetchGuardrailPolicies"))
        .respond_with(ResponseTemplate::new(503).set_body_string("down"))
        .mount(&store)
        .await;

    let router = test_router(&store.uri(), true);
    let (status, body) = post_json(
        router,
        "/api/validate/request",
        json!({"payload": "anything"}),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body["error"].as_str().unwrap().contains("503"));
}

#[tokio::test]
async fn validate_disabled_guardrails_allow_without_fetch() {
    // No policy store mounted at all: a fetch attempt would fail loudly.
    let router = test_router("http://127.0.0.1:1", false);

    let (status, body) = post_json(
        router,
        "/api/validate/request",
        json!({"payload": "ssn 123-45-6789"}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["allowed"], true);
}

#[tokio::test]
async fn ingest_returns_per_item_results() {
    let store = mock_policy_store(
        json!([{
            "name": "default",
            "active": true,
            "applyOnRequest": true,
            "applyOnResponse": true,
            "piiTypes": [{"type": "email", "behavior": "mask"}]
        }]),
        json!([]),
    )
    .await;
    let router = test_router(&store.uri(), true);

    let (status, body) = post_json(
        router,
        "/api/ingestData",
        json!({"batchData": [
            {
                "method": "POST",
                "path": "/mcp/tools",
                "ip": "203.0.113.5",
                "statusCode": "200",
                "requestHeaders": "{}",
                "responseHeaders": "{}",
                "requestPayload": "write to alice@example.com",
                "responsePayload": ""
            },
            {
                "method": "POST",
                "path": "/mcp/tools",
                "ip": "203.0.113.5",
                "statusCode": "200",
                "requestHeaders": "{}",
                "responseHeaders": "{}",
                "requestPayload": "{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"ping\"}",
                "responsePayload": ""
            }
        ]}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["result"], "SUCCESS");
    let results = body["results"].as_array().expect("results");
    assert_eq!(results.len(), 2);
    assert_eq!(results[0]["index"], 0);
    assert_eq!(results[0]["requestModified"], true);
    assert_eq!(
        results[0]["requestModifiedPayload"],
        "write to [EMAIL_REDACTED]"
    );
    assert_eq!(results[1]["requestAllowed"], true);
    assert_eq!(results[1]["requestModified"], false);
}

#[tokio::test]
async fn ingest_reports_policy_store_failure_as_error_envelope() {
    let store = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/fetchGuardrailPolicies"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&store)
        .await;

    let router = test_router(&store.uri(), true);
    let (status, body) = post_json(
        router,
        "/api/ingestData",
        json!({"batchData": [{"requestPayload": "x"}]}),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["success"], false);
    assert_eq!(body["result"], "ERROR");
    assert!(body["errors"].as_array().is_some_and(|e| !e.is_empty()));
}

#[tokio::test]
async fn ingest_rejects_malformed_batch_body() {
    let store = mock_policy_store(json!([]), json!([])).await;
    let router = test_router(&store.uri(), true);

    let (status, body) = post_json(
        router,
        "/api/ingestData",
        json!({"batchData": "not-a-list"}),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["result"], "ERROR");
}
