//! Ingestion batch processor.
//!
//! Takes a batch of mirrored API calls, runs each item's request and
//! response halves through the policy validator, and returns per-index
//! results. Policies and audit policies are fetched once per batch; items
//! are processed sequentially so result order matches input order.

pub mod mirror;

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio_util::task::TaskTracker;

pub use mirror::MirrorClient;

use crate::error::PolicyStoreError;
use crate::policy::{PolicyBundle, PolicyStoreClient};
use crate::validate::{PolicyValidator, ValidationContext};

/// One mirrored API call in an ingestion batch.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IngestRecord {
    pub method: String,
    pub path: String,
    pub ip: String,
    pub dest_ip: String,
    pub time: i64,
    /// Stringified HTTP status of the mirrored response.
    pub status_code: String,
    /// JSON string of the request headers.
    pub request_headers: String,
    /// JSON string of the response headers.
    pub response_headers: String,
    pub request_payload: String,
    pub response_payload: String,
    /// Fields the mirror sends that the validator does not consume.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Per-item validation outcome, indexed into the input batch.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchItemResult {
    pub index: usize,
    pub method: String,
    pub path: String,
    pub request_allowed: bool,
    pub request_modified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_modified_payload: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_error: Option<String>,
    pub response_allowed: bool,
    pub response_modified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_modified_payload: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_error: Option<String>,
}

/// Sequential processor over ingestion batches.
pub struct BatchProcessor {
    store: PolicyStoreClient,
    validator: Arc<PolicyValidator>,
    tasks: TaskTracker,
}

impl BatchProcessor {
    pub fn new(store: PolicyStoreClient, validator: Arc<PolicyValidator>, tasks: TaskTracker) -> Self {
        Self {
            store,
            validator,
            tasks,
        }
    }

    /// Validate every record of a batch.
    ///
    /// The policy bundle is fetched once; a guardrail fetch failure fails
    /// the whole batch. Per-item validation never aborts the batch.
    pub async fn process(
        &self,
        records: &[IngestRecord],
    ) -> Result<Vec<BatchItemResult>, PolicyStoreError> {
        let bundle = self.store.fetch_policy_bundle().await?;

        let mut results = Vec::with_capacity(records.len());
        for (index, record) in records.iter().enumerate() {
            results.push(self.process_one(index, record, &bundle).await);
        }
        Ok(results)
    }

    async fn process_one(
        &self,
        index: usize,
        record: &IngestRecord,
        bundle: &PolicyBundle,
    ) -> BatchItemResult {
        let ctx = self.context_for(record, bundle);

        let mut result = BatchItemResult {
            index,
            method: record.method.clone(),
            path: record.path.clone(),
            request_allowed: true,
            request_modified: false,
            request_modified_payload: None,
            request_error: None,
            response_allowed: true,
            response_modified: false,
            response_modified_payload: None,
            response_error: None,
        };

        if !record.request_payload.is_empty() {
            let decision = self.validator.validate_request(&ctx).await;
            result.request_allowed = decision.allowed;
            result.request_modified = decision.modified;
            result.request_modified_payload = decision.modified_payload;
            if !decision.allowed {
                result.request_error = decision.reason;
            }
        }

        if !record.response_payload.is_empty() {
            let decision = self.validator.validate_response(&ctx).await;
            result.response_allowed = decision.allowed;
            result.response_modified = decision.modified;
            result.response_modified_payload = decision.modified_payload;
            if !decision.allowed {
                result.response_error = decision.reason;
            }
        }

        result
    }

    fn context_for(&self, record: &IngestRecord, bundle: &PolicyBundle) -> ValidationContext {
        let request_headers = parse_header_map(&record.request_headers);
        let mut ctx = ValidationContext::new();
        ctx.ip = non_empty(&record.ip);
        ctx.endpoint = non_empty(&record.path);
        ctx.method = non_empty(&record.method);
        ctx.mcp_server_name = request_headers.get("x-mcp-server-name").cloned();
        ctx.request_headers = request_headers;
        ctx.response_headers = parse_header_map(&record.response_headers);
        ctx.status_code = record.status_code.parse().ok();
        ctx.request_payload = non_empty(&record.request_payload);
        ctx.response_payload = non_empty(&record.response_payload);
        ctx.policies = bundle.policies.clone();
        ctx.audit_policies = bundle.audit_policies.clone();
        ctx.has_audit_rules = bundle.has_audit_rules();
        ctx.tasks = self.tasks.clone();
        ctx
    }
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Parse a JSON-string header map, stringifying non-string values.
fn parse_header_map(raw: &str) -> HashMap<String, String> {
    let Ok(Value::Object(map)) = serde_json::from_str::<Value>(raw) else {
        return HashMap::new();
    };
    map.into_iter()
        .map(|(key, value)| {
            let value = match value {
                Value::String(s) => s,
                other => other.to_string(),
            };
            (key.to_lowercase(), value)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{LlmClient, MetadataAuditor};
    use crate::scanner::ScannerClient;
    use crate::threat::ThreatReporter;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn store_with_policies(body: Value) -> MockServer {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/fetchGuardrailPolicies"))
            .respond_with(ResponseTemplate::new(200).set_body_json(&body))
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/api/fetchMcpAuditInfo"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .mount(&server)
            .await;

        server
    }

    fn processor(store_uri: &str) -> BatchProcessor {
        let threat = ThreatReporter::new("http://unused", None);
        let validator = PolicyValidator::new(
            ScannerClient::new("http://unused"),
            threat.clone(),
            MetadataAuditor::new(LlmClient::new("http://unused", ""), threat),
            None,
        );
        BatchProcessor::new(
            PolicyStoreClient::new(store_uri, "token"),
            Arc::new(validator),
            TaskTracker::new(),
        )
    }

    fn record(request_payload: &str, response_payload: &str) -> IngestRecord {
        IngestRecord {
            method: "POST".to_string(),
            path: "/mcp/tools".to_string(),
            ip: "203.0.113.5".to_string(),
            status_code: "200".to_string(),
            request_headers: r#"{"Content-Type":"application/json"}"#.to_string(),
            request_payload: request_payload.to_string(),
            response_payload: response_payload.to_string(),
            ..IngestRecord::default()
        }
    }

    #[tokio::test]
    async fn batch_preserves_order_and_validates_both_halves() {
        let store = store_with_policies(serde_json::json!([{
            "name": "default",
            "active": true,
            "applyOnRequest": true,
            "applyOnResponse": true,
            "piiTypes": [{"type": "email", "behavior": "mask"}]
        }]))
        .await;

        let processor = processor(&store.uri());
        let records = vec![
            record("write to alice@example.com", ""),
            record("", "from bob@example.com"),
            record(r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#, ""),
        ];

        let results = processor.process(&records).await.expect("batch");
        assert_eq!(results.len(), 3);

        assert_eq!(results[0].index, 0);
        assert!(results[0].request_modified);
        assert_eq!(
            results[0].request_modified_payload.as_deref(),
            Some("write to [EMAIL_REDACTED]")
        );
        assert!(!results[0].response_modified);

        assert_eq!(results[1].index, 1);
        assert!(!results[1].request_modified);
        assert!(results[1].response_modified);

        assert_eq!(results[2].index, 2);
        assert!(results[2].request_allowed);
        assert!(!results[2].request_modified);
    }

    #[tokio::test]
    async fn blocked_half_records_reason_without_aborting() {
        let store = store_with_policies(serde_json::json!([{
            "name": "default",
            "active": true,
            "applyOnRequest": true,
            "applyOnResponse": false,
            "piiTypes": [{"type": "ssn", "behavior": "block"}]
        }]))
        .await;

        let processor = processor(&store.uri());
        let records = vec![record("ssn 123-45-6789", ""), record("harmless", "")];

        let results = processor.process(&records).await.expect("batch");
        assert!(!results[0].request_allowed);
        assert!(results[0].request_error.is_some());
        assert!(results[1].request_allowed);
    }

    #[tokio::test]
    async fn policy_fetch_failure_fails_the_batch() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/fetchGuardrailPolicies"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad upstream"))
            .mount(&server)
            .await;

        let processor = processor(&server.uri());
        let err = processor.process(&[record("x", "")]).await.unwrap_err();
        match err {
            PolicyStoreError::Api { status, .. } => assert_eq!(status, 502),
            other => panic!("expected Api, got: {other}"),
        }
    }

    #[test]
    fn header_map_parsing_lowercases_and_stringifies() {
        let map = parse_header_map(r#"{"X-User-Id":"u1","X-Count":7}"#);
        assert_eq!(map.get("x-user-id").map(String::as_str), Some("u1"));
        assert_eq!(map.get("x-count").map(String::as_str), Some("7"));
        assert!(parse_header_map("not json").is_empty());
    }

    #[test]
    fn ingest_record_deserializes_camel_case() {
        let record: IngestRecord = serde_json::from_str(
            r#"{"method":"POST","path":"/mcp","ip":"1.2.3.4","destIp":"5.6.7.8",
                "time":1700000000,"statusCode":"200","requestHeaders":"{}",
                "responseHeaders":"{}","requestPayload":"{}","responsePayload":"{}",
                "akto_account_id":"a1"}"#,
        )
        .expect("deserialize");
        assert_eq!(record.dest_ip, "5.6.7.8");
        assert_eq!(record.extra.get("akto_account_id").and_then(Value::as_str), Some("a1"));
    }
}
