//! HTTP client for the remote policy store.
//!
//! Both endpoints take a POST with a raw `Authorization: <token>` header (no
//! scheme prefix). Guardrail fetch failures are fatal for the calling
//! request; audit fetch failures degrade to an empty map.

use serde_json::{json, Value};

use super::types::{AuditPolicy, AuditPolicyMap, GuardrailPolicy, Policy};
use crate::error::PolicyStoreError;

/// Policies and audit policies fetched together for one request or batch.
#[derive(Debug, Clone, Default)]
pub struct PolicyBundle {
    pub policies: Vec<Policy>,
    pub audit_policies: AuditPolicyMap,
}

impl PolicyBundle {
    /// Whether any audit rules exist for this bundle.
    pub fn has_audit_rules(&self) -> bool {
        !self.audit_policies.is_empty()
    }
}

/// Client for the policy store backend.
#[derive(Debug, Clone)]
pub struct PolicyStoreClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl PolicyStoreClient {
    /// Create a client against `base_url` authenticating with `token`.
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            token: token.into(),
        }
    }

    /// Fetch and translate the guardrail policies.
    pub async fn fetch_guardrail_policies(&self) -> Result<Vec<Policy>, PolicyStoreError> {
        let body = self
            .post_json("/api/fetchGuardrailPolicies", &json!({}))
            .await?;

        let records = extract_records(&body, &["policies", "guardrailPolicies"])
            .ok_or_else(|| PolicyStoreError::Parse("no policy list in response".to_string()))?;

        let mut policies = Vec::with_capacity(records.len());
        for record in records {
            let authoring: GuardrailPolicy = serde_json::from_value(record.clone())
                .map_err(|e| PolicyStoreError::Parse(e.to_string()))?;
            policies.push(authoring.translate());
        }
        Ok(policies)
    }

    /// Fetch audit policies, keyed by lowercased resource name.
    pub async fn fetch_audit_policies(&self) -> Result<AuditPolicyMap, PolicyStoreError> {
        let body = self
            .post_json(
                "/api/fetchMcpAuditInfo",
                &json!({ "remarksList": ["Conditionally Approved", "Rejected"] }),
            )
            .await?;

        let records = extract_records(&body, &["auditPolicies", "auditInfos", "mcpAuditInfo"])
            .ok_or_else(|| PolicyStoreError::Parse("no audit list in response".to_string()))?;

        let mut map = AuditPolicyMap::new();
        for record in records {
            let policy: AuditPolicy = serde_json::from_value(record.clone())
                .map_err(|e| PolicyStoreError::Parse(e.to_string()))?;
            if policy.resource_name.is_empty() {
                continue;
            }
            map.insert(policy.resource_name.to_lowercase(), policy);
        }
        Ok(map)
    }

    /// Fetch guardrail and audit policies for one request or batch.
    ///
    /// Guardrail failure surfaces; audit failure degrades to an empty map.
    pub async fn fetch_policy_bundle(&self) -> Result<PolicyBundle, PolicyStoreError> {
        let policies = self.fetch_guardrail_policies().await?;
        let audit_policies = match self.fetch_audit_policies().await {
            Ok(map) => map,
            Err(e) => {
                tracing::warn!("audit policy fetch failed, continuing without: {e}");
                AuditPolicyMap::new()
            }
        };
        Ok(PolicyBundle {
            policies,
            audit_policies,
        })
    }

    async fn post_json(&self, path: &str, body: &Value) -> Result<Value, PolicyStoreError> {
        let response = self
            .client
            .post(format!("{}{path}", self.base_url))
            .header("Authorization", &self.token)
            .json(body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(PolicyStoreError::Api { status, message });
        }

        response
            .json()
            .await
            .map_err(|e| PolicyStoreError::Parse(e.to_string()))
    }
}

/// Pull the record list out of a store response: either a bare array or an
/// object with one of the known list keys.
fn extract_records<'a>(body: &'a Value, keys: &[&str]) -> Option<&'a Vec<Value>> {
    if let Some(records) = body.as_array() {
        return Some(records);
    }
    keys.iter().find_map(|key| body.get(key)?.as_array())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::types::{FilterRuleType, RuleAction, GUARDRAIL_POLICY_ID};
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn fetch_guardrail_policies_translates_records() {
        let server = MockServer::start().await;

        let body = serde_json::json!({
            "policies": [{
                "name": "default",
                "active": true,
                "applyOnRequest": true,
                "applyOnResponse": false,
                "contentFilters": {"harmfulCategories": true, "promptAttacks": false},
                "piiTypes": [{"type": "email", "behavior": "mask"}]
            }]
        });

        Mock::given(method("POST"))
            .and(path("/api/fetchGuardrailPolicies"))
            .and(header("authorization", "token-1"))
            .and(body_json(serde_json::json!({})))
            .respond_with(ResponseTemplate::new(200).set_body_json(&body))
            .mount(&server)
            .await;

        let client = PolicyStoreClient::new(server.uri(), "token-1");
        let policies = client.fetch_guardrail_policies().await.expect("fetch");

        assert_eq!(policies.len(), 1);
        assert_eq!(policies[0].id, GUARDRAIL_POLICY_ID);
        assert_eq!(policies[0].request_rules.len(), 2);
        assert!(policies[0].response_rules.is_empty());
        let pii = policies[0]
            .request_rules
            .iter()
            .find(|r| r.rule_type == FilterRuleType::Pii)
            .expect("pii rule");
        assert_eq!(pii.action, RuleAction::Redact);
    }

    #[tokio::test]
    async fn fetch_guardrail_policies_accepts_bare_array() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/fetchGuardrailPolicies"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!([{"name": "p", "active": false}])),
            )
            .mount(&server)
            .await;

        let client = PolicyStoreClient::new(server.uri(), "t");
        let policies = client.fetch_guardrail_policies().await.expect("fetch");
        assert_eq!(policies.len(), 1);
        assert!(!policies[0].active);
    }

    #[tokio::test]
    async fn fetch_guardrail_policies_surfaces_http_errors() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/fetchGuardrailPolicies"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let client = PolicyStoreClient::new(server.uri(), "t");
        let err = client.fetch_guardrail_policies().await.unwrap_err();
        match err {
            PolicyStoreError::Api { status, message } => {
                assert_eq!(status, 500);
                assert_eq!(message, "boom");
            }
            other => panic!("expected Api, got: {other}"),
        }
    }

    #[tokio::test]
    async fn fetch_audit_policies_lowercases_keys() {
        let server = MockServer::start().await;

        let body = serde_json::json!({
            "auditPolicies": [
                {"resourceName": "Delete_All", "remarks": "Rejected", "markedBy": "admin"},
                {"resourceName": "", "remarks": "Approved"}
            ]
        });

        Mock::given(method("POST"))
            .and(path("/api/fetchMcpAuditInfo"))
            .and(body_json(serde_json::json!({
                "remarksList": ["Conditionally Approved", "Rejected"]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(&body))
            .mount(&server)
            .await;

        let client = PolicyStoreClient::new(server.uri(), "t");
        let map = client.fetch_audit_policies().await.expect("fetch");

        assert_eq!(map.len(), 1);
        let policy = map.get("delete_all").expect("lowercased key");
        assert_eq!(policy.remarks, "Rejected");
    }

    #[tokio::test]
    async fn bundle_degrades_on_audit_failure() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/fetchGuardrailPolicies"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/api/fetchMcpAuditInfo"))
            .respond_with(ResponseTemplate::new(500).set_body_string("down"))
            .mount(&server)
            .await;

        let client = PolicyStoreClient::new(server.uri(), "t");
        let bundle = client.fetch_policy_bundle().await.expect("bundle");
        assert!(bundle.policies.is_empty());
        assert!(bundle.audit_policies.is_empty());
        assert!(!bundle.has_audit_rules());
    }
}
