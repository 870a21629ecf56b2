//! Validation context and result types.

use std::collections::HashMap;

use serde::Serialize;
use serde_json::{json, Map, Value};
use tokio_util::task::TaskTracker;

use crate::policy::{AuditPolicy, Policy, RateLimitConfig};

/// Everything one validation call needs, constructed per request.
///
/// Policies and audit policies are fetched before the call and passed by
/// value; the context is never mutated by the validators.
#[derive(Debug, Clone)]
pub struct ValidationContext {
    /// Client IP, when known.
    pub ip: Option<String>,
    /// Ingress endpoint path.
    pub endpoint: Option<String>,
    /// HTTP method of the mirrored call.
    pub method: Option<String>,
    pub request_headers: HashMap<String, String>,
    pub response_headers: HashMap<String, String>,
    pub status_code: Option<u16>,
    pub request_payload: Option<String>,
    pub response_payload: Option<String>,
    /// MCP server name for server-level audit scoping.
    pub mcp_server_name: Option<String>,
    /// Active policies, already translated to the internal shape.
    pub policies: Vec<Policy>,
    /// Audit policies keyed by lowercased resource name.
    pub audit_policies: HashMap<String, AuditPolicy>,
    /// Whether any audit rules exist; gates the audit validator.
    pub has_audit_rules: bool,
    pub rate_limit: RateLimitConfig,
    /// Handle for detached work that must survive the request lifecycle.
    pub tasks: TaskTracker,
}

impl ValidationContext {
    /// An empty context carrying only a fresh task tracker.
    pub fn new() -> Self {
        Self {
            ip: None,
            endpoint: None,
            method: None,
            request_headers: HashMap::new(),
            response_headers: HashMap::new(),
            status_code: None,
            request_payload: None,
            response_payload: None,
            mcp_server_name: None,
            policies: Vec::new(),
            audit_policies: HashMap::new(),
            has_audit_rules: false,
            rate_limit: RateLimitConfig::default(),
            tasks: TaskTracker::new(),
        }
    }
}

impl Default for ValidationContext {
    fn default() -> Self {
        Self::new()
    }
}

/// The ternary decision produced by each validator and by the orchestrator.
///
/// Invariants enforced by the constructors: a blocked result always has a
/// reason; a modified result always carries the payload and stays allowed.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationResult {
    pub allowed: bool,
    pub modified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified_payload: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl ValidationResult {
    /// Allow, untouched.
    pub fn allow() -> Self {
        Self {
            allowed: true,
            modified: false,
            modified_payload: None,
            reason: None,
            metadata: Map::new(),
        }
    }

    /// Block with a human-readable reason.
    pub fn blocked(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            modified: false,
            modified_payload: None,
            reason: Some(reason.into()),
            metadata: Map::new(),
        }
    }

    /// Allow with a redacted payload.
    pub fn redacted(payload: impl Into<String>) -> Self {
        Self {
            allowed: true,
            modified: true,
            modified_payload: Some(payload.into()),
            reason: None,
            metadata: Map::new(),
        }
    }

    /// Attach a metadata entry.
    pub fn with_metadata(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    /// The `policy_id` metadata entry, when set.
    pub fn policy_id(&self) -> Option<&str> {
        self.metadata.get("policy_id").and_then(Value::as_str)
    }
}

/// The JSON-RPC error envelope returned for a blocked payload.
pub fn blocked_response(reason: &str, original_payload: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "error": {
            "code": -32000,
            "message": "Request blocked by security policy",
            "data": {
                "reason": reason,
                "original_payload": original_payload,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocked_always_has_reason() {
        let result = ValidationResult::blocked("nope");
        assert!(!result.allowed);
        assert_eq!(result.reason.as_deref(), Some("nope"));
    }

    #[test]
    fn redacted_is_allowed_and_modified() {
        let result = ValidationResult::redacted("clean text");
        assert!(result.allowed);
        assert!(result.modified);
        assert_eq!(result.modified_payload.as_deref(), Some("clean text"));
    }

    #[test]
    fn metadata_round_trip() {
        let result = ValidationResult::blocked("r").with_metadata("policy_id", "AuditPolicy");
        assert_eq!(result.policy_id(), Some("AuditPolicy"));
    }

    #[test]
    fn blocked_response_envelope_shape() {
        let envelope = blocked_response("bad tool", "{\"method\":\"tools/call\"}");
        assert_eq!(envelope["jsonrpc"], "2.0");
        assert_eq!(envelope["error"]["code"], -32000);
        assert_eq!(
            envelope["error"]["message"],
            "Request blocked by security policy"
        );
        assert_eq!(envelope["error"]["data"]["reason"], "bad tool");
        assert_eq!(
            envelope["error"]["data"]["original_payload"],
            "{\"method\":\"tools/call\"}"
        );
    }
}
