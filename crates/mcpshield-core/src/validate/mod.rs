//! Policy validator: composes every validator under a fixed ordering.
//!
//! Request path: rate-limit, audit, extractor, local matchers, scanner
//! fan-out. Response path: response-side rules only, plus the detached
//! metadata audit for `tools/list`. Every block or modify enqueues exactly
//! one threat report on the context's task tracker.
//!
//! The orchestrator never fails: validator-internal errors degrade to allow.

pub mod audit;
pub mod patterns;
pub mod rate_limit;
pub mod types;

use std::sync::Arc;

use serde_json::Value;

pub use types::{blocked_response, ValidationContext, ValidationResult};

use crate::config::EngineConfig;
use crate::mcp;
use crate::metadata::{LlmClient, MetadataAuditor};
use crate::policy::types::GUARDRAIL_POLICY_ID;
use crate::policy::FilterRuleType;
use crate::scanner::{self, ScanRequest, ScannerClient};
use crate::storage::KvStore;
use crate::threat::{MaliciousEvent, ThreatReporter};

/// Which rule list of a policy applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RuleSide {
    Request,
    Response,
}

/// A scanner invocation queued during the local rule pass, tagged with its
/// originating policy.
struct ScanTask {
    request: ScanRequest,
    policy_id: String,
    policy_name: String,
}

/// The validation orchestrator.
pub struct PolicyValidator {
    scanner: ScannerClient,
    threat: ThreatReporter,
    metadata: MetadataAuditor,
    kv: Option<Arc<dyn KvStore>>,
}

impl PolicyValidator {
    pub fn new(
        scanner: ScannerClient,
        threat: ThreatReporter,
        metadata: MetadataAuditor,
        kv: Option<Arc<dyn KvStore>>,
    ) -> Self {
        Self {
            scanner,
            threat,
            metadata,
            kv,
        }
    }

    /// Wire every egress client from one engine config.
    pub fn from_config(config: &EngineConfig, kv: Option<Arc<dyn KvStore>>) -> Self {
        let threat = ThreatReporter::new(
            config.threat_backend_url.clone(),
            config.threat_backend_token.clone(),
        );
        let llm = LlmClient::new(
            config.policy_store_url.clone(),
            config.policy_store_token.clone(),
        );
        Self::new(
            ScannerClient::new(config.scanner_url.clone()),
            threat.clone(),
            MetadataAuditor::new(llm, threat),
            kv,
        )
    }

    /// Validate the request half of a call.
    pub async fn validate_request(&self, ctx: &ValidationContext) -> ValidationResult {
        let Some(payload) = non_empty(ctx.request_payload.as_deref()) else {
            return ValidationResult::allow();
        };

        if let Some(kv) = &self.kv {
            if let Some(result) = rate_limit::check(kv.as_ref(), ctx, payload).await {
                if !result.allowed {
                    return self.finish(ctx, result, payload);
                }
            }
        }

        if ctx.has_audit_rules {
            if let Some(result) = audit::evaluate(ctx, payload) {
                if !result.allowed {
                    return self.finish(ctx, result, payload);
                }
            }
        }

        let result = self.apply_policies(ctx, payload, RuleSide::Request).await;
        self.finish(ctx, result, payload)
    }

    /// Validate the response half of a call.
    ///
    /// Also kicks off the detached metadata audit when the originating
    /// request was `tools/list`.
    pub async fn validate_response(&self, ctx: &ValidationContext) -> ValidationResult {
        let request_method = ctx
            .request_payload
            .as_deref()
            .and_then(mcp::method_of);
        if request_method.as_deref() == Some("tools/list") && ctx.response_payload.is_some() {
            let auditor = self.metadata.clone();
            let audit_ctx = ctx.clone();
            ctx.tasks.spawn(async move {
                auditor.audit_tools_list(audit_ctx).await;
            });
        }

        let Some(payload) = non_empty(ctx.response_payload.as_deref()) else {
            return ValidationResult::allow();
        };

        let result = self.apply_policies(ctx, payload, RuleSide::Response).await;
        self.finish(ctx, result, payload)
    }

    /// Run the local matchers and the scanner fan-out for one payload side.
    async fn apply_policies(
        &self,
        ctx: &ValidationContext,
        payload: &str,
        side: RuleSide,
    ) -> ValidationResult {
        let scannable = mcp::extract_scannable_content(payload);
        if scannable.is_empty() {
            // Safe protocol method: nothing to scan.
            return ValidationResult::allow();
        }

        let mut text = scannable.clone();
        let mut redaction: Option<ValidationResult> = None;
        let mut scan_tasks: Vec<ScanTask> = Vec::new();

        for policy in ctx.policies.iter().filter(|p| p.active) {
            let rules = match side {
                RuleSide::Request => &policy.request_rules,
                RuleSide::Response => &policy.response_rules,
            };
            for rule in rules {
                match rule.rule_type {
                    FilterRuleType::Pii => {
                        if let Some(result) = patterns::apply_pii_rule(&text, rule, &policy.id) {
                            if !result.allowed {
                                return result;
                            }
                            if let Some(redacted) = result.modified_payload.clone() {
                                text = redacted;
                                redaction = Some(result);
                            }
                        }
                    }
                    FilterRuleType::Regex => {
                        if let Some(result) = patterns::apply_regex_rule(&text, rule, &policy.id) {
                            if !result.allowed {
                                return result;
                            }
                            if let Some(redacted) = result.modified_payload.clone() {
                                text = redacted;
                                redaction = Some(result);
                            }
                        }
                    }
                    rule_type if scanner::is_scanner_filter_type(rule_type) => {
                        for name in scanner::scanner_names_for(rule_type) {
                            scan_tasks.push(ScanTask {
                                request: ScanRequest {
                                    scanner_name: (*name).to_string(),
                                    config: rule.config.clone(),
                                },
                                policy_id: policy.id.clone(),
                                policy_name: policy.name.clone(),
                            });
                        }
                    }
                    // banTopics / banSubstrings and the rest have no local
                    // matcher and are not scanner filter types.
                    _ => {}
                }
            }
        }

        if !scan_tasks.is_empty() {
            if let Some(result) = self.run_scanners(&scannable, &scan_tasks).await {
                return result;
            }
        }

        redaction.unwrap_or_else(ValidationResult::allow)
    }

    /// Fan out to the remote scanners; `Some` is a block decision.
    async fn run_scanners(&self, text: &str, tasks: &[ScanTask]) -> Option<ValidationResult> {
        let requests: Vec<ScanRequest> = tasks.iter().map(|t| t.request.clone()).collect();
        let response = match self.scanner.scan(text, &requests).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!("scanner fan-out rejected, allowing: {e}");
                return None;
            }
        };

        if response.failure_count > 0 {
            tracing::warn!(failures = response.failure_count, "scanner calls failed");
        }

        let rejection = response.results.into_iter().find(|r| !r.is_valid)?;
        let task = tasks
            .iter()
            .find(|t| t.request.scanner_name == rejection.scanner_name);
        let policy_id = task
            .map(|t| t.policy_id.as_str())
            .unwrap_or(GUARDRAIL_POLICY_ID);
        let policy_name = task.map(|t| t.policy_name.as_str()).unwrap_or_default();

        Some(
            ValidationResult::blocked(format!(
                "Content rejected by {} scanner (risk score: {})",
                rejection.scanner_name, rejection.risk_score
            ))
            .with_metadata("policy_id", policy_id)
            .with_metadata("policy_name", policy_name)
            .with_metadata("scanner", rejection.scanner_name)
            .with_metadata("risk_score", rejection.risk_score)
            .with_metadata("details", rejection.details.unwrap_or(Value::Null)),
        )
    }

    /// Enqueue the threat report for a block or modify and hand the result
    /// back. Exactly one report per decided call.
    fn finish(
        &self,
        ctx: &ValidationContext,
        result: ValidationResult,
        payload: &str,
    ) -> ValidationResult {
        if result.allowed && !result.modified {
            return result;
        }

        let response_override = if result.allowed {
            None
        } else {
            let reason = result.reason.as_deref().unwrap_or_default();
            Some(blocked_response(reason, payload).to_string())
        };
        let filter_id = result.policy_id().unwrap_or(GUARDRAIL_POLICY_ID).to_string();
        let event = MaliciousEvent::from_context(ctx, &filter_id, response_override);
        self.threat.spawn_report(&ctx.tasks, event);

        result
    }
}

fn non_empty(payload: Option<&str>) -> Option<&str> {
    payload.filter(|p| !p.is_empty())
}
