//! Metadata auditor for `tools/list` responses.
//!
//! Walks the returned tool descriptors and asks the LLM endpoint to score
//! each one for malicious intent and name/description coherence. Tools
//! crossing the thresholds are reported to the threat backend with a
//! synthetic per-tool endpoint. The whole audit runs detached; per-tool LLM
//! failures are swallowed.

pub mod schema;

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::error::LlmAuditError;
use crate::threat::{MaliciousEvent, ThreatReporter};
use crate::validate::ValidationContext;

/// Policy id attached to metadata-audit threat reports.
pub const MALICIOUS_COMPONENT_POLICY_ID: &str = "MCPMaliciousComponent";

/// Upper bound on in-flight LLM validations.
pub const MAX_CONCURRENT_AUDITS: usize = 5;

/// Report when the malicious score exceeds this.
pub const MALICIOUS_SCORE_THRESHOLD: f64 = 0.75;

/// Report when the name/description coherence score falls below this.
pub const NAME_MATCH_THRESHOLD: f64 = 0.7;

/// The LLM's verdict on one tool descriptor.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolVerdict {
    pub is_malicious: bool,
    pub malicious_match_score: f64,
    pub tool_name_description_match_score: f64,
    #[serde(default)]
    pub reason: String,
}

impl ToolVerdict {
    /// Whether this verdict warrants a threat report.
    pub fn exceeds_thresholds(&self) -> bool {
        self.malicious_match_score > MALICIOUS_SCORE_THRESHOLD
            || self.tool_name_description_match_score < NAME_MATCH_THRESHOLD
    }
}

/// Build the fixed security-analyst prompt for one tool.
pub fn build_prompt(name: &str, description: &str, flattened_schema: &str) -> String {
    format!(
        "You are a security analyst reviewing tools exposed by an MCP (Model Context Protocol) server. \
Assess the tool below for malicious behaviour (prompt injection, data exfiltration, destructive side effects, \
privilege escalation) and for how well its description matches what its name implies.\n\
\n\
Tool name: {name}\n\
Tool description: {description}\n\
Input schema: {flattened_schema}\n\
\n\
Respond with strict JSON only, no prose, in exactly this shape:\n\
{{\"isMalicious\": <boolean>, \"maliciousMatchScore\": <number between 0 and 1>, \
\"toolNameDescriptionMatchScore\": <number between 0 and 1>, \"reason\": \"<short explanation>\"}}"
    )
}

/// Client for the LLM endpoint behind the database abstractor.
#[derive(Debug, Clone)]
pub struct LlmClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl LlmClient {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            token: token.into(),
        }
    }

    /// Send one scoring prompt and parse the verdict out of the completion.
    pub async fn score_tool(&self, prompt: &str) -> Result<ToolVerdict, LlmAuditError> {
        if self.token.is_empty() {
            return Err(LlmAuditError::NotConfigured);
        }

        let body = json!({
            "llmPayload": {
                "temperature": 0.1,
                "top_p": 0.9,
                "max_tokens": 10000,
                "frequency_penalty": 0,
                "presence_penalty": 0.6,
                "messages": [{ "role": "system", "content": prompt }],
            }
        });

        let response = self
            .client
            .post(format!("{}/api/getLLMResponseV2", self.base_url))
            .header("Authorization", &self.token)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(LlmAuditError::Api { status, message });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| LlmAuditError::Parse(e.to_string()))?;
        let content = body["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| LlmAuditError::Parse("no completion content".to_string()))?;

        parse_verdict(content)
    }
}

/// Extract the `{ ... }` span of a completion and parse it as a verdict.
///
/// LLMs wrap JSON in prose and code fences; everything outside the first
/// `{` and last `}` is discarded.
pub fn parse_verdict(content: &str) -> Result<ToolVerdict, LlmAuditError> {
    let start = content
        .find('{')
        .ok_or_else(|| LlmAuditError::Parse("no JSON object in content".to_string()))?;
    let end = content
        .rfind('}')
        .ok_or_else(|| LlmAuditError::Parse("no JSON object in content".to_string()))?;
    if end < start {
        return Err(LlmAuditError::Parse("malformed JSON span".to_string()));
    }
    serde_json::from_str(&content[start..=end]).map_err(|e| LlmAuditError::Parse(e.to_string()))
}

/// Auditor over the tool descriptors of a `tools/list` response.
#[derive(Debug, Clone)]
pub struct MetadataAuditor {
    llm: LlmClient,
    threat: ThreatReporter,
}

impl MetadataAuditor {
    pub fn new(llm: LlmClient, threat: ThreatReporter) -> Self {
        Self { llm, threat }
    }

    /// Score every tool in the response and report the ones crossing the
    /// thresholds. Never fails; intended to run on a detached task.
    pub async fn audit_tools_list(&self, ctx: ValidationContext) {
        let Some(payload) = ctx.response_payload.clone() else {
            return;
        };
        let Ok(response) = serde_json::from_str::<Value>(&payload) else {
            return;
        };
        let Some(tools) = response["result"]["tools"].as_array().cloned() else {
            return;
        };

        let semaphore = Arc::new(Semaphore::new(MAX_CONCURRENT_AUDITS));
        let mut set = JoinSet::new();
        for tool in tools {
            let auditor = self.clone();
            let ctx = ctx.clone();
            let response = response.clone();
            let semaphore = Arc::clone(&semaphore);
            set.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return;
                };
                auditor.audit_one(&ctx, &response, &tool).await;
            });
        }
        while set.join_next().await.is_some() {}
    }

    async fn audit_one(&self, ctx: &ValidationContext, response: &Value, tool: &Value) {
        let Some(name) = tool.get("name").and_then(Value::as_str) else {
            return;
        };
        let description = tool
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let flattened = schema::flatten_schema(tool.get("inputSchema"));
        let prompt = build_prompt(name, description, &flattened);

        let verdict = match self.llm.score_tool(&prompt).await {
            Ok(verdict) => verdict,
            Err(e) => {
                tracing::warn!(tool = name, "metadata audit failed: {e}");
                return;
            }
        };

        if !verdict.exceeds_thresholds() {
            return;
        }

        tracing::info!(
            tool = name,
            malicious_score = verdict.malicious_match_score,
            name_match_score = verdict.tool_name_description_match_score,
            reason = %verdict.reason,
            "suspicious tool descriptor"
        );

        // Report with a per-tool endpoint and a response trimmed to the
        // offending descriptor.
        let mut filtered = response.clone();
        filtered["result"]["tools"] = json!([tool]);

        let base_endpoint = ctx
            .endpoint
            .clone()
            .unwrap_or_else(|| "/mcp/unknown".to_string());
        let mut report_ctx = ctx.clone();
        report_ctx.endpoint = Some(format!("{base_endpoint}/tools/list/{name}"));

        let event = MaliciousEvent::from_context(
            &report_ctx,
            MALICIOUS_COMPONENT_POLICY_ID,
            Some(filtered.to_string()),
        );
        self.threat.report(&event).await;
    }
}
