//! Threat backend reporter.
//!
//! Builds the canonical malicious-event record for a blocked or redacted
//! payload and POSTs it to the threat backend. Reporting always runs
//! detached from the request path and never propagates failure.

use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};
use tokio_util::task::TaskTracker;

use crate::error::ThreatReportError;
use crate::validate::ValidationContext;

/// A malicious event as the threat backend expects it.
///
/// `filter_id` is the primary identifier the backend groups recurrences on.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MaliciousEvent {
    pub actor: String,
    pub filter_id: String,
    /// Unix seconds, stringified.
    pub detected_at: String,
    pub latest_api_ip: String,
    pub latest_api_endpoint: String,
    pub latest_api_method: String,
    /// Reuses the detected-at unix second; the backend depends on it.
    pub latest_api_collection_id: i64,
    /// JSON string of the mirrored API call.
    pub latest_api_payload: String,
    pub event_type: String,
    pub category: String,
    pub sub_category: String,
    pub severity: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub metadata: Value,
}

impl MaliciousEvent {
    /// Build an event from a validation context.
    ///
    /// `response_payload` overrides the context's response half; the
    /// orchestrator passes the blocked JSON-RPC envelope here so the backend
    /// sees what the caller was given.
    pub fn from_context(
        ctx: &ValidationContext,
        filter_id: &str,
        response_payload: Option<String>,
    ) -> Self {
        let ip = ctx.ip.clone().unwrap_or_else(|| "unknown".to_string());
        let endpoint = ctx
            .endpoint
            .clone()
            .unwrap_or_else(|| "/mcp/unknown".to_string());
        let method = ctx.method.clone().unwrap_or_else(|| "POST".to_string());
        let detected_at = Utc::now().timestamp();

        let request_headers =
            serde_json::to_string(&ctx.request_headers).unwrap_or_else(|_| "{}".to_string());
        let response_headers =
            serde_json::to_string(&ctx.response_headers).unwrap_or_else(|_| "{}".to_string());

        let api_payload = json!({
            "method": method,
            "requestPayload": ctx.request_payload.clone().unwrap_or_default(),
            "responsePayload": response_payload
                .or_else(|| ctx.response_payload.clone())
                .unwrap_or_default(),
            "ip": ip,
            "destIp": ip,
            "source": "OTHER",
            "type": "http",
            "akto_vxlan_id": "",
            "path": endpoint,
            "requestHeaders": request_headers,
            "responseHeaders": response_headers,
            "time": 0,
            "akto_account_id": "",
            "statusCode": ctx.status_code.unwrap_or(200),
            "status": "OK",
        });

        Self {
            actor: ip.clone(),
            filter_id: filter_id.to_string(),
            detected_at: detected_at.to_string(),
            latest_api_ip: ip,
            latest_api_endpoint: endpoint,
            latest_api_method: method,
            latest_api_collection_id: detected_at,
            latest_api_payload: serde_json::to_string(&api_payload)
                .unwrap_or_else(|_| "{}".to_string()),
            event_type: "EVENT_TYPE_SINGLE".to_string(),
            category: filter_id.to_string(),
            sub_category: filter_id.to_string(),
            severity: "CRITICAL".to_string(),
            kind: "Rule-Based".to_string(),
            metadata: json!({ "countryCode": "IN" }),
        }
    }
}

/// Client for the threat backend.
#[derive(Debug, Clone)]
pub struct ThreatReporter {
    client: reqwest::Client,
    url: String,
    token: Option<String>,
}

impl ThreatReporter {
    pub fn new(url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            token,
        }
    }

    /// POST one event. Never fails the caller: missing token skips, HTTP
    /// errors log.
    pub async fn report(&self, event: &MaliciousEvent) {
        let Some(token) = &self.token else {
            tracing::debug!("threat backend token not configured, skipping report");
            return;
        };

        match self.try_report(event, token).await {
            Ok(()) => {
                tracing::debug!(filter_id = %event.filter_id, "threat event reported");
            }
            Err(e) => {
                tracing::warn!(filter_id = %event.filter_id, "threat report failed: {e}");
            }
        }
    }

    /// Report on a detached task so the event survives request termination.
    pub fn spawn_report(&self, tracker: &TaskTracker, event: MaliciousEvent) {
        let reporter = self.clone();
        tracker.spawn(async move {
            reporter.report(&event).await;
        });
    }

    async fn try_report(
        &self,
        event: &MaliciousEvent,
        token: &str,
    ) -> Result<(), ThreatReportError> {
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(token)
            .json(event)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ThreatReportError::Api {
                status: response.status().as_u16(),
            });
        }
        Ok(())
    }
}
