//! Synchronous validation endpoints.
//!
//! Each call fetches the policy bundle, builds a validation context from the
//! ingress request, and runs one half of the payload through the
//! orchestrator. With guardrails disabled the endpoints return allow without
//! touching the policy store.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};

use mcpshield_core::validate::{ValidationContext, ValidationResult};

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct ValidateBody {
    /// Raw MCP payload to validate.
    pub payload: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateResponse {
    pub allowed: bool,
    pub modified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified_payload: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl From<ValidationResult> for ValidateResponse {
    fn from(result: ValidationResult) -> Self {
        Self {
            allowed: result.allowed,
            modified: result.modified,
            modified_payload: result.modified_payload,
            reason: result.reason,
        }
    }
}

/// `POST /api/validate/request` — validate the request half of an MCP call.
pub async fn validate_request(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<ValidateBody>,
) -> Result<Json<ValidateResponse>, ApiError> {
    if !state.config.guardrails_enabled {
        return Ok(Json(ValidationResult::allow().into()));
    }

    let mut ctx = context_from_ingress(&state, &headers, "/api/validate/request").await?;
    ctx.request_payload = Some(body.payload);

    let result = state.validator.validate_request(&ctx).await;
    Ok(Json(result.into()))
}

/// `POST /api/validate/response` — validate the response half of an MCP call.
pub async fn validate_response(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<ValidateBody>,
) -> Result<Json<ValidateResponse>, ApiError> {
    if !state.config.guardrails_enabled {
        return Ok(Json(ValidationResult::allow().into()));
    }

    let mut ctx = context_from_ingress(&state, &headers, "/api/validate/response").await?;
    ctx.response_payload = Some(body.payload);

    let result = state.validator.validate_response(&ctx).await;
    Ok(Json(result.into()))
}

/// Build a validation context from ingress headers plus a fresh policy
/// bundle.
async fn context_from_ingress(
    state: &AppState,
    headers: &HeaderMap,
    endpoint: &str,
) -> Result<ValidationContext, ApiError> {
    let bundle = state.store.fetch_policy_bundle().await?;

    let header_map: HashMap<String, String> = headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_lowercase(), v.to_string()))
        })
        .collect();

    let mut ctx = ValidationContext::new();
    ctx.ip = client_ip(&header_map);
    ctx.endpoint = Some(endpoint.to_string());
    ctx.method = Some("POST".to_string());
    ctx.mcp_server_name = header_map.get("x-mcp-server-name").cloned();
    ctx.request_headers = header_map;
    ctx.policies = bundle.policies;
    ctx.has_audit_rules = !bundle.audit_policies.is_empty();
    ctx.audit_policies = bundle.audit_policies;
    ctx.tasks = state.tasks.clone();
    Ok(ctx)
}

/// First hop of `x-forwarded-for`, or `x-real-ip`.
fn client_ip(headers: &HashMap<String, String>) -> Option<String> {
    if let Some(forwarded) = headers.get("x-forwarded-for") {
        let first = forwarded.split(',').next()?.trim();
        if !first.is_empty() {
            return Some(first.to_string());
        }
    }
    headers.get("x-real-ip").cloned()
}
