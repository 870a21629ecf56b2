//! Rate-limit validator: per-identifier sliding windows over the KV store.
//!
//! Applies only to `tools/call` requests. The read-modify-write against the
//! store is deliberately not atomic; under concurrent edges the counter may
//! over-count slightly and that is accepted. Cells never decrement, they
//! expire with the window.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::types::{ValidationContext, ValidationResult};
use crate::mcp;
use crate::policy::IdentifierType;
use crate::storage::KvStore;

/// Metadata policy id attached to rate-limit blocks.
pub const RATE_LIMIT_POLICY_ID: &str = "RateLimitPolicy";

const KEY_PREFIX: &str = "ratelimit:";

/// One window's counter, stored as JSON under `ratelimit:<identifier>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitCell {
    pub count: u32,
    /// Window end, unix milliseconds.
    pub reset_at: i64,
}

/// Check and advance the rate limit for a request payload.
///
/// `None` when the limiter does not apply (not a `tools/call`, or disabled).
/// Store failures allow and log.
pub async fn check(
    store: &dyn KvStore,
    ctx: &ValidationContext,
    payload: &str,
) -> Option<ValidationResult> {
    check_at(store, ctx, payload, Utc::now().timestamp_millis()).await
}

/// Time-parameterised body of [`check`]; tests drive the window with
/// synthetic clocks instead of sleeping.
pub async fn check_at(
    store: &dyn KvStore,
    ctx: &ValidationContext,
    payload: &str,
    now_ms: i64,
) -> Option<ValidationResult> {
    let config = &ctx.rate_limit;
    if !config.enabled {
        return None;
    }
    if mcp::method_of(payload).as_deref() != Some("tools/call") {
        return None;
    }

    let tool = mcp::tool_name_of(payload).unwrap_or_else(|| "unknown".to_string());
    let identifier = build_identifier(ctx, &tool);
    let key = format!("{KEY_PREFIX}{identifier}");

    let cell = match store.get(&key).await {
        Ok(value) => value.and_then(|v| serde_json::from_str::<RateLimitCell>(&v).ok()),
        Err(e) => {
            tracing::warn!(key = %key, "rate limit read failed, allowing: {e}");
            return Some(ValidationResult::allow());
        }
    };

    let window_ms = i64::try_from(config.window_seconds)
        .unwrap_or(i64::MAX)
        .saturating_mul(1000);

    match cell {
        Some(cell) if now_ms <= cell.reset_at => {
            if cell.count >= config.limit {
                let reset_in_seconds = (cell.reset_at - now_ms + 999) / 1000;
                let result = ValidationResult::blocked(format!(
                    "Rate limit exceeded for tool '{tool}', retry in {reset_in_seconds}s"
                ))
                .with_metadata("policy_id", RATE_LIMIT_POLICY_ID)
                .with_metadata("tool", tool)
                .with_metadata("current_count", cell.count)
                .with_metadata("limit", config.limit)
                .with_metadata("reset_at", cell.reset_at)
                .with_metadata("reset_in_seconds", reset_in_seconds);
                return Some(result);
            }

            let next = RateLimitCell {
                count: cell.count + 1,
                reset_at: cell.reset_at,
            };
            let ttl = u64::try_from((cell.reset_at - now_ms + 999) / 1000).unwrap_or(1);
            write_cell(store, &key, &next, ttl).await;
            Some(ValidationResult::allow().with_metadata("current_count", next.count))
        }
        _ => {
            // Absent or lapsed window: start a fresh one.
            let next = RateLimitCell {
                count: 1,
                reset_at: now_ms + window_ms,
            };
            write_cell(store, &key, &next, config.window_seconds).await;
            Some(ValidationResult::allow().with_metadata("current_count", 1))
        }
    }
}

fn build_identifier(ctx: &ValidationContext, tool: &str) -> String {
    ctx.rate_limit
        .identifier_types
        .iter()
        .map(|kind| match kind {
            IdentifierType::Ip => ctx.ip.clone().unwrap_or_else(|| "unknown".to_string()),
            IdentifierType::User => ctx
                .request_headers
                .get("x-user-id")
                .cloned()
                .or_else(|| ctx.ip.clone())
                .unwrap_or_else(|| "unknown".to_string()),
            IdentifierType::Tool => tool.to_string(),
        })
        .collect::<Vec<_>>()
        .join(":")
}

async fn write_cell(store: &dyn KvStore, key: &str, cell: &RateLimitCell, ttl_seconds: u64) {
    let value = match serde_json::to_string(cell) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(key = %key, "rate limit cell serialize failed: {e}");
            return;
        }
    };
    if let Err(e) = store.put(key, value, ttl_seconds.max(1)).await {
        tracing::warn!(key = %key, "rate limit write failed, allowing: {e}");
    }
}
