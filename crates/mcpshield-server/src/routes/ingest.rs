//! Batch ingestion endpoint.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use mcpshield_core::batch::{BatchItemResult, IngestRecord};

use crate::state::AppState;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct IngestBody {
    #[serde(default)]
    batch_data: Vec<IngestRecord>,
}

/// `POST /api/ingestData` — validate a batch of mirrored API calls.
///
/// The raw body is tee'd to the configured mirror target in parallel with
/// validation; mirror failures never affect the response.
pub async fn ingest(State(state): State<Arc<AppState>>, Json(body): Json<Value>) -> Response {
    if let Some(mirror) = &state.mirror {
        mirror.spawn_mirror(&state.tasks, body.clone());
    }

    let parsed: IngestBody = match serde_json::from_value(body) {
        Ok(parsed) => parsed,
        Err(e) => {
            return error_envelope(StatusCode::BAD_REQUEST, format!("invalid batch body: {e}"));
        }
    };

    if !state.config.guardrails_enabled {
        let results: Vec<BatchItemResult> = parsed
            .batch_data
            .iter()
            .enumerate()
            .map(|(index, record)| passthrough_result(index, record))
            .collect();
        return success_envelope(&results);
    }

    match state.batch.process(&parsed.batch_data).await {
        Ok(results) => success_envelope(&results),
        Err(e) => {
            tracing::error!("batch validation failed: {e}");
            error_envelope(StatusCode::BAD_GATEWAY, e.to_string())
        }
    }
}

fn success_envelope(results: &[BatchItemResult]) -> Response {
    Json(json!({
        "success": true,
        "result": "SUCCESS",
        "results": results,
    }))
    .into_response()
}

fn error_envelope(status: StatusCode, message: String) -> Response {
    (
        status,
        Json(json!({
            "success": false,
            "result": "ERROR",
            "errors": [message],
        })),
    )
        .into_response()
}

/// The allowed-everything result used when guardrails are disabled.
fn passthrough_result(index: usize, record: &IngestRecord) -> BatchItemResult {
    BatchItemResult {
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
    }
}
