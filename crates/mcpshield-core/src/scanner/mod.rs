//! Remote scanner client: parallel fan-out with a global deadline.
//!
//! One POST per scanner, all sharing a single 5-second deadline. Individual
//! scanner failures (and anything still in flight at the deadline) are
//! counted, logged, and otherwise invisible to the caller; a scanner that
//! answers `is_valid = false` rejected the text.

use std::time::Duration;

use serde::Deserialize;
use serde_json::{json, Map, Value};
use tokio::task::JoinSet;

use crate::error::ScannerError;
use crate::policy::FilterRuleType;

/// Maximum input accepted by [`ScannerClient::scan`].
pub const MAX_SCAN_BYTES: usize = 1 << 20;

/// Global deadline shared by every scanner call in one fan-out.
pub const SCAN_DEADLINE: Duration = Duration::from_secs(5);

/// Remote scanner names for a filter rule type.
pub fn scanner_names_for(rule_type: FilterRuleType) -> &'static [&'static str] {
    match rule_type {
        FilterRuleType::HarmfulCategories => &["Toxicity"],
        FilterRuleType::PromptAttacks => &["PromptInjection"],
        FilterRuleType::BanSubstrings => &["BanSubstrings"],
        FilterRuleType::BanTopics => &["BanTopics"],
        _ => &[],
    }
}

/// Whether a rule type is scanned remotely rather than handled locally.
pub fn is_scanner_filter_type(rule_type: FilterRuleType) -> bool {
    matches!(
        rule_type,
        FilterRuleType::HarmfulCategories
            | FilterRuleType::PromptAttacks
            | FilterRuleType::DeniedTopics
    )
}

/// One scanner invocation within a fan-out.
#[derive(Debug, Clone)]
pub struct ScanRequest {
    pub scanner_name: String,
    /// Rule configuration forwarded to the scanner.
    pub config: Map<String, Value>,
}

/// A single scanner's verdict.
#[derive(Debug, Clone, Deserialize)]
pub struct ScanResult {
    #[serde(default)]
    pub scanner_name: String,
    /// `false` means the scanner rejected the text.
    #[serde(default = "default_true")]
    pub is_valid: bool,
    #[serde(default)]
    pub risk_score: f64,
    #[serde(default)]
    pub details: Option<Value>,
}

fn default_true() -> bool {
    true
}

/// Outcome of a fan-out: completed verdicts plus the failure tally.
#[derive(Debug, Default)]
pub struct ScanResponse {
    pub results: Vec<ScanResult>,
    pub failure_count: u32,
}

/// Client for the remote scanner service.
#[derive(Debug, Clone)]
pub struct ScannerClient {
    client: reqwest::Client,
    base_url: String,
    deadline: Duration,
}

impl ScannerClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            deadline: SCAN_DEADLINE,
        }
    }

    /// Override the global deadline (tests use short ones).
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    /// Fan out `text` to every requested scanner and gather verdicts.
    ///
    /// Result ordering follows completion, not request order.
    pub async fn scan(
        &self,
        text: &str,
        scanners: &[ScanRequest],
    ) -> Result<ScanResponse, ScannerError> {
        if text.len() > MAX_SCAN_BYTES {
            return Err(ScannerError::PayloadTooLarge {
                size: text.len(),
                limit: MAX_SCAN_BYTES,
            });
        }
        if scanners.is_empty() {
            return Ok(ScanResponse::default());
        }

        let mut set = JoinSet::new();
        for request in scanners {
            set.spawn(scan_one(
                self.client.clone(),
                self.base_url.clone(),
                text.to_string(),
                request.clone(),
            ));
        }

        let mut response = ScanResponse::default();
        let drained = tokio::time::timeout(self.deadline, async {
            while let Some(joined) = set.join_next().await {
                match joined {
                    Ok(Ok(result)) => response.results.push(result),
                    Ok(Err(message)) => {
                        tracing::warn!("scanner call failed: {message}");
                        response.failure_count += 1;
                    }
                    Err(e) => {
                        tracing::warn!("scanner task failed: {e}");
                        response.failure_count += 1;
                    }
                }
            }
        })
        .await;

        if drained.is_err() {
            let aborted = u32::try_from(set.len()).unwrap_or(u32::MAX);
            set.abort_all();
            response.failure_count += aborted;
            tracing::warn!(aborted, "scanner deadline reached, aborting in-flight calls");
        }

        Ok(response)
    }
}

async fn scan_one(
    client: reqwest::Client,
    base_url: String,
    text: String,
    request: ScanRequest,
) -> Result<ScanResult, String> {
    let body = json!({
        "text": text,
        "scanner_type": "prompt",
        "scanner_name": request.scanner_name,
        "config": request.config,
    });

    let response = client
        .post(format!("{base_url}/scan"))
        .json(&body)
        .send()
        .await
        .map_err(|e| format!("{}: {e}", request.scanner_name))?;

    if !response.status().is_success() {
        return Err(format!(
            "{}: HTTP {}",
            request.scanner_name,
            response.status().as_u16()
        ));
    }

    let mut result: ScanResult = response
        .json()
        .await
        .map_err(|e| format!("{}: {e}", request.scanner_name))?;
    if result.scanner_name.is_empty() {
        result.scanner_name = request.scanner_name;
    }
    Ok(result)
}
