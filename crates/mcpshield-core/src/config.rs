//! Engine configuration read from the process environment.

use std::env;

/// Default policy-store / LLM base URL.
pub const DEFAULT_POLICY_STORE_URL: &str = "https://cyborg.akto.io";

/// Default threat-backend record endpoint.
pub const DEFAULT_THREAT_BACKEND_URL: &str =
    "https://tbs.akto.io/api/threat_detection/record_malicious_event";

/// Default remote scanner base URL.
pub const DEFAULT_SCANNER_URL: &str = "https://model-executor";

/// Configuration for the validation engine.
///
/// All values come from the process environment at start; see
/// [`EngineConfig::from_env`]. Fields are plain data so tests can construct
/// configs directly.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Base URL of the policy store (also serves the LLM endpoint).
    pub policy_store_url: String,
    /// Raw authorization token for the policy store and LLM endpoint.
    pub policy_store_token: String,
    /// Full URL of the threat backend record endpoint.
    pub threat_backend_url: String,
    /// Bearer token for the threat backend. `None` disables reporting.
    pub threat_backend_token: Option<String>,
    /// Base URL of the remote scanner service.
    pub scanner_url: String,
    /// Downstream mirror target for ingested batches. `None` disables the tee.
    pub mirror_url: Option<String>,
    /// Master toggle for the whole engine.
    pub guardrails_enabled: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            policy_store_url: DEFAULT_POLICY_STORE_URL.to_string(),
            policy_store_token: String::new(),
            threat_backend_url: DEFAULT_THREAT_BACKEND_URL.to_string(),
            threat_backend_token: None,
            scanner_url: DEFAULT_SCANNER_URL.to_string(),
            mirror_url: None,
            guardrails_enabled: true,
        }
    }
}

impl EngineConfig {
    /// Read the engine configuration from the process environment.
    ///
    /// Missing variables fall back to the documented defaults; the engine is
    /// enabled unless `ENABLE_MCP_GUARDRAILS` is exactly `"false"`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            policy_store_url: env_or("DATABASE_ABSTRACTOR_SERVICE_URL", defaults.policy_store_url),
            policy_store_token: env_or("DATABASE_ABSTRACTOR_SERVICE_TOKEN", String::new()),
            threat_backend_url: env_or("THREAT_BACKEND_URL", defaults.threat_backend_url),
            threat_backend_token: env::var("THREAT_BACKEND_TOKEN")
                .ok()
                .filter(|v| !v.is_empty()),
            scanner_url: env_or("MODEL_EXECUTOR_URL", defaults.scanner_url),
            mirror_url: env::var("MIRROR_SERVICE_URL").ok().filter(|v| !v.is_empty()),
            guardrails_enabled: env::var("ENABLE_MCP_GUARDRAILS")
                .map(|v| !v.eq_ignore_ascii_case("false"))
                .unwrap_or(true),
        }
    }
}

fn env_or(name: &str, default: String) -> String {
    match env::var(name) {
        Ok(v) if !v.is_empty() => v,
        _ => default,
    }
}
