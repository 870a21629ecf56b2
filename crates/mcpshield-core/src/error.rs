//! Error types for the mcpshield core library.
//!
//! Each failure domain has its own error enum to provide clear error
//! boundaries. The library uses `thiserror` for structured, typed errors.
//! Only [`PolicyStoreError`] is ever surfaced to callers; every other domain
//! fails open inside its validator and is logged instead.

/// Errors from the policy store backend.
///
/// A guardrail-policy fetch failure is fatal for the calling request; an
/// audit-policy fetch failure degrades to an empty map at the call site.
#[derive(Debug, thiserror::Error)]
pub enum PolicyStoreError {
    /// HTTP request to the policy store failed.
    #[error("policy store request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Policy store returned a non-success response.
    #[error("policy store error (HTTP {status}): {message}")]
    Api {
        /// The HTTP status code.
        status: u16,
        /// The error body returned by the store.
        message: String,
    },

    /// Policy store response could not be decoded.
    #[error("failed to parse policy store response: {0}")]
    Parse(String),
}

/// Errors from the shared key-value store backing the rate limiter.
///
/// Always non-fatal: the rate-limit validator allows and logs on store
/// failure.
#[derive(Debug, thiserror::Error)]
pub enum KvStoreError {
    /// The backing store rejected or failed the operation.
    #[error("kv store error: {message}")]
    Backend {
        /// Details from the backing store.
        message: String,
    },
}

/// Errors from the remote scanner client.
///
/// Per-scanner transport failures are counted inside the scan response and
/// never surface here; only input rejection does.
#[derive(Debug, thiserror::Error)]
pub enum ScannerError {
    /// The scan input exceeds the maximum accepted size.
    #[error("scan input too large: {size} bytes (limit {limit})")]
    PayloadTooLarge {
        /// Size of the rejected input in bytes.
        size: usize,
        /// The configured limit in bytes.
        limit: usize,
    },
}

/// Errors from the LLM endpoint used by the metadata auditor.
///
/// Swallowed per tool: a failed score leaves that tool unreported.
#[derive(Debug, thiserror::Error)]
pub enum LlmAuditError {
    /// HTTP request to the LLM endpoint failed.
    #[error("LLM request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// LLM endpoint returned a non-success response.
    #[error("LLM error (HTTP {status}): {message}")]
    Api {
        /// The HTTP status code.
        status: u16,
        /// The error body from the endpoint.
        message: String,
    },

    /// LLM response content could not be parsed as a verdict.
    #[error("failed to parse LLM verdict: {0}")]
    Parse(String),

    /// No token is configured for the LLM endpoint.
    #[error("LLM endpoint token not configured")]
    NotConfigured,
}

/// Errors from the threat backend reporter.
///
/// Swallowed unconditionally: reporting never propagates into the request
/// path.
#[derive(Debug, thiserror::Error)]
pub enum ThreatReportError {
    /// HTTP request to the threat backend failed.
    #[error("threat report request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Threat backend returned a non-success response.
    #[error("threat backend error (HTTP {status})")]
    Api {
        /// The HTTP status code.
        status: u16,
    },
}
