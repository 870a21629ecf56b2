//! Deterministic pattern validators: PII types and custom regex rules.
//!
//! PII rules name one of a fixed set of type names, each bound to a fixed
//! regular expression compiled once. Custom regex rules compile
//! case-insensitively per call. Either kind blocks or redacts according to
//! the rule action; unknown PII types and invalid patterns allow.

use std::sync::OnceLock;

use regex::{Regex, RegexBuilder};

use super::types::ValidationResult;
use crate::policy::{FilterRule, RuleAction};

fn email_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}")
            .expect("email regex must compile")
    })
}

fn phone_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?:\+?1[-.\s]?)?(?:\(\d{3}\)|\d{3})[-.\s]?\d{3}[-.\s]?\d{4}")
            .expect("phone regex must compile")
    })
}

fn ssn_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b\d{3}-\d{2}-\d{4}\b").expect("ssn regex must compile"))
}

fn credit_card_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b\d{4}[- ]?\d{4}[- ]?\d{4}[- ]?\d{4}\b")
            .expect("credit card regex must compile")
    })
}

fn ip_address_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}\b")
            .expect("ip address regex must compile")
    })
}

fn password_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)\b(?:password|passwd|pwd)\s*[:=]\s*\S+"#)
            .expect("password regex must compile")
    })
}

fn api_key_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)\b(?:api[_-]?key|apikey|access[_-]?token)\s*[:=]\s*\S+"#)
            .expect("api key regex must compile")
    })
}

fn url_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"https?://\S+").expect("url regex must compile"))
}

/// The fixed regex bound to a PII type name, if recognised.
fn pii_regex(pii_type: &str) -> Option<&'static Regex> {
    match pii_type.to_lowercase().as_str() {
        "email" => Some(email_re()),
        "phone" => Some(phone_re()),
        "ssn" => Some(ssn_re()),
        "credit_card" => Some(credit_card_re()),
        "ip_address" => Some(ip_address_re()),
        "password" => Some(password_re()),
        "api_key" => Some(api_key_re()),
        "url" => Some(url_re()),
        _ => None,
    }
}

/// Apply a PII rule to `text`.
///
/// `None` when the rule does not match (or names an unknown type).
pub fn apply_pii_rule(text: &str, rule: &FilterRule, policy_id: &str) -> Option<ValidationResult> {
    let pii_type = rule.pattern.as_deref()?.to_lowercase();
    let regex = pii_regex(&pii_type)?;
    if !regex.is_match(text) {
        return None;
    }

    let result = match rule.action {
        RuleAction::Block => {
            ValidationResult::blocked(format!("Detected {pii_type} in payload"))
        }
        RuleAction::Redact => {
            let replacement = format!("[{}_REDACTED]", pii_type.to_uppercase());
            ValidationResult::redacted(regex.replace_all(text, replacement.as_str()).into_owned())
        }
    };

    Some(
        result
            .with_metadata("policy_id", policy_id)
            .with_metadata("rule_type", "pii")
            .with_metadata("pii_type", pii_type),
    )
}

/// Apply a custom regex rule to `text`.
///
/// Patterns compile case-insensitively; an invalid pattern allows and logs.
pub fn apply_regex_rule(
    text: &str,
    rule: &FilterRule,
    policy_id: &str,
) -> Option<ValidationResult> {
    let pattern = rule.pattern.as_deref()?;
    let regex = match RegexBuilder::new(pattern).case_insensitive(true).build() {
        Ok(re) => re,
        Err(e) => {
            tracing::warn!(pattern, "invalid regex rule, allowing: {e}");
            return None;
        }
    };
    if !regex.is_match(text) {
        return None;
    }

    let result = match rule.action {
        RuleAction::Block => {
            ValidationResult::blocked(format!("Payload matched blocked pattern '{pattern}'"))
        }
        RuleAction::Redact => {
            ValidationResult::redacted(regex.replace_all(text, "[REDACTED]").into_owned())
        }
    };

    Some(
        result
            .with_metadata("policy_id", policy_id)
            .with_metadata("rule_type", "regex"),
    )
}
