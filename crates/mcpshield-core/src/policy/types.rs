//! Policy data model: authoring shapes, internal rules, audit records.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Fixed id of the translated guardrail policy.
pub const GUARDRAIL_POLICY_ID: &str = "MCPGuardrails";

// ---------------------------------------------------------------------------
// Authoring shapes (as served by the policy store)
// ---------------------------------------------------------------------------

/// A guardrail policy in its remote authoring form.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GuardrailPolicy {
    pub name: String,
    pub active: bool,
    pub apply_on_request: bool,
    pub apply_on_response: bool,
    pub content_filters: Option<ContentFilters>,
    pub denied_topics: Vec<DeniedTopic>,
    pub pii_types: Vec<PiiEntity>,
    pub regex_patterns: Vec<RegexPattern>,
}

/// Content-filter toggles of a guardrail policy.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContentFilters {
    pub harmful_categories: bool,
    pub prompt_attacks: bool,
    /// Threshold for the prompt-attack scanner; 0.5 when unset.
    pub prompt_attacks_threshold: Option<f64>,
}

/// A denied topic with its sample phrases.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeniedTopic {
    pub topic: String,
    pub sample_phrases: Vec<String>,
}

/// A PII entity entry: type name plus block/mask behavior.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PiiEntity {
    #[serde(rename = "type")]
    pub pii_type: String,
    pub behavior: String,
}

/// A custom regex pattern entry.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RegexPattern {
    pub pattern: String,
    pub action: Option<String>,
}

// ---------------------------------------------------------------------------
// Internal policy shape
// ---------------------------------------------------------------------------

/// Filter rule kind tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FilterRuleType {
    HarmfulCategories,
    PromptAttacks,
    BanTopics,
    BanSubstrings,
    DeniedTopics,
    Pii,
    Regex,
    Audit,
    ComponentMetadata,
}

impl std::fmt::Display for FilterRuleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FilterRuleType::HarmfulCategories => write!(f, "harmfulCategories"),
            FilterRuleType::PromptAttacks => write!(f, "promptAttacks"),
            FilterRuleType::BanTopics => write!(f, "banTopics"),
            FilterRuleType::BanSubstrings => write!(f, "banSubstrings"),
            FilterRuleType::DeniedTopics => write!(f, "deniedTopics"),
            FilterRuleType::Pii => write!(f, "pii"),
            FilterRuleType::Regex => write!(f, "regex"),
            FilterRuleType::Audit => write!(f, "audit"),
            FilterRuleType::ComponentMetadata => write!(f, "componentMetadata"),
        }
    }
}

/// Action a matching rule takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleAction {
    Block,
    Redact,
}

/// A single filter rule inside a policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterRule {
    /// Rule kind.
    #[serde(rename = "type")]
    pub rule_type: FilterRuleType,
    /// Pattern string for pii/regex rules.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    /// Action on match.
    pub action: RuleAction,
    /// Free-form rule configuration (thresholds, topic lists, ...).
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub config: Map<String, Value>,
}

impl FilterRule {
    /// A rule with no pattern and an empty config.
    pub fn new(rule_type: FilterRuleType, action: RuleAction) -> Self {
        Self {
            rule_type,
            pattern: None,
            action,
            config: Map::new(),
        }
    }
}

/// An internal policy: ordered request and response rule lists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Policy {
    pub id: String,
    pub name: String,
    pub active: bool,
    pub default_action: RuleAction,
    pub request_rules: Vec<FilterRule>,
    pub response_rules: Vec<FilterRule>,
}

// ---------------------------------------------------------------------------
// Audit policies
// ---------------------------------------------------------------------------

/// A per-resource audit decision fetched from the policy store.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuditPolicy {
    pub resource_name: String,
    /// "Approved", "Rejected", "Conditionally Approved", or anything else.
    pub remarks: String,
    pub marked_by: String,
    pub approval_conditions: Option<ApprovalConditions>,
}

/// Conditions attached to a conditionally-approved resource.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApprovalConditions {
    /// Unix-seconds expiry; 0 means no expiry.
    pub expires_at: i64,
    /// Exact client IPs allowed to use the resource.
    pub allowed_ips: Vec<String>,
    /// CIDR ranges allowed to use the resource (IPv4).
    pub allowed_ip_ranges: Vec<String>,
    /// Recognised but not enforced.
    pub whitelisted_endpoints: Vec<String>,
}

/// Map of lowercased resource name to audit policy.
pub type AuditPolicyMap = HashMap<String, AuditPolicy>;

// ---------------------------------------------------------------------------
// Rate limiting
// ---------------------------------------------------------------------------

/// Which request attribute a rate-limit identifier segment comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum IdentifierType {
    Ip,
    User,
    Tool,
}

/// Sliding-window rate-limit configuration for `tools/call` requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitConfig {
    pub enabled: bool,
    /// Maximum requests per window.
    pub limit: u32,
    pub window_seconds: u64,
    /// Ordered identifier segments joined with `":"`.
    pub identifier_types: Vec<IdentifierType>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            limit: 100,
            window_seconds: 300,
            identifier_types: vec![IdentifierType::Ip, IdentifierType::Tool],
        }
    }
}

// ---------------------------------------------------------------------------
// Translation: authoring shape -> internal shape
// ---------------------------------------------------------------------------

impl GuardrailPolicy {
    /// Translate the authoring shape into the internal [`Policy`] shape.
    ///
    /// The resulting policy id is always [`GUARDRAIL_POLICY_ID`]; content
    /// filters apply to requests only, everything else follows the policy's
    /// apply-on flags.
    pub fn translate(&self) -> Policy {
        let mut request_rules = Vec::new();
        let mut response_rules = Vec::new();

        let push = |rule: FilterRule,
                    request_rules: &mut Vec<FilterRule>,
                    response_rules: &mut Vec<FilterRule>| {
            if self.apply_on_request {
                request_rules.push(rule.clone());
            }
            if self.apply_on_response {
                response_rules.push(rule);
            }
        };

        if let Some(filters) = &self.content_filters {
            if filters.harmful_categories {
                request_rules.push(FilterRule::new(
                    FilterRuleType::HarmfulCategories,
                    RuleAction::Block,
                ));
            }
            if filters.prompt_attacks {
                let mut rule = FilterRule::new(FilterRuleType::PromptAttacks, RuleAction::Block);
                let threshold = filters.prompt_attacks_threshold.unwrap_or(0.5);
                rule.config.insert("threshold".to_string(), threshold.into());
                request_rules.push(rule);
            }
        }

        if !self.denied_topics.is_empty() {
            let topics: Vec<Value> = self
                .denied_topics
                .iter()
                .map(|t| Value::String(t.topic.clone()))
                .collect();
            let substrings: Vec<Value> = self
                .denied_topics
                .iter()
                .flat_map(|t| t.sample_phrases.iter())
                .map(|p| Value::String(p.clone()))
                .collect();

            let mut topics_rule = FilterRule::new(FilterRuleType::BanTopics, RuleAction::Block);
            topics_rule
                .config
                .insert("topics".to_string(), Value::Array(topics));
            push(topics_rule, &mut request_rules, &mut response_rules);

            let mut substrings_rule =
                FilterRule::new(FilterRuleType::BanSubstrings, RuleAction::Block);
            substrings_rule
                .config
                .insert("substrings".to_string(), Value::Array(substrings));
            push(substrings_rule, &mut request_rules, &mut response_rules);
        }

        for pii in &self.pii_types {
            let action = if pii.behavior.eq_ignore_ascii_case("mask") {
                RuleAction::Redact
            } else {
                RuleAction::Block
            };
            let mut rule = FilterRule::new(FilterRuleType::Pii, action);
            rule.pattern = Some(pii.pii_type.clone());
            push(rule, &mut request_rules, &mut response_rules);
        }

        for regex in &self.regex_patterns {
            let action = match regex.action.as_deref() {
                Some(a) if a.eq_ignore_ascii_case("redact") => RuleAction::Redact,
                _ => RuleAction::Block,
            };
            let mut rule = FilterRule::new(FilterRuleType::Regex, action);
            rule.pattern = Some(regex.pattern.clone());
            push(rule, &mut request_rules, &mut response_rules);
        }

        Policy {
            id: GUARDRAIL_POLICY_ID.to_string(),
            name: self.name.clone(),
            active: self.active,
            default_action: RuleAction::Block,
            request_rules,
            response_rules,
        }
    }
}
