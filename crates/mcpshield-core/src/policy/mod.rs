//! Policy model and policy store client.
//!
//! Policies are authored remotely in a guardrail shape and translated at
//! fetch time into the internal [`Policy`]/[`FilterRule`] shape the
//! validators consume. Audit policies arrive as a flat list and are keyed by
//! lowercased resource name.

pub mod store;
pub mod types;

pub use store::{PolicyBundle, PolicyStoreClient};
pub use types::{
    ApprovalConditions, AuditPolicy, FilterRule, FilterRuleType, GuardrailPolicy, IdentifierType,
    Policy, RateLimitConfig, RuleAction,
};
