//! Audit validator: explicit per-resource allow/reject/conditional decisions.
//!
//! Server-level policy is looked up by lowercased server name; resource-level
//! policy by the raw resource name (the fetch already lowercases map keys).
//! A rejected or expired decision is final and cannot be overridden by later
//! validators.

use chrono::Utc;

use super::types::{ValidationContext, ValidationResult};
use crate::mcp;
use crate::policy::AuditPolicy;

/// Metadata policy id attached to every audit decision.
pub const AUDIT_POLICY_ID: &str = "AuditPolicy";

/// Evaluate audit policies for a request payload.
///
/// `None` means audit did not apply (no auditable resource, or no matching
/// policy); `Some` carries the decision.
pub fn evaluate(ctx: &ValidationContext, payload: &str) -> Option<ValidationResult> {
    let resource_name = mcp::audit_resource_name(payload)?;

    if let Some(server_name) = &ctx.mcp_server_name {
        if let Some(policy) = ctx.audit_policies.get(&server_name.to_lowercase()) {
            let result = evaluate_policy(policy, ctx.ip.as_deref());
            if !result.allowed {
                return Some(result);
            }
        }
    }

    let policy = ctx.audit_policies.get(&resource_name)?;
    Some(evaluate_policy(policy, ctx.ip.as_deref()))
}

fn evaluate_policy(policy: &AuditPolicy, client_ip: Option<&str>) -> ValidationResult {
    match policy.remarks.trim().to_lowercase().as_str() {
        "approved" => ValidationResult::allow(),
        "rejected" => ValidationResult::blocked("Resource access has been rejected by Audit Policy")
            .with_metadata("policy_id", AUDIT_POLICY_ID)
            .with_metadata("resource", policy.resource_name.clone()),
        "conditionally approved" => evaluate_conditions(policy, client_ip),
        other => {
            tracing::warn!(
                resource = %policy.resource_name,
                remarks = other,
                "unrecognised audit remarks, allowing"
            );
            ValidationResult::allow()
        }
    }
}

fn evaluate_conditions(policy: &AuditPolicy, client_ip: Option<&str>) -> ValidationResult {
    let Some(conditions) = &policy.approval_conditions else {
        return ValidationResult::allow();
    };

    if conditions.expires_at > 0 && Utc::now().timestamp() > conditions.expires_at {
        return ValidationResult::blocked("Conditional approval has expired")
            .with_metadata("policy_id", AUDIT_POLICY_ID)
            .with_metadata("resource", policy.resource_name.clone());
    }

    if let Some(ip) = client_ip {
        let has_ip_conditions =
            !conditions.allowed_ips.is_empty() || !conditions.allowed_ip_ranges.is_empty();
        if has_ip_conditions {
            let exact = conditions.allowed_ips.iter().any(|allowed| allowed == ip);
            let ranged = conditions
                .allowed_ip_ranges
                .iter()
                .any(|range| is_ip_in_cidr(ip, range));
            if !exact && !ranged {
                return ValidationResult::blocked(
                    "Client IP is not permitted by Audit Policy conditions",
                )
                .with_metadata("policy_id", AUDIT_POLICY_ID)
                .with_metadata("resource", policy.resource_name.clone())
                .with_metadata("client_ip", ip);
            }
        }
    }

    if !conditions.whitelisted_endpoints.is_empty() {
        tracing::warn!(
            resource = %policy.resource_name,
            "whitelistedEndpoints is recognised but not enforced"
        );
    }

    ValidationResult::allow()
}

/// Fold a dotted IPv4 address into a u32.
pub fn ip_to_u32(ip: &str) -> Option<u32> {
    let mut folded: u32 = 0;
    let mut octets = 0;
    for part in ip.split('.') {
        let octet: u8 = part.parse().ok()?;
        folded = (folded << 8) | u32::from(octet);
        octets += 1;
    }
    if octets == 4 {
        Some(folded)
    } else {
        None
    }
}

/// Whether an IPv4 address falls inside a `<addr>/<bits>` CIDR range.
pub fn is_ip_in_cidr(ip: &str, cidr: &str) -> bool {
    let Some((network, bits)) = cidr.split_once('/') else {
        return false;
    };
    let Ok(bits) = bits.parse::<u32>() else {
        return false;
    };
    if bits > 32 {
        return false;
    }
    let (Some(ip), Some(network)) = (ip_to_u32(ip), ip_to_u32(network)) else {
        return false;
    };
    let mask = if bits == 0 {
        0
    } else {
        !(((1u64 << (32 - bits)) - 1) as u32)
    };
    ip & mask == network & mask
}
