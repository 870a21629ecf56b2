//! MCP-aware payload parsing.
//!
//! MCP traffic is JSON-RPC 2.0 with untyped params, so everything here works
//! on `serde_json::Value` and tolerates malformed input: a payload that does
//! not parse is treated as unstructured text and returned to the caller
//! verbatim for scanning.

use serde_json::{json, Value};

/// Protocol-layer methods exempt from content scanning.
pub const SAFE_METHODS: [&str; 8] = [
    "initialize",
    "initialized",
    "ping",
    "$/cancelRequest",
    "$/progress",
    "notifications/initialized",
    "notifications/cancelled",
    "notifications/progress",
];

/// Whether a JSON-RPC method is exempt from content scanning.
pub fn is_safe_method(method: &str) -> bool {
    SAFE_METHODS.contains(&method)
}

/// The JSON-RPC method of a raw payload, if it parses and has one.
pub fn method_of(payload: &str) -> Option<String> {
    let value: Value = serde_json::from_str(payload).ok()?;
    value.get("method")?.as_str().map(str::to_string)
}

/// The tool name of a `tools/call` payload (`params.name`).
pub fn tool_name_of(payload: &str) -> Option<String> {
    let value: Value = serde_json::from_str(payload).ok()?;
    if value.get("method")?.as_str()? != "tools/call" {
        return None;
    }
    value
        .get("params")?
        .get("name")?
        .as_str()
        .map(str::to_string)
}

/// The resource name an audit policy is keyed on, per method.
///
/// `tools/call` and `prompts/get` use `params.name`; `resources/read` uses
/// `params.uri`; any other method has no auditable resource.
pub fn audit_resource_name(payload: &str) -> Option<String> {
    let value: Value = serde_json::from_str(payload).ok()?;
    let method = value.get("method")?.as_str()?;
    let params = value.get("params")?;
    let name = match method {
        "tools/call" | "prompts/get" => params.get("name")?.as_str()?,
        "resources/read" => params.get("uri")?.as_str()?,
        _ => return None,
    };
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

/// Project the user-controlled fields of a raw MCP payload into a single
/// scannable string.
///
/// Returns an empty string for safe methods (signal: skip scanning) and the
/// original payload when it cannot be interpreted as JSON-RPC.
pub fn extract_scannable_content(payload: &str) -> String {
    let value: Value = match serde_json::from_str(payload) {
        Ok(v) => v,
        Err(_) => return payload.to_string(),
    };

    let Some(method) = value.get("method").and_then(Value::as_str) else {
        return payload.to_string();
    };

    if is_safe_method(method) {
        return String::new();
    }

    let Some(params) = value.get("params") else {
        return payload.to_string();
    };

    match method {
        "tools/call" => {
            let name = params.get("name").and_then(Value::as_str).unwrap_or("");
            let arguments = params.get("arguments").cloned().unwrap_or_else(|| json!({}));
            let arguments = serde_json::to_string(&arguments).unwrap_or_else(|_| "{}".to_string());
            // Downstream scanners depend on this exact framing.
            format!("Tool: {name}\nArguments:\n{arguments}\nContext:\norigin: mcp_call")
        }
        "sampling/createMessage" | "prompts/get" => {
            let mut collected = Vec::new();
            if let Some(messages) = params.get("messages").and_then(Value::as_array) {
                for message in messages {
                    if let Some(content) = message.get("content") {
                        collected.push(json!({ "_message_content": content }));
                    }
                }
            }
            if let Some(prompt) = params.get("prompt") {
                collected.push(json!({ "_prompt": prompt }));
            }
            if collected.is_empty() {
                payload.to_string()
            } else {
                serde_json::to_string(&collected).unwrap_or_else(|_| payload.to_string())
            }
        }
        "resources/read" => {
            let uri = params.get("uri").cloned().unwrap_or(Value::Null);
            serde_json::to_string(&json!([{ "_resource_uri": uri }]))
                .unwrap_or_else(|_| payload.to_string())
        }
        _ => serde_json::to_string(&json!([params])).unwrap_or_else(|_| payload.to_string()),
    }
}
