//! Input-schema flattening for tool descriptors.

use serde_json::Value;

const MAX_DEPTH: usize = 5;

/// Flatten a JSON-schema `properties` tree into one prompt-friendly line.
///
/// Each property becomes `name=<description or "No description">`, segments
/// joined by `" | "`. Objects recurse under `name.child`, arrays with item
/// properties under `name[].child`, depth capped at 5. An empty result is
/// rendered as `"(none)"`.
pub fn flatten_schema(schema: Option<&Value>) -> String {
    let mut segments = Vec::new();
    if let Some(schema) = schema {
        walk(schema, "", 0, &mut segments);
    }
    if segments.is_empty() {
        "(none)".to_string()
    } else {
        segments.join(" | ")
    }
}

fn walk(schema: &Value, prefix: &str, depth: usize, out: &mut Vec<String>) {
    if depth >= MAX_DEPTH {
        return;
    }
    let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
        return;
    };

    for (name, property) in properties {
        let path = if prefix.is_empty() {
            name.clone()
        } else {
            format!("{prefix}.{name}")
        };
        let description = property
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or("No description");
        out.push(format!("{path}={description}"));

        match property.get("type").and_then(Value::as_str) {
            Some("object") => walk(property, &path, depth + 1, out),
            Some("array") => {
                if let Some(items) = property.get("items") {
                    walk(items, &format!("{path}[]"), depth + 1, out);
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_schema_is_none() {
        assert_eq!(flatten_schema(None), "(none)");
        assert_eq!(flatten_schema(Some(&json!({}))), "(none)");
        assert_eq!(flatten_schema(Some(&json!({"type": "object"}))), "(none)");
    }

    #[test]
    fn flat_properties_join_with_pipes() {
        let schema = json!({
            "type": "object",
            "properties": {
                "city": {"type": "string", "description": "City name"},
                "units": {"type": "string"}
            }
        });
        assert_eq!(
            flatten_schema(Some(&schema)),
            "city=City name | units=No description"
        );
    }

    #[test]
    fn objects_recurse_with_dotted_paths() {
        let schema = json!({
            "properties": {
                "filter": {
                    "type": "object",
                    "description": "Filter options",
                    "properties": {
                        "field": {"type": "string", "description": "Field to match"}
                    }
                }
            }
        });
        assert_eq!(
            flatten_schema(Some(&schema)),
            "filter=Filter options | filter.field=Field to match"
        );
    }

    #[test]
    fn arrays_recurse_under_bracketed_paths() {
        let schema = json!({
            "properties": {
                "rows": {
                    "type": "array",
                    "description": "Rows",
                    "items": {
                        "properties": {
                            "id": {"type": "string", "description": "Row id"}
                        }
                    }
                }
            }
        });
        assert_eq!(
            flatten_schema(Some(&schema)),
            "rows=Rows | rows[].id=Row id"
        );
    }

    #[test]
    fn depth_is_capped() {
        // Six levels of nesting; the innermost property must be dropped.
        let schema = json!({
            "properties": {"a": {"type": "object",
                "properties": {"b": {"type": "object",
                    "properties": {"c": {"type": "object",
                        "properties": {"d": {"type": "object",
                            "properties": {"e": {"type": "object",
                                "properties": {"f": {"type": "string", "description": "deep"}}
                            }}
                        }}
                    }}
                }}
            }}
        });
        let flattened = flatten_schema(Some(&schema));
        assert!(flattened.contains("a.b.c.d.e="), "{flattened}");
        assert!(!flattened.contains("f=deep"), "{flattened}");
    }
}
