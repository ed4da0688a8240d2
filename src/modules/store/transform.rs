//! Declarative document reshaping.
//!
//! A transform spec is an ordered list of operations applied to each
//! document's exported form:
//!
//! ```json
//! [{"operation": "shift",
//!   "spec": {"title": "title", "owner": "parentPeer", "thumb": "thumbnail.tiny"}}]
//! ```
//!
//! Supported operations are `shift`, `default` and `concat`; anything else
//! is a no-op, never an error.

use serde_json::{Map, Value};

use super::path as jsonpath;

pub fn apply(spec: &[Value], doc: &Value) -> Value {
    let mut current = doc.clone();
    for op in spec {
        current = apply_op(op, current);
    }
    current
}

fn apply_op(op: &Value, doc: Value) -> Value {
    let spec = op.get("spec");
    match op.get("operation").and_then(Value::as_str) {
        Some("shift") => shift(spec, &doc),
        Some("default") => apply_defaults(spec, doc),
        Some("concat") => concat(spec, doc),
        _ => doc,
    }
}

/// Build a fresh document: each spec entry maps a target path to a source
/// path in the input. Missing sources become null.
fn shift(spec: Option<&Value>, doc: &Value) -> Value {
    let Some(Value::Object(entries)) = spec else {
        return doc.clone();
    };
    let mut shifted = Value::Object(Map::new());
    for (target, source) in entries {
        let value = source
            .as_str()
            .and_then(|path| jsonpath::lookup(doc, path))
            .cloned()
            .unwrap_or(Value::Null);
        jsonpath::set(&mut shifted, target, value);
    }
    shifted
}

/// Fill in any spec entries the document does not already carry.
fn apply_defaults(spec: Option<&Value>, mut doc: Value) -> Value {
    let Some(Value::Object(entries)) = spec else {
        return doc;
    };
    for (target, value) in entries {
        if jsonpath::lookup(&doc, target).is_none() {
            jsonpath::set(&mut doc, target, value.clone());
        }
    }
    doc
}

/// Join a list of `{path}` / `{value}` sources with a delimiter into a
/// target path.
fn concat(spec: Option<&Value>, mut doc: Value) -> Value {
    let Some(spec) = spec else {
        return doc;
    };
    let Some(sources) = spec.get("sources").and_then(Value::as_array) else {
        return doc;
    };
    let Some(target) = spec.get("targetPath").and_then(Value::as_str) else {
        return doc;
    };
    let delim = spec.get("delim").and_then(Value::as_str).unwrap_or("");

    let parts: Vec<String> = sources
        .iter()
        .filter_map(|source| {
            if let Some(value) = source.get("value") {
                Some(stringify(value))
            } else {
                source
                    .get("path")
                    .and_then(Value::as_str)
                    .and_then(|path| jsonpath::lookup(&doc, path))
                    .map(stringify)
            }
        })
        .collect();

    jsonpath::set(&mut doc, target, Value::String(parts.join(delim)));
    doc
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn listing() -> Value {
        json!({
            "title": "Golden Age Comics",
            "parentPeer": "QmVendor",
            "price": {"amount": 1200},
            "thumbnail": {"tiny": "QmTiny"}
        })
    }

    #[test]
    fn shift_reshapes_into_a_fresh_document() {
        let spec = vec![json!({
            "operation": "shift",
            "spec": {
                "title": "title",
                "owner": "parentPeer",
                "price": "price.amount",
                "thumb": "thumbnail.tiny"
            }
        })];
        let shifted = apply(&spec, &listing());
        assert_eq!(
            shifted,
            json!({
                "title": "Golden Age Comics",
                "owner": "QmVendor",
                "price": 1200,
                "thumb": "QmTiny"
            })
        );
    }

    #[test]
    fn default_only_fills_missing_fields() {
        let spec = vec![json!({
            "operation": "default",
            "spec": {"currency": "USD", "title": "ignored"}
        })];
        let result = apply(&spec, &listing());
        assert_eq!(result["currency"], json!("USD"));
        assert_eq!(result["title"], json!("Golden Age Comics"));
    }

    #[test]
    fn concat_joins_paths_and_literals() {
        let spec = vec![json!({
            "operation": "concat",
            "spec": {
                "sources": [{"path": "parentPeer"}, {"value": "latest"}],
                "targetPath": "ref",
                "delim": ":"
            }
        })];
        let result = apply(&spec, &listing());
        assert_eq!(result["ref"], json!("QmVendor:latest"));
    }

    #[test]
    fn unknown_operations_are_no_ops() {
        let spec = vec![json!({"operation": "explode", "spec": {}})];
        assert_eq!(apply(&spec, &listing()), listing());
    }

    #[test]
    fn operations_compose_in_order() {
        let spec = vec![
            json!({"operation": "shift", "spec": {"owner": "parentPeer"}}),
            json!({"operation": "default", "spec": {"title": "untitled"}}),
        ];
        let result = apply(&spec, &listing());
        assert_eq!(result, json!({"owner": "QmVendor", "title": "untitled"}));
    }
}
