//! Dotted-path access into JSON documents, shared by the indexer, result
//! sorting and the shape transforms.

use serde_json::{Map, Value};

/// Resolve `a.b.c` against a document. Numeric segments index into arrays.
pub fn lookup<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = doc;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Set `a.b.c` on a document, creating intermediate objects as needed.
/// Non-object intermediates are replaced.
pub fn set(doc: &mut Value, path: &str, value: Value) {
    let mut segments = path.split('.').peekable();
    let mut current = doc;
    while let Some(segment) = segments.next() {
        if segments.peek().is_none() {
            if let Value::Object(map) = current {
                map.insert(segment.to_string(), value);
            }
            return;
        }
        let Value::Object(map) = current else {
            return;
        };
        current = map
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !current.is_object() {
            *current = Value::Object(Map::new());
        }
    }
}
