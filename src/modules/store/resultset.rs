//! Lazy result cursor with chainable operations.
//!
//! Every operation consumes and returns the set for fluent use. `count`
//! reflects the matched total before any `limit` window is applied.

use std::cmp::Ordering;

use serde_json::Value;
use tracing::warn;

use super::path as jsonpath;
use super::transform;
use super::StoreError;
use crate::modules::expr::FilterEngine;

use super::collection::Document;

#[derive(Debug)]
pub struct ResultSet {
    docs: Vec<Document>,
    count: usize,
    engine: FilterEngine,
}

impl ResultSet {
    pub(crate) fn new(docs: Vec<Document>, engine: FilterEngine) -> Self {
        let count = docs.len();
        Self { docs, count, engine }
    }

    /// Keep only documents for which the expression evaluates to true.
    /// An expression that fails to parse keeps the set unchanged and is
    /// reported.
    pub fn filter(mut self, expr: &str) -> Self {
        let compiled = match self.engine.compile(expr) {
            Ok(compiled) => compiled,
            Err(err) => {
                warn!(expr, error = %err, "Ignoring unparseable filter");
                return self;
            }
        };
        let engine = &self.engine;
        self.docs
            .retain(|doc| engine.matches(&compiled, &doc.content));
        self.count = self.docs.len();
        self
    }

    /// Stable order by the named dotted field; prefix the field with `-`
    /// for descending. Ties keep insertion order.
    pub fn sort(mut self, spec: &str) -> Self {
        let (field, descending) = match spec.strip_prefix('-') {
            Some(rest) => (rest, true),
            None => (spec, false),
        };
        if field.is_empty() {
            return self;
        }
        self.docs.sort_by(|a, b| {
            let ordering = compare_fields(&a.content, &b.content, field);
            if descending {
                ordering.reverse()
            } else {
                ordering
            }
        });
        self
    }

    /// Window to `[start, start + n)`. A start past the end yields an
    /// empty window; `count` is unaffected.
    pub fn limit(mut self, start: usize, n: usize) -> Self {
        if start >= self.docs.len() {
            self.docs.clear();
        } else {
            let end = (start + n).min(self.docs.len());
            let window: Vec<Document> = self.docs.drain(start..end).collect();
            self.docs = window;
        }
        self
    }

    /// Apply an ordered list of declarative shape operations to each
    /// document's exported form. Operations that are not understood are
    /// no-ops.
    pub fn transform(mut self, spec: &[Value]) -> Self {
        for doc in &mut self.docs {
            doc.content = transform::apply(spec, &doc.content);
        }
        self
    }

    /// Matched total before any limit window.
    pub fn count(&self) -> usize {
        self.count
    }

    pub fn documents(&self) -> &[Document] {
        &self.docs
    }

    pub fn into_documents(self) -> Vec<Document> {
        self.docs
    }

    /// The windowed documents' contents, owned.
    pub fn into_contents(self) -> Vec<Value> {
        self.docs.into_iter().map(|doc| doc.content).collect()
    }

    /// Serialize the windowed documents into a JSON array.
    pub fn export_json_array(&self) -> Result<String, StoreError> {
        let contents: Vec<&Value> = self.docs.iter().map(|doc| &doc.content).collect();
        serde_json::to_string(&contents)
            .map_err(|err| StoreError::Serialization(err.to_string()))
    }
}

fn compare_fields(a: &Value, b: &Value, field: &str) -> Ordering {
    let left = jsonpath::lookup(a, field);
    let right = jsonpath::lookup(b, field);
    match (left, right) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        // Documents missing the field sort after those carrying it.
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        _ => Ordering::Equal,
    }
}
