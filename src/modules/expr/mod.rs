//! Filter expression engine.
//!
//! A small predicate language evaluated against one JSON document at a time.
//! The document is exposed as a rooted value named `doc`
//! (e.g. `doc.vendorID.peerID == "Qm..."`), and the general expression
//! surface is augmented with three domain functions: `contains`,
//! `zipWithin` and `coordsWithin`.

mod ast;
mod eval;
mod parser;

use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

pub use ast::{BinOp, EvalValue, Expr};

use crate::modules::location::LocationMap;

#[derive(Debug, Error)]
pub enum ExprError {
    #[error("parse error: {0}")]
    Parse(String),

    #[error("unknown function: {0}")]
    UnknownFunction(String),

    #[error("function {name} expects {expected} arguments, got {got}")]
    Arity {
        name: String,
        expected: usize,
        got: usize,
    },
}

/// A parsed, reusable filter expression.
#[derive(Debug, Clone)]
pub struct CompiledExpr {
    root: Expr,
}

/// Evaluation engine for filter expressions.
///
/// Carries the location map backing the geospatial predicates; an engine
/// built with [`FilterEngine::new`] has an empty map and evaluates those
/// predicates to false.
#[derive(Clone)]
pub struct FilterEngine {
    locations: Arc<LocationMap>,
}

impl FilterEngine {
    pub fn new() -> Self {
        Self {
            locations: Arc::new(LocationMap::empty()),
        }
    }

    pub fn with_locations(locations: Arc<LocationMap>) -> Self {
        Self { locations }
    }

    /// Parse an expression once for evaluation against many documents.
    pub fn compile(&self, input: &str) -> Result<CompiledExpr, ExprError> {
        parser::parse(input).map(|root| CompiledExpr { root })
    }

    /// Evaluate a compiled expression against a document, coercing the
    /// result to a boolean. Non-boolean results and evaluation misses are
    /// false.
    pub fn matches(&self, expr: &CompiledExpr, doc: &Value) -> bool {
        matches!(
            eval::eval(&expr.root, doc, &self.locations),
            Ok(EvalValue::Bool(true))
        )
    }

    /// Convenience: compile and evaluate in one step.
    pub fn eval(&self, input: &str, doc: &Value) -> Result<bool, ExprError> {
        let compiled = self.compile(input)?;
        Ok(self.matches(&compiled, doc))
    }
}

impl Default for FilterEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for FilterEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterEngine").finish_non_exhaustive()
    }
}
