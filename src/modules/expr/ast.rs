//! Expression AST and the scalar value domain.

use serde_json::Value;

/// Binary operators, loosest-binding first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// A parsed filter expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(EvalValue),

    /// Field path below the `doc` root, e.g. `doc.vendorID.peerID`.
    Path(Vec<String>),

    Not(Box<Expr>),

    Binary(BinOp, Box<Expr>, Box<Expr>),

    Call(String, Vec<Expr>),
}

/// Scalar evaluation result. Arrays and objects reached by a path collapse
/// to `Null`; predicates operate on scalars only.
#[derive(Debug, Clone, PartialEq)]
pub enum EvalValue {
    Null,
    Bool(bool),
    Num(f64),
    Str(String),
}

impl EvalValue {
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => EvalValue::Null,
            Value::Bool(b) => EvalValue::Bool(*b),
            Value::Number(n) => n.as_f64().map(EvalValue::Num).unwrap_or(EvalValue::Null),
            Value::String(s) => EvalValue::Str(s.clone()),
            Value::Array(_) | Value::Object(_) => EvalValue::Null,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            EvalValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_num(&self) -> Option<f64> {
        match self {
            EvalValue::Num(n) => Some(*n),
            _ => None,
        }
    }
}
