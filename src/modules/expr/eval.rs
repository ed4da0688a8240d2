//! Expression evaluation against a single JSON document.

use serde_json::Value;

use super::ast::{BinOp, EvalValue, Expr};
use super::ExprError;
use crate::modules::location::{distance_meters, LocationMap};

pub fn eval(expr: &Expr, doc: &Value, locations: &LocationMap) -> Result<EvalValue, ExprError> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Path(segments) => Ok(lookup(doc, segments)),
        Expr::Not(inner) => {
            let value = eval(inner, doc, locations)?;
            Ok(EvalValue::Bool(!truthy(&value)))
        }
        Expr::Binary(op, lhs, rhs) => eval_binary(*op, lhs, rhs, doc, locations),
        Expr::Call(name, args) => eval_call(name, args, doc, locations),
    }
}

fn lookup(doc: &Value, segments: &[String]) -> EvalValue {
    let mut current = doc;
    for segment in segments {
        current = match current {
            Value::Object(map) => match map.get(segment) {
                Some(next) => next,
                None => return EvalValue::Null,
            },
            Value::Array(items) => match segment.parse::<usize>().ok().and_then(|i| items.get(i)) {
                Some(next) => next,
                None => return EvalValue::Null,
            },
            _ => return EvalValue::Null,
        };
    }
    EvalValue::from_json(current)
}

fn truthy(value: &EvalValue) -> bool {
    matches!(value, EvalValue::Bool(true))
}

fn eval_binary(
    op: BinOp,
    lhs: &Expr,
    rhs: &Expr,
    doc: &Value,
    locations: &LocationMap,
) -> Result<EvalValue, ExprError> {
    match op {
        BinOp::And => {
            let left = eval(lhs, doc, locations)?;
            if !truthy(&left) {
                return Ok(EvalValue::Bool(false));
            }
            let right = eval(rhs, doc, locations)?;
            Ok(EvalValue::Bool(truthy(&right)))
        }
        BinOp::Or => {
            let left = eval(lhs, doc, locations)?;
            if truthy(&left) {
                return Ok(EvalValue::Bool(true));
            }
            let right = eval(rhs, doc, locations)?;
            Ok(EvalValue::Bool(truthy(&right)))
        }
        BinOp::Eq | BinOp::Ne => {
            let left = eval(lhs, doc, locations)?;
            let right = eval(rhs, doc, locations)?;
            let equal = scalar_eq(&left, &right);
            Ok(EvalValue::Bool(if op == BinOp::Eq { equal } else { !equal }))
        }
        BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
            let left = eval(lhs, doc, locations)?;
            let right = eval(rhs, doc, locations)?;
            Ok(EvalValue::Bool(ordered(op, &left, &right)))
        }
    }
}

fn scalar_eq(left: &EvalValue, right: &EvalValue) -> bool {
    match (left, right) {
        (EvalValue::Str(a), EvalValue::Str(b)) => a == b,
        (EvalValue::Num(a), EvalValue::Num(b)) => a == b,
        (EvalValue::Bool(a), EvalValue::Bool(b)) => a == b,
        (EvalValue::Null, EvalValue::Null) => true,
        _ => false,
    }
}

/// Ordering comparisons hold between two numbers or two strings; any other
/// pairing is false.
fn ordered(op: BinOp, left: &EvalValue, right: &EvalValue) -> bool {
    let ordering = match (left, right) {
        (EvalValue::Num(a), EvalValue::Num(b)) => a.partial_cmp(b),
        (EvalValue::Str(a), EvalValue::Str(b)) => Some(a.cmp(b)),
        _ => None,
    };
    let Some(ordering) = ordering else {
        return false;
    };
    match op {
        BinOp::Lt => ordering.is_lt(),
        BinOp::Le => ordering.is_le(),
        BinOp::Gt => ordering.is_gt(),
        BinOp::Ge => ordering.is_ge(),
        _ => false,
    }
}

fn eval_call(
    name: &str,
    args: &[Expr],
    doc: &Value,
    locations: &LocationMap,
) -> Result<EvalValue, ExprError> {
    let values = args
        .iter()
        .map(|arg| eval(arg, doc, locations))
        .collect::<Result<Vec<_>, _>>()?;

    match name {
        "contains" => {
            expect_arity(name, 2, values.len())?;
            let haystack = values[0].as_str().unwrap_or_default();
            let needle = values[1].as_str().unwrap_or_default();
            Ok(EvalValue::Bool(haystack.contains(needle)))
        }
        "zipWithin" => {
            expect_arity(name, 5, values.len())?;
            let source = resolve_zip(locations, &values[1], &values[0]);
            let target = resolve_zip(locations, &values[3], &values[2]);
            let within = match (source, target, values[4].as_num()) {
                (Some(src), Some(dst), Some(max)) => {
                    distance_meters(src.0, src.1, dst.0, dst.1) <= max
                }
                _ => false,
            };
            Ok(EvalValue::Bool(within))
        }
        "coordsWithin" => {
            expect_arity(name, 5, values.len())?;
            let source = match (values[0].as_num(), values[1].as_num()) {
                (Some(lat), Some(lon)) => Some((lat, lon)),
                _ => None,
            };
            let target = resolve_zip(locations, &values[3], &values[2]);
            let within = match (source, target, values[4].as_num()) {
                (Some(src), Some(dst), Some(max)) => {
                    distance_meters(src.0, src.1, dst.0, dst.1) <= max
                }
                _ => false,
            };
            Ok(EvalValue::Bool(within))
        }
        other => Err(ExprError::UnknownFunction(other.to_string())),
    }
}

fn expect_arity(name: &str, expected: usize, got: usize) -> Result<(), ExprError> {
    if expected == got {
        Ok(())
    } else {
        Err(ExprError::Arity {
            name: name.to_string(),
            expected,
            got,
        })
    }
}

fn resolve_zip(
    locations: &LocationMap,
    country: &EvalValue,
    zip: &EvalValue,
) -> Option<(f64, f64)> {
    let country = country.as_str()?;
    let zip = zip.as_str()?;
    if zip.is_empty() {
        return None;
    }
    locations.coords(country, zip)
}
