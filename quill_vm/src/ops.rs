//! Arithmetic, comparison and logic dispatch.
//!
//! Mismatched or unsupported operand combinations yield `None` rather
//! than raising; comparisons and equality always yield a `Bool` (false
//! across heterogeneous types). Boxed (`wrap`) operands are unwrapped
//! transparently.

use crate::value::Value;
use quill_core::QuillError;

/// Apply a binary operator by its source symbol.
pub fn binary(op: &str, lhs: &Value, rhs: &Value) -> Result<Value, QuillError> {
    if let Value::Wrap(inner) = lhs {
        let inner = inner.borrow().clone();
        return binary(op, &inner, rhs);
    }
    if let Value::Wrap(inner) = rhs {
        let inner = inner.borrow().clone();
        return binary(op, lhs, &inner);
    }
    Ok(match op {
        "+" => arithmetic(lhs, rhs, i64::checked_add, |a, b| a + b, str_concat),
        "-" => arithmetic(lhs, rhs, i64::checked_sub, |a, b| a - b, no_str),
        "*" => arithmetic(lhs, rhs, i64::checked_mul, |a, b| a * b, no_str),
        "/" => divide(lhs, rhs),
        "%" => modulo(lhs, rhs),
        "&&" => logic(lhs, rhs, |a, b| a && b),
        "||" => logic(lhs, rhs, |a, b| a || b),
        "==" => Value::Bool(lhs == rhs),
        "!=" => Value::Bool(lhs != rhs),
        "<" => compare(lhs, rhs, |o| o.is_lt()),
        "<=" => compare(lhs, rhs, |o| o.is_le()),
        ">" => compare(lhs, rhs, |o| o.is_gt()),
        ">=" => compare(lhs, rhs, |o| o.is_ge()),
        other => {
            return Err(QuillError::internal(format!(
                "unknown binary operator '{other}'"
            )))
        }
    })
}

/// Apply a prefix sign operator.
pub fn unary(op: &str, operand: &Value) -> Result<Value, QuillError> {
    if let Value::Wrap(inner) = operand {
        let inner = inner.borrow().clone();
        return unary(op, &inner);
    }
    Ok(match (op, operand) {
        ("-", Value::Int(v)) => v.checked_neg().map_or(Value::None, Value::Int),
        ("-", Value::Float(v)) => Value::Float(-v),
        ("+", Value::Int(v)) => Value::Int(*v),
        ("+", Value::Float(v)) => Value::Float(*v),
        ("-" | "+", _) => Value::None,
        (other, _) => {
            return Err(QuillError::internal(format!(
                "unknown unary operator '{other}'"
            )))
        }
    })
}

fn str_concat(a: &str, b: &str) -> Option<Value> {
    let mut out = String::with_capacity(a.len() + b.len());
    out.push_str(a);
    out.push_str(b);
    Some(Value::Str(out))
}

fn no_str(_: &str, _: &str) -> Option<Value> {
    None
}

/// Numeric dispatch with int/float promotion; strings get one hook.
fn arithmetic(
    lhs: &Value,
    rhs: &Value,
    int_op: fn(i64, i64) -> Option<i64>,
    float_op: fn(f64, f64) -> f64,
    str_op: fn(&str, &str) -> Option<Value>,
) -> Value {
    match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => int_op(*a, *b).map_or(Value::None, Value::Int),
        (Value::Float(a), Value::Float(b)) => Value::Float(float_op(*a, *b)),
        (Value::Int(a), Value::Float(b)) => Value::Float(float_op(*a as f64, *b)),
        (Value::Float(a), Value::Int(b)) => Value::Float(float_op(*a, *b as f64)),
        (Value::Str(a), Value::Str(b)) => str_op(a, b).unwrap_or(Value::None),
        _ => Value::None,
    }
}

/// `/` is true division: integer operands promote to float.
fn divide(lhs: &Value, rhs: &Value) -> Value {
    match (lhs, rhs) {
        (_, Value::Int(0)) => Value::None,
        (Value::Int(a), Value::Int(b)) => Value::Float(*a as f64 / *b as f64),
        (Value::Float(a), Value::Float(b)) => Value::Float(a / b),
        (Value::Int(a), Value::Float(b)) => Value::Float(*a as f64 / b),
        (Value::Float(a), Value::Int(b)) => Value::Float(a / *b as f64),
        _ => Value::None,
    }
}

fn modulo(lhs: &Value, rhs: &Value) -> Value {
    match (lhs, rhs) {
        (_, Value::Int(0)) => Value::None,
        (Value::Int(a), Value::Int(b)) => a.checked_rem_euclid(*b).map_or(Value::None, Value::Int),
        (Value::Float(a), Value::Float(b)) => Value::Float(a % b),
        _ => Value::None,
    }
}

fn logic(lhs: &Value, rhs: &Value, op: fn(bool, bool) -> bool) -> Value {
    match (lhs, rhs) {
        (Value::Bool(a), Value::Bool(b)) => Value::Bool(op(*a, *b)),
        _ => Value::None,
    }
}

fn compare(lhs: &Value, rhs: &Value, accept: fn(std::cmp::Ordering) -> bool) -> Value {
    let ordering = match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => a.partial_cmp(b),
        (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
        (Value::Int(a), Value::Float(b)) => (*a as f64).partial_cmp(b),
        (Value::Float(a), Value::Int(b)) => a.partial_cmp(&(*b as f64)),
        (Value::Str(a), Value::Str(b)) => a.partial_cmp(b),
        _ => None,
    };
    Value::Bool(ordering.is_some_and(accept))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::cell;

    fn bin(op: &str, a: Value, b: Value) -> Value {
        binary(op, &a, &b).unwrap()
    }

    #[test]
    fn test_int_arithmetic() {
        assert_eq!(bin("+", Value::Int(1), Value::Int(2)), Value::Int(3));
        assert_eq!(bin("*", Value::Int(2), Value::Int(3)), Value::Int(6));
        assert_eq!(bin("-", Value::Int(10), Value::Int(4)), Value::Int(6));
        assert_eq!(bin("%", Value::Int(7), Value::Int(3)), Value::Int(1));
    }

    #[test]
    fn test_int_division_is_true_division() {
        assert_eq!(bin("/", Value::Int(7), Value::Int(2)), Value::Float(3.5));
        assert_eq!(bin("/", Value::Int(6), Value::Int(3)), Value::Float(2.0));
    }

    #[test]
    fn test_int_float_promotion() {
        assert_eq!(bin("+", Value::Int(1), Value::Float(0.5)), Value::Float(1.5));
        assert_eq!(bin("/", Value::Float(1.0), Value::Int(4)), Value::Float(0.25));
    }

    #[test]
    fn test_division_by_zero_yields_none() {
        assert_eq!(bin("/", Value::Int(1), Value::Int(0)), Value::None);
        assert_eq!(bin("%", Value::Int(1), Value::Int(0)), Value::None);
    }

    #[test]
    fn test_mismatched_arithmetic_yields_none() {
        assert_eq!(bin("+", Value::Int(1), Value::Str("a".into())), Value::None);
        assert_eq!(bin("-", Value::Bool(true), Value::Int(1)), Value::None);
    }

    #[test]
    fn test_string_concat() {
        assert_eq!(
            bin("+", Value::Str("ab".into()), Value::Str("cd".into())),
            Value::Str("abcd".into())
        );
        assert_eq!(
            bin("-", Value::Str("ab".into()), Value::Str("b".into())),
            Value::None
        );
    }

    #[test]
    fn test_comparisons_always_bool() {
        assert_eq!(bin("<", Value::Int(1), Value::Int(2)), Value::Bool(true));
        assert_eq!(
            bin("<", Value::Str("a".into()), Value::Int(2)),
            Value::Bool(false)
        );
        assert_eq!(bin("==", Value::Int(1), Value::Float(1.0)), Value::Bool(false));
        assert_eq!(bin("!=", Value::Int(1), Value::Str("1".into())), Value::Bool(true));
    }

    #[test]
    fn test_logic_requires_bools() {
        assert_eq!(
            bin("&&", Value::Bool(true), Value::Bool(false)),
            Value::Bool(false)
        );
        assert_eq!(bin("||", Value::Bool(false), Value::Int(1)), Value::None);
    }

    #[test]
    fn test_wrap_unwraps() {
        assert_eq!(
            bin("+", Value::Wrap(cell(Value::Int(1))), Value::Int(2)),
            Value::Int(3)
        );
    }

    #[test]
    fn test_unary() {
        assert_eq!(unary("-", &Value::Int(3)).unwrap(), Value::Int(-3));
        assert_eq!(unary("+", &Value::Float(1.5)).unwrap(), Value::Float(1.5));
        assert_eq!(unary("-", &Value::Str("x".into())).unwrap(), Value::None);
    }
}
