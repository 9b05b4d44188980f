//! Operand-stack slots.
//!
//! The operand stack holds more than plain values: `GET_ATTR` and
//! `INDEX_OF` push *lazy lvalue paths* that only resolve against the live
//! container when read, so a following `SET_VAL` can write through them
//! instead; `CALL` parks its return descriptor here as well. [`Slot::resolve`]
//! turns any readable slot into the storage cell it denotes.

use crate::value::{cell, Value, ValueRef};
use quill_core::QuillError;
use std::rc::Rc;

/// One operand-stack entry.
#[derive(Clone)]
pub enum Slot {
    /// A storage cell (variable, literal or intermediate result).
    Value(ValueRef),
    /// Lazy attribute path: `target.key`, unresolved.
    Attr { target: ValueRef, key: String },
    /// Lazy index path: `target[index]`, unresolved.
    Index { target: ValueRef, index: i64 },
    /// A parked caller state, consumed by `RETURN`.
    Return { ip: usize, cross_module: bool },
}

impl Slot {
    /// Box a plain value into a fresh slot.
    #[inline]
    #[must_use]
    pub fn from_value(value: Value) -> Self {
        Self::Value(cell(value))
    }

    /// Resolve this slot to the cell it denotes, reading through lazy
    /// paths against the live container.
    pub fn resolve(&self) -> Result<ValueRef, QuillError> {
        match self {
            Self::Value(c) => Ok(c.clone()),
            Self::Attr { target, key } => attr_cell(target, key),
            Self::Index { target, index } => index_cell(target, *index),
            Self::Return { .. } => Err(QuillError::internal(
                "return descriptor used as a value",
            )),
        }
    }

    /// Resolve and clone out the current value.
    pub fn value(&self) -> Result<Value, QuillError> {
        Ok(self.resolve()?.borrow().clone())
    }

    /// Write `value` through this slot into its storage.
    pub fn assign(&self, value: Value) -> Result<(), QuillError> {
        let target = self.resolve()?;
        *target.borrow_mut() = value;
        Ok(())
    }
}

/// Find the member cell for `target.key`. The container may be a Tuple of
/// Named/KeyValue pairs, a pair itself, or a boxed cell.
fn attr_cell(target: &ValueRef, key: &str) -> Result<ValueRef, QuillError> {
    let borrowed = target.borrow();
    match &*borrowed {
        Value::Tuple(members) => {
            for member in members {
                let found = match &*member.borrow() {
                    Value::Named { key: k, value } | Value::KeyValue { key: k, value } => {
                        matches!(&*k.borrow(), Value::Str(s) if s == key).then(|| value.clone())
                    }
                    _ => None,
                };
                if let Some(value) = found {
                    return Ok(value);
                }
            }
            Err(QuillError::key(key))
        }
        Value::Named { key: k, value } | Value::KeyValue { key: k, value } => {
            if matches!(&*k.borrow(), Value::Str(s) if s == key) {
                Ok(value.clone())
            } else {
                Err(QuillError::key(key))
            }
        }
        Value::Wrap(inner) => {
            let inner = inner.clone();
            drop(borrowed);
            attr_cell(&inner, key)
        }
        other => Err(QuillError::type_error(format!(
            "cannot access attribute '{key}' on {}",
            other.type_name()
        ))),
    }
}

/// Find the member cell for `target[index]`. Tuples index into their
/// member cells; strings produce a one-character string in a fresh cell.
fn index_cell(target: &ValueRef, index: i64) -> Result<ValueRef, QuillError> {
    let borrowed = target.borrow();
    match &*borrowed {
        Value::Tuple(members) => {
            let at = normalize(index, members.len())?;
            Ok(members[at].clone())
        }
        Value::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            let at = normalize(index, chars.len())?;
            Ok(cell(Value::Str(chars[at].to_string())))
        }
        Value::Wrap(inner) => {
            let inner = inner.clone();
            drop(borrowed);
            index_cell(&inner, index)
        }
        other => Err(QuillError::type_error(format!(
            "cannot index {}",
            other.type_name()
        ))),
    }
}

/// Negative indices count from the end.
pub(crate) fn normalize(index: i64, len: usize) -> Result<usize, QuillError> {
    let at = if index < 0 { index + len as i64 } else { index };
    if at < 0 || at as usize >= len {
        return Err(QuillError::index(index, len));
    }
    Ok(at as usize)
}

/// Dereference one level of `Ref` for argument passing.
#[must_use]
pub fn deref_cell(cell: &ValueRef) -> ValueRef {
    let inner = match &*cell.borrow() {
        Value::Ref(target) => Some(target.clone()),
        _ => None,
    };
    inner.unwrap_or_else(|| Rc::clone(cell))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn named(key: &str, value: Value) -> ValueRef {
        cell(Value::Named {
            key: cell(Value::Str(key.into())),
            value: cell(value),
        })
    }

    #[test]
    fn test_attr_path_reads_and_writes_through() {
        let tuple = cell(Value::Tuple(vec![named("x", Value::Int(1))]));
        let slot = Slot::Attr {
            target: tuple.clone(),
            key: "x".into(),
        };
        assert_eq!(slot.value().unwrap(), Value::Int(1));
        slot.assign(Value::Int(9)).unwrap();
        let fresh = Slot::Attr {
            target: tuple,
            key: "x".into(),
        };
        assert_eq!(fresh.value().unwrap(), Value::Int(9));
    }

    #[test]
    fn test_missing_attr_is_key_error() {
        let tuple = cell(Value::Tuple(vec![named("x", Value::Int(1))]));
        let slot = Slot::Attr {
            target: tuple,
            key: "y".into(),
        };
        assert!(slot.value().unwrap_err().to_string().starts_with("KeyError"));
    }

    #[test]
    fn test_index_path() {
        let tuple = cell(Value::Tuple(vec![
            cell(Value::Int(10)),
            cell(Value::Int(20)),
        ]));
        let slot = Slot::Index {
            target: tuple.clone(),
            index: -1,
        };
        assert_eq!(slot.value().unwrap(), Value::Int(20));
        slot.assign(Value::Int(7)).unwrap();
        let Value::Tuple(members) = &*tuple.borrow() else {
            unreachable!()
        };
        assert_eq!(*members[1].borrow(), Value::Int(7));
    }

    #[test]
    fn test_index_out_of_range() {
        let tuple = cell(Value::Tuple(vec![cell(Value::Int(1))]));
        let slot = Slot::Index {
            target: tuple,
            index: 3,
        };
        assert!(slot
            .value()
            .unwrap_err()
            .to_string()
            .starts_with("IndexError"));
    }

    #[test]
    fn test_string_indexing() {
        let s = cell(Value::Str("abc".into()));
        let slot = Slot::Index {
            target: s,
            index: 1,
        };
        assert_eq!(slot.value().unwrap(), Value::Str("b".into()));
    }

    #[test]
    fn test_return_descriptor_is_not_a_value() {
        let slot = Slot::Return {
            ip: 0,
            cross_module: false,
        };
        assert!(slot.resolve().is_err());
    }
}
