//! The runtime value model.
//!
//! Every value lives in a shared mutable cell ([`ValueRef`]). Bindings,
//! tuple members and parameter slots all hold cells, and assignment
//! replaces the cell's contents in place, so two bindings that share a
//! cell observe each other's writes. Cloning a `Value` is shallow: a
//! cloned Tuple shares its member cells, which is what gives closures
//! their persistent state.

use quill_core::QuillError;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use quill_compiler::ModuleCode;

/// A shared mutable storage cell.
pub type ValueRef = Rc<RefCell<Value>>;

/// Box a value in a fresh cell.
#[inline]
#[must_use]
pub fn cell(value: Value) -> ValueRef {
    Rc::new(RefCell::new(value))
}

/// A host callable registered as a built-in.
pub type BuiltinFn = Rc<dyn Fn(&[ValueRef]) -> Result<Value, QuillError>>;

/// One runtime value.
#[derive(Clone)]
pub enum Value {
    None,
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
    /// Ordered sequence of member cells. Members are shared, not copied.
    Tuple(Vec<ValueRef>),
    /// Dictionary-style pair.
    KeyValue { key: ValueRef, value: ValueRef },
    /// Binding-slot pair, used for parameters and method members.
    Named { key: ValueRef, value: ValueRef },
    Lambda(Lambda),
    /// Indirection to another cell, created by `ref`.
    Ref(ValueRef),
    /// A boxed mutable slot, created by `wrap`. Shallow clones share the
    /// inner cell.
    Wrap(ValueRef),
    Builtin(Builtin),
}

/// A compiled function value.
#[derive(Clone)]
pub struct Lambda {
    /// Signature of the instruction block this lambda enters.
    pub signature: String,
    /// The default-argument tuple, used as the binding template.
    pub defaults: ValueRef,
    /// Receiver wired at tuple construction for method-style calls.
    pub receiver: Option<ValueRef>,
    /// The module whose instruction array owns the block.
    pub module: Rc<ModuleCode>,
}

/// A named host callable.
#[derive(Clone)]
pub struct Builtin {
    pub name: &'static str,
    pub func: BuiltinFn,
}

impl Value {
    /// The tag name used in diagnostics and by the `type` built-in.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Bool(_) => "bool",
            Self::Str(_) => "string",
            Self::Tuple(_) => "tuple",
            Self::KeyValue { .. } => "keyvalue",
            Self::Named { .. } => "named",
            Self::Lambda(_) => "lambda",
            Self::Ref(_) => "ref",
            Self::Wrap(inner) => inner.borrow().type_name(),
            Self::Builtin(_) => "builtin",
        }
    }

    /// Strict boolean coercion: only `Bool` (possibly wrapped) qualifies.
    pub fn as_bool(&self) -> Result<bool, QuillError> {
        match self {
            Self::Bool(b) => Ok(*b),
            Self::Wrap(inner) => inner.borrow().as_bool(),
            other => Err(QuillError::type_error(format!(
                "expected bool, found {}",
                other.type_name()
            ))),
        }
    }

    /// Integer coercion used by index paths.
    pub fn as_index(&self) -> Result<i64, QuillError> {
        match self {
            Self::Int(i) => Ok(*i),
            Self::Wrap(inner) => inner.borrow().as_index(),
            other => Err(QuillError::type_error(format!(
                "expected int index, found {}",
                other.type_name()
            ))),
        }
    }

    /// String key used by attribute paths and named binding.
    pub fn as_key(&self) -> Result<String, QuillError> {
        match self {
            Self::Str(s) => Ok(s.clone()),
            Self::Wrap(inner) => inner.borrow().as_key(),
            other => Err(QuillError::type_error(format!(
                "expected string key, found {}",
                other.type_name()
            ))),
        }
    }

    /// Recursive copy into entirely fresh cells, for the `copy` modifier.
    #[must_use]
    pub fn deep_copy(&self) -> Value {
        match self {
            Self::Tuple(members) => Self::Tuple(
                members
                    .iter()
                    .map(|m| cell(m.borrow().deep_copy()))
                    .collect(),
            ),
            Self::KeyValue { key, value } => Self::KeyValue {
                key: cell(key.borrow().deep_copy()),
                value: cell(value.borrow().deep_copy()),
            },
            Self::Named { key, value } => Self::Named {
                key: cell(key.borrow().deep_copy()),
                value: cell(value.borrow().deep_copy()),
            },
            Self::Wrap(inner) => Self::Wrap(cell(inner.borrow().deep_copy())),
            other => other.clone(),
        }
    }

    /// Quoted rendering for the `repr` built-in.
    #[must_use]
    pub fn repr(&self) -> String {
        match self {
            Self::Str(s) => format!("{s:?}"),
            Self::Wrap(inner) => inner.borrow().repr(),
            other => other.to_string(),
        }
    }
}

impl PartialEq for Value {
    /// Structural equality with strict typing: heterogeneous variants
    /// compare unequal, never raise.
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Wrap(a), b) => *a.borrow() == *b,
            (a, Self::Wrap(b)) => *a == *b.borrow(),
            (Self::None, Self::None) => true,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Tuple(a), Self::Tuple(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .zip(b.iter())
                        .all(|(x, y)| Rc::ptr_eq(x, y) || *x.borrow() == *y.borrow())
            }
            (
                Self::KeyValue { key: ka, value: va },
                Self::KeyValue { key: kb, value: vb },
            )
            | (Self::Named { key: ka, value: va }, Self::Named { key: kb, value: vb }) => {
                *ka.borrow() == *kb.borrow() && *va.borrow() == *vb.borrow()
            }
            (Self::Lambda(a), Self::Lambda(b)) => {
                a.signature == b.signature && Rc::ptr_eq(&a.defaults, &b.defaults)
            }
            (Self::Ref(a), Self::Ref(b)) => Rc::ptr_eq(a, b),
            (Self::Builtin(a), Self::Builtin(b)) => a.name == b.name,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("none"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => {
                if v.fract() == 0.0 && v.is_finite() {
                    write!(f, "{v:.1}")
                } else {
                    write!(f, "{v}")
                }
            }
            Self::Bool(v) => write!(f, "{v}"),
            Self::Str(v) => f.write_str(v),
            Self::Tuple(members) => {
                f.write_str("(")?;
                for (i, m) in members.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", m.borrow().repr())?;
                }
                f.write_str(")")
            }
            Self::KeyValue { key, value } => {
                write!(f, "{}: {}", key.borrow().repr(), value.borrow().repr())
            }
            Self::Named { key, value } => {
                write!(f, "{} => {}", key.borrow(), value.borrow().repr())
            }
            Self::Lambda(lambda) => write!(f, "<lambda {}>", lambda.signature),
            Self::Ref(_) => f.write_str("<ref>"),
            Self::Wrap(inner) => write!(f, "{}", inner.borrow()),
            Self::Builtin(builtin) => write!(f, "<builtin {}>", builtin.name),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.type_name(), self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heterogeneous_equality_is_false() {
        assert_ne!(Value::Int(1), Value::Float(1.0));
        assert_ne!(Value::Str("1".into()), Value::Int(1));
        assert_ne!(Value::None, Value::Bool(false));
    }

    #[test]
    fn test_tuple_equality_is_structural() {
        let a = Value::Tuple(vec![cell(Value::Int(1)), cell(Value::Str("x".into()))]);
        let b = Value::Tuple(vec![cell(Value::Int(1)), cell(Value::Str("x".into()))]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_shallow_clone_shares_members() {
        let member = cell(Value::Int(1));
        let tuple = Value::Tuple(vec![member.clone()]);
        let aliased = tuple.clone();
        *member.borrow_mut() = Value::Int(9);
        let Value::Tuple(members) = &aliased else {
            unreachable!()
        };
        assert_eq!(*members[0].borrow(), Value::Int(9));
    }

    #[test]
    fn test_deep_copy_detaches_members() {
        let member = cell(Value::Int(1));
        let tuple = Value::Tuple(vec![member.clone()]);
        let copied = tuple.deep_copy();
        *member.borrow_mut() = Value::Int(9);
        let Value::Tuple(members) = &copied else {
            unreachable!()
        };
        assert_eq!(*members[0].borrow(), Value::Int(1));
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::Float(2.0).to_string(), "2.0");
        assert_eq!(Value::Float(2.5).to_string(), "2.5");
        assert_eq!(
            Value::Tuple(vec![cell(Value::Int(1)), cell(Value::Str("a".into()))]).to_string(),
            "(1, \"a\")"
        );
        assert_eq!(Value::None.to_string(), "none");
    }

    #[test]
    fn test_strict_bool() {
        assert!(Value::Bool(true).as_bool().unwrap());
        assert!(Value::Int(1).as_bool().is_err());
        assert!(Value::Wrap(cell(Value::Bool(false)))
            .as_bool()
            .is_ok_and(|b| !b));
    }
}
