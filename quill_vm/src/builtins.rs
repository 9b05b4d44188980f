//! Host hooks and the standard built-in library.
//!
//! Built-ins are ordinary host callables seeded into the bottom frame
//! before any user code runs. They receive argument *cells* (references
//! already dereferenced), so container-mutating built-ins like `del` and
//! `replace` write through to the caller's storage.

use crate::context::Context;
use crate::slot::normalize;
use crate::value::{cell, Builtin, BuiltinFn, Value, ValueRef};
use quill_core::{QuillError, RuntimeErrorKind};
use std::io::BufRead;
use std::rc::Rc;

/// Host-pluggable I/O and cancellation.
#[derive(Clone)]
pub struct HostHooks {
    /// Receives one fully formatted output line.
    pub print: Rc<dyn Fn(&str)>,
    /// Supplies one line of input (may include the trailing newline).
    pub read_line: Rc<dyn Fn() -> String>,
    /// Polled once per executed instruction; `true` aborts the request.
    pub should_stop: Rc<dyn Fn() -> bool>,
}

impl Default for HostHooks {
    fn default() -> Self {
        Self {
            print: Rc::new(|line| println!("{line}")),
            read_line: Rc::new(|| {
                let mut buf = String::new();
                let _ = std::io::stdin().lock().read_line(&mut buf);
                buf
            }),
            should_stop: Rc::new(|| false),
        }
    }
}

fn value_error(message: impl Into<String>) -> QuillError {
    QuillError::runtime(RuntimeErrorKind::ValueError, message)
}

fn arg<'a>(args: &'a [ValueRef], at: usize, name: &str) -> Result<&'a ValueRef, QuillError> {
    args.get(at)
        .ok_or_else(|| value_error(format!("{name} expects at least {} argument(s)", at + 1)))
}

fn register(ctx: &mut Context, name: &'static str, func: BuiltinFn) {
    ctx.declare(name, cell(Value::Builtin(Builtin { name, func })));
}

/// Seed the standard library into the innermost (bottom) frame.
pub fn install(ctx: &mut Context, hooks: &HostHooks) {
    let print_hook = hooks.print.clone();
    register(
        ctx,
        "print",
        Rc::new(move |args| {
            let line = args
                .iter()
                .map(|c| c.borrow().to_string())
                .collect::<Vec<_>>()
                .join(" ");
            print_hook(&line);
            Ok(Value::None)
        }),
    );

    let print_hook = hooks.print.clone();
    let read_hook = hooks.read_line.clone();
    register(
        ctx,
        "input",
        Rc::new(move |args| {
            if let Some(prompt) = args.first() {
                print_hook(&prompt.borrow().to_string());
            }
            let line = read_hook();
            Ok(Value::Str(
                line.trim_end_matches(['\n', '\r']).to_string(),
            ))
        }),
    );

    register(
        ctx,
        "len",
        Rc::new(|args| match &*arg(args, 0, "len")?.borrow() {
            Value::Tuple(members) => Ok(Value::Int(members.len() as i64)),
            Value::Str(s) => Ok(Value::Int(s.chars().count() as i64)),
            other => Err(QuillError::type_error(format!(
                "len of {}",
                other.type_name()
            ))),
        }),
    );

    register(
        ctx,
        "type",
        Rc::new(|args| {
            Ok(Value::Str(
                arg(args, 0, "type")?.borrow().type_name().to_string(),
            ))
        }),
    );

    register(
        ctx,
        "int",
        Rc::new(|args| match &*arg(args, 0, "int")?.borrow() {
            Value::Int(v) => Ok(Value::Int(*v)),
            Value::Float(v) => Ok(Value::Int(*v as i64)),
            Value::Bool(v) => Ok(Value::Int(i64::from(*v))),
            Value::Str(s) => s
                .trim()
                .parse()
                .map(Value::Int)
                .map_err(|_| value_error(format!("cannot parse {s:?} as int"))),
            other => Err(QuillError::type_error(format!(
                "int of {}",
                other.type_name()
            ))),
        }),
    );

    register(
        ctx,
        "float",
        Rc::new(|args| match &*arg(args, 0, "float")?.borrow() {
            Value::Int(v) => Ok(Value::Float(*v as f64)),
            Value::Float(v) => Ok(Value::Float(*v)),
            Value::Str(s) => s
                .trim()
                .parse()
                .map(Value::Float)
                .map_err(|_| value_error(format!("cannot parse {s:?} as float"))),
            other => Err(QuillError::type_error(format!(
                "float of {}",
                other.type_name()
            ))),
        }),
    );

    register(
        ctx,
        "str",
        Rc::new(|args| Ok(Value::Str(arg(args, 0, "str")?.borrow().to_string()))),
    );

    register(
        ctx,
        "bool",
        Rc::new(|args| match &*arg(args, 0, "bool")?.borrow() {
            Value::Bool(v) => Ok(Value::Bool(*v)),
            Value::Int(v) => Ok(Value::Bool(*v != 0)),
            Value::Float(v) => Ok(Value::Bool(*v != 0.0)),
            Value::None => Ok(Value::Bool(false)),
            Value::Str(s) => match s.as_str() {
                "true" => Ok(Value::Bool(true)),
                "false" => Ok(Value::Bool(false)),
                other => Err(value_error(format!("cannot parse {other:?} as bool"))),
            },
            other => Err(QuillError::type_error(format!(
                "bool of {}",
                other.type_name()
            ))),
        }),
    );

    register(
        ctx,
        "range",
        Rc::new(|args| {
            let bound = |at: usize| -> Result<i64, QuillError> {
                arg(args, at, "range")?.borrow().as_index()
            };
            let (start, end, step) = match args.len() {
                1 => (0, bound(0)?, 1),
                2 => (bound(0)?, bound(1)?, 1),
                3 => (bound(0)?, bound(1)?, bound(2)?),
                n => return Err(value_error(format!("range expects 1-3 arguments, got {n}"))),
            };
            if step == 0 {
                return Err(value_error("range step must not be zero"));
            }
            let mut members = Vec::new();
            let mut at = start;
            while (step > 0 && at < end) || (step < 0 && at > end) {
                members.push(cell(Value::Int(at)));
                at += step;
            }
            Ok(Value::Tuple(members))
        }),
    );

    register(
        ctx,
        "del",
        Rc::new(|args| {
            let container = arg(args, 0, "del")?;
            let selector = arg(args, 1, "del")?.borrow().clone();
            let mut borrowed = container.borrow_mut();
            let Value::Tuple(members) = &mut *borrowed else {
                return Err(QuillError::type_error(format!(
                    "del on {}",
                    borrowed.type_name()
                )));
            };
            match selector {
                Value::Int(index) => {
                    let at = normalize(index, members.len())?;
                    members.remove(at);
                }
                Value::Str(key) => {
                    let at = members
                        .iter()
                        .position(|m| match &*m.borrow() {
                            Value::Named { key: k, .. } | Value::KeyValue { key: k, .. } => {
                                matches!(&*k.borrow(), Value::Str(s) if *s == key)
                            }
                            _ => false,
                        })
                        .ok_or_else(|| QuillError::key(&key))?;
                    members.remove(at);
                }
                other => {
                    return Err(QuillError::type_error(format!(
                        "del selector must be int or string, found {}",
                        other.type_name()
                    )))
                }
            }
            Ok(Value::None)
        }),
    );

    register(
        ctx,
        "replace",
        Rc::new(|args| {
            let target = arg(args, 0, "replace")?;
            let target_value = target.borrow().clone();
            match target_value {
                Value::Str(s) => {
                    let from = arg(args, 1, "replace")?.borrow().as_key()?;
                    let to = arg(args, 2, "replace")?.borrow().as_key()?;
                    Ok(Value::Str(s.replace(&from, &to)))
                }
                Value::Tuple(members) => {
                    let index = arg(args, 1, "replace")?.borrow().as_index()?;
                    let value = arg(args, 2, "replace")?.borrow().clone();
                    let at = normalize(index, members.len())?;
                    *members[at].borrow_mut() = value;
                    Ok(Value::None)
                }
                other => Err(QuillError::type_error(format!(
                    "replace on {}",
                    other.type_name()
                ))),
            }
        }),
    );

    register(
        ctx,
        "sum",
        Rc::new(|args| {
            let members = tuple_or_args(args, "sum")?;
            let mut total = Value::Int(0);
            for member in &members {
                total = crate::ops::binary("+", &total, &member.borrow())?;
            }
            Ok(total)
        }),
    );

    register(ctx, "max", Rc::new(|args| extremum(args, "max", ">")));
    register(ctx, "min", Rc::new(|args| extremum(args, "min", "<")));

    register(
        ctx,
        "slice",
        Rc::new(|args| {
            let start = arg(args, 1, "slice")?.borrow().as_index()?;
            let end = arg(args, 2, "slice")?.borrow().as_index()?;
            match &*arg(args, 0, "slice")?.borrow() {
                Value::Tuple(members) => {
                    let (lo, hi) = clamp_range(start, end, members.len());
                    Ok(Value::Tuple(members[lo..hi].to_vec()))
                }
                Value::Str(s) => {
                    let chars: Vec<char> = s.chars().collect();
                    let (lo, hi) = clamp_range(start, end, chars.len());
                    Ok(Value::Str(chars[lo..hi].iter().collect()))
                }
                other => Err(QuillError::type_error(format!(
                    "slice of {}",
                    other.type_name()
                ))),
            }
        }),
    );

    register(
        ctx,
        "repr",
        Rc::new(|args| Ok(Value::Str(arg(args, 0, "repr")?.borrow().repr()))),
    );
}

/// A single tuple argument spreads; otherwise the arguments themselves
/// are the sequence.
fn tuple_or_args(args: &[ValueRef], name: &str) -> Result<Vec<ValueRef>, QuillError> {
    if args.len() == 1 {
        if let Value::Tuple(members) = &*arg(args, 0, name)?.borrow() {
            return Ok(members.clone());
        }
    }
    Ok(args.to_vec())
}

fn extremum(args: &[ValueRef], name: &str, op: &str) -> Result<Value, QuillError> {
    let members = tuple_or_args(args, name)?;
    let mut best: Option<Value> = None;
    for member in &members {
        let candidate = member.borrow().clone();
        best = Some(match best {
            None => candidate,
            Some(current) => {
                match crate::ops::binary(op, &candidate, &current)? {
                    Value::Bool(true) => candidate,
                    _ => current,
                }
            }
        });
    }
    best.ok_or_else(|| value_error(format!("{name} of an empty sequence")))
}

fn clamp_range(start: i64, end: i64, len: usize) -> (usize, usize) {
    let fix = |v: i64| -> usize {
        let v = if v < 0 { v + len as i64 } else { v };
        v.clamp(0, len as i64) as usize
    };
    let lo = fix(start);
    let hi = fix(end).max(lo);
    (lo, hi)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(name: &str, args: &[ValueRef]) -> Result<Value, QuillError> {
        let mut ctx = Context::new();
        ctx.push_root_frame();
        install(&mut ctx, &HostHooks::default());
        let builtin = ctx.lookup(name).unwrap();
        let func = match &*builtin.borrow() {
            Value::Builtin(b) => b.func.clone(),
            _ => panic!("not a builtin"),
        };
        func(args)
    }

    #[test]
    fn test_len() {
        let t = cell(Value::Tuple(vec![cell(Value::Int(1)), cell(Value::Int(2))]));
        assert_eq!(call("len", &[t]).unwrap(), Value::Int(2));
        let s = cell(Value::Str("héllo".into()));
        assert_eq!(call("len", &[s]).unwrap(), Value::Int(5));
    }

    #[test]
    fn test_casts() {
        assert_eq!(
            call("int", &[cell(Value::Str(" 42 ".into()))]).unwrap(),
            Value::Int(42)
        );
        assert_eq!(
            call("float", &[cell(Value::Int(2))]).unwrap(),
            Value::Float(2.0)
        );
        assert_eq!(
            call("str", &[cell(Value::Int(7))]).unwrap(),
            Value::Str("7".into())
        );
        assert!(call("int", &[cell(Value::Str("nope".into()))]).is_err());
    }

    #[test]
    fn test_range_forms() {
        let Value::Tuple(m) = call("range", &[cell(Value::Int(3))]).unwrap() else {
            panic!()
        };
        assert_eq!(m.len(), 3);
        let Value::Tuple(m) = call(
            "range",
            &[cell(Value::Int(5)), cell(Value::Int(1)), cell(Value::Int(-2))],
        )
        .unwrap() else {
            panic!()
        };
        assert_eq!(m.len(), 2);
        assert_eq!(*m[0].borrow(), Value::Int(5));
        assert!(call("range", &[cell(Value::Int(1)), cell(Value::Int(9)), cell(Value::Int(0))]).is_err());
    }

    #[test]
    fn test_del_mutates_through_the_cell() {
        let t = cell(Value::Tuple(vec![cell(Value::Int(1)), cell(Value::Int(2))]));
        call("del", &[t.clone(), cell(Value::Int(0))]).unwrap();
        let Value::Tuple(members) = &*t.borrow() else {
            panic!()
        };
        assert_eq!(members.len(), 1);
        assert_eq!(*members[0].borrow(), Value::Int(2));
    }

    #[test]
    fn test_replace_on_string_and_tuple() {
        let s = cell(Value::Str("a-b".into()));
        assert_eq!(
            call(
                "replace",
                &[s, cell(Value::Str("-".into())), cell(Value::Str("+".into()))]
            )
            .unwrap(),
            Value::Str("a+b".into())
        );
        let t = cell(Value::Tuple(vec![cell(Value::Int(1))]));
        call("replace", &[t.clone(), cell(Value::Int(0)), cell(Value::Int(9))]).unwrap();
        let Value::Tuple(members) = &*t.borrow() else {
            panic!()
        };
        assert_eq!(*members[0].borrow(), Value::Int(9));
    }

    #[test]
    fn test_aggregates() {
        let t = cell(Value::Tuple(vec![
            cell(Value::Int(3)),
            cell(Value::Int(1)),
            cell(Value::Int(2)),
        ]));
        assert_eq!(call("sum", &[t.clone()]).unwrap(), Value::Int(6));
        assert_eq!(call("max", &[t.clone()]).unwrap(), Value::Int(3));
        assert_eq!(call("min", &[t]).unwrap(), Value::Int(1));
        assert!(call("max", &[cell(Value::Tuple(Vec::new()))]).is_err());
    }

    #[test]
    fn test_slice() {
        let s = cell(Value::Str("hello".into()));
        assert_eq!(
            call("slice", &[s, cell(Value::Int(1)), cell(Value::Int(-1))]).unwrap(),
            Value::Str("ell".into())
        );
    }

    #[test]
    fn test_repr_quotes_strings() {
        assert_eq!(
            call("repr", &[cell(Value::Str("hi".into()))]).unwrap(),
            Value::Str("\"hi\"".into())
        );
    }
}
