//! The dispatch loop.
//!
//! One `Executor` owns an operand stack, a frame stack and a stack of
//! active modules (imports push a new one). The loop fetches the
//! instruction at the current pointer in the top module, polls the
//! cancellation hook once, executes, and advances until the pointer runs
//! off the module or a top-level `RETURN` halts it.
//!
//! Calls park a return descriptor on the operand stack *below* the
//! callee's recorded stack depth; `RETURN` unwinds frames to the call
//! boundary, truncates the stack down to that descriptor, restores the
//! caller's pointer and pushes the result. The error path performs no
//! unwinding at all: the host discards the executor and reads its trace.

use crate::builtins::{self, HostHooks};
use crate::context::Context;
use crate::ops;
use crate::slot::{deref_cell, Slot};
use crate::value::{cell, Lambda, Value, ValueRef};
use quill_compiler::{Instruction, ModuleCode};
use quill_core::{QuillError, RuntimeErrorKind};
use smallvec::SmallVec;
use std::rc::Rc;

/// Result of one top-level execution request.
#[derive(Debug)]
pub struct ExecOutcome {
    /// The value the `__main__` block finished with.
    pub value: Value,
    /// Whatever `__export__` held at the end, the module's public face.
    pub export: Value,
}

/// A single-request virtual machine instance.
pub struct Executor {
    hooks: HostHooks,
    stack: Vec<Slot>,
    context: Context,
    modules: Vec<Rc<ModuleCode>>,
    ip: usize,
    call_depth: usize,
    last_debug: u32,
}

impl Executor {
    #[must_use]
    pub fn new(hooks: HostHooks) -> Self {
        Self {
            hooks,
            stack: Vec::new(),
            context: Context::new(),
            modules: Vec::new(),
            ip: 0,
            call_depth: 0,
            last_debug: 0,
        }
    }

    /// Execute a linked module's `__main__` with the given initial
    /// bindings. One executor serves one request.
    pub fn execute(
        &mut self,
        code: Rc<ModuleCode>,
        bindings: Vec<(String, Value)>,
    ) -> Result<ExecOutcome, QuillError> {
        self.modules.push(Rc::clone(&code));
        self.context.push_root_frame();
        builtins::install(&mut self.context, &self.hooks);
        for (name, value) in bindings {
            self.context.declare(name, cell(value));
        }
        self.context.declare("__export__", cell(Value::None));
        self.ip = code.entry("__main__")?;
        let value = self.dispatch()?;
        let export = self
            .context
            .lookup("__export__")
            .map_or(Value::None, |c| c.borrow().clone());
        Ok(ExecOutcome { value, export })
    }

    /// Source offset of the last executed debug record, for diagnostics.
    #[must_use]
    pub fn last_debug_offset(&self) -> u32 {
        self.last_debug
    }

    /// Call-site offsets of the still-open call frames after a failure,
    /// outermost first.
    #[must_use]
    pub fn call_trace(&self) -> Vec<u32> {
        self.context.call_sites()
    }

    fn dispatch(&mut self) -> Result<Value, QuillError> {
        loop {
            if (self.hooks.should_stop)() {
                return Err(QuillError::Cancelled);
            }
            let module = Rc::clone(
                self.modules
                    .last()
                    .ok_or_else(|| QuillError::internal("no active module"))?,
            );
            let Some(instruction) = module.instructions.get(self.ip) else {
                return Ok(self.final_value());
            };
            match instruction {
                Instruction::LoadNone => self.push_value(Value::None),
                Instruction::LoadInt(v) => self.push_value(Value::Int(*v)),
                Instruction::LoadFloat(v) => self.push_value(Value::Float(*v)),
                Instruction::LoadBool(v) => self.push_value(Value::Bool(*v)),
                Instruction::LoadString(v) => self.push_value(Value::Str(v.clone())),
                Instruction::LoadLambda { signature, .. } => {
                    let defaults = self.pop()?.resolve()?;
                    self.push_value(Value::Lambda(Lambda {
                        signature: signature.clone(),
                        defaults,
                        receiver: None,
                        module: Rc::clone(&module),
                    }));
                }

                Instruction::BuildTuple(n) => self.op_build_tuple(*n as usize)?,
                Instruction::BuildKeyVal => {
                    let value = self.pop()?.resolve()?;
                    let key = self.pop()?.resolve()?;
                    self.push_value(Value::KeyValue { key, value });
                }
                Instruction::BuildNamed => {
                    let value = self.pop()?.resolve()?;
                    let key = self.pop()?.resolve()?;
                    self.push_value(Value::Named { key, value });
                }
                Instruction::BuildWrap => {
                    let value = self.pop()?.value()?;
                    self.push_value(Value::Wrap(cell(value)));
                }

                Instruction::BinaryOp(op) => {
                    let rhs = self.pop()?.value()?;
                    let lhs = self.pop()?.value()?;
                    self.push_value(ops::binary(op, &lhs, &rhs)?);
                }
                Instruction::UnaryOp(op) => {
                    let operand = self.pop()?.value()?;
                    self.push_value(ops::unary(op, &operand)?);
                }

                Instruction::LetVal(name) => {
                    let value = self
                        .stack
                        .last()
                        .ok_or_else(|| QuillError::internal("operand stack underflow"))?
                        .value()?;
                    self.context.declare(name.clone(), cell(value));
                }
                Instruction::GetVal(name) => {
                    let found = self
                        .context
                        .lookup(name)
                        .ok_or_else(|| QuillError::name(name))?;
                    self.stack.push(Slot::Value(found));
                }
                Instruction::SetVal => {
                    let value = self.pop()?.value()?;
                    let target = self.pop()?;
                    target.assign(value.clone())?;
                    self.push_value(value);
                }
                Instruction::GetAttr => {
                    let key = self.pop()?.value()?.as_key()?;
                    let target = self.pop()?.resolve()?;
                    self.stack.push(Slot::Attr { target, key });
                }
                Instruction::IndexOf => {
                    let index = self.pop()?.value()?.as_index()?;
                    let target = self.pop()?.resolve()?;
                    self.stack.push(Slot::Index { target, index });
                }

                Instruction::KeyOf => {
                    let operand = self.pop()?.resolve()?;
                    let projected = match &*operand.borrow() {
                        Value::KeyValue { key, .. } | Value::Named { key, .. } => key.clone(),
                        // Introspection: a lambda's key is its template.
                        Value::Lambda(lambda) => lambda.defaults.clone(),
                        other => {
                            return Err(QuillError::type_error(format!(
                                "keyof {}",
                                other.type_name()
                            )))
                        }
                    };
                    self.stack.push(Slot::Value(projected));
                }
                Instruction::ValueOf => {
                    let operand = self.pop()?.resolve()?;
                    let projected = match &*operand.borrow() {
                        Value::KeyValue { value, .. } | Value::Named { value, .. } => value.clone(),
                        other => {
                            return Err(QuillError::type_error(format!(
                                "valueof {}",
                                other.type_name()
                            )))
                        }
                    };
                    self.stack.push(Slot::Value(projected));
                }
                Instruction::SelfOf => {
                    let operand = self.pop()?.resolve()?;
                    let receiver = match &*operand.borrow() {
                        Value::Lambda(lambda) => lambda.receiver.clone(),
                        other => {
                            return Err(QuillError::type_error(format!(
                                "selfof {}",
                                other.type_name()
                            )))
                        }
                    };
                    match receiver {
                        Some(r) => self.stack.push(Slot::Value(r)),
                        None => self.push_value(Value::None),
                    }
                }

                Instruction::Call => {
                    if self.op_call()? {
                        continue;
                    }
                }
                Instruction::Return => {
                    if let Some(value) = self.op_return(true)? {
                        return Ok(value);
                    }
                    continue;
                }
                Instruction::ReturnNone => {
                    if let Some(value) = self.op_return(false)? {
                        return Ok(value);
                    }
                    continue;
                }

                Instruction::NewFrame => {
                    self.context.push_frame(false, None, self.stack.len());
                }
                Instruction::PopFrame => {
                    let frame = self
                        .context
                        .pop_frame()
                        .ok_or_else(|| QuillError::internal("POP_FRAME on empty context"))?;
                    if frame.is_call {
                        return Err(QuillError::internal(
                            "POP_FRAME crossed a call boundary",
                        ));
                    }
                    // The block's value survives the truncation.
                    if self.stack.len() > frame.stack_depth {
                        let top = self.pop()?;
                        self.stack.truncate(frame.stack_depth);
                        self.stack.push(top);
                    }
                }
                Instruction::ResetStack => {
                    self.stack.truncate(self.context.reset_depth());
                }

                Instruction::JumpOffset(offset) => {
                    self.ip = self.jump_target(*offset)?;
                    continue;
                }
                Instruction::JumpIfFalse(offset) => {
                    let cond = self.pop()?.value()?.as_bool()?;
                    if !cond {
                        self.ip = self.jump_target(*offset)?;
                        continue;
                    }
                }

                Instruction::CopyVal => {
                    let value = self.pop()?.value()?;
                    self.push_value(value.deep_copy());
                }
                Instruction::RefVal => {
                    let location = self.pop()?.resolve()?;
                    self.push_value(Value::Ref(location));
                }
                Instruction::DerefVal => {
                    let operand = self.pop()?.resolve()?;
                    let inner = match &*operand.borrow() {
                        Value::Ref(inner) => inner.clone(),
                        other => {
                            return Err(QuillError::type_error(format!(
                                "deref of {}",
                                other.type_name()
                            )))
                        }
                    };
                    self.stack.push(Slot::Value(inner));
                }
                Instruction::Assert => {
                    let holds = self.pop()?.value()?.as_bool()?;
                    if !holds {
                        return Err(QuillError::runtime(
                            RuntimeErrorKind::AssertionError,
                            "assertion failed",
                        ));
                    }
                    self.push_value(Value::None);
                }
                Instruction::DebugInfo(offset) => self.last_debug = *offset,
                Instruction::Import => {
                    let path = self.pop()?.value()?.as_key()?;
                    self.op_import(&path)?;
                }
            }
            self.ip += 1;
        }
    }

    #[inline]
    fn push_value(&mut self, value: Value) {
        self.stack.push(Slot::from_value(value));
    }

    fn pop(&mut self) -> Result<Slot, QuillError> {
        self.stack
            .pop()
            .ok_or_else(|| QuillError::internal("operand stack underflow"))
    }

    fn jump_target(&self, offset: i32) -> Result<usize, QuillError> {
        let target = self.ip as i64 + 1 + i64::from(offset);
        usize::try_from(target)
            .map_err(|_| QuillError::internal(format!("jump to negative offset {target}")))
    }

    fn final_value(&mut self) -> Value {
        while let Some(slot) = self.stack.pop() {
            if let Ok(value) = slot.value() {
                return value;
            }
        }
        Value::None
    }

    fn op_build_tuple(&mut self, len: usize) -> Result<(), QuillError> {
        let mut members: Vec<ValueRef> = Vec::with_capacity(len);
        for _ in 0..len {
            members.push(self.pop()?.resolve()?);
        }
        members.reverse();
        let tuple = cell(Value::Tuple(members.clone()));
        // Method binding happens at construction: a Lambda stored as a
        // Named member gets this tuple as its receiver, exactly once.
        for member in &members {
            let value_cell = match &*member.borrow() {
                Value::Named { value, .. } => value.clone(),
                _ => continue,
            };
            let mut value = value_cell.borrow_mut();
            if let Value::Lambda(lambda) = &mut *value {
                if lambda.receiver.is_none() {
                    lambda.receiver = Some(tuple.clone());
                }
            }
        }
        self.stack.push(Slot::Value(tuple));
        Ok(())
    }

    /// Returns `true` when the pointer was redirected into a lambda body.
    fn op_call(&mut self) -> Result<bool, QuillError> {
        let args_cell = self.pop()?.resolve()?;
        let callee = self.pop()?.resolve()?;
        let args: Vec<ValueRef> = match &*args_cell.borrow() {
            Value::Tuple(members) => members.clone(),
            _ => vec![args_cell.clone()],
        };
        let callee_value = callee.borrow().clone();
        match callee_value {
            Value::Builtin(builtin) => {
                tracing::trace!(name = builtin.name, argc = args.len(), "builtin call");
                let derefed: Vec<ValueRef> = args.iter().map(deref_cell).collect();
                let result = (builtin.func)(&derefed)?;
                self.push_value(result);
                Ok(false)
            }
            Value::Lambda(lambda) => {
                tracing::trace!(signature = %lambda.signature, argc = args.len(), "call");
                let active = self
                    .modules
                    .last()
                    .ok_or_else(|| QuillError::internal("no active module"))?;
                let cross_module = !Rc::ptr_eq(&lambda.module, active);
                let entry = lambda.module.entry(&lambda.signature)?;
                self.stack.push(Slot::Return {
                    ip: self.ip + 1,
                    cross_module,
                });
                self.context
                    .push_frame(true, Some(self.last_debug), self.stack.len());
                self.bind_parameters(&lambda, &args)?;
                if let Some(receiver) = &lambda.receiver {
                    self.context.declare("self", receiver.clone());
                }
                if cross_module {
                    self.modules.push(Rc::clone(&lambda.module));
                }
                self.ip = entry;
                self.call_depth += 1;
                Ok(true)
            }
            other => Err(QuillError::type_error(format!(
                "{} is not callable",
                other.type_name()
            ))),
        }
    }

    /// Merge the incoming arguments into a per-call snapshot of the
    /// callee's default template, then declare every named slot.
    ///
    /// Snapshot cells hold shallow clones, so a structural default
    /// (tuple, wrap) still shares its inner cells with the template and
    /// mutations persist across calls, while scalar rebinding stays
    /// call-local. Positional arguments that no slot can absorb are a
    /// value error.
    fn bind_parameters(&mut self, lambda: &Lambda, args: &[ValueRef]) -> Result<(), QuillError> {
        struct BindSlot {
            name: Option<String>,
            cell: ValueRef,
            written: bool,
        }

        let template: Vec<ValueRef> = match &*lambda.defaults.borrow() {
            Value::Tuple(members) => members.clone(),
            _ => vec![lambda.defaults.clone()],
        };
        let mut slots: SmallVec<[BindSlot; 8]> = SmallVec::new();
        for member in &template {
            let slot = match &*member.borrow() {
                Value::Named { key, value } => BindSlot {
                    name: Some(key.borrow().as_key()?),
                    cell: cell(value.borrow().clone()),
                    written: false,
                },
                other => BindSlot {
                    name: None,
                    cell: cell(other.clone()),
                    written: false,
                },
            };
            slots.push(slot);
        }

        let mut positional: SmallVec<[ValueRef; 8]> = SmallVec::new();
        for arg in args {
            let named = match &*arg.borrow() {
                Value::Named { key, value } => Some((key.borrow().as_key()?, value.clone())),
                _ => None,
            };
            match named {
                Some((key, value)) => {
                    if let Some(slot) = slots.iter_mut().find(|s| s.name.as_deref() == Some(&key))
                    {
                        *slot.cell.borrow_mut() = value.borrow().clone();
                        slot.written = true;
                    } else {
                        // Unknown names become fresh slots.
                        slots.push(BindSlot {
                            name: Some(key),
                            cell: cell(value.borrow().clone()),
                            written: true,
                        });
                    }
                }
                None => positional.push(arg.clone()),
            }
        }

        let mut remaining = positional.into_iter();
        for slot in slots.iter_mut() {
            if slot.written {
                continue;
            }
            let Some(arg) = remaining.next() else {
                break;
            };
            *slot.cell.borrow_mut() = arg.borrow().clone();
            slot.written = true;
        }
        let surplus = remaining.count();
        if surplus > 0 {
            return Err(QuillError::runtime(
                RuntimeErrorKind::ValueError,
                format!(
                    "{surplus} surplus positional argument(s) for {}",
                    lambda.signature
                ),
            ));
        }

        for slot in slots {
            if let Some(name) = slot.name {
                self.context.declare(name, slot.cell);
            }
        }
        Ok(())
    }

    /// `Some(value)` means a top-level return: halt with that value.
    fn op_return(&mut self, with_value: bool) -> Result<Option<Value>, QuillError> {
        let value = if with_value {
            self.pop()?.value()?
        } else {
            Value::None
        };
        if self.call_depth == 0 {
            return Ok(Some(value));
        }
        let boundary = self
            .context
            .unwind_to_call()
            .ok_or_else(|| QuillError::internal("RETURN without a call frame"))?;
        self.stack.truncate(boundary.stack_depth);
        let Some(Slot::Return { ip, cross_module }) = self.stack.pop() else {
            return Err(QuillError::internal("missing return descriptor"));
        };
        if cross_module {
            self.modules.pop();
        }
        self.ip = ip;
        self.call_depth -= 1;
        self.push_value(value);
        Ok(None)
    }

    /// Load, link and run another module in a nested executor sharing the
    /// host hooks; push its export. Errors propagate unchanged.
    fn op_import(&mut self, path: &str) -> Result<(), QuillError> {
        tracing::debug!(path, "import");
        let json = std::fs::read_to_string(path).map_err(|e| {
            QuillError::runtime(
                RuntimeErrorKind::ImportError,
                format!("cannot read module '{path}': {e}"),
            )
        })?;
        let table = quill_compiler::FunctionTable::import_json(&json)?;
        let code = Rc::new(table.link());
        let mut nested = Executor::new(self.hooks.clone());
        let outcome = nested.execute(code, Vec::new())?;
        self.push_value(outcome.export);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_compiler::FunctionTable;

    fn run_block(instructions: Vec<Instruction>) -> Result<Value, QuillError> {
        let mut table = FunctionTable::new();
        table.insert("__main__".to_string(), instructions).unwrap();
        let outcome =
            Executor::new(HostHooks::default()).execute(Rc::new(table.link()), Vec::new())?;
        Ok(outcome.value)
    }

    #[test]
    fn test_hand_assembled_arithmetic() {
        let value = run_block(vec![
            Instruction::LoadInt(2),
            Instruction::LoadInt(3),
            Instruction::BinaryOp("*".to_string()),
            Instruction::Return,
        ])
        .unwrap();
        assert_eq!(value, Value::Int(6));
    }

    #[test]
    fn test_backward_jump_counts_down() {
        // i := 3; while (i > 0) { i = i - 1 }; i
        let value = run_block(vec![
            Instruction::LoadInt(3),
            Instruction::LetVal("i".to_string()),
            Instruction::ResetStack,
            Instruction::GetVal("i".to_string()),
            Instruction::LoadInt(0),
            Instruction::BinaryOp(">".to_string()),
            Instruction::JumpIfFalse(6),
            Instruction::GetVal("i".to_string()),
            Instruction::GetVal("i".to_string()),
            Instruction::LoadInt(1),
            Instruction::BinaryOp("-".to_string()),
            Instruction::SetVal,
            Instruction::JumpOffset(-11),
            Instruction::GetVal("i".to_string()),
            Instruction::Return,
        ])
        .unwrap();
        assert_eq!(value, Value::Int(0));
    }

    #[test]
    fn test_running_off_the_end_halts() {
        let value = run_block(vec![Instruction::LoadInt(9)]).unwrap();
        assert_eq!(value, Value::Int(9));
    }

    #[test]
    fn test_unbound_name() {
        let err = run_block(vec![
            Instruction::GetVal("ghost".to_string()),
            Instruction::Return,
        ])
        .unwrap_err();
        assert!(err.to_string().starts_with("NameError"));
    }

    #[test]
    fn test_missing_entry_block() {
        let mut table = FunctionTable::new();
        table
            .insert("__other__".to_string(), vec![Instruction::ReturnNone])
            .unwrap();
        let result =
            Executor::new(HostHooks::default()).execute(Rc::new(table.link()), Vec::new());
        assert!(result.is_err());
    }
}
