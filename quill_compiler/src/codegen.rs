//! Tree-to-bytecode lowering.
//!
//! Pass 1 walks the AST and emits a symbolic stream: real instructions
//! plus `Label`/`Jump(label)` pseudo-entries. Pass 2 strips the labels,
//! recording their instruction indices, and rewrites every symbolic jump
//! into a relative offset (`target - jump_index - 1`). Nested function
//! definitions are lowered into their own blocks under hierarchical
//! signatures (`parent::__function_N__`).
//!
//! A per-block scope stack records, in emission order, every open plain
//! frame and every open loop; `break`/`continue` scan it top-down to know
//! how many frames to pop before jumping.

use crate::instruction::Instruction;
use crate::table::FunctionTable;
use quill_core::QuillError;
use quill_parser::{AstNode, Modifier, NodeKind};
use rustc_hash::FxHashMap;

/// Symbolic emission entry, resolved to [`Instruction`]s in pass 2.
#[derive(Debug, Clone)]
enum Emit {
    Op(Instruction),
    Label(String),
    Jump(String),
    JumpIfFalse(String),
}

/// One open scope during emission.
#[derive(Debug, Clone)]
enum Scope {
    /// Plain block frame; `break`/`continue` must pop it on the way out.
    Frame,
    /// Loop with its jump targets: `continue` goes to `head`, `break` to
    /// `end`.
    Loop { head: String, end: String },
}

struct BlockBuilder {
    name: String,
    emits: Vec<Emit>,
    scopes: Vec<Scope>,
}

impl BlockBuilder {
    fn new(name: String) -> Self {
        Self {
            name,
            emits: Vec::new(),
            scopes: Vec::new(),
        }
    }

    #[inline]
    fn op(&mut self, instruction: Instruction) {
        self.emits.push(Emit::Op(instruction));
    }

    #[inline]
    fn label(&mut self, label: String) {
        self.emits.push(Emit::Label(label));
    }

    /// Record a source offset. Consecutive records collapse to the most
    /// recent so nested nodes do not bloat the stream.
    fn debug(&mut self, offset: u32) {
        if let Some(Emit::Op(Instruction::DebugInfo(last))) = self.emits.last_mut() {
            *last = offset;
        } else {
            self.op(Instruction::DebugInfo(offset));
        }
    }
}

/// The bytecode generator for one module.
pub struct CodeGen {
    namespace: String,
    table: FunctionTable,
    function_counter: usize,
    label_counter: usize,
}

impl CodeGen {
    /// A generator whose entry block carries `namespace` as its signature.
    #[must_use]
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            table: FunctionTable::new(),
            function_counter: 0,
            label_counter: 0,
        }
    }

    /// Lower `ast` into a function table. Nested blocks land first, the
    /// entry block last.
    pub fn generate(mut self, ast: &AstNode) -> Result<FunctionTable, QuillError> {
        let entry = self.namespace.clone();
        self.compile_block(entry, ast)?;
        Ok(self.table)
    }

    fn fresh_label(&mut self) -> String {
        let n = self.label_counter;
        self.label_counter += 1;
        format!("__label_{n}__")
    }

    fn fresh_function(&mut self, parent: &str) -> String {
        let n = self.function_counter;
        self.function_counter += 1;
        format!("{parent}::__function_{n}__")
    }

    fn compile_block(&mut self, name: String, node: &AstNode) -> Result<(), QuillError> {
        let mut builder = BlockBuilder::new(name.clone());
        self.emit_node(&mut builder, node)?;
        builder.op(Instruction::Return);
        let instructions = resolve_labels(builder.emits)?;
        tracing::debug!(block = %name, len = instructions.len(), "compiled block");
        self.table.insert(name, instructions)
    }

    fn emit_node(&mut self, b: &mut BlockBuilder, node: &AstNode) -> Result<(), QuillError> {
        b.debug(node.span.start);
        match &node.kind {
            NodeKind::Null => b.op(Instruction::LoadNone),
            NodeKind::Int(v) => b.op(Instruction::LoadInt(*v)),
            NodeKind::Float(v) => b.op(Instruction::LoadFloat(*v)),
            NodeKind::Bool(v) => b.op(Instruction::LoadBool(*v)),
            NodeKind::Str(v) => b.op(Instruction::LoadString(v.clone())),
            NodeKind::Variable(name) => b.op(Instruction::GetVal(name.clone())),

            NodeKind::Tuple(items) => {
                for item in items {
                    self.emit_node(b, item)?;
                }
                b.op(Instruction::BuildTuple(items.len() as u32));
            }
            NodeKind::KeyValue { key, value } => {
                self.emit_node(b, key)?;
                self.emit_node(b, value)?;
                b.op(Instruction::BuildKeyVal);
            }
            NodeKind::Named { key, value } => {
                self.emit_node(b, key)?;
                self.emit_node(b, value)?;
                b.op(Instruction::BuildNamed);
            }

            NodeKind::FunctionDef { params, body } => {
                let signature = self.fresh_function(&b.name);
                self.emit_node(b, params)?;
                b.op(Instruction::LoadLambda {
                    signature: signature.clone(),
                    offset: node.span.start,
                });
                self.compile_block(signature, body)?;
            }
            NodeKind::Call { callee, args } => {
                self.emit_node(b, callee)?;
                self.emit_node(b, args)?;
                b.op(Instruction::Call);
            }
            NodeKind::GetAttr { target, attr } => {
                self.emit_node(b, target)?;
                self.emit_node(b, attr)?;
                b.op(Instruction::GetAttr);
            }
            NodeKind::IndexOf { target, index } => {
                self.emit_node(b, target)?;
                self.emit_node(b, index)?;
                b.op(Instruction::IndexOf);
            }

            NodeKind::Binary { op, lhs, rhs } => {
                self.emit_node(b, lhs)?;
                self.emit_node(b, rhs)?;
                b.op(Instruction::BinaryOp(op.as_str().to_string()));
            }
            NodeKind::Unary { op, operand } => {
                self.emit_node(b, operand)?;
                b.op(Instruction::UnaryOp(op.as_str().to_string()));
            }

            NodeKind::Let { target, value } => {
                let name = match &target.kind {
                    NodeKind::Variable(name) | NodeKind::Str(name) => name.clone(),
                    _ => {
                        return Err(QuillError::compile(
                            "declaration target must be a name or a string key",
                            Some(target.span),
                        ))
                    }
                };
                self.emit_node(b, value)?;
                b.op(Instruction::LetVal(name));
            }
            NodeKind::Assign { target, value } => {
                validate_assign_target(target)?;
                self.emit_node(b, target)?;
                self.emit_node(b, value)?;
                b.op(Instruction::SetVal);
            }

            NodeKind::Sequence(statements) => {
                if statements.is_empty() {
                    b.op(Instruction::LoadNone);
                }
                for (i, statement) in statements.iter().enumerate() {
                    if i > 0 {
                        b.op(Instruction::ResetStack);
                    }
                    self.emit_node(b, statement)?;
                }
            }
            NodeKind::Body(inner) => {
                b.op(Instruction::NewFrame);
                b.scopes.push(Scope::Frame);
                self.emit_node(b, inner)?;
                b.scopes.pop();
                b.op(Instruction::PopFrame);
            }

            NodeKind::If {
                cond,
                then,
                otherwise,
            } => {
                let else_label = self.fresh_label();
                let end_label = self.fresh_label();
                self.emit_node(b, cond)?;
                b.emits.push(Emit::JumpIfFalse(else_label.clone()));
                self.emit_node(b, then)?;
                b.emits.push(Emit::Jump(end_label.clone()));
                b.label(else_label);
                match otherwise {
                    Some(other) => self.emit_node(b, other)?,
                    // The construct is always expression-valued.
                    None => b.op(Instruction::LoadNone),
                }
                b.label(end_label);
            }
            NodeKind::While { cond, body } => {
                let head = self.fresh_label();
                let tail = self.fresh_label();
                let end = self.fresh_label();
                // The loop gets its own frame so the per-iteration stack
                // reset cannot touch values the caller already pushed.
                b.op(Instruction::NewFrame);
                b.scopes.push(Scope::Frame);
                b.label(head.clone());
                b.op(Instruction::ResetStack);
                self.emit_node(b, cond)?;
                b.emits.push(Emit::JumpIfFalse(tail.clone()));
                b.scopes.push(Scope::Loop {
                    head: head.clone(),
                    end: end.clone(),
                });
                self.emit_node(b, body)?;
                b.scopes.pop();
                b.emits.push(Emit::Jump(head));
                b.label(tail);
                // An exhausted loop is worth `none`.
                b.op(Instruction::LoadNone);
                b.label(end);
                b.scopes.pop();
                b.op(Instruction::PopFrame);
            }
            NodeKind::Break(value) => {
                self.emit_loop_exit(b, value.as_deref(), node, false)?;
            }
            NodeKind::Continue(value) => {
                self.emit_loop_exit(b, value.as_deref(), node, true)?;
            }
            NodeKind::Return(value) => match value {
                Some(value) => {
                    self.emit_node(b, value)?;
                    b.op(Instruction::Return);
                }
                None => b.op(Instruction::ReturnNone),
            },

            NodeKind::Modifier { modifier, operand } => {
                self.emit_node(b, operand)?;
                b.op(match modifier {
                    Modifier::Copy => Instruction::CopyVal,
                    Modifier::Ref => Instruction::RefVal,
                    Modifier::Deref => Instruction::DerefVal,
                    Modifier::KeyOf => Instruction::KeyOf,
                    Modifier::ValueOf => Instruction::ValueOf,
                    Modifier::SelfOf => Instruction::SelfOf,
                    Modifier::Assert => Instruction::Assert,
                    Modifier::Import => Instruction::Import,
                    Modifier::Wrap => Instruction::BuildWrap,
                });
            }
        }
        Ok(())
    }

    /// `break` / `continue`: pop every plain frame up to the nearest
    /// enclosing loop, then jump to its end or head label.
    fn emit_loop_exit(
        &mut self,
        b: &mut BlockBuilder,
        value: Option<&AstNode>,
        node: &AstNode,
        is_continue: bool,
    ) -> Result<(), QuillError> {
        match value {
            Some(value) => self.emit_node(b, value)?,
            None => b.op(Instruction::LoadNone),
        }
        let mut pops = 0;
        let mut target = None;
        for scope in b.scopes.iter().rev() {
            match scope {
                Scope::Frame => pops += 1,
                Scope::Loop { head, end } => {
                    target = Some(if is_continue { head.clone() } else { end.clone() });
                    break;
                }
            }
        }
        let Some(label) = target else {
            let keyword = if is_continue { "continue" } else { "break" };
            return Err(QuillError::compile(
                format!("'{keyword}' outside of a loop"),
                Some(node.span),
            ));
        };
        for _ in 0..pops {
            b.op(Instruction::PopFrame);
        }
        b.emits.push(Emit::Jump(label));
        Ok(())
    }
}

fn validate_assign_target(target: &AstNode) -> Result<(), QuillError> {
    match &target.kind {
        NodeKind::Variable(_) | NodeKind::GetAttr { .. } | NodeKind::IndexOf { .. } => Ok(()),
        NodeKind::Modifier {
            modifier: Modifier::Deref,
            ..
        } => Ok(()),
        _ => Err(QuillError::compile(
            "assignment target must be a variable, attribute, index or deref",
            Some(target.span),
        )),
    }
}

/// Pass 2: strip labels and rewrite symbolic jumps to relative offsets.
fn resolve_labels(emits: Vec<Emit>) -> Result<Vec<Instruction>, QuillError> {
    let mut targets: FxHashMap<String, usize> = FxHashMap::default();
    let mut index = 0;
    for emit in &emits {
        match emit {
            Emit::Label(label) => {
                targets.insert(label.clone(), index);
            }
            _ => index += 1,
        }
    }
    let mut out = Vec::with_capacity(index);
    for emit in emits {
        match emit {
            Emit::Label(_) => {}
            Emit::Op(instruction) => out.push(instruction),
            Emit::Jump(label) => {
                let offset = jump_offset(&targets, &label, out.len())?;
                out.push(Instruction::JumpOffset(offset));
            }
            Emit::JumpIfFalse(label) => {
                let offset = jump_offset(&targets, &label, out.len())?;
                out.push(Instruction::JumpIfFalse(offset));
            }
        }
    }
    Ok(out)
}

fn jump_offset(
    targets: &FxHashMap<String, usize>,
    label: &str,
    jump_index: usize,
) -> Result<i32, QuillError> {
    let target = *targets
        .get(label)
        .ok_or_else(|| QuillError::internal(format!("unresolved label '{label}'")))?;
    Ok(target as i32 - jump_index as i32 - 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile;

    fn main_block(source: &str) -> Vec<Instruction> {
        compile(source).unwrap().get("__main__").unwrap().to_vec()
    }

    /// Strip debug records to make shape assertions readable.
    fn ops(source: &str) -> Vec<Instruction> {
        main_block(source)
            .into_iter()
            .filter(|i| !matches!(i, Instruction::DebugInfo(_)))
            .collect()
    }

    #[test]
    fn test_literal_block() {
        assert_eq!(
            ops("42"),
            vec![Instruction::LoadInt(42), Instruction::Return]
        );
    }

    #[test]
    fn test_let_and_get() {
        assert_eq!(
            ops("x := 1; x"),
            vec![
                Instruction::LoadInt(1),
                Instruction::LetVal("x".into()),
                Instruction::ResetStack,
                Instruction::GetVal("x".into()),
                Instruction::Return,
            ]
        );
    }

    #[test]
    fn test_assign_emits_target_then_value() {
        assert_eq!(
            ops("x = 2"),
            vec![
                Instruction::GetVal("x".into()),
                Instruction::LoadInt(2),
                Instruction::SetVal,
                Instruction::Return,
            ]
        );
    }

    #[test]
    fn test_if_without_else_synthesizes_none() {
        let code = ops("if (true) {1}");
        assert!(code.contains(&Instruction::LoadNone));
        assert!(code
            .iter()
            .any(|i| matches!(i, Instruction::JumpIfFalse(_))));
    }

    #[test]
    fn test_if_jumps_resolve_forward() {
        // LOAD_BOOL, JUMP_IF_FALSE, then-branch..., JUMP, LOAD_NONE.
        let code = ops("if (true) {1} else {2}");
        let Some(Instruction::JumpIfFalse(off)) = code
            .iter()
            .find(|i| matches!(i, Instruction::JumpIfFalse(_)))
        else {
            panic!("missing conditional jump");
        };
        assert!(*off > 0, "else target must be ahead, got {off}");
    }

    #[test]
    fn test_while_jumps_back() {
        let code = ops("while (false) {1}");
        assert!(
            code.iter()
                .any(|i| matches!(i, Instruction::JumpOffset(off) if *off < 0)),
            "loop must contain a backward jump: {code:?}"
        );
        // Loop body runs inside its own frame.
        assert_eq!(code[0], Instruction::NewFrame);
        assert_eq!(code[code.len() - 2], Instruction::PopFrame);
    }

    #[test]
    fn test_break_outside_loop_is_fatal() {
        let err = compile("break").unwrap_err();
        assert!(err.to_string().contains("'break' outside of a loop"));
        let err = compile("(x) -> { while (true) { (y) -> { break } } }").unwrap_err();
        assert!(err.to_string().contains("outside of a loop"));
    }

    #[test]
    fn test_break_pops_skipped_frames() {
        // break sits under one plain block frame inside the loop body.
        let table = compile("while (true) { { break } }").unwrap();
        let code: Vec<_> = table
            .get("__main__")
            .unwrap()
            .iter()
            .filter(|i| !matches!(i, Instruction::DebugInfo(_)))
            .cloned()
            .collect();
        // LoadNone (break value), then exactly two PopFrame before the
        // break jump: the body frame and the nested block frame.
        let jump_at = code
            .iter()
            .position(|i| matches!(i, Instruction::JumpOffset(off) if *off > 0))
            .expect("break jump");
        assert_eq!(code[jump_at - 1], Instruction::PopFrame);
        assert_eq!(code[jump_at - 2], Instruction::PopFrame);
        assert_ne!(code[jump_at - 3], Instruction::PopFrame);
    }

    #[test]
    fn test_nested_function_signatures() {
        let table = compile("f := (x => 0) -> { (y => 0) -> { x + y } }").unwrap();
        assert!(table.contains("__main__"));
        assert!(table.contains("__main__::__function_0__"));
        assert!(table.contains("__main__::__function_0__::__function_1__"));
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn test_lambda_load_references_block() {
        let table = compile("(a => 1) -> a").unwrap();
        let main = table.get("__main__").unwrap();
        let Some(Instruction::LoadLambda { signature, .. }) = main
            .iter()
            .find(|i| matches!(i, Instruction::LoadLambda { .. }))
        else {
            panic!("missing lambda load");
        };
        assert!(table.contains(signature));
    }

    #[test]
    fn test_debug_info_collapses() {
        let code = main_block("1 + 2 * 3");
        for pair in code.windows(2) {
            assert!(
                !matches!(
                    pair,
                    [Instruction::DebugInfo(_), Instruction::DebugInfo(_)]
                ),
                "consecutive debug records must collapse: {code:?}"
            );
        }
    }

    #[test]
    fn test_invalid_assign_target() {
        let err = compile("1 + 2 = 3").unwrap_err();
        assert!(err.to_string().contains("assignment target"));
    }

    #[test]
    fn test_entry_block_is_last() {
        let table = compile("f := () -> 1; f()").unwrap();
        let last = table.iter().last().unwrap().0.to_string();
        assert_eq!(last, "__main__");
    }
}
