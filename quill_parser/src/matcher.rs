//! The grammar matcher registry.
//!
//! Parsing is not a fixed grammar: each construct is a [`NodeMatcher`]
//! registered with an integer priority. A window of token units is handed
//! to every matcher from loosest (highest priority) to tightest; the first
//! matcher that consumes the *entire* window wins. A matcher that
//! recognizes only a prefix is skipped, which lets a tighter matcher split
//! the window and re-match the prefix recursively. Operator precedence and
//! construct precedence fall out of the same ordering.
//!
//! Binary matchers scan right-to-left for the last top-level occurrence of
//! their operator tier, so `a - b - c` decomposes into `(a - b) - c` by
//! recursion on the left side.

use crate::ast::{AstNode, BinaryOp, Modifier, NodeKind, UnaryOp};
use crate::group::{self, group_span, window_span, TokenGroup};
use crate::token::TokenKind;
use quill_core::QuillError;
use std::sync::OnceLock;

// ===== Priorities (loosest first) =====

const PRIORITY_SEPARATOR: u32 = 100;
const PRIORITY_RETURN: u32 = 90;
const PRIORITY_TUPLE: u32 = 80;
const PRIORITY_LET: u32 = 70;
const PRIORITY_ASSIGN: u32 = 65;
const PRIORITY_NAMED: u32 = 60;
const PRIORITY_KEY_VAL: u32 = 55;
const PRIORITY_WHILE: u32 = 50;
const PRIORITY_IF: u32 = 48;
const PRIORITY_BREAK: u32 = 46;
const PRIORITY_MODIFIER: u32 = 45;
const PRIORITY_BOOL_OP: u32 = 40;
const PRIORITY_COMPARE: u32 = 35;
const PRIORITY_ADD_SUB: u32 = 30;
const PRIORITY_MUL_DIV: u32 = 25;
const PRIORITY_UNARY: u32 = 20;
const PRIORITY_FUNCTION_DEF: u32 = 15;
const PRIORITY_MEMBER_ACCESS: u32 = 10;
const PRIORITY_ATOM: u32 = 1;

/// A successful match: the node plus how many units it consumed.
#[derive(Debug)]
pub struct Match {
    pub node: AstNode,
    pub consumed: usize,
}

impl Match {
    #[inline]
    fn full(node: AstNode, groups: &[TokenGroup]) -> Option<Self> {
        Some(Self {
            node,
            consumed: groups.len(),
        })
    }
}

/// One registered grammar construct.
pub trait NodeMatcher: Send + Sync {
    /// Name used in trace output.
    fn name(&self) -> &'static str;

    /// Higher priority is tried first.
    fn priority(&self) -> u32;

    /// Try to recognize this construct at the start of `groups`.
    ///
    /// `Ok(None)` means "not mine, try the next matcher"; `Err` is a fatal
    /// structural error that aborts the whole parse.
    fn try_match(&self, groups: &[TokenGroup]) -> Result<Option<Match>, QuillError>;
}

/// Parse a window of units into exactly one node.
pub fn parse_window(groups: &[TokenGroup]) -> Result<AstNode, QuillError> {
    if groups.is_empty() {
        return Err(QuillError::syntax(
            "expected an expression",
            quill_core::Span::at(0),
        ));
    }
    for matcher in registry() {
        if let Some(m) = matcher.try_match(groups)? {
            if m.consumed == groups.len() {
                tracing::trace!(matcher = matcher.name(), units = groups.len(), "matched");
                return Ok(m.node);
            }
        }
    }
    Err(QuillError::syntax(
        format!("cannot parse '{}'", render_window(groups)),
        window_span(groups),
    ))
}

fn render_window(groups: &[TokenGroup]) -> String {
    let mut out = String::new();
    for (i, g) in groups.iter().enumerate().take(8) {
        if i > 0 {
            out.push(' ');
        }
        for t in g {
            out.push_str(&t.to_string());
        }
    }
    if groups.len() > 8 {
        out.push_str(" ...");
    }
    out
}

// ===== Unit helpers =====

/// The symbol text of a single-token operator unit.
#[inline]
fn unit_symbol(group: &TokenGroup) -> Option<&str> {
    match group.as_slice() {
        [tok] if tok.kind == TokenKind::Symbol && !tok.is_open_bracket() => Some(&tok.text),
        _ => None,
    }
}

/// The text of a single-token identifier unit.
#[inline]
fn unit_identifier(group: &TokenGroup) -> Option<&str> {
    match group.as_slice() {
        [tok] if tok.kind == TokenKind::Identifier => Some(&tok.text),
        _ => None,
    }
}

/// Whether a unit is a bracketed run opened by `bracket`.
#[inline]
fn is_bracket_group(group: &TokenGroup, bracket: &str) -> bool {
    group.len() >= 2 && group[0].is_symbol(bracket)
}

/// Whether a unit is a bare operator, marking the following position as
/// unary rather than binary.
#[inline]
fn is_operator_unit(group: &TokenGroup) -> bool {
    unit_symbol(group).is_some()
}

/// Re-gather the interior of a bracketed unit.
fn inner_units(group: &TokenGroup) -> Result<Vec<TokenGroup>, QuillError> {
    group::gather(&group[1..group.len() - 1])
}

/// Index of the first top-level occurrence of `symbol`.
fn find_symbol(groups: &[TokenGroup], symbol: &str) -> Option<usize> {
    groups.iter().position(|g| {
        unit_symbol(g).is_some_and(|s| s == symbol)
    })
}

/// Split a window on every top-level occurrence of `symbol`, dropping
/// empty segments (trailing separators are legal).
fn split_on<'a>(groups: &'a [TokenGroup], symbol: &str) -> Vec<&'a [TokenGroup]> {
    let mut segments = Vec::new();
    let mut seg_start = 0;
    for (i, g) in groups.iter().enumerate() {
        if unit_symbol(g).is_some_and(|s| s == symbol) {
            if i > seg_start {
                segments.push(&groups[seg_start..i]);
            }
            seg_start = i + 1;
        }
    }
    if seg_start < groups.len() {
        segments.push(&groups[seg_start..]);
    }
    segments
}

// ===== Statement-level matchers =====

/// `;`-separated statement sequence.
struct SeparatorMatcher;

impl NodeMatcher for SeparatorMatcher {
    fn name(&self) -> &'static str {
        "separator"
    }

    fn priority(&self) -> u32 {
        PRIORITY_SEPARATOR
    }

    fn try_match(&self, groups: &[TokenGroup]) -> Result<Option<Match>, QuillError> {
        if find_symbol(groups, ";").is_none() {
            return Ok(None);
        }
        let span = window_span(groups);
        let mut statements = Vec::new();
        for segment in split_on(groups, ";") {
            statements.push(parse_window(segment)?);
        }
        Ok(Match::full(
            AstNode::new(NodeKind::Sequence(statements), span),
            groups,
        ))
    }
}

/// `return [expr]`.
struct ReturnMatcher;

impl NodeMatcher for ReturnMatcher {
    fn name(&self) -> &'static str {
        "return"
    }

    fn priority(&self) -> u32 {
        PRIORITY_RETURN
    }

    fn try_match(&self, groups: &[TokenGroup]) -> Result<Option<Match>, QuillError> {
        if unit_identifier(&groups[0]) != Some("return") {
            return Ok(None);
        }
        let span = window_span(groups);
        let value = if groups.len() > 1 {
            Some(Box::new(parse_window(&groups[1..])?))
        } else {
            None
        };
        Ok(Match::full(AstNode::new(NodeKind::Return(value), span), groups))
    }
}

/// `,`-separated tuple literal / argument list.
struct TupleMatcher;

impl NodeMatcher for TupleMatcher {
    fn name(&self) -> &'static str {
        "tuple"
    }

    fn priority(&self) -> u32 {
        PRIORITY_TUPLE
    }

    fn try_match(&self, groups: &[TokenGroup]) -> Result<Option<Match>, QuillError> {
        if find_symbol(groups, ",").is_none() {
            return Ok(None);
        }
        let span = window_span(groups);
        let mut items = Vec::new();
        for segment in split_on(groups, ",") {
            items.push(parse_window(segment)?);
        }
        Ok(Match::full(AstNode::new(NodeKind::Tuple(items), span), groups))
    }
}

/// `name := expr` declaration.
struct LetMatcher;

impl NodeMatcher for LetMatcher {
    fn name(&self) -> &'static str {
        "let"
    }

    fn priority(&self) -> u32 {
        PRIORITY_LET
    }

    fn try_match(&self, groups: &[TokenGroup]) -> Result<Option<Match>, QuillError> {
        let Some(at) = find_symbol(groups, ":=") else {
            return Ok(None);
        };
        let span = window_span(groups);
        if at == 0 || at + 1 >= groups.len() {
            return Err(QuillError::syntax("':=' requires a name and a value", span));
        }
        let target = parse_window(&groups[..at])?;
        if !matches!(target.kind, NodeKind::Variable(_) | NodeKind::Str(_)) {
            return Err(QuillError::syntax(
                "declaration target must be a name or a string key",
                target.span,
            ));
        }
        let value = parse_window(&groups[at + 1..])?;
        Ok(Match::full(
            AstNode::new(
                NodeKind::Let {
                    target: Box::new(target),
                    value: Box::new(value),
                },
                span,
            ),
            groups,
        ))
    }
}

/// `location = expr` mutation. The target's assignability is validated
/// during lowering, where the full shape of the location is known.
struct AssignMatcher;

impl NodeMatcher for AssignMatcher {
    fn name(&self) -> &'static str {
        "assign"
    }

    fn priority(&self) -> u32 {
        PRIORITY_ASSIGN
    }

    fn try_match(&self, groups: &[TokenGroup]) -> Result<Option<Match>, QuillError> {
        let Some(at) = find_symbol(groups, "=") else {
            return Ok(None);
        };
        let span = window_span(groups);
        if at == 0 || at + 1 >= groups.len() {
            return Err(QuillError::syntax("'=' requires a target and a value", span));
        }
        let target = parse_window(&groups[..at])?;
        let value = parse_window(&groups[at + 1..])?;
        Ok(Match::full(
            AstNode::new(
                NodeKind::Assign {
                    target: Box::new(target),
                    value: Box::new(value),
                },
                span,
            ),
            groups,
        ))
    }
}

/// `name => expr` binding-slot pair.
struct NamedMatcher;

impl NodeMatcher for NamedMatcher {
    fn name(&self) -> &'static str {
        "named"
    }

    fn priority(&self) -> u32 {
        PRIORITY_NAMED
    }

    fn try_match(&self, groups: &[TokenGroup]) -> Result<Option<Match>, QuillError> {
        let Some(at) = find_symbol(groups, "=>") else {
            return Ok(None);
        };
        let span = window_span(groups);
        if at == 0 || at + 1 >= groups.len() {
            return Err(QuillError::syntax("'=>' requires a key and a value", span));
        }
        let key = parse_window(&groups[..at])?;
        // Bare names become string keys so binding compares by name.
        let key = match key.kind {
            NodeKind::Variable(name) => AstNode::new(NodeKind::Str(name), key.span),
            NodeKind::Str(_) => key,
            _ => {
                return Err(QuillError::syntax(
                    "named-argument key must be a name or a string",
                    key.span,
                ))
            }
        };
        let value = parse_window(&groups[at + 1..])?;
        Ok(Match::full(
            AstNode::new(
                NodeKind::Named {
                    key: Box::new(key),
                    value: Box::new(value),
                },
                span,
            ),
            groups,
        ))
    }
}

/// `key: value` dictionary-style pair.
struct KeyValMatcher;

impl NodeMatcher for KeyValMatcher {
    fn name(&self) -> &'static str {
        "key_val"
    }

    fn priority(&self) -> u32 {
        PRIORITY_KEY_VAL
    }

    fn try_match(&self, groups: &[TokenGroup]) -> Result<Option<Match>, QuillError> {
        let Some(at) = find_symbol(groups, ":") else {
            return Ok(None);
        };
        let span = window_span(groups);
        if at == 0 || at + 1 >= groups.len() {
            return Err(QuillError::syntax("':' requires a key and a value", span));
        }
        let key = parse_window(&groups[..at])?;
        let value = parse_window(&groups[at + 1..])?;
        Ok(Match::full(
            AstNode::new(
                NodeKind::KeyValue {
                    key: Box::new(key),
                    value: Box::new(value),
                },
                span,
            ),
            groups,
        ))
    }
}

// ===== Control-flow matchers =====

/// `while <cond-unit> <body-unit>`.
struct WhileMatcher;

impl NodeMatcher for WhileMatcher {
    fn name(&self) -> &'static str {
        "while"
    }

    fn priority(&self) -> u32 {
        PRIORITY_WHILE
    }

    fn try_match(&self, groups: &[TokenGroup]) -> Result<Option<Match>, QuillError> {
        if unit_identifier(&groups[0]) != Some("while") {
            return Ok(None);
        }
        let span = window_span(groups);
        if groups.len() < 3 {
            return Err(QuillError::syntax(
                "'while' requires a condition and a body",
                span,
            ));
        }
        let cond = parse_window(&groups[1..2])?;
        let body = parse_window(&groups[2..3])?;
        Ok(Some(Match {
            node: AstNode::new(
                NodeKind::While {
                    cond: Box::new(cond),
                    body: Box::new(body),
                },
                span,
            ),
            consumed: 3,
        }))
    }
}

/// `if <cond-unit> <then-unit> [else <rest>]`. The else branch takes the
/// whole remaining window so `else if` chains nest naturally.
struct IfMatcher;

impl NodeMatcher for IfMatcher {
    fn name(&self) -> &'static str {
        "if"
    }

    fn priority(&self) -> u32 {
        PRIORITY_IF
    }

    fn try_match(&self, groups: &[TokenGroup]) -> Result<Option<Match>, QuillError> {
        if unit_identifier(&groups[0]) != Some("if") {
            return Ok(None);
        }
        let span = window_span(groups);
        if groups.len() < 3 {
            return Err(QuillError::syntax(
                "'if' requires a condition and a branch",
                span,
            ));
        }
        let cond = parse_window(&groups[1..2])?;
        let then = parse_window(&groups[2..3])?;
        let (otherwise, consumed) =
            if groups.len() > 4 && unit_identifier(&groups[3]) == Some("else") {
                (Some(Box::new(parse_window(&groups[4..])?)), groups.len())
            } else {
                (None, 3)
            };
        Ok(Some(Match {
            node: AstNode::new(
                NodeKind::If {
                    cond: Box::new(cond),
                    then: Box::new(then),
                    otherwise,
                },
                span,
            ),
            consumed,
        }))
    }
}

/// `break [expr]` / `continue [expr]`.
struct BreakContinueMatcher;

impl NodeMatcher for BreakContinueMatcher {
    fn name(&self) -> &'static str {
        "break_continue"
    }

    fn priority(&self) -> u32 {
        PRIORITY_BREAK
    }

    fn try_match(&self, groups: &[TokenGroup]) -> Result<Option<Match>, QuillError> {
        let keyword = unit_identifier(&groups[0]);
        if keyword != Some("break") && keyword != Some("continue") {
            return Ok(None);
        }
        let span = window_span(groups);
        let value = if groups.len() > 1 {
            Some(Box::new(parse_window(&groups[1..])?))
        } else {
            None
        };
        let kind = if keyword == Some("break") {
            NodeKind::Break(value)
        } else {
            NodeKind::Continue(value)
        };
        Ok(Match::full(AstNode::new(kind, span), groups))
    }
}

/// Prefix keyword modifiers: `copy`, `ref`, `deref`, `keyof`, `valueof`,
/// `selfof`, `assert`, `import`, `wrap`.
struct ModifierMatcher;

impl NodeMatcher for ModifierMatcher {
    fn name(&self) -> &'static str {
        "modifier"
    }

    fn priority(&self) -> u32 {
        PRIORITY_MODIFIER
    }

    fn try_match(&self, groups: &[TokenGroup]) -> Result<Option<Match>, QuillError> {
        let Some(modifier) = unit_identifier(&groups[0]).and_then(Modifier::from_keyword) else {
            return Ok(None);
        };
        let span = window_span(groups);
        if groups.len() < 2 {
            return Err(QuillError::syntax(
                format!("'{}' expects an operand", modifier.as_str()),
                span,
            ));
        }
        let operand = parse_window(&groups[1..])?;
        Ok(Match::full(
            AstNode::new(
                NodeKind::Modifier {
                    modifier,
                    operand: Box::new(operand),
                },
                span,
            ),
            groups,
        ))
    }
}

// ===== Operator matchers =====

/// One binary precedence tier. Scans right-to-left for the last top-level
/// operator of the tier whose left neighbor is an operand, so the left
/// side re-matches recursively and evaluation order is left-to-right.
struct BinaryMatcher {
    name: &'static str,
    priority: u32,
    operators: &'static [&'static str],
}

impl NodeMatcher for BinaryMatcher {
    fn name(&self) -> &'static str {
        self.name
    }

    fn priority(&self) -> u32 {
        self.priority
    }

    fn try_match(&self, groups: &[TokenGroup]) -> Result<Option<Match>, QuillError> {
        let span = window_span(groups);
        for at in (1..groups.len()).rev() {
            let Some(symbol) = unit_symbol(&groups[at]) else {
                continue;
            };
            if !self.operators.contains(&symbol) {
                continue;
            }
            // Preceded by another operator: this occurrence is unary.
            if is_operator_unit(&groups[at - 1]) {
                continue;
            }
            if at + 1 >= groups.len() {
                return Err(QuillError::syntax(
                    format!("'{symbol}' is missing its right operand"),
                    span,
                ));
            }
            let op = BinaryOp::from_symbol(symbol)
                .ok_or_else(|| QuillError::internal(format!("unknown operator '{symbol}'")))?;
            let lhs = parse_window(&groups[..at])?;
            let rhs = parse_window(&groups[at + 1..])?;
            return Ok(Match::full(
                AstNode::new(
                    NodeKind::Binary {
                        op,
                        lhs: Box::new(lhs),
                        rhs: Box::new(rhs),
                    },
                    span,
                ),
                groups,
            ));
        }
        Ok(None)
    }
}

/// Prefix `+` / `-` with no left operand.
struct UnaryMatcher;

impl NodeMatcher for UnaryMatcher {
    fn name(&self) -> &'static str {
        "unary"
    }

    fn priority(&self) -> u32 {
        PRIORITY_UNARY
    }

    fn try_match(&self, groups: &[TokenGroup]) -> Result<Option<Match>, QuillError> {
        let op = match unit_symbol(&groups[0]) {
            Some("-") => UnaryOp::Neg,
            Some("+") => UnaryOp::Pos,
            _ => return Ok(None),
        };
        let span = window_span(groups);
        if groups.len() < 2 {
            return Err(QuillError::syntax(
                format!("'{}' expects an operand", op.as_str()),
                span,
            ));
        }
        let operand = parse_window(&groups[1..])?;
        Ok(Match::full(
            AstNode::new(
                NodeKind::Unary {
                    op,
                    operand: Box::new(operand),
                },
                span,
            ),
            groups,
        ))
    }
}

// ===== Tight constructs =====

/// `(<params>) -> <body>`.
struct FunctionDefMatcher;

impl NodeMatcher for FunctionDefMatcher {
    fn name(&self) -> &'static str {
        "function_def"
    }

    fn priority(&self) -> u32 {
        PRIORITY_FUNCTION_DEF
    }

    fn try_match(&self, groups: &[TokenGroup]) -> Result<Option<Match>, QuillError> {
        if groups.len() < 3
            || !is_bracket_group(&groups[0], "(")
            || unit_symbol(&groups[1]) != Some("->")
        {
            return Ok(None);
        }
        let span = window_span(groups);
        let params = parse_parameter_tuple(&groups[0])?;
        let body = parse_window(&groups[2..])?;
        Ok(Match::full(
            AstNode::new(
                NodeKind::FunctionDef {
                    params: Box::new(params),
                    body: Box::new(body),
                },
                span,
            ),
            groups,
        ))
    }
}

/// Parse a parameter list unit into a Tuple node, wrapping a lone
/// parameter so the default template is always tuple-shaped.
fn parse_parameter_tuple(group: &TokenGroup) -> Result<AstNode, QuillError> {
    let span = group_span(group);
    let inner = inner_units(group)?;
    if inner.is_empty() {
        return Ok(AstNode::new(NodeKind::Tuple(Vec::new()), span));
    }
    let node = parse_window(&inner)?;
    Ok(match node.kind {
        NodeKind::Tuple(_) => node,
        _ => AstNode::new(NodeKind::Tuple(vec![node]), span),
    })
}

/// Postfix access: call `f(args)`, index `x[i]`, attribute `x.name`.
/// One right-to-left scan finds the *last* top-level access point so
/// chains like `a.b(c)[d]` peel from the outside in.
struct MemberAccessMatcher;

impl NodeMatcher for MemberAccessMatcher {
    fn name(&self) -> &'static str {
        "member_access"
    }

    fn priority(&self) -> u32 {
        PRIORITY_MEMBER_ACCESS
    }

    fn try_match(&self, groups: &[TokenGroup]) -> Result<Option<Match>, QuillError> {
        for at in (1..groups.len()).rev() {
            let group = &groups[at];
            if is_bracket_group(group, "(") && !is_operator_unit(&groups[at - 1]) {
                let callee = parse_window(&groups[..at])?;
                let args = parse_argument_tuple(group)?;
                let span = callee.span.merge(group_span(group));
                return Ok(Some(Match {
                    node: AstNode::new(
                        NodeKind::Call {
                            callee: Box::new(callee),
                            args: Box::new(args),
                        },
                        span,
                    ),
                    consumed: at + 1,
                }));
            }
            if is_bracket_group(group, "[") && !is_operator_unit(&groups[at - 1]) {
                let target = parse_window(&groups[..at])?;
                let inner = inner_units(group)?;
                if inner.is_empty() {
                    return Err(QuillError::syntax("empty index", group_span(group)));
                }
                let index = parse_window(&inner)?;
                let span = target.span.merge(group_span(group));
                return Ok(Some(Match {
                    node: AstNode::new(
                        NodeKind::IndexOf {
                            target: Box::new(target),
                            index: Box::new(index),
                        },
                        span,
                    ),
                    consumed: at + 1,
                }));
            }
            if unit_symbol(group) == Some(".") {
                if at + 1 >= groups.len() {
                    return Err(QuillError::syntax(
                        "'.' is missing an attribute name",
                        group_span(group),
                    ));
                }
                let target = parse_window(&groups[..at])?;
                let attr = attribute_key(&groups[at + 1])?;
                let span = target.span.merge(attr.span);
                return Ok(Some(Match {
                    node: AstNode::new(
                        NodeKind::GetAttr {
                            target: Box::new(target),
                            attr: Box::new(attr),
                        },
                        span,
                    ),
                    consumed: at + 2,
                }));
            }
        }
        Ok(None)
    }
}

/// Normalize a call argument unit to a Tuple node.
fn parse_argument_tuple(group: &TokenGroup) -> Result<AstNode, QuillError> {
    let span = group_span(group);
    let inner = inner_units(group)?;
    if inner.is_empty() {
        return Ok(AstNode::new(NodeKind::Tuple(Vec::new()), span));
    }
    let node = parse_window(&inner)?;
    Ok(match node.kind {
        NodeKind::Tuple(_) => node,
        _ => AstNode::new(NodeKind::Tuple(vec![node]), span),
    })
}

/// An attribute name: bare identifier or string become string keys,
/// anything else must be a single-unit expression (dynamic key).
fn attribute_key(group: &TokenGroup) -> Result<AstNode, QuillError> {
    let node = parse_window(std::slice::from_ref(group))?;
    Ok(match node.kind {
        NodeKind::Variable(name) => AstNode::new(NodeKind::Str(name), node.span),
        _ => node,
    })
}

/// Literals, variables and bracketed sub-expressions.
struct AtomMatcher;

impl NodeMatcher for AtomMatcher {
    fn name(&self) -> &'static str {
        "atom"
    }

    fn priority(&self) -> u32 {
        PRIORITY_ATOM
    }

    fn try_match(&self, groups: &[TokenGroup]) -> Result<Option<Match>, QuillError> {
        let group = &groups[0];
        let span = group_span(group);

        if is_bracket_group(group, "(") || is_bracket_group(group, "[") {
            let inner = inner_units(group)?;
            let node = if inner.is_empty() {
                AstNode::new(NodeKind::Tuple(Vec::new()), span)
            } else {
                parse_window(&inner)?
            };
            return Ok(Some(Match { node, consumed: 1 }));
        }
        if is_bracket_group(group, "{") {
            let inner = inner_units(group)?;
            let body = if inner.is_empty() {
                AstNode::null(span)
            } else {
                parse_window(&inner)?
            };
            return Ok(Some(Match {
                node: AstNode::new(NodeKind::Body(Box::new(body)), span),
                consumed: 1,
            }));
        }

        let [tok] = group.as_slice() else {
            return Ok(None);
        };
        let kind = match tok.kind {
            TokenKind::Number => parse_number(&tok.text, span)?,
            TokenKind::String => NodeKind::Str(tok.text.clone()),
            TokenKind::Identifier => match tok.text.as_str() {
                "true" => NodeKind::Bool(true),
                "false" => NodeKind::Bool(false),
                "none" => NodeKind::Null,
                _ => NodeKind::Variable(tok.text.clone()),
            },
            _ => return Ok(None),
        };
        Ok(Some(Match {
            node: AstNode::new(kind, span),
            consumed: 1,
        }))
    }
}

fn parse_number(text: &str, span: quill_core::Span) -> Result<NodeKind, QuillError> {
    if let Ok(int) = text.parse::<i64>() {
        return Ok(NodeKind::Int(int));
    }
    text.parse::<f64>()
        .map(NodeKind::Float)
        .map_err(|_| QuillError::syntax(format!("invalid number literal '{text}'"), span))
}

// ===== Registry =====

fn build_registry() -> Vec<Box<dyn NodeMatcher>> {
    let mut matchers: Vec<Box<dyn NodeMatcher>> = vec![
        Box::new(SeparatorMatcher),
        Box::new(ReturnMatcher),
        Box::new(TupleMatcher),
        Box::new(LetMatcher),
        Box::new(AssignMatcher),
        Box::new(NamedMatcher),
        Box::new(KeyValMatcher),
        Box::new(WhileMatcher),
        Box::new(IfMatcher),
        Box::new(BreakContinueMatcher),
        Box::new(ModifierMatcher),
        Box::new(BinaryMatcher {
            name: "bool_op",
            priority: PRIORITY_BOOL_OP,
            operators: &["&&", "||"],
        }),
        Box::new(BinaryMatcher {
            name: "compare",
            priority: PRIORITY_COMPARE,
            operators: &["==", "!=", "<", "<=", ">", ">="],
        }),
        Box::new(BinaryMatcher {
            name: "add_sub",
            priority: PRIORITY_ADD_SUB,
            operators: &["+", "-"],
        }),
        Box::new(BinaryMatcher {
            name: "mul_div",
            priority: PRIORITY_MUL_DIV,
            operators: &["*", "/", "%"],
        }),
        Box::new(UnaryMatcher),
        Box::new(FunctionDefMatcher),
        Box::new(MemberAccessMatcher),
        Box::new(AtomMatcher),
    ];
    // Sorted once; try_match order is priority order from here on.
    matchers.sort_by(|a, b| b.priority().cmp(&a.priority()));
    matchers
}

/// The matcher registry, sorted loosest-first.
pub fn registry() -> &'static [Box<dyn NodeMatcher>] {
    static REGISTRY: OnceLock<Vec<Box<dyn NodeMatcher>>> = OnceLock::new();
    REGISTRY.get_or_init(build_registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;

    fn parse_str(source: &str) -> AstNode {
        let tokens = tokenize(source).unwrap();
        let groups = group::gather(&tokens).unwrap();
        parse_window(&groups).unwrap()
    }

    fn parse_err(source: &str) -> QuillError {
        let tokens = tokenize(source).unwrap();
        let groups = group::gather(&tokens).unwrap();
        parse_window(&groups).unwrap_err()
    }

    #[test]
    fn test_precedence_mul_over_add() {
        let node = parse_str("1 + 2 * 3");
        let NodeKind::Binary { op, lhs, rhs } = node.kind else {
            panic!("expected binary, got {node:?}");
        };
        assert_eq!(op, BinaryOp::Add);
        assert_eq!(lhs.kind, NodeKind::Int(1));
        assert!(matches!(
            rhs.kind,
            NodeKind::Binary {
                op: BinaryOp::Mul,
                ..
            }
        ));
    }

    #[test]
    fn test_left_associativity() {
        // a - b - c parses as (a - b) - c.
        let node = parse_str("10 - 4 - 3");
        let NodeKind::Binary { op, lhs, rhs } = node.kind else {
            panic!("expected binary");
        };
        assert_eq!(op, BinaryOp::Sub);
        assert_eq!(rhs.kind, NodeKind::Int(3));
        assert!(matches!(lhs.kind, NodeKind::Binary { .. }));
    }

    #[test]
    fn test_unary_minus() {
        let node = parse_str("2 * -x");
        let NodeKind::Binary { op, rhs, .. } = node.kind else {
            panic!("expected binary");
        };
        assert_eq!(op, BinaryOp::Mul);
        assert!(matches!(
            rhs.kind,
            NodeKind::Unary {
                op: UnaryOp::Neg,
                ..
            }
        ));
    }

    #[test]
    fn test_let_and_assign() {
        let node = parse_str("x := 1");
        assert!(matches!(node.kind, NodeKind::Let { .. }));
        let node = parse_str("x = 1");
        assert!(matches!(node.kind, NodeKind::Assign { .. }));
    }

    #[test]
    fn test_invalid_let_target_is_fatal() {
        let err = parse_err("1 + 2 := 3");
        assert!(err.to_string().contains("declaration target"));
    }

    #[test]
    fn test_sequence_drops_trailing_separator() {
        let node = parse_str("x := 1; x = 2;");
        let NodeKind::Sequence(stmts) = node.kind else {
            panic!("expected sequence");
        };
        assert_eq!(stmts.len(), 2);
    }

    #[test]
    fn test_tuple_with_trailing_comma() {
        let node = parse_str("(5,)");
        let NodeKind::Tuple(items) = node.kind else {
            panic!("expected tuple, got {node:?}");
        };
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].kind, NodeKind::Int(5));
    }

    #[test]
    fn test_named_pair_key_becomes_string() {
        let node = parse_str("a => 0");
        let NodeKind::Named { key, value } = node.kind else {
            panic!("expected named");
        };
        assert_eq!(key.kind, NodeKind::Str("a".into()));
        assert_eq!(value.kind, NodeKind::Int(0));
    }

    #[test]
    fn test_function_def() {
        let node = parse_str("(a => 0, b => 0) -> { a + b }");
        let NodeKind::FunctionDef { params, body } = node.kind else {
            panic!("expected function def, got {node:?}");
        };
        let NodeKind::Tuple(items) = params.kind else {
            panic!("expected tuple params");
        };
        assert_eq!(items.len(), 2);
        assert!(matches!(body.kind, NodeKind::Body(_)));
    }

    #[test]
    fn test_single_param_wrapped_in_tuple() {
        let node = parse_str("(x => 1) -> x");
        let NodeKind::FunctionDef { params, .. } = node.kind else {
            panic!("expected function def");
        };
        assert!(matches!(params.kind, NodeKind::Tuple(ref v) if v.len() == 1));
    }

    #[test]
    fn test_call_chain() {
        let node = parse_str("f(1)(2)");
        let NodeKind::Call { callee, .. } = node.kind else {
            panic!("expected call");
        };
        assert!(matches!(callee.kind, NodeKind::Call { .. }));
    }

    #[test]
    fn test_attribute_then_call() {
        let node = parse_str("obj.method(1)");
        let NodeKind::Call { callee, args } = node.kind else {
            panic!("expected call");
        };
        assert!(matches!(callee.kind, NodeKind::GetAttr { .. }));
        assert!(matches!(args.kind, NodeKind::Tuple(ref v) if v.len() == 1));
    }

    #[test]
    fn test_index_access() {
        let node = parse_str("xs[0]");
        assert!(matches!(node.kind, NodeKind::IndexOf { .. }));
    }

    #[test]
    fn test_if_else_chain() {
        let node = parse_str("if (a) {1} else if (b) {2} else {3}");
        let NodeKind::If { otherwise, .. } = node.kind else {
            panic!("expected if");
        };
        assert!(matches!(otherwise.unwrap().kind, NodeKind::If { .. }));
    }

    #[test]
    fn test_while_loop() {
        let node = parse_str("while (x < 10) { x = x + 1 }");
        assert!(matches!(node.kind, NodeKind::While { .. }));
    }

    #[test]
    fn test_modifier_prefix() {
        let node = parse_str("ref x");
        let NodeKind::Modifier { modifier, operand } = node.kind else {
            panic!("expected modifier");
        };
        assert_eq!(modifier, Modifier::Ref);
        assert_eq!(operand.kind, NodeKind::Variable("x".into()));
    }

    #[test]
    fn test_assert_binds_loose() {
        let node = parse_str("assert x == 1");
        let NodeKind::Modifier { modifier, operand } = node.kind else {
            panic!("expected modifier");
        };
        assert_eq!(modifier, Modifier::Assert);
        assert!(matches!(operand.kind, NodeKind::Binary { .. }));
    }

    #[test]
    fn test_literals() {
        assert_eq!(parse_str("true").kind, NodeKind::Bool(true));
        assert_eq!(parse_str("none").kind, NodeKind::Null);
        assert_eq!(parse_str("1.5").kind, NodeKind::Float(1.5));
        assert_eq!(parse_str("-3").kind, NodeKind::Int(-3));
        assert_eq!(parse_str("\"hi\"").kind, NodeKind::Str("hi".into()));
    }

    #[test]
    fn test_key_value_pair() {
        let node = parse_str("\"k\": 1 + 2");
        let NodeKind::KeyValue { value, .. } = node.kind else {
            panic!("expected key-value");
        };
        assert!(matches!(value.kind, NodeKind::Binary { .. }));
    }

    #[test]
    fn test_unparseable_window() {
        let err = parse_err("a b");
        assert!(matches!(err, QuillError::SyntaxError { .. }));
    }
}
