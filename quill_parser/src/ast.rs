//! AST node definitions.
//!
//! Nodes are built bottom-up by the matcher registry and consumed once by
//! the bytecode generator. Every node carries the source span it was
//! matched from, which the generator forwards into debug records.

use quill_core::Span;

/// One parsed node.
#[derive(Debug, Clone, PartialEq)]
pub struct AstNode {
    pub kind: NodeKind,
    pub span: Span,
}

impl AstNode {
    #[inline]
    #[must_use]
    pub const fn new(kind: NodeKind, span: Span) -> Self {
        Self { kind, span }
    }

    /// A `null` literal node, used for synthesized branches.
    #[inline]
    #[must_use]
    pub const fn null(span: Span) -> Self {
        Self::new(NodeKind::Null, span)
    }
}

/// Every construct the matcher registry can produce.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
    Null,
    Variable(String),
    /// Ordered sequence literal; also carries argument lists.
    Tuple(Vec<AstNode>),
    /// Dictionary-style `key: value` pair.
    KeyValue {
        key: Box<AstNode>,
        value: Box<AstNode>,
    },
    /// Binding-slot `name => value` pair, distinct from [`NodeKind::KeyValue`].
    Named {
        key: Box<AstNode>,
        value: Box<AstNode>,
    },
    /// `(params) -> body`; `params` is a Tuple of Named defaults.
    FunctionDef {
        params: Box<AstNode>,
        body: Box<AstNode>,
    },
    Call {
        callee: Box<AstNode>,
        args: Box<AstNode>,
    },
    IndexOf {
        target: Box<AstNode>,
        index: Box<AstNode>,
    },
    GetAttr {
        target: Box<AstNode>,
        attr: Box<AstNode>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<AstNode>,
        rhs: Box<AstNode>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<AstNode>,
    },
    /// `name := value`: introduce a binding in the innermost frame.
    Let {
        target: Box<AstNode>,
        value: Box<AstNode>,
    },
    /// `location = value`: write through to existing storage.
    Assign {
        target: Box<AstNode>,
        value: Box<AstNode>,
    },
    /// `;`-separated statement list.
    Sequence(Vec<AstNode>),
    /// `{ ... }` block, executed in its own frame.
    Body(Box<AstNode>),
    If {
        cond: Box<AstNode>,
        then: Box<AstNode>,
        otherwise: Option<Box<AstNode>>,
    },
    While {
        cond: Box<AstNode>,
        body: Box<AstNode>,
    },
    Break(Option<Box<AstNode>>),
    Continue(Option<Box<AstNode>>),
    Return(Option<Box<AstNode>>),
    /// Prefix keyword operator (`copy`, `ref`, `assert`, ...).
    Modifier {
        modifier: Modifier,
        operand: Box<AstNode>,
    },
}

/// Binary operators, grouped into precedence tiers by the matcher registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    And,
    Or,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl BinaryOp {
    /// The source symbol, also used as the bytecode operand.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Mod => "%",
            Self::And => "&&",
            Self::Or => "||",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }

    /// Parse a source symbol back into an operator.
    #[must_use]
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        Some(match symbol {
            "+" => Self::Add,
            "-" => Self::Sub,
            "*" => Self::Mul,
            "/" => Self::Div,
            "%" => Self::Mod,
            "&&" => Self::And,
            "||" => Self::Or,
            "==" => Self::Eq,
            "!=" => Self::Ne,
            "<" => Self::Lt,
            "<=" => Self::Le,
            ">" => Self::Gt,
            ">=" => Self::Ge,
            _ => return None,
        })
    }
}

/// Prefix sign operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Pos,
}

impl UnaryOp {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Neg => "-",
            Self::Pos => "+",
        }
    }
}

/// Prefix keyword modifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modifier {
    /// Deep copy of the operand value.
    Copy,
    /// Wrap a location in a Ref value.
    Ref,
    /// Unwrap a Ref back to its location.
    Deref,
    /// Key half of a pair; parameter template of a lambda.
    KeyOf,
    /// Value half of a pair.
    ValueOf,
    /// Bound receiver of a lambda.
    SelfOf,
    /// Raise unless the operand is `true`.
    Assert,
    /// Load a persisted module by path.
    Import,
    /// Box the operand in a mutable cell value.
    Wrap,
}

impl Modifier {
    /// Parse a keyword into a modifier.
    #[must_use]
    pub fn from_keyword(word: &str) -> Option<Self> {
        Some(match word {
            "copy" => Self::Copy,
            "ref" => Self::Ref,
            "deref" => Self::Deref,
            "keyof" => Self::KeyOf,
            "valueof" => Self::ValueOf,
            "selfof" => Self::SelfOf,
            "assert" => Self::Assert,
            "import" => Self::Import,
            "wrap" => Self::Wrap,
            _ => return None,
        })
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Copy => "copy",
            Self::Ref => "ref",
            Self::Deref => "deref",
            Self::KeyOf => "keyof",
            Self::ValueOf => "valueof",
            Self::SelfOf => "selfof",
            Self::Assert => "assert",
            Self::Import => "import",
            Self::Wrap => "wrap",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binary_op_round_trip() {
        for op in [
            BinaryOp::Add,
            BinaryOp::Sub,
            BinaryOp::Mul,
            BinaryOp::Div,
            BinaryOp::Mod,
            BinaryOp::And,
            BinaryOp::Or,
            BinaryOp::Eq,
            BinaryOp::Ne,
            BinaryOp::Lt,
            BinaryOp::Le,
            BinaryOp::Gt,
            BinaryOp::Ge,
        ] {
            assert_eq!(BinaryOp::from_symbol(op.as_str()), Some(op));
        }
        assert_eq!(BinaryOp::from_symbol("=>"), None);
    }

    #[test]
    fn test_modifier_keywords() {
        assert_eq!(Modifier::from_keyword("ref"), Some(Modifier::Ref));
        assert_eq!(Modifier::from_keyword("import"), Some(Modifier::Import));
        assert_eq!(Modifier::from_keyword("reference"), None);
    }
}
