use serde::{Deserialize, Serialize};

use super::{DefId, ExprId, Rebase, TypeId};
use crate::compiler::Span;
use crate::StringId;

/// A node in the constant expression arena.  Expressions are kept as trees
/// and evaluated after reference resolution, when sizeof and constant
/// references can be answered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,

    /// Evaluated value, filled in during layout.
    #[serde(skip)]
    pub resolved: Option<i128>,
}

impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Expr {
        Expr {
            kind,
            span,
            resolved: None,
        }
    }

    pub fn literal(value: u64, span: Span) -> Expr {
        Expr::new(ExprKind::Literal(value), span)
    }

    pub(crate) fn rebase(&mut self, rb: Rebase) {
        match &mut self.kind {
            ExprKind::Literal(_) => {}
            ExprKind::ConstRef { def, .. } => {
                if let Some(d) = def {
                    rb.def(d);
                }
            }
            ExprKind::Unary { arg, .. } => rb.expr(arg),
            ExprKind::Binary { lhs, rhs, .. } => {
                rb.expr(lhs);
                rb.expr(rhs);
            }
            ExprKind::Conditional {
                cond,
                then_expr,
                else_expr,
            } => {
                rb.expr(cond);
                rb.expr(then_expr);
                rb.expr(else_expr);
            }
            ExprKind::TypeProp { ty, .. } => rb.ty(ty),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ExprKind {
    /// An integer literal.  Negative values are spelled with unary minus.
    Literal(u64),

    /// A reference to a constant definition.  `def` is filled in by the
    /// resolver.
    ConstRef {
        name: StringId,
        def: Option<DefId>,
    },

    Unary {
        op: UnaryOp,
        arg: ExprId,
    },

    Binary {
        op: BinaryOp,
        lhs: ExprId,
        rhs: ExprId,
    },

    Conditional {
        cond: ExprId,
        then_expr: ExprId,
        else_expr: ExprId,
    },

    /// An integer property of a type: sizeof, alignof, minof, maxof.
    TypeProp {
        prop: TypeProp,
        ty: TypeId,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum UnaryOp {
    Plus,
    Minus,
    BitNot,
    Not,
}

impl std::fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            UnaryOp::Plus => "+",
            UnaryOp::Minus => "-",
            UnaryOp::BitNot => "~",
            UnaryOp::Not => "!",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Shl,
    Shr,
    Lt,
    Gt,
    Le,
    Ge,
    Eq,
    Ne,
    BitAnd,
    BitXor,
    BitOr,
    LogAnd,
    LogOr,
}

impl std::fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
            BinaryOp::Lt => "<",
            BinaryOp::Gt => ">",
            BinaryOp::Le => "<=",
            BinaryOp::Ge => ">=",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitXor => "^",
            BinaryOp::BitOr => "|",
            BinaryOp::LogAnd => "&&",
            BinaryOp::LogOr => "||",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum TypeProp {
    Sizeof,
    Alignof,
    Minof,
    Maxof,
}

impl std::fmt::Display for TypeProp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TypeProp::Sizeof => "sizeof",
            TypeProp::Alignof => "alignof",
            TypeProp::Minof => "minof",
            TypeProp::Maxof => "maxof",
        };
        f.write_str(s)
    }
}
