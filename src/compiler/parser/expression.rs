use crate::compiler::ast::{NodeKind, SyntaxNode};
use crate::compiler::ir::{BinaryOp, TypeProp, UnaryOp};
use crate::compiler::lexer::tokens::Lex;
use crate::compiler::{CompilerError, Span};
use crate::err;

use super::parser::{required_expression, type_node};
use super::tokenstream::TokenStream;
use super::{ParserError, ParserResult};

/*
    Precedence, loosest first:

    EXPRESSION     := CONDITIONAL
    CONDITIONAL    := LOGICAL_OR [? EXPRESSION : EXPRESSION]
    LOGICAL_OR     := LOGICAL_AND (|| LOGICAL_AND)*
    LOGICAL_AND    := BITWISE_OR (&& BITWISE_OR)*
    BITWISE_OR     := BITWISE_XOR (| BITWISE_XOR)*
    BITWISE_XOR    := BITWISE_AND (^ BITWISE_AND)*
    BITWISE_AND    := EQUALITY (& EQUALITY)*
    EQUALITY       := RELATIONAL ((== | !=) RELATIONAL)*
    RELATIONAL     := SHIFT ((<= | >= | < | >) SHIFT)*
    SHIFT          := ADDITIVE ((<< | >>) ADDITIVE)*
    ADDITIVE       := MULTIPLICATIVE ((+ | -) MULTIPLICATIVE)*
    MULTIPLICATIVE := UNARY ((* | / | %) UNARY)*
    UNARY          := (+ | - | ~ | !) UNARY | PRIMARY
    PRIMARY        := INTEGER | IDENTIFIER | ( EXPRESSION )
                    | (sizeof | alignof | minof | maxof) ( TYPE )
*/

pub(super) fn expression(stream: &mut TokenStream) -> ParserResult<SyntaxNode> {
    conditional(stream)
}

fn conditional(stream: &mut TokenStream) -> ParserResult<SyntaxNode> {
    let cond = match logical_or(stream)? {
        Some(c) => c,
        None => return Ok(None),
    };

    if stream.next_if(&Lex::Question).is_none() {
        return Ok(Some(cond));
    }

    let then_expr = required_expression(stream)?;
    stream.next_must_be(&Lex::Colon)?;
    let else_expr = required_expression(stream)?;
    let span = Span::cover(cond.span, else_expr.span);
    Ok(Some(SyntaxNode::with_children(
        NodeKind::Conditional,
        span,
        vec![cond, then_expr, else_expr],
    )))
}

/// Left associative binary operator tier.  Each consumed operator becomes a
/// `Binary` node whose children are the operands parsed so far and the next
/// operand from the tighter tier.
fn binary(
    stream: &mut TokenStream,
    ops: &[(Lex, BinaryOp)],
    operand: fn(&mut TokenStream) -> ParserResult<SyntaxNode>,
) -> ParserResult<SyntaxNode> {
    let mut lhs = match operand(stream)? {
        Some(n) => n,
        None => return Ok(None),
    };

    'outer: loop {
        for (lex, op) in ops {
            if stream.next_if(lex).is_some() {
                let rhs = match operand(stream)? {
                    Some(n) => n,
                    None => {
                        let (span, found) = stream.peek_or_eof();
                        return err!(span, ParserError::ExpectedExpression(found));
                    }
                };
                let span = Span::cover(lhs.span, rhs.span);
                lhs = SyntaxNode::with_children(NodeKind::Binary(*op), span, vec![lhs, rhs]);
                continue 'outer;
            }
        }
        break;
    }

    Ok(Some(lhs))
}

fn logical_or(stream: &mut TokenStream) -> ParserResult<SyntaxNode> {
    binary(stream, &[(Lex::LOr, BinaryOp::LogOr)], logical_and)
}

fn logical_and(stream: &mut TokenStream) -> ParserResult<SyntaxNode> {
    binary(stream, &[(Lex::LAnd, BinaryOp::LogAnd)], bitwise_or)
}

fn bitwise_or(stream: &mut TokenStream) -> ParserResult<SyntaxNode> {
    binary(stream, &[(Lex::BOr, BinaryOp::BitOr)], bitwise_xor)
}

fn bitwise_xor(stream: &mut TokenStream) -> ParserResult<SyntaxNode> {
    binary(stream, &[(Lex::BXor, BinaryOp::BitXor)], bitwise_and)
}

fn bitwise_and(stream: &mut TokenStream) -> ParserResult<SyntaxNode> {
    binary(stream, &[(Lex::BAnd, BinaryOp::BitAnd)], equality)
}

fn equality(stream: &mut TokenStream) -> ParserResult<SyntaxNode> {
    binary(
        stream,
        &[(Lex::Eq, BinaryOp::Eq), (Lex::NEq, BinaryOp::Ne)],
        relational,
    )
}

fn relational(stream: &mut TokenStream) -> ParserResult<SyntaxNode> {
    binary(
        stream,
        &[
            (Lex::LsEq, BinaryOp::Le),
            (Lex::GrEq, BinaryOp::Ge),
            (Lex::Ls, BinaryOp::Lt),
            (Lex::Gr, BinaryOp::Gt),
        ],
        shift,
    )
}

fn shift(stream: &mut TokenStream) -> ParserResult<SyntaxNode> {
    binary(
        stream,
        &[(Lex::Shl, BinaryOp::Shl), (Lex::Shr, BinaryOp::Shr)],
        additive,
    )
}

fn additive(stream: &mut TokenStream) -> ParserResult<SyntaxNode> {
    binary(
        stream,
        &[(Lex::Add, BinaryOp::Add), (Lex::Minus, BinaryOp::Sub)],
        multiplicative,
    )
}

fn multiplicative(stream: &mut TokenStream) -> ParserResult<SyntaxNode> {
    binary(
        stream,
        &[
            (Lex::Mul, BinaryOp::Mul),
            (Lex::Div, BinaryOp::Div),
            (Lex::Mod, BinaryOp::Mod),
        ],
        unary,
    )
}

fn unary(stream: &mut TokenStream) -> ParserResult<SyntaxNode> {
    let prefix = [
        (Lex::Add, UnaryOp::Plus),
        (Lex::Minus, UnaryOp::Minus),
        (Lex::BNot, UnaryOp::BitNot),
        (Lex::Not, UnaryOp::Not),
    ];

    for (lex, op) in &prefix {
        if let Some(t) = stream.next_if(lex) {
            let arg = match unary(stream)? {
                Some(n) => n,
                None => {
                    let (span, found) = stream.peek_or_eof();
                    return err!(span, ParserError::ExpectedExpression(found));
                }
            };
            let span = Span::cover(t.span, arg.span);
            return Ok(Some(SyntaxNode::with_children(
                NodeKind::Unary(*op),
                span,
                vec![arg],
            )));
        }
    }

    primary(stream)
}

fn primary(stream: &mut TokenStream) -> ParserResult<SyntaxNode> {
    if let Some(t) = stream.next_if(&Lex::Integer(0)) {
        let value = match t.sym {
            Lex::Integer(v) => v,
            _ => return err!(t.span, ParserError::ExpectedInteger(Some(t.sym))),
        };
        return Ok(Some(SyntaxNode::new(NodeKind::Literal(value), t.span)));
    }

    if let Some((name, span)) = stream.next_if_id() {
        return Ok(Some(SyntaxNode::new(NodeKind::Name(name), span)));
    }

    if let Some(t) = stream.next_if(&Lex::LParen) {
        let mut inner = required_expression(stream)?;
        let end = stream.next_must_be(&Lex::RParen)?;
        inner.span = Span::cover(t.span, end.span);
        return Ok(Some(inner));
    }

    let props = [
        (Lex::SizeOf, TypeProp::Sizeof),
        (Lex::AlignOf, TypeProp::Alignof),
        (Lex::MinOf, TypeProp::Minof),
        (Lex::MaxOf, TypeProp::Maxof),
    ];

    for (lex, prop) in &props {
        if let Some(t) = stream.next_if(lex) {
            stream.next_must_be(&Lex::LParen)?;
            let ty = type_node(stream)?;
            let end = stream.next_must_be(&Lex::RParen)?;
            let span = Span::cover(t.span, end.span);
            return Ok(Some(SyntaxNode::with_children(
                NodeKind::TypeProp(*prop),
                span,
                vec![ty],
            )));
        }
    }

    Ok(None)
}
