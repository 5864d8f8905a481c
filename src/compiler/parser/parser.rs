use crate::compiler::ast::{NodeKind, SyntaxNode};
use crate::compiler::diagnostics::Logger;
use crate::compiler::ir::{BitRange, Category};
use crate::compiler::lexer::tokens::{Lex, Token};
use crate::compiler::{CompilerError, Span};
use crate::err;
use crate::StringId;

use super::expression::expression;
use super::tokenstream::TokenStream;
use super::{ParserError, ParserResult};

/*
    Grammar
    FILE        := ITEM*
    ITEM        := DEFINE | EXTEND | DECLARATION
    DEFINE      := define IDENTIFIER [public] BODY ;
    BODY        := structure QUALIFIER* { DECLARATION* }
                 | union QUALIFIER* { DECLARATION* }
                 | object QUALIFIER* { DECLARATION* }
                 | enumeration [explicit] { ENUMERATOR* }
                 | bitfield < INTEGER > [const] { BF_MEMBER* }
                 | alternative TYPE
                 | constant [TYPE] = EXPRESSION
                 | global TYPE
    EXTEND      := extend IDENTIFIER CATEGORY [module IDENTIFIER] CAT_BODY ;
    CATEGORY    := structure | union | object | enumeration | bitfield
    DECLARATION := IDENTIFIER TYPE [@ EXPRESSION] ;
    TYPE        := QUALIFIER* CORE
    CORE        := array ( EXPRESSION ) TYPE
                 | pointer TYPE
                 | structure IDENTIFIER | union IDENTIFIER
                 | enumeration IDENTIFIER | bitfield IDENTIFIER
                 | alternative IDENTIFIER
                 | object [noprefix] IDENTIFIER
                 | PRIMITIVE
    QUALIFIER   := const | atomic | packed | writeonly | restrict | contained
                 | optimized | aligned ( EXPRESSION ) | group ( IDENTIFIER )
                 | lockable ( IDENTIFIER )
    ENUMERATOR  := IDENTIFIER [noprefix] [= EXPRESSION] ;
    BF_MEMBER   := RANGES [<< INTEGER] BF_DECL ;
                 | auto [< INTEGER >] BF_DECL ;
                 | others BF_DECL ;
                 | delete IDENTIFIER ;
    RANGES      := RANGE [, RANGE]*
    RANGE       := INTEGER [: INTEGER]
    BF_DECL     := unknown [= EXPRESSION]
                 | IDENTIFIER TYPE [= EXPRESSION]
    EXPRESSION  := precedence cascade over ?:, ||, &&, |, ^, &, == !=,
                   < <= > >=, << >>, + -, * / %, unary + - ~ !, and the
                   primaries INTEGER, IDENTIFIER, ( EXPRESSION ), and
                   sizeof|alignof|minof|maxof ( TYPE )
*/

/// Parses the tokens of one source unit into a list of top level syntax
/// nodes, one per definition, extension, or file scope declaration.
pub fn parse(
    tokens: &Vec<Token>,
    logger: &Logger,
) -> Result<Vec<SyntaxNode>, CompilerError<ParserError>> {
    let mut stream = match TokenStream::new(tokens, logger) {
        Some(s) => s,
        None => return Ok(Vec::new()),
    };

    let mut items = Vec::new();
    while let Some(token) = stream.peek().copied() {
        match item(&mut stream)? {
            Some(i) => {
                stream.record(i.span, Ok(item_desc(&i)));
                items.push(i);
            }
            None => return err!(token.span, ParserError::ExpectedItem(token.sym)),
        }
    }
    Ok(items)
}

fn item_desc(item: &SyntaxNode) -> &'static str {
    match item.kind {
        NodeKind::Define(_) => "Definition",
        NodeKind::Extend(_) => "Extension",
        _ => "Declaration",
    }
}

fn item(stream: &mut TokenStream) -> ParserResult<SyntaxNode> {
    match define(stream)? {
        Some(d) => Ok(Some(d)),
        None => match extend(stream)? {
            Some(x) => Ok(Some(x)),
            None => declaration(stream),
        },
    }
}

fn define(stream: &mut TokenStream) -> ParserResult<SyntaxNode> {
    let start = match stream.next_if(&Lex::Define) {
        Some(t) => t,
        None => return Ok(None),
    };

    let (name, _) = identifier(stream)?;
    let mut children = Vec::new();
    if let Some(t) = stream.next_if(&Lex::Public) {
        children.push(SyntaxNode::new(NodeKind::Public, t.span));
    }
    children.push(definition_body(stream)?);
    let end = stream.next_must_be(&Lex::Semicolon)?;

    Ok(Some(SyntaxNode::with_children(
        NodeKind::Define(name),
        Span::cover(start.span, end.span),
        children,
    )))
}

fn definition_body(stream: &mut TokenStream) -> Result<SyntaxNode, CompilerError<ParserError>> {
    let (span, found) = stream.peek_or_eof();
    match found {
        Some(Lex::Structure) => aggregate_body(stream, &Lex::Structure, NodeKind::StructureBody),
        Some(Lex::Union) => aggregate_body(stream, &Lex::Union, NodeKind::UnionBody),
        Some(Lex::Object) => aggregate_body(stream, &Lex::Object, NodeKind::ObjectBody),
        Some(Lex::Enumeration) => enumeration_body(stream),
        Some(Lex::BitField) => bitfield_body(stream),
        Some(Lex::Alternative) => {
            let start = stream.next_must_be(&Lex::Alternative)?;
            let ty = type_node(stream)?;
            let span = Span::cover(start.span, ty.span);
            Ok(SyntaxNode::with_children(
                NodeKind::AlternativeBody,
                span,
                vec![ty],
            ))
        }
        Some(Lex::Constant) => constant_body(stream),
        Some(Lex::Global) => {
            let start = stream.next_must_be(&Lex::Global)?;
            let ty = type_node(stream)?;
            let span = Span::cover(start.span, ty.span);
            Ok(SyntaxNode::with_children(
                NodeKind::GlobalBody,
                span,
                vec![ty],
            ))
        }
        _ => err!(span, ParserError::ExpectedDefinitionBody(found)),
    }
}

fn aggregate_body(
    stream: &mut TokenStream,
    kw: &Lex,
    kind: NodeKind,
) -> Result<SyntaxNode, CompilerError<ParserError>> {
    let start = stream.next_must_be(kw)?;
    aggregate_rest(stream, start.span, kind)
}

/// The qualifier list and member block of a structure, union, or object,
/// shared by `define` and `extend`.
fn aggregate_rest(
    stream: &mut TokenStream,
    start: Span,
    kind: NodeKind,
) -> Result<SyntaxNode, CompilerError<ParserError>> {
    let mut children = qualifiers(stream)?;
    stream.next_must_be(&Lex::LBrace)?;
    while !stream.test_if(&Lex::RBrace) {
        match declaration(stream)? {
            Some(d) => children.push(d),
            None => {
                let (span, found) = stream.peek_or_eof();
                return err!(span, ParserError::ExpectedIdentifier(found));
            }
        }
    }
    let end = stream.next_must_be(&Lex::RBrace)?;
    Ok(SyntaxNode::with_children(
        kind,
        Span::cover(start, end.span),
        children,
    ))
}

fn enumeration_body(stream: &mut TokenStream) -> Result<SyntaxNode, CompilerError<ParserError>> {
    let start = stream.next_must_be(&Lex::Enumeration)?;
    let mut children = Vec::new();
    if let Some(t) = stream.next_if(&Lex::Explicit) {
        children.push(SyntaxNode::new(NodeKind::Explicit, t.span));
    }
    enumeration_rest(stream, start.span, children)
}

fn enumeration_rest(
    stream: &mut TokenStream,
    start: Span,
    mut children: Vec<SyntaxNode>,
) -> Result<SyntaxNode, CompilerError<ParserError>> {
    stream.next_must_be(&Lex::LBrace)?;
    while !stream.test_if(&Lex::RBrace) {
        children.push(enumerator(stream)?);
    }
    let end = stream.next_must_be(&Lex::RBrace)?;
    Ok(SyntaxNode::with_children(
        NodeKind::EnumBody,
        Span::cover(start, end.span),
        children,
    ))
}

fn enumerator(stream: &mut TokenStream) -> Result<SyntaxNode, CompilerError<ParserError>> {
    let (name, span) = identifier(stream)?;
    let mut children = Vec::new();
    if let Some(t) = stream.next_if(&Lex::NoPrefix) {
        children.push(SyntaxNode::new(NodeKind::NoPrefix, t.span));
    }
    if stream.next_if(&Lex::Assign).is_some() {
        children.push(required_expression(stream)?);
    }
    let end = stream.next_must_be(&Lex::Semicolon)?;
    Ok(SyntaxNode::with_children(
        NodeKind::Enumerator(name),
        Span::cover(span, end.span),
        children,
    ))
}

fn bitfield_body(stream: &mut TokenStream) -> Result<SyntaxNode, CompilerError<ParserError>> {
    let start = stream.next_must_be(&Lex::BitField)?;
    stream.next_must_be(&Lex::Ls)?;
    let (length, _) = integer(stream)?;
    stream.next_must_be(&Lex::Gr)?;

    let mut children = Vec::new();
    if let Some(t) = stream.next_if(&Lex::Const) {
        children.push(SyntaxNode::new(NodeKind::ConstMembers, t.span));
    }
    bitfield_rest(stream, start.span, Some(length), children)
}

fn bitfield_rest(
    stream: &mut TokenStream,
    start: Span,
    length: Option<u64>,
    mut children: Vec<SyntaxNode>,
) -> Result<SyntaxNode, CompilerError<ParserError>> {
    stream.next_must_be(&Lex::LBrace)?;
    while !stream.test_if(&Lex::RBrace) {
        children.push(bitfield_member(stream)?);
    }
    let end = stream.next_must_be(&Lex::RBrace)?;
    Ok(SyntaxNode::with_children(
        NodeKind::BitFieldBody(length),
        Span::cover(start, end.span),
        children,
    ))
}

fn constant_body(stream: &mut TokenStream) -> Result<SyntaxNode, CompilerError<ParserError>> {
    let start = stream.next_must_be(&Lex::Constant)?;
    let mut children = Vec::new();
    if !stream.test_if(&Lex::Assign) {
        children.push(type_node(stream)?);
    }
    stream.next_must_be(&Lex::Assign)?;
    let value = required_expression(stream)?;
    let span = Span::cover(start.span, value.span);
    children.push(value);
    Ok(SyntaxNode::with_children(
        NodeKind::ConstantBody,
        span,
        children,
    ))
}

fn bitfield_member(stream: &mut TokenStream) -> Result<SyntaxNode, CompilerError<ParserError>> {
    let (span, found) = stream.peek_or_eof();
    match found {
        Some(Lex::Delete) => {
            let start = stream.next_must_be(&Lex::Delete)?;
            let (name, _) = identifier(stream)?;
            let end = stream.next_must_be(&Lex::Semicolon)?;
            Ok(SyntaxNode::new(
                NodeKind::Delete(name),
                Span::cover(start.span, end.span),
            ))
        }
        Some(Lex::Auto) => {
            let start = stream.next_must_be(&Lex::Auto)?;
            let mut width = None;
            let mut spec_span = start.span;
            if stream.next_if(&Lex::Ls).is_some() {
                let (w, _) = integer(stream)?;
                let gr = stream.next_must_be(&Lex::Gr)?;
                width = Some(w);
                spec_span = Span::cover(spec_span, gr.span);
            }
            let spec = SyntaxNode::new(NodeKind::Auto { width }, spec_span);
            bitfield_decl(stream, spec, start.span)
        }
        Some(Lex::Others) => {
            let start = stream.next_must_be(&Lex::Others)?;
            let spec = SyntaxNode::new(NodeKind::Others, start.span);
            bitfield_decl(stream, spec, start.span)
        }
        Some(Lex::Integer(_)) => {
            let spec = ranges(stream)?;
            let start = spec.span;
            bitfield_decl(stream, spec, start)
        }
        _ => err!(span, ParserError::ExpectedBitFieldMember(found)),
    }
}

fn ranges(stream: &mut TokenStream) -> Result<SyntaxNode, CompilerError<ParserError>> {
    let first = bit_range(stream)?;
    let mut span = first.span;
    let mut children = vec![first];
    while stream.next_if(&Lex::Comma).is_some() {
        let r = bit_range(stream)?;
        span = Span::cover(span, r.span);
        children.push(r);
    }

    let mut shift = 0;
    if stream.next_if(&Lex::Shl).is_some() {
        let (s, s_span) = integer(stream)?;
        shift = s;
        span = Span::cover(span, s_span);
    }

    Ok(SyntaxNode::with_children(
        NodeKind::Ranges { shift },
        span,
        children,
    ))
}

/// A bit range written most significant bit first: `msb:lsb`, or a single
/// bit number.
fn bit_range(stream: &mut TokenStream) -> Result<SyntaxNode, CompilerError<ParserError>> {
    let (msb, msb_span) = integer(stream)?;
    let (lsb, span) = if stream.next_if(&Lex::Colon).is_some() {
        let (lsb, lsb_span) = integer(stream)?;
        (lsb, Span::cover(msb_span, lsb_span))
    } else {
        (msb, msb_span)
    };

    if msb < lsb {
        return err!(span, ParserError::InvalidBitRange { msb, lsb });
    }

    Ok(SyntaxNode::new(
        NodeKind::Range(BitRange {
            bit: lsb,
            width: msb - lsb + 1,
        }),
        span,
    ))
}

fn bitfield_decl(
    stream: &mut TokenStream,
    spec: SyntaxNode,
    start: Span,
) -> Result<SyntaxNode, CompilerError<ParserError>> {
    if stream.next_if(&Lex::Unknown).is_some() {
        let mut children = vec![spec];
        if stream.next_if(&Lex::Assign).is_some() {
            children.push(required_expression(stream)?);
        }
        let end = stream.next_must_be(&Lex::Semicolon)?;
        return Ok(SyntaxNode::with_children(
            NodeKind::Reserved,
            Span::cover(start, end.span),
            children,
        ));
    }

    let (name, _) = identifier(stream)?;
    let ty = type_node(stream)?;
    let mut children = vec![spec, ty];
    if stream.next_if(&Lex::Assign).is_some() {
        children.push(required_expression(stream)?);
    }
    let end = stream.next_must_be(&Lex::Semicolon)?;
    Ok(SyntaxNode::with_children(
        NodeKind::Field(name),
        Span::cover(start, end.span),
        children,
    ))
}

fn extend(stream: &mut TokenStream) -> ParserResult<SyntaxNode> {
    let start = match stream.next_if(&Lex::Extend) {
        Some(t) => t,
        None => return Ok(None),
    };

    let (target, _) = identifier(stream)?;

    let categories = vec![
        Lex::Structure,
        Lex::Union,
        Lex::Object,
        Lex::Enumeration,
        Lex::BitField,
    ];
    let cat = match stream.next_if_one_of(categories.clone()) {
        Some(t) => t,
        None => {
            let (span, found) = stream.peek_or_eof();
            return err!(span, ParserError::ExpectedButFound(categories, found));
        }
    };

    let mut children = Vec::new();
    if stream.next_if(&Lex::Module).is_some() {
        let (m, m_span) = identifier(stream)?;
        children.push(SyntaxNode::new(NodeKind::ModuleName(m), m_span));
    }

    let body = match cat.sym {
        Lex::Structure => aggregate_rest(stream, cat.span, NodeKind::StructureBody)?,
        Lex::Union => aggregate_rest(stream, cat.span, NodeKind::UnionBody)?,
        Lex::Object => aggregate_rest(stream, cat.span, NodeKind::ObjectBody)?,
        Lex::Enumeration => enumeration_rest(stream, cat.span, Vec::new())?,
        Lex::BitField => bitfield_rest(stream, cat.span, None, Vec::new())?,
        found => return err!(cat.span, ParserError::ExpectedButFound(categories, Some(found))),
    };
    children.push(body);
    let end = stream.next_must_be(&Lex::Semicolon)?;

    Ok(Some(SyntaxNode::with_children(
        NodeKind::Extend(target),
        Span::cover(start.span, end.span),
        children,
    )))
}

fn declaration(stream: &mut TokenStream) -> ParserResult<SyntaxNode> {
    let (name, name_span) = match stream.next_if_id() {
        Some(id) => id,
        None => return Ok(None),
    };

    let ty = type_node(stream)?;
    let mut children = vec![ty];
    if let Some(at) = stream.next_if(&Lex::At) {
        let offset = required_expression(stream)?;
        let span = Span::cover(at.span, offset.span);
        children.push(SyntaxNode::with_children(
            NodeKind::Offset,
            span,
            vec![offset],
        ));
    }
    let end = stream.next_must_be(&Lex::Semicolon)?;

    Ok(Some(SyntaxNode::with_children(
        NodeKind::Declaration(name),
        Span::cover(name_span, end.span),
        children,
    )))
}

/// A full type: leading qualifiers attached to the core type node.
pub(super) fn type_node(stream: &mut TokenStream) -> Result<SyntaxNode, CompilerError<ParserError>> {
    let mut quals = qualifiers(stream)?;
    let mut core = core_type(stream)?;
    if let Some(first) = quals.first() {
        core.span = Span::cover(first.span, core.span);
        quals.append(&mut core.children);
        core.children = quals;
    }
    Ok(core)
}

fn core_type(stream: &mut TokenStream) -> Result<SyntaxNode, CompilerError<ParserError>> {
    let (span, found) = stream.peek_or_eof();
    match found {
        Some(Lex::Array) => {
            let start = stream.next_must_be(&Lex::Array)?;
            stream.next_must_be(&Lex::LParen)?;
            let length = required_expression(stream)?;
            stream.next_must_be(&Lex::RParen)?;
            let element = type_node(stream)?;
            let span = Span::cover(start.span, element.span);
            Ok(SyntaxNode::with_children(
                NodeKind::Array,
                span,
                vec![length, element],
            ))
        }
        Some(Lex::Pointer) => {
            let start = stream.next_must_be(&Lex::Pointer)?;
            let pointee = type_node(stream)?;
            let span = Span::cover(start.span, pointee.span);
            Ok(SyntaxNode::with_children(
                NodeKind::Pointer,
                span,
                vec![pointee],
            ))
        }
        Some(Lex::Structure) => named_type(stream, &Lex::Structure, Category::Structure),
        Some(Lex::Union) => named_type(stream, &Lex::Union, Category::Union),
        Some(Lex::Enumeration) => named_type(stream, &Lex::Enumeration, Category::Enumeration),
        Some(Lex::BitField) => named_type(stream, &Lex::BitField, Category::BitField),
        Some(Lex::Alternative) => named_type(stream, &Lex::Alternative, Category::Alternative),
        Some(Lex::Object) => {
            let start = stream.next_must_be(&Lex::Object)?;
            let mut children = Vec::new();
            if let Some(t) = stream.next_if(&Lex::NoPrefix) {
                children.push(SyntaxNode::new(NodeKind::NoPrefix, t.span));
            }
            let (name, name_span) = identifier(stream)?;
            Ok(SyntaxNode::with_children(
                NodeKind::Object(name),
                Span::cover(start.span, name_span),
                children,
            ))
        }
        Some(Lex::Primitive(_)) => match stream.next_if(&Lex::Primitive(StringId::new())) {
            Some(Token {
                sym: Lex::Primitive(name),
                span,
            }) => Ok(SyntaxNode::new(NodeKind::Primitive(name), span)),
            _ => err!(span, ParserError::ExpectedType(found)),
        },
        _ => err!(span, ParserError::ExpectedType(found)),
    }
}

fn named_type(
    stream: &mut TokenStream,
    kw: &Lex,
    category: Category,
) -> Result<SyntaxNode, CompilerError<ParserError>> {
    let start = stream.next_must_be(kw)?;
    let (name, name_span) = identifier(stream)?;
    Ok(SyntaxNode::new(
        NodeKind::Named { category, name },
        Span::cover(start.span, name_span),
    ))
}

fn qualifiers(stream: &mut TokenStream) -> Result<Vec<SyntaxNode>, CompilerError<ParserError>> {
    let mut quals = Vec::new();
    while let Some(q) = qualifier(stream)? {
        quals.push(q);
    }
    Ok(quals)
}

fn qualifier(stream: &mut TokenStream) -> ParserResult<SyntaxNode> {
    let (_, found) = stream.peek_or_eof();
    let node = match found {
        Some(Lex::Const) => marker(stream, &Lex::Const, NodeKind::Const)?,
        Some(Lex::Atomic) => marker(stream, &Lex::Atomic, NodeKind::Atomic)?,
        Some(Lex::Packed) => marker(stream, &Lex::Packed, NodeKind::Packed)?,
        Some(Lex::Writeonly) => marker(stream, &Lex::Writeonly, NodeKind::Writeonly)?,
        Some(Lex::Restrict) => marker(stream, &Lex::Restrict, NodeKind::Restrict)?,
        Some(Lex::Contained) => marker(stream, &Lex::Contained, NodeKind::Contained)?,
        Some(Lex::Optimized) => marker(stream, &Lex::Optimized, NodeKind::Optimized)?,
        Some(Lex::Aligned) => {
            let start = stream.next_must_be(&Lex::Aligned)?;
            stream.next_must_be(&Lex::LParen)?;
            let value = required_expression(stream)?;
            let end = stream.next_must_be(&Lex::RParen)?;
            SyntaxNode::with_children(
                NodeKind::Aligned,
                Span::cover(start.span, end.span),
                vec![value],
            )
        }
        Some(Lex::Group) => {
            let (name, span) = qualifier_arg(stream, &Lex::Group)?;
            SyntaxNode::new(NodeKind::Group(name), span)
        }
        Some(Lex::Lockable) => {
            let (name, span) = qualifier_arg(stream, &Lex::Lockable)?;
            SyntaxNode::new(NodeKind::Lockable(name), span)
        }
        _ => return Ok(None),
    };
    Ok(Some(node))
}

fn marker(
    stream: &mut TokenStream,
    kw: &Lex,
    kind: NodeKind,
) -> Result<SyntaxNode, CompilerError<ParserError>> {
    let t = stream.next_must_be(kw)?;
    Ok(SyntaxNode::new(kind, t.span))
}

/// A qualifier with a parenthesized identifier argument: `group(regs)`.
fn qualifier_arg(
    stream: &mut TokenStream,
    kw: &Lex,
) -> Result<(StringId, Span), CompilerError<ParserError>> {
    let start = stream.next_must_be(kw)?;
    stream.next_must_be(&Lex::LParen)?;
    let (name, _) = identifier(stream)?;
    let end = stream.next_must_be(&Lex::RParen)?;
    Ok((name, Span::cover(start.span, end.span)))
}

fn identifier(stream: &mut TokenStream) -> Result<(StringId, Span), CompilerError<ParserError>> {
    match stream.next_if_id() {
        Some(id) => Ok(id),
        None => {
            let (span, found) = stream.peek_or_eof();
            err!(span, ParserError::ExpectedIdentifier(found))
        }
    }
}

fn integer(stream: &mut TokenStream) -> Result<(u64, Span), CompilerError<ParserError>> {
    let (span, found) = stream.peek_or_eof();
    match stream.next_if(&Lex::Integer(0)) {
        Some(Token {
            sym: Lex::Integer(value),
            span,
        }) => Ok((value, span)),
        _ => err!(span, ParserError::ExpectedInteger(found)),
    }
}

pub(super) fn required_expression(
    stream: &mut TokenStream,
) -> Result<SyntaxNode, CompilerError<ParserError>> {
    match expression(stream)? {
        Some(e) => Ok(e),
        None => {
            let (span, found) = stream.peek_or_eof();
            err!(span, ParserError::ExpectedExpression(found))
        }
    }
}
