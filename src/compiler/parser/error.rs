use crate::compiler::lexer::tokens::Lex;
use crate::compiler::{CompilerDisplay, CompilerDisplayError, SourceMap};
use crate::StringTable;

/// Errors which can be encountered while parsing tokens into syntax nodes.
/// The `Option<Lex>` payloads carry the offending token; `None` means the
/// token stream ended early.
#[derive(Clone, Debug, PartialEq)]
pub enum ParserError {
    ExpectedButFound(Vec<Lex>, Option<Lex>),
    ExpectedIdentifier(Option<Lex>),
    ExpectedInteger(Option<Lex>),
    ExpectedType(Option<Lex>),
    ExpectedExpression(Option<Lex>),
    ExpectedDefinitionBody(Option<Lex>),
    ExpectedBitFieldMember(Option<Lex>),
    ExpectedItem(Lex),
    InvalidBitRange { msb: u64, lsb: u64 },
}

impl CompilerDisplay for ParserError {
    fn fmt(&self, sm: &SourceMap, st: &StringTable) -> Result<String, CompilerDisplayError> {
        use ParserError::*;
        Ok(match self {
            ExpectedButFound(expected, found) => format!(
                "Expected {}, but found {}",
                fmt_expected(expected, sm, st)?,
                fmt_found(found, sm, st)?
            ),
            ExpectedIdentifier(found) => {
                format!("Expected identifier, but found {}", fmt_found(found, sm, st)?)
            }
            ExpectedInteger(found) => format!(
                "Expected integer literal, but found {}",
                fmt_found(found, sm, st)?
            ),
            ExpectedType(found) => {
                format!("Expected a type, but found {}", fmt_found(found, sm, st)?)
            }
            ExpectedExpression(found) => {
                format!("Expected an expression, but found {}", fmt_found(found, sm, st)?)
            }
            ExpectedDefinitionBody(found) => format!(
                "Expected a definition body, but found {}",
                fmt_found(found, sm, st)?
            ),
            ExpectedBitFieldMember(found) => format!(
                "Expected a bitfield member, but found {}",
                fmt_found(found, sm, st)?
            ),
            ExpectedItem(found) => format!(
                "Expected a definition, extension, or declaration, but found {}",
                found.fmt(sm, st)?
            ),
            InvalidBitRange { msb, lsb } => {
                format!("Invalid bit range {}:{}", msb, lsb)
            }
        })
    }
}

fn fmt_found(
    found: &Option<Lex>,
    sm: &SourceMap,
    st: &StringTable,
) -> Result<String, CompilerDisplayError> {
    match found {
        Some(l) => l.fmt(sm, st),
        None => Ok("EOF".into()),
    }
}

fn fmt_expected(
    expected: &[Lex],
    sm: &SourceMap,
    st: &StringTable,
) -> Result<String, CompilerDisplayError> {
    let mut parts = Vec::new();
    for e in expected {
        parts.push(e.fmt(sm, st)?);
    }
    Ok(if parts.len() == 1 {
        parts.remove(0)
    } else {
        format!("one of ({})", parts.join(", "))
    })
}
