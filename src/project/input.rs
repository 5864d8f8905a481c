use std::path::Path;

use crate::compiler::ast::{build, AstError};
use crate::compiler::diagnostics::Logger;
use crate::compiler::ir::TopLevel;
use crate::compiler::lexer::lexer::Lexer;
use crate::compiler::lexer::tokens::Token;
use crate::compiler::lexer::LexerError;
use crate::compiler::parser::{parse, ParserError};
use crate::compiler::{
    CompilerDisplay, CompilerError, SourceMap, SourceMapError,
};
use crate::StringTable;

/// An error from one of the front end stages, carrying every diagnostic the
/// failing stage produced.  The lexer reports all of its errors across all
/// input units at once; the later stages stop at the first error.
#[derive(Debug)]
pub enum FrontError {
    Lexer(Vec<CompilerError<LexerError>>),
    Parser(CompilerError<ParserError>),
    Build(CompilerError<AstError>),
}

impl FrontError {
    /// Renders every diagnostic carried by this error for display to the
    /// user.
    pub fn render(&self, sm: &SourceMap, st: &StringTable) -> Vec<String> {
        match self {
            FrontError::Lexer(errs) => errs.iter().map(|e| render_one(e, sm, st)).collect(),
            FrontError::Parser(e) => vec![render_one(e, sm, st)],
            FrontError::Build(e) => vec![render_one(e, sm, st)],
        }
    }
}

fn render_one<IE: CompilerDisplay>(
    e: &CompilerError<IE>,
    sm: &SourceMap,
    st: &StringTable,
) -> String {
    e.format(sm, st)
        .unwrap_or_else(|d| format!("failed to render diagnostic: {}", d))
}

/// Reads every input file into the [`SourceMap`], assigning each a range of
/// the global offset space.
pub fn load_sources<P: AsRef<Path>>(
    inputs: &[P],
    sm: &mut SourceMap,
) -> Result<(), SourceMapError> {
    for input in inputs {
        sm.add_file(input.as_ref().to_path_buf())?;
    }
    Ok(())
}

/// Runs the front end over every unit in the [`SourceMap`] and merges the
/// results into a single unresolved graph.
///
/// Each unit is built into its own [`TopLevel`] and then appended onto the
/// merged graph, so references between files stay unresolved here and are
/// linked later by the resolver over the whole graph at once.
pub fn parse_sources(
    sm: &SourceMap,
    strings: &StringTable,
    logger: &Logger,
) -> Result<TopLevel, FrontError> {
    let token_sets = tokenize_units(sm, strings, logger)?;

    let mut merged = TopLevel::new();
    for tokens in token_sets {
        let nodes = parse(&tokens, logger).map_err(FrontError::Parser)?;
        let mut top = TopLevel::new();
        build(nodes, &mut top, strings).map_err(FrontError::Build)?;
        merged.merge(top);
    }
    Ok(merged)
}

/// Tokenizes every source unit.  Lexing errors do not stop the lexer, so all
/// of them across all units are gathered before the front end gives up.
fn tokenize_units(
    sm: &SourceMap,
    strings: &StringTable,
    logger: &Logger,
) -> Result<Vec<Vec<Token>>, FrontError> {
    let mut sets = Vec::new();
    let mut errors = Vec::new();

    for idx in 0..sm.len() {
        let entry = match sm.get(idx) {
            Some(e) => e,
            None => break,
        };
        let mut lexer = Lexer::new(entry.text(), entry.low(), strings, logger);
        let mut tokens = Vec::new();
        for t in lexer.tokenize() {
            match t {
                Ok(tok) => tokens.push(tok),
                Err(e) => errors.push(e),
            }
        }
        sets.push(tokens);
    }

    if errors.is_empty() {
        Ok(sets)
    } else {
        Err(FrontError::Lexer(errors))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::resolve::resolve;

    #[test]
    fn units_merge_into_one_graph() {
        let mut sm = SourceMap::new();
        sm.add_string("define point structure { x uint32; };", "/a.tc".into())
            .unwrap();
        sm.add_string(
            "define s structure { m structure point; };",
            "/b.tc".into(),
        )
        .unwrap();

        let st = StringTable::new();
        let logger = Logger::new();
        let top = parse_sources(&sm, &st, &logger).unwrap();

        assert_eq!(top.defs().count(), 2);
    }

    #[test]
    fn cross_unit_references_resolve_after_merge() {
        let mut sm = SourceMap::new();
        sm.add_string("define s structure { m structure point; };", "/a.tc".into())
            .unwrap();
        sm.add_string("define point structure { x uint32; };", "/b.tc".into())
            .unwrap();

        let st = StringTable::new();
        let logger = Logger::new();
        let mut top = parse_sources(&sm, &st, &logger).unwrap();

        assert!(resolve(&mut top, &st).is_ok());
    }

    #[test]
    fn lexer_errors_gather_across_units() {
        let mut sm = SourceMap::new();
        sm.add_string("define a constant = 0xzz;", "/a.tc".into())
            .unwrap();
        sm.add_string("define b constant = 08f;", "/b.tc".into())
            .unwrap();

        let st = StringTable::new();
        let logger = Logger::new();
        match parse_sources(&sm, &st, &logger) {
            Err(FrontError::Lexer(errs)) => assert!(errs.len() >= 2),
            other => panic!("expected lexer errors, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn missing_input_file_reports_io_error() {
        let mut sm = SourceMap::new();
        let err = load_sources(&["/no/such/file.tc"], &mut sm).unwrap_err();
        assert!(matches!(err, SourceMapError::Io(_)));
    }
}
