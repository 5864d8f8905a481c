use super::ParserError;
use crate::compiler::diagnostics::{Event, EventStack, Logger};
use crate::compiler::lexer::tokens::{Lex, Token};
use crate::compiler::{CompilerDisplay, CompilerError, Span};
use crate::StringId;

/// A cursor over the token vector with single token lookahead.  Failed
/// `next_must_be` calls are recorded as parser events before the error is
/// returned to the caller.
pub struct TokenStream<'a> {
    tokens: &'a Vec<Token>,
    index: usize,

    /// Covers every token in the stream; used to place EOF errors just past
    /// the last token.
    span: Span,

    logger: &'a Logger<'a>,
    event_stack: EventStack,
}

impl<'a> TokenStream<'a> {
    /// Returns `None` when there are no tokens to parse.
    pub fn new(tokens: &'a Vec<Token>, logger: &'a Logger<'a>) -> Option<TokenStream<'a>> {
        let first = tokens.first()?;
        let last = tokens.last()?;
        Some(TokenStream {
            tokens,
            index: 0,
            span: Span::cover(first.span, last.span),
            logger,
            event_stack: EventStack::new(),
        })
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Record a new parser event
    pub fn record<'e>(&self, span: Span, result: Result<&'e str, &'e CompilerError<ParserError>>) {
        let result = result.map_err(|e| e as &dyn CompilerDisplay);
        let evt = Event::new("parser", span, result, &self.event_stack);
        self.logger.write(evt);
    }

    pub fn next(&mut self) -> Option<Token> {
        if self.index >= self.tokens.len() {
            None
        } else {
            self.index += 1;
            Some(self.tokens[self.index - 1])
        }
    }

    pub fn next_if(&mut self, test: &Lex) -> Option<Token> {
        if self.test_if(test) {
            self.next()
        } else {
            None
        }
    }

    pub fn next_if_id(&mut self) -> Option<(StringId, Span)> {
        match self.next_if(&Lex::Identifier(StringId::new())) {
            Some(Token {
                span,
                sym: Lex::Identifier(id),
            }) => Some((id, span)),
            _ => None,
        }
    }

    pub fn next_must_be(&mut self, test: &Lex) -> Result<Token, CompilerError<ParserError>> {
        let err = match self.peek() {
            Some(t) => {
                let (span, found) = (t.span, t.sym);
                match self.next_if(test) {
                    Some(t) => return Ok(t),
                    None => CompilerError::new(
                        span,
                        ParserError::ExpectedButFound(vec![*test], Some(found)),
                    ),
                }
            }
            None => CompilerError::new(
                self.eof_span(),
                ParserError::ExpectedButFound(vec![*test], None),
            ),
        };

        self.record(err.span(), Err(&err));
        Err(err)
    }

    pub fn next_if_one_of(&mut self, set: Vec<Lex>) -> Option<Token> {
        if self.test_if_one_of(set) {
            self.next()
        } else {
            None
        }
    }

    pub fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.index)
    }

    /// The span and symbol of the next token, or the EOF span when the
    /// stream is exhausted.  Used to build errors for a token which does not
    /// fit any production.
    pub fn peek_or_eof(&self) -> (Span, Option<Lex>) {
        match self.peek() {
            Some(t) => (t.span, Some(t.sym)),
            None => (self.eof_span(), None),
        }
    }

    pub fn test_if(&self, test: &Lex) -> bool {
        match self.peek() {
            None => false,
            Some(t) => t.token_eq(test),
        }
    }

    pub fn test_if_one_of(&self, set: Vec<Lex>) -> bool {
        match self.peek() {
            None => false,
            Some(t) => set.iter().any(|l| t.token_eq(l)),
        }
    }

    fn eof_span(&self) -> Span {
        Span::new(self.span.high(), self.span.high())
    }
}
