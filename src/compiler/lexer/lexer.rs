use crate::compiler::diagnostics::{Event, EventStack, Logger};
use crate::compiler::source::Offset;
use crate::compiler::{CompilerDisplay, CompilerError, Span};
use crate::err;
use crate::{StringId, StringTable};

use super::LexerResult;
use super::{
    tokens::{Lex, Token},
    LexerError,
};
use Lex::*;

/// A speculative cursor over the character stream of a [`Lexer`].  A branch
/// advances independently of its source lexer; merging the branch commits
/// everything it consumed as a single token, while dropping the branch leaves
/// the lexer untouched.
struct LexerBranch<'a, 'st> {
    lexer: &'a mut Lexer<'st>,
    index: usize,
}

impl<'a, 'st> LexerBranch<'a, 'st> {
    fn from(l: &'a mut Lexer<'st>) -> LexerBranch<'a, 'st> {
        LexerBranch {
            index: l.index,
            lexer: l,
        }
    }

    /// Merges this branch back into its source lexer, accepting the branch
    /// cursor as the new lexer position.  Returns the text that was consumed
    /// between the two cursors, interned, along with its span.
    fn merge(mut self) -> Option<(StringId, Span)> {
        self.cut().map(|cut| {
            self.lexer.index = self.index;
            cut
        })
    }

    /// Cuts the text between the lexer cursor and the branch cursor without
    /// committing the branch position back to the lexer.  That must be done
    /// with `merge`.
    fn cut(&mut self) -> Option<(StringId, Span)> {
        let start = self.lexer.index;
        let stop = self.index;
        let s: String = self.lexer.chars[start..stop].iter().collect();

        if s.is_empty() {
            None
        } else {
            let low = self.lexer.offsets[start];
            let high = if stop < self.lexer.chars.len() {
                self.lexer.offsets[stop]
            } else {
                self.lexer.end
            };

            Some((self.lexer.string_table.insert(s), Span::new(low, high)))
        }
    }

    /// Advances the cursor one character and returns the character that was
    /// pointed to by the cursor before the advance.  Returns None if the
    /// cursor was already at the end of the stream.
    fn next(&mut self) -> Option<char> {
        if self.index < self.lexer.chars.len() {
            let c = self.lexer.chars[self.index];
            self.index += 1;
            Some(c)
        } else {
            None
        }
    }

    /// Will advance the cursor if the stream after the cursor starts with the
    /// given test string.  If the remaining stream does not start with the
    /// test string then the cursor is not advanced.
    fn next_if_word(&mut self, t: &str) -> bool {
        if self.peek_ifn(t) {
            self.index += t.chars().count();
            true
        } else {
            false
        }
    }

    /// Tries each word in order and advances the cursor over the first one
    /// that matches.  Words which share a prefix must be listed longest
    /// first.
    fn next_if_one_of<'s>(&mut self, words: &[&'s str]) -> Option<&'s str> {
        for w in words {
            if self.next_if_word(w) {
                return Some(w);
            }
        }

        None
    }

    /// Returns the character pointed at by the cursor which is the next
    /// character in the stream.
    fn peek(&self) -> Option<char> {
        self.lexer.chars.get(self.index).copied()
    }

    /// Checks if the character stream from the current cursor starts with
    /// the given test string, without advancing the cursor.
    fn peek_ifn(&self, t: &str) -> bool {
        let mut idx = self.index;
        for tc in t.chars() {
            match self.lexer.chars.get(idx) {
                Some(c) if *c == tc => idx += 1,
                _ => return false,
            }
        }
        true
    }
}

pub struct Lexer<'a> {
    /// The characters of one source unit.
    chars: Vec<char>,

    /// Global offset of each character in `chars`.
    offsets: Vec<Offset>,

    /// Global offset just past the last character of the source unit.
    end: Offset,

    index: usize,
    string_table: &'a StringTable,
    logger: &'a Logger<'a>,
    event_stack: EventStack,
}

impl<'a> Lexer<'a> {
    /// Creates a lexer over one source unit.  `base` is the global offset
    /// assigned to the first character of `text` by the
    /// [`SourceMap`](crate::compiler::SourceMap).
    pub fn new(
        text: &str,
        base: Offset,
        string_table: &'a StringTable,
        logger: &'a Logger<'a>,
    ) -> Lexer<'a> {
        let mut chars = Vec::new();
        let mut offsets = Vec::new();
        for (pos, c) in text.char_indices() {
            chars.push(c);
            offsets.push(Offset::new(base.as_u32() + pos as u32));
        }

        Lexer {
            chars,
            offsets,
            end: Offset::new(base.as_u32() + text.len() as u32),
            index: 0,
            string_table,
            logger,
            event_stack: EventStack::new(),
        }
    }

    /// Record a new lexer event
    fn record<'e>(&self, span: Span, result: Result<&'e str, &'e CompilerError<LexerError>>) {
        let result = result.map_err(|e| e as &dyn CompilerDisplay);
        let evt = Event::new("lexer", span, result, &self.event_stack);
        self.logger.write(evt);
    }

    /// Converts the source text into a vector of tokens.
    pub fn tokenize(&mut self) -> Vec<LexerResult<Token>> {
        let mut tokens = vec![];

        while self.index < self.chars.len() {
            // Consume any whitespace before attempting to parse the next token
            self.consume_whitespace();

            // Record the current index position, so that we can see if the
            // lexer has advanced
            let prev_index = self.index;
            if self.index >= self.chars.len() {
                break;
            }

            // Skip over any comments in the code
            self.consume_line_comment();
            self.consume_block_comment();

            // Parse the next token
            match self.next_token() {
                Ok(Some(t)) => tokens.push(Ok(t)),
                Ok(None) => (),
                Err(msg) => tokens.push(Err(msg)),
            }

            // Can no longer consume the input text
            if prev_index == self.index {
                tokens.push(err!(
                    self.current_char_span().unwrap(), // If there is no Span then something very bad has happened
                    LexerError::Locked(self.current_char())
                ));
                break;
            }
        }

        tokens
    }

    /// Attempt to parse the token which immediately follows from where the
    /// lexer cursor is currently pointing.
    fn next_token(&mut self) -> LexerResult<Option<Token>> {
        self.consume_primitive()
            .transpose()
            .or_else(|| self.consume_keyword().transpose())
            .or_else(|| self.consume_integer().transpose())
            .or_else(|| self.consume_identifier().transpose())
            .or_else(|| self.consume_operator().transpose())
            .transpose()
    }

    fn consume_whitespace(&mut self) {
        while self.index < self.chars.len() && self.chars[self.index].is_whitespace() {
            self.index += 1;
        }
    }

    fn consume_line_comment(&mut self) {
        let mut branch = LexerBranch::from(self);
        if branch.next_if_word("//") {
            while let Some(c) = branch.next() {
                if c == '\n' {
                    break;
                }
            }

            if let Some((_, span)) = branch.merge() {
                self.record(span, Ok("Line Comment"));
            }
        }
    }

    fn consume_block_comment(&mut self) {
        let mut branch = LexerBranch::from(self);
        if branch.next_if_word("/*") {
            while !branch.next_if_word("*/") {
                if branch.next().is_none() {
                    break;
                }
            }

            if let Some((_, span)) = branch.merge() {
                self.record(span, Ok("Block Comment"));
            }
        }
    }

    fn consume_integer(&mut self) -> LexerResult<Option<Token>> {
        let mut branch = LexerBranch::from(self);

        if !branch.peek().map_or(false, |c| c.is_ascii_digit()) {
            return Ok(None);
        }

        // Consume the whole alphanumeric run.  Base prefixes and hex digits
        // mean letters are legal here; anything malformed is rejected when
        // the run is parsed below.
        while branch.peek().map_or(false, |c| c.is_ascii_alphanumeric()) {
            branch.next();
        }

        let (word, span) = match branch.merge() {
            Some(cut) => cut,
            None => return Ok(None),
        };

        // The literal must run up to a delimiter, otherwise `10_x` would lex
        // as two tokens.
        if !self.current_char().map(Self::is_delimiter).unwrap_or(true) {
            return err!(span, LexerError::InvalidInteger).map_err(|err| {
                self.record(err.span(), Err(&err));
                err
            });
        }

        let text = self.string_table.get(word).unwrap();
        Self::create_int_literal(span, &text)
            .map(|ok| {
                ok.as_ref().map(|token| {
                    self.record(token.span, Ok("Integer"));
                });
                ok
            })
            .map_err(|err| {
                self.record(err.span(), Err(&err));
                err
            })
    }

    /// Parses the text of an integer literal.  Supports decimal, `0x` hex,
    /// and `0b` binary with an optional `u` suffix.  A leading zero followed
    /// by more digits is rejected rather than read as octal.
    fn create_int_literal(span: Span, text: &str) -> LexerResult<Option<Token>> {
        let digits = text
            .strip_suffix(|c| c == 'u' || c == 'U')
            .unwrap_or(text);

        let value = if let Some(hex) = digits
            .strip_prefix("0x")
            .or_else(|| digits.strip_prefix("0X"))
        {
            u64::from_str_radix(hex, 16)
        } else if let Some(bin) = digits
            .strip_prefix("0b")
            .or_else(|| digits.strip_prefix("0B"))
        {
            u64::from_str_radix(bin, 2)
        } else if digits.len() > 1 && digits.starts_with('0') {
            return err!(span, LexerError::UnknownBase);
        } else {
            digits.parse::<u64>()
        };

        match value {
            Ok(v) => Ok(Some(Token::new(Integer(v), span))),
            Err(_) => err!(span, LexerError::InvalidInteger),
        }
    }

    fn consume_operator(&mut self) -> LexerResult<Option<Token>> {
        let mut branch = LexerBranch::from(self);
        let mut operators = vec![
            ("<<", Shl),
            (">>", Shr),
            ("<=", LsEq),
            (">=", GrEq),
            ("==", Eq),
            ("!=", NEq),
            ("&&", LAnd),
            ("||", LOr),
            ("(", LParen),
            (")", RParen),
            ("{", LBrace),
            ("}", RBrace),
            (";", Semicolon),
            (",", Comma),
            (":", Colon),
            ("?", Question),
            ("=", Assign),
            ("@", At),
            ("*", Mul),
            ("/", Div),
            ("%", Mod),
            ("+", Add),
            ("-", Minus),
            ("<", Ls),
            (">", Gr),
            ("&", BAnd),
            ("^", BXor),
            ("|", BOr),
            ("~", BNot),
            ("!", Not),
        ];
        operators.sort_by(|a, b| b.0.len().cmp(&a.0.len()));

        let mut token = None;
        for (op, t) in operators.iter() {
            if branch.next_if_word(op) {
                token = Some(t);
                break;
            }
        }
        Ok(token.and_then(|t| {
            branch.merge().map(|(_, span)| Token::new(*t, span))
        }))
        .map(|ok| {
            ok.as_ref().map(|token| {
                self.record(token.span, Ok("Operator"));
            });
            ok
        })
    }

    fn consume_identifier(&mut self) -> LexerResult<Option<Token>> {
        let mut branch = LexerBranch::from(self);
        if branch
            .peek()
            .map_or_else(|| false, |c| c.is_alphabetic() || c == '_')
        {
            while branch
                .peek()
                .map_or_else(|| false, |c| c.is_alphanumeric() || c == '_')
            {
                match branch.next() {
                    Some(_) => (),
                    None => break,
                }
            }
        }

        match branch.merge() {
            None => Ok(None),
            Some((id, span)) => Ok(Some(Token::new(Identifier(id), span))),
        }
        .map(|ok| {
            ok.as_ref().map(|token| {
                self.record(token.span, Ok("Identifier"));
            });
            ok
        })
    }

    fn consume_keyword(&mut self) -> LexerResult<Option<Token>> {
        let mut branch = LexerBranch::from(self);

        // `constant` must come before `const` so that the longer keyword
        // wins when both match.
        let keywords = [
            "define",
            "extend",
            "module",
            "public",
            "constant",
            "global",
            "structure",
            "union",
            "object",
            "enumeration",
            "bitfield",
            "alternative",
            "explicit",
            "noprefix",
            "array",
            "pointer",
            "auto",
            "others",
            "delete",
            "unknown",
            "const",
            "atomic",
            "packed",
            "aligned",
            "contained",
            "writeonly",
            "restrict",
            "optimized",
            "group",
            "lockable",
            "sizeof",
            "alignof",
            "minof",
            "maxof",
        ];

        Ok(match branch.next_if_one_of(&keywords) {
            Some(w) if branch.peek().map(Self::is_delimiter).unwrap_or(true) => {
                let (_, span) = match branch.merge() {
                    Some(cut) => cut,
                    None => return Ok(None),
                };

                Some(match w {
                    "define" => Token::new(Define, span),
                    "extend" => Token::new(Extend, span),
                    "module" => Token::new(Module, span),
                    "public" => Token::new(Public, span),
                    "constant" => Token::new(Constant, span),
                    "global" => Token::new(Global, span),
                    "structure" => Token::new(Structure, span),
                    "union" => Token::new(Union, span),
                    "object" => Token::new(Object, span),
                    "enumeration" => Token::new(Enumeration, span),
                    "bitfield" => Token::new(BitField, span),
                    "alternative" => Token::new(Alternative, span),
                    "explicit" => Token::new(Explicit, span),
                    "noprefix" => Token::new(NoPrefix, span),
                    "array" => Token::new(Array, span),
                    "pointer" => Token::new(Pointer, span),
                    "auto" => Token::new(Auto, span),
                    "others" => Token::new(Others, span),
                    "delete" => Token::new(Delete, span),
                    "unknown" => Token::new(Unknown, span),
                    "const" => Token::new(Const, span),
                    "atomic" => Token::new(Atomic, span),
                    "packed" => Token::new(Packed, span),
                    "aligned" => Token::new(Aligned, span),
                    "contained" => Token::new(Contained, span),
                    "writeonly" => Token::new(Writeonly, span),
                    "restrict" => Token::new(Restrict, span),
                    "optimized" => Token::new(Optimized, span),
                    "group" => Token::new(Group, span),
                    "lockable" => Token::new(Lockable, span),
                    "sizeof" => Token::new(SizeOf, span),
                    "alignof" => Token::new(AlignOf, span),
                    "minof" => Token::new(MinOf, span),
                    "maxof" => Token::new(MaxOf, span),
                    _ => panic!("Matched a keyword which does not exist: {}", w),
                })
            }
            _ => None,
        })
        .map(|ok| {
            ok.as_ref().map(|token| {
                self.record(token.span, Ok("Keyword"));
            });
            ok
        })
    }

    fn consume_primitive(&mut self) -> LexerResult<Option<Token>> {
        let mut branch = LexerBranch::from(self);

        Ok(match branch.next_if_one_of(crate::compiler::ir::PRIMITIVE_NAMES) {
            Some(_) if branch.peek().map(Self::is_delimiter).unwrap_or(true) => branch
                .merge()
                .map(|(id, span)| Token::new(Primitive(id), span)),
            _ => None,
        })
        .map(|ok| {
            ok.as_ref().map(|token| {
                self.record(token.span, Ok("Primitive"));
            });
            ok
        })
    }

    /// Returns the character that the lexer cursor is currently pointing to.
    fn current_char(&self) -> Option<char> {
        self.chars.get(self.index).copied()
    }

    /// Returns the span covered by the character the lexer cursor is
    /// currently pointing at.  If the cursor is at the end of the input text,
    /// then this will return `None`.
    fn current_char_span(&self) -> Option<Span> {
        if self.index < self.chars.len() {
            let low = self.offsets[self.index];
            let high = if self.index + 1 < self.chars.len() {
                self.offsets[self.index + 1]
            } else {
                self.end
            };

            Some(Span::new(low, high))
        } else {
            None
        }
    }

    /// Returns true if the given character is a DSL delimiter: punctuation
    /// other than `_`, or whitespace.
    fn is_delimiter(c: char) -> bool {
        (c.is_ascii_punctuation() && c != '_') || c.is_whitespace()
    }
}
