#[cfg(test)]
mod tests {
    use crate::compiler::diagnostics::Logger;
    use crate::compiler::lexer::tokens::{Lex, Token};
    use crate::compiler::lexer::{LexerError, LexerResult};
    use crate::compiler::source::{Offset, Span};
    use crate::StringTable;
    use Lex::*;

    use super::super::lexer::Lexer;

    fn tokenize(text: &str, st: &StringTable) -> Vec<LexerResult<Token>> {
        let logger = Logger::new();
        let mut lexer = Lexer::new(text, Offset::new(0), st, &logger);
        lexer.tokenize()
    }

    fn span(low: u32, high: u32) -> Span {
        Span::new(Offset::new(low), Offset::new(high))
    }

    #[test]
    fn test_integer() {
        let st = StringTable::new();
        let tokens = tokenize("5", &st);
        assert_eq!(tokens.len(), 1);
        let token = tokens[0].clone().expect("Expected valid token");
        assert_eq!(token, Token::new(Integer(5), span(0, 1)));
    }

    #[test]
    fn test_integer_hex() {
        let st = StringTable::new();
        let tokens = tokenize("0x1f", &st);
        let token = tokens[0].clone().expect("Expected valid token");
        assert_eq!(token, Token::new(Integer(31), span(0, 4)));
    }

    #[test]
    fn test_integer_binary() {
        let st = StringTable::new();
        let tokens = tokenize("0b101", &st);
        let token = tokens[0].clone().expect("Expected valid token");
        assert_eq!(token, Token::new(Integer(5), span(0, 5)));
    }

    #[test]
    fn test_integer_unsigned_suffix() {
        let st = StringTable::new();
        let tokens = tokenize("10U", &st);
        let token = tokens[0].clone().expect("Expected valid token");
        assert_eq!(token, Token::new(Integer(10), span(0, 3)));
    }

    #[test]
    fn test_integer_octal_is_rejected() {
        let st = StringTable::new();
        let tokens = tokenize("017", &st);
        let err = tokens[0].clone().expect_err("Expected lexer error");
        assert_eq!(*err.inner(), LexerError::UnknownBase);
    }

    #[test]
    fn test_integer_with_trailing_garbage() {
        let st = StringTable::new();
        let tokens = tokenize("12xyz", &st);
        let err = tokens[0].clone().expect_err("Expected lexer error");
        assert_eq!(*err.inner(), LexerError::InvalidInteger);
    }

    #[test]
    fn test_keyword_vs_identifier() {
        let st = StringTable::new();
        let tokens = tokenize("define defined", &st);
        assert_eq!(tokens.len(), 2);
        assert_eq!(
            tokens[0].clone().unwrap(),
            Token::new(Define, span(0, 6))
        );
        let id = st.find("defined").unwrap();
        assert_eq!(
            tokens[1].clone().unwrap(),
            Token::new(Identifier(id), span(7, 14))
        );
    }

    #[test]
    fn test_constant_wins_over_const() {
        let st = StringTable::new();
        let tokens = tokenize("constant const", &st);
        assert_eq!(tokens[0].clone().unwrap().sym, Constant);
        assert_eq!(tokens[1].clone().unwrap().sym, Const);
    }

    #[test]
    fn test_primitive_vs_identifier() {
        let st = StringTable::new();
        let tokens = tokenize("uint32 uint32x", &st);
        let prim = st.find("uint32").unwrap();
        let id = st.find("uint32x").unwrap();
        assert_eq!(tokens[0].clone().unwrap().sym, Primitive(prim));
        assert_eq!(tokens[1].clone().unwrap().sym, Identifier(id));
    }

    #[test]
    fn test_sizeof_is_not_the_size_primitive() {
        let st = StringTable::new();
        let tokens = tokenize("sizeof(size)", &st);
        assert_eq!(tokens[0].clone().unwrap().sym, SizeOf);
        assert_eq!(tokens[1].clone().unwrap().sym, LParen);
        let size = st.find("size").unwrap();
        assert_eq!(tokens[2].clone().unwrap().sym, Primitive(size));
        assert_eq!(tokens[3].clone().unwrap().sym, RParen);
    }

    #[test]
    fn test_two_char_operators() {
        let st = StringTable::new();
        let tokens = tokenize("<< <= < ==", &st);
        let syms: Vec<Lex> = tokens.into_iter().map(|t| t.unwrap().sym).collect();
        assert_eq!(syms, vec![Shl, LsEq, Ls, Eq]);
    }

    #[test]
    fn test_bitfield_header() {
        let st = StringTable::new();
        let tokens = tokenize("bitfield<64>", &st);
        let syms: Vec<Lex> = tokens.into_iter().map(|t| t.unwrap().sym).collect();
        assert_eq!(syms, vec![BitField, Ls, Integer(64), Gr]);
    }

    #[test]
    fn test_declaration_line() {
        let st = StringTable::new();
        let tokens = tokenize("ticks uint64;", &st);
        let ticks = st.find("ticks").unwrap();
        let uint64 = st.find("uint64").unwrap();
        let syms: Vec<Lex> = tokens.into_iter().map(|t| t.unwrap().sym).collect();
        assert_eq!(syms, vec![Identifier(ticks), Primitive(uint64), Semicolon]);
    }

    #[test]
    fn test_line_comment_is_skipped() {
        let st = StringTable::new();
        let tokens = tokenize("foo // all of this vanishes\nbar", &st);
        assert_eq!(tokens.len(), 2);
        let bar = st.find("bar").unwrap();
        assert_eq!(tokens[1].clone().unwrap().sym, Identifier(bar));
    }

    #[test]
    fn test_block_comment_is_skipped() {
        let st = StringTable::new();
        let tokens = tokenize("/* gone */ foo", &st);
        assert_eq!(tokens.len(), 1);
        let foo = st.find("foo").unwrap();
        assert_eq!(tokens[0].clone().unwrap().sym, Identifier(foo));
    }

    #[test]
    fn test_locked_on_unknown_character() {
        let st = StringTable::new();
        let tokens = tokenize("$", &st);
        let err = tokens[0].clone().expect_err("Expected lexer error");
        assert_eq!(*err.inner(), LexerError::Locked(Some('$')));
    }

    #[test]
    fn test_offsets_start_at_base() {
        let st = StringTable::new();
        let logger = Logger::new();
        let mut lexer = Lexer::new("x", Offset::new(100), &st, &logger);
        let tokens = lexer.tokenize();
        let token = tokens[0].clone().unwrap();
        assert_eq!(token.span, span(100, 101));
    }
}
