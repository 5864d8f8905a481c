use crate::compiler::{CompilerDisplay, CompilerDisplayError, SourceMap};

/// Errors which can be encountered while tokenizing a compilation unit
#[derive(Clone, Debug, PartialEq)]
pub enum LexerError {
    Locked(Option<char>),
    InvalidInteger,
    UnknownBase,
}

impl CompilerDisplay for LexerError {
    fn fmt(&self, _: &SourceMap, _: &crate::StringTable) -> Result<String, CompilerDisplayError> {
        use LexerError::*;
        let msg = match self {
            Locked(None) => "Lexer locked on EOF".into(),
            Locked(Some(c)) => format!("Lexer locked on {}", c),
            InvalidInteger => "Invalid integer literal".into(),
            UnknownBase => "Unknown base for integer literal".into(),
        };

        Ok(msg)
    }
}
