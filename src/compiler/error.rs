use super::source::{SourceMap, Span};
use super::stringtable::{StringTable, StringTableError};

/// Represents all errors that are generated from within the compiler core
/// and its submodules.
///
/// This type captures the metadata which is present for every error that is
/// caused by input source code: the [`Span`] of source that the error applies
/// to.  The inner error carries the submodule specific details (lexer errors,
/// parser errors, DSL semantic errors, and so on).
#[derive(Clone, Debug, PartialEq)]
pub struct CompilerError<IE: CompilerDisplay> {
    span: Span,
    inner: IE,
}

impl<IE> CompilerError<IE>
where
    IE: CompilerDisplay,
{
    pub fn new(span: Span, inner: IE) -> Self {
        CompilerError { span, inner }
    }

    pub fn span(&self) -> Span {
        self.span
    }

    pub fn inner(&self) -> &IE {
        &self.inner
    }

    /// Deconstructs this error into its span and inner error values.
    pub fn take(self) -> (Span, IE) {
        (self.span, self.inner)
    }

    /// Converts the inner error of this error into another error type.  Used
    /// when an error from a lower stage bubbles up through a higher stage
    /// which has its own inner error type.
    pub fn map_inner<OE: CompilerDisplay, F: FnOnce(IE) -> OE>(self, f: F) -> CompilerError<OE> {
        CompilerError {
            span: self.span,
            inner: f(self.inner),
        }
    }

    /// Render this error as a user facing diagnostic message.  The message
    /// includes the file, line, and column of the offending source code along
    /// with an excerpt of the source itself.
    pub fn format(&self, sm: &SourceMap, st: &StringTable) -> Result<String, CompilerDisplayError> {
        let msg = self.inner.fmt(sm, st)?;
        match sm.address_of(self.span.low()) {
            Some(addr) => {
                let excerpt = sm.excerpt(self.span);
                Ok(format!("{}: {}\n{}", addr, msg, excerpt))
            }
            None => Ok(msg),
        }
    }
}

/// Errors that can occur while formatting an error message for display to
/// the user.  These are distinct from compilation errors: a display error
/// means the compiler itself has lost track of a string or a span and is a
/// bug, not a problem with the input.
#[derive(Clone, Debug, PartialEq)]
pub enum CompilerDisplayError {
    StringIdNotFound,
    SpanOutOfRange,
}

impl From<StringTableError> for CompilerDisplayError {
    fn from(ste: StringTableError) -> Self {
        match ste {
            StringTableError::NotFound => Self::StringIdNotFound,
        }
    }
}

impl std::fmt::Display for CompilerDisplayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompilerDisplayError::StringIdNotFound => f.write_str("StringId not found"),
            CompilerDisplayError::SpanOutOfRange => f.write_str("Span out of range"),
        }
    }
}

/// Implemented by any value which needs [`StringId`](super::stringtable::StringId)s
/// or [`Span`]s converted to human readable text when rendered for the user.
pub trait CompilerDisplay {
    fn fmt(&self, sm: &SourceMap, st: &StringTable) -> Result<String, CompilerDisplayError>;
}

impl<IE: CompilerDisplay> CompilerDisplay for CompilerError<IE> {
    fn fmt(&self, sm: &SourceMap, st: &StringTable) -> Result<String, CompilerDisplayError> {
        self.format(sm, st)
    }
}
