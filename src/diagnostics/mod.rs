//! User facing sinks for compiler trace events.  The compiler emits
//! [`Event`](crate::compiler::diagnostics::Event)s through a
//! [`Logger`](crate::compiler::diagnostics::Logger); the writers here turn
//! those events into console text or a JSON trace file.

mod consolewriter;
mod jsonwriter;

pub use consolewriter::ConsoleWriter;
pub use jsonwriter::{write_source_map, JsonWriter};
