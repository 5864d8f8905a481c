//! Tools used for collecting contextual data about what the compiler is
//! doing and when it is doing it.  Each stage of the pipeline emits an
//! [`Event`] for every unit of work it performs (a token lexed, an item
//! parsed, and so on) and the [`Logger`] routes those events to a set of
//! [`Writer`] sinks chosen by the user.
//!
//! For a compiler developer this data shows what the compiler did with a
//! specific piece of source code and in what order.  For a user it shows how
//! their type definitions became the C that was emitted.
use crate::StringId;

use super::{CompilerDisplay, Span};

mod event;
mod logger;
mod tests;

pub use event::event_id::{EventId, EventStack};
pub use event::Event;
pub use logger::Logger;

/// Defines a way for the [`Logger`] to write events that are emitted by the
/// compiler to the user.
pub trait Writer {
    /// Write a Span to the current event
    fn write_span(&self, field: &str, span: Span);

    /// Write a field with a [`Writable`] value to the current event
    fn write_field(&self, label: &str, s: &dyn Writable);

    /// Write a [`Writable`] value to the current event
    fn write(&self, s: &dyn Writable);

    /// Write a string value to the current event
    fn write_str(&self, s: &str);

    /// Write a [`StringId`] value to the current event
    fn write_stringid(&self, s: StringId);

    /// Write a [`u64`] value to the current event
    fn write_u64(&self, u: u64);

    /// Write text to the current event
    fn write_text(&self, s: &str);

    /// Writes an error message
    fn write_error(&self, e: &dyn CompilerDisplay);

    /// Start writing a new compiler event.  This should emit any tokens which
    /// signal the start of an event.
    fn start_event(&self);

    /// Stop writing the current compiler event.  This should emit any tokens
    /// which are needed to signal the end of an event.
    fn stop_event(&self);
}

/// Define how a type will be written to an Event log by a [`Writer`].
pub trait Writable {
    /// Uses the given [`Writer`] to write the data in an instance of this type
    /// to an output target.
    fn write(&self, w: &dyn Writer);
}

impl Writable for &str {
    fn write(&self, w: &dyn Writer) {
        w.write_str(self)
    }
}

impl Writable for String {
    fn write(&self, w: &dyn Writer) {
        w.write_str(self)
    }
}

impl Writable for &String {
    fn write(&self, w: &dyn Writer) {
        w.write_str(self)
    }
}

impl Writable for StringId {
    fn write(&self, w: &dyn Writer) {
        w.write_stringid(*self)
    }
}

impl Writable for u64 {
    fn write(&self, w: &dyn Writer) {
        w.write_u64(*self)
    }
}

impl<'a> Writable for &'a dyn CompilerDisplay {
    fn write(&self, w: &dyn Writer) {
        w.write_error(*self)
    }
}
