use crate::compiler::{CompilerDisplay, Span};

use super::{Writable, Writer};

pub mod event_id {
    use std::{cell::RefCell, fmt::Display, rc::Rc};

    use crate::compiler::diagnostics::{Writable, Writer};

    /// Identifies a single [`Event`](super::Event) within one compilation.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct EventId(u64);

    impl Display for EventId {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{}", self.0)
        }
    }

    impl Writable for EventId {
        fn write(&self, w: &dyn Writer) {
            w.write_u64(self.0)
        }
    }

    /// Tracks the events which are currently in flight so that an event
    /// created while another event is being processed can record which event
    /// caused it.  Clones share the same id counter and stack, so a stage can
    /// hand a copy to its helpers and every event in the compilation still
    /// gets a distinct id.
    #[derive(Clone, Debug)]
    pub struct EventStack {
        inner: Rc<RefCell<StackData>>,
    }

    #[derive(Debug)]
    struct StackData {
        next_id: u64,
        stack: Vec<EventId>,
    }

    impl EventStack {
        pub fn new() -> EventStack {
            EventStack {
                inner: Rc::new(RefCell::new(StackData {
                    next_id: 1,
                    stack: Vec::new(),
                })),
            }
        }

        /// Allocate an id for a new event.
        pub fn next_id(&self) -> EventId {
            let mut data = self.inner.borrow_mut();
            let id = EventId(data.next_id);
            data.next_id += 1;
            id
        }

        /// The event which is currently being processed, if any.  Used as the
        /// parent id of any event created before the matching [`EventStack::exit`].
        pub fn top(&self) -> Option<EventId> {
            self.inner.borrow().stack.last().copied()
        }

        /// Mark `id` as in flight.  Events created until the matching
        /// [`EventStack::exit`] will record `id` as their parent.
        pub fn enter(&self, id: EventId) {
            self.inner.borrow_mut().stack.push(id);
        }

        /// Mark the most recently entered event as done.
        pub fn exit(&self) {
            self.inner.borrow_mut().stack.pop();
        }
    }

    impl Default for EventStack {
        fn default() -> Self {
            Self::new()
        }
    }
}

use event_id::{EventId, EventStack};

/// One unit of work done by a compiler stage: a token lexed, an item parsed,
/// a definition laid out.  Carries the [`Span`] of source code the work
/// applied to and either a short description of the result or the error the
/// work produced.
pub struct Event<'e> {
    pub id: EventId,
    pub parent: Option<EventId>,
    pub stage: &'static str,
    pub span: Span,
    pub msg: Result<&'e str, &'e dyn CompilerDisplay>,
}

impl<'e> Event<'e> {
    pub fn new(
        stage: &'static str,
        span: Span,
        msg: Result<&'e str, &'e dyn CompilerDisplay>,
        stack: &EventStack,
    ) -> Event<'e> {
        Event {
            id: stack.next_id(),
            parent: stack.top(),
            stage,
            span,
            msg,
        }
    }
}

impl<'e> Writable for Event<'e> {
    fn write(&self, w: &dyn Writer) {
        w.write_field("id", &self.id);
        if let Some(parent) = self.parent {
            w.write_field("parent", &parent);
        }
        w.write_field("stage", &self.stage);
        w.write_span("source", self.span);
        match self.msg {
            Ok(msg) => w.write_field("ok", &msg),
            Err(err) => w.write_field("error", &err),
        }
    }
}
