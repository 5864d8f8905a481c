#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use crate::compiler::{
        diagnostics::{Event, EventStack, Logger, Writer},
        CompilerDisplay, CompilerDisplayError, SourceMap, Span,
    };
    use crate::StringTable;

    #[test]
    fn test_write_event() {
        let mut logger = Logger::new();
        let writer = TestWriter::new();
        logger.add_writer(&writer);

        logger.enable();

        let stack = EventStack::new();
        let evt = Event::new("test", Span::zero(), Ok("Hello"), &stack);

        logger.write(evt);
        assert_eq!(
            "{id: 1, stage: \"test\", source: [0,0], ok: \"Hello\", }",
            *writer.buf.borrow()
        );
    }

    #[test]
    fn test_disable() {
        let mut logger = Logger::new();
        let writer = TestWriter::new();
        logger.add_writer(&writer);

        logger.disable();
        let stack = EventStack::new();
        let evt = Event::new("test", Span::zero(), Ok("Hello"), &stack);
        logger.write(evt);
        assert_eq!("", *writer.buf.borrow());
    }

    #[test]
    fn test_enable() {
        let mut logger = Logger::new();
        let writer = TestWriter::new();
        logger.add_writer(&writer);

        // First disable the logger and test that writes are blocked
        logger.disable();
        let stack = EventStack::new();
        let evt = Event::new("test", Span::zero(), Ok("Hello"), &stack);
        logger.write(evt);
        assert_eq!("", *writer.buf.borrow());

        // Then enable the logger and confirm that writes are now happening
        logger.enable();
        let evt = Event::new("test", Span::zero(), Ok("Hello"), &stack);
        logger.write(evt);
        assert_eq!(
            "{id: 2, stage: \"test\", source: [0,0], ok: \"Hello\", }",
            *writer.buf.borrow()
        );
    }

    #[test]
    fn test_error_event() {
        let mut logger = Logger::new();
        let writer = TestWriter::new();
        logger.add_writer(&writer);

        let stack = EventStack::new();
        let err = TestError;
        let evt = Event::new("test", Span::zero(), Err(&err), &stack);
        logger.write(evt);
        assert_eq!(
            "{id: 1, stage: \"test\", source: [0,0], error: went wrong, }",
            *writer.buf.borrow()
        );
    }

    #[test]
    fn test_nested_events_record_parent() {
        let stack = EventStack::new();

        let outer = Event::new("test", Span::zero(), Ok("outer"), &stack);
        assert_eq!(outer.parent, None);

        stack.enter(outer.id);
        let inner = Event::new("test", Span::zero(), Ok("inner"), &stack);
        assert_eq!(inner.parent, Some(outer.id));
        stack.exit();

        let after = Event::new("test", Span::zero(), Ok("after"), &stack);
        assert_eq!(after.parent, None);
        assert_ne!(after.id, inner.id);
    }

    struct TestError;

    impl CompilerDisplay for TestError {
        fn fmt(&self, _: &SourceMap, _: &StringTable) -> Result<String, CompilerDisplayError> {
            Ok("went wrong".into())
        }
    }

    /// Writer to be used for unit testing
    struct TestWriter {
        buf: RefCell<String>,
    }

    impl TestWriter {
        pub fn new() -> TestWriter {
            TestWriter {
                buf: RefCell::new(String::new()),
            }
        }
    }

    impl Writer for TestWriter {
        fn write_span(&self, field: &str, span: crate::compiler::Span) {
            self.buf.borrow_mut().push_str(&format!(
                "{}: [{},{}], ",
                field,
                span.low(),
                span.high()
            ));
        }

        fn start_event(&self) {
            self.buf.borrow_mut().push('{');
        }

        fn stop_event(&self) {
            self.buf.borrow_mut().push('}');
        }

        fn write_str(&self, s: &str) {
            self.buf.borrow_mut().push_str(&format!("\"{}\"", s));
        }

        fn write_field(&self, label: &str, s: &dyn crate::compiler::diagnostics::Writable) {
            self.buf.borrow_mut().push_str(&format!("{}: ", label));
            s.write(self);
            self.buf.borrow_mut().push_str(", ");
        }

        fn write_stringid(&self, _s: crate::StringId) {
            unimplemented!()
        }

        fn write(&self, s: &dyn crate::compiler::diagnostics::Writable) {
            s.write(self);
        }

        fn write_text(&self, s: &str) {
            self.buf.borrow_mut().push_str(s);
        }

        fn write_u64(&self, u: u64) {
            self.buf.borrow_mut().push_str(&format!("{}", u));
        }

        fn write_error(&self, e: &dyn crate::compiler::CompilerDisplay) {
            let sm = SourceMap::new();
            let st = StringTable::new();
            let msg = e.fmt(&sm, &st).unwrap();
            self.buf.borrow_mut().push_str(&msg);
        }
    }
}
