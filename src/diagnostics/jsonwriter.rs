use std::{
    cell::RefCell,
    io::{BufWriter, Write},
};

use serde_json::{json, Map, Value};

use crate::{
    compiler::{
        diagnostics::{Writable, Writer},
        SourceMap, Span,
    },
    StringTable,
};

/// Writes compiler trace data to a file as one JSON object per line.
///
/// Field writes accumulate into an in-memory object between `start_event`
/// and `stop_event`, so that each event is serialized whole and the output
/// is valid JSON lines even when a stage panics mid-compilation.
pub struct JsonWriter<'a, W: Write> {
    writer: RefCell<BufWriter<W>>,

    /// Fields of the event currently being written.
    event: RefCell<Map<String, Value>>,

    /// The label the next leaf value will be stored under.
    label: RefCell<Option<String>>,

    source_map: &'a SourceMap,
    string_table: &'a StringTable,
}

impl<'a, W: Write> JsonWriter<'a, W> {
    pub fn new(
        file: W,
        source_map: &'a SourceMap,
        string_table: &'a StringTable,
    ) -> JsonWriter<'a, W> {
        JsonWriter {
            writer: RefCell::new(BufWriter::new(file)),
            event: RefCell::new(Map::new()),
            label: RefCell::new(None),
            source_map,
            string_table,
        }
    }

    fn insert(&self, v: Value) {
        let key = self
            .label
            .borrow_mut()
            .take()
            .unwrap_or_else(|| "value".into());
        self.event.borrow_mut().insert(key, v);
    }
}

impl<'a, W: Write> Writer for JsonWriter<'a, W> {
    fn write_span(&self, field: &str, span: Span) {
        self.event.borrow_mut().insert(
            field.into(),
            json!([span.low().as_u32(), span.high().as_u32()]),
        );
    }

    fn write_field(&self, label: &str, s: &dyn Writable) {
        *self.label.borrow_mut() = Some(label.into());
        s.write(self);
    }

    fn write(&self, s: &dyn Writable) {
        s.write(self)
    }

    fn write_str(&self, s: &str) {
        self.insert(Value::String(s.into()));
    }

    fn write_stringid(&self, s: crate::StringId) {
        let val = match self.string_table.get(s) {
            Ok(v) => v,
            Err(_) => format!("#{}", s),
        };
        self.insert(Value::String(val));
    }

    fn write_u64(&self, u: u64) {
        self.insert(Value::from(u));
    }

    fn write_text(&self, s: &str) {
        self.insert(Value::String(s.into()));
    }

    fn write_error(&self, e: &dyn crate::compiler::CompilerDisplay) {
        let msg = match e.fmt(self.source_map, self.string_table) {
            Ok(s) => s,
            Err(d) => format!("<{}>", d),
        };
        self.insert(Value::String(msg));
    }

    fn start_event(&self) {
        self.event.borrow_mut().clear();
        *self.label.borrow_mut() = None;
    }

    fn stop_event(&self) {
        let event = std::mem::take(&mut *self.event.borrow_mut());
        if let Ok(line) = serde_json::to_string(&Value::Object(event)) {
            let _ = writeln!(self.writer.borrow_mut(), "{}", line);
        }
    }
}

/// Writes the layout of the [`SourceMap`] as JSON, so that the spans in a
/// trace file can be mapped back to files offline.
pub fn write_source_map<W: Write>(w: W, sm: &SourceMap) -> serde_json::Result<()> {
    let entries: Vec<Value> = (0..sm.len())
        .filter_map(|idx| sm.get(idx))
        .map(|e| {
            json!({
                "span": [e.span().low().as_u32(), e.span().high().as_u32()],
                "path": e.path().display().to_string(),
            })
        })
        .collect();
    serde_json::to_writer(w, &entries)
}
