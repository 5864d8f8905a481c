use std::fmt::Display;
use std::path::{Path, PathBuf};

use super::{Offset, Span};

/// How many characters of source text are shown on either side of an error
/// position when rendering a diagnostic excerpt.
const EXCERPT_WINDOW: usize = 40;

/// The SourceMap keeps a table of input source units and the range of the
/// global offset space which maps to each unit.
///
/// When initially created, the SourceMap has no source code units and the
/// global offset watermark is 0.  When a unit is added it is assigned a low
/// global offset and the watermark is increased by the size of the unit in
/// bytes.
#[derive(Debug)]
pub struct SourceMap {
    /// The source units, each owning the offset range from its low up to but
    /// not including its high.
    map: Vec<SourceMapEntry>,

    /// The upper bound of all the source units currently in the SourceMap.
    /// The next added unit will have this offset as its low offset.
    offset_high: Offset,
}

impl SourceMap {
    pub fn new() -> SourceMap {
        SourceMap {
            offset_high: Offset::new(0),
            map: Vec::new(),
        }
    }

    /// Reads a file into the [`SourceMap`] and assigns it a range of the
    /// global offset space.
    pub fn add_file(&mut self, path: PathBuf) -> Result<(), SourceMapError> {
        let text = std::fs::read_to_string(&path)?;
        self.add_string(&text, path)
    }

    /// Adds a source unit from an in-memory string.  Used for tests and for
    /// compiler generated input.
    pub fn add_string(&mut self, text: &str, path: PathBuf) -> Result<(), SourceMapError> {
        if text.len() >= u32::MAX as usize {
            return Err(SourceMapError::FileTooBig);
        }

        let low = self.offset_high;
        self.offset_high += text.len() as u32;
        let high = self.offset_high;

        self.map.push(SourceMapEntry {
            low,
            high,
            path,
            text: text.into(),
        });

        Ok(())
    }

    /// Returns the number of source units in the [`SourceMap`].
    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// If `idx` is less than the number of entries, then this will return
    /// a reference to the entry at position `idx`.
    pub fn get(&self, idx: usize) -> Option<&SourceMapEntry> {
        self.map.get(idx)
    }

    /// Paths of every source unit, in the order they were added.  Used for
    /// dependency file output.
    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.map.iter().map(|e| e.path.as_path())
    }

    fn entry_of(&self, offset: Offset) -> Option<&SourceMapEntry> {
        self.map
            .iter()
            .find(|e| e.low <= offset && offset < e.high)
    }

    /// Returns the source text covered by the given span, if the span lies
    /// within a single source unit.
    pub fn text_in_span(&self, span: Span) -> Option<&str> {
        let entry = self.entry_of(span.low())?;
        if span.high() > entry.high {
            return None;
        }
        let lo = (span.low().as_u32() - entry.low.as_u32()) as usize;
        let hi = (span.high().as_u32() - entry.low.as_u32()) as usize;
        entry.text.get(lo..hi)
    }

    /// Converts a global offset to a (file, line, column) address.
    pub fn address_of(&self, offset: Offset) -> Option<SourceAddress> {
        let entry = self.entry_of(offset)?;
        let pos = (offset.as_u32() - entry.low.as_u32()) as usize;

        let mut line = 1;
        let mut col = 1;
        for c in entry.text[..pos].chars() {
            if c == '\n' {
                line += 1;
                col = 1;
            } else {
                col += 1;
            }
        }

        Some(SourceAddress {
            path: entry.path.clone(),
            line,
            col,
        })
    }

    /// Renders the line of source containing the start of the span, bounded
    /// to a window around the error position, with a caret line underneath
    /// marking the position itself.
    pub fn excerpt(&self, span: Span) -> String {
        let entry = match self.entry_of(span.low()) {
            Some(e) => e,
            None => return String::new(),
        };
        let pos = (span.low().as_u32() - entry.low.as_u32()) as usize;

        let line_start = entry.text[..pos].rfind('\n').map(|i| i + 1).unwrap_or(0);
        let line_end = entry.text[pos..]
            .find('\n')
            .map(|i| pos + i)
            .unwrap_or(entry.text.len());

        let window_start = line_start.max(pos.saturating_sub(EXCERPT_WINDOW));
        let window_end = line_end.min(pos + EXCERPT_WINDOW);

        let text = &entry.text[window_start..window_end];
        let caret_col = pos - window_start;
        let caret: String = text
            .chars()
            .take(caret_col)
            .map(|c| if c == '\t' { '\t' } else { ' ' })
            .chain(std::iter::once('^'))
            .collect();

        format!("  {}\n  {}", text, caret)
    }
}

impl Default for SourceMap {
    fn default() -> Self {
        Self::new()
    }
}

/// Tracks the assignment of a range within the global offset space to a
/// single source unit.
#[derive(Debug)]
pub struct SourceMapEntry {
    low: Offset,
    high: Offset,
    path: PathBuf,
    text: String,
}

impl SourceMapEntry {
    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    pub fn span(&self) -> Span {
        Span::new(self.low, self.high)
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn low(&self) -> Offset {
        self.low
    }
}

/// A human readable source position: file, 1-based line, 1-based column.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceAddress {
    pub path: PathBuf,
    pub line: u32,
    pub col: u32,
}

impl Display for SourceAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.path.display(), self.line, self.col)
    }
}

#[derive(Debug)]
pub enum SourceMapError {
    FileTooBig,
    Io(std::io::Error),
}

impl From<std::io::Error> for SourceMapError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl Display for SourceMapError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceMapError::FileTooBig => f.write_str("source file too big"),
            SourceMapError::Io(e) => write!(f, "{}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_of_tracks_lines_and_columns() {
        let mut sm = SourceMap::new();
        sm.add_string("abc\ndef\nghi", "/test".into()).unwrap();

        let addr = sm.address_of(Offset::new(5)).unwrap();
        assert_eq!(addr.line, 2);
        assert_eq!(addr.col, 2);
    }

    #[test]
    fn text_in_span_returns_covered_source() {
        let mut sm = SourceMap::new();
        sm.add_string("define x structure", "/test".into()).unwrap();

        let text = sm.text_in_span(Span::new(Offset::new(7), Offset::new(8)));
        assert_eq!(text, Some("x"));
    }

    #[test]
    fn excerpt_marks_error_position() {
        let mut sm = SourceMap::new();
        sm.add_string("define x structure {\n  bad line here\n}", "/test".into())
            .unwrap();

        let excerpt = sm.excerpt(Span::new(Offset::new(23), Offset::new(26)));
        assert!(excerpt.contains("bad line here"));
        assert!(excerpt.contains('^'));
    }

    #[test]
    fn offsets_span_multiple_units() {
        let mut sm = SourceMap::new();
        sm.add_string("aaaa", "/a".into()).unwrap();
        sm.add_string("bbbb", "/b".into()).unwrap();

        let addr = sm.address_of(Offset::new(5)).unwrap();
        assert_eq!(addr.path, PathBuf::from("/b"));
        assert_eq!(addr.line, 1);
        assert_eq!(addr.col, 2);
    }
}
