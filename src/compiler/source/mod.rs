//! This module abstracts out the source code from which the compiler derives
//! its input data.  Every token, syntax node, and IR value carries a [`Span`]
//! into the global offset space managed by the [`SourceMap`], so that errors
//! at any stage of compilation can be traced back to the file, line, and
//! column that produced them.

use std::ops::AddAssign;

use serde::{Deserialize, Serialize};

mod sourcemap;

pub use sourcemap::{SourceAddress, SourceMap, SourceMapEntry, SourceMapError};

/// A unique offset into the global space of all source code.  This offset
/// uniquely points to a single character in the space of all source code that
/// has been input for this compilation.  The [`SourceMap`] manages the offset
/// indexing and converts a given offset back to the actual source unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Offset(u32);

impl Offset {
    pub fn new(o: u32) -> Offset {
        Offset(o)
    }

    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl AddAssign<u32> for Offset {
    fn add_assign(&mut self, rhs: u32) {
        self.0 += rhs
    }
}

impl std::fmt::Display for Offset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A range within the global offset space.  Marks the section of source code
/// that a token or IR value was derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    low: Offset,
    high: Offset,
}

impl Span {
    pub fn new(low: Offset, high: Offset) -> Span {
        Span { low, high }
    }

    /// A span covering nothing.  Used for IR values which are generated by
    /// the compiler rather than read from source code.
    pub fn zero() -> Span {
        Span {
            low: Offset(0),
            high: Offset(0),
        }
    }

    pub fn low(&self) -> Offset {
        self.low
    }

    pub fn high(&self) -> Offset {
        self.high
    }

    /// Creates a span which covers both `a` and `b` and everything between
    /// them.
    pub fn cover(a: Span, b: Span) -> Span {
        let low = a.low.min(b.low);
        let high = a.high.max(b.high);
        Span { low, high }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cover_spans() {
        let a = Span::new(Offset::new(2), Offset::new(5));
        let b = Span::new(Offset::new(4), Offset::new(9));
        let c = Span::cover(a, b);
        assert_eq!(c.low(), Offset::new(2));
        assert_eq!(c.high(), Offset::new(9));
    }
}
