//! Free list allocator for bitfield bit ranges.

/// Tracks which bits of a `[0, length)` bit range are still unclaimed.
///
/// Runs are stored as inclusive `(start, end)` pairs, sorted ascending and
/// never adjacent.  Explicit ranges are checked for containment in a free
/// run and carve it up; automatic allocation takes the lowest run that
/// fits.  Reserved members claim their bits the same way as real members,
/// so nothing can be allocated over them.
#[derive(Debug)]
pub struct RangeCollector {
    free: Vec<(u64, u64)>,
    length: u64,
}

impl RangeCollector {
    pub fn new(length: u64) -> RangeCollector {
        let free = if length == 0 {
            Vec::new()
        } else {
            vec![(0, length - 1)]
        };
        RangeCollector { free, length }
    }

    pub fn length(&self) -> u64 {
        self.length
    }

    /// Claims the explicit range `[start, start + width)`.  Returns false if
    /// any bit of it is outside a free run, leaving the free list untouched.
    pub fn claim(&mut self, start: u64, width: u64) -> bool {
        if width == 0 {
            return false;
        }
        let end = start + width - 1;

        for i in 0..self.free.len() {
            let (s, e) = self.free[i];
            if s <= start && end <= e {
                self.free.remove(i);
                let mut at = i;
                if s < start {
                    self.free.insert(at, (s, start - 1));
                    at += 1;
                }
                if end < e {
                    self.free.insert(at, (end + 1, e));
                }
                return true;
            }
        }

        false
    }

    /// Allocates `width` bits from the lowest free run large enough to hold
    /// them, returning the starting bit.
    pub fn alloc(&mut self, width: u64) -> Option<u64> {
        if width == 0 {
            return None;
        }
        let start = self
            .free
            .iter()
            .find(|(s, e)| e - s + 1 >= width)
            .map(|(s, _)| *s)?;
        self.claim(start, width);
        Some(start)
    }

    /// Removes and returns every remaining free run as `(start, width)`
    /// pairs, lowest first.
    pub fn take_free(&mut self) -> Vec<(u64, u64)> {
        std::mem::take(&mut self.free)
            .into_iter()
            .map(|(s, e)| (s, e - s + 1))
            .collect()
    }

    pub fn is_full(&self) -> bool {
        self.free.is_empty()
    }
}

impl std::fmt::Display for RangeCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let runs: Vec<String> = self
            .free
            .iter()
            .map(|(s, e)| format!("[{}:{}]", e, s))
            .collect();
        write!(
            f,
            "length {}, free bits: {}",
            self.length,
            if runs.is_empty() {
                "none".into()
            } else {
                runs.join(",")
            }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_claim_splits_the_run() {
        let mut rc = RangeCollector::new(16);
        assert!(rc.claim(4, 4));

        // both sides of the hole are still free
        assert!(rc.claim(0, 4));
        assert!(rc.claim(8, 8));
        assert!(rc.is_full());
    }

    #[test]
    fn overlapping_claim_is_rejected() {
        let mut rc = RangeCollector::new(8);
        assert!(rc.claim(0, 4));
        assert!(!rc.claim(3, 2));
        assert!(!rc.claim(0, 1));

        // the free half is untouched by the failed claims
        assert!(rc.claim(4, 4));
    }

    #[test]
    fn claim_outside_the_range_is_rejected() {
        let mut rc = RangeCollector::new(8);
        assert!(!rc.claim(6, 4));
        assert!(!rc.claim(8, 1));
        assert!(!rc.claim(0, 0));
    }

    #[test]
    fn alloc_takes_the_lowest_fit() {
        let mut rc = RangeCollector::new(16);
        assert_eq!(rc.alloc(1), Some(0));
        assert_eq!(rc.alloc(2), Some(1));

        // a hole too small for the request is skipped
        assert!(rc.claim(4, 4));
        assert_eq!(rc.alloc(2), Some(8));
        assert_eq!(rc.alloc(1), Some(3));
    }

    #[test]
    fn alloc_fails_when_no_run_fits() {
        let mut rc = RangeCollector::new(8);
        assert!(rc.claim(2, 4));
        assert_eq!(rc.alloc(4), None);
        assert_eq!(rc.alloc(2), Some(0));
    }

    #[test]
    fn take_free_returns_remaining_runs() {
        let mut rc = RangeCollector::new(16);
        assert!(rc.claim(2, 2));
        assert!(rc.claim(8, 4));

        let runs = rc.take_free();
        assert_eq!(runs, vec![(0, 2), (4, 4), (12, 4)]);
        assert!(rc.is_full());
    }

    #[test]
    fn display_renders_msb_first_runs() {
        let mut rc = RangeCollector::new(8);
        assert!(rc.claim(2, 2));
        assert_eq!(rc.to_string(), "length 8, free bits: [1:0],[7:4]");
    }
}
