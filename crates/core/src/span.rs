//! Half-open key ranges.

use serde::{Deserialize, Serialize};

use crate::error::{FeedError, FeedResult};

/// A half-open key range `[start, end)`.
///
/// Keys compare bytewise. A span is never empty: `start < end` is enforced on
/// construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Span {
    start: Vec<u8>,
    end: Vec<u8>,
}

impl Span {
    pub fn new(start: impl Into<Vec<u8>>, end: impl Into<Vec<u8>>) -> FeedResult<Self> {
        let (start, end) = (start.into(), end.into());
        if start >= end {
            return Err(FeedError::InvalidSpan(format!(
                "start {} must sort before end {}",
                escape(&start),
                escape(&end)
            )));
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> &[u8] {
        &self.start
    }

    pub fn end(&self) -> &[u8] {
        &self.end
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Splits off the part of `self` that overlaps `other`, if any.
    pub fn intersect(&self, other: &Span) -> Option<Span> {
        if !self.overlaps(other) {
            return None;
        }
        Some(Span {
            start: self.start.clone().max(other.start.clone()),
            end: self.end.clone().min(other.end.clone()),
        })
    }

    /// Concatenates `self` with a span that starts exactly where `self` ends.
    pub fn join(&self, next: &Span) -> Option<Span> {
        (self.end == next.start).then(|| Span {
            start: self.start.clone(),
            end: next.end.clone(),
        })
    }
}

impl core::fmt::Display for Span {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "[{}, {})", escape(&self.start), escape(&self.end))
    }
}

fn escape(key: &[u8]) -> String {
    key.escape_ascii().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span(start: &str, end: &str) -> Span {
        Span::new(start, end).unwrap()
    }

    #[test]
    fn rejects_empty_and_inverted_spans() {
        assert!(matches!(Span::new("b", "b"), Err(FeedError::InvalidSpan(_))));
        assert!(matches!(Span::new("c", "a"), Err(FeedError::InvalidSpan(_))));
    }

    #[test]
    fn adjacent_spans_do_not_overlap() {
        assert!(!span("a", "b").overlaps(&span("b", "c")));
        assert!(span("a", "c").overlaps(&span("b", "d")));
    }

    #[test]
    fn intersection() {
        assert_eq!(span("a", "m").intersect(&span("f", "z")), Some(span("f", "m")));
        assert_eq!(span("a", "b").intersect(&span("b", "c")), None);
    }

    #[test]
    fn join_requires_adjacency() {
        assert_eq!(span("a", "b").join(&span("b", "c")), Some(span("a", "c")));
        assert_eq!(span("a", "b").join(&span("c", "d")), None);
    }

    #[test]
    fn display_escapes_binary_keys() {
        let s = Span::new(vec![0x01, b'a'], vec![0xff]).unwrap();
        assert_eq!(s.to_string(), "[\\x01a, \\xff)");
    }
}
