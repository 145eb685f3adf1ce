//! `feedcheck-frontier`: the resolved watermark over a set of key spans.
//!
//! A [`SpanFrontier`] tracks, for a fixed set of disjoint spans, the timestamp up to which
//! every change in each span has been observed. The *frontier* is the minimum of those
//! timestamps: the point in time up to which the whole watched key space is complete.
//!
//! ## Design
//!
//! - The tracked key space is fixed at construction; forwarding a span outside it is a
//!   [`FeedError::FrontierMisuse`]
//! - A forward may target a sub-range of a tracked span, in which case the entry is split
//! - Entries only move up: a timestamp older than the current entry is ignored
//! - Adjacent entries that end up at the same timestamp are merged back together
//! - The minimum is cached and only recomputed when an entry sitting at the minimum moves

use feedcheck_core::{FeedError, FeedResult, Span, Timestamp};
use tracing::trace;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Entry {
    span: Span,
    ts: Timestamp,
}

/// Minimum-timestamp tracker over disjoint key spans.
#[derive(Debug, Clone)]
pub struct SpanFrontier {
    /// Sorted by span start, pairwise non-overlapping.
    entries: Vec<Entry>,
    frontier: Timestamp,
}

impl SpanFrontier {
    /// Creates a frontier over `spans`, every entry starting at [`Timestamp::ZERO`].
    ///
    /// Overlapping input spans are rejected. Gaps between spans are allowed and are simply
    /// not tracked.
    pub fn new(spans: impl IntoIterator<Item = Span>) -> FeedResult<Self> {
        let mut spans: Vec<Span> = spans.into_iter().collect();
        spans.sort();
        for pair in spans.windows(2) {
            if pair[0].overlaps(&pair[1]) {
                return Err(FeedError::InvalidSpan(format!(
                    "tracked spans {} and {} overlap",
                    pair[0], pair[1]
                )));
            }
        }

        let mut frontier = Self {
            entries: spans
                .into_iter()
                .map(|span| Entry {
                    span,
                    ts: Timestamp::ZERO,
                })
                .collect(),
            frontier: Timestamp::ZERO,
        };
        frontier.coalesce();
        Ok(frontier)
    }

    /// The current resolved watermark: the minimum timestamp over all tracked spans.
    pub fn frontier(&self) -> Timestamp {
        self.frontier
    }

    /// Current `(span, timestamp)` entries in key order.
    pub fn entries(&self) -> impl Iterator<Item = (&Span, Timestamp)> + '_ {
        self.entries.iter().map(|e| (&e.span, e.ts))
    }

    /// Records that every change in `span` up to `ts` has been observed.
    ///
    /// Returns `true` iff the frontier strictly increased as a result. Each affected entry is
    /// raised to `max(entry, ts)`, so a stale notification is a no-op rather than an error.
    pub fn forward(&mut self, span: &Span, ts: Timestamp) -> FeedResult<bool> {
        let range = self.covering(span)?;
        let old = self.frontier;

        let mut touched_min = false;
        let mut replacement = Vec::with_capacity(range.len() + 2);
        for entry in &self.entries[range.clone()] {
            if ts <= entry.ts {
                replacement.push(entry.clone());
                continue;
            }
            let Some(mid) = entry.span.intersect(span) else {
                replacement.push(entry.clone());
                continue;
            };
            if entry.ts == old {
                touched_min = true;
            }
            if entry.span.start() < span.start() {
                replacement.push(Entry {
                    span: Span::new(entry.span.start(), span.start())?,
                    ts: entry.ts,
                });
            }
            replacement.push(Entry { span: mid, ts });
            if span.end() < entry.span.end() {
                replacement.push(Entry {
                    span: Span::new(span.end(), entry.span.end())?,
                    ts: entry.ts,
                });
            }
        }

        self.entries.splice(range, replacement);
        self.coalesce();

        if touched_min {
            self.frontier = self
                .entries
                .iter()
                .map(|e| e.ts)
                .min()
                .unwrap_or(Timestamp::ZERO);
        }

        let advanced = self.frontier > old;
        trace!(%span, %ts, advanced, frontier = %self.frontier, "frontier forward");
        Ok(advanced)
    }

    /// Index range of the entries that together cover `span`.
    fn covering(&self, span: &Span) -> FeedResult<core::ops::Range<usize>> {
        let first = self
            .entries
            .partition_point(|e| e.span.end() <= span.start());

        let mut covered_to = span.start();
        let mut idx = first;
        while covered_to < span.end() {
            match self.entries.get(idx) {
                Some(entry) if entry.span.start() <= covered_to => {
                    covered_to = entry.span.end();
                    idx += 1;
                }
                _ => {
                    return Err(FeedError::frontier_misuse(format!(
                        "span {span} is not within the tracked spans"
                    )));
                }
            }
        }
        Ok(first..idx)
    }

    fn coalesce(&mut self) {
        let mut merged: Vec<Entry> = Vec::with_capacity(self.entries.len());
        for entry in self.entries.drain(..) {
            if let Some(prev) = merged.last_mut() {
                if prev.ts == entry.ts {
                    if let Some(joined) = prev.span.join(&entry.span) {
                        prev.span = joined;
                        continue;
                    }
                }
            }
            merged.push(entry);
        }
        self.entries = merged;
    }
}

impl core::fmt::Display for SpanFrontier {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        for (i, e) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{}@{}", e.span, e.ts)?;
        }
        Ok(())
    }
}
