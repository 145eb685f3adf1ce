//! Redelivery filter.
//!
//! Every transport here is at-least-once, so a reader may see the same row more than once
//! (a retried sink flush, a restarted job). The [`Deduplicator`] suppresses repeats by
//! identity `(topic, partition, key, value)`. Two different updates that happen to carry
//! identical bytes are also collapsed; that is acceptable for verification, where the
//! expected payloads are distinct.
//!
//! The seen-set is never pruned and grows with the number of distinct rows a reader
//! observes. Readers are short-lived, so this is a known limitation rather than a leak.

use std::collections::HashSet;

use crate::event::RowEvent;

/// Identity of a row for redelivery detection.
///
/// Kept as separate fields so that `("ab", "c")` and `("a", "bc")` never collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SeenKey {
    pub topic: String,
    pub partition: String,
    pub key: Option<Vec<u8>>,
    pub value: Option<Vec<u8>>,
}

impl From<&RowEvent> for SeenKey {
    fn from(row: &RowEvent) -> Self {
        Self {
            topic: row.topic.clone(),
            partition: row.partition.clone(),
            key: row.key.clone(),
            value: row.value.clone(),
        }
    }
}

/// Per-reader set of row identities already surfaced.
#[derive(Debug, Default)]
pub struct Deduplicator {
    seen: HashSet<SeenKey>,
}

impl Deduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns whether `key` was seen before, recording it if not.
    pub fn seen_before(&mut self, key: SeenKey) -> bool {
        !self.seen.insert(key)
    }

    /// Convenience for [`Self::seen_before`] on a row event.
    pub fn seen_row(&mut self, row: &RowEvent) -> bool {
        self.seen_before(SeenKey::from(row))
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn row(topic: &str, key: &str, value: &str) -> RowEvent {
        RowEvent::new(topic, "0", Some(key.as_bytes().to_vec()), Some(value.as_bytes().to_vec()))
    }

    #[test]
    fn first_sighting_is_new() {
        let mut d = Deduplicator::new();
        assert!(!d.seen_row(&row("foo", "[1]", "{}")));
        assert!(d.seen_row(&row("foo", "[1]", "{}")));
        assert_eq!(d.len(), 1);
    }

    #[test]
    fn field_boundaries_are_respected() {
        let mut d = Deduplicator::new();
        assert!(!d.seen_row(&row("ab", "c", "v")));
        assert!(!d.seen_row(&row("a", "bc", "v")));
    }

    #[test]
    fn absent_and_empty_differ() {
        let mut d = Deduplicator::new();
        assert!(!d.seen_row(&RowEvent::new("t", "0", None, Some(b"v".to_vec()))));
        assert!(!d.seen_row(&RowEvent::new("t", "0", Some(Vec::new()), Some(b"v".to_vec()))));
    }

    proptest! {
        #![proptest_config(ProptestConfig { cases: 256, ..ProptestConfig::default() })]

        /// Property: the first query of an identity is false and every later one is true.
        #[test]
        fn repeated_identity_is_seen(
            rows in prop::collection::vec(("[a-c]", "[0-3]", "[x-z]"), 1..40),
        ) {
            let mut d = Deduplicator::new();
            let mut model = HashSet::new();
            for (topic, key, value) in rows {
                let r = row(&topic, &key, &value);
                let fresh = model.insert((topic, key, value));
                prop_assert_eq!(d.seen_row(&r), !fresh);
            }
            prop_assert_eq!(d.len(), model.len());
        }
    }
}
