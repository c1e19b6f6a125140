//! Header merging for batched messages.
//!
//! Identity headers (`id`, `timestamp`, `sequence_number`, `sequence_size`)
//! describe a single message and are never carried into a merge.

use crate::message::{HeaderValue, MessageHeaders, IDENTITY_HEADERS};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Result of merging the headers of a batch.
pub type MergedHeaders = BTreeMap<String, HeaderValue>;

/// How conflicting header values across a batch are resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HeaderMergeStrategy {
    /// Keep a key only if every message that has it agrees on the value.
    #[default]
    ConflictDiscarding,
    /// Value from the first message having the key.
    FirstWins,
    /// Value from the last message having the key.
    LastWins,
}

impl HeaderMergeStrategy {
    /// Merges `headers` in iteration order.
    pub fn merge<'a, I>(self, headers: I) -> MergedHeaders
    where
        I: IntoIterator<Item = &'a MessageHeaders>,
    {
        let mut merged = MergedHeaders::new();
        let mut conflicts = BTreeSet::new();

        let mergeable = headers
            .into_iter()
            .flat_map(MessageHeaders::iter)
            .filter(|(key, _)| !IDENTITY_HEADERS.contains(key));

        for (key, value) in mergeable {
            match self {
                Self::FirstWins => {
                    merged.entry(key.to_string()).or_insert_with(|| value.clone());
                }
                Self::LastWins => {
                    merged.insert(key.to_string(), value.clone());
                }
                Self::ConflictDiscarding => match merged.get(key) {
                    None => {
                        merged.insert(key.to_string(), value.clone());
                    }
                    Some(existing) if existing != value => {
                        conflicts.insert(key.to_string());
                    }
                    Some(_) => {}
                },
            }
        }

        for key in conflicts {
            debug!(header = %key, "excluding header due to merge conflict");
            merged.remove(&key);
        }
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MessageBuilder;

    fn headers(pairs: &[(&str, i64)]) -> MessageHeaders {
        pairs
            .iter()
            .fold(MessageBuilder::with_payload(()), |b, (k, v)| b.header(*k, *v))
            .build()
            .headers()
            .clone()
    }

    #[test]
    fn test_strategies_on_conflicting_key() {
        let batch = [headers(&[("a", 1), ("b", 2)]), headers(&[("a", 1), ("b", 3)])];

        let discarding = HeaderMergeStrategy::ConflictDiscarding.merge(&batch);
        assert_eq!(discarding.len(), 1);
        assert_eq!(discarding["a"], HeaderValue::Int(1));

        let first = HeaderMergeStrategy::FirstWins.merge(&batch);
        assert_eq!(first.len(), 2);
        assert_eq!(first["b"], HeaderValue::Int(2));

        let last = HeaderMergeStrategy::LastWins.merge(&batch);
        assert_eq!(last.len(), 2);
        assert_eq!(last["b"], HeaderValue::Int(3));
    }

    #[test]
    fn test_identity_headers_excluded() {
        let batch = [
            MessageBuilder::with_payload(()).sequence(1, 2).header("x", "same").build(),
            MessageBuilder::with_payload(()).sequence(2, 2).header("x", "same").build(),
        ];
        for strategy in [
            HeaderMergeStrategy::ConflictDiscarding,
            HeaderMergeStrategy::FirstWins,
            HeaderMergeStrategy::LastWins,
        ] {
            let merged = strategy.merge(batch.iter().map(|m| m.headers()));
            assert_eq!(merged.keys().collect::<Vec<_>>(), vec!["x"]);
        }
    }

    #[test]
    fn test_conflict_in_third_message_discards() {
        let batch = [headers(&[("k", 1)]), headers(&[("k", 1)]), headers(&[("k", 9)])];
        assert!(HeaderMergeStrategy::ConflictDiscarding.merge(&batch).is_empty());
    }

    #[test]
    fn test_empty_input() {
        assert!(HeaderMergeStrategy::LastWins.merge(std::iter::empty()).is_empty());
    }
}
