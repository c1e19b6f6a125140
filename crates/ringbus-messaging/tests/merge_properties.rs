use proptest::prelude::*;
use ringbus_messaging::{HeaderMergeStrategy, MessageBuilder, MessageHeaders, ID, TIMESTAMP};

fn headers_strategy() -> impl Strategy<Value = Vec<MessageHeaders>> {
    let entry = ("[a-d]", 0i64..3);
    prop::collection::vec(prop::collection::vec(entry, 0..4), 0..8).prop_map(|batch| {
        batch
            .into_iter()
            .map(|entries| {
                entries
                    .into_iter()
                    .fold(MessageBuilder::with_payload(()), |b, (k, v)| b.header(k, v))
                    .build()
                    .headers()
                    .clone()
            })
            .collect()
    })
}

proptest! {
    #[test]
    fn prop_first_wins_is_last_wins_reversed(batch in headers_strategy()) {
        let first = HeaderMergeStrategy::FirstWins.merge(&batch);
        let last = HeaderMergeStrategy::LastWins.merge(batch.iter().rev());
        prop_assert_eq!(first, last);
    }

    #[test]
    fn prop_conflict_discarding_keeps_only_agreed_values(batch in headers_strategy()) {
        let merged = HeaderMergeStrategy::ConflictDiscarding.merge(&batch);

        for key in ["a", "b", "c", "d"] {
            let mut values: Vec<_> = batch.iter().filter_map(|h| h.get(key)).collect();
            values.dedup();
            match values.as_slice() {
                [] => prop_assert!(!merged.contains_key(key)),
                [only] => prop_assert_eq!(merged.get(key), Some(*only)),
                _ => prop_assert!(!merged.contains_key(key)),
            }
        }
    }

    #[test]
    fn prop_identity_headers_never_merged(batch in headers_strategy()) {
        for strategy in [
            HeaderMergeStrategy::ConflictDiscarding,
            HeaderMergeStrategy::FirstWins,
            HeaderMergeStrategy::LastWins,
        ] {
            let merged = strategy.merge(&batch);
            prop_assert!(!merged.contains_key(ID));
            prop_assert!(!merged.contains_key(TIMESTAMP));
        }
    }
}
