//! Property-Based Tests for Quota Accounting
//!
//! # Test Strategies
//!
//! - **Window Policy**: normalization is idempotent and never moves a window
//!   backwards
//! - **Tracking**: within one window the request counters equal the sum of
//!   the request deltas
//! - **Selection**: output order follows the priority list and never contains
//!   an exhausted model
//!
//! # Running the Tests
//!
//! ```bash
//! cargo test --lib quota::proptests
//! ```

use proptest::prelude::*;

use crate::quota::catalog::{Catalog, ResourceDefinition};
use crate::quota::remaining::remaining;
use crate::quota::selector::{select, SelectRequest};
use crate::quota::tracker::apply_delta;
use crate::quota::usage::{UsageDelta, UsageRecord};
use crate::quota::window::{normalize, DAY_WINDOW_SECS, MINUTE_WINDOW_SECS};

const NOW: i64 = 1_700_000_000;

fn arb_model() -> impl Strategy<Value = ResourceDefinition> {
    (
        1u64..1_000,
        1u64..100_000,
        prop::option::of((1u64..10_000, 1u64..1_000_000)),
        prop::option::of((1u64..10_000, 1u64..1_000_000)),
    )
        .prop_map(|(rpm, rpd, tokens, aux)| {
            let mut model = ResourceDefinition::new("model", rpm, rpd);
            if let Some((per_minute, per_day)) = tokens {
                model = model.with_tokens(per_minute, per_day);
            }
            if let Some((per_minute, per_day)) = aux {
                model = model.with_aux(per_minute, per_day);
            }
            model
        })
}

fn arb_record() -> impl Strategy<Value = UsageRecord> {
    (
        arb_model(),
        0u64..1_000,
        0u64..100_000,
        0i64..(3 * DAY_WINDOW_SECS),
        0i64..(3 * DAY_WINDOW_SECS),
    )
        .prop_map(|(model, minute, day, minute_age, day_age)| {
            let mut record = UsageRecord::new(&model, "owner", NOW);
            record.requests_this_minute = minute;
            record.requests_this_day = day;
            record.tokens_this_minute = record.tokens_this_minute.map(|_| minute * 10);
            record.tokens_this_day = record.tokens_this_day.map(|_| day * 10);
            record.last_minute_reset = NOW - minute_age;
            record.last_day_reset = NOW - day_age;
            record
        })
}

fn arb_deltas() -> impl Strategy<Value = Vec<UsageDelta>> {
    prop::collection::vec((1u64..10, 1u64..1_000), 1..30)
        .prop_map(|pairs| pairs.into_iter().map(|(r, t)| UsageDelta::new(r, t)).collect())
}

proptest! {
    #[test]
    fn prop_normalize_is_idempotent(record in arb_record()) {
        let once = normalize(record, NOW);
        let twice = normalize(once.clone(), NOW);
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn prop_normalize_only_moves_windows_forward(record in arb_record()) {
        let before = record.clone();
        let after = normalize(record, NOW);

        prop_assert!(after.last_minute_reset >= before.last_minute_reset);
        prop_assert!(after.last_day_reset >= before.last_day_reset);
        prop_assert!(NOW - after.last_minute_reset <= MINUTE_WINDOW_SECS
            || after.last_minute_reset == before.last_minute_reset);
        prop_assert_eq!(after.aux_this_minute, before.aux_this_minute);
        prop_assert_eq!(after.aux_this_day, before.aux_this_day);
        prop_assert_eq!(after.tokens_this_minute.is_some(), before.tokens_this_minute.is_some());
    }

    #[test]
    fn prop_tracking_sums_requests(model in arb_model(), deltas in arb_deltas()) {
        let mut record = UsageRecord::new(&model, "owner", NOW);
        for delta in &deltas {
            record = normalize(record, NOW);
            apply_delta(&mut record, &model, *delta);
        }

        let requests: u64 = deltas.iter().map(|d| d.requests).sum();
        let tokens: u64 = deltas.iter().map(|d| d.tokens).sum();

        prop_assert_eq!(record.requests_this_minute, requests);
        prop_assert_eq!(record.requests_this_day, requests);
        prop_assert_eq!(record.tokens_this_minute, model.tokens_per_minute.map(|_| tokens));
        prop_assert_eq!(record.tokens_this_day, model.tokens_per_day.map(|_| tokens));
    }

    #[test]
    fn prop_request_remaining_is_ceiling_minus_consumed(model in arb_model(), used in 0u64..2_000) {
        let catalog = Catalog::from_definitions(vec![model.clone()]).unwrap();
        let mut record = UsageRecord::new(&model, "owner", NOW);
        record.requests_this_minute = used;

        let left = remaining(record, &catalog, NOW);
        prop_assert_eq!(left.rpm, model.requests_per_minute as i64 - used as i64);
    }

    #[test]
    fn prop_over_consumption_never_positive(model in arb_model(), used in any::<u64>()) {
        let catalog = Catalog::from_definitions(vec![model.clone()]).unwrap();
        let mut record = UsageRecord::new(&model, "owner", NOW);
        record.requests_this_minute = used;
        record.requests_this_day = used;

        let left = remaining(record, &catalog, NOW);
        prop_assert!(left.rpm <= model.requests_per_minute as i64);
        if used >= model.requests_per_minute {
            prop_assert!(left.rpm <= 0);
        }
        if used >= model.requests_per_day {
            prop_assert!(left.rpd <= 0);
        }
    }

    #[test]
    fn prop_selection_follows_priority(
        used in prop::collection::vec(0u64..15, 4),
        order in Just(vec![0usize, 1, 2, 3]).prop_shuffle(),
        fallback_all in any::<bool>(),
        listed in 1usize..=4,
    ) {
        let names = ["a", "b", "c", "d"];
        let catalog = Catalog::from_definitions(
            names.iter().map(|name| ResourceDefinition::new(*name, 10, 1_000)).collect(),
        ).unwrap();

        let usages: Vec<UsageRecord> = names
            .iter()
            .zip(&used)
            .map(|(name, used)| {
                let mut record = UsageRecord::new(catalog.get(name).unwrap(), "owner", NOW);
                record.requests_this_minute = *used;
                record
            })
            .collect();

        let priority: Vec<String> = order[..listed].iter().map(|i| names[*i].to_string()).collect();
        let request = SelectRequest::new(Some(priority.clone()), fallback_all);
        let selected = select("owner", &usages, &catalog, &request, NOW).unwrap();

        prop_assert!(selected.iter().all(|r| r.is_available()));
        if !fallback_all {
            prop_assert!(selected.iter().all(|r| priority.contains(&r.name)));
        }

        let ranks: Vec<usize> = selected
            .iter()
            .map(|r| priority.iter().position(|p| *p == r.name).unwrap_or(usize::MAX))
            .collect();
        prop_assert!(ranks.windows(2).all(|w| w[0] <= w[1]));
    }
}
