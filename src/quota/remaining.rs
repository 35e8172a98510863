//! Remaining-Quota Calculator

use super::catalog::Catalog;
use super::usage::{RemainingQuota, UsageRecord};
use super::window;

/// Counter as a signed value, clamped at `i64::MAX`
fn signed(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// Ceiling minus consumption without overflow
fn left(ceiling: u64, consumed: u64) -> i64 {
    signed(ceiling).saturating_sub(signed(consumed))
}

/// Ceiling minus consumption, for a dimension that may be untracked.
///
/// Yields `None` unless both sides are present and non-zero, so a tracked
/// dimension with nothing consumed yet reports `None` rather than the full
/// ceiling.
fn optional_remaining(ceiling: Option<u64>, consumed: Option<u64>) -> Option<i64> {
    match (ceiling, consumed) {
        (Some(ceiling), Some(consumed)) if ceiling != 0 && consumed != 0 => {
            Some(left(ceiling, consumed))
        }
        _ => None,
    }
}

/// Remaining quota of `record` at `now`.
///
/// A record whose model has left the catalog reports an all-zero snapshot
/// instead of an error.
pub fn remaining(record: UsageRecord, catalog: &Catalog, now: i64) -> RemainingQuota {
    let usage = window::normalize(record, now);

    let Some(model) = catalog.get(&usage.name) else {
        return RemainingQuota::exhausted(&usage.name);
    };

    RemainingQuota {
        name: usage.name.clone(),
        rpm: left(model.requests_per_minute, usage.requests_this_minute),
        rpd: left(model.requests_per_day, usage.requests_this_day),
        tpm: optional_remaining(model.tokens_per_minute, usage.tokens_this_minute),
        tpd: optional_remaining(model.tokens_per_day, usage.tokens_this_day),
        ash: optional_remaining(model.aux_per_minute, usage.aux_this_minute),
        asd: optional_remaining(model.aux_per_day, usage.aux_this_day),
    }
}
