//! Usage Records
//!
//! Per-(owner, model) counters, the consumption delta applied to them, and the
//! derived remaining-quota snapshot.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::catalog::ResourceDefinition;
use crate::error::{QuotaError, Result};

/// Consumption counters of one owner for one model
///
/// Nullable counters are `None` exactly when the model does not track that
/// dimension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageRecord {
    /// Stable identifier, assigned at creation
    pub id: Uuid,

    /// Consuming principal
    pub owner: String,

    /// Model name
    pub name: String,

    #[serde(rename = "rpm")]
    pub requests_this_minute: u64,

    #[serde(rename = "rpd")]
    pub requests_this_day: u64,

    #[serde(rename = "tpm")]
    pub tokens_this_minute: Option<u64>,

    #[serde(rename = "tpd")]
    pub tokens_this_day: Option<u64>,

    #[serde(rename = "ash")]
    pub aux_this_minute: Option<u64>,

    #[serde(rename = "asd")]
    pub aux_this_day: Option<u64>,

    /// Unix seconds of the last minute-window reset
    #[serde(rename = "lastMinute")]
    pub last_minute_reset: i64,

    /// Unix seconds of the last day-window reset
    #[serde(rename = "lastDay")]
    pub last_day_reset: i64,
}

impl UsageRecord {
    /// Fresh all-zero record for `owner` on `model`, with both windows starting at `now`
    pub fn new(model: &ResourceDefinition, owner: &str, now: i64) -> Self {
        let zero_if_tracked = |ceiling: Option<u64>| ceiling.map(|_| 0);

        Self {
            id: Uuid::new_v4(),
            owner: owner.to_string(),
            name: model.name.clone(),
            requests_this_minute: 0,
            requests_this_day: 0,
            tokens_this_minute: zero_if_tracked(model.tokens_per_minute),
            tokens_this_day: zero_if_tracked(model.tokens_per_day),
            aux_this_minute: zero_if_tracked(model.aux_per_minute),
            aux_this_day: zero_if_tracked(model.aux_per_day),
            last_minute_reset: now,
            last_day_reset: now,
        }
    }
}

fn default_requests() -> u64 {
    1
}

/// Amount consumed by one tracked call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UsageDelta {
    #[serde(default = "default_requests")]
    pub requests: u64,

    pub tokens: u64,
}

impl UsageDelta {
    pub fn new(requests: u64, tokens: u64) -> Self {
        Self { requests, tokens }
    }

    /// Largest amount a single call may record
    pub const MAX_AMOUNT: u64 = i64::MAX as u64;

    /// Both amounts must be positive and at most [`Self::MAX_AMOUNT`]
    pub fn validate(&self) -> Result<()> {
        if self.requests == 0 {
            return Err(QuotaError::Validation(
                "requests must be a positive integer".to_string(),
            ));
        }
        if self.tokens == 0 {
            return Err(QuotaError::Validation(
                "tokens must be a positive integer".to_string(),
            ));
        }
        if self.requests > Self::MAX_AMOUNT || self.tokens > Self::MAX_AMOUNT {
            return Err(QuotaError::Validation(format!(
                "requests and tokens must not exceed {}",
                Self::MAX_AMOUNT
            )));
        }
        Ok(())
    }
}

/// Ceiling minus consumption for each dimension of one model
///
/// Values go negative once a window is over-consumed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemainingQuota {
    pub name: String,
    pub rpm: i64,
    pub rpd: i64,
    pub tpm: Option<i64>,
    pub tpd: Option<i64>,
    pub ash: Option<i64>,
    pub asd: Option<i64>,
}

impl RemainingQuota {
    /// All-zero snapshot for a model the catalog no longer knows
    pub fn exhausted(name: &str) -> Self {
        Self {
            name: name.to_string(),
            rpm: 0,
            rpd: 0,
            tpm: None,
            tpd: None,
            ash: None,
            asd: None,
        }
    }

    /// True when no tracked dimension is at or below zero
    pub fn is_available(&self) -> bool {
        let positive_or_untracked = |value: Option<i64>| value.map_or(true, |v| v > 0);

        self.rpm > 0
            && self.rpd > 0
            && positive_or_untracked(self.tpm)
            && positive_or_untracked(self.tpd)
            && positive_or_untracked(self.ash)
            && positive_or_untracked(self.asd)
    }
}
