//! Usage Tracker
//!
//! Load, normalize, update and persist the usage record of an (owner, model)
//! pair. All window arithmetic goes through [`super::window`]; the tracker only
//! orchestrates store access around it.
//!
//! Same-pair `track` calls are serialized in-process so concurrent increments
//! are never lost. Every store call is bounded by a timeout.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use super::catalog::{Catalog, ResourceDefinition};
use super::clock::{Clock, SystemClock};
use super::remaining::remaining;
use super::selector::{self, SelectRequest};
use super::store::memory::UsageKey;
use super::store::UsageStore;
use super::usage::{RemainingQuota, UsageDelta, UsageRecord};
use super::window::normalize;
use crate::error::{QuotaError, Result};

/// Default deadline for a single store call
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(10);

type LockMap = Mutex<HashMap<UsageKey, Arc<tokio::sync::Mutex<()>>>>;

/// Lazily created async mutex per (owner, model)
#[derive(Debug, Default, Clone)]
struct PairLocks {
    locks: Arc<LockMap>,
}

impl PairLocks {
    async fn acquire(&self, key: UsageKey) -> PairGuard {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(locks.entry(key.clone()).or_default())
        };
        let guard = Arc::clone(&lock).lock_owned().await;

        PairGuard {
            guard: Some(guard),
            lock,
            key,
            locks: Arc::clone(&self.locks),
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Held for the duration of one read-modify-write cycle
struct PairGuard {
    guard: Option<tokio::sync::OwnedMutexGuard<()>>,
    lock: Arc<tokio::sync::Mutex<()>>,
    key: UsageKey,
    locks: Arc<LockMap>,
}

impl Drop for PairGuard {
    fn drop(&mut self) {
        self.guard.take();

        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // Only the map and this guard reference the lock: nobody is waiting
        if Arc::strong_count(&self.lock) == 2 {
            locks.remove(&self.key);
        }
    }
}

/// Add one call's consumption to `record`
///
/// Token counters only move when `model` tracks that dimension; an unset
/// counter on a tracked dimension counts as zero. Auxiliary counters are
/// never touched.
pub fn apply_delta(record: &mut UsageRecord, model: &ResourceDefinition, delta: UsageDelta) {
    record.requests_this_minute = record.requests_this_minute.saturating_add(delta.requests);
    record.requests_this_day = record.requests_this_day.saturating_add(delta.requests);

    if model.tokens_per_minute.is_some() {
        record.tokens_this_minute = Some(
            record
                .tokens_this_minute
                .unwrap_or(0)
                .saturating_add(delta.tokens),
        );
    }
    if model.tokens_per_day.is_some() {
        record.tokens_this_day = Some(
            record
                .tokens_this_day
                .unwrap_or(0)
                .saturating_add(delta.tokens),
        );
    }
}

/// Tracks consumption per owner and model against a catalog
#[derive(Clone)]
pub struct UsageTracker {
    store: Arc<dyn UsageStore>,
    catalog: Arc<Catalog>,
    clock: Arc<dyn Clock>,
    store_timeout: Duration,
    locks: PairLocks,
}

impl UsageTracker {
    /// Create a tracker reading time from the system clock
    pub fn new(store: Arc<dyn UsageStore>, catalog: Arc<Catalog>) -> Self {
        Self {
            store,
            catalog,
            clock: Arc::new(SystemClock),
            store_timeout: DEFAULT_STORE_TIMEOUT,
            locks: PairLocks::default(),
        }
    }

    /// Replace the time source
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Set the deadline applied to every store call
    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn store_timeout(&self) -> Duration {
        self.store_timeout
    }

    async fn bounded<T, F>(&self, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        tokio::time::timeout(self.store_timeout, call)
            .await
            .map_err(|_| QuotaError::Timeout(self.store_timeout.as_millis() as u64))?
    }

    async fn load_or_default(
        &self,
        owner: &str,
        model: &ResourceDefinition,
        now: i64,
    ) -> Result<UsageRecord> {
        let stored = self.bounded(self.store.get_one(owner, &model.name)).await?;
        let record = stored.unwrap_or_else(|| UsageRecord::new(model, owner, now));
        Ok(normalize(record, now))
    }

    /// Record one call's consumption and return the updated record
    ///
    /// Performs exactly one store write. The delta and the model are checked
    /// before the store is touched.
    pub async fn track(&self, owner: &str, name: &str, delta: UsageDelta) -> Result<UsageRecord> {
        delta.validate()?;
        let model = self.catalog.require(name)?;

        let _pair = self.locks.acquire(UsageKey::new(owner, name)).await;
        let now = self.clock.now();

        let mut record = self.load_or_default(owner, model, now).await?;
        apply_delta(&mut record, model, delta);
        self.bounded(self.store.save(&record)).await?;

        Ok(record)
    }

    /// Current usage of `owner` on `name`; a missing record reads as fresh
    /// and is not persisted
    pub async fn get_usage(&self, owner: &str, name: &str) -> Result<UsageRecord> {
        let model = self.catalog.require(name)?;
        let now = self.clock.now();
        self.load_or_default(owner, model, now).await
    }

    /// Every stored record of `owner`, normalized
    ///
    /// A failing store reads as an empty list.
    pub async fn list_usages(&self, owner: &str) -> Vec<UsageRecord> {
        let now = self.clock.now();
        match self.bounded(self.store.get_all(owner)).await {
            Ok(records) => records
                .into_iter()
                .map(|record| normalize(record, now))
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    /// Forget `owner`'s usage of one model
    pub async fn delete_usage(&self, owner: &str, name: &str) -> Result<()> {
        self.bounded(self.store.delete_one(owner, name)).await
    }

    /// Forget `owner`'s usage of several models
    pub async fn delete_usages(&self, owner: &str, names: &[String]) -> Result<()> {
        self.bounded(self.store.delete_many(owner, names)).await
    }

    /// Forget everything about `owner`
    pub async fn delete_all_usages(&self, owner: &str) -> Result<()> {
        self.bounded(self.store.delete_all(owner)).await
    }

    /// Quota `owner` has left on `name`
    pub async fn remaining(&self, owner: &str, name: &str) -> Result<RemainingQuota> {
        let usage = self.get_usage(owner, name).await?;
        Ok(remaining(usage, &self.catalog, self.clock.now()))
    }

    /// Models `owner` can still use, in the requested priority order
    ///
    /// The request is validated before any usage is read.
    pub async fn select(&self, owner: &str, request: &SelectRequest) -> Result<Vec<RemainingQuota>> {
        request.validate(&self.catalog)?;

        let usages = self.list_usages(owner).await;
        selector::select(owner, &usages, &self.catalog, request, self.clock.now())
    }
}

impl std::fmt::Debug for UsageTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UsageTracker")
            .field("models", &self.catalog.len())
            .field("store_timeout", &self.store_timeout)
            .finish_non_exhaustive()
    }
}
