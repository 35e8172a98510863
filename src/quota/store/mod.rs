//! Usage Stores
//!
//! Durable map from (owner, model) to the owner's [`UsageRecord`] for that
//! model. Two backends are provided:
//!
//! - [`MemoryStore`]: process-local map, for tests and development
//! - [`RestStore`]: PostgREST-compatible table API (e.g. Supabase)
//!
//! Both keep exactly one record per (owner, model) pair, so saving a record
//! for a pair that already has one updates it in place and keeps its id.

pub mod memory;
pub mod rest;
pub mod retry;

use async_trait::async_trait;
use std::sync::Arc;

use super::usage::UsageRecord;
use crate::config::{StoreBackend, StoreConfig};
use crate::error::Result;

pub use memory::MemoryStore;
pub use rest::RestStore;

/// Persistence seam for usage records
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UsageStore: Send + Sync {
    /// Insert or update the record of `(record.owner, record.name)`
    async fn save(&self, record: &UsageRecord) -> Result<()>;

    /// Record of one owner on one model
    async fn get_one(&self, owner: &str, name: &str) -> Result<Option<UsageRecord>>;

    /// All records of one owner
    async fn get_all(&self, owner: &str) -> Result<Vec<UsageRecord>>;

    /// Remove one record; missing records are not an error
    async fn delete_one(&self, owner: &str, name: &str) -> Result<()>;

    /// Remove the owner's records for each of `names`
    async fn delete_many(&self, owner: &str, names: &[String]) -> Result<()>;

    /// Remove every record of the owner
    async fn delete_all(&self, owner: &str) -> Result<()>;
}

/// Build the store selected by the configuration
pub fn from_config(config: &StoreConfig) -> Result<Arc<dyn UsageStore>> {
    match config.backend {
        StoreBackend::Memory => Ok(Arc::new(MemoryStore::new())),
        StoreBackend::Rest => Ok(Arc::new(RestStore::from_config(config)?)),
    }
}
