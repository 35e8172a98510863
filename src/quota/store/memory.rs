//! In-memory usage store

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::UsageStore;
use crate::error::Result;
use crate::quota::usage::UsageRecord;

/// Key identifying the record of one owner on one model
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub struct UsageKey {
    pub owner: String,
    pub name: String,
}

impl UsageKey {
    pub fn new(owner: &str, name: &str) -> Self {
        Self {
            owner: owner.to_string(),
            name: name.to_string(),
        }
    }
}

/// Process-local usage store
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    records: Arc<RwLock<HashMap<UsageKey, UsageRecord>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records across all owners
    pub async fn count(&self) -> usize {
        self.records.read().await.len()
    }
}

#[async_trait]
impl UsageStore for MemoryStore {
    async fn save(&self, record: &UsageRecord) -> Result<()> {
        let mut records = self.records.write().await;
        records.insert(UsageKey::new(&record.owner, &record.name), record.clone());
        Ok(())
    }

    async fn get_one(&self, owner: &str, name: &str) -> Result<Option<UsageRecord>> {
        let records = self.records.read().await;
        Ok(records.get(&UsageKey::new(owner, name)).cloned())
    }

    async fn get_all(&self, owner: &str) -> Result<Vec<UsageRecord>> {
        let records = self.records.read().await;
        let mut owned: Vec<UsageRecord> = records
            .iter()
            .filter(|(key, _)| key.owner == owner)
            .map(|(_, record)| record.clone())
            .collect();
        owned.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(owned)
    }

    async fn delete_one(&self, owner: &str, name: &str) -> Result<()> {
        let mut records = self.records.write().await;
        records.remove(&UsageKey::new(owner, name));
        Ok(())
    }

    async fn delete_many(&self, owner: &str, names: &[String]) -> Result<()> {
        let mut records = self.records.write().await;
        for name in names {
            records.remove(&UsageKey::new(owner, name));
        }
        Ok(())
    }

    async fn delete_all(&self, owner: &str) -> Result<()> {
        let mut records = self.records.write().await;
        records.retain(|key, _| key.owner != owner);
        Ok(())
    }
}
