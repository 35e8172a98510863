//! Resource Selector
//!
//! Ranks catalog models by a caller-supplied priority list and keeps only
//! those with quota left for the owner.

use serde::{Deserialize, Deserializer, Serialize};

use super::catalog::{Catalog, ResourceDefinition};
use super::remaining::remaining;
use super::usage::{RemainingQuota, UsageRecord};
use crate::error::{QuotaError, Result};

/// Body of a selection query
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SelectRequest {
    /// Preferred models, most preferred first; may be omitted but not `null`
    #[serde(default, deserialize_with = "present_list")]
    pub model_priority: Option<Vec<String>>,

    /// Also consider models missing from `model_priority`, after the listed ones
    #[serde(default)]
    pub fallback_all: bool,
}

/// A present field must hold a list; absence is handled by `default`
fn present_list<'de, D>(deserializer: D) -> std::result::Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Vec::deserialize(deserializer).map(Some)
}

impl SelectRequest {
    pub fn new(model_priority: Option<Vec<String>>, fallback_all: bool) -> Self {
        Self {
            model_priority,
            fallback_all,
        }
    }

    /// Check the request against the catalog before any usage is read
    pub fn validate(&self, catalog: &Catalog) -> Result<()> {
        match &self.model_priority {
            None if !self.fallback_all => Err(QuotaError::InvalidSelection),
            None => Ok(()),
            Some(priority) if priority.is_empty() => Err(QuotaError::Validation(
                "modelPriority must name at least one model".to_string(),
            )),
            Some(priority) => match priority.iter().find(|name| !catalog.exists(name)) {
                Some(unknown) => Err(QuotaError::UnknownResource(unknown.clone())),
                None => Ok(()),
            },
        }
    }
}

/// Stable sort of `items` by position of `key(item)` in `reference`.
///
/// Items whose key is not referenced keep their relative order after all
/// referenced ones.
pub fn sort_by_reference<T, F>(items: &mut [T], reference: &[String], key: F)
where
    F: Fn(&T) -> &str,
{
    items.sort_by_key(|item| {
        reference
            .iter()
            .position(|name| name == key(item))
            .unwrap_or(usize::MAX)
    });
}

/// Models `owner` can still use, in priority order.
///
/// `usages` are the owner's stored records; models without one are evaluated
/// against a fresh record that is not persisted.
pub fn select(
    owner: &str,
    usages: &[UsageRecord],
    catalog: &Catalog,
    request: &SelectRequest,
    now: i64,
) -> Result<Vec<RemainingQuota>> {
    if request.model_priority.is_none() && !request.fallback_all {
        return Err(QuotaError::InvalidSelection);
    }

    let mut candidates: Vec<&ResourceDefinition> = catalog.list().iter().collect();

    if let Some(priority) = &request.model_priority {
        sort_by_reference(&mut candidates, priority, |model| model.name.as_str());

        if !request.fallback_all {
            candidates.retain(|model| priority.contains(&model.name));
        }
    }

    let selected = candidates
        .into_iter()
        .map(|model| {
            let usage = usages
                .iter()
                .find(|usage| usage.name == model.name)
                .cloned()
                .unwrap_or_else(|| UsageRecord::new(model, owner, now));
            remaining(usage, catalog, now)
        })
        .filter(RemainingQuota::is_available)
        .collect();

    Ok(selected)
}
