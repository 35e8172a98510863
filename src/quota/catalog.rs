//! Resource Catalog
//!
//! Immutable table of model definitions and their per-minute / per-day
//! ceilings. Loaded once at startup and shared behind an `Arc`.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

use crate::error::{QuotaError, Result};

/// Fixed ceilings of one rate-limited model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResourceDefinition {
    /// Unique model name
    pub name: String,

    /// Requests per minute
    #[serde(rename = "rpm")]
    pub requests_per_minute: u64,

    /// Requests per day
    #[serde(rename = "rpd")]
    pub requests_per_day: u64,

    /// Tokens per minute, `None` when tokens are not tracked
    #[serde(rename = "tpm")]
    pub tokens_per_minute: Option<u64>,

    /// Tokens per day, `None` when tokens are not tracked
    #[serde(rename = "tpd")]
    pub tokens_per_day: Option<u64>,

    /// Auxiliary units per minute
    #[serde(rename = "ash")]
    pub aux_per_minute: Option<u64>,

    /// Auxiliary units per day
    #[serde(rename = "asd")]
    pub aux_per_day: Option<u64>,
}

impl ResourceDefinition {
    /// Create a definition that only limits requests
    pub fn new(name: impl Into<String>, requests_per_minute: u64, requests_per_day: u64) -> Self {
        Self {
            name: name.into(),
            requests_per_minute,
            requests_per_day,
            tokens_per_minute: None,
            tokens_per_day: None,
            aux_per_minute: None,
            aux_per_day: None,
        }
    }

    /// Also track tokens with the given ceilings
    pub fn with_tokens(mut self, per_minute: u64, per_day: u64) -> Self {
        self.tokens_per_minute = Some(per_minute);
        self.tokens_per_day = Some(per_day);
        self
    }

    /// Also track the auxiliary dimension with the given ceilings
    pub fn with_aux(mut self, per_minute: u64, per_day: u64) -> Self {
        self.aux_per_minute = Some(per_minute);
        self.aux_per_day = Some(per_day);
        self
    }

    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(QuotaError::Catalog("model with empty name".to_string()));
        }

        let ceilings = [
            ("rpm", Some(self.requests_per_minute)),
            ("rpd", Some(self.requests_per_day)),
            ("tpm", self.tokens_per_minute),
            ("tpd", self.tokens_per_day),
            ("ash", self.aux_per_minute),
            ("asd", self.aux_per_day),
        ];
        for (field, ceiling) in ceilings {
            match ceiling {
                Some(0) => {
                    return Err(QuotaError::Catalog(format!(
                        "model '{}' has non-positive {}",
                        self.name, field
                    )))
                }
                Some(value) if i64::try_from(value).is_err() => {
                    return Err(QuotaError::Catalog(format!(
                        "model '{}' has {} above {}",
                        self.name,
                        field,
                        i64::MAX
                    )))
                }
                _ => {}
            }
        }

        Ok(())
    }
}

/// Read-only set of model definitions, in file order
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    models: Vec<ResourceDefinition>,
}

impl Catalog {
    /// Build a catalog from definitions, validating ceilings and name uniqueness
    pub fn from_definitions(models: Vec<ResourceDefinition>) -> Result<Self> {
        let mut seen = HashSet::new();
        for model in &models {
            model.validate()?;
            if !seen.insert(model.name.as_str()) {
                return Err(QuotaError::Catalog(format!(
                    "duplicate model name '{}'",
                    model.name
                )));
            }
        }

        Ok(Self { models })
    }

    /// Parse a catalog from a JSON array of definitions
    pub fn from_json(json: &str) -> Result<Self> {
        let models: Vec<ResourceDefinition> =
            serde_json::from_str(json).map_err(|e| QuotaError::Catalog(e.to_string()))?;
        Self::from_definitions(models)
    }

    /// Load a catalog from a JSON file
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            QuotaError::Catalog(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_json(&content)
    }

    /// Get a definition by name
    pub fn get(&self, name: &str) -> Option<&ResourceDefinition> {
        self.models.iter().find(|model| model.name == name)
    }

    /// All definitions in catalog order
    pub fn list(&self) -> &[ResourceDefinition] {
        &self.models
    }

    /// Whether a model with this name exists
    pub fn exists(&self, name: &str) -> bool {
        self.models.iter().any(|model| model.name == name)
    }

    /// Get a definition or fail with `UnknownResource`
    pub fn require(&self, name: &str) -> Result<&ResourceDefinition> {
        self.get(name)
            .ok_or_else(|| QuotaError::UnknownResource(name.to_string()))
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}
