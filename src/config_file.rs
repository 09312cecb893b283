//! Attribute file handling.
//!
//! An attribute file is a JSON document with up to three tiers:
//!
//! ```json
//! { "default": {...}, "override": {...}, "force_override": {...} }
//! ```
//!
//! A document that names none of those tiers is treated as a bare override
//! map. Files are applied in the order given, on top of the built-in schema
//! defaults.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::Path;
use tracing::debug;

use crate::attributes::{AttributeStore, Tier};

const TIER_KEYS: [&str; 3] = ["default", "override", "force_override"];

/// One attribute file, split by tier.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AttributeFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default, rename = "override", skip_serializing_if = "Option::is_none")]
    pub overrides: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub force_override: Option<Value>,
}

impl AttributeFile {
    /// Parse a document, accepting either the tiered or the bare form.
    pub fn from_json_str(content: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(content).context("Failed to parse attribute JSON")?;
        let tiered = value
            .as_object()
            .is_some_and(|map| TIER_KEYS.iter().any(|k| map.contains_key(*k)));

        if tiered {
            serde_json::from_value(value)
                .context("Attribute file mixes tier keys with other top-level keys")
        } else {
            Ok(Self {
                overrides: Some(value),
                ..Self::default()
            })
        }
    }

    /// Load an attribute file from disk
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read attributes from {:?}", path.as_ref()))?;
        Self::from_json_str(&content)
            .with_context(|| format!("Invalid attribute file {:?}", path.as_ref()))
    }

    /// Merge every tier present in this file into `store`.
    pub fn apply(&self, store: &mut AttributeStore) -> crate::error::Result<()> {
        for (tier, value) in [
            (Tier::Default, &self.default),
            (Tier::Override, &self.overrides),
            (Tier::ForceOverride, &self.force_override),
        ] {
            if let Some(value) = value {
                store.merge_json(tier, value.clone())?;
            }
        }
        Ok(())
    }
}

/// Build the attribute store for one run: schema defaults, then each file in order.
pub fn load_store<P: AsRef<Path>>(paths: &[P]) -> Result<AttributeStore> {
    let mut store = AttributeStore::with_defaults();
    for path in paths {
        let file = AttributeFile::load_from_file(path)?;
        file.apply(&mut store)
            .with_context(|| format!("Failed to apply attributes from {:?}", path.as_ref()))?;
        debug!(path = ?path.as_ref(), "Applied attribute file");
    }
    Ok(store)
}
