// src/materials/snapshot.rs
//! Saved material state.
//!
//! Only what the user decided survives a save: property values and the
//! override buffer (plus values written to custom override uniforms). The
//! active and persisted parameter sets are rebuilt on restore.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::context::Context;
use crate::error::Result;
use crate::value::PropertyValue;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MaterialSnapshot {
    /// Catalog the values belong to (`"terrain"`, `"ocean"`).
    #[serde(default)]
    pub catalog: String,
    pub values: BTreeMap<String, PropertyValue>,
    #[serde(default)]
    pub override_enabled: bool,
    #[serde(default)]
    pub override_source: String,
    /// Uniforms declared only by the override source.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub shader_params: BTreeMap<String, PropertyValue>,
}

impl MaterialSnapshot {
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("serializing material snapshot")
    }

    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("parsing material snapshot")
    }

    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let json = self.to_json()?;
        std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))
    }

    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::from_json(&text)
    }
}
