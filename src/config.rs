// src/config.rs
//! Composer configuration, loadable from JSON.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::context::Context;
use crate::error::Result;

/// Configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComposerConfig {
    /// Embed the define-inspection block above the header end mark
    pub inject_editor_block: bool,
    /// Skip `set_shader_source` when the rendered text hashes to what is live
    pub skip_identical_sources: bool,
    /// Edge length of the region blend map texture (pixels)
    pub blend_map_size: u32,
    /// Whether to build and upload the region blend map at all
    pub generate_blend_map: bool,
}

impl Default for ComposerConfig {
    fn default() -> Self {
        Self {
            inject_editor_block: false,
            skip_identical_sources: true,
            blend_map_size: 512,
            generate_blend_map: true,
        }
    }
}

impl ComposerConfig {
    /// Parses a config; missing keys take their defaults.
    pub fn from_json_str(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("parsing composer config")
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::from_json_str(&text).with_context(|| format!("loading config {}", path.display()))
    }
}
