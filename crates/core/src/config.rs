use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::subgraph::{BlockDescription, SizePolicy};

/// Settings for the layout pipeline, loaded from `compose.yaml`/`compose.json`.
///
/// Every field has a default, so an empty file (or no file) is valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComposerConfig {
    pub size_policy: SizePolicy,
    /// Transform names applied in order when none are given on the command line.
    pub transforms: Vec<String>,
    /// Id assigned to the first block the summary merger creates.
    pub first_block_id: u32,
}

impl Default for ComposerConfig {
    fn default() -> Self {
        Self { size_policy: SizePolicy::default(), transforms: Vec::new(), first_block_id: 1 }
    }
}

impl ComposerConfig {
    pub fn validate(&self) -> Result<()> {
        let alignment = self.size_policy.data_alignment;
        if !BlockDescription::is_valid_alignment(alignment) {
            bail!("size_policy.data_alignment {alignment} must be 0 or a power of two");
        }
        Ok(())
    }
}

/// Load a composer config (YAML unless the extension is `.json`).
pub fn load_config(path: &Path) -> Result<ComposerConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read composer config at {}", path.display()))?;
    let config: ComposerConfig = if path.extension().and_then(|e| e.to_str()) == Some("json") {
        serde_json::from_str(&text).context("Failed to parse composer config JSON")?
    } else if text.trim().is_empty() {
        ComposerConfig::default()
    } else {
        serde_yaml::from_str(&text).context("Failed to parse composer config YAML")?
    };
    config
        .validate()
        .with_context(|| format!("Invalid composer config {}", path.display()))?;
    Ok(config)
}
