//! Config file shared by the CLI and embedding hosts.
//!
//! ```json
//! {
//!   "transform": { "variant": "release", "reports_dir": "build/reports" },
//!   "consent": { "cache_enabled": true }
//! }
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use privacy_hook_runtime::ConsentConfig;
use privacy_hook_transform::TransformConfig;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PrivacyHookConfig {
    pub transform: TransformConfig,
    /// Initial gate state for hosts embedding the runtime. The CLI only
    /// transforms classes and never reads this section.
    pub consent: ConsentConfig,
}

impl PrivacyHookConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).context("Failed to parse config")?;
        config.transform.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::from_json_str(&json).with_context(|| format!("Invalid config {}", path.display()))
    }
}
