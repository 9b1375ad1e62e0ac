//! Build-time transform configuration.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::rule::{RuleIdentity, WILDCARD_OWNER};

/// Annotation type that marks a static wrapper method.
pub const DEFAULT_MARKER_DESCRIPTOR: &str = "Lcom/privacyhook/annotation/PrivacyMethodReplace;";

/// Configuration for the collector and rewriter passes.
///
/// Loaded from JSON (every field optional) and refined with the `with_*`
/// builder methods.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformConfig {
    /// Field descriptor of the marker annotation type.
    pub marker_descriptor: String,

    /// Owner that matches every call-site owner (default: `java/lang/Object`).
    pub wildcard_owner: String,

    /// Duplicate detection for rules (default: method name only).
    pub rule_identity: RuleIdentity,

    /// Internal class names, or prefixes ending in `/`, that are never rewritten.
    pub skip_classes: Vec<String>,

    /// Directory for pass reports. No reports are written when unset.
    pub reports_dir: Option<PathBuf>,

    /// Build variant name used in report paths.
    pub variant: String,

    /// Worker threads for the passes. `None` uses the global rayon pool.
    pub threads: Option<usize>,

    /// Declarative rule tables inserted after scanned rules.
    pub rule_tables: Vec<PathBuf>,

    /// Also insert the bundled Android privacy table.
    pub use_builtin_rules: bool,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            marker_descriptor: DEFAULT_MARKER_DESCRIPTOR.to_string(),
            wildcard_owner: WILDCARD_OWNER.to_string(),
            rule_identity: RuleIdentity::default(),
            skip_classes: Vec::new(),
            reports_dir: None,
            variant: "debug".to_string(),
            threads: None,
            rule_tables: Vec::new(),
            use_builtin_rules: false,
        }
    }
}

impl TransformConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a JSON config file. Missing fields take their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Self = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.marker_descriptor.starts_with('L') && self.marker_descriptor.ends_with(';')) {
            return Err(anyhow!(
                "marker_descriptor must be an object descriptor like Lcom/example/Marker;, got {:?}",
                self.marker_descriptor
            ));
        }
        if self.wildcard_owner.is_empty() {
            return Err(anyhow!("wildcard_owner must not be empty"));
        }
        if self.threads == Some(0) {
            return Err(anyhow!("threads must be at least 1"));
        }
        Ok(())
    }

    /// Builder method: set the marker annotation descriptor.
    pub fn with_marker_descriptor(mut self, descriptor: impl Into<String>) -> Self {
        self.marker_descriptor = descriptor.into();
        self
    }

    pub fn with_wildcard_owner(mut self, owner: impl Into<String>) -> Self {
        self.wildcard_owner = owner.into();
        self
    }

    /// Builder method: choose how duplicate rules are detected.
    pub fn with_rule_identity(mut self, identity: RuleIdentity) -> Self {
        self.rule_identity = identity;
        self
    }

    pub fn with_skip_class(mut self, class: impl Into<String>) -> Self {
        self.skip_classes.push(class.into());
        self
    }

    /// Builder method: write pass reports under `dir`.
    pub fn with_reports_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.reports_dir = Some(dir.into());
        self
    }

    pub fn with_variant(mut self, variant: impl Into<String>) -> Self {
        self.variant = variant.into();
        self
    }

    pub fn with_threads(mut self, threads: Option<usize>) -> Self {
        self.threads = threads;
        self
    }

    pub fn with_rule_table(mut self, path: impl Into<PathBuf>) -> Self {
        self.rule_tables.push(path.into());
        self
    }

    pub fn with_builtin_rules(mut self, enabled: bool) -> Self {
        self.use_builtin_rules = enabled;
        self
    }

    /// Whether `class_name` is excluded by `skip_classes`.
    pub fn is_skipped(&self, class_name: &str) -> bool {
        self.skip_classes.iter().any(|entry| {
            if entry.ends_with('/') {
                class_name.starts_with(entry.as_str())
            } else {
                class_name == entry
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = TransformConfig::default();
        assert_eq!(config.marker_descriptor, DEFAULT_MARKER_DESCRIPTOR);
        assert_eq!(config.wildcard_owner, "java/lang/Object");
        assert_eq!(config.rule_identity, RuleIdentity::MethodName);
        assert!(config.reports_dir.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"rule_identity": "qualified", "skip_classes": ["com/vendor/"], "threads": 2}}"#
        )
        .unwrap();
        let config = TransformConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.rule_identity, RuleIdentity::Qualified);
        assert_eq!(config.threads, Some(2));
        assert_eq!(config.variant, "debug");
        assert!(config.is_skipped("com/vendor/sdk/Tracker"));
        assert!(!config.is_skipped("com/vendorx/Tracker"));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"marker_descriptor": "com/example/Marker"}}"#).unwrap();
        let err = TransformConfig::from_json_file(file.path()).unwrap_err();
        assert!(err.to_string().contains("marker_descriptor"));

        assert!(TransformConfig::new().with_threads(Some(0)).validate().is_err());
    }

    #[test]
    fn test_builder_chain() {
        let config = TransformConfig::new()
            .with_skip_class("com/example/Generated")
            .with_variant("release")
            .with_builtin_rules(true)
            .with_rule_table("rules.json");
        assert!(config.is_skipped("com/example/Generated"));
        assert!(!config.is_skipped("com/example/GeneratedTwo"));
        assert_eq!(config.variant, "release");
        assert!(config.use_builtin_rules);
        assert_eq!(config.rule_tables, vec![PathBuf::from("rules.json")]);
    }
}
