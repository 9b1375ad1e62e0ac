//! Declarative redirection tables.
//!
//! A table is a JSON array of `{ "original": <shape>, "target": <shape> }`
//! entries, where a shape is `{ owner, method, descriptor, kind }` plus an
//! optional `interface` flag for interface owners. Tables let
//! a build redirect calls without compiling marker-annotated wrappers first.

use anyhow::{Context, Result};
use privacy_hook_classfile::{InvocationKind, MethodDescriptor};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::TransformError;
use crate::rule::RedirectionRule;

const BUILTIN_ANDROID_PRIVACY: &str = include_str!("../rules/android_privacy.json");

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallShape {
    pub owner: String,
    pub method: String,
    pub descriptor: String,
    pub kind: InvocationKind,
    /// Owner is an interface. Only meaningful on the target side.
    #[serde(default)]
    pub interface: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableEntry {
    pub original: CallShape,
    pub target: CallShape,
}

impl TableEntry {
    fn into_rule(self, source: &str, position: usize) -> Result<RedirectionRule, TransformError> {
        let label = format!(
            "entry {} ({}.{})",
            position, self.original.owner, self.original.method
        );
        let fail = |reason: String| TransformError::configuration(source, label.clone(), reason);

        for (side, shape) in [("original", &self.original), ("target", &self.target)] {
            if shape.method.is_empty() {
                return Err(fail(format!("{} method is empty", side)));
            }
            if shape.owner.is_empty() && shape.kind != InvocationKind::Dynamic {
                return Err(fail(format!("{} owner is empty", side)));
            }
            MethodDescriptor::parse(&shape.descriptor)
                .map_err(|e| fail(format!("{} descriptor: {}", side, e)))?;
        }
        if self.target.kind == InvocationKind::Dynamic {
            return Err(fail("target cannot be an invokedynamic call".to_string()));
        }
        if self.target.kind.instruction_len() > self.original.kind.instruction_len() {
            return Err(fail(format!(
                "a {} call cannot be patched into a {} call in place",
                self.original.kind, self.target.kind
            )));
        }

        let rule = RedirectionRule {
            original_owner: self.original.owner,
            original_method: self.original.method,
            original_descriptor: self.original.descriptor,
            original_kind: self.original.kind,
            target_owner: self.target.owner,
            target_method: self.target.method,
            target_descriptor: self.target.descriptor,
            target_kind: self.target.kind,
            target_interface: self.target.interface,
        };
        rule.check_stack_shape().map_err(fail)?;
        Ok(rule)
    }
}

/// A validated set of rules read from a table.
#[derive(Debug, Clone, Default)]
pub struct RuleTable {
    source: String,
    rules: Vec<RedirectionRule>,
}

impl RuleTable {
    /// Parse and validate a table. `source` names it in error messages.
    pub fn from_json(source: &str, json: &str) -> Result<Self> {
        let entries: Vec<TableEntry> = serde_json::from_str(json)
            .with_context(|| format!("Failed to parse rule table {}", source))?;
        let rules = entries
            .into_iter()
            .enumerate()
            .map(|(i, entry)| entry.into_rule(source, i))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            source: source.to_string(),
            rules,
        })
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read rule table {}", path.display()))?;
        Self::from_json(&path.display().to_string(), &json)
    }

    /// The bundled Android privacy table, targeting `com/privacyhook/PrivacyManager`.
    pub fn builtin() -> Result<Self> {
        Self::from_json("builtin:android_privacy", BUILTIN_ANDROID_PRIVACY)
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn rules(&self) -> &[RedirectionRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
