//! Pass 1: turn marker-annotated wrapper methods into redirection rules.

use anyhow::Result;
use privacy_hook_classfile::ClassFile;
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info};

use crate::class_set::{ClassEntry, ClassSet};
use crate::config::TransformConfig;
use crate::error::TransformError;
use crate::registry::RedirectionRegistry;
use crate::report::PassReport;
use crate::rule::{RedirectionRule, WrapperMethod};
use crate::table::RuleTable;

/// Wrapper rules found in one class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedClass {
    pub class_name: String,
    pub rules: Vec<RedirectionRule>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CollectSummary {
    pub classes_scanned: usize,
    pub wrapper_classes: usize,
    pub markers_found: usize,
    pub rules_added: usize,
    /// Markers whose rule collapsed into an existing one
    pub duplicates: usize,
}

impl CollectSummary {
    fn absorb(&mut self, other: CollectSummary) {
        self.classes_scanned += other.classes_scanned;
        self.wrapper_classes += other.wrapper_classes;
        self.markers_found += other.markers_found;
        self.rules_added += other.rules_added;
        self.duplicates += other.duplicates;
    }
}

pub struct Collector<'a> {
    config: &'a TransformConfig,
}

impl<'a> Collector<'a> {
    pub fn new(config: &'a TransformConfig) -> Self {
        Self { config }
    }

    /// Extract the rules declared by one class. Returns `None` for classes
    /// with no marked methods.
    pub fn scan_class(&self, entry: &ClassEntry) -> Result<Option<ScannedClass>> {
        let class = ClassFile::parse(&entry.bytes).map_err(|e| TransformError::MalformedClass {
            path: entry.relative_path.clone(),
            reason: format!("{:#}", e),
        })?;
        let class_name = class.name()?;
        let pool = &class.constant_pool;

        let mut rules = Vec::new();
        for method in &class.methods {
            let name = method.name(pool)?;
            let descriptor = method.descriptor(pool)?;
            let annotations = method.annotations(pool).map_err(|e| {
                TransformError::configuration(
                    &class_name,
                    format!("{}{}", name, descriptor),
                    format!("unreadable annotations: {:#}", e),
                )
            })?;
            let wrapper = WrapperMethod {
                class_name: &class_name,
                name: &name,
                descriptor: &descriptor,
                is_static: method.is_static(),
                in_interface: class.is_interface(),
            };
            for marker in annotations
                .iter()
                .filter(|a| a.type_descriptor == self.config.marker_descriptor)
            {
                rules.push(RedirectionRule::from_marker(wrapper, marker)?);
            }
        }

        if rules.is_empty() {
            return Ok(None);
        }
        Ok(Some(ScannedClass { class_name, rules }))
    }

    /// Scan every class and insert the discovered rules into `registry`.
    ///
    /// Classes are decoded in parallel. Insertion happens afterwards in
    /// sorted path order, so rule priority does not depend on scheduling.
    /// The first error aborts the pass.
    pub fn collect(
        &self,
        classes: &ClassSet,
        registry: &RedirectionRegistry,
        report: &mut PassReport,
    ) -> Result<CollectSummary> {
        let entries: Vec<&ClassEntry> = classes.classes().collect();
        let scanned: Vec<Option<ScannedClass>> = entries
            .par_iter()
            .map(|entry| self.scan_class(entry))
            .collect::<Result<Vec<_>>>()?;

        let mut summary = CollectSummary {
            classes_scanned: entries.len(),
            ..Default::default()
        };
        for found in scanned.into_iter().flatten() {
            summary.wrapper_classes += 1;
            registry.mark_wrapper_class(found.class_name.as_str());
            summary.absorb(self.insert_rules(found.rules, registry, report));
        }

        info!(
            classes = summary.classes_scanned,
            wrapper_classes = summary.wrapper_classes,
            rules = summary.rules_added,
            duplicates = summary.duplicates,
            "collect pass finished"
        );
        Ok(summary)
    }

    /// Insert the rules of a declarative table. Target owners count as
    /// wrapper classes and are never rewritten.
    pub fn collect_table(
        &self,
        table: &RuleTable,
        registry: &RedirectionRegistry,
        report: &mut PassReport,
    ) -> CollectSummary {
        report.line(format!("table: {}", table.source()));
        for rule in table.rules() {
            registry.mark_wrapper_class(rule.target_owner.as_str());
        }
        let summary = self.insert_rules(table.rules().to_vec(), registry, report);
        info!(
            table = table.source(),
            rules = summary.rules_added,
            duplicates = summary.duplicates,
            "rule table loaded"
        );
        summary
    }

    fn insert_rules(
        &self,
        rules: Vec<RedirectionRule>,
        registry: &RedirectionRegistry,
        report: &mut PassReport,
    ) -> CollectSummary {
        let mut summary = CollectSummary::default();
        for rule in rules {
            summary.markers_found += 1;
            let line = rule.to_string();
            if registry.insert_if_absent(rule) {
                summary.rules_added += 1;
                debug!(rule = %line, "add rule");
                report.line(format!("add rule: {}", line));
            } else {
                summary.duplicates += 1;
                debug!(rule = %line, "rule already present");
                report.line(format!("duplicate rule: {}", line));
            }
        }
        summary
    }
}
