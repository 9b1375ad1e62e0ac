//! Two-pass driver: collect over the full class set, freeze, rewrite.

use anyhow::Result;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use uuid::Uuid;

use crate::class_set::ClassSet;
use crate::collector::{CollectSummary, Collector};
use crate::config::TransformConfig;
use crate::parallel::run_in_pool;
use crate::registry::{RedirectionRegistry, RuleSet};
use crate::report::{PassReport, COLLECT_PASS, REWRITE_PASS};
use crate::rewriter::{RewriteSummary, Rewriter};
use crate::table::RuleTable;

#[derive(Debug, Clone, Serialize)]
pub struct PipelineSummary {
    pub run_id: Uuid,
    pub collect: CollectSummary,
    pub rules: usize,
    pub rewrite: RewriteSummary,
    pub files_written: usize,
    pub collect_report: Option<PathBuf>,
    pub rewrite_report: Option<PathBuf>,
}

/// Result of pass 1 alone.
#[derive(Debug)]
pub struct Collected {
    pub rules: RuleSet,
    pub summary: CollectSummary,
    pub report: PassReport,
}

pub struct Pipeline {
    config: TransformConfig,
    run_id: Uuid,
}

impl Pipeline {
    pub fn new(config: TransformConfig) -> Self {
        Self {
            config,
            run_id: Uuid::new_v4(),
        }
    }

    pub fn config(&self) -> &TransformConfig {
        &self.config
    }

    /// Run pass 1 over `classes` plus the configured rule tables.
    ///
    /// Scanned rules take priority over table rules.
    pub fn collect(&self, classes: &ClassSet) -> Result<Collected> {
        let tables = self.load_tables()?;
        let registry = RedirectionRegistry::new(self.config.rule_identity)
            .with_wildcard_owner(self.config.wildcard_owner.as_str());
        let mut report = PassReport::new(COLLECT_PASS, self.config.variant.as_str(), self.run_id);

        let collector = Collector::new(&self.config);
        let mut summary = run_in_pool(self.config.threads, || {
            collector.collect(classes, &registry, &mut report)
        })??;
        for table in &tables {
            let from_table = collector.collect_table(table, &registry, &mut report);
            summary.markers_found += from_table.markers_found;
            summary.rules_added += from_table.rules_added;
            summary.duplicates += from_table.duplicates;
        }

        Ok(Collected {
            rules: registry.freeze(),
            summary,
            report,
        })
    }

    /// Run pass 2 with a completed rule set.
    pub fn rewrite(&self, classes: &ClassSet, rules: &RuleSet) -> Result<(ClassSet, RewriteSummary, PassReport)> {
        let mut report = PassReport::new(REWRITE_PASS, self.config.variant.as_str(), self.run_id);
        let rewriter = Rewriter::new(rules, &self.config);
        let (output, summary) = run_in_pool(self.config.threads, || {
            rewriter.rewrite_all(classes, &mut report)
        })??;
        Ok((output, summary, report))
    }

    /// Load `input`, run both passes, and write the result under `output`.
    pub fn run(&self, input: &Path, output: &Path) -> Result<PipelineSummary> {
        let classes = ClassSet::load_dir(input)?;
        info!(
            input = %input.display(),
            files = classes.len(),
            classes = classes.class_count(),
            run_id = %self.run_id,
            "starting transform"
        );

        let collected = self.collect(&classes)?;
        let collect_report = self.write_report(&collected.report);
        let rule_count = collected.rules.len();

        let (rewritten, rewrite, report) = self.rewrite(&classes, &collected.rules)?;
        rewritten.write_tree(output)?;
        let rewrite_report = self.write_report(&report);

        Ok(PipelineSummary {
            run_id: self.run_id,
            collect: collected.summary,
            rules: rule_count,
            rewrite,
            files_written: rewritten.len(),
            collect_report,
            rewrite_report,
        })
    }

    fn load_tables(&self) -> Result<Vec<RuleTable>> {
        let mut tables = Vec::new();
        if self.config.use_builtin_rules {
            tables.push(RuleTable::builtin()?);
        }
        for path in &self.config.rule_tables {
            tables.push(RuleTable::from_path(path)?);
        }
        Ok(tables)
    }

    fn write_report(&self, report: &PassReport) -> Option<PathBuf> {
        let dir = self.config.reports_dir.as_ref()?;
        match report.write(dir) {
            Ok(path) => Some(path),
            Err(e) => {
                warn!(error = %e, "failed to write pass report");
                None
            }
        }
    }
}
