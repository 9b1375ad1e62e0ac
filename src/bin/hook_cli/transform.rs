//! Transform command - collect rules and rewrite a class tree

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

use privacy_hook_transform::Pipeline;

use super::{print_json, RuleSourceArgs};

#[derive(Parser, Debug)]
pub struct TransformCmd {
    /// Directory of compiled classes to read
    #[arg(long)]
    pub input: PathBuf,

    /// Directory to write the rewritten tree into
    #[arg(long)]
    pub output: PathBuf,

    /// Directory for collect/rewrite pass reports
    #[arg(long, value_name = "DIR")]
    pub reports: Option<PathBuf>,

    /// Build variant name used in report paths
    #[arg(long)]
    pub variant: Option<String>,

    /// Worker threads per pass (default: rayon's global pool)
    #[arg(long)]
    pub threads: Option<usize>,

    #[command(flatten)]
    pub sources: RuleSourceArgs,
}

impl TransformCmd {
    pub fn execute(&self, json_output: bool, verbose: bool) -> Result<()> {
        let mut config = self.sources.resolve()?;
        if let Some(dir) = &self.reports {
            config = config.with_reports_dir(dir);
        }
        if let Some(variant) = &self.variant {
            config = config.with_variant(variant);
        }
        if self.threads.is_some() {
            config = config.with_threads(self.threads);
        }
        config.validate()?;

        let pipeline = Pipeline::new(config);
        let summary = pipeline.run(&self.input, &self.output)?;
        info!(run_id = %summary.run_id, "transform finished");

        if json_output {
            return print_json(&summary);
        }

        println!(
            "Collected {} rule(s) from {} marker(s) ({} duplicate(s))",
            summary.rules, summary.collect.markers_found, summary.collect.duplicates
        );
        println!(
            "Rewrote {} call site(s) in {} of {} class(es)",
            summary.rewrite.call_sites_rewritten,
            summary.rewrite.classes_rewritten,
            summary.rewrite.classes_seen
        );
        println!(
            "Wrote {} file(s) to {}",
            summary.files_written,
            self.output.display()
        );
        if verbose {
            println!(
                "Skipped {} wrapper class(es), {} configured class(es); copied {} resource(s)",
                summary.rewrite.wrapper_classes_skipped,
                summary.rewrite.classes_skipped,
                summary.rewrite.resources
            );
        }
        for report in [&summary.collect_report, &summary.rewrite_report]
            .into_iter()
            .flatten()
        {
            println!("Report: {}", report.display());
        }
        Ok(())
    }
}
