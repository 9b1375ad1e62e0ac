//! Collect command - list the redirection rules a class tree would produce

use anyhow::Result;
use clap::Parser;
use serde::Serialize;
use std::path::PathBuf;

use privacy_hook_transform::{ClassSet, CollectSummary, Pipeline, RedirectionRule};

use super::{print_json, RuleSourceArgs};

#[derive(Parser, Debug)]
pub struct CollectCmd {
    /// Directory of compiled classes to scan
    #[arg(long)]
    pub input: PathBuf,

    #[command(flatten)]
    pub sources: RuleSourceArgs,
}

#[derive(Serialize)]
struct CollectOutput<'a> {
    summary: &'a CollectSummary,
    wrapper_classes: Vec<&'a str>,
    rules: &'a [RedirectionRule],
}

impl CollectCmd {
    pub fn execute(&self, json_output: bool, verbose: bool) -> Result<()> {
        let config = self.sources.resolve()?;
        config.validate()?;
        let classes = ClassSet::load_dir(&self.input)?;
        let collected = Pipeline::new(config).collect(&classes)?;

        if json_output {
            return print_json(&CollectOutput {
                summary: &collected.summary,
                wrapper_classes: collected.rules.wrapper_classes().collect(),
                rules: collected.rules.rules(),
            });
        }

        for rule in collected.rules.rules() {
            println!("{}", rule);
        }
        if verbose {
            for class in collected.rules.wrapper_classes() {
                println!("wrapper class: {}", class);
            }
        }
        println!(
            "{} rule(s), {} duplicate(s), {} class(es) scanned",
            collected.rules.len(),
            collected.summary.duplicates,
            collected.summary.classes_scanned
        );
        Ok(())
    }
}
