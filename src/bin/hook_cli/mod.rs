//! CLI subcommand implementations for privacy-hook

pub mod collect;
pub mod inspect;
pub mod transform;

use anyhow::Result;
use clap::Args;
use std::path::PathBuf;

use privacy_hook::PrivacyHookConfig;
use privacy_hook_transform::TransformConfig;

/// Rule sources shared by `transform` and `collect`.
#[derive(Args, Debug, Default)]
pub struct RuleSourceArgs {
    /// JSON rule table to load after scanned markers (repeatable)
    #[arg(long = "rules", value_name = "FILE")]
    pub rules: Vec<PathBuf>,

    /// Also load the bundled Android accessor table
    #[arg(long)]
    pub builtin_rules: bool,

    /// Keep rules distinct by owner and descriptor, not just method name
    #[arg(long)]
    pub strict_identity: bool,

    /// Config file (JSON); flags given here take precedence
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

impl RuleSourceArgs {
    /// Load `--config` (or defaults) and layer the flags on top.
    pub fn resolve(&self) -> Result<TransformConfig> {
        let mut config = match &self.config {
            Some(path) => PrivacyHookConfig::load(path)?.transform,
            None => TransformConfig::default(),
        };
        for table in &self.rules {
            config = config.with_rule_table(table);
        }
        if self.builtin_rules {
            config = config.with_builtin_rules(true);
        }
        if self.strict_identity {
            config = config.with_rule_identity(privacy_hook_transform::RuleIdentity::Qualified);
        }
        Ok(config)
    }
}

pub fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
