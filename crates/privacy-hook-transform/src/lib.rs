//! Build-time call-site redirection for compiled classes.
//!
//! Two passes over a class set:
//!
//! 1. [`Collector`] finds static wrapper methods carrying the marker
//!    annotation and records one [`RedirectionRule`] per marker in a
//!    [`RedirectionRegistry`]. Declarative [`RuleTable`]s add more.
//! 2. [`Rewriter`] walks every call instruction of every other class and
//!    patches the ones matching a rule so they call the wrapper instead.
//!
//! The registry must be frozen into a [`RuleSet`] before rewriting, so the
//! second pass always sees the complete rule set.
//!
//! ```ignore
//! let config = TransformConfig::default().with_reports_dir("build/reports");
//! let summary = Pipeline::new(config).run(Path::new("classes"), Path::new("out"))?;
//! println!("{} call sites rewritten", summary.rewrite.call_sites_rewritten);
//! ```

pub mod class_set;
pub mod collector;
pub mod config;
pub mod error;
pub mod parallel;
pub mod pipeline;
pub mod registry;
pub mod report;
pub mod rewriter;
pub mod rule;
pub mod table;

pub use class_set::{ClassEntry, ClassSet};
pub use collector::{CollectSummary, Collector};
pub use config::TransformConfig;
pub use error::TransformError;
pub use pipeline::{Pipeline, PipelineSummary};
pub use registry::{RedirectionRegistry, RuleSet};
pub use report::PassReport;
pub use rewriter::{ClassDisposition, RewriteRecord, RewriteSummary, Rewriter};
pub use rule::{CallSite, RedirectionRule, RuleIdentity, WILDCARD_OWNER};
pub use table::RuleTable;
