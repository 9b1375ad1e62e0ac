//! Pass 2: redirect matching call instructions to their wrappers.
//!
//! Every call instruction of every eligible class is resolved to a
//! [`CallSite`] and looked up in the frozen [`RuleSet`]. A match is patched
//! in place; the instruction keeps its offset and length, so branch targets,
//! exception ranges and stack maps stay valid. Classes without a match are
//! emitted byte-identical.

use anyhow::{Context, Result};
use privacy_hook_classfile::{ClassFile, CodeAttribute, InvocationKind, MethodDescriptor};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, trace};

use crate::class_set::{ClassEntry, ClassSet};
use crate::config::TransformConfig;
use crate::error::TransformError;
use crate::registry::RuleSet;
use crate::report::PassReport;
use crate::rule::{CallSite, RedirectionRule};

const SPECIAL_CLASSES: [&str; 2] = ["module-info.class", "package-info.class"];

/// One patched call instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RewriteRecord {
    pub class_name: String,
    pub method: String,
    pub offset: usize,
    pub before: String,
    pub after: String,
}

impl RewriteRecord {
    pub fn report_line(&self) -> String {
        format!(
            "rewrite {}#{} @{}: {} -> {}",
            self.class_name, self.method, self.offset, self.before, self.after
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassDisposition {
    /// Not a class file
    Resource,
    /// `module-info` or `package-info`
    Descriptor,
    /// Declares wrapper methods
    WrapperClass,
    /// Excluded by configuration
    Skipped,
    Unchanged,
    Rewritten,
}

#[derive(Debug, Clone)]
pub struct ClassOutcome {
    pub relative_path: String,
    pub class_name: Option<String>,
    pub disposition: ClassDisposition,
    pub bytes: Vec<u8>,
    pub records: Vec<RewriteRecord>,
}

impl ClassOutcome {
    fn untouched(entry: &ClassEntry, class_name: Option<String>, disposition: ClassDisposition) -> Self {
        Self {
            relative_path: entry.relative_path.clone(),
            class_name,
            disposition,
            bytes: entry.bytes.clone(),
            records: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RewriteSummary {
    pub classes_seen: usize,
    pub classes_rewritten: usize,
    pub call_sites_rewritten: usize,
    pub wrapper_classes_skipped: usize,
    pub classes_skipped: usize,
    pub resources: usize,
}

pub struct Rewriter<'a> {
    rules: &'a RuleSet,
    config: &'a TransformConfig,
}

impl<'a> Rewriter<'a> {
    pub fn new(rules: &'a RuleSet, config: &'a TransformConfig) -> Self {
        Self { rules, config }
    }

    pub fn rewrite_class(&self, entry: &ClassEntry) -> Result<ClassOutcome> {
        if !entry.is_class() {
            return Ok(ClassOutcome::untouched(entry, None, ClassDisposition::Resource));
        }
        let file_name = entry
            .relative_path
            .rsplit('/')
            .next()
            .unwrap_or(entry.relative_path.as_str());
        if SPECIAL_CLASSES.contains(&file_name) {
            return Ok(ClassOutcome::untouched(entry, None, ClassDisposition::Descriptor));
        }

        let mut class = ClassFile::parse(&entry.bytes).map_err(|e| TransformError::MalformedClass {
            path: entry.relative_path.clone(),
            reason: format!("{:#}", e),
        })?;
        let class_name = class.name()?;

        if self.rules.is_wrapper_class(&class_name) {
            trace!(class = %class_name, "skipping wrapper class");
            return Ok(ClassOutcome::untouched(
                entry,
                Some(class_name),
                ClassDisposition::WrapperClass,
            ));
        }
        if self.config.is_skipped(&class_name) {
            return Ok(ClassOutcome::untouched(entry, Some(class_name), ClassDisposition::Skipped));
        }

        let mut records = Vec::new();
        for m in 0..class.methods.len() {
            let Some(code_index) = class.methods[m].code_index(&class.constant_pool) else {
                continue;
            };
            let method_label = format!(
                "{}{}",
                class.methods[m].name(&class.constant_pool)?,
                class.methods[m].descriptor(&class.constant_pool)?
            );
            let mut code = CodeAttribute::parse(&class.methods[m].attributes[code_index].info)
                .with_context(|| format!("{}#{}: bad Code attribute", class_name, method_label))?;

            let before = records.len();
            for site in class.invoke_sites(&code)? {
                let call = CallSite {
                    owner: site.owner,
                    method: site.name,
                    descriptor: site.descriptor,
                    kind: site.kind,
                    class_name: class_name.clone(),
                    enclosing_method: method_label.clone(),
                    offset: site.offset,
                };
                let Some(rule) = self.rules.find_match(&call) else {
                    trace!(site = %call, class = %class_name, "no rule");
                    continue;
                };
                let target_descriptor = validate_target(rule, &call)?;
                let index = class.constant_pool.intern_method_ref(
                    &rule.target_owner,
                    &rule.target_method,
                    &rule.target_descriptor,
                    rule.target_is_interface_ref(),
                )?;
                code.patch_invoke(call.offset, rule.target_kind, index, &target_descriptor)
                    .map_err(|e| site_error(&call, format!("{:#}", e)))?;

                let record = RewriteRecord {
                    class_name: class_name.clone(),
                    method: method_label.clone(),
                    offset: call.offset,
                    before: call.to_string(),
                    after: rule.target_display(),
                };
                debug!(line = %record.report_line(), "call site redirected");
                records.push(record);
            }
            if records.len() > before {
                class.methods[m].attributes[code_index].info = code.to_bytes()?;
            }
        }

        if records.is_empty() {
            return Ok(ClassOutcome::untouched(entry, Some(class_name), ClassDisposition::Unchanged));
        }
        Ok(ClassOutcome {
            relative_path: entry.relative_path.clone(),
            class_name: Some(class_name),
            disposition: ClassDisposition::Rewritten,
            bytes: class.to_bytes()?,
            records,
        })
    }

    /// Rewrite every entry of `classes`, in parallel. Output order matches
    /// input order. The first error aborts the pass.
    pub fn rewrite_all(
        &self,
        classes: &ClassSet,
        report: &mut PassReport,
    ) -> Result<(ClassSet, RewriteSummary)> {
        let outcomes: Vec<ClassOutcome> = classes
            .entries()
            .par_iter()
            .map(|entry| self.rewrite_class(entry))
            .collect::<Result<Vec<_>>>()?;

        let mut summary = RewriteSummary::default();
        let mut output = Vec::with_capacity(outcomes.len());
        for outcome in outcomes {
            match outcome.disposition {
                ClassDisposition::Resource => summary.resources += 1,
                ClassDisposition::Descriptor | ClassDisposition::Skipped => {
                    summary.classes_seen += 1;
                    summary.classes_skipped += 1;
                    report.line(format!("skip class: {}", outcome.relative_path));
                }
                ClassDisposition::WrapperClass => {
                    summary.classes_seen += 1;
                    summary.wrapper_classes_skipped += 1;
                    report.line(format!("skip wrapper class: {}", outcome.relative_path));
                }
                ClassDisposition::Unchanged => summary.classes_seen += 1,
                ClassDisposition::Rewritten => {
                    summary.classes_seen += 1;
                    summary.classes_rewritten += 1;
                    summary.call_sites_rewritten += outcome.records.len();
                    report.extend(outcome.records.iter().map(RewriteRecord::report_line));
                }
            }
            output.push(ClassEntry::new(outcome.relative_path, outcome.bytes));
        }

        info!(
            classes = summary.classes_seen,
            rewritten = summary.classes_rewritten,
            call_sites = summary.call_sites_rewritten,
            "rewrite pass finished"
        );
        Ok((ClassSet::new(output), summary))
    }
}

fn site_error(call: &CallSite, reason: String) -> TransformError {
    TransformError::configuration(
        &call.class_name,
        format!("{} @{}", call.enclosing_method, call.offset),
        reason,
    )
}

/// Refuse rules whose target cannot replace the matched instruction without
/// changing the operand stack or moving code.
fn validate_target(rule: &RedirectionRule, call: &CallSite) -> Result<MethodDescriptor, TransformError> {
    if rule.target_kind == InvocationKind::Dynamic {
        return Err(site_error(call, "target cannot be an invokedynamic call".to_string()));
    }
    if rule.target_kind.instruction_len() > call.kind.instruction_len() {
        return Err(site_error(
            call,
            format!(
                "{} call cannot be replaced by a {} call in place",
                call.kind, rule.target_kind
            ),
        ));
    }
    rule.check_stack_shape()
        .map_err(|reason| site_error(call, format!("rule {} changes stack shape: {}", rule, reason)))?;
    MethodDescriptor::parse(&rule.target_descriptor).map_err(|e| site_error(call, e.to_string()))
}
