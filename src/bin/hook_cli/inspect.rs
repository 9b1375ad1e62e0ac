//! Inspect command - list the call sites in one class file

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use std::path::PathBuf;

use privacy_hook_classfile::{ClassFile, InvocationKind};

use super::print_json;

#[derive(Parser, Debug)]
pub struct InspectCmd {
    /// Path to a .class file
    pub class_file: PathBuf,
}

#[derive(Debug, Serialize)]
struct CallSiteRow {
    method: String,
    offset: usize,
    kind: InvocationKind,
    owner: String,
    name: String,
    descriptor: String,
}

#[derive(Debug, Serialize)]
struct InspectOutput {
    class: String,
    call_sites: Vec<CallSiteRow>,
}

impl InspectCmd {
    pub fn execute(&self, json_output: bool) -> Result<()> {
        let bytes = std::fs::read(&self.class_file)
            .with_context(|| format!("Failed to read {}", self.class_file.display()))?;
        let class = ClassFile::parse(&bytes)
            .with_context(|| format!("Failed to parse {}", self.class_file.display()))?;

        let pool = &class.constant_pool;
        let mut call_sites = Vec::new();
        for method in &class.methods {
            let Some(code) = method.code(pool)? else {
                continue;
            };
            let label = format!("{}{}", method.name(pool)?, method.descriptor(pool)?);
            for site in class.invoke_sites(&code)? {
                call_sites.push(CallSiteRow {
                    method: label.clone(),
                    offset: site.offset,
                    kind: site.kind,
                    owner: site.owner,
                    name: site.name,
                    descriptor: site.descriptor,
                });
            }
        }
        let output = InspectOutput {
            class: class.name()?,
            call_sites,
        };

        if json_output {
            return print_json(&output);
        }

        println!("{}", output.class);
        for row in &output.call_sites {
            let owner = if row.owner.is_empty() { "<dynamic>" } else { row.owner.as_str() };
            println!(
                "  {} @{}: {} {}.{}{}",
                row.method, row.offset, row.kind, owner, row.name, row.descriptor
            );
        }
        Ok(())
    }
}
