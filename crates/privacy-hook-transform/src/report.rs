//! Human-readable pass reports.
//!
//! Reports are advisory. Nothing reads them back; a failure to write one is
//! logged and does not fail the pass.

use anyhow::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::class_set::atomic_write;

pub const COLLECT_PASS: &str = "collect";
pub const REWRITE_PASS: &str = "rewrite";

#[derive(Debug, Clone)]
pub struct PassReport {
    pass: String,
    variant: String,
    run_id: Uuid,
    started_at: DateTime<Utc>,
    lines: Vec<String>,
}

impl PassReport {
    pub fn new(pass: impl Into<String>, variant: impl Into<String>, run_id: Uuid) -> Self {
        Self {
            pass: pass.into(),
            variant: variant.into(),
            run_id,
            started_at: Utc::now(),
            lines: Vec::new(),
        }
    }

    pub fn line(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }

    pub fn extend<I: IntoIterator<Item = String>>(&mut self, lines: I) {
        self.lines.extend(lines);
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// `<reports_dir>/<pass>/<variant>/report.txt`
    pub fn path_in(&self, reports_dir: &Path) -> PathBuf {
        reports_dir
            .join(&self.pass)
            .join(&self.variant)
            .join("report.txt")
    }

    pub fn render(&self, finished_at: DateTime<Utc>) -> String {
        let mut out = format!(
            "--start-- {} run={}\n",
            self.started_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            self.run_id
        );
        for line in &self.lines {
            out.push_str(line);
            out.push('\n');
        }
        out.push_str(&format!(
            "--end-- {}\n",
            finished_at.to_rfc3339_opts(SecondsFormat::Millis, true)
        ));
        out
    }

    /// Write the report, replacing any previous one for the same pass and variant.
    pub fn write(&self, reports_dir: &Path) -> Result<PathBuf> {
        let path = self.path_in(reports_dir);
        atomic_write(&path, self.render(Utc::now()).as_bytes())?;
        Ok(path)
    }
}
