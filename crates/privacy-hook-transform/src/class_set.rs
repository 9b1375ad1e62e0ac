//! Loading and writing the set of compiled classes a build produces.

use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};
use tracing::warn;

/// One file from the input tree. Non-class files are carried through untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassEntry {
    /// Path relative to the input root, `/`-separated
    pub relative_path: String,
    pub bytes: Vec<u8>,
}

impl ClassEntry {
    pub fn new(relative_path: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            relative_path: relative_path.into(),
            bytes,
        }
    }

    pub fn is_class(&self) -> bool {
        self.relative_path.ends_with(".class")
    }
}

/// All files of a build output, sorted by relative path.
#[derive(Debug, Clone, Default)]
pub struct ClassSet {
    entries: Vec<ClassEntry>,
}

impl ClassSet {
    pub fn new(mut entries: Vec<ClassEntry>) -> Self {
        entries.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
        Self { entries }
    }

    /// Read every file under `root` recursively.
    pub fn load_dir(root: &Path) -> Result<Self> {
        if !root.is_dir() {
            return Err(anyhow!("Input {} is not a directory", root.display()));
        }
        let mut entries = Vec::new();
        let mut pending = vec![root.to_path_buf()];
        while let Some(dir) = pending.pop() {
            let listing = std::fs::read_dir(&dir)
                .with_context(|| format!("Failed to list {}", dir.display()))?;
            for item in listing {
                let item = item.with_context(|| format!("Failed to list {}", dir.display()))?;
                let path = item.path();
                // Does not follow symlinks, so link cycles cannot recurse.
                let file_type = item
                    .file_type()
                    .with_context(|| format!("Failed to stat {}", path.display()))?;
                if file_type.is_dir() {
                    pending.push(path);
                    continue;
                }
                if file_type.is_symlink() && path.is_dir() {
                    warn!(path = %path.display(), "skipping symlinked directory");
                    continue;
                }
                let bytes = std::fs::read(&path)
                    .with_context(|| format!("Failed to read {}", path.display()))?;
                entries.push(ClassEntry::new(relative_name(root, &path)?, bytes));
            }
        }
        Ok(Self::new(entries))
    }

    pub fn entries(&self) -> &[ClassEntry] {
        &self.entries
    }

    pub fn classes(&self) -> impl Iterator<Item = &ClassEntry> {
        self.entries.iter().filter(|e| e.is_class())
    }

    pub fn class_count(&self) -> usize {
        self.classes().count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Write every entry under `root`, each file atomically.
    pub fn write_tree(&self, root: &Path) -> Result<()> {
        for entry in &self.entries {
            atomic_write(&root.join(&entry.relative_path), &entry.bytes)?;
        }
        Ok(())
    }
}

fn relative_name(root: &Path, path: &Path) -> Result<String> {
    let relative = path
        .strip_prefix(root)
        .map_err(|_| anyhow!("{} is outside {}", path.display(), root.display()))?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Ok(parts.join("/"))
}

/// Ensure all parent directories exist for a path.
pub fn ensure_parent_dirs(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| anyhow!("Failed to create directory {}: {}", parent.display(), e))?;
    }
    Ok(())
}

/// Write a file via a sibling temp file and rename, so readers never see a
/// partially written class.
pub fn atomic_write(path: &Path, contents: &[u8]) -> Result<()> {
    ensure_parent_dirs(path)?;
    let tmp_path = temp_sibling(path);
    std::fs::write(&tmp_path, contents)
        .map_err(|e| anyhow!("Failed to write temp file {}: {}", tmp_path.display(), e))?;
    std::fs::rename(&tmp_path, path).map_err(|e| {
        anyhow!(
            "Failed to rename {} to {}: {}",
            tmp_path.display(),
            path.display(),
            e
        )
    })?;
    Ok(())
}

fn temp_sibling(path: &Path) -> PathBuf {
    path.with_extension(format!(
        "{}.tmp",
        path.extension().and_then(|s| s.to_str()).unwrap_or("tmp")
    ))
}
