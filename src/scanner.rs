//! Source directory scanning.
//!
//! Walks a collection's directory and keeps the files whose relative path
//! matches one of the configured include globs (case-insensitive, so
//! `REPORT.PDF` counts as a PDF). Returned paths are absolute and sorted so
//! indexing order is deterministic.

use anyhow::{bail, Result};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::IndexingConfig;

/// Outcome of scanning one directory.
#[derive(Debug, Default)]
pub struct ScanReport {
    /// Supported files, absolute, sorted.
    pub files: Vec<PathBuf>,
    /// Regular files that did not match the include globs.
    pub skipped: usize,
    /// Entries that could not be read while walking.
    pub errors: usize,
}

impl ScanReport {
    pub fn total(&self) -> usize {
        self.files.len() + self.skipped + self.errors
    }
}

pub fn scan_directory(root: &Path, indexing: &IndexingConfig) -> Result<ScanReport> {
    if !root.is_dir() {
        bail!("Source directory does not exist: {}", root.display());
    }
    let root = std::fs::canonicalize(root)?;
    let include_set = build_globset(&indexing.include_globs)?;

    let mut report = ScanReport::default();
    let walker = WalkDir::new(&root).follow_links(indexing.follow_symlinks);
    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!(error = %e, "failed to read directory entry");
                report.errors += 1;
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(&root).unwrap_or(path);
        if include_set.is_match(relative) {
            tracing::debug!(file = %path.display(), "added supported file");
            report.files.push(path.to_path_buf());
        } else {
            tracing::debug!(file = %path.display(), "skipped unsupported file");
            report.skipped += 1;
        }
    }

    report.files.sort();
    tracing::info!(
        root = %root.display(),
        supported = report.files.len(),
        skipped = report.skipped,
        errors = report.errors,
        "scanned source directory"
    );
    Ok(report)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(
            GlobBuilder::new(pattern)
                .case_insensitive(true)
                .literal_separator(false)
                .build()?,
        );
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn keeps_only_supported_extensions() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        std::fs::create_dir_all(root.join("nested/deeper")).unwrap();
        std::fs::write(root.join("a.txt"), "a").unwrap();
        std::fs::write(root.join("nested/B.PDF"), "b").unwrap();
        std::fs::write(root.join("nested/deeper/c.docx"), "c").unwrap();
        std::fs::write(root.join("image.png"), "x").unwrap();
        std::fs::write(root.join("nested/notes.md"), "x").unwrap();

        let report = scan_directory(root, &IndexingConfig::default()).unwrap();
        assert_eq!(report.files.len(), 3);
        assert_eq!(report.skipped, 2);
        assert_eq!(report.total(), 5);
        assert!(report.files.iter().all(|p| p.is_absolute()));
        let mut sorted = report.files.clone();
        sorted.sort();
        assert_eq!(sorted, report.files);
    }

    #[test]
    fn missing_directory_fails() {
        let tmp = TempDir::new().unwrap();
        let err = scan_directory(&tmp.path().join("nope"), &IndexingConfig::default());
        assert!(err.is_err());
    }

    #[test]
    fn custom_globs() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("a.md"), "a").unwrap();
        std::fs::write(tmp.path().join("b.txt"), "b").unwrap();
        let indexing = IndexingConfig {
            include_globs: vec!["**/*.md".to_string()],
            ..IndexingConfig::default()
        };
        let report = scan_directory(tmp.path(), &indexing).unwrap();
        assert_eq!(report.files.len(), 1);
        assert!(report.files[0].ends_with("a.md"));
    }
}
