//! Persistent content-fingerprint cache for change detection.
//!
//! The cache is a plain text file with one `collection:path:fingerprint`
//! record per line. Incremental indexing only ever appends to it, so
//! several collections can share one file and stale records for a key can
//! pile up; on load the last record for each `(collection, path)` wins.
//! Lines that do not split into exactly three `:`-separated fields are
//! skipped, which tolerates a torn final line from a crashed run.
//!
//! A missing cache file means "everything changed", never an error.

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use crate::models::SourceFile;

/// One line of the cache file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheRecord {
    pub collection: String,
    pub path: String,
    pub fingerprint: String,
}

impl CacheRecord {
    fn parse(line: &str) -> Option<CacheRecord> {
        let fields: Vec<&str> = line.split(':').collect();
        if fields.len() != 3 {
            return None;
        }
        Some(CacheRecord {
            collection: fields[0].to_string(),
            path: fields[1].to_string(),
            fingerprint: fields[2].to_string(),
        })
    }

    fn to_line(&self) -> String {
        format!("{}:{}:{}\n", self.collection, self.path, self.fingerprint)
    }
}

/// SHA-256 of the file's raw bytes, lowercase hex.
pub fn fingerprint(path: &Path) -> Result<String> {
    let mut file =
        File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(hex::encode(hasher.finalize()))
}

fn path_key(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

/// Latest-record-per-key view of the cache, in first-appearance order.
#[derive(Debug, Default)]
struct Snapshot {
    records: Vec<CacheRecord>,
    index: HashMap<(String, String), usize>,
}

impl Snapshot {
    fn upsert(&mut self, record: CacheRecord) {
        let key = (record.collection.clone(), record.path.clone());
        match self.index.get(&key) {
            Some(&i) => self.records[i] = record,
            None => {
                self.index.insert(key, self.records.len());
                self.records.push(record);
            }
        }
    }

    fn get(&self, collection: &str, path: &str) -> Option<&CacheRecord> {
        self.index
            .get(&(collection.to_string(), path.to_string()))
            .map(|&i| &self.records[i])
    }

    fn has_collection(&self, collection: &str) -> bool {
        self.records.iter().any(|r| r.collection == collection)
    }
}

/// Result of comparing a collection's files with the cache.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ChangeSet {
    /// The cache holds no record for the collection yet.
    pub first_run: bool,
    /// New or modified files with their current fingerprints.
    pub changed: Vec<SourceFile>,
}

impl ChangeSet {
    pub fn is_up_to_date(&self) -> bool {
        !self.first_run && self.changed.is_empty()
    }
}

/// Handle to the cache file under the storage root.
#[derive(Debug, Clone)]
pub struct HashCache {
    path: PathBuf,
}

impl HashCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every well-formed record in file order, duplicates included.
    /// `None` if the cache file does not exist.
    pub fn read_records(&self) -> Result<Option<Vec<CacheRecord>>> {
        let file = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to open cache {}", self.path.display()))
            }
        };

        let mut records = Vec::new();
        for (lineno, line) in BufReader::new(file).lines().enumerate() {
            let line = line.with_context(|| format!("Failed to read {}", self.path.display()))?;
            let line = line.trim_end_matches('\r');
            if line.is_empty() {
                continue;
            }
            match CacheRecord::parse(line) {
                Some(record) => records.push(record),
                None => tracing::debug!(
                    cache = %self.path.display(),
                    line = lineno + 1,
                    "skipping malformed cache line"
                ),
            }
        }
        Ok(Some(records))
    }

    fn snapshot(&self) -> Result<Option<Snapshot>> {
        Ok(self.read_records()?.map(|records| {
            let mut snap = Snapshot::default();
            for r in records {
                snap.upsert(r);
            }
            snap
        }))
    }

    /// Fingerprint `files` once and compare them with the cache.
    pub fn detect_changes(&self, files: &[PathBuf], collection: &str) -> Result<ChangeSet> {
        let snap = self.snapshot()?;
        let first_run = snap
            .as_ref()
            .map_or(true, |s| !s.has_collection(collection));
        let snap = snap.unwrap_or_default();

        let mut changed = Vec::new();
        for path in files {
            let fp = fingerprint(path)?;
            let unchanged = snap
                .get(collection, &path_key(path))
                .is_some_and(|r| r.fingerprint == fp);
            if !unchanged {
                changed.push(SourceFile {
                    path: path.clone(),
                    fingerprint: fp,
                });
            }
        }
        Ok(ChangeSet { first_run, changed })
    }

    /// Files in `files` that are new to `collection` or whose bytes changed,
    /// each with its current fingerprint.
    pub fn changed_files(&self, files: &[PathBuf], collection: &str) -> Result<Vec<SourceFile>> {
        Ok(self.detect_changes(files, collection)?.changed)
    }

    /// True on the first run for `collection`, or if any file is new or
    /// modified. Files removed from disk do not count as a change.
    pub fn has_changed(&self, files: &[PathBuf], collection: &str) -> Result<bool> {
        Ok(!self.detect_changes(files, collection)?.is_up_to_date())
    }

    /// True if the cache holds a record for this file in `collection`.
    pub fn contains(&self, path: &Path, collection: &str) -> Result<bool> {
        Ok(self
            .snapshot()?
            .is_some_and(|s| s.get(collection, &path_key(path)).is_some()))
    }

    /// Replace the records of every file in `files` with fresh ones. Records
    /// for other keys, including other collections, are kept. The file is
    /// rewritten compacted, via a temp file and rename.
    pub fn record_all(&self, files: &[SourceFile], collection: &str) -> Result<()> {
        let mut snap = self.snapshot()?.unwrap_or_default();
        for file in files {
            snap.upsert(CacheRecord {
                collection: collection.to_string(),
                path: path_key(&file.path),
                fingerprint: file.fingerprint.clone(),
            });
        }
        self.write_all(&snap.records)
    }

    /// Append one record without touching the others.
    pub fn append_one(&self, file: &SourceFile, collection: &str) -> Result<()> {
        self.ensure_parent()?;
        let record = CacheRecord {
            collection: collection.to_string(),
            path: path_key(&file.path),
            fingerprint: file.fingerprint.clone(),
        };
        let mut out = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open cache {}", self.path.display()))?;
        out.write_all(record.to_line().as_bytes())?;
        out.flush()?;
        Ok(())
    }

    /// Rewrite the file with only the latest record per key. Returns
    /// `(lines_before, lines_after)`.
    pub fn compact(&self) -> Result<(usize, usize)> {
        let Some(records) = self.read_records()? else {
            return Ok((0, 0));
        };
        let before = records.len();
        let mut snap = Snapshot::default();
        for r in records {
            snap.upsert(r);
        }
        let after = snap.records.len();
        self.write_all(&snap.records)?;
        Ok((before, after))
    }

    /// Number of distinct files recorded for `collection`.
    pub fn cached_file_count(&self, collection: &str) -> Result<usize> {
        Ok(self.snapshot()?.map_or(0, |s| {
            s.records
                .iter()
                .filter(|r| r.collection == collection)
                .count()
        }))
    }

    fn ensure_parent(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(())
    }

    fn write_all(&self, records: &[CacheRecord]) -> Result<()> {
        self.ensure_parent()?;
        let tmp = self.path.with_extension("txt.tmp");
        {
            let mut out = File::create(&tmp)
                .with_context(|| format!("Failed to create {}", tmp.display()))?;
            for r in records {
                out.write_all(r.to_line().as_bytes())?;
            }
            out.sync_all()?;
        }
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace cache {}", self.path.display()))?;
        Ok(())
    }
}
