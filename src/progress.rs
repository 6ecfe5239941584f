//! Indexing progress reporting.
//!
//! Progress goes to **stderr** so stdout stays clean for the summary and
//! for scripts. Human progress is on by default only when stderr is a TTY.

use std::io::Write;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IndexProgressEvent {
    /// Walking the collection's directory; total unknown.
    Scanning { collection: String },
    /// Nothing new or modified in the collection.
    UpToDate { collection: String, files: u64 },
    /// `n` of `total` changed files loaded and split.
    Loading {
        collection: String,
        n: u64,
        total: u64,
    },
    /// Writing `chunks` chunks to the vector store.
    Embedding { collection: String, chunks: u64 },
}

pub trait IndexProgressReporter: Send + Sync {
    fn report(&self, event: IndexProgressEvent);
}

/// "index papers  loading  12 / 1,204 files" on stderr.
pub struct StderrProgress;

impl IndexProgressReporter for StderrProgress {
    fn report(&self, event: IndexProgressEvent) {
        let line = match &event {
            IndexProgressEvent::Scanning { collection } => {
                format!("index {}  scanning...\n", collection)
            }
            IndexProgressEvent::UpToDate { collection, files } => format!(
                "index {}  up to date ({} files)\n",
                collection,
                format_number(*files)
            ),
            IndexProgressEvent::Loading {
                collection,
                n,
                total,
            } => format!(
                "index {}  loading  {} / {} files\n",
                collection,
                format_number(*n),
                format_number(*total)
            ),
            IndexProgressEvent::Embedding { collection, chunks } => format!(
                "index {}  embedding  {} chunks\n",
                collection,
                format_number(*chunks)
            ),
        };
        let mut err = std::io::stderr().lock();
        let _ = err.write_all(line.as_bytes());
        let _ = err.flush();
    }
}

pub struct NoProgress;

impl IndexProgressReporter for NoProgress {
    fn report(&self, _event: IndexProgressEvent) {}
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
}

impl ProgressMode {
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn IndexProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
        }
    }
}
