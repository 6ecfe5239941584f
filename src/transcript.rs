//! Markdown transcript of a chat session.

use anyhow::{Context, Result};
use chrono::Local;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Entry {
    User(String),
    Assistant(String),
}

#[derive(Debug, Default)]
pub struct Transcript {
    entries: Vec<Entry>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_user(&mut self, text: &str) {
        self.entries.push(Entry::User(text.to_string()));
    }

    pub fn push_assistant(&mut self, text: &str) {
        self.entries.push(Entry::Assistant(text.to_string()));
    }

    /// True once at least one question has been answered.
    pub fn has_exchange(&self) -> bool {
        self.entries.iter().any(|e| matches!(e, Entry::User(_)))
            && self.entries.iter().any(|e| matches!(e, Entry::Assistant(_)))
    }

    pub fn render(&self) -> String {
        let mut out = String::from("# DocuChat Transcript\n\n");
        for entry in &self.entries {
            match entry {
                Entry::User(text) => out.push_str(&format!("**User**: {}\n\n", text)),
                Entry::Assistant(text) => out.push_str(&format!("**Assistant**: {}\n\n", text)),
            }
        }
        out
    }

    /// Write `transcript_YYYYMMDD_HHMMSS.md` into `dir`, creating it if
    /// needed. Nothing is written without a completed exchange.
    pub fn save(&self, dir: &Path) -> Result<Option<PathBuf>> {
        if !self.has_exchange() {
            return Ok(None);
        }
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create transcript dir {}", dir.display()))?;
        let name = format!("transcript_{}.md", Local::now().format("%Y%m%d_%H%M%S"));
        let path = dir.join(name);
        std::fs::write(&path, self.render())
            .with_context(|| format!("Failed to write transcript {}", path.display()))?;
        tracing::info!(path = %path.display(), "transcript saved");
        Ok(Some(path))
    }
}
