//! Recursive character text splitter.
//!
//! Splits section text into windows of at most `chunk_size` characters with
//! up to `chunk_overlap` characters carried over between neighbours. It
//! tries the coarsest boundary first (blank line), then line breaks, then
//! spaces, and only cuts inside a word when a single word is longer than a
//! window. Lengths are counted in `char`s, not bytes.
//!
//! [`chunk_sections`] attaches `{source, page, collection}` metadata: PDF
//! chunks carry their page number, chunks of unpaged formats are numbered by
//! position within the file starting at 1.

use std::collections::VecDeque;
use std::path::Path;

use crate::config::ChunkingConfig;
use crate::extract::Section;
use crate::models::{Chunk, ChunkMetadata};

const SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Split `text` into overlapping windows. Empty or whitespace-only input
/// yields no chunks.
pub fn split_text(text: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<String> {
    let splitter = Splitter {
        chunk_size,
        chunk_overlap,
    };
    splitter.split(text, &SEPARATORS)
}

struct Splitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Splitter {
    fn split(&self, text: &str, separators: &[&str]) -> Vec<String> {
        // First separator present in the text; "" always matches.
        let (idx, separator) = separators
            .iter()
            .enumerate()
            .find(|(_, sep)| sep.is_empty() || text.contains(**sep))
            .map(|(i, sep)| (i, *sep))
            .unwrap_or((separators.len().saturating_sub(1), ""));
        let rest = &separators[(idx + 1).min(separators.len())..];

        let pieces: Vec<String> = if separator.is_empty() {
            text.chars().map(|c| c.to_string()).collect()
        } else {
            text.split(separator)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        };

        let mut out = Vec::new();
        let mut fitting: Vec<String> = Vec::new();
        for piece in pieces {
            if char_len(&piece) < self.chunk_size {
                fitting.push(piece);
                continue;
            }
            if !fitting.is_empty() {
                out.extend(self.merge(&fitting, separator));
                fitting.clear();
            }
            if rest.is_empty() {
                out.push(piece);
            } else {
                out.extend(self.split(&piece, rest));
            }
        }
        if !fitting.is_empty() {
            out.extend(self.merge(&fitting, separator));
        }
        out
    }

    /// Greedily join small pieces into windows, keeping a tail of up to
    /// `chunk_overlap` characters for the next window.
    fn merge(&self, pieces: &[String], separator: &str) -> Vec<String> {
        let sep_len = char_len(separator);
        let mut docs = Vec::new();
        let mut current: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        for piece in pieces {
            let len = char_len(piece);
            let joiner = if current.is_empty() { 0 } else { sep_len };
            if total + len + joiner > self.chunk_size && !current.is_empty() {
                push_joined(&mut docs, &current, separator);
                loop {
                    let joiner = if current.is_empty() { 0 } else { sep_len };
                    let too_big = total > self.chunk_overlap
                        || (total > 0 && total + len + joiner > self.chunk_size);
                    if !too_big {
                        break;
                    }
                    let Some(front) = current.pop_front() else {
                        break;
                    };
                    total -= char_len(front);
                    if !current.is_empty() {
                        total -= sep_len;
                    }
                }
            }
            if !current.is_empty() {
                total += sep_len;
            }
            current.push_back(piece);
            total += len;
        }
        push_joined(&mut docs, &current, separator);
        docs
    }
}

fn push_joined(docs: &mut Vec<String>, current: &VecDeque<&str>, separator: &str) {
    let joined = current
        .iter()
        .copied()
        .collect::<Vec<_>>()
        .join(separator);
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        docs.push(trimmed.to_string());
    }
}

/// Split every section of one file and attach chunk metadata.
pub fn chunk_sections(
    source: &Path,
    collection: &str,
    sections: &[Section],
    config: &ChunkingConfig,
) -> Vec<Chunk> {
    let source = source.to_string_lossy().to_string();
    let mut chunks = Vec::new();
    let mut position = 0u32;

    for section in sections {
        for text in split_text(&section.text, config.chunk_size, config.chunk_overlap) {
            position += 1;
            chunks.push(Chunk {
                text,
                metadata: ChunkMetadata {
                    source: source.clone(),
                    page: section.page.unwrap_or(position),
                    collection: collection.to_string(),
                },
            });
        }
    }
    chunks
}
