//! Document loading: turn a supported file into ordered page/section texts.
//!
//! | Extension | Sections |
//! |-----------|----------|
//! | `.pdf`  | one per page, numbered from 1 |
//! | `.txt`  | one, the whole file (lossy UTF-8) |
//! | `.docx` | one, paragraphs separated by blank lines |
//!
//! Any other extension yields no sections. A file that fails to load is
//! logged and also yields no sections, so one broken document never stops
//! an indexing pass.

use std::io::Read;
use std::path::Path;

/// Maximum decompressed bytes read from a single ZIP entry.
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// One page (PDF) or the whole body (other formats) of a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub text: String,
    /// 1-based page number when the format has pages.
    pub page: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    Text,
    Docx,
}

impl DocumentKind {
    pub fn from_path(path: &Path) -> Option<DocumentKind> {
        let ext = path.extension()?.to_string_lossy().to_ascii_lowercase();
        match ext.as_str() {
            "pdf" => Some(DocumentKind::Pdf),
            "txt" => Some(DocumentKind::Text),
            "docx" => Some(DocumentKind::Docx),
            _ => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("DOCX extraction failed: {0}")]
    Docx(String),
}

/// Load `path` into sections. Never fails; see the module docs.
pub fn load_document(path: &Path) -> Vec<Section> {
    let Some(kind) = DocumentKind::from_path(path) else {
        tracing::warn!(file = %path.display(), "unsupported file type");
        return Vec::new();
    };

    let bytes = match std::fs::read(path) {
        Ok(b) => b,
        Err(e) => {
            tracing::error!(file = %path.display(), error = %e, "failed to read document");
            return Vec::new();
        }
    };

    match extract_sections(&bytes, kind) {
        Ok(sections) => {
            tracing::info!(
                file = %path.display(),
                sections = sections.len(),
                "loaded document"
            );
            sections
        }
        Err(e) => {
            tracing::error!(file = %path.display(), error = %e, "failed to load document");
            Vec::new()
        }
    }
}

pub fn extract_sections(bytes: &[u8], kind: DocumentKind) -> Result<Vec<Section>, ExtractError> {
    match kind {
        DocumentKind::Pdf => extract_pdf(bytes),
        DocumentKind::Text => Ok(vec![Section {
            text: String::from_utf8_lossy(bytes).into_owned(),
            page: None,
        }]),
        DocumentKind::Docx => Ok(vec![Section {
            text: extract_docx(bytes)?,
            page: None,
        }]),
    }
}

fn extract_pdf(bytes: &[u8]) -> Result<Vec<Section>, ExtractError> {
    // pdf-extract panics on some malformed files instead of returning an error.
    let pages = std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem_by_pages(bytes))
        .map_err(|_| ExtractError::Pdf("extractor panicked on malformed input".to_string()))?
        .map_err(|e| ExtractError::Pdf(e.to_string()))?;
    Ok(pages
        .into_iter()
        .enumerate()
        .map(|(i, text)| Section {
            text,
            page: Some(i as u32 + 1),
        })
        .collect())
}

fn extract_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| ExtractError::Docx(e.to_string()))?;
    let entry = archive
        .by_name("word/document.xml")
        .map_err(|_| ExtractError::Docx("word/document.xml not found".to_string()))?;

    let mut xml = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut xml)
        .map_err(|e| ExtractError::Docx(e.to_string()))?;
    if xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(ExtractError::Docx(
            "word/document.xml exceeds size limit".to_string(),
        ));
    }
    docx_paragraphs(&xml)
}

/// Collect `<w:t>` runs, breaking paragraphs on `</w:p>`.
fn docx_paragraphs(xml: &[u8]) -> Result<String, ExtractError> {
    use quick_xml::events::Event;

    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut paragraphs: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut in_text = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => in_text = true,
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => {
                    let para = current.trim();
                    if !para.is_empty() {
                        paragraphs.push(para.to_string());
                    }
                    current.clear();
                }
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"tab" => current.push('\t'),
                b"br" => current.push('\n'),
                _ => {}
            },
            Ok(Event::Text(t)) if in_text => {
                let text = t
                    .unescape()
                    .map_err(|e| ExtractError::Docx(e.to_string()))?;
                current.push_str(&text);
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Docx(e.to_string())),
            _ => {}
        }
        buf.clear();
    }

    let tail = current.trim();
    if !tail.is_empty() {
        paragraphs.push(tail.to_string());
    }
    Ok(paragraphs.join("\n\n"))
}
