//! Page-level text extraction for source documents.
//!
//! | Extension | Pages |
//! |-----------|-------|
//! | `.pdf` | one per PDF page, via `pdf-extract` |
//! | `.txt`, `.md` | split on form feed (`\x0c`) |
//!
//! Page numbers follow the source document, starting at 1. Pages with no
//! visible text are dropped but do not shift the numbering of later pages.

use std::path::Path;

use tracing::{debug, warn};

use crate::error::{RagError, Result};
use crate::models::Page;

const FORM_FEED: char = '\x0c';

/// Extract the non-blank pages of `path`.
///
/// A document with no usable text at all is `ExtractionEmpty`.
pub fn extract_pages(path: &Path) -> Result<Vec<Page>> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    let bytes = std::fs::read(path)?;
    let source_name = source_name(path);

    let raw = match extension.as_str() {
        "pdf" => pdf_pages(&bytes, &source_name),
        "txt" | "md" | "markdown" => text_pages(&String::from_utf8_lossy(&bytes)),
        other => {
            return Err(RagError::InvalidInput(format!(
                "unsupported file type '{}' for {} (expected .pdf, .txt or .md)",
                other, source_name
            )))
        }
    };

    let pages = number_pages(raw);
    debug!(source = %source_name, pages = pages.len(), "extracted pages");

    if pages.is_empty() {
        return Err(RagError::ExtractionEmpty { source_name });
    }
    Ok(pages)
}

/// Display name of a source file.
pub fn source_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn pdf_pages(bytes: &[u8], source_name: &str) -> Vec<String> {
    match pdf_extract::extract_text_from_mem_by_pages(bytes) {
        Ok(pages) => pages,
        Err(e) => {
            warn!(source = %source_name, error = %e, "per-page PDF extraction failed, reading whole document");
            match pdf_extract::extract_text_from_mem(bytes) {
                Ok(text) => vec![text],
                Err(e) => {
                    warn!(source = %source_name, error = %e, "PDF extraction failed");
                    Vec::new()
                }
            }
        }
    }
}

fn text_pages(text: &str) -> Vec<String> {
    text.split(FORM_FEED).map(str::to_string).collect()
}

fn number_pages(raw: Vec<String>) -> Vec<Page> {
    raw.into_iter()
        .enumerate()
        .filter(|(_, text)| !text.trim().is_empty())
        .map(|(i, text)| Page::new(i as u32 + 1, text))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_text_file_split_on_form_feed() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("book.txt");
        fs::write(&path, "First page.\x0c  \n\x0cThird page.").unwrap();

        let pages = extract_pages(&path).unwrap();
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0], Page::new(1, "First page."));
        assert_eq!(pages[1].number, 3);
    }

    #[test]
    fn test_markdown_without_form_feed_is_one_page() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("notes.MD");
        fs::write(&path, "# Title\n\nBody").unwrap();
        let pages = extract_pages(&path).unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].number, 1);
    }

    #[test]
    fn test_blank_document_is_extraction_empty() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("blank.txt");
        fs::write(&path, " \n\t\x0c ").unwrap();
        match extract_pages(&path) {
            Err(RagError::ExtractionEmpty { source_name }) => assert_eq!(source_name, "blank.txt"),
            other => panic!("expected ExtractionEmpty, got {:?}", other),
        }
    }

    #[test]
    fn test_garbage_pdf_is_extraction_empty() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("broken.pdf");
        fs::write(&path, b"not a pdf").unwrap();
        assert!(matches!(
            extract_pages(&path),
            Err(RagError::ExtractionEmpty { .. })
        ));
    }

    #[test]
    fn test_unsupported_extension() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("book.epub");
        fs::write(&path, b"data").unwrap();
        assert!(matches!(extract_pages(&path), Err(RagError::InvalidInput(_))));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let tmp = TempDir::new().unwrap();
        assert!(matches!(
            extract_pages(&tmp.path().join("missing.txt")),
            Err(RagError::Io(_))
        ));
    }
}
