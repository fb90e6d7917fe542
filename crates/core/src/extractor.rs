use crate::error::RagError;
use crate::models::PageText;
use lopdf::Document;
use std::path::Path;
use tracing::{debug, warn};

pub trait PdfExtractor: Send + Sync {
    /// Pages in physical order. Pages without readable text are left out.
    fn extract_pages(&self, path: &Path) -> Result<Vec<PageText>, RagError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfExtractor;

impl PdfExtractor for LopdfExtractor {
    fn extract_pages(&self, path: &Path) -> Result<Vec<PageText>, RagError> {
        if !path.is_file() {
            return Err(RagError::DocumentLoad(format!(
                "file not found: {}",
                path.display()
            )));
        }

        let document = Document::load(path).map_err(|error| {
            RagError::DocumentLoad(format!("{} is not a readable pdf: {error}", path.display()))
        })?;

        let source_path = path.to_string_lossy().to_string();
        let mut pages = Vec::new();

        // get_pages is a BTreeMap keyed by page number, so iteration is physical order.
        for (page_no, _page_id) in document.get_pages() {
            let text = match document.extract_text(&[page_no]) {
                Ok(text) => clean_page_text(&text),
                Err(error) => {
                    warn!(
                        path = %path.display(),
                        page = page_no,
                        %error,
                        "skipping unreadable page"
                    );
                    continue;
                }
            };

            if !text.is_empty() {
                pages.push(PageText {
                    number: page_no,
                    source_path: source_path.clone(),
                    text,
                });
            }
        }

        if pages.is_empty() {
            return Err(RagError::DocumentLoad(format!(
                "pdf had no readable page text: {}",
                path.display()
            )));
        }

        debug!(path = %path.display(), pages = pages.len(), "extracted pdf pages");
        Ok(pages)
    }
}

pub fn extract_page_texts(path: &Path) -> Result<Vec<PageText>, RagError> {
    LopdfExtractor.extract_pages(path)
}

/// Normalises extracted text while keeping paragraph and line breaks, which
/// the chunker uses as split boundaries.
pub fn clean_page_text(text: &str) -> String {
    let unified = text
        .replace("\r\n", "\n")
        .replace('\r', "\n")
        .replace('\u{a0}', " ");

    let mut cleaned = String::with_capacity(unified.len());
    let mut blank_run = 0usize;

    for line in unified.lines() {
        let line = line.trim_end();
        if line.trim().is_empty() {
            blank_run += 1;
            continue;
        }

        if !cleaned.is_empty() {
            cleaned.push_str(if blank_run > 0 { "\n\n" } else { "\n" });
        }
        cleaned.push_str(line);
        blank_run = 0;
    }

    cleaned.trim().to_string()
}
