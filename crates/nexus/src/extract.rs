//! Per-page PDF text extraction.
//!
//! [`PdfExtractor`] loads a document with `lopdf` and extracts each page
//! independently, so one broken page costs only its own text. A document
//! that cannot be opened at all is an [`ExtractError`].
//!
//! Extraction is synchronous and CPU-bound; the orchestrator runs it on
//! tokio's blocking pool.

use std::path::{Path, PathBuf};

use lopdf::Document;
use thiserror::Error;

use nexus_core::models::PageText;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("cannot open PDF {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: lopdf::Error,
    },

    #[error("PDF {0} is encrypted")]
    Encrypted(PathBuf),
}

/// Produces page text for a document, in page order starting at 1.
pub trait TextExtractor: Send + Sync {
    fn extract(&self, path: &Path) -> Result<Vec<PageText>, ExtractError>;
}

/// `lopdf`-backed extractor.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfExtractor;

impl PdfExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl TextExtractor for PdfExtractor {
    fn extract(&self, path: &Path) -> Result<Vec<PageText>, ExtractError> {
        let doc = Document::load(path).map_err(|source| ExtractError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        if doc.is_encrypted() {
            return Err(ExtractError::Encrypted(path.to_path_buf()));
        }

        let pages = doc
            .get_pages()
            .into_keys()
            .map(|page_num| {
                let text = doc.extract_text(&[page_num]).unwrap_or_else(|e| {
                    tracing::debug!(
                        path = %path.display(),
                        page = page_num,
                        "page extraction failed: {}",
                        e
                    );
                    String::new()
                });
                PageText::new(page_num, text)
            })
            .collect();

        Ok(pages)
    }
}
