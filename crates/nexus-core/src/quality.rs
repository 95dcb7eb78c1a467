//! Extraction quality assessment.
//!
//! Given the per-page text of one extraction pass, computes how much usable
//! text came out and decides whether the source should be re-extracted via
//! OCR. The decision is a pure function of the report and the thresholds.

use serde::{Deserialize, Serialize};

use crate::models::PageText;

/// Thresholds that gate the OCR fallback.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct QualityThresholds {
    /// Documents with fewer extracted characters need OCR.
    pub min_chars: usize,
    /// Documents with a strictly larger empty-page ratio need OCR.
    pub max_empty_ratio: f64,
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            min_chars: 500,
            max_empty_ratio: 0.30,
        }
    }
}

/// Metrics for a single page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageMetrics {
    pub page: u32,
    pub chars: usize,
    pub empty: bool,
}

/// Result of assessing one extraction pass.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QualityReport {
    pub extracted_chars: usize,
    pub empty_page_ratio: f64,
    pub pages: Vec<PageMetrics>,
}

impl QualityReport {
    /// Report with zero metrics, stored for documents that were never extracted.
    pub fn empty() -> Self {
        Self::default()
    }

    /// `true` when the extraction is too thin to index as-is.
    ///
    /// Both comparisons are strict: a document exactly at `min_chars`, or
    /// exactly at `max_empty_ratio`, does not need OCR.
    pub fn needs_ocr(&self, thresholds: &QualityThresholds) -> bool {
        self.extracted_chars < thresholds.min_chars
            || self.empty_page_ratio > thresholds.max_empty_ratio
    }

    /// JSON form archived on the document row.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "doc": {
                "extracted_chars": self.extracted_chars,
                "empty_page_ratio": self.empty_page_ratio,
            },
            "pages": self.pages,
        })
    }
}

/// Compute a [`QualityReport`] for the given pages.
///
/// A page's character count is the length of its untrimmed text; a page is
/// empty when its text is blank after trimming whitespace.
pub fn assess(pages: &[PageText]) -> QualityReport {
    let metrics: Vec<PageMetrics> = pages
        .iter()
        .map(|p| PageMetrics {
            page: p.page,
            chars: p.text.chars().count(),
            empty: p.text.trim().is_empty(),
        })
        .collect();

    let extracted_chars = metrics.iter().map(|m| m.chars).sum();
    let empty_pages = metrics.iter().filter(|m| m.empty).count();
    let empty_page_ratio = if metrics.is_empty() {
        0.0
    } else {
        empty_pages as f64 / metrics.len() as f64
    };

    QualityReport {
        extracted_chars,
        empty_page_ratio,
        pages: metrics,
    }
}
