//! PDF parsing seam.

use lopdf::Document;
use thiserror::Error;

/// Failures raised while reading PDF bytes.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// Bytes are not a readable PDF.
    #[error("invalid PDF: {0}")]
    InvalidPdf(String),
    /// The PDF has no page tree.
    #[error("PDF contains no pages")]
    NoPages,
}

/// Page-level text pulled out of a PDF.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedPdf {
    /// Total pages in the document.
    pub page_count: usize,
    /// Text per page in page order. Left empty when `page_count` exceeds the caller's limit.
    pub pages: Vec<String>,
}

/// Turns raw PDF bytes into per-page text.
pub trait PdfParser: Send + Sync {
    /// Parse `bytes`. Implementations may skip text extraction when the document has more than
    /// `page_limit` pages, reporting only `page_count`.
    fn parse(&self, bytes: &[u8], page_limit: usize) -> Result<ParsedPdf, ExtractionError>;
}

/// [`PdfParser`] backed by `lopdf`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfParser;

impl PdfParser for LopdfParser {
    fn parse(&self, bytes: &[u8], page_limit: usize) -> Result<ParsedPdf, ExtractionError> {
        let document =
            Document::load_mem(bytes).map_err(|err| ExtractionError::InvalidPdf(err.to_string()))?;
        let page_numbers: Vec<u32> = document.get_pages().keys().copied().collect();
        if page_numbers.is_empty() {
            return Err(ExtractionError::NoPages);
        }

        let page_count = page_numbers.len();
        if page_count > page_limit {
            return Ok(ParsedPdf {
                page_count,
                pages: Vec::new(),
            });
        }

        let pages = page_numbers
            .iter()
            .map(|&number| match document.extract_text(&[number]) {
                Ok(text) => clean_page_text(&text),
                Err(err) => {
                    tracing::warn!(page = number, error = %err, "Failed to extract page text");
                    String::new()
                }
            })
            .collect();

        Ok(ParsedPdf { page_count, pages })
    }
}

fn clean_page_text(raw: &str) -> String {
    raw.replace('\0', "")
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}


#[cfg(test)]
mod tests {
    use super::test_support::pdf_with_pages;
    use super::*;

    #[test]
    fn rejects_non_pdf_bytes() {
        let error = LopdfParser.parse(b"definitely not a pdf", 100).unwrap_err();
        assert!(matches!(error, ExtractionError::InvalidPdf(_)));
    }

    #[test]
    fn counts_pages_of_generated_document() {
        let bytes = pdf_with_pages(&["first page", "second page", "third page"]);
        let parsed = LopdfParser.parse(&bytes, 100).expect("parse");
        assert_eq!(parsed.page_count, 3);
        assert_eq!(parsed.pages.len(), 3);
    }

    #[test]
    fn skips_text_when_over_limit() {
        let bytes = pdf_with_pages(&["a", "b", "c"]);
        let parsed = LopdfParser.parse(&bytes, 2).expect("parse");
        assert_eq!(parsed.page_count, 3);
        assert!(parsed.pages.is_empty());
    }

    #[test]
    fn cleans_nul_bytes_and_trailing_space() {
        assert_eq!(clean_page_text("  line one  \n\0line two\n\n"), "line one\nline two");
    }
}
