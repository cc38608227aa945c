//! PDF text extraction.
//!
//! Uploads arrive as PDF bytes; this module returns plain UTF-8 text or
//! a typed error the pipeline uses to fail the document. A parseable PDF
//! with no extractable text (scanned pages, image-only) is its own error
//! so the document record can say why processing stopped.

use crate::error::{Error, Result};

/// Extract plain text from PDF bytes.
///
/// Returns [`Error::Extraction`] for unreadable files and
/// [`Error::ExtractionEmpty`] when parsing succeeds but no text comes out.
pub fn extract_pdf_text(bytes: &[u8]) -> Result<String> {
    let text = pdf_extract::extract_text_from_mem(bytes)
        .map_err(|e| Error::Extraction(e.to_string()))?;

    if text.trim().is_empty() {
        return Err(Error::ExtractionEmpty);
    }

    Ok(text)
}

/// Count pages by parsing the PDF structure; best effort.
pub fn page_count(bytes: &[u8]) -> Option<i64> {
    // pdf-extract does not expose page counts, so approximate from the
    // /Type /Page objects in the raw stream.
    let hay = bytes;
    let needle = b"/Type /Page";
    let anti = b"/Type /Pages";
    let mut count = 0i64;
    let mut i = 0;
    while i + needle.len() <= hay.len() {
        if &hay[i..i + needle.len()] == needle {
            let is_pages = i + anti.len() <= hay.len() && &hay[i..i + anti.len()] == anti;
            if !is_pages {
                count += 1;
            }
            i += needle.len();
        } else {
            i += 1;
        }
    }
    if count > 0 {
        Some(count)
    } else {
        None
    }
}
