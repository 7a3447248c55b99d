//! Plain-text extraction from uploaded letter documents.
//!
//! Letters arrive as PDF bytes; extraction concatenates the text of all pages in page
//! order without marking page boundaries. No interpretation happens here; identifier
//! scanning and summarization operate on the returned text downstream.

use thiserror::Error;

/// Raised when document bytes cannot be decoded into text.
#[derive(Debug, Error)]
#[error("Failed to decode document: {0}")]
pub struct DecodeError(String);

/// Extract plain text from PDF bytes.
pub fn extract_text(bytes: &[u8]) -> Result<String, DecodeError> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|error| DecodeError(error.to_string()))
}
