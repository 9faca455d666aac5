//! Text extraction collaborator.
//!
//! Raw file-format parsing is an external concern: the pipeline only needs
//! "bytes in, plain text out" behind the [`TextExtractor`] trait. Rich-format
//! extractors (PDF, DOCX) plug in behind the same seam;
//! [`PlainTextExtractor`] ships in-crate and covers text content with
//! best-effort decoding.

use async_trait::async_trait;

use crate::types::RagError;

/// Turns uploaded bytes plus a declared mime type into extracted plain text.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract(
        &self,
        bytes: &[u8],
        mime_type: &str,
        filename: &str,
    ) -> Result<String, RagError>;
}

/// Extractor for plain-text content.
///
/// Text inputs are decoded best-effort: invalid byte sequences are replaced,
/// never raised. Recognized binary document formats are refused with an
/// extraction error so the document is marked failed instead of being indexed
/// as garbage.
#[derive(Clone, Copy, Debug, Default)]
pub struct PlainTextExtractor;

impl PlainTextExtractor {
    fn is_binary_document(mime_type: &str, filename: &str) -> bool {
        const BINARY_MIMES: &[&str] = &[
            "application/pdf",
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
            "application/msword",
        ];
        const BINARY_EXTENSIONS: &[&str] = &[".pdf", ".docx", ".doc"];

        BINARY_MIMES.contains(&mime_type)
            || BINARY_EXTENSIONS
                .iter()
                .any(|ext| filename.to_lowercase().ends_with(ext))
    }
}

#[async_trait]
impl TextExtractor for PlainTextExtractor {
    async fn extract(
        &self,
        bytes: &[u8],
        mime_type: &str,
        filename: &str,
    ) -> Result<String, RagError> {
        if Self::is_binary_document(mime_type, filename) {
            return Err(RagError::Extraction(format!(
                "no extractor registered for '{mime_type}' ({filename})"
            )));
        }
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }
}
