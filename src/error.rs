// src/error.rs

use crate::batch::BatchSummary;
use thiserror::Error;

/// Failures while turning a document payload into plain text.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// The document needs OCR but the required tool is missing. Actionable:
    /// install it, this is not a problem with the document itself.
    #[error(
        "`{tool}` is not installed or not on PATH; this document requires OCR.\n\
         Install Tesseract OCR (and poppler-utils for scanned PDFs), then retry."
    )]
    OcrUnavailable { tool: &'static str },

    /// The pipeline ran to completion but recovered no text.
    #[error("could not extract any readable text from `{name}`; ensure the document is legible")]
    NoTextFound { name: String },

    #[error("failed to parse PDF `{name}`: {message}")]
    Pdf { name: String, message: String },

    #[error("I/O failure while processing document: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures while turning extracted text into a structured invoice record.
#[derive(Debug, Error)]
pub enum FieldError {
    #[error(
        "LLM API key is not configured; set `llm.api_key` in the config file \
         or the {env_var} environment variable"
    )]
    MissingCredential { env_var: String },

    #[error("invalid LLM API key, check your configuration: {0}")]
    InvalidCredential(String),

    #[error("LLM rate limit reached, wait a moment and retry: {0}")]
    RateLimited(String),

    #[error("model violated the JSON output contract: {0}")]
    MalformedResponse(String),

    #[error("LLM API call failed: {0}")]
    Api(String),

    #[error("LLM request failed: {0}")]
    Http(#[from] reqwest::Error),
}

impl FieldError {
    /// Credential failures are fatal to a whole batch; everything else is
    /// reported per document.
    pub fn is_credential(&self) -> bool {
        matches!(
            self,
            FieldError::MissingCredential { .. } | FieldError::InvalidCredential(_)
        )
    }
}

/// Batch-level failures. Per-document errors never surface here; they are
/// recorded as failure markers inside the summary instead.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error(
        "you selected {requested} file(s) but only {remaining} extraction(s) remain; \
         remove some files or contact the Parserix team for additional quota"
    )]
    QuotaExceeded { requested: usize, remaining: u32 },

    /// No credential, no further documents should be attempted. Carries the
    /// summary accumulated so far so completed results are not lost.
    #[error("batch aborted: {source}")]
    Credential {
        source: FieldError,
        partial: BatchSummary,
    },

    #[error("usage store error: {0}")]
    Usage(#[from] rusqlite::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credential_errors_are_fatal() {
        assert!(
            FieldError::MissingCredential {
                env_var: "GROQ_API_KEY".into()
            }
            .is_credential()
        );
        assert!(FieldError::InvalidCredential("401".into()).is_credential());
        assert!(!FieldError::RateLimited("429".into()).is_credential());
        assert!(!FieldError::MalformedResponse("not json".into()).is_credential());
    }

    #[test]
    fn ocr_unavailable_carries_install_hint() {
        let err = ExtractError::OcrUnavailable { tool: "tesseract" };
        let msg = err.to_string();
        assert!(msg.contains("tesseract"));
        assert!(msg.contains("Install"));
    }
}
