// src/batch.rs

use crate::document::DocumentPayload;
use crate::error::{BatchError, ExtractError, FieldError};
use crate::invoice::InvoiceRecord;
use crate::llm_extract::FieldExtraction;
use crate::text_extract::TextExtraction;
use crate::usage::UsageStore;
use serde::Serialize;
use tracing::{Instrument, info, info_span, warn};

/// One successfully extracted document: the record plus its source file,
/// in processing order.
#[derive(Debug, Clone, Serialize)]
pub struct SummaryRow {
    pub source_file: String,
    #[serde(flatten)]
    pub record: InvoiceRecord,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    TextExtraction,
    FieldExtraction,
}

/// Failure marker for a document that did not survive the pipeline.
#[derive(Debug, Clone, Serialize)]
pub struct BatchFailure {
    pub source_file: String,
    pub stage: FailureStage,
    pub message: String,
}

/// Accumulated result of one batch. Created fresh per batch, never merged
/// across batches; `rows` may be shorter than the input when documents fail.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchSummary {
    pub rows: Vec<SummaryRow>,
    pub failures: Vec<BatchFailure>,
    pub total: usize,
}

impl BatchSummary {
    pub fn completed(&self) -> usize {
        self.rows.len()
    }
}

/// Progress snapshot emitted after every document, whatever its outcome.
#[derive(Debug, Clone)]
pub struct BatchProgress {
    /// Documents that produced a record so far.
    pub completed: usize,
    /// Documents examined so far (completed + failed).
    pub processed: usize,
    pub total: usize,
    pub source_file: String,
}

enum DocOutcome {
    Record(InvoiceRecord),
    TextFailed(ExtractError),
    FieldsFailed(FieldError),
}

/// Sequences document extractions: quota admission up front, then a strictly
/// sequential text → fields → record pipeline per document. One bad document
/// never aborts the batch; credential failures do.
pub struct BatchOrchestrator<'a> {
    text: &'a dyn TextExtraction,
    fields: &'a dyn FieldExtraction,
    usage: &'a UsageStore,
}

impl<'a> BatchOrchestrator<'a> {
    pub fn new(
        text: &'a dyn TextExtraction,
        fields: &'a dyn FieldExtraction,
        usage: &'a UsageStore,
    ) -> Self {
        Self { text, fields, usage }
    }

    pub async fn run_batch(
        &self,
        payloads: &[DocumentPayload],
        identity: &str,
        mut on_progress: impl FnMut(&BatchProgress),
    ) -> Result<BatchSummary, BatchError> {
        // Whole-batch admission: partial admission is not supported.
        let remaining = self.usage.remaining(identity)?;
        if payloads.len() > remaining as usize {
            return Err(BatchError::QuotaExceeded {
                requested: payloads.len(),
                remaining,
            });
        }

        let total = payloads.len();
        let mut summary = BatchSummary {
            total,
            ..Default::default()
        };

        for (idx, payload) in payloads.iter().enumerate() {
            let span = info_span!("document", file = %payload.name);
            match self.process_document(payload).instrument(span).await {
                DocOutcome::Record(record) => {
                    // Billed per completed extraction, exactly once.
                    let usage = self.usage.increment(identity, 1)?;
                    info!(file = %payload.name, usage, "Document extracted");
                    summary.rows.push(SummaryRow {
                        source_file: payload.name.clone(),
                        record,
                    });
                }
                DocOutcome::TextFailed(e) => {
                    warn!(file = %payload.name, error = %e, "Text extraction failed — continuing");
                    summary.failures.push(BatchFailure {
                        source_file: payload.name.clone(),
                        stage: FailureStage::TextExtraction,
                        message: e.to_string(),
                    });
                }
                DocOutcome::FieldsFailed(e) if e.is_credential() => {
                    // Retrying further documents would waste calls for nothing.
                    return Err(BatchError::Credential {
                        source: e,
                        partial: summary,
                    });
                }
                DocOutcome::FieldsFailed(e) => {
                    warn!(file = %payload.name, error = %e, "Field extraction failed — continuing");
                    summary.failures.push(BatchFailure {
                        source_file: payload.name.clone(),
                        stage: FailureStage::FieldExtraction,
                        message: e.to_string(),
                    });
                }
            }

            on_progress(&BatchProgress {
                completed: summary.rows.len(),
                processed: idx + 1,
                total,
                source_file: payload.name.clone(),
            });
        }

        Ok(summary)
    }

    async fn process_document(&self, payload: &DocumentPayload) -> DocOutcome {
        let text = match self.text.extract_text(payload).await {
            Ok(t) => t,
            Err(e) => return DocOutcome::TextFailed(e),
        };
        info!(chars = text.len(), "Text extracted");

        match self.fields.extract_fields(&text).await {
            Ok(record) => DocOutcome::Record(record),
            Err(e) => DocOutcome::FieldsFailed(e),
        }
    }
}
