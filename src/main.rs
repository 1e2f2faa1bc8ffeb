mod batch;
mod config;
mod document;
mod error;
mod export;
mod invoice;
mod llm_extract;
mod ocr;
mod text_extract;
mod usage;

use batch::{BatchOrchestrator, BatchSummary};
use clap::Parser;
use document::{DocumentKind, DocumentPayload};
use error::BatchError;
use invoice::ConfidenceLevel;
use llm_extract::LlmFieldExtractor;
use ocr::TesseractOcr;
use std::path::{Path, PathBuf};
use text_extract::TextExtractionEngine;
use tracing::{error, info, warn};
use usage::UsageStore;

/// Extract structured fields from Indian GST invoices (PDF or image).
#[derive(Parser)]
#[command(name = "parserix", version)]
struct Cli {
    /// Email identity used for usage-quota tracking
    #[arg(long)]
    identity: String,

    /// Path to the TOML config file
    #[arg(long, default_value = "parserix.toml")]
    config: PathBuf,

    /// Directory for per-invoice JSON files and the master CSV
    #[arg(long, default_value = "out")]
    out_dir: PathBuf,

    /// Invoice files to process (pdf, png, jpg, jpeg)
    #[arg(required = true)]
    files: Vec<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // init tracing
    tracing_subscriber::fmt()
        .with_target(true)
        .with_level(true)
        .with_env_filter("info")
        .init();

    let cli = Cli::parse();

    let email_re = regex::Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$")?;
    if !email_re.is_match(cli.identity.trim()) {
        return Err(format!("`{}` is not a valid email address", cli.identity).into());
    }

    let cfg = config::Config::load_or_default(&cli.config)?;
    let payloads = load_payloads(&cli.files)?;

    let store = UsageStore::new(&cfg.db_path, cfg.max_uploads)?;
    let used = store.get_usage(&cli.identity)?;
    info!(
        identity = %cli.identity,
        used,
        max = store.max_uploads(),
        remaining = store.remaining(&cli.identity)?,
        "Usage"
    );

    let engine = TextExtractionEngine::new(TesseractOcr, &cfg.ocr);
    // Resolving the credential up front means a missing key fails the batch
    // before any document is touched.
    let extractor = LlmFieldExtractor::new(&cfg.llm)?;
    let orchestrator = BatchOrchestrator::new(&engine, &extractor, &store);

    let result = orchestrator
        .run_batch(&payloads, &cli.identity, |p| {
            info!(
                processed = p.processed,
                completed = p.completed,
                total = p.total,
                file = %p.source_file,
                "Progress"
            );
        })
        .await;

    match result {
        Ok(summary) => {
            write_outputs(&summary, &cli.out_dir)?;
            report(&summary, &store, &cli.identity)?;
            Ok(())
        }
        Err(BatchError::Credential { source, partial }) => {
            // Keep whatever finished before the abort.
            write_outputs(&partial, &cli.out_dir)?;
            report(&partial, &store, &cli.identity)?;
            error!(error = %source, "Batch aborted on credential failure");
            Err(source.into())
        }
        Err(e) => Err(e.into()),
    }
}

fn load_payloads(files: &[PathBuf]) -> Result<Vec<DocumentPayload>, Box<dyn std::error::Error>> {
    let mut payloads = Vec::with_capacity(files.len());
    for path in files {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        let Some(kind) = DocumentKind::from_extension(ext) else {
            return Err(format!(
                "unsupported file type `{}`; supported: pdf, png, jpg, jpeg",
                path.display()
            )
            .into());
        };
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let bytes = std::fs::read(path)?;
        payloads.push(DocumentPayload::new(name, kind, bytes));
    }
    Ok(payloads)
}

fn write_outputs(summary: &BatchSummary, out_dir: &Path) -> Result<(), Box<dyn std::error::Error>> {
    if summary.rows.is_empty() {
        return Ok(());
    }
    std::fs::create_dir_all(out_dir)?;

    for row in &summary.rows {
        let path = out_dir.join(export::json_file_name(&row.record));
        std::fs::write(&path, export::record_json(&row.record)?)?;
        info!(file = %row.source_file, json = %path.display(), "Wrote invoice JSON");

        for field in invoice::FIELD_NAMES {
            let score = row.record.confidence.get(field);
            if score > 0 {
                info!(
                    file = %row.source_file,
                    field,
                    score,
                    level = ConfidenceLevel::of(score).label(),
                    "Confidence"
                );
            }
        }
    }

    let csv_path = out_dir.join("parserix_master_export.csv");
    std::fs::write(&csv_path, export::summary_csv(summary))?;
    info!(rows = summary.rows.len(), csv = %csv_path.display(), "Wrote master CSV");
    Ok(())
}

fn report(
    summary: &BatchSummary,
    store: &UsageStore,
    identity: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    for failure in &summary.failures {
        warn!(
            file = %failure.source_file,
            stage = ?failure.stage,
            "{}",
            failure.message
        );
    }
    info!(
        completed = summary.completed(),
        failed = summary.failures.len(),
        total = summary.total,
        remaining = store.remaining(identity)?,
        "Batch finished"
    );
    Ok(())
}
