// src/text_extract.rs

use crate::config::OcrSection;
use crate::document::{DocumentKind, DocumentPayload};
use crate::error::ExtractError;
use crate::ocr::{OcrEngine, command_available, write_scratch_image};
use async_trait::async_trait;
use lopdf::Document;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{info, warn};

/// Minimum number of non-whitespace characters we expect from a
/// "real" text PDF. Below this threshold we treat it as scanned.
const MIN_TEXT_CHARS: usize = 30;

/// Document-to-text capability consumed by the batch orchestrator.
#[async_trait]
pub trait TextExtraction: Send + Sync {
    async fn extract_text(&self, payload: &DocumentPayload) -> Result<String, ExtractError>;
}

/// Converts a document payload into plain text: direct text-layer extraction
/// for PDFs, OCR fallback for scanned PDFs, direct OCR for images.
/// Stateless across calls.
pub struct TextExtractionEngine<O> {
    ocr: O,
    lang: String,
    dpi: u32,
}

impl<O: OcrEngine> TextExtractionEngine<O> {
    pub fn new(ocr: O, cfg: &OcrSection) -> Self {
        Self {
            ocr,
            lang: cfg.lang.clone(),
            dpi: cfg.dpi,
        }
    }

    /// Attempt text-layer extraction page by page, preserving page order.
    /// A single unreadable page is skipped, not fatal. Returns `Ok(None)`
    /// when the document parses but yields too little text to be a real
    /// text PDF (scanned / image-only).
    fn text_layer(&self, bytes: &[u8], name: &str) -> Result<Option<String>, ExtractError> {
        let doc = Document::load_mem(bytes).map_err(|e| ExtractError::Pdf {
            name: name.to_string(),
            message: e.to_string(),
        })?;

        let mut parts = Vec::new();
        for (&page_num, _) in &doc.get_pages() {
            match doc.extract_text(&[page_num]) {
                Ok(text) if !text.trim().is_empty() => parts.push(text.trim_end().to_string()),
                Ok(_) => {}
                Err(e) => {
                    warn!(page = page_num, error = %e, "Skipping unreadable page");
                }
            }
        }

        let joined = parts.join("\n");
        let meaningful = joined.chars().filter(|c| !c.is_whitespace()).count();
        if meaningful < MIN_TEXT_CHARS {
            info!(
                chars = meaningful,
                "Extracted text too short — treating as scanned"
            );
            Ok(None)
        } else {
            info!(chars = meaningful, pages = parts.len(), "Text layer extracted");
            Ok(Some(joined))
        }
    }

    /// Render each PDF page to a raster image with pdftoppm, then OCR the
    /// pages in order. Requires both pdftoppm and the OCR engine.
    async fn ocr_pdf(&self, bytes: &[u8], name: &str) -> Result<String, ExtractError> {
        if !self.ocr.is_available().await {
            return Err(ExtractError::OcrUnavailable { tool: "tesseract" });
        }
        if !command_available("pdftoppm", "-v").await {
            return Err(ExtractError::OcrUnavailable { tool: "pdftoppm" });
        }

        let dir = tempfile::tempdir()?;
        let pages = self.rasterize_pdf(bytes, dir.path(), name).await?;
        info!(pages = pages.len(), dpi = self.dpi, "Rendered scanned PDF for OCR");

        let mut parts = Vec::new();
        for page in &pages {
            match self.ocr.recognize(page, &self.lang).await {
                Ok(text) if !text.trim().is_empty() => parts.push(text.trim_end().to_string()),
                Ok(_) => {}
                Err(e) => {
                    warn!(page = %page.display(), error = %e, "OCR failed for page — skipping");
                }
            }
        }

        if parts.is_empty() {
            return Err(ExtractError::NoTextFound {
                name: name.to_string(),
            });
        }
        Ok(parts.join("\n"))
    }

    async fn rasterize_pdf(
        &self,
        bytes: &[u8],
        dir: &Path,
        name: &str,
    ) -> Result<Vec<PathBuf>, ExtractError> {
        let pdf_path = dir.join("input.pdf");
        tokio::fs::write(&pdf_path, bytes).await?;

        let output = Command::new("pdftoppm")
            .arg("-r")
            .arg(self.dpi.to_string())
            .arg("-png")
            .arg(&pdf_path)
            .arg(dir.join("page"))
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    ExtractError::OcrUnavailable { tool: "pdftoppm" }
                } else {
                    ExtractError::Io(e)
                }
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ExtractError::Pdf {
                name: name.to_string(),
                message: format!("pdftoppm exited with {}: {}", output.status, stderr.trim()),
            });
        }

        // pdftoppm zero-pads page numbers, so lexical order is page order.
        let mut pages: Vec<PathBuf> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "png"))
            .collect();
        pages.sort();
        Ok(pages)
    }

    async fn ocr_image(&self, payload: &DocumentPayload) -> Result<String, ExtractError> {
        if !self.ocr.is_available().await {
            return Err(ExtractError::OcrUnavailable { tool: "tesseract" });
        }

        let suffix = match Path::new(&payload.name).extension().and_then(|e| e.to_str()) {
            Some(ext) => format!(".{}", ext.to_ascii_lowercase()),
            None => ".png".to_string(),
        };
        let scratch = write_scratch_image(&payload.bytes, &suffix)?;
        let text = self.ocr.recognize(scratch.path(), &self.lang).await?;
        if text.trim().is_empty() {
            return Err(ExtractError::NoTextFound {
                name: payload.name.clone(),
            });
        }
        Ok(text)
    }
}

#[async_trait]
impl<O: OcrEngine> TextExtraction for TextExtractionEngine<O> {
    async fn extract_text(&self, payload: &DocumentPayload) -> Result<String, ExtractError> {
        match payload.kind {
            DocumentKind::Pdf => match self.text_layer(&payload.bytes, &payload.name)? {
                Some(text) => Ok(text),
                None => {
                    info!(file = %payload.name, "No text layer — falling back to OCR");
                    self.ocr_pdf(&payload.bytes, &payload.name).await
                }
            },
            DocumentKind::Image => self.ocr_image(payload).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::content::{Content, Operation};
    use lopdf::{Object, Stream, dictionary};

    /// OCR stub that reports itself missing, so tests never shell out.
    struct NoOcr;

    #[async_trait]
    impl OcrEngine for NoOcr {
        async fn is_available(&self) -> bool {
            false
        }

        async fn recognize(&self, _path: &Path, _lang: &str) -> Result<String, ExtractError> {
            Err(ExtractError::OcrUnavailable { tool: "tesseract" })
        }
    }

    fn engine() -> TextExtractionEngine<NoOcr> {
        TextExtractionEngine::new(NoOcr, &OcrSection::default())
    }

    /// Build a small text-layer PDF in memory, one page per input string.
    fn text_pdf(pages: &[&str]) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });

        let mut kids = Vec::new();
        for text in pages {
            let content = Content {
                operations: vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 12.into()]),
                    Operation::new("Td", vec![50.into(), 700.into()]),
                    Operation::new("Tj", vec![Object::string_literal(*text)]),
                    Operation::new("ET", vec![]),
                ],
            };
            let content_id = doc.add_object(Stream::new(
                dictionary! {},
                content.encode().unwrap(),
            ));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
            });
            kids.push(page_id.into());
        }

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut buf = Vec::new();
        doc.save_to(&mut buf).unwrap();
        buf
    }

    #[test]
    fn garbage_bytes_are_a_pdf_error() {
        let result = engine().text_layer(b"this is not a pdf", "junk.pdf");
        assert!(matches!(result, Err(ExtractError::Pdf { .. })));
    }

    #[test]
    fn text_layer_preserves_page_order() {
        let bytes = text_pdf(&[
            "Invoice No: INV-001  GSTIN: 27AABCU9603R1ZM  Taxable: 10000",
            "Total GST: 1800  Grand Total: 11800 (Rupees)",
        ]);
        let text = engine().text_layer(&bytes, "invoice.pdf").unwrap().unwrap();
        let first = text.find("INV-001").unwrap();
        let second = text.find("11800").unwrap();
        assert!(first < second);
    }

    #[test]
    fn short_text_layer_counts_as_scanned() {
        let bytes = text_pdf(&["INV-1"]);
        let result = engine().text_layer(&bytes, "stub.pdf").unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn scanned_pdf_without_ocr_engine_reports_unavailable() {
        let payload = DocumentPayload::new("scan.pdf", DocumentKind::Pdf, text_pdf(&["x"]));
        let result = engine().extract_text(&payload).await;
        assert!(matches!(
            result,
            Err(ExtractError::OcrUnavailable { tool: "tesseract" })
        ));
    }

    #[tokio::test]
    async fn image_without_ocr_engine_reports_unavailable() {
        let payload = DocumentPayload::new("photo.jpg", DocumentKind::Image, vec![0xFF, 0xD8]);
        let result = engine().extract_text(&payload).await;
        assert!(matches!(result, Err(ExtractError::OcrUnavailable { .. })));
    }
}
