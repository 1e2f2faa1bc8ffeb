// src/ocr.rs

use crate::error::ExtractError;
use async_trait::async_trait;
use std::io::Write;
use std::path::Path;
use tokio::process::Command;
use tracing::info;

/// OCR capability: raster image in, plain text out. Unavailability is
/// signalled distinctly from "engine ran but found nothing" so callers can
/// tell "install OCR" apart from "document unreadable".
#[async_trait]
pub trait OcrEngine: Send + Sync {
    async fn is_available(&self) -> bool;

    /// Recognize text in the image at `path` using the given language code.
    async fn recognize(&self, path: &Path, lang: &str) -> Result<String, ExtractError>;
}

/// Shells out to the `tesseract` binary on PATH.
pub struct TesseractOcr;

/// A command counts as available when it can be spawned at all; a spawn
/// failure means the binary is missing from PATH.
pub(crate) async fn command_available(cmd: &str, probe_arg: &str) -> bool {
    Command::new(cmd).arg(probe_arg).output().await.is_ok()
}

#[async_trait]
impl OcrEngine for TesseractOcr {
    async fn is_available(&self) -> bool {
        command_available("tesseract", "--version").await
    }

    async fn recognize(&self, path: &Path, lang: &str) -> Result<String, ExtractError> {
        let output = Command::new("tesseract")
            .arg(path)
            .arg("stdout")
            .arg("-l")
            .arg(lang)
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    ExtractError::OcrUnavailable { tool: "tesseract" }
                } else {
                    ExtractError::Io(e)
                }
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ExtractError::Io(std::io::Error::other(format!(
                "tesseract exited with {}: {}",
                output.status,
                stderr.trim()
            ))));
        }

        let text = String::from_utf8_lossy(&output.stdout).into_owned();
        info!(chars = text.len(), path = %path.display(), "OCR pass complete");
        Ok(text)
    }
}

/// Write image bytes to a scratch file so file-based OCR tools can read them.
/// The file lives as long as the returned handle.
pub(crate) fn write_scratch_image(
    bytes: &[u8],
    suffix: &str,
) -> Result<tempfile::NamedTempFile, ExtractError> {
    let mut file = tempfile::Builder::new().suffix(suffix).tempfile()?;
    file.write_all(bytes)?;
    file.flush()?;
    Ok(file)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_binary_is_unavailable() {
        assert!(!command_available("definitely-not-a-real-ocr-binary", "--version").await);
    }

    #[test]
    fn scratch_image_keeps_suffix_and_contents() {
        let file = write_scratch_image(b"\x89PNG fake", ".png").unwrap();
        assert!(file.path().to_string_lossy().ends_with(".png"));
        assert_eq!(std::fs::read(file.path()).unwrap(), b"\x89PNG fake");
    }
}
