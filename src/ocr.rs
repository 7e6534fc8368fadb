//! Image-to-text recognition for screenshot attachments.
//!
//! The default engine shells out to the `tesseract` CLI: the image is
//! downloaded, piped to `tesseract stdin stdout`, and stdout is the text.

use crate::error::OcrError;
use crate::fetch::ContentFetcher;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::AsyncWriteExt as _;

/// Declared content types that are sent through OCR.
pub const IMAGE_CONTENT_TYPES: &[&str] = &["image/png", "image/jpeg", "image/webp"];

/// Whether an attachment with this declared content type is a screenshot.
pub fn is_ocr_candidate(content_type: Option<&str>) -> bool {
    content_type.is_some_and(|content_type| {
        // Discord may append parameters, e.g. "image/png; charset=binary".
        let essence = content_type.split(';').next().unwrap_or_default().trim();
        IMAGE_CONTENT_TYPES
            .iter()
            .any(|candidate| candidate.eq_ignore_ascii_case(essence))
    })
}

/// Turns an image into text.
#[async_trait::async_trait]
pub trait OcrEngine: Send + Sync {
    async fn recognize(&self, image_url: &str) -> Result<String, OcrError>;
}

/// OCR through a local tesseract installation.
pub struct TesseractOcr {
    fetcher: Arc<dyn ContentFetcher>,
    command: String,
    language: String,
}

impl TesseractOcr {
    pub fn new(
        fetcher: Arc<dyn ContentFetcher>,
        command: impl Into<String>,
        language: impl Into<String>,
    ) -> Self {
        Self {
            fetcher,
            command: command.into(),
            language: language.into(),
        }
    }

    async fn run(&self, image: Vec<u8>) -> Result<String, OcrError> {
        let mut child = tokio::process::Command::new(&self.command)
            .args(["stdin", "stdout", "-l", &self.language])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(OcrError::Spawn)?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| OcrError::Recognition("tesseract stdin unavailable".into()))?;

        // Feed stdin concurrently so a full stdout pipe can't deadlock us.
        let writer = tokio::spawn(async move {
            let result = stdin.write_all(&image).await;
            drop(stdin);
            result
        });

        let output = child.wait_with_output().await.map_err(OcrError::Spawn)?;

        match writer.await {
            Ok(Ok(())) => {}
            Ok(Err(error)) => tracing::debug!(%error, "tesseract closed stdin early"),
            Err(error) => tracing::debug!(%error, "tesseract stdin writer aborted"),
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(OcrError::Recognition(format!(
                "{} exited with {}: {}",
                self.command,
                output.status,
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait::async_trait]
impl OcrEngine for TesseractOcr {
    async fn recognize(&self, image_url: &str) -> Result<String, OcrError> {
        let image = self.fetcher.fetch_bytes(image_url).await?;
        tracing::debug!(image_url, bytes = image.len(), "running OCR");
        self.run(image).await
    }
}
