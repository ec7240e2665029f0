//! Captcha OCR collaborator interface.
//!
//! The engine treats OCR as an external function over a local image file.
//! Unreadable input yields an empty string, never an error the engine has to
//! special-case; retry policy lives upstream in the session.

use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;

/// Errors produced by OCR adapters.
#[derive(Debug, Error)]
pub enum OcrError {
    /// The captcha image could not be read from disk.
    #[error("failed to read captcha image: {0}")]
    Io(#[from] std::io::Error),
    /// The OCR service request failed.
    #[error("ocr request failed: {0}")]
    Http(String),
}

/// External captcha resolver: image file in, answer text out.
#[async_trait]
pub trait CaptchaOcr: Send + Sync {
    /// Resolve a captcha image into answer text.
    ///
    /// May return an empty string for unreadable input.
    ///
    /// # Errors
    ///
    /// Returns an [`OcrError`] when the image cannot be read or the backing
    /// service is unreachable.
    async fn resolve(&self, image: &Path) -> Result<String, OcrError>;
}

/// OCR adapter posting the image to an HTTP service.
///
/// The service is expected to reply with the recognized text as the plain
/// response body; surrounding whitespace is stripped.
pub struct HttpOcr {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpOcr {
    /// Create an adapter for the given service endpoint.
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl CaptchaOcr for HttpOcr {
    async fn resolve(&self, image: &Path) -> Result<String, OcrError> {
        let bytes = tokio::fs::read(image).await?;
        let response = self
            .client
            .post(&self.endpoint)
            .body(bytes)
            .send()
            .await
            .map_err(|e| OcrError::Http(e.to_string()))?
            .error_for_status()
            .map_err(|e| OcrError::Http(e.to_string()))?;
        let text = response
            .text()
            .await
            .map_err(|e| OcrError::Http(e.to_string()))?;
        Ok(text.trim().to_string())
    }
}

/// Fallback resolver used when no OCR endpoint is configured.
///
/// Always reports an unreadable captcha, which the session turns into a
/// placeholder submission and, eventually, a retry cycle.
pub struct NullOcr;

#[async_trait]
impl CaptchaOcr for NullOcr {
    async fn resolve(&self, _image: &Path) -> Result<String, OcrError> {
        Ok(String::new())
    }
}
