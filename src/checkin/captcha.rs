//! Captcha resolution with download deferral.
//!
//! Wraps the external OCR collaborator with the caller-side ordering
//! invariant: the resolver is never invoked until the media has been
//! materialized locally. Until then the resolution is `Pending` and the
//! owning session stays in its awaiting-captcha phase.

use crate::ocr::CaptchaOcr;
use crate::transport::{ChatKey, ChatTransport, MediaRef, TransportError};
use std::sync::Arc;
use tracing::{debug, warn};

/// Result of one resolution attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptchaOutcome {
    /// The image is not materialized yet; a download has been requested.
    Pending,
    /// The recognized text (possibly empty for unreadable input).
    Resolved(String),
}

/// Resolves captcha images through the OCR collaborator.
pub struct CaptchaResolver {
    ocr: Arc<dyn CaptchaOcr>,
}

impl CaptchaResolver {
    /// Create a resolver over an OCR collaborator.
    #[must_use]
    pub fn new(ocr: Arc<dyn CaptchaOcr>) -> Self {
        Self { ocr }
    }

    /// Resolve a captcha media payload.
    ///
    /// Requests the download and returns [`CaptchaOutcome::Pending`] when the
    /// payload is not yet local. OCR failures resolve to an empty string —
    /// retry policy lives upstream.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] when the download request itself fails.
    pub async fn resolve(
        &self,
        transport: &dyn ChatTransport,
        chat: &ChatKey,
        media: &MediaRef,
        expected_len: usize,
    ) -> Result<CaptchaOutcome, TransportError> {
        let Some(path) = &media.local_path else {
            debug!(file_id = %media.file_id, "captcha image not local, requesting download");
            transport.download_media(chat, media).await?;
            return Ok(CaptchaOutcome::Pending);
        };

        let text = match self.ocr.resolve(path).await {
            Ok(text) => text.trim().to_string(),
            Err(e) => {
                warn!(error = %e, "ocr failed, treating captcha as unreadable");
                String::new()
            }
        };
        if expected_len > 0 && !text.is_empty() && text.chars().count() != expected_len {
            warn!(
                text = %text,
                expected_len,
                "captcha text length mismatch, submitting anyway"
            );
        }
        Ok(CaptchaOutcome::Resolved(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr::OcrError;
    use crate::transport::{AnswerOption, InboundEvent, MessageRef};
    use async_trait::async_trait;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc;

    struct CountingTransport {
        downloads: AtomicUsize,
    }

    #[async_trait]
    impl ChatTransport for CountingTransport {
        async fn send_text(
            &self,
            chat: &ChatKey,
            _text: &str,
        ) -> Result<MessageRef, TransportError> {
            Ok(MessageRef {
                chat: chat.clone(),
                message_id: 1,
            })
        }

        async fn click_option(
            &self,
            _message: &MessageRef,
            _option: &AnswerOption,
        ) -> Result<(), TransportError> {
            Ok(())
        }

        async fn download_media(
            &self,
            _chat: &ChatKey,
            _media: &MediaRef,
        ) -> Result<(), TransportError> {
            self.downloads.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn subscribe(&self, _account: &str) -> Option<mpsc::Receiver<InboundEvent>> {
            None
        }
    }

    struct PanickingOcr;

    #[async_trait]
    impl CaptchaOcr for PanickingOcr {
        async fn resolve(&self, _image: &Path) -> Result<String, OcrError> {
            panic!("ocr must not run before the media is materialized");
        }
    }

    struct FixedOcr(&'static str);

    #[async_trait]
    impl CaptchaOcr for FixedOcr {
        async fn resolve(&self, _image: &Path) -> Result<String, OcrError> {
            Ok(self.0.to_string())
        }
    }

    fn chat() -> ChatKey {
        ChatKey {
            account: "A1".to_string(),
            chat_id: 7,
        }
    }

    #[tokio::test]
    async fn undownloaded_media_defers_and_requests_download() {
        let transport = CountingTransport {
            downloads: AtomicUsize::new(0),
        };
        let resolver = CaptchaResolver::new(Arc::new(PanickingOcr));
        let media = MediaRef {
            file_id: "f1".to_string(),
            local_path: None,
        };

        let outcome = resolver
            .resolve(&transport, &chat(), &media, 4)
            .await
            .unwrap_or_else(|e| panic!("resolve failed: {e}"));
        assert_eq!(outcome, CaptchaOutcome::Pending);
        assert_eq!(transport.downloads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn local_media_resolves_text() {
        let transport = CountingTransport {
            downloads: AtomicUsize::new(0),
        };
        let resolver = CaptchaResolver::new(Arc::new(FixedOcr(" 3Q7K ")));
        let media = MediaRef {
            file_id: "f1".to_string(),
            local_path: Some(PathBuf::from("/tmp/f1.jpg")),
        };

        let outcome = resolver
            .resolve(&transport, &chat(), &media, 4)
            .await
            .unwrap_or_else(|e| panic!("resolve failed: {e}"));
        assert_eq!(outcome, CaptchaOutcome::Resolved("3Q7K".to_string()));
        assert_eq!(transport.downloads.load(Ordering::SeqCst), 0);
    }
}
