//! Utility functions shared by the transport layer and the engine.

use anyhow::Result;
use std::time::Duration;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::Retry;
use tracing::warn;

/// Safely truncates a string to a maximum character length (not bytes).
///
/// This is UTF-8 safe and will not panic on multi-byte characters.
///
/// # Examples
///
/// ```
/// use telecheckin::utils::truncate_str;
/// let s = "每日签到可获得积分奖励";
/// assert_eq!(truncate_str(s, 4), "每日签到");
/// ```
pub fn truncate_str(s: impl AsRef<str>, max_chars: usize) -> String {
    let s = s.as_ref();
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    s.char_indices()
        .nth(max_chars)
        .map_or_else(|| s.to_string(), |(pos, _)| s[..pos].to_string())
}

/// Elide a message text for one-line log output.
///
/// Newlines are flattened to spaces and the result is capped at `max_chars`
/// with a trailing ellipsis.
#[must_use]
pub fn elide(text: &str, max_chars: usize) -> String {
    let flat = text.replace('\n', " ");
    if flat.chars().count() > max_chars {
        format!("{}...", truncate_str(&flat, max_chars))
    } else {
        flat
    }
}

/// Retry a transport API operation with exponential backoff.
///
/// Designed for Telegram API operations (sends, `get_file` + `download_file`)
/// that may fail due to transient network errors. Backoff bounds and the
/// attempt cap come from [`crate::config`].
///
/// # Errors
///
/// Returns the last operation error once all retries are exhausted.
pub async fn retry_transport_operation<F, Fut, T>(operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    use crate::config::{
        TRANSPORT_INITIAL_BACKOFF_MS, TRANSPORT_MAX_BACKOFF_MS, TRANSPORT_MAX_RETRIES,
    };

    let retry_strategy = ExponentialBackoff::from_millis(TRANSPORT_INITIAL_BACKOFF_MS)
        .max_delay(Duration::from_millis(TRANSPORT_MAX_BACKOFF_MS))
        .map(jitter) // Add jitter to prevent thundering herd
        .take(TRANSPORT_MAX_RETRIES);

    Retry::spawn(retry_strategy, operation).await.map_err(|e| {
        warn!(
            "Transport operation failed after {} attempts: {}",
            TRANSPORT_MAX_RETRIES, e
        );
        e
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_str_unicode() {
        let s = "签到成功, 获得积分";
        assert_eq!(truncate_str(s, 4), "签到成功");
        assert_eq!(truncate_str(s, 50), s);
    }

    #[test]
    fn test_elide_flattens_newlines() {
        assert_eq!(elide("a\nb", 10), "a b");
        assert_eq!(elide("abcdef", 3), "abc...");
    }

    #[tokio::test]
    async fn test_retry_succeeds_after_transient_failures() {
        let mut attempts = 0;
        let result = retry_transport_operation(|| {
            attempts += 1;
            let attempt = attempts;
            async move {
                if attempt < 3 {
                    Err(anyhow::anyhow!("transient"))
                } else {
                    Ok(attempt)
                }
            }
        })
        .await;
        assert_eq!(result.ok(), Some(3));
    }
}
