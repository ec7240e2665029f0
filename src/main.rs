use dotenvy::dotenv;
use regex::Regex;
use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;
use telecheckin::checkin::history::HistoryStore;
use telecheckin::checkin::{CheckinOutcome, SessionOrchestrator};
use telecheckin::config::Settings;
use telecheckin::ocr::{CaptchaOcr, HttpOcr, NullOcr};
use telecheckin::transport::telegram::TelegramTransport;
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use tracing_subscriber::{prelude::*, EnvFilter};

/// Regex patterns for redacting bot tokens from log output
struct RedactionPatterns {
    token_url: Regex,
    token_bare: Regex,
}

impl RedactionPatterns {
    /// Initialize all regex patterns
    ///
    /// # Errors
    ///
    /// Returns an error if any regex pattern is invalid
    fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            token_url: Regex::new(r"(https?://[^/]+/bot)([0-9]+:[A-Za-z0-9_-]+)(/['\s]*)")?,
            token_bare: Regex::new(r"([0-9]{8,10}:[A-Za-z0-9_-]{35})")?,
        })
    }

    fn redact(&self, input: &str) -> String {
        let output = self
            .token_url
            .replace_all(input, "$1[BOT_TOKEN]$3")
            .to_string();
        self.token_bare
            .replace_all(&output, "[BOT_TOKEN]")
            .to_string()
    }
}

struct RedactingWriter<W: Write> {
    inner: W,
    patterns: Arc<RedactionPatterns>,
}

impl<W: Write> RedactingWriter<W> {
    const fn new(inner: W, patterns: Arc<RedactionPatterns>) -> Self {
        Self { inner, patterns }
    }
}

impl<W: Write> Write for RedactingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let s = String::from_utf8_lossy(buf);
        let redacted = self.patterns.redact(&s);
        self.inner.write_all(redacted.as_bytes())?;
        // We return the original buffer length to satisfy the contract,
        // even if the redacted string length differs.
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

struct RedactingMakeWriter<F> {
    make_inner: F,
    patterns: Arc<RedactionPatterns>,
}

impl<F> RedactingMakeWriter<F> {
    const fn new(make_inner: F, patterns: Arc<RedactionPatterns>) -> Self {
        Self {
            make_inner,
            patterns,
        }
    }
}

impl<'a, F, W> tracing_subscriber::fmt::MakeWriter<'a> for RedactingMakeWriter<F>
where
    F: Fn() -> W + 'static,
    W: Write,
{
    type Writer = RedactingWriter<W>;

    fn make_writer(&'a self) -> Self::Writer {
        RedactingWriter::new((self.make_inner)(), self.patterns.clone())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file
    dotenv().ok();

    let patterns = Arc::new(RedactionPatterns::new().map_err(|e| {
        eprintln!("Failed to compile regex patterns: {e}");
        e
    })?);
    init_logging(patterns);

    info!("Starting telecheckin...");

    let settings = init_settings();

    let targets = settings.resolved_targets();
    if targets.is_empty() {
        error!("No targets configured, nothing to do.");
        std::process::exit(1);
    }
    if settings.accounts.is_empty() {
        error!("No accounts configured, nothing to do.");
        std::process::exit(1);
    }

    let history = init_history(&settings);
    let ocr = init_ocr(&settings);

    let transport = Arc::new(TelegramTransport::new(
        &settings.accounts,
        &settings.media_dir,
    ));
    info!(accounts = settings.accounts.len(), "Transport initialized.");

    let accounts: Vec<String> = settings.accounts.iter().map(|a| a.name.clone()).collect();
    let orchestrator =
        SessionOrchestrator::new(transport, ocr, Arc::clone(&history), settings.retries);

    info!(
        targets = targets.len(),
        timeout_secs = settings.timeout_secs,
        "Starting check-in run."
    );
    let results = orchestrator
        .run(
            &accounts,
            &targets,
            Duration::from_secs(settings.timeout_secs),
        )
        .await;

    let succeeded = results
        .values()
        .filter(|o| **o == CheckinOutcome::Success)
        .count();
    info!(
        succeeded,
        total = results.len(),
        "Run complete: {succeeded}/{} checked in.",
        results.len()
    );

    if let Err(e) = history.lock().await.save(&settings.history_path) {
        warn!(error = %e, "Failed to persist answer history.");
    }

    Ok(())
}

fn init_logging(patterns: Arc<RedactionPatterns>) {
    let make_writer = RedactingMakeWriter::new(io::stderr, patterns);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(make_writer))
        .init();
}

fn init_settings() -> Settings {
    match Settings::new() {
        Ok(s) => {
            info!("Configuration loaded successfully.");
            s
        }
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    }
}

fn init_history(settings: &Settings) -> Arc<Mutex<HistoryStore>> {
    match HistoryStore::load(&settings.history_path) {
        Ok(store) => Arc::new(Mutex::new(store)),
        Err(e) => {
            warn!(error = %e, "Failed to load answer history, starting empty.");
            Arc::new(Mutex::new(HistoryStore::default()))
        }
    }
}

fn init_ocr(settings: &Settings) -> Arc<dyn CaptchaOcr> {
    settings.ocr_endpoint.as_ref().map_or_else(
        || {
            warn!("No OCR endpoint configured; captchas will be submitted as placeholders.");
            Arc::new(NullOcr) as Arc<dyn CaptchaOcr>
        },
        |endpoint| {
            info!("OCR endpoint configured.");
            Arc::new(HttpOcr::new(endpoint.clone())) as Arc<dyn CaptchaOcr>
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bot_tokens_are_redacted() {
        let patterns = RedactionPatterns::new()
            .unwrap_or_else(|e| panic!("patterns must compile: {e}"));
        let input =
            "request to https://api.telegram.org/bot1234567890:AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA/sendMessage ";
        let redacted = patterns.redact(input);
        assert!(!redacted.contains("1234567890:"));
        assert!(redacted.contains("[BOT_TOKEN]"));
    }

    #[test]
    fn plain_text_is_untouched() {
        let patterns = RedactionPatterns::new()
            .unwrap_or_else(|e| panic!("patterns must compile: {e}"));
        assert_eq!(patterns.redact("check-in finished"), "check-in finished");
    }
}
