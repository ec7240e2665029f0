//! The per-pair check-in state machine.
//!
//! One session owns the whole conversation with one target bot on one
//! account: it sends the trigger, classifies every inbound event, clicks
//! answer options, submits captcha text, and settles on exactly one terminal
//! outcome. Transport and challenge errors are absorbed into retry cycles;
//! the orchestrator only ever sees the terminal result.

use super::captcha::{CaptchaOutcome, CaptchaResolver};
use super::classifier::{classify, Category};
use super::history::HistoryStore;
use super::profile::TargetProfile;
use super::retry::RetryBudget;
use super::selector::select;
use crate::config::CAPTCHA_PLACEHOLDER;
use crate::transport::{
    AnswerOption, ChatKey, ChatTransport, InboundEvent, MessageContent, MessageRef,
};
use rand::Rng;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Lifecycle phase of one check-in conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Constructed, nothing sent yet.
    Init,
    /// Trigger (or retry trigger) dispatched; listening for inbound events.
    SentTrigger,
    /// Last classified event was an answer prompt.
    AwaitingAnswer,
    /// Last classified event was a captcha prompt.
    AwaitingCaptcha,
    /// Waiting for a recognizable result text.
    AwaitingText,
    /// An answer or captcha response has been submitted.
    Submitted,
    /// A retry cycle is in progress.
    Retrying,
    /// Terminal: the target confirmed the check-in.
    Success,
    /// Terminal: rejection or exhausted retry budget.
    Failed,
    /// Terminal: the run deadline expired first.
    TimedOut,
}

impl Phase {
    /// Whether the phase is terminal.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failed | Self::TimedOut)
    }
}

/// Terminal result of one (account, target) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckinOutcome {
    /// The target confirmed the check-in.
    Success,
    /// The target rejected the check-in, or the retry budget ran out.
    Failed,
    /// No terminal classification before the run deadline.
    TimedOut,
}

impl fmt::Display for CheckinOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Success => "success",
            Self::Failed => "failed",
            Self::TimedOut => "timed-out",
        };
        f.write_str(s)
    }
}

/// Terminal report of one finished session.
#[derive(Debug, Clone)]
pub struct SessionReport {
    /// Account the session ran on.
    pub account: String,
    /// Target identifier.
    pub target: String,
    /// Terminal outcome.
    pub outcome: CheckinOutcome,
}

/// The state machine instance bound to one (account, target) pair.
pub struct CheckinSession {
    account: String,
    profile: TargetProfile,
    chat: ChatKey,
    transport: Arc<dyn ChatTransport>,
    resolver: CaptchaResolver,
    history: Arc<Mutex<HistoryStore>>,
    budget: RetryBudget,
    phase: Phase,
    last_answer: Option<(MessageRef, AnswerOption)>,
    chosen_label: Option<String>,
    handled: HashMap<i64, HashSet<Category>>,
}

impl CheckinSession {
    /// Create a session for one (account, target) pair.
    #[must_use]
    pub fn new(
        account: String,
        profile: TargetProfile,
        transport: Arc<dyn ChatTransport>,
        resolver: CaptchaResolver,
        history: Arc<Mutex<HistoryStore>>,
        retries: u32,
    ) -> Self {
        let chat = ChatKey {
            account: account.clone(),
            chat_id: profile.chat_id,
        };
        Self {
            account,
            profile,
            chat,
            transport,
            resolver,
            history,
            budget: RetryBudget::new(retries),
            phase: Phase::Init,
            last_answer: None,
            chosen_label: None,
            handled: HashMap::new(),
        }
    }

    /// Run the session to its terminal outcome.
    ///
    /// Sends the trigger, then processes inbound events in arrival order
    /// until a terminal phase is reached or `deadline` fires. Events
    /// arriving after the terminal transition are dropped, not buffered.
    pub async fn run(
        mut self,
        mut events: mpsc::Receiver<InboundEvent>,
        deadline: CancellationToken,
    ) -> SessionReport {
        info!(
            account = %self.account,
            bot = %self.profile.display_name(),
            "starting check-in"
        );

        if let Err(e) = self.send_trigger().await {
            warn!(
                account = %self.account,
                bot = %self.profile.display_name(),
                error = %e,
                "initial trigger send failed"
            );
            self.enter_retry().await;
        }

        while !self.phase.is_terminal() {
            tokio::select! {
                () = deadline.cancelled() => {
                    self.phase = Phase::TimedOut;
                }
                event = events.recv() => match event {
                    Some(event) => self.handle_event(event).await,
                    // Inbound stream gone: nothing more can arrive.
                    None => self.phase = Phase::TimedOut,
                },
            }
        }

        let outcome = match self.phase {
            Phase::Success => CheckinOutcome::Success,
            Phase::Failed => CheckinOutcome::Failed,
            _ => CheckinOutcome::TimedOut,
        };
        self.record_outcome(outcome).await;
        info!(
            account = %self.account,
            bot = %self.profile.display_name(),
            outcome = %outcome,
            attempts = self.budget.used(),
            "check-in finished"
        );
        SessionReport {
            account: self.account,
            target: self.profile.id,
            outcome,
        }
    }

    async fn handle_event(&mut self, event: InboundEvent) {
        if event.chat != self.chat {
            trace!(chat_id = event.chat.chat_id, "event for foreign chat dropped");
            return;
        }
        let ignore = self
            .handled
            .get(&event.message_id)
            .cloned()
            .unwrap_or_default();
        for category in classify(&self.profile, &event.content, &ignore) {
            match category {
                Category::Answer => self.on_answer(&event).await,
                Category::Captcha => self.on_captcha(&event).await,
                Category::Text => self.on_text(&event),
            }
            if self.phase.is_terminal() {
                break;
            }
        }
    }

    async fn on_answer(&mut self, event: &InboundEvent) {
        self.phase = Phase::AwaitingAnswer;
        let MessageContent::Photo { options, .. } = &event.content else {
            return;
        };
        let history = {
            let store = self.history.lock().await;
            store.target(&self.profile.id).cloned().unwrap_or_default()
        };
        let Some(option) = select(&self.profile, options, &history) else {
            debug!(
                bot = %self.profile.display_name(),
                options = options.len(),
                "no usable answer option"
            );
            self.enter_retry().await;
            return;
        };
        let option = option.clone();
        let message = MessageRef {
            chat: self.chat.clone(),
            message_id: event.message_id,
        };
        match self.transport.click_option(&message, &option).await {
            Ok(()) => {
                debug!(label = %option.label, "answer option clicked");
                self.mark_handled(event.message_id, Category::Answer);
                self.chosen_label = Some(option.label.clone());
                self.last_answer = Some((message, option));
                self.phase = Phase::Submitted;
            }
            Err(e) => {
                warn!(error = %e, "answer click failed");
                self.enter_retry().await;
            }
        }
    }

    async fn on_captcha(&mut self, event: &InboundEvent) {
        self.phase = Phase::AwaitingCaptcha;
        let MessageContent::Photo { media, .. } = &event.content else {
            return;
        };
        let resolved = self
            .resolver
            .resolve(
                self.transport.as_ref(),
                &self.chat,
                media,
                self.profile.captcha_len,
            )
            .await;
        match resolved {
            // Stay awaiting; the transport re-delivers the message once the
            // image is materialized.
            Ok(CaptchaOutcome::Pending) => {}
            Ok(CaptchaOutcome::Resolved(text)) => {
                let unreadable = text.is_empty();
                let answer = if unreadable {
                    debug!("unreadable captcha, submitting placeholder");
                    CAPTCHA_PLACEHOLDER.to_string()
                } else {
                    text
                };
                self.courtesy_pause().await;
                match self.transport.send_text(&self.chat, &answer).await {
                    Ok(_) => {
                        debug!(answer = %answer, "captcha submitted");
                        self.mark_handled(event.message_id, Category::Captcha);
                        if unreadable {
                            // The placeholder keeps the bot talking; the real
                            // recovery is a fresh attempt.
                            self.enter_retry().await;
                        } else {
                            self.phase = Phase::Submitted;
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "captcha submission failed");
                        self.enter_retry().await;
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "captcha download request failed");
                self.enter_retry().await;
            }
        }
    }

    fn on_text(&mut self, event: &InboundEvent) {
        let text = match &event.content {
            MessageContent::Text { text } => text,
            MessageContent::Photo { caption, .. } => caption,
        };
        if self.profile.is_ignorable_text(text) {
            trace!(text = %crate::utils::elide(text, 50), "ignorable text skipped");
            return;
        }
        // Failure keywords first: they are often supersets of the success
        // keywords ("签到失败" contains "签到").
        if self.profile.is_failure_text(text) {
            warn!(
                bot = %self.profile.display_name(),
                text = %crate::utils::elide(text, 50),
                "target rejected the check-in"
            );
            self.phase = Phase::Failed;
        } else if self.profile.is_success_text(text) {
            self.phase = Phase::Success;
        } else {
            trace!(text = %crate::utils::elide(text, 50), "unrecognized text");
            self.phase = Phase::AwaitingText;
        }
    }

    /// Consume attempts until a trigger re-send goes through, or fail.
    async fn enter_retry(&mut self) {
        self.phase = Phase::Retrying;
        while self.budget.try_consume() {
            debug!(
                bot = %self.profile.display_name(),
                attempt = self.budget.used(),
                "retrying check-in"
            );
            self.nudge().await;
            match self.send_trigger().await {
                Ok(()) => return,
                Err(e) => warn!(error = %e, "trigger re-send failed"),
            }
        }
        warn!(
            account = %self.account,
            bot = %self.profile.display_name(),
            attempts = self.budget.used(),
            "retry budget exhausted"
        );
        self.phase = Phase::Failed;
    }

    /// Best-effort re-click of the last answer message before a retry.
    async fn nudge(&self) {
        if !self.profile.hooks.nudge_before_retry {
            return;
        }
        let Some((message, option)) = &self.last_answer else {
            return;
        };
        if let Err(e) = self.transport.click_option(message, option).await {
            // Stale interactions are expected here and never block the retry.
            debug!(error = %e, "nudge click ignored");
        }
    }

    async fn send_trigger(&mut self) -> Result<(), crate::transport::TransportError> {
        self.transport
            .send_text(&self.chat, &self.profile.trigger)
            .await?;
        self.phase = Phase::SentTrigger;
        Ok(())
    }

    /// Randomized courtesy pause before captcha submission.
    ///
    /// Not part of the retry budget; keeps submission timing away from
    /// bot-side rate classification.
    async fn courtesy_pause(&self) {
        let (lo, hi) = self.profile.submit_delay_secs;
        let hi = hi.max(lo);
        if hi == 0 {
            return;
        }
        let secs = rand::thread_rng().gen_range(lo..=hi);
        tokio::time::sleep(Duration::from_secs(secs)).await;
    }

    fn mark_handled(&mut self, message_id: i64, category: Category) {
        self.handled.entry(message_id).or_default().insert(category);
    }

    async fn record_outcome(&self, outcome: CheckinOutcome) {
        if self.profile.history_window == 0 {
            return;
        }
        let Some(label) = &self.chosen_label else {
            return;
        };
        let success = match outcome {
            CheckinOutcome::Success => true,
            CheckinOutcome::Failed => false,
            // Outcome unknown, nothing to learn from.
            CheckinOutcome::TimedOut => return,
        };
        self.history.lock().await.record(
            &self.profile.id,
            label,
            success,
            self.profile.history_window,
        );
    }
}
