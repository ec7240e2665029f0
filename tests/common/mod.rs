//! In-memory collaborators for end-to-end engine tests.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use telecheckin::checkin::profile::{TargetHooks, TargetProfile};
use telecheckin::ocr::{CaptchaOcr, OcrError};
use telecheckin::transport::{
    AnswerOption, ChatKey, ChatTransport, InboundEvent, MediaRef, MessageContent, MessageRef,
    TransportError,
};
use tokio::sync::{mpsc, Mutex};

/// One recorded outbound action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// `send_text` was called.
    Text {
        account: String,
        chat_id: i64,
        text: String,
    },
    /// `click_option` was called.
    Click {
        account: String,
        chat_id: i64,
        message_id: i64,
        label: String,
    },
    /// `download_media` was called.
    Download {
        account: String,
        chat_id: i64,
        file_id: String,
    },
}

/// Scripted in-memory transport.
///
/// Records every outbound action, mirrors it into an unbounded channel so a
/// test responder can react, and lets the test inject inbound events per
/// account.
pub struct MockTransport {
    outbound_tx: mpsc::UnboundedSender<Outbound>,
    actions: Mutex<Vec<Outbound>>,
    inbound_rx: Mutex<HashMap<String, mpsc::Receiver<InboundEvent>>>,
    inbound_tx: HashMap<String, mpsc::Sender<InboundEvent>>,
    seq: AtomicU64,
    out_id: AtomicU64,
    /// Clicks allowed before every further click fails as stale.
    pub clicks_before_stale: AtomicUsize,
}

impl MockTransport {
    pub fn new(accounts: &[&str]) -> (Arc<Self>, mpsc::UnboundedReceiver<Outbound>) {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let mut inbound_rx = HashMap::new();
        let mut inbound_tx = HashMap::new();
        for account in accounts {
            let (tx, rx) = mpsc::channel(64);
            inbound_tx.insert((*account).to_string(), tx);
            inbound_rx.insert((*account).to_string(), rx);
        }
        let transport = Arc::new(Self {
            outbound_tx,
            actions: Mutex::new(Vec::new()),
            inbound_rx: Mutex::new(inbound_rx),
            inbound_tx,
            seq: AtomicU64::new(0),
            out_id: AtomicU64::new(1000),
            clicks_before_stale: AtomicUsize::new(usize::MAX),
        });
        (transport, outbound_rx)
    }

    async fn record(&self, action: Outbound) {
        self.actions.lock().await.push(action.clone());
        let _ = self.outbound_tx.send(action);
    }

    /// Snapshot of all recorded outbound actions.
    pub async fn actions(&self) -> Vec<Outbound> {
        self.actions.lock().await.clone()
    }

    /// Number of text sends matching `text`, across all accounts.
    pub async fn count_text_sends(&self, text: &str) -> usize {
        self.actions
            .lock()
            .await
            .iter()
            .filter(|a| matches!(a, Outbound::Text { text: t, .. } if t == text))
            .count()
    }

    /// Number of recorded clicks, across all accounts.
    pub async fn count_clicks(&self) -> usize {
        self.actions
            .lock()
            .await
            .iter()
            .filter(|a| matches!(a, Outbound::Click { .. }))
            .count()
    }

    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::Relaxed)
    }

    async fn push(&self, account: &str, event: InboundEvent) {
        let tx = self
            .inbound_tx
            .get(account)
            .unwrap_or_else(|| panic!("unknown account {account}"));
        let _ = tx.send(event).await;
    }

    /// Inject a plain text message.
    pub async fn push_text(&self, account: &str, chat_id: i64, message_id: i64, text: &str) {
        let event = InboundEvent {
            seq: self.next_seq(),
            chat: ChatKey {
                account: account.to_string(),
                chat_id,
            },
            message_id,
            content: MessageContent::Text {
                text: text.to_string(),
            },
        };
        self.push(account, event).await;
    }

    /// Inject a photo message with caption, media state and option labels.
    pub async fn push_photo(
        &self,
        account: &str,
        chat_id: i64,
        message_id: i64,
        caption: &str,
        media: MediaRef,
        labels: &[&str],
    ) {
        let event = InboundEvent {
            seq: self.next_seq(),
            chat: ChatKey {
                account: account.to_string(),
                chat_id,
            },
            message_id,
            content: MessageContent::Photo {
                caption: caption.to_string(),
                media,
                options: labels
                    .iter()
                    .map(|l| AnswerOption {
                        label: (*l).to_string(),
                        data: None,
                    })
                    .collect(),
            },
        };
        self.push(account, event).await;
    }
}

/// Media reference helper for scripted photos.
pub fn media(file_id: &str, local_path: Option<&str>) -> MediaRef {
    MediaRef {
        file_id: file_id.to_string(),
        local_path: local_path.map(PathBuf::from),
    }
}

#[async_trait]
impl ChatTransport for MockTransport {
    async fn send_text(&self, chat: &ChatKey, text: &str) -> Result<MessageRef, TransportError> {
        self.record(Outbound::Text {
            account: chat.account.clone(),
            chat_id: chat.chat_id,
            text: text.to_string(),
        })
        .await;
        let message_id = self.out_id.fetch_add(1, Ordering::Relaxed);
        Ok(MessageRef {
            chat: chat.clone(),
            message_id: i64::try_from(message_id).unwrap_or(i64::MAX),
        })
    }

    async fn click_option(
        &self,
        message: &MessageRef,
        option: &AnswerOption,
    ) -> Result<(), TransportError> {
        self.record(Outbound::Click {
            account: message.chat.account.clone(),
            chat_id: message.chat.chat_id,
            message_id: message.message_id,
            label: option.label.clone(),
        })
        .await;
        let remaining = self.clicks_before_stale.load(Ordering::SeqCst);
        if remaining == 0 {
            return Err(TransportError::StaleInteraction(
                "query is too old".to_string(),
            ));
        }
        if remaining != usize::MAX {
            self.clicks_before_stale.store(remaining - 1, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn download_media(
        &self,
        chat: &ChatKey,
        media: &MediaRef,
    ) -> Result<(), TransportError> {
        self.record(Outbound::Download {
            account: chat.account.clone(),
            chat_id: chat.chat_id,
            file_id: media.file_id.clone(),
        })
        .await;
        Ok(())
    }

    async fn subscribe(&self, account: &str) -> Option<mpsc::Receiver<InboundEvent>> {
        self.inbound_rx.lock().await.remove(account)
    }
}

/// OCR collaborator replaying a scripted answer per call.
///
/// An exhausted script resolves everything to the empty string.
pub struct ScriptedOcr {
    answers: Mutex<VecDeque<String>>,
    calls: AtomicUsize,
}

impl ScriptedOcr {
    pub fn new(answers: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            answers: Mutex::new(answers.iter().map(|a| (*a).to_string()).collect()),
            calls: AtomicUsize::new(0),
        })
    }

    /// Number of resolution calls observed.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CaptchaOcr for ScriptedOcr {
    async fn resolve(&self, _image: &Path) -> Result<String, OcrError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.answers.lock().await.pop_front().unwrap_or_default())
    }
}

/// A target profile for scripted scenarios: trigger `/start`, success
/// keyword `签到`, no courtesy delay.
pub fn test_target(id: &str, chat_id: i64) -> TargetProfile {
    TargetProfile {
        id: id.to_string(),
        name: String::new(),
        chat_id,
        trigger: "/start".to_string(),
        captcha_len: 4,
        history_window: 20,
        ignore_markers: vec!["下列选项".to_string()],
        menu_marker: "欢迎使用".to_string(),
        captcha_marker: "请输入验证码".to_string(),
        success_keywords: vec!["签到".to_string()],
        failure_keywords: vec!["失败".to_string()],
        case_insensitive: false,
        submit_delay_secs: (0, 0),
        hooks: TargetHooks::default(),
    }
}
