//! Telegram implementation of the chat transport, built on `teloxide`.
//!
//! One `Bot` per configured account. A dispatcher task per account maps raw
//! updates into [`InboundEvent`]s and feeds the account's subscription
//! channel; outbound sends are serialized per account while different
//! accounts send fully in parallel. Media downloads land in a cache
//! directory and complete by re-delivering the owning event with the local
//! path set.

use super::{
    AnswerOption, ChatKey, ChatTransport, InboundEvent, MediaRef, MessageContent, MessageRef,
    TransportError,
};
use crate::config::{
    AccountSettings, ACCOUNT_CHANNEL_CAPACITY, SEEN_CACHE_MAX_CAPACITY, SEEN_CACHE_TTL_SECS,
};
use crate::utils::{elide, retry_transport_operation};
use anyhow::anyhow;
use async_trait::async_trait;
use moka::future::Cache;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use teloxide::net::Download;
use teloxide::prelude::*;
use teloxide::types::{ChatId, FileId, InlineKeyboardButtonKind, InlineKeyboardMarkup};
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, trace, warn};

/// Per-account runtime state.
struct AccountState {
    name: String,
    bot: Bot,
    /// Serializes outbound sends for this account.
    send_lock: Mutex<()>,
    tx: mpsc::Sender<InboundEvent>,
    rx: Mutex<Option<mpsc::Receiver<InboundEvent>>>,
    seq: AtomicU64,
    /// Photo events awaiting download completion, by file id.
    pending_media: Mutex<HashMap<String, InboundEvent>>,
    /// Suppresses duplicate update delivery within a TTL window.
    seen: Cache<(i64, i32), ()>,
    media_dir: PathBuf,
}

impl AccountState {
    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::Relaxed)
    }
}

/// Telegram-backed [`ChatTransport`] over one or more bot accounts.
pub struct TelegramTransport {
    accounts: HashMap<String, Arc<AccountState>>,
}

impl TelegramTransport {
    /// Create the transport and start one update listener per account.
    ///
    /// Must be called within a tokio runtime.
    #[must_use]
    pub fn new(accounts: &[AccountSettings], media_dir: &Path) -> Self {
        let mut map = HashMap::new();
        for account in accounts {
            let (tx, rx) = mpsc::channel(ACCOUNT_CHANNEL_CAPACITY);
            let state = Arc::new(AccountState {
                name: account.name.clone(),
                bot: Bot::new(account.token.clone()),
                send_lock: Mutex::new(()),
                tx,
                rx: Mutex::new(Some(rx)),
                seq: AtomicU64::new(0),
                pending_media: Mutex::new(HashMap::new()),
                seen: Cache::builder()
                    .max_capacity(SEEN_CACHE_MAX_CAPACITY)
                    .time_to_live(Duration::from_secs(SEEN_CACHE_TTL_SECS))
                    .build(),
                media_dir: media_dir.to_path_buf(),
            });
            spawn_listener(Arc::clone(&state));
            map.insert(account.name.clone(), state);
        }
        Self { accounts: map }
    }

    fn account(&self, name: &str) -> Result<&Arc<AccountState>, TransportError> {
        self.accounts
            .get(name)
            .ok_or_else(|| TransportError::UnknownAccount(name.to_string()))
    }
}

fn spawn_listener(state: Arc<AccountState>) {
    let bot = state.bot.clone();
    let handler = Update::filter_message().endpoint(on_message);
    tokio::spawn(async move {
        Dispatcher::builder(bot, handler)
            .dependencies(dptree::deps![state])
            .build()
            .dispatch()
            .await;
    });
}

async fn on_message(
    msg: Message,
    state: Arc<AccountState>,
) -> Result<(), teloxide::RequestError> {
    let key = (msg.chat.id.0, msg.id.0);
    if state.seen.get(&key).await.is_some() {
        trace!(chat_id = key.0, message_id = key.1, "duplicate update dropped");
        return respond(());
    }
    state.seen.insert(key, ()).await;

    debug!(
        "{}",
        describe_update(
            &state.name,
            &sender_name(&msg),
            msg.chat.id.0,
            msg.from.as_ref().map(|u| u.id.0),
            msg.text().or_else(|| msg.caption()).unwrap_or_default(),
        )
    );

    if let Some(event) = map_message(&state, &msg) {
        if let MessageContent::Photo { media, .. } = &event.content {
            state
                .pending_media
                .lock()
                .await
                .insert(media.file_id.clone(), event.clone());
        }
        if state.tx.send(event).await.is_err() {
            trace!("inbound channel closed, update dropped");
        }
    }
    respond(())
}

/// Map a raw Telegram message into an engine event.
///
/// Unsupported content kinds (stickers, voice, ...) map to nothing and are
/// dropped at the transport boundary.
fn map_message(state: &AccountState, msg: &Message) -> Option<InboundEvent> {
    let chat = ChatKey {
        account: state.name.clone(),
        chat_id: msg.chat.id.0,
    };
    let content = if let Some(photos) = msg.photo() {
        // Last entry is the largest rendition.
        let photo = photos.last()?;
        MessageContent::Photo {
            caption: msg.caption().unwrap_or_default().to_string(),
            media: MediaRef {
                file_id: photo.file.id.0.clone(),
                local_path: None,
            },
            options: msg.reply_markup().map(extract_options).unwrap_or_default(),
        }
    } else if let Some(text) = msg.text() {
        MessageContent::Text {
            text: text.to_string(),
        }
    } else {
        return None;
    };
    Some(InboundEvent {
        seq: state.next_seq(),
        chat,
        message_id: i64::from(msg.id.0),
        content,
    })
}

fn extract_options(markup: &InlineKeyboardMarkup) -> Vec<AnswerOption> {
    markup
        .inline_keyboard
        .iter()
        .flatten()
        .map(|button| AnswerOption {
            label: button.text.clone(),
            data: match &button.kind {
                InlineKeyboardButtonKind::CallbackData(data) => Some(data.clone()),
                _ => None,
            },
        })
        .collect()
}

fn sender_name(msg: &Message) -> String {
    msg.from.as_ref().map_or_else(
        || "<unknown>".to_string(),
        |user| match &user.last_name {
            Some(last) => format!("{} {last}", user.first_name),
            None => user.first_name.clone(),
        },
    )
}

/// One-line rendering of an inbound message, used to discover chat ids.
#[must_use]
pub fn describe_update(
    account: &str,
    sender: &str,
    chat_id: i64,
    user_id: Option<u64>,
    text: &str,
) -> String {
    let user = user_id.map_or_else(|| "-".to_string(), |id| id.to_string());
    format!(
        "{account} > {sender}: {} (chat_id = {chat_id}, user_id = {user})",
        elide(text, 50)
    )
}

fn media_file_name(file_id: &str) -> String {
    let safe: String = file_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("{safe}.jpg")
}

async fn fetch_media(state: Arc<AccountState>, file_id: String) -> anyhow::Result<()> {
    let file = retry_transport_operation(|| async {
        state
            .bot
            .get_file(FileId(file_id.clone()))
            .await
            .map_err(|e| anyhow!("get_file failed: {e}"))
    })
    .await?;

    tokio::fs::create_dir_all(&state.media_dir).await?;
    let path = state.media_dir.join(media_file_name(&file_id));
    let mut dst = tokio::fs::File::create(&path).await?;
    state
        .bot
        .download_file(&file.path, &mut dst)
        .await
        .map_err(|e| anyhow!("download failed: {e}"))?;
    dst.flush().await?;

    let pending = state.pending_media.lock().await.remove(&file_id);
    if let Some(mut event) = pending {
        if let MessageContent::Photo { media, .. } = &mut event.content {
            media.local_path = Some(path);
        }
        event.seq = state.next_seq();
        let _ = state.tx.send(event).await;
    } else {
        debug!(file_id = %file_id, "downloaded media had no pending event");
    }
    Ok(())
}

#[async_trait]
impl ChatTransport for TelegramTransport {
    async fn send_text(&self, chat: &ChatKey, text: &str) -> Result<MessageRef, TransportError> {
        let state = self.account(&chat.account)?;
        let _guard = state.send_lock.lock().await;
        let sent = retry_transport_operation(|| async {
            state
                .bot
                .send_message(ChatId(chat.chat_id), text.to_string())
                .await
                .map_err(|e| anyhow!("telegram send error: {e}"))
        })
        .await
        .map_err(|e| TransportError::Send(e.to_string()))?;
        Ok(MessageRef {
            chat: chat.clone(),
            message_id: i64::from(sent.id.0),
        })
    }

    async fn click_option(
        &self,
        message: &MessageRef,
        option: &AnswerOption,
    ) -> Result<(), TransportError> {
        // Reply-keyboard semantics: pressing a button sends its label text
        // back to the chat.
        let state = self.account(&message.chat.account)?;
        let _guard = state.send_lock.lock().await;
        state
            .bot
            .send_message(ChatId(message.chat.chat_id), option.label.clone())
            .await
            .map(|_| ())
            .map_err(|e| TransportError::StaleInteraction(e.to_string()))
    }

    async fn download_media(
        &self,
        chat: &ChatKey,
        media: &MediaRef,
    ) -> Result<(), TransportError> {
        let state = Arc::clone(self.account(&chat.account)?);
        let file_id = media.file_id.clone();
        // Completion is delivered through the inbound channel, not awaited
        // here.
        tokio::spawn(async move {
            if let Err(e) = fetch_media(state, file_id).await {
                warn!(error = %e, "media download failed");
            }
        });
        Ok(())
    }

    async fn subscribe(&self, account: &str) -> Option<mpsc::Receiver<InboundEvent>> {
        let state = self.accounts.get(account)?;
        state.rx.lock().await.take()
    }
}
