//! Chat transport interface consumed by the check-in engine.
//!
//! The engine is transport-agnostic: it asks the transport to send text,
//! click an option, or materialize a media payload, and consumes inbound
//! events from a per-account subscription. The Telegram implementation lives
//! in [`telegram`].

use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;
use tokio::sync::mpsc;

pub mod telegram;

/// Identity of one chat as seen by one account.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChatKey {
    /// Account the chat belongs to.
    pub account: String,
    /// Chat identifier within that account.
    pub chat_id: i64,
}

/// Reference to a message, sufficient to interact with it later.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRef {
    /// Chat the message lives in.
    pub chat: ChatKey,
    /// Message identifier within the chat.
    pub message_id: i64,
}

/// Reference to a media payload attached to a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaRef {
    /// Transport-level file identifier.
    pub file_id: String,
    /// Local path once the payload has been materialized on disk.
    ///
    /// `None` until the transport has completed the download; the engine must
    /// not attempt OCR before that.
    pub local_path: Option<PathBuf>,
}

/// One selectable option attached to a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerOption {
    /// Visible label, in presentation order within the owning message.
    pub label: String,
    /// Opaque click payload, if the transport provides one.
    pub data: Option<String>,
}

/// Content variants of an inbound message.
#[derive(Debug, Clone)]
pub enum MessageContent {
    /// Plain text message.
    Text {
        /// The message text.
        text: String,
    },
    /// Photo with caption and optional selectable options.
    Photo {
        /// Caption attached to the photo.
        caption: String,
        /// The photo payload.
        media: MediaRef,
        /// Selectable options, in presentation order.
        options: Vec<AnswerOption>,
    },
}

/// One inbound message/update delivered by the transport.
///
/// Never mutated after receipt; owned by the session that consumes it.
#[derive(Debug, Clone)]
pub struct InboundEvent {
    /// Per-account monotonically increasing arrival order.
    pub seq: u64,
    /// Originating (account, chat) identity.
    pub chat: ChatKey,
    /// Message identifier within the chat.
    pub message_id: i64,
    /// Message content.
    pub content: MessageContent,
}

/// Errors surfaced by transport operations.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Sending a message failed.
    #[error("send failed: {0}")]
    Send(String),
    /// The interaction target is no longer valid (expired button, deleted
    /// message).
    #[error("stale interaction: {0}")]
    StaleInteraction(String),
    /// Media download failed.
    #[error("media download failed: {0}")]
    Download(String),
    /// The account is not managed by this transport.
    #[error("unknown account: {0}")]
    UnknownAccount(String),
}

/// Outbound operations and inbound subscription offered by a chat transport.
///
/// Implementations serialize sends per account; different accounts may send
/// fully in parallel.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Send a text message to a chat.
    async fn send_text(&self, chat: &ChatKey, text: &str) -> Result<MessageRef, TransportError>;

    /// Click one selectable option of a previously received message.
    async fn click_option(
        &self,
        message: &MessageRef,
        option: &AnswerOption,
    ) -> Result<(), TransportError>;

    /// Request materialization of a media payload.
    ///
    /// Completion is signalled by a later [`InboundEvent`] re-delivering the
    /// owning message with [`MediaRef::local_path`] set.
    async fn download_media(&self, chat: &ChatKey, media: &MediaRef)
        -> Result<(), TransportError>;

    /// Take the inbound event stream for an account.
    ///
    /// Each account's stream can be taken once per run; subsequent calls (and
    /// calls for unmanaged accounts) return `None`.
    async fn subscribe(&self, account: &str) -> Option<mpsc::Receiver<InboundEvent>>;
}
