//! Upstream transport contract.
//!
//! The concrete MTProto client lives outside the core; it feeds [`ChatEvent`]s
//! into an mpsc channel and resolves entity titles on demand. The daemon wraps
//! [`AccountListener::run`] in the resilient restart loop.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("upstream disconnected: {0}")]
    Disconnected(String),

    #[error("authorization required: {0}")]
    Unauthorized(String),

    #[error("store error: {0}")]
    Store(#[from] adjutant_store::StoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatKind {
    Private,
    Group,
    Channel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Photo,
    Voice,
    VideoNote,
    Video,
    Document,
    Audio,
    Sticker,
    /// Animated mp4 without a caption ("silent GIF").
    Gif,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Photo => "photo",
            MediaKind::Voice => "voice",
            MediaKind::VideoNote => "video_note",
            MediaKind::Video => "video",
            MediaKind::Document => "document",
            MediaKind::Audio => "audio",
            MediaKind::Sticker => "sticker",
            MediaKind::Gif => "gif",
        }
    }
}

/// What kind of peer a forwarded message originally came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardKind {
    User,
    Channel,
}

#[derive(Debug, Clone)]
pub struct SenderInfo {
    pub id: i64,
    pub name: String,
    pub is_bot: bool,
    pub is_channel: bool,
}

/// One upstream message event as delivered by a transport adapter.
#[derive(Debug, Clone)]
pub struct ChatEvent {
    pub msg_id: i64,
    pub chat_id: i64,
    pub chat_kind: ChatKind,
    /// Transport-provided title; resolved via [`EntityResolver`] when absent.
    pub chat_title: Option<String>,
    pub sender: SenderInfo,
    pub text: String,
    pub media: Option<MediaKind>,
    pub forwarded_from: Option<ForwardKind>,
    /// Service events (joins, pins, etc.) carry no classifiable content.
    pub is_service: bool,
    pub timestamp: DateTime<Utc>,
    pub account_label: String,
    /// Raw photo bytes for caption-less photos in private chats, when the
    /// transport chose to download them (small photos only).
    pub photo_bytes: Option<Vec<u8>>,
}

/// One upstream account. The daemon's resilient supervisor drives the
/// connect → pump → reconnect cycle.
#[async_trait]
pub trait AccountListener: Send + Sync {
    fn label(&self) -> &str;

    /// Connect and authorize. Idempotent; called again after every drop.
    async fn start(&self) -> Result<(), IngestError>;

    /// Pump events into `events` until the connection drops. Returning is
    /// always an error condition; the supervisor handles reconnects.
    async fn run(&self, events: mpsc::Sender<ChatEvent>) -> Result<(), IngestError>;

    /// Tear the connection down (shutdown path). Best-effort.
    async fn disconnect(&self) {}
}

/// Resolve a human title for a chat or user id.
#[async_trait]
pub trait EntityResolver: Send + Sync {
    async fn resolve_title(&self, id: i64) -> Option<String>;
}
