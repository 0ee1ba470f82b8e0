//! The per-event ingestion pipeline.
//!
//! Filter → monitored decision → blacklist → text extraction → idempotent
//! persistence → new-contact notice → classify routing → processed handshake.
//! Failures are logged per event and never propagate: this is a live stream.

use std::sync::Arc;

use serde_json::json;
use tracing::{debug, error, info, warn};

use adjutant_core::notify::NotifySender;
use adjutant_llm::{ChatRequest, LlmRouter};
use adjutant_classifier::ClassifyRequest;
use adjutant_store::messages::{MessageStore, NewMessage};
use adjutant_store::settings::SettingsStore;
use adjutant_tasks::TaskEngine;
use tokio::sync::mpsc;

use crate::caches::{ChatNameCache, TtlIdSet};
use crate::listener::{ChatEvent, ChatKind, EntityResolver, ForwardKind, MediaKind};

/// Minimum text length for classification.
const CLASSIFY_MIN_CHARS: usize = 5;
/// Photos above this size are stored as a bare `[photo]` tag.
const MAX_PHOTO_BYTES: usize = 5 * 1024 * 1024;

/// Drop rule applied before anything touches the store.
pub fn should_ignore(event: &ChatEvent) -> bool {
    if event.is_service {
        return true;
    }
    match event.media {
        Some(MediaKind::Sticker) => return true,
        Some(MediaKind::Gif) if event.text.is_empty() => return true,
        _ => {}
    }
    // Reposted channel content is broadcast noise, not correspondence.
    if event.forwarded_from == Some(ForwardKind::Channel) {
        return true;
    }
    // Bots in private chats (payment bots, notification bots).
    if event.chat_kind == ChatKind::Private && event.sender.is_bot {
        return true;
    }
    false
}

pub struct Ingestor {
    messages: MessageStore,
    settings: SettingsStore,
    engine: Arc<TaskEngine>,
    llm: Arc<LlmRouter>,
    notify: NotifySender,
    classify_tx: mpsc::Sender<ClassifyRequest>,
    resolver: Arc<dyn EntityResolver>,
    whitelist: TtlIdSet,
    blacklist: TtlIdSet,
    chat_names: ChatNameCache,
    owner_id: i64,
    /// The control-channel bot - its private chat is never classified.
    bot_id: i64,
}

impl Ingestor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        messages: MessageStore,
        settings: SettingsStore,
        engine: Arc<TaskEngine>,
        llm: Arc<LlmRouter>,
        notify: NotifySender,
        classify_tx: mpsc::Sender<ClassifyRequest>,
        resolver: Arc<dyn EntityResolver>,
        owner_id: i64,
        bot_id: i64,
    ) -> Self {
        Self {
            messages,
            settings,
            engine,
            llm,
            notify,
            classify_tx,
            resolver,
            whitelist: TtlIdSet::whitelist(),
            blacklist: TtlIdSet::blacklist(),
            chat_names: ChatNameCache::default(),
            owner_id,
            bot_id,
        }
    }

    /// Entry point for every upstream event. Never errors upward.
    pub async fn handle_event(&self, event: ChatEvent) {
        if let Err(e) = self.process(event).await {
            error!(error = %e, "event processing failed — message skipped");
        }
    }

    async fn process(&self, event: ChatEvent) -> adjutant_core::Result<()> {
        if should_ignore(&event) {
            return Ok(());
        }

        let is_private = event.chat_kind == ChatKind::Private;
        let in_whitelist = self
            .whitelist
            .get(&self.settings)
            .contains(&event.chat_id);

        // Monitored: private chats with people, plus whitelisted groups.
        if !is_private && !in_whitelist {
            return Ok(());
        }

        let blacklist = self.blacklist.get(&self.settings);
        if blacklist.contains(&event.chat_id) || blacklist.contains(&event.sender.id) {
            return Ok(());
        }

        let chat_title = match &event.chat_title {
            Some(title) => title.clone(),
            None => {
                self.chat_names
                    .resolve(event.chat_id, self.resolver.as_ref())
                    .await
            }
        };

        let text = self.extract_text(&event, is_private).await;
        let Some(text) = text else {
            return Ok(()); // empty and no media — nothing to keep
        };

        let db_id = self.messages.save(&NewMessage {
            upstream_msg_id: event.msg_id,
            chat_id: event.chat_id,
            chat_title: chat_title.clone(),
            sender_id: event.sender.id,
            sender_name: event.sender.name.clone(),
            text: text.clone(),
            media_kind: event.media.map(|m| m.as_str().to_string()),
            timestamp: event.timestamp,
            account: event.account_label.clone(),
        })?;

        let Some(db_id) = db_id else {
            debug!(msg_id = event.msg_id, chat_id = event.chat_id, "duplicate dropped");
            return Ok(());
        };

        // First sighting of a sender in a whitelisted group.
        if in_whitelist
            && event.sender.id != 0
            && event.sender.id != self.owner_id
            && !event.sender.is_bot
            && !event.sender.is_channel
        {
            if self
                .messages
                .record_contact(event.sender.id, &event.sender.name)?
            {
                let preview: String = text.chars().take(100).collect();
                self.notify
                    .send_text(format!(
                        "👋 Новый контакт: {}\nПервое сообщение: «{preview}»\nЧат: {chat_title}",
                        event.sender.name,
                    ))
                    .await;
            }
        }

        // Channel posts feed digests only.
        if event.sender.is_channel {
            self.messages.mark_processed(db_id)?;
            return Ok(());
        }

        let is_control_channel =
            is_private && (event.sender.id == self.bot_id || event.chat_id == self.bot_id);

        if is_private && !is_control_channel && text.chars().count() > CLASSIFY_MIN_CHARS {
            // Fetch the persisted row so the classifier sees exactly what the
            // store holds (id, normalized text, timestamps).
            if let Some(message) = self.messages.get(db_id)? {
                let owner_is_sender = event.sender.id == self.owner_id;
                if self
                    .classify_tx
                    .send(ClassifyRequest {
                        message,
                        owner_is_sender,
                    })
                    .await
                    .is_err()
                {
                    warn!(db_id, "classifier channel closed — marking processed");
                    self.messages.mark_processed(db_id)?;
                }
                // The worker stamps `processed` when it finishes.

                // A reply from the counterparty may be completion evidence.
                if !owner_is_sender {
                    self.engine.on_inbound_for_tracked(event.chat_id).await?;
                }
            }
        } else {
            // Group traffic and short private messages are digest fodder.
            self.messages.mark_processed(db_id)?;
        }

        Ok(())
    }

    /// Final message text: the caption, a vision annotation for caption-less
    /// private photos, or a `[media]` placeholder. `None` drops the event.
    async fn extract_text(&self, event: &ChatEvent, is_private: bool) -> Option<String> {
        if !event.text.is_empty() {
            return Some(event.text.clone());
        }
        let media = event.media?;

        if media == MediaKind::Photo && is_private {
            if let Some(bytes) = &event.photo_bytes {
                if bytes.len() <= MAX_PHOTO_BYTES {
                    match self.describe_photo(bytes).await {
                        Ok(description) if !description.is_empty() => {
                            info!(chat_id = event.chat_id, "photo annotated");
                            return Some(format!("[photo: {description}]"));
                        }
                        Ok(_) => {}
                        Err(e) => warn!(error = %e, "photo annotation failed"),
                    }
                }
            }
        }

        Some(format!("[{}]", media.as_str()))
    }

    /// One-line judge-tier description of a photo.
    async fn describe_photo(&self, bytes: &[u8]) -> adjutant_core::Result<String> {
        use base64::Engine as _;
        let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
        let req = ChatRequest {
            model: self.llm.model_for(adjutant_llm::ModelTier::Judge).to_string(),
            system: "Опиши изображение одним коротким предложением по-русски. Без вступлений."
                .to_string(),
            system_prompt: None,
            messages: Vec::new(),
            max_tokens: 256,
            tools: Vec::new(),
            raw_messages: Some(vec![json!({
                "role": "user",
                "content": [
                    {"type": "image", "source": {
                        "type": "base64", "media_type": "image/jpeg", "data": encoded,
                    }},
                    {"type": "text", "text": "Что на фото?"},
                ],
            })]),
        };
        let resp = self
            .llm
            .send_api(&req)
            .await
            .map_err(adjutant_core::AdjutantError::from)?;
        Ok(resp.content.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adjutant_core::config::LlmConfig;
    use adjutant_store::Store;
    use async_trait::async_trait;
    use chrono::Utc;

    struct StaticResolver;

    #[async_trait]
    impl EntityResolver for StaticResolver {
        async fn resolve_title(&self, _id: i64) -> Option<String> {
            Some("Resolved Chat".into())
        }
    }

    const OWNER: i64 = 42;
    const BOT: i64 = 900;

    fn ingestor(
        store: &Store,
    ) -> (Ingestor, mpsc::Receiver<ClassifyRequest>, mpsc::Receiver<adjutant_core::notify::Notification>) {
        let (notify, notify_rx) = NotifySender::channel(32);
        let (classify_tx, classify_rx) = mpsc::channel(32);
        let llm = Arc::new(LlmRouter::new(
            &LlmConfig::default(),
            store.settings(),
            notify.clone(),
        ));
        let engine = Arc::new(TaskEngine::new(
            store.tasks(),
            store.messages(),
            llm.clone(),
            notify.clone(),
            7,
        ));
        let ingestor = Ingestor::new(
            store.messages(),
            store.settings(),
            engine,
            llm,
            notify,
            classify_tx,
            Arc::new(StaticResolver),
            OWNER,
            BOT,
        );
        (ingestor, classify_rx, notify_rx)
    }

    fn private_event(msg_id: i64, sender_id: i64, text: &str) -> ChatEvent {
        ChatEvent {
            msg_id,
            chat_id: sender_id,
            chat_kind: ChatKind::Private,
            chat_title: None,
            sender: SenderInfo {
                id: sender_id,
                name: "Козлов".into(),
                is_bot: false,
                is_channel: false,
            },
            text: text.into(),
            media: None,
            forwarded_from: None,
            is_service: false,
            timestamp: Utc::now(),
            account_label: "primary".into(),
            photo_bytes: None,
        }
    }

    use crate::listener::SenderInfo;

    #[test]
    fn ignore_rules_cover_noise() {
        let mut e = private_event(1, 9, "");
        e.media = Some(MediaKind::Sticker);
        assert!(should_ignore(&e));

        let mut e = private_event(1, 9, "");
        e.media = Some(MediaKind::Gif);
        assert!(should_ignore(&e));
        e.text = "смотри какая гифка".into();
        assert!(!should_ignore(&e));

        let mut e = private_event(1, 9, "пост");
        e.forwarded_from = Some(ForwardKind::Channel);
        assert!(should_ignore(&e));

        let mut e = private_event(1, 9, "от бота");
        e.sender.is_bot = true;
        assert!(should_ignore(&e));

        let mut e = private_event(1, 9, "сервисное");
        e.is_service = true;
        assert!(should_ignore(&e));
    }

    #[tokio::test]
    async fn private_message_is_persisted_and_routed() {
        let store = Store::open_in_memory().unwrap();
        let (ingestor, mut classify_rx, _notify_rx) = ingestor(&store);

        ingestor
            .handle_event(private_event(1, 9, "Оплати счёт 12345 до 2026-02-18"))
            .await;

        let req = classify_rx.try_recv().unwrap();
        assert_eq!(req.message.text, "Оплати счёт 12345 до 2026-02-18");
        assert!(!req.owner_is_sender);
        assert_eq!(store.messages().stats().unwrap().messages, 1);
    }

    #[tokio::test]
    async fn replayed_event_is_a_noop() {
        let store = Store::open_in_memory().unwrap();
        let (ingestor, mut classify_rx, _notify_rx) = ingestor(&store);

        let event = private_event(1, 9, "повторяющееся сообщение");
        ingestor.handle_event(event.clone()).await;
        ingestor.handle_event(event).await;

        assert_eq!(store.messages().stats().unwrap().messages, 1);
        assert!(classify_rx.try_recv().is_ok());
        assert!(classify_rx.try_recv().is_err(), "duplicate must not be re-routed");
    }

    #[tokio::test]
    async fn short_text_is_stored_but_not_classified() {
        let store = Store::open_in_memory().unwrap();
        let (ingestor, mut classify_rx, _notify_rx) = ingestor(&store);

        ingestor.handle_event(private_event(1, 9, "ок")).await;

        assert!(classify_rx.try_recv().is_err());
        let stored = store.messages().recent_in_chat(9, 1).unwrap();
        assert!(stored[0].processed, "non-routed messages are processed immediately");
    }

    #[tokio::test]
    async fn control_channel_is_never_classified() {
        let store = Store::open_in_memory().unwrap();
        let (ingestor, mut classify_rx, _notify_rx) = ingestor(&store);

        let mut event = private_event(1, BOT, "нажми кнопку чтобы продолжить");
        event.chat_id = BOT;
        ingestor.handle_event(event).await;
        // Bot senders are dropped entirely by the ignore rule; an owner
        // message in the bot chat is stored but not routed.
        let mut event = private_event(2, OWNER, "напомни завтра про ремень");
        event.chat_id = BOT;
        ingestor.handle_event(event).await;
        assert!(classify_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn unlisted_group_is_dropped_whitelisted_is_stored_unclassified() {
        let store = Store::open_in_memory().unwrap();
        let (ingestor, mut classify_rx, _notify_rx) = ingestor(&store);

        let mut event = private_event(1, 9, "обсуждение поставки в группе");
        event.chat_kind = ChatKind::Group;
        event.chat_id = -100500;
        ingestor.handle_event(event.clone()).await;
        assert_eq!(store.messages().stats().unwrap().messages, 0);

        store.settings().list_add("whitelist", -100500).unwrap();
        event.msg_id = 2;
        ingestor.handle_event(event).await;
        assert_eq!(store.messages().stats().unwrap().messages, 1);
        assert!(classify_rx.try_recv().is_err(), "group traffic feeds digests only");
    }

    #[tokio::test]
    async fn blacklisted_sender_is_dropped() {
        let store = Store::open_in_memory().unwrap();
        let (ingestor, _classify_rx, _notify_rx) = ingestor(&store);
        store.settings().list_add("blacklist", 9).unwrap();

        ingestor
            .handle_event(private_event(1, 9, "сообщение из чёрного списка"))
            .await;
        assert_eq!(store.messages().stats().unwrap().messages, 0);
    }

    #[tokio::test]
    async fn new_contact_in_whitelisted_group_notifies_once() {
        let store = Store::open_in_memory().unwrap();
        let (ingestor, _classify_rx, mut notify_rx) = ingestor(&store);
        store.settings().list_add("whitelist", -100).unwrap();

        let mut event = private_event(1, 9, "здравствуйте, я по поводу договора");
        event.chat_kind = ChatKind::Group;
        event.chat_id = -100;
        ingestor.handle_event(event.clone()).await;

        let note = notify_rx.try_recv().unwrap();
        assert!(note.text.contains("Новый контакт"));

        event.msg_id = 2;
        ingestor.handle_event(event).await;
        assert!(notify_rx.try_recv().is_err(), "known contact stays silent");
    }

    #[tokio::test]
    async fn media_without_caption_gets_placeholder() {
        let store = Store::open_in_memory().unwrap();
        let (ingestor, _classify_rx, _notify_rx) = ingestor(&store);

        let mut event = private_event(1, 9, "");
        event.media = Some(MediaKind::Voice);
        ingestor.handle_event(event).await;

        let stored = store.messages().recent_in_chat(9, 1).unwrap();
        assert_eq!(stored[0].text, "[voice]");
    }

    #[tokio::test]
    async fn empty_text_without_media_is_dropped() {
        let store = Store::open_in_memory().unwrap();
        let (ingestor, _classify_rx, _notify_rx) = ingestor(&store);
        ingestor.handle_event(private_event(1, 9, "")).await;
        assert_eq!(store.messages().stats().unwrap().messages, 0);
    }
}
