//! Confidence banding and dispatch.
//!
//! HIGH autopilots into the task engine, MEDIUM asks first (urgently or via a
//! deferred prompt that checks whether the thread resolved itself), LOW is
//! informational. A daily quota caps interruptions; overflow lands silently
//! in the confidence queue for the evening batch.

use std::sync::{Arc, Mutex};

use chrono::{NaiveDate, Utc};
use dashmap::DashMap;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use adjutant_core::config::LimitsConfig;
use adjutant_core::intent::CallbackIntent;
use adjutant_core::notify::{Button, Notification, NotifySender};
use adjutant_core::time::local_today;
use adjutant_core::Result;
use adjutant_llm::json::parse_json_object;
use adjutant_llm::{LlmRouter, ModelTier};
use adjutant_store::confidence::ConfidenceStore;
use adjutant_store::messages::MessageStore;
use adjutant_store::settings::{SettingsStore, KEY_URGENT_DAILY_LIMIT};
use adjutant_store::types::{NewTask, StoredMessage};
use adjutant_tasks::TaskEngine;

use crate::judge::{
    build_user_prompt, parse_classification, Classification, CLASSIFY_SYSTEM_PROMPT,
};

/// Delay before a non-urgent MEDIUM prompt fires.
const DEFERRED_PROMPT_SECS: u64 = 300;
/// Messages re-read when the deferred prompt wakes up.
const RESOLUTION_WINDOW: usize = 5;

const RESOLUTION_SYSTEM_PROMPT: &str = "\
Ты — фильтр уведомлений. По последним сообщениям чата определи, решился ли вопрос сам,
без участия владельца (например, автор написал «уже не надо», «сам разобрался», «отбой»).
Ответь СТРОГО JSON: {\"resolved\": true/false}";

/// One unit of work from ingest.
#[derive(Debug)]
pub struct ClassifyRequest {
    pub message: StoredMessage,
    pub owner_is_sender: bool,
}

/// Confidence region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Band {
    High,
    Medium,
    Low,
}

/// Band boundaries: HIGH is strictly above, LOW strictly below.
pub fn band_for(confidence: u8, high: u8, low: u8) -> Band {
    if confidence > high {
        Band::High
    } else if confidence >= low {
        Band::Medium
    } else {
        Band::Low
    }
}

/// Parse the self-resolution check; malformed output means "not resolved"
/// so a broken judge can only cause an extra prompt, never a lost one.
pub fn parse_resolution(raw: &str) -> bool {
    parse_json_object(raw)
        .and_then(|obj| obj.get("resolved").and_then(|v| v.as_bool()))
        .unwrap_or(false)
}

pub struct ClassifierPipeline {
    messages: MessageStore,
    confidence: ConfidenceStore,
    settings: SettingsStore,
    engine: Arc<TaskEngine>,
    llm: Arc<LlmRouter>,
    notify: NotifySender,
    limits: LimitsConfig,
    owner_id: i64,
    tz_offset_hours: i32,
    /// (local date, prompts sent) - resets when the date rolls over.
    urgent_today: Mutex<(NaiveDate, u32)>,
    /// queue id → deferred prompt task. Lost on restart by design; the
    /// queued item still surfaces in the evening batch.
    deferrals: DashMap<i64, tokio::task::AbortHandle>,
}

impl ClassifierPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        messages: MessageStore,
        confidence: ConfidenceStore,
        settings: SettingsStore,
        engine: Arc<TaskEngine>,
        llm: Arc<LlmRouter>,
        notify: NotifySender,
        limits: LimitsConfig,
        owner_id: i64,
        tz_offset_hours: i32,
    ) -> Self {
        Self {
            messages,
            confidence,
            settings,
            engine,
            llm,
            notify,
            limits,
            owner_id,
            tz_offset_hours,
            urgent_today: Mutex::new((local_today(tz_offset_hours), 0)),
            deferrals: DashMap::new(),
        }
    }

    /// Drain the ingest→classifier channel until shutdown.
    pub async fn run_worker(
        self: Arc<Self>,
        mut rx: mpsc::Receiver<ClassifyRequest>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!("classifier worker started");
        loop {
            tokio::select! {
                req = rx.recv() => match req {
                    Some(req) => {
                        let message_id = req.message.id;
                        if let Err(e) = Arc::clone(&self).process(req).await {
                            error!(message_id, error = %e, "classification failed");
                        }
                        // The handshake: processed is set whether the judge
                        // succeeded or terminally failed. Live-stream events
                        // are never retried.
                        if let Err(e) = self.messages.mark_processed(message_id) {
                            error!(message_id, error = %e, "failed to mark message processed");
                        }
                    }
                    None => break,
                },
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        self.abort_deferrals();
        info!("classifier worker stopped");
    }

    /// Classify one message and dispatch by band.
    pub async fn process(self: Arc<Self>, req: ClassifyRequest) -> Result<()> {
        let msg = &req.message;

        let mut context = self
            .messages
            .recent_in_chat(msg.chat_id, self.limits.context_window)?;
        context.reverse(); // judge reads chronologically

        let user_prompt = build_user_prompt(msg, &context, req.owner_is_sender, self.owner_id);
        let raw = self
            .llm
            .ask(CLASSIFY_SYSTEM_PROMPT, &user_prompt, ModelTier::Judge)
            .await
            .map_err(adjutant_core::AdjutantError::from)?;
        let classification = parse_classification(&raw, &msg.text);

        debug!(
            message_id = msg.id,
            kind = classification.raw_type.as_str(),
            confidence = classification.confidence,
            urgent = classification.is_urgent,
            "message classified"
        );

        self.dispatch(msg, classification).await
    }

    /// Band dispatch, separated from the judge call so it can run on an
    /// already-validated verdict.
    pub async fn dispatch(
        self: Arc<Self>,
        msg: &StoredMessage,
        classification: Classification,
    ) -> Result<()> {
        let task_like = classification.raw_type.normalized().is_some();
        let band = band_for(
            classification.confidence,
            self.limits.confidence_high,
            self.limits.confidence_low,
        );

        match band {
            Band::High if task_like => self.auto_create(msg, &classification).await,
            Band::Medium if task_like => {
                if classification.is_urgent {
                    self.urgent_prompt(msg, &classification).await
                } else {
                    self.defer_prompt(msg, &classification).await
                }
            }
            Band::Low if task_like => {
                // Urgency overrides the band; plain low-confidence task hints
                // stay informational.
                if classification.is_urgent {
                    self.urgent_prompt(msg, &classification).await
                } else {
                    self.low_notice(msg, &classification).await
                }
            }
            _ => {
                debug!(message_id = msg.id, confidence = classification.confidence, "not actionable");
                Ok(())
            }
        }
    }

    /// HIGH band: create the task and tell the owner, with feedback buttons.
    async fn auto_create(
        &self,
        msg: &StoredMessage,
        classification: &Classification,
    ) -> Result<()> {
        let deadline = classification
            .deadline
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|dt| dt.and_utc());

        // The owner's own obligations get a nudge: two hours before the
        // deadline when one exists, a day from now otherwise.
        let remind_at = if classification.raw_type.owner_acts() {
            match deadline {
                Some(dl) => Some(dl - chrono::Duration::hours(2)),
                None => Some(Utc::now() + chrono::Duration::hours(24)),
            }
        } else {
            None
        };

        let outcome = self.engine.create(NewTask {
            task_type: classification.raw_type.normalized(),
            description: classification.summary.clone(),
            who: classification
                .assignee
                .clone()
                .or_else(|| classification.who.clone()),
            deadline,
            remind_at,
            recurrence: None,
            confidence: classification.confidence as i64,
            source: format!("telegram:{}", msg.chat_title),
            source_msg_id: Some(msg.id),
            chat_id: Some(msg.chat_id),
            sender_id: Some(msg.sender_id),
            sender_name: Some(msg.sender_name.clone()),
            account: Some(msg.account.clone()),
            track_completion: classification.raw_type.tracks_completion(),
        })?;

        if !outcome.is_created() {
            info!(message_id = msg.id, "HIGH verdict deduplicated against existing task");
            return Ok(());
        }
        let task = outcome.task();

        let deadline_line = classification
            .deadline
            .map(|d| format!("\n📅 Дедлайн: {}", d.format("%d.%m.%Y")))
            .unwrap_or_default();
        self.notify
            .send(Notification::with_keyboard(
                format!(
                    "📋 Создал задачу #{} ({}%):\n{}{}",
                    task.id, classification.confidence, task.description, deadline_line,
                ),
                vec![vec![
                    Button::new("Верно", CallbackIntent::ClfCorrect(msg.id)),
                    Button::new("Ошибка", CallbackIntent::ClfWrong(msg.id)),
                ]],
            ))
            .await;
        Ok(())
    }

    /// Urgent MEDIUM/LOW: prompt immediately, within the daily quota.
    async fn urgent_prompt(
        &self,
        msg: &StoredMessage,
        classification: &Classification,
    ) -> Result<()> {
        let queue_id = self.enqueue(msg, classification, true)?;

        if !self.take_prompt_slot()? {
            info!(queue_id, "urgent quota exhausted — queued silently");
            return Ok(());
        }

        let preview: String = msg.text.chars().take(150).collect();
        self.notify
            .send(Notification::with_keyboard(
                format!(
                    "🔥 СРОЧНОЕ: {}: «{}»\nУверенность: {}%. Это {}?",
                    msg.sender_name,
                    preview,
                    classification.confidence,
                    type_label(classification),
                ),
                confidence_buttons(queue_id),
            ))
            .await;
        Ok(())
    }

    /// Non-urgent MEDIUM: queue the item and arm the five-minute deferral.
    async fn defer_prompt(
        self: Arc<Self>,
        msg: &StoredMessage,
        classification: &Classification,
    ) -> Result<()> {
        let queue_id = self.enqueue(msg, classification, false)?;

        let pipeline = Arc::clone(&self);
        let msg = msg.clone();
        let classification = classification.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_secs(DEFERRED_PROMPT_SECS)).await;
            if let Err(e) = pipeline.fire_deferred(queue_id, &msg, &classification).await {
                error!(queue_id, error = %e, "deferred prompt failed");
            }
        });
        self.deferrals.insert(queue_id, handle.abort_handle());
        debug!(queue_id, "deferred prompt armed");
        Ok(())
    }

    /// The deferral timer fired: suppress if the thread resolved itself,
    /// otherwise prompt (still within the quota).
    async fn fire_deferred(
        &self,
        queue_id: i64,
        msg: &StoredMessage,
        classification: &Classification,
    ) -> Result<()> {
        self.deferrals.remove(&queue_id);

        // The owner may have resolved it from the urgent batch already.
        match self.confidence.get(queue_id)? {
            Some(item) if !item.resolved => {}
            _ => return Ok(()),
        }

        let newer: Vec<_> = self
            .messages
            .recent_in_chat(msg.chat_id, RESOLUTION_WINDOW)?
            .into_iter()
            .filter(|m| m.id != msg.id && m.timestamp > msg.timestamp)
            .collect();

        if !newer.is_empty() {
            let mut lines: Vec<String> = newer
                .iter()
                .map(|m| format!("[{}]: {}", m.sender_name, m.text))
                .collect();
            lines.reverse();
            let check = format!(
                "ИСХОДНОЕ СООБЩЕНИЕ: «{}»\n\nНОВЫЕ СООБЩЕНИЯ В ЧАТЕ:\n{}",
                msg.text,
                lines.join("\n"),
            );
            let raw = self
                .llm
                .ask(RESOLUTION_SYSTEM_PROMPT, &check, ModelTier::Judge)
                .await
                .map_err(adjutant_core::AdjutantError::from)?;
            if parse_resolution(&raw) {
                self.confidence.mark_resolved_silent(queue_id)?;
                info!(queue_id, "deferred prompt suppressed — thread resolved itself");
                return Ok(());
            }
        }

        if !self.take_prompt_slot()? {
            info!(queue_id, "quota exhausted — deferred item left for the batch");
            return Ok(());
        }

        let preview: String = msg.text.chars().take(150).collect();
        self.notify
            .send(Notification::with_keyboard(
                format!(
                    "🤔 {}: «{}»\nПохоже на {} (уверенность {}%). Зафиксировать?",
                    msg.sender_name,
                    preview,
                    type_label(classification),
                    classification.confidence,
                ),
                confidence_buttons(queue_id),
            ))
            .await;
        Ok(())
    }

    /// LOW band informational notice with an upgrade button.
    async fn low_notice(
        &self,
        msg: &StoredMessage,
        classification: &Classification,
    ) -> Result<()> {
        let preview: String = msg.text.chars().take(150).collect();
        self.notify
            .send(Notification::with_keyboard(
                format!(
                    "ℹ️ {}: «{}»\nНе похоже на задачу ({}%).",
                    msg.sender_name, preview, classification.confidence,
                ),
                vec![vec![
                    Button::new("Верно", CallbackIntent::ClfCorrect(msg.id)),
                    Button::new("Это задача", CallbackIntent::ClfUpgrade(msg.id)),
                ]],
            ))
            .await;
        Ok(())
    }

    fn enqueue(
        &self,
        msg: &StoredMessage,
        classification: &Classification,
        is_urgent: bool,
    ) -> Result<i64> {
        let preview: String = msg.text.chars().take(150).collect();
        self.confidence
            .enqueue(
                msg.id,
                msg.chat_id,
                &msg.sender_name,
                &preview,
                classification.raw_type.as_str(),
                classification.confidence as i64,
                is_urgent,
            )
            .map_err(Into::into)
    }

    /// Claim one interruption slot from the daily quota.
    fn take_prompt_slot(&self) -> Result<bool> {
        let limit: u32 = self
            .settings
            .get(
                KEY_URGENT_DAILY_LIMIT,
                &self.limits.urgent_daily_limit.to_string(),
            )?
            .parse()
            .unwrap_or(self.limits.urgent_daily_limit);

        let today = local_today(self.tz_offset_hours);
        let mut guard = self.urgent_today.lock().unwrap();
        if guard.0 != today {
            *guard = (today, 0);
        }
        if guard.1 >= limit {
            return Ok(false);
        }
        guard.1 += 1;
        Ok(true)
    }

    /// 17:00 batch of unresolved MEDIUM items.
    pub async fn send_batch_review(&self) -> Result<()> {
        let pending = self
            .confidence
            .pending(self.limits.urgent_daily_limit as usize)?;
        if pending.is_empty() {
            info!("confidence batch: nothing pending");
            return Ok(());
        }

        let mut lines = vec![format!(
            "За сегодня я засомневался в {} сообщениях:\n",
            pending.len()
        )];
        for (i, item) in pending.iter().enumerate() {
            let preview: String = item.text_preview.chars().take(80).collect();
            lines.push(format!(
                "{}. [ ] {} ({}): «{}» — {}?",
                i + 1,
                item.sender_name,
                item.created_at
                    .with_timezone(&adjutant_core::time::owner_offset(self.tz_offset_hours))
                    .format("%H:%M"),
                preview,
                item.predicted_type,
            ));
        }

        let ids: Vec<i64> = pending.iter().map(|p| p.id).collect();
        self.notify
            .send(Notification::with_keyboard(
                lines.join("\n"),
                vec![vec![
                    Button::new("Все задачи", CallbackIntent::BatchAll(ids.clone())),
                    Button::new("Ничего", CallbackIntent::BatchNone(ids)),
                ]],
            ))
            .await;
        info!("confidence batch sent");
        Ok(())
    }

    /// Owner confirmed an item. Creates the task when confirmed as one.
    pub fn resolve_item(&self, queue_id: i64, confirmed_as_task: bool) -> Result<()> {
        let actual = if confirmed_as_task { "task" } else { "info" };
        let Some(item) = self.confidence.resolve(queue_id, actual)? else {
            return Ok(()); // already resolved — no-op
        };
        if confirmed_as_task {
            let outcome = self.engine.create(NewTask {
                description: item.text_preview.clone(),
                confidence: item.confidence,
                source: "confidence_queue".to_string(),
                source_msg_id: Some(item.message_id),
                chat_id: Some(item.chat_id),
                sender_name: Some(item.sender_name.clone()),
                ..Default::default()
            })?;
            info!(
                queue_id,
                task_id = outcome.task().id,
                created = outcome.is_created(),
                "confidence item confirmed as task"
            );
        }
        Ok(())
    }

    /// Cancel every armed deferral (shutdown path).
    pub fn abort_deferrals(&self) {
        let count = self.deferrals.len();
        for entry in self.deferrals.iter() {
            entry.value().abort();
        }
        self.deferrals.clear();
        if count > 0 {
            warn!(count, "deferred prompts aborted on shutdown");
        }
    }
}

fn type_label(classification: &Classification) -> &'static str {
    use crate::judge::RawType;
    match classification.raw_type {
        RawType::TaskForMe | RawType::TaskFromMe => "задача",
        RawType::PromiseMine => "моё обещание",
        RawType::PromiseIncoming => "чужое обещание",
        RawType::Question => "вопрос",
        _ => "информация",
    }
}

fn confidence_buttons(queue_id: i64) -> Vec<Vec<Button>> {
    vec![vec![
        Button::new("Да, задача", CallbackIntent::ConfYes(queue_id)),
        Button::new("Нет", CallbackIntent::ConfNo(queue_id)),
        Button::new("Позже", CallbackIntent::ConfLater(queue_id)),
    ]]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::judge::RawType;
    use adjutant_core::config::LlmConfig;
    use adjutant_store::Store;

    fn pipeline() -> (
        Arc<ClassifierPipeline>,
        tokio::sync::mpsc::Receiver<Notification>,
        Store,
    ) {
        let store = Store::open_in_memory().unwrap();
        let (notify, rx) = NotifySender::channel(32);
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
        let pipeline = Arc::new(ClassifierPipeline::new(
            store.messages(),
            store.confidence(),
            store.settings(),
            engine,
            llm,
            notify,
            LimitsConfig::default(),
            42,
            7,
        ));
        (pipeline, rx, store)
    }

    fn message(store: &Store, text: &str) -> StoredMessage {
        let id = store
            .messages()
            .save(&adjutant_store::messages::NewMessage {
                upstream_msg_id: rand_id(),
                chat_id: 10,
                chat_title: "ЛС".into(),
                sender_id: 9,
                sender_name: "Козлов".into(),
                text: text.into(),
                media_kind: None,
                timestamp: Utc::now(),
                account: "primary".into(),
            })
            .unwrap()
            .unwrap();
        store.messages().recent_in_chat(10, 50).unwrap()
            .into_iter()
            .find(|m| m.id == id)
            .unwrap()
    }

    fn rand_id() -> i64 {
        use std::sync::atomic::{AtomicI64, Ordering};
        static NEXT: AtomicI64 = AtomicI64::new(1);
        NEXT.fetch_add(1, Ordering::Relaxed)
    }

    /// A verdict with a deadline ten days out, so reminder math is exercised
    /// without tripping the stale-reminder clamp.
    fn verdict(raw_type: RawType, confidence: u8, is_urgent: bool) -> Classification {
        Classification {
            raw_type,
            summary: "Оплатить счёт 12345".into(),
            deadline: Some((Utc::now() + chrono::Duration::days(10)).date_naive()),
            who: None,
            assignee: None,
            confidence,
            is_urgent,
        }
    }

    #[test]
    fn banding_boundaries_are_exact() {
        // Defaults: HIGH > 80, LOW = 50.
        assert_eq!(band_for(81, 80, 50), Band::High);
        assert_eq!(band_for(80, 80, 50), Band::Medium);
        assert_eq!(band_for(50, 80, 50), Band::Medium);
        assert_eq!(band_for(49, 80, 50), Band::Low);
        assert_eq!(band_for(0, 80, 50), Band::Low);
        assert_eq!(band_for(100, 80, 50), Band::High);
    }

    #[test]
    fn resolution_parse_defaults_to_not_resolved() {
        assert!(parse_resolution(r#"{"resolved": true}"#));
        assert!(!parse_resolution(r#"{"resolved": false}"#));
        assert!(!parse_resolution("мусор"));
        assert!(!parse_resolution(r#"{"other": 1}"#));
    }

    #[tokio::test]
    async fn high_band_creates_task_with_reminder_and_buttons() {
        let (pipeline, mut rx, store) = pipeline();
        let msg = message(&store, "Оплати счёт 12345 до 2026-02-18");

        pipeline
            .clone()
            .dispatch(&msg, verdict(RawType::TaskForMe, 92, false))
            .await
            .unwrap();

        let tasks = store.tasks().active().unwrap();
        assert_eq!(tasks.len(), 1);
        let task = &tasks[0];
        assert!(!task.track_completion);
        // remind_at = deadline midnight UTC minus two hours.
        let deadline = task.deadline.unwrap();
        let remind = task.remind_at.unwrap();
        assert_eq!(deadline - remind, chrono::Duration::hours(2));

        let note = rx.try_recv().unwrap();
        assert!(note.text.contains("Создал задачу"));
        assert!(matches!(
            note.keyboard[0][0].intent,
            CallbackIntent::ClfCorrect(_)
        ));
        assert!(matches!(
            note.keyboard[0][1].intent,
            CallbackIntent::ClfWrong(_)
        ));
    }

    #[tokio::test]
    async fn high_band_outgoing_task_tracks_completion() {
        let (pipeline, _rx, store) = pipeline();
        let msg = message(&store, "передай Сергею, пусть отправит договор");

        pipeline
            .clone()
            .dispatch(&msg, verdict(RawType::TaskFromMe, 95, false))
            .await
            .unwrap();

        let task = &store.tasks().active().unwrap()[0];
        assert!(task.track_completion);
        assert!(task.remind_at.is_none(), "no self-reminder for delegated work");
    }

    #[tokio::test]
    async fn medium_urgent_prompts_and_queues() {
        let (pipeline, mut rx, store) = pipeline();
        let msg = message(&store, "срочно глянь договор!!");

        pipeline
            .clone()
            .dispatch(&msg, verdict(RawType::TaskForMe, 70, true))
            .await
            .unwrap();

        assert!(store.tasks().active().unwrap().is_empty(), "no autopilot in MEDIUM");
        let note = rx.try_recv().unwrap();
        assert!(note.text.contains("СРОЧНОЕ"));
        assert!(matches!(note.keyboard[0][0].intent, CallbackIntent::ConfYes(_)));
    }

    #[tokio::test]
    async fn medium_quiet_defers_instead_of_prompting() {
        let (pipeline, mut rx, store) = pipeline();
        let msg = message(&store, "глянь договор когда будет минута");

        pipeline
            .clone()
            .dispatch(&msg, verdict(RawType::TaskForMe, 70, false))
            .await
            .unwrap();

        assert!(rx.try_recv().is_err(), "nothing sent before the deferral fires");
        assert_eq!(pipeline.deferrals.len(), 1);
        pipeline.abort_deferrals();
        assert_eq!(pipeline.deferrals.len(), 0);
    }

    #[tokio::test]
    async fn urgent_quota_overflow_is_silent() {
        let (pipeline, mut rx, store) = pipeline();
        store.settings().set(KEY_URGENT_DAILY_LIMIT, "1").unwrap();

        let first = message(&store, "срочное раз");
        let second = message(&store, "срочное два");
        pipeline
            .clone()
            .dispatch(&first, verdict(RawType::TaskForMe, 70, true))
            .await
            .unwrap();
        pipeline
            .clone()
            .dispatch(&second, verdict(RawType::TaskForMe, 70, true))
            .await
            .unwrap();

        assert!(rx.try_recv().is_ok(), "first prompt goes through");
        assert!(rx.try_recv().is_err(), "second is silently queued");
        // Both items still reach the queue for the batch.
        assert_eq!(store.confidence().pending(10).unwrap().len(), 0); // urgent items are not in the quiet batch
    }

    #[tokio::test]
    async fn resolve_item_creates_task_once() {
        let (pipeline, _rx, store) = pipeline();
        let queue_id = store
            .confidence()
            .enqueue(1, 10, "Козлов", "глянь договор", "task_for_me", 70, false)
            .unwrap();

        pipeline.resolve_item(queue_id, true).unwrap();
        assert_eq!(store.tasks().active().unwrap().len(), 1);

        // Second resolve is a no-op (no duplicate task, no extra feedback).
        pipeline.resolve_item(queue_id, true).unwrap();
        assert_eq!(store.tasks().active().unwrap().len(), 1);
        assert_eq!(store.confidence().feedback_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn info_verdicts_stay_silent() {
        let (pipeline, mut rx, store) = pipeline();
        let msg = message(&store, "как дела?");
        pipeline
            .clone()
            .dispatch(&msg, verdict(RawType::Info, 95, false))
            .await
            .unwrap();
        pipeline
            .clone()
            .dispatch(&msg, verdict(RawType::Spam, 20, false))
            .await
            .unwrap();
        assert!(rx.try_recv().is_err());
        assert!(store.tasks().active().unwrap().is_empty());
    }
}
