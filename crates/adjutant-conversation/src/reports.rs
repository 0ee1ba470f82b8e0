//! Scheduled owner reports: morning briefing, evening digest, weekly stats.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tracing::{info, warn};

use adjutant_core::config::OwnerConfig;
use adjutant_core::notify::{Notification, NotifySender};
use adjutant_core::time::{format_local_short, local_now, local_today};
use adjutant_core::Result;
use adjutant_llm::{LlmRouter, ModelTier};
use adjutant_store::messages::MessageStore;
use adjutant_store::settings::SettingsStore;
use adjutant_store::summaries::SummaryStore;
use adjutant_tasks::TaskEngine;

/// Messages pulled per whitelist group for the group summary.
const GROUP_SUMMARY_MESSAGES: usize = 50;

pub struct Reporter {
    messages: MessageStore,
    settings: SettingsStore,
    summaries: SummaryStore,
    engine: Arc<TaskEngine>,
    llm: Arc<LlmRouter>,
    notify: NotifySender,
    owner: OwnerConfig,
    owner_id: i64,
}

impl Reporter {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        messages: MessageStore,
        settings: SettingsStore,
        summaries: SummaryStore,
        engine: Arc<TaskEngine>,
        llm: Arc<LlmRouter>,
        notify: NotifySender,
        owner: OwnerConfig,
        owner_id: i64,
    ) -> Self {
        Self {
            messages,
            settings,
            summaries,
            engine,
            llm,
            notify,
            owner,
            owner_id,
        }
    }

    /// 09:00 - active tasks, today's deadlines, group and DM summaries.
    pub async fn morning_briefing(&self) -> Result<()> {
        let tasks = self.engine.active()?;
        let deadlines = self.engine.deadlines_today()?;
        let now = local_now(self.owner.tz_offset_hours);

        let tasks_json: Vec<_> = tasks
            .iter()
            .take(10)
            .map(|t| {
                json!({
                    "id": t.id,
                    "description": t.description,
                    "deadline": t.deadline.map(|d| format_local_short(d, self.owner.tz_offset_hours)),
                })
            })
            .collect();
        let deadlines_json: Vec<_> = deadlines
            .iter()
            .map(|t| json!({"id": t.id, "description": t.description}))
            .collect();

        let prompt = format!(
            "Сгенерируй утренний брифинг. Стиль — дружелюбный напарник, на ты. \
             Можешь добавить лёгкую шутку или мотивацию.\n\n\
             Сегодня: {}\n\n\
             Данные:\n- Задачи: {}\n- Дедлайны сегодня: {}\n\n\
             Формат:\nПривет! Вот что на сегодня ({}):\n\nЗАДАЧИ: X активных (Y срочных)\n...\n\n\
             Форматирование: HTML для Telegram (<b>жирный</b>, <i>курсив</i>). \
             НЕ используй Markdown (**, __). Emoji — умеренно.\n\n\
             Кратко, по делу, но с настроением.",
            now.format("%d.%m.%Y"),
            serde_json::to_string(&tasks_json)?,
            serde_json::to_string(&deadlines_json)?,
            now.format("%d.%m.%Y"),
        );

        let mut briefing = self
            .llm
            .ask("", &prompt, ModelTier::Assistant)
            .await
            .map_err(adjutant_core::AdjutantError::from)?;

        if let Some(groups) = self.group_summary(12).await? {
            briefing.push_str("\n\n");
            briefing.push_str(&groups);
        }
        if let Some(dms) = self.dm_summary(12).await? {
            briefing.push_str("\n\n");
            briefing.push_str(&dms);
        }

        self.notify.send_text(briefing).await;
        info!("morning briefing sent");
        Ok(())
    }

    /// 21:00 - counts over the last 12 h, review grid, summaries. The digest
    /// text is also persisted per local date.
    pub async fn evening_digest(&self) -> Result<()> {
        let since = Utc::now() - chrono::Duration::hours(12);
        let completed = self.engine_completed_since(since)?;
        let created = self.engine_created_since(since)?;
        let active = self.engine.active()?.len();
        let message_count = self.messages.count_since(since)?;
        let now = local_now(self.owner.tz_offset_hours);

        let prompt = format!(
            "Сгенерируй вечерний дайджест дня. Стиль — дружелюбный напарник, на ты. \
             Подведи итог с лёгким позитивом.\n\n\
             Сегодня: {}\n\n\
             Данные:\n- Выполнено задач: {completed}\n- В работе: {active}\n\
             - Новых задач: {created}\n- Сообщений за 12ч: {message_count}\n\n\
             Формат:\nИТОГ ДНЯ — {}\n\nВЫПОЛНЕНО: X | В РАБОТЕ: Y | НОВЫХ: Z\n...\n\n\
             Форматирование: HTML для Telegram (<b>жирный</b>, <i>курсив</i>). \
             НЕ используй Markdown. Emoji — умеренно.\n\nХорошего вечера!",
            now.format("%d.%m.%Y"),
            now.format("%d.%m.%Y"),
        );

        let mut digest = self
            .llm
            .ask("", &prompt, ModelTier::Assistant)
            .await
            .map_err(adjutant_core::AdjutantError::from)?;

        if let Some(groups) = self.group_summary(12).await? {
            digest.push_str("\n\n");
            digest.push_str(&groups);
        }
        if let Some(dms) = self.dm_summary(12).await? {
            digest.push_str("\n\n");
            digest.push_str(&dms);
        }

        self.summaries.save(
            local_today(self.owner.tz_offset_hours),
            &digest,
            Some(&json!({
                "completed": completed,
                "active": active,
                "new_tasks": created,
                "messages": message_count,
            })),
        )?;

        let (grid_text, grid) = self.engine.review_grid(8)?;
        if grid_text.is_empty() {
            self.notify.send_text(digest).await;
        } else {
            digest.push_str("\n\n📋 Активные задачи:\n");
            digest.push_str(&grid_text);
            self.notify.send(Notification::with_keyboard(digest, grid)).await;
        }
        info!("evening digest sent");
        Ok(())
    }

    /// Sunday 10:00 - plain stats block, no LLM involved.
    pub async fn weekly_analysis(&self) -> Result<()> {
        let stats = self.messages.stats()?;
        let week_ago = Utc::now() - chrono::Duration::days(7);
        let completed = self.engine_completed_since(week_ago)?;
        let text = format!(
            "📊 ЕЖЕНЕДЕЛЬНЫЙ АНАЛИЗ\n\n\
             Активных задач: {}\n\
             Выполнено за неделю: {}\n\
             Сообщений в памяти: {}",
            stats.active_tasks, completed, stats.messages,
        );
        self.notify.send_text(text).await;
        info!("weekly analysis sent");
        Ok(())
    }

    /// Assistant-voiced roll-up of whitelist-group traffic, `None` when the
    /// period is quiet.
    async fn group_summary(&self, hours: i64) -> Result<Option<String>> {
        let whitelist = self.settings.whitelist()?;
        if whitelist.is_empty() {
            return Ok(None);
        }
        let since = Utc::now() - chrono::Duration::hours(hours);
        let messages = self
            .messages
            .since(since, Some(&whitelist), GROUP_SUMMARY_MESSAGES * whitelist.len())?;
        if messages.is_empty() {
            return Ok(None);
        }

        let mut blocks = String::new();
        let mut current_chat = 0i64;
        for m in &messages {
            if m.chat_id != current_chat {
                current_chat = m.chat_id;
                blocks.push_str(&format!("\n\n--- Группа: {} ---\n", m.chat_title));
            }
            blocks.push_str(&format!(
                "{}: {}\n",
                m.sender_name,
                m.text.chars().take(200).collect::<String>()
            ));
        }

        let now = local_now(self.owner.tz_offset_hours);
        let prompt = format!(
            "Проанализируй сообщения из рабочих групп за период. Дата: {}. \
             Стиль — дружелюбный напарник, на ты.\n\n\
             Для каждой группы:\n\
             1. Выдели 2-3 ВАЖНЫХ сообщения/новости (если есть)\n\
             2. Кратко опиши что обсуждалось (1-2 предложения)\n\
             3. Если есть задачи/дедлайны — выдели отдельно\n\
             Если ничего важного нет — так и скажи, не раздувай.\n\n\
             СООБЩЕНИЯ:{blocks}\n\n\
             Форматирование: HTML для Telegram. НЕ используй Markdown. Emoji — умеренно.",
            now.format("%d.%m.%Y"),
        );

        match self.llm.ask("", &prompt, ModelTier::Assistant).await {
            Ok(summary) => Ok(Some(summary)),
            Err(e) => {
                warn!(error = %e, "group summary failed — skipping section");
                Ok(None)
            }
        }
    }

    /// Judge-tier roll-up of who wrote in DMs.
    async fn dm_summary(&self, hours: i64) -> Result<Option<String>> {
        let since = Utc::now() - chrono::Duration::hours(hours);
        let rows = self
            .messages
            .dm_summary(since, self.owner_id, &self.settings.blacklist()?, 20)?;
        if rows.is_empty() {
            return Ok(None);
        }

        let data: Vec<String> = rows
            .iter()
            .map(|d| {
                format!(
                    "- {} ({} сообщ.): {}",
                    d.sender_name,
                    d.msg_count,
                    d.previews.chars().take(200).collect::<String>()
                )
            })
            .collect();

        let now = local_now(self.owner.tz_offset_hours);
        let prompt = format!(
            "Кратко перескажи кто писал в личные сообщения. Дата: {}. \
             Стиль — дружелюбный напарник, на ты.\n\
             Выдели: кто писал, сколько сообщений, о чём (1 предложение на человека).\n\
             Если кто-то просил что-то или ставил задачу — подчеркни.\n\n\
             ДАННЫЕ:\n{}\n\n\
             Форматирование: HTML для Telegram. НЕ используй Markdown.\n\
             Формат — компактный список, без воды.",
            now.format("%d.%m.%Y"),
            data.join("\n"),
        );

        match self.llm.ask("", &prompt, ModelTier::Judge).await {
            Ok(summary) => Ok(Some(summary)),
            Err(e) => {
                warn!(error = %e, "DM summary failed — skipping section");
                Ok(None)
            }
        }
    }

    fn engine_completed_since(&self, since: chrono::DateTime<Utc>) -> Result<i64> {
        // Counting goes through the engine's store, not a second write path.
        self.engine.completed_count_since(since)
    }

    fn engine_created_since(&self, since: chrono::DateTime<Utc>) -> Result<i64> {
        self.engine.created_count_since(since)
    }
}
