//! Outgoing-task completion monitoring.
//!
//! Tasks with `track_completion` are re-checked on a fixed daily cadence and
//! whenever a new inbound message lands in the task's chat (debounced per
//! chat). The judge reads the recent chat window and returns a ternary
//! verdict with one sentence of evidence.

use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, error, info};

use adjutant_core::config::TRACK_CHECK_DEBOUNCE_SECS;
use adjutant_core::intent::CallbackIntent;
use adjutant_core::notify::{Button, Notification};
use adjutant_core::time::format_local_short;
use adjutant_core::Result;
use adjutant_llm::json::parse_json_object;
use adjutant_llm::ModelTier;
use adjutant_store::types::Task;

use crate::engine::TaskEngine;

/// Chat messages loaded per check.
const CHECK_WINDOW_MESSAGES: usize = 30;

const COMPLETION_SYSTEM_PROMPT: &str = "\
Ты — аналитик задач. Проверяешь, выполнена ли задача по переписке в чате.
Ответь СТРОГО JSON:
{\"status\": \"completed\" | \"not_completed\" | \"unclear\", \"evidence\": \"краткое обоснование (1 предложение)\"}

- completed: есть явное подтверждение выполнения (скинул документ, отчитался, написал \"сделал/готово/оплатил\")
- not_completed: нет упоминания задачи или прямой отказ
- unclear: тема обсуждается, но нет чёткого подтверждения

Только JSON, без объяснений.";

/// Judge's answer to "is this done?".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionStatus {
    Completed,
    NotCompleted,
    Unclear,
}

#[derive(Debug, Clone)]
pub struct CompletionVerdict {
    pub status: CompletionStatus,
    pub evidence: String,
}

/// Parse the judge output; anything malformed is `unclear`.
pub fn parse_completion_verdict(raw: &str) -> CompletionVerdict {
    let Some(obj) = parse_json_object(raw) else {
        return CompletionVerdict {
            status: CompletionStatus::Unclear,
            evidence: String::new(),
        };
    };
    let status = match obj.get("status").and_then(|v| v.as_str()) {
        Some("completed") => CompletionStatus::Completed,
        Some("not_completed") => CompletionStatus::NotCompleted,
        _ => CompletionStatus::Unclear,
    };
    let evidence = obj
        .get("evidence")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();
    CompletionVerdict { status, evidence }
}

impl TaskEngine {
    /// Scheduled sweep over every tracked task.
    pub async fn check_all_tracked(&self) -> Result<()> {
        for task in self.tasks.tracked_all()? {
            if let Err(e) = self.check_tracked_task(&task).await {
                error!(task_id = task.id, error = %e, "tracked check failed");
            }
        }
        Ok(())
    }

    /// Event-driven check: a new inbound message arrived in `chat_id`.
    /// Debounced per chat so bursts trigger at most one judge call a minute.
    pub async fn on_inbound_for_tracked(&self, chat_id: i64) -> Result<()> {
        let now = Instant::now();
        if let Some(last) = self.track_debounce.get(&chat_id) {
            if now.duration_since(*last) < Duration::from_secs(TRACK_CHECK_DEBOUNCE_SECS) {
                return Ok(());
            }
        }
        self.track_debounce.insert(chat_id, now);

        for task in self.tasks.tracked_for_chat(chat_id)? {
            if let Err(e) = self.check_tracked_task(&task).await {
                error!(task_id = task.id, error = %e, "event-driven tracked check failed");
            }
        }
        Ok(())
    }

    /// Run one completion check. `last_checked_at` is stamped whatever the
    /// verdict; only a `completed` verdict interrupts the owner.
    pub async fn check_tracked_task(&self, task: &Task) -> Result<()> {
        let chat_id = match task.chat_id {
            Some(id) => id,
            None => return Ok(()),
        };

        let window = self.messages.recent_in_chat_window(
            chat_id,
            task.check_interval_days,
            CHECK_WINDOW_MESSAGES,
        )?;

        let mut lines: Vec<String> = window
            .iter()
            .map(|m| {
                format!(
                    "{} [{}]: {}",
                    format_local_short(m.timestamp, self.tz_offset_hours),
                    m.sender_name,
                    crate::engine::truncate(&m.text, 200),
                )
            })
            .collect();
        lines.reverse(); // window is newest-first; the judge reads chronologically

        let messages_block = if lines.is_empty() {
            "(сообщений нет)".to_string()
        } else {
            lines.join("\n")
        };

        let user_prompt = format!(
            "ЗАДАЧА: {}\nНАЗНАЧЕНА: {} ({})\n\nПОСЛЕДНИЕ СООБЩЕНИЯ ИЗ ЭТОГО ЧАТА:\n{}\n\nЕсть ли подтверждение выполнения задачи?",
            task.description,
            task.sender_name
                .as_deref()
                .or(task.who.as_deref())
                .unwrap_or("?"),
            format_local_short(task.created_at, self.tz_offset_hours),
            messages_block,
        );

        let raw = self
            .llm
            .ask(COMPLETION_SYSTEM_PROMPT, &user_prompt, ModelTier::Judge)
            .await
            .map_err(adjutant_core::AdjutantError::from)?;
        let verdict = parse_completion_verdict(&raw);

        self.tasks.stamp_checked(task.id, Utc::now())?;

        match verdict.status {
            CompletionStatus::Completed => {
                info!(task_id = task.id, "tracked task looks completed");
                let text = format!(
                    "Похоже, задача #{} выполнена:\n«{}»\n\n{}",
                    task.id, task.description, verdict.evidence,
                );
                self.notify
                    .send(Notification::with_keyboard(
                        text,
                        vec![vec![
                            Button::new("✅ Закрыть", CallbackIntent::TrackClose(task.id)),
                            Button::new("⏰ Ещё жду", CallbackIntent::TrackWait(task.id)),
                        ]],
                    ))
                    .await;
            }
            other => {
                debug!(task_id = task.id, ?other, "tracked task not completed yet");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verdict_parses_all_statuses() {
        let v = parse_completion_verdict(r#"{"status": "completed", "evidence": "написал «отправил»"}"#);
        assert_eq!(v.status, CompletionStatus::Completed);
        assert!(v.evidence.contains("отправил"));

        let v = parse_completion_verdict(r#"{"status": "not_completed", "evidence": ""}"#);
        assert_eq!(v.status, CompletionStatus::NotCompleted);

        let v = parse_completion_verdict(r#"{"status": "unclear", "evidence": "обсуждают"}"#);
        assert_eq!(v.status, CompletionStatus::Unclear);
    }

    #[test]
    fn malformed_output_degrades_to_unclear() {
        assert_eq!(
            parse_completion_verdict("модель сломалась").status,
            CompletionStatus::Unclear
        );
        assert_eq!(
            parse_completion_verdict(r#"{"status": "maybe"}"#).status,
            CompletionStatus::Unclear
        );
    }

    #[test]
    fn verdict_survives_markdown_wrapping() {
        let raw = "```json\n{\"status\": \"completed\", \"evidence\": \"файл в чате\"}\n```";
        assert_eq!(
            parse_completion_verdict(raw).status,
            CompletionStatus::Completed
        );
    }

    #[tokio::test]
    async fn debounce_suppresses_rapid_rechecks() {
        let (engine, _rx) = crate::engine::testutil::engine();
        // No tracked tasks exist, so the checks are no-ops; the point is the
        // debounce map state.
        engine.on_inbound_for_tracked(77).await.unwrap();
        assert!(engine.track_debounce.contains_key(&77));
        // Second call within the window returns early without touching the map.
        let before = *engine.track_debounce.get(&77).unwrap();
        engine.on_inbound_for_tracked(77).await.unwrap();
        assert_eq!(*engine.track_debounce.get(&77).unwrap(), before);
    }
}
