//! Inline-button presses, parsed into typed intents before dispatch.

use std::sync::Arc;

use teloxide::prelude::*;
use tracing::{info, warn};

use adjutant_core::intent::CallbackIntent;
use adjutant_core::time::format_local_short;
use adjutant_store::types::NewTask;

use crate::adapter::BotContext;
use crate::send::send_chunked;

pub async fn handle_callback(
    bot: Bot,
    query: CallbackQuery,
    ctx: Arc<BotContext>,
) -> ResponseResult<()> {
    if query.from.id.0 as i64 != ctx.owner_id {
        return Ok(());
    }

    let Some(data) = query.data.as_deref() else {
        return Ok(());
    };
    let Some(intent) = CallbackIntent::parse(data) else {
        warn!(%data, "unparseable callback payload");
        bot.answer_callback_query(query.id.clone()).await?;
        return Ok(());
    };

    let answer = dispatch(&bot, &ctx, intent).await;
    bot.answer_callback_query(query.id.clone()).text(answer).await?;
    Ok(())
}

/// Execute one intent and return the toast text.
async fn dispatch(bot: &Bot, ctx: &Arc<BotContext>, intent: CallbackIntent) -> String {
    let owner = ChatId(ctx.owner_id);
    match intent {
        CallbackIntent::TaskDone(id) | CallbackIntent::TrackClose(id) => {
            match ctx.engine.complete(id) {
                Ok(_) => format!("Задача #{id} выполнена"),
                Err(e) => format!("Не получилось: {e}"),
            }
        }
        CallbackIntent::TaskCancel(id) => match ctx.engine.cancel(id) {
            Ok(_) => format!("Задача #{id} отменена"),
            Err(e) => format!("Не получилось: {e}"),
        },
        CallbackIntent::TaskPostpone(id) => match ctx.engine.postpone(id, 1) {
            Ok(task) => {
                let new_deadline = task
                    .deadline
                    .map(|d| format_local_short(d, ctx.tz_offset_hours))
                    .unwrap_or_else(|| "—".into());
                format!("Перенёс #{id} на {new_deadline}")
            }
            Err(e) => format!("Не получилось: {e}"),
        },
        CallbackIntent::TrackWait(id) => {
            info!(task_id = id, "owner keeps waiting on tracked task");
            format!("Ок, продолжаю следить за #{id}")
        }
        CallbackIntent::ClfCorrect(msg_id) => {
            // Prediction details come from the task the verdict created, or
            // default to info for LOW-band notices.
            let (predicted, confidence) = ctx
                .engine
                .find_by_source_msg(msg_id)
                .ok()
                .flatten()
                .map(|t| (t.task_type.to_string(), t.confidence))
                .unwrap_or_else(|| ("info".to_string(), 0));
            let _ = ctx
                .confidence
                .record_feedback(msg_id, &predicted, &predicted, confidence);
            "Спасибо, записал".to_string()
        }
        CallbackIntent::ClfWrong(msg_id) => {
            match ctx.engine.find_by_source_msg(msg_id).ok().flatten() {
                Some(task) => {
                    let feedback_id = ctx
                        .confidence
                        .record_feedback(msg_id, &task.task_type.to_string(), "info", task.confidence)
                        .unwrap_or(0);
                    let _ = ctx.engine.cancel(task.id);
                    ctx.arm_feedback_reply(feedback_id);
                    send_chunked(
                        bot,
                        owner,
                        "Отменил. Почему это не задача? Ответь одним сообщением (5 минут, /skip — пропустить).",
                        None,
                    )
                    .await;
                    "Задача отменена".to_string()
                }
                None => "Задача уже закрыта".to_string(),
            }
        }
        CallbackIntent::ClfUpgrade(msg_id) => match ctx.messages.get(msg_id) {
            Ok(Some(message)) => {
                let feedback_id = ctx
                    .confidence
                    .record_feedback(msg_id, "info", "task", 0)
                    .unwrap_or(0);
                let created = ctx.engine.create(NewTask {
                    description: message.text.chars().take(150).collect(),
                    confidence: 100,
                    source: format!("telegram:{}", message.chat_title),
                    source_msg_id: Some(message.id),
                    chat_id: Some(message.chat_id),
                    sender_id: Some(message.sender_id),
                    sender_name: Some(message.sender_name.clone()),
                    ..Default::default()
                });
                ctx.arm_feedback_reply(feedback_id);
                match created {
                    Ok(outcome) => format!("Создал задачу #{}", outcome.task().id),
                    Err(e) => format!("Не получилось: {e}"),
                }
            }
            _ => "Сообщение не найдено".to_string(),
        },
        CallbackIntent::ConfYes(queue_id) => match ctx.classifier.resolve_item(queue_id, true) {
            Ok(()) => "Добавлено как задача".to_string(),
            Err(e) => format!("Не получилось: {e}"),
        },
        CallbackIntent::ConfNo(queue_id) => match ctx.classifier.resolve_item(queue_id, false) {
            Ok(()) => "Пропущено".to_string(),
            Err(e) => format!("Не получилось: {e}"),
        },
        CallbackIntent::ConfLater(queue_id) => {
            let _ = ctx.confidence.mark_not_urgent(queue_id);
            "Напомню в вечернем батче".to_string()
        }
        CallbackIntent::BatchAll(ids) => {
            let mut created = 0;
            for id in &ids {
                if ctx.classifier.resolve_item(*id, true).is_ok() {
                    created += 1;
                }
            }
            format!("Все {created} добавлены как задачи")
        }
        CallbackIntent::BatchNone(ids) => {
            for id in &ids {
                let _ = ctx.classifier.resolve_item(*id, false);
            }
            "Все отклонены".to_string()
        }
        CallbackIntent::SwitchMode(mode) => match ctx.llm.set_mode(&mode) {
            Ok(()) => {
                let label = if mode == "cli" {
                    "CLI (подписка)"
                } else {
                    "API (токены)"
                };
                format!("Переключено на {label}")
            }
            Err(e) => format!("Не получилось: {e}"),
        },
    }
}
