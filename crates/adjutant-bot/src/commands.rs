//! Inbound message handling: commands, whitelist grammar, forwarded
//! messages, photos, and free text into the conversation loop.

use std::sync::Arc;

use teloxide::net::Download;
use teloxide::prelude::*;
use teloxide::types::{ChatAction, KeyboardButton, KeyboardMarkup};
use tracing::{error, warn};

use adjutant_core::intent::CallbackIntent;
use adjutant_core::notify::Button as CoreButton;
use adjutant_core::time::format_local_short;
use adjutant_llm::SystemPrompt;
use adjutant_store::settings::{KEY_BLACKLIST, KEY_URGENT_DAILY_LIMIT, KEY_WHITELIST};

use crate::adapter::{render_keyboard, BotContext};
use crate::send::send_chunked;

const HELP_TEXT: &str = "\
КОМАНДЫ:

Запрос     — свободный вопрос (кнопка внизу)
/tasks     — активные задачи с дедлайнами
/summary   — краткое содержание дня
/health    — статус системы и модулей
/mode      — AI-режим (CLI/API), переключение
/settings  — настройки (лимиты, whitelist)
/whitelist — чаты под мониторингом
/blacklist — исключённые чаты и отправители
/admin     — администрирование
/help      — эта справка

ТЕКСТОМ (без команд):
«Переключи на API» — смена AI-режима
Любой вопрос — пойму из контекста.";

pub async fn handle_message(bot: Bot, msg: Message, ctx: Arc<BotContext>) -> ResponseResult<()> {
    // Owner-only: anything else is dropped without side-effects.
    let from_id = msg.from.as_ref().map(|u| u.id.0 as i64).unwrap_or(0);
    if from_id != ctx.owner_id {
        return Ok(());
    }
    let chat_id = msg.chat.id;

    // A forwarded message adds its origin chat to the whitelist.
    if let Some(origin) = msg.forward_from_chat() {
        let id = origin.id.0;
        let added = ctx.settings.list_add(KEY_WHITELIST, id).unwrap_or(false);
        let title = origin.title().unwrap_or("без названия");
        let reply = if added {
            format!("Чат «{title}» ({id}) добавлен в whitelist. Мониторю.")
        } else {
            format!("Чат «{title}» ({id}) уже в whitelist.")
        };
        send_chunked(&bot, chat_id, &reply, None).await;
        return Ok(());
    }

    if msg.photo().is_some() {
        handle_photo(&bot, &msg, &ctx).await;
        return Ok(());
    }

    let Some(text) = msg.text() else {
        return Ok(());
    };
    let text = text.trim();

    // An armed "why?" follow-up captures the next plain reply.
    if !text.starts_with('/') || text.eq_ignore_ascii_case("/skip") {
        if let Some(feedback_id) = ctx.take_pending_feedback() {
            if !text.eq_ignore_ascii_case("/skip") {
                let _ = ctx.confidence.set_feedback_reason(feedback_id, text);
            }
            send_chunked(&bot, chat_id, "Принял, учту.", None).await;
            return Ok(());
        }
        if text.eq_ignore_ascii_case("/skip") {
            return Ok(());
        }
    }

    if text.starts_with('/') {
        handle_command(&bot, chat_id, text, &ctx).await;
        return Ok(());
    }

    // Text shortcuts for mode switching, same as the buttons.
    let lowered = text.to_lowercase();
    if lowered == "переключи на api" || lowered == "switch to api" {
        let _ = ctx.llm.set_mode("api");
        send_chunked(&bot, chat_id, "Переключено на Claude API. Теперь расходуются токены.", None).await;
        return Ok(());
    }
    if lowered == "переключи на cli" || lowered == "switch to cli" {
        let _ = ctx.llm.set_mode("cli");
        send_chunked(&bot, chat_id, "Переключено на Claude CLI (подписка).", None).await;
        return Ok(());
    }

    if text == "Запрос" {
        let keyboard = KeyboardMarkup::new([[KeyboardButton::new("Запрос")]])
            .resize_keyboard()
            .persistent();
        bot.send_message(chat_id, "Что хочешь узнать? Пиши вопрос.")
            .reply_markup(keyboard)
            .await?;
        return Ok(());
    }

    // Free text → the tool-use loop.
    let _ = bot.send_chat_action(chat_id, ChatAction::Typing).await;
    match ctx.conversation.handle_text(text).await {
        Ok(outcome) => {
            let keyboard = if outcome.listed_tasks {
                ctx.engine
                    .review_grid(5)
                    .ok()
                    .and_then(|(_, grid)| render_keyboard(&grid))
            } else {
                None
            };
            let reply = format!("{}{}", outcome.text, ctx.footer());
            send_chunked(&bot, chat_id, &reply, keyboard).await;
        }
        Err(e) => {
            error!(error = %e, "conversation turn failed");
            send_chunked(&bot, chat_id, &format!("⚠️ Ошибка: {e}"), None).await;
        }
    }
    Ok(())
}

async fn handle_command(bot: &Bot, chat_id: ChatId, text: &str, ctx: &Arc<BotContext>) {
    let (command, args) = text.split_once(' ').unwrap_or((text, ""));
    match command {
        "/start" => {
            let keyboard = KeyboardMarkup::new([[KeyboardButton::new("Запрос")]])
                .resize_keyboard()
                .persistent();
            let _ = bot
                .send_message(chat_id, "Адъютант активен. Нажми «Запрос» или используй команды.")
                .reply_markup(keyboard)
                .await;
        }
        "/help" => send_chunked(bot, chat_id, HELP_TEXT, None).await,
        "/tasks" => cmd_tasks(bot, chat_id, ctx).await,
        "/summary" => {
            send_chunked(bot, chat_id, "Генерирую дайджест...", None).await;
            let reporter = Arc::clone(&ctx.reporter);
            tokio::spawn(async move {
                if let Err(e) = reporter.evening_digest().await {
                    error!(error = %e, "on-demand digest failed");
                }
            });
        }
        "/health" => cmd_health(bot, chat_id, ctx).await,
        "/mode" => cmd_mode(bot, chat_id, ctx).await,
        "/settings" => cmd_settings(bot, chat_id, ctx).await,
        "/whitelist" => cmd_id_list(bot, chat_id, ctx, KEY_WHITELIST, args).await,
        "/blacklist" => cmd_id_list(bot, chat_id, ctx, KEY_BLACKLIST, args).await,
        "/admin" => {
            send_chunked(
                bot,
                chat_id,
                "Администрирование выполняется на сервере:\n\
                 • перезапуск: systemctl restart adjutant\n\
                 • логи: journalctl -u adjutant -n 100\n\
                 • переавторизация аккаунта: adjutant-reauth\n\
                 После перезапуска модули переподключатся сами.",
                None,
            )
            .await;
        }
        _ => send_chunked(bot, chat_id, "Не знаю такую команду. /help", None).await,
    }
}

async fn cmd_tasks(bot: &Bot, chat_id: ChatId, ctx: &Arc<BotContext>) {
    let tasks = match ctx.engine.active() {
        Ok(t) => t,
        Err(e) => {
            send_chunked(bot, chat_id, &format!("⚠️ Ошибка: {e}"), None).await;
            return;
        }
    };
    if tasks.is_empty() {
        send_chunked(bot, chat_id, "Активных задач нет.", None).await;
        return;
    }

    let mut lines = vec!["📋 АКТИВНЫЕ ЗАДАЧИ:\n".to_string()];
    for t in &tasks {
        let kind = match t.task_type {
            adjutant_store::types::TaskType::Task => "T",
            adjutant_store::types::TaskType::PromiseMine => "P>",
            adjutant_store::types::TaskType::PromiseIncoming => ">P",
        };
        let deadline = t
            .deadline
            .map(|d| format!(" | до {}", format_local_short(d, ctx.tz_offset_hours)))
            .unwrap_or_default();
        let who = t.who.as_deref().map(|w| format!(" [{w}]")).unwrap_or_default();
        lines.push(format!("#{} [{kind}] {}{who}{deadline}", t.id, t.description));
    }

    let grid: Vec<Vec<CoreButton>> = tasks
        .iter()
        .take(5)
        .map(|t| {
            vec![
                CoreButton::new(format!("✅ #{}", t.id), CallbackIntent::TaskDone(t.id)),
                CoreButton::new(format!("✖ #{}", t.id), CallbackIntent::TaskCancel(t.id)),
            ]
        })
        .collect();

    send_chunked(bot, chat_id, &lines.join("\n"), render_keyboard(&grid)).await;
}

async fn cmd_health(bot: &Bot, chat_id: ChatId, ctx: &Arc<BotContext>) {
    let rows = ctx.health.all().unwrap_or_default();
    let stats = ctx.messages.stats().unwrap_or_default();
    let now = chrono::Utc::now();

    let mut lines = vec!["Статус модулей:".to_string()];
    for row in &rows {
        let minutes = (now - row.timestamp).num_minutes();
        let status = if row.status == "ok" { "OK" } else { "FAIL" };
        let error = row
            .error
            .as_deref()
            .map(|e| format!("  err: {e}"))
            .unwrap_or_default();
        lines.push(format!(
            "  {:<18} {status}  heartbeat: {minutes}м назад{error}",
            row.module
        ));
    }
    lines.push(format!(
        "\nБД: {} сообщений, {} активных задач",
        stats.messages, stats.active_tasks
    ));
    lines.push(format!("AI mode: {}", ctx.llm.mode()));
    lines.push(format!("Расходы за сессию: ${:.3}", ctx.llm.total_cost()));

    send_chunked(bot, chat_id, &lines.join("\n"), None).await;
}

async fn cmd_mode(bot: &Bot, chat_id: ChatId, ctx: &Arc<BotContext>) {
    let mode = ctx.llm.mode();
    let (label, other) = if mode == "cli" {
        ("CLI (Claude Code, подписка)", "api")
    } else {
        ("API (Claude API, токены)", "cli")
    };
    let grid = vec![vec![CoreButton::new(
        format!("Переключить на {}", other.to_uppercase()),
        CallbackIntent::SwitchMode(other.to_string()),
    )]];
    send_chunked(
        bot,
        chat_id,
        &format!("Текущий режим: {label}"),
        render_keyboard(&grid),
    )
    .await;
}

async fn cmd_settings(bot: &Bot, chat_id: ChatId, ctx: &Arc<BotContext>) {
    let mode = ctx.llm.mode();
    let limit = ctx
        .settings
        .get(KEY_URGENT_DAILY_LIMIT, "10")
        .unwrap_or_else(|_| "10".into());
    let whitelist = ctx.settings.whitelist().unwrap_or_default();
    let blacklist = ctx.settings.blacklist().unwrap_or_default();

    let text = format!(
        "НАСТРОЙКИ:\n\n\
         AI-режим: {mode}\n\
         Лимит срочных вопросов: {limit}/день\n\
         Whitelist чатов: {}\n\
         Blacklist: {}",
        whitelist.len(),
        blacklist.len(),
    );
    send_chunked(bot, chat_id, &text, None).await;
}

/// Shared grammar for /whitelist and /blacklist:
/// no args - show; `add <id>…`, `del <id>…`, `clear`.
async fn cmd_id_list(bot: &Bot, chat_id: ChatId, ctx: &Arc<BotContext>, key: &str, args: &str) {
    let args = args.trim();
    let list = match key {
        KEY_WHITELIST => ctx.settings.whitelist(),
        _ => ctx.settings.blacklist(),
    }
    .unwrap_or_default();

    if args.is_empty() {
        let reply = if list.is_empty() {
            format!(
                "Список пуст.\n\nДобавить: {key} add <id>\nУдалить: {key} del <id>\nОчистить: {key} clear\n\n\
                 Узнать chat_id: перешли мне сообщение из нужного чата.",
                key = format!("/{key}"),
            )
        } else {
            let mut lines = vec![format!("Всего: {}", list.len())];
            for id in &list {
                lines.push(format!("  • {id}"));
            }
            lines.join("\n")
        };
        send_chunked(bot, chat_id, &reply, None).await;
        return;
    }

    if args == "clear" {
        let _ = ctx.settings.list_clear(key);
        send_chunked(bot, chat_id, "Список очищен.", None).await;
        return;
    }

    let Some((action, raw_ids)) = args.split_once(' ') else {
        send_chunked(bot, chat_id, "Формат: add <id> | del <id> | clear", None).await;
        return;
    };
    if !matches!(action, "add" | "del") {
        send_chunked(bot, chat_id, "Формат: add <id> | del <id> | clear", None).await;
        return;
    }

    let mut added = Vec::new();
    let mut removed = Vec::new();
    let mut errors = Vec::new();
    for raw in raw_ids.replace(',', " ").split_whitespace() {
        match raw.parse::<i64>() {
            Ok(id) if action == "add" => {
                if ctx.settings.list_add(key, id).unwrap_or(false) {
                    added.push(id.to_string());
                }
            }
            Ok(id) => {
                if ctx.settings.list_remove(key, id).unwrap_or(false) {
                    removed.push(id.to_string());
                }
            }
            Err(_) => errors.push(raw.to_string()),
        }
    }

    let mut result = Vec::new();
    if !added.is_empty() {
        result.push(format!("Добавлено: {}", added.join(", ")));
    }
    if !removed.is_empty() {
        result.push(format!("Удалено: {}", removed.join(", ")));
    }
    if !errors.is_empty() {
        result.push(format!("Ошибка (не число): {}", errors.join(", ")));
    }
    if result.is_empty() {
        result.push("Ничего не изменилось.".to_string());
    }
    send_chunked(bot, chat_id, &result.join("\n"), None).await;
}

/// Owner photo: download, pass to the vision path, answer in voice.
async fn handle_photo(bot: &Bot, msg: &Message, ctx: &Arc<BotContext>) {
    let chat_id = msg.chat.id;
    let Some(photo) = msg.photo().and_then(|sizes| sizes.last()) else {
        return;
    };

    let _ = bot.send_chat_action(chat_id, ChatAction::Typing).await;

    let file = match bot.get_file(&photo.file.id).await {
        Ok(f) => f,
        Err(e) => {
            warn!(error = %e, "photo get_file failed");
            return;
        }
    };
    let mut bytes: Vec<u8> = Vec::new();
    if let Err(e) = bot.download_file(&file.path, &mut bytes).await {
        warn!(error = %e, "photo download failed");
        return;
    }

    use base64::Engine as _;
    let encoded = base64::engine::general_purpose::STANDARD.encode(&bytes);
    let caption = msg.caption().unwrap_or("");

    let system = SystemPrompt::new(
        adjutant_conversation::context::ASSISTANT_SYSTEM_PROMPT,
        String::new(),
    );
    match adjutant_conversation::vision::answer_with_image(
        &ctx.llm,
        system,
        &encoded,
        "image/jpeg",
        caption,
    )
    .await
    {
        Ok(answer) => {
            let reply = format!("{answer}{}", ctx.footer());
            send_chunked(bot, chat_id, &reply, None).await;
        }
        Err(e) => {
            error!(error = %e, "vision call failed");
            send_chunked(bot, chat_id, &format!("⚠️ Не смог разобрать фото: {e}"), None).await;
        }
    }
}
