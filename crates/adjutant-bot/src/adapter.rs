//! Bot adapter: wires teloxide long polling to the core components and
//! drains the notification channel into the owner's chat.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use teloxide::prelude::*;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};
use tokio::sync::mpsc;
use tracing::info;

use adjutant_classifier::ClassifierPipeline;
use adjutant_conversation::{ConversationHandler, Reporter};
use adjutant_core::notify::Notification;
use adjutant_llm::LlmRouter;
use adjutant_store::confidence::ConfidenceStore;
use adjutant_store::health::HealthStore;
use adjutant_store::messages::MessageStore;
use adjutant_store::settings::SettingsStore;
use adjutant_tasks::TaskEngine;

use crate::callbacks::handle_callback;
use crate::commands::handle_message;
use crate::send::send_chunked;

/// How long a "why was this wrong?" follow-up stays armed.
pub(crate) const FEEDBACK_REPLY_WINDOW_SECS: u64 = 300;

pub(crate) struct PendingFeedback {
    pub feedback_id: i64,
    pub asked_at: Instant,
}

/// Everything the handlers need, shared through dptree.
pub struct BotContext {
    pub engine: Arc<TaskEngine>,
    pub conversation: Arc<ConversationHandler>,
    pub classifier: Arc<ClassifierPipeline>,
    pub reporter: Arc<Reporter>,
    pub llm: Arc<LlmRouter>,
    pub settings: SettingsStore,
    pub health: HealthStore,
    pub confidence: ConfidenceStore,
    pub messages: MessageStore,
    pub owner_id: i64,
    pub tz_offset_hours: i32,
    pub(crate) pending_feedback: Mutex<Option<PendingFeedback>>,
}

impl BotContext {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        engine: Arc<TaskEngine>,
        conversation: Arc<ConversationHandler>,
        classifier: Arc<ClassifierPipeline>,
        reporter: Arc<Reporter>,
        llm: Arc<LlmRouter>,
        settings: SettingsStore,
        health: HealthStore,
        confidence: ConfidenceStore,
        messages: MessageStore,
        owner_id: i64,
        tz_offset_hours: i32,
    ) -> Self {
        Self {
            engine,
            conversation,
            classifier,
            reporter,
            llm,
            settings,
            health,
            confidence,
            messages,
            owner_id,
            tz_offset_hours,
            pending_feedback: Mutex::new(None),
        }
    }

    /// Footer shown under every owner-bound message: AI mode + module health.
    pub fn footer(&self) -> String {
        let (ok, total) = self
            .health
            .all()
            .map(|rows| {
                let ok = rows.iter().filter(|r| r.status == "ok").count();
                (ok, rows.len())
            })
            .unwrap_or((0, 0));
        format!("\n\n— {} | {ok}/{total} модулей OK", self.llm.mode_label())
    }

    /// Arm the "why?" follow-up for a feedback row.
    pub(crate) fn arm_feedback_reply(&self, feedback_id: i64) {
        *self.pending_feedback.lock().unwrap() = Some(PendingFeedback {
            feedback_id,
            asked_at: Instant::now(),
        });
    }

    /// Take the armed follow-up if it is still inside the window.
    pub(crate) fn take_pending_feedback(&self) -> Option<i64> {
        let mut guard = self.pending_feedback.lock().unwrap();
        let pending = guard.take()?;
        if pending.asked_at.elapsed().as_secs() <= FEEDBACK_REPLY_WINDOW_SECS {
            Some(pending.feedback_id)
        } else {
            None
        }
    }
}

/// Render core keyboard rows into teloxide markup.
pub fn render_keyboard(rows: &[Vec<adjutant_core::notify::Button>]) -> Option<InlineKeyboardMarkup> {
    if rows.is_empty() {
        return None;
    }
    let keyboard: Vec<Vec<InlineKeyboardButton>> = rows
        .iter()
        .map(|row| {
            row.iter()
                .map(|b| InlineKeyboardButton::callback(b.label.clone(), b.intent.render()))
                .collect()
        })
        .collect();
    Some(InlineKeyboardMarkup::new(keyboard))
}

pub struct BotAdapter {
    bot: Bot,
    ctx: Arc<BotContext>,
}

impl BotAdapter {
    pub fn new(token: &str, ctx: Arc<BotContext>) -> Self {
        Self {
            bot: Bot::new(token),
            ctx,
        }
    }

    pub fn bot(&self) -> Bot {
        self.bot.clone()
    }

    /// Start the notification delivery task and drive the long-polling
    /// dispatcher until the process exits.
    pub async fn run(self, notify_rx: mpsc::Receiver<Notification>) {
        let delivery_bot = self.bot.clone();
        let delivery_ctx = Arc::clone(&self.ctx);
        tokio::spawn(run_delivery(delivery_bot, delivery_ctx, notify_rx));

        info!("bot: starting long-polling dispatcher");

        let handler = dptree::entry()
            .branch(Update::filter_message().endpoint(handle_message))
            .branch(Update::filter_callback_query().endpoint(handle_callback));

        Dispatcher::builder(self.bot, handler)
            .dependencies(dptree::deps![Arc::clone(&self.ctx)])
            .default_handler(|_upd| async {})
            .build()
            .dispatch()
            .await;
    }
}

/// Drain the notification channel into the owner's chat.
async fn run_delivery(
    bot: Bot,
    ctx: Arc<BotContext>,
    mut rx: mpsc::Receiver<Notification>,
) {
    info!("bot: notification delivery task started");
    let owner = ChatId(ctx.owner_id);
    while let Some(notification) = rx.recv().await {
        let text = format!("{}{}", notification.text, ctx.footer());
        let keyboard = render_keyboard(&notification.keyboard);
        send_chunked(&bot, owner, &text, keyboard).await;
    }
    info!("bot: notification delivery task ended (channel closed)");
}
