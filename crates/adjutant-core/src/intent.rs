//! Typed inline-button intents.
//!
//! Every inline button carries one of these; the `"action:payload"` string
//! form exists only at the bot wire boundary.

/// What pressing an inline button means.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackIntent {
    /// Mark a task done (reminder "✅ Done", /tasks grid, review grid).
    TaskDone(i64),
    /// Cancel a task.
    TaskCancel(i64),
    /// Move a task's deadline (and remind_at) forward one day.
    TaskPostpone(i64),
    /// Tracked-task verdict: close the task as completed.
    TrackClose(i64),
    /// Tracked-task verdict: keep waiting, re-check later.
    TrackWait(i64),
    /// HIGH-band feedback: the auto-created task was correct. Payload = message id.
    ClfCorrect(i64),
    /// HIGH-band feedback: the auto-created task was wrong. Payload = message id.
    ClfWrong(i64),
    /// LOW-band feedback: this actually was a task. Payload = message id.
    ClfUpgrade(i64),
    /// Urgent confidence prompt: yes, it is a task. Payload = queue id.
    ConfYes(i64),
    /// Urgent confidence prompt: no. Payload = queue id.
    ConfNo(i64),
    /// Urgent confidence prompt: defer to the evening batch. Payload = queue id.
    ConfLater(i64),
    /// Confidence batch: confirm every listed item as a task.
    BatchAll(Vec<i64>),
    /// Confidence batch: reject every listed item.
    BatchNone(Vec<i64>),
    /// Switch the ai_mode setting ("api" / "cli").
    SwitchMode(String),
}

impl CallbackIntent {
    /// Wire form sent as the Telegram callback payload.
    pub fn render(&self) -> String {
        match self {
            CallbackIntent::TaskDone(id) => format!("task_done:{id}"),
            CallbackIntent::TaskCancel(id) => format!("task_cancel:{id}"),
            CallbackIntent::TaskPostpone(id) => format!("task_postpone:{id}"),
            CallbackIntent::TrackClose(id) => format!("track_close:{id}"),
            CallbackIntent::TrackWait(id) => format!("track_wait:{id}"),
            CallbackIntent::ClfCorrect(id) => format!("clf_ok:{id}"),
            CallbackIntent::ClfWrong(id) => format!("clf_wrong:{id}"),
            CallbackIntent::ClfUpgrade(id) => format!("clf_task:{id}"),
            CallbackIntent::ConfYes(id) => format!("conf_yes:{id}"),
            CallbackIntent::ConfNo(id) => format!("conf_no:{id}"),
            CallbackIntent::ConfLater(id) => format!("conf_later:{id}"),
            CallbackIntent::BatchAll(ids) => format!("batch_all:{}", join_ids(ids)),
            CallbackIntent::BatchNone(ids) => format!("batch_none:{}", join_ids(ids)),
            CallbackIntent::SwitchMode(mode) => format!("switch_mode:{mode}"),
        }
    }

    /// Parse the wire form back. `None` for unknown actions or bad payloads.
    pub fn parse(data: &str) -> Option<Self> {
        let (action, payload) = data.split_once(':')?;
        match action {
            "task_done" => Some(CallbackIntent::TaskDone(payload.parse().ok()?)),
            "task_cancel" => Some(CallbackIntent::TaskCancel(payload.parse().ok()?)),
            "task_postpone" => Some(CallbackIntent::TaskPostpone(payload.parse().ok()?)),
            "track_close" => Some(CallbackIntent::TrackClose(payload.parse().ok()?)),
            "track_wait" => Some(CallbackIntent::TrackWait(payload.parse().ok()?)),
            "clf_ok" => Some(CallbackIntent::ClfCorrect(payload.parse().ok()?)),
            "clf_wrong" => Some(CallbackIntent::ClfWrong(payload.parse().ok()?)),
            "clf_task" => Some(CallbackIntent::ClfUpgrade(payload.parse().ok()?)),
            "conf_yes" => Some(CallbackIntent::ConfYes(payload.parse().ok()?)),
            "conf_no" => Some(CallbackIntent::ConfNo(payload.parse().ok()?)),
            "conf_later" => Some(CallbackIntent::ConfLater(payload.parse().ok()?)),
            "batch_all" => Some(CallbackIntent::BatchAll(parse_ids(payload)?)),
            "batch_none" => Some(CallbackIntent::BatchNone(parse_ids(payload)?)),
            "switch_mode" => match payload {
                "api" | "cli" => Some(CallbackIntent::SwitchMode(payload.to_string())),
                _ => None,
            },
            _ => None,
        }
    }
}

fn join_ids(ids: &[i64]) -> String {
    ids.iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

fn parse_ids(payload: &str) -> Option<Vec<i64>> {
    if payload.is_empty() {
        return Some(Vec::new());
    }
    payload
        .split(',')
        .map(|p| p.parse().ok())
        .collect::<Option<Vec<i64>>>()
}
