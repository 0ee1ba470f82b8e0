use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A captured upstream chat message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: i64,
    pub upstream_msg_id: i64,
    pub chat_id: i64,
    pub chat_title: String,
    pub sender_id: i64,
    pub sender_name: String,
    pub text: String,
    pub media_kind: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub account: String,
    pub processed: bool,
}

/// Normalized task category as persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Task,
    PromiseMine,
    PromiseIncoming,
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskType::Task => "task",
            TaskType::PromiseMine => "promise_mine",
            TaskType::PromiseIncoming => "promise_incoming",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for TaskType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "task" => Ok(TaskType::Task),
            "promise_mine" => Ok(TaskType::PromiseMine),
            "promise_incoming" => Ok(TaskType::PromiseIncoming),
            other => Err(format!("unknown task type: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Active,
    Done,
    Cancelled,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskStatus::Active => "active",
            TaskStatus::Done => "done",
            TaskStatus::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "active" => Ok(TaskStatus::Active),
            "done" => Ok(TaskStatus::Done),
            "cancelled" => Ok(TaskStatus::Cancelled),
            other => Err(format!("unknown task status: {other}")),
        }
    }
}

/// Recurrence rule: completing the task spawns the next occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recurrence {
    Daily,
    Weekly,
    Monthly,
}

impl Recurrence {
    /// Advance an instant to the next occurrence.
    pub fn advance(&self, from: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Recurrence::Daily => from + chrono::Duration::days(1),
            Recurrence::Weekly => from + chrono::Duration::days(7),
            Recurrence::Monthly => {
                // Calendar month step; clamps to the last valid day (Jan 31 → Feb 28).
                let months = chrono::Months::new(1);
                from.checked_add_months(months)
                    .unwrap_or(from + chrono::Duration::days(30))
            }
        }
    }
}

impl std::fmt::Display for Recurrence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Recurrence::Daily => "daily",
            Recurrence::Weekly => "weekly",
            Recurrence::Monthly => "monthly",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for Recurrence {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "daily" => Ok(Recurrence::Daily),
            "weekly" => Ok(Recurrence::Weekly),
            "monthly" => Ok(Recurrence::Monthly),
            other => Err(format!("unknown recurrence: {other}")),
        }
    }
}

/// A persisted task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: i64,
    pub task_type: TaskType,
    pub description: String,
    pub who: Option<String>,
    pub deadline: Option<DateTime<Utc>>,
    pub remind_at: Option<DateTime<Utc>>,
    pub remind_at_sent: Option<DateTime<Utc>>,
    pub recurrence: Option<Recurrence>,
    pub confidence: i64,
    pub source: String,
    pub source_msg_id: Option<i64>,
    pub chat_id: Option<i64>,
    pub sender_id: Option<i64>,
    pub sender_name: Option<String>,
    pub account: Option<String>,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub track_completion: bool,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub check_interval_days: i64,
}

/// Fields for inserting a new task; the engine fills provenance defaults.
#[derive(Debug, Clone, Default)]
pub struct NewTask {
    pub task_type: Option<TaskType>,
    pub description: String,
    pub who: Option<String>,
    pub deadline: Option<DateTime<Utc>>,
    pub remind_at: Option<DateTime<Utc>>,
    pub recurrence: Option<Recurrence>,
    pub confidence: i64,
    pub source: String,
    pub source_msg_id: Option<i64>,
    pub chat_id: Option<i64>,
    pub sender_id: Option<i64>,
    pub sender_name: Option<String>,
    pub account: Option<String>,
    pub track_completion: bool,
}

/// A MEDIUM-band classification queued for owner review.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfidenceItem {
    pub id: i64,
    pub message_id: i64,
    pub chat_id: i64,
    pub sender_name: String,
    pub text_preview: String,
    pub predicted_type: String,
    pub confidence: i64,
    pub is_urgent: bool,
    pub resolved: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
}

impl std::fmt::Display for TurnRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TurnRole::User => write!(f, "user"),
            TurnRole::Assistant => write!(f, "assistant"),
        }
    }
}

impl std::str::FromStr for TurnRole {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "user" => Ok(TurnRole::User),
            "assistant" => Ok(TurnRole::Assistant),
            other => Err(format!("unknown turn role: {other}")),
        }
    }
}

/// One owner↔assistant dialogue turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub id: i64,
    pub role: TurnRole,
    pub content: String,
    /// JSON log of tool calls made while producing an assistant turn.
    pub tool_calls: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Heartbeat row for one module.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthRow {
    pub module: String,
    pub status: String,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Aggregate counts for /health and the digest.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StoreStats {
    pub messages: i64,
    pub active_tasks: i64,
}

/// DM roll-up row for briefing/digest context.
#[derive(Debug, Clone)]
pub struct DmSummaryRow {
    pub sender_name: String,
    pub msg_count: i64,
    pub previews: String,
}

/// A chat seen in the store, with traffic volume.
#[derive(Debug, Clone)]
pub struct KnownChat {
    pub chat_id: i64,
    pub chat_title: String,
    pub msg_count: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn recurrence_advances_correctly() {
        let base = Utc.with_ymd_and_hms(2026, 1, 31, 10, 0, 0).unwrap();
        assert_eq!(
            Recurrence::Daily.advance(base),
            Utc.with_ymd_and_hms(2026, 2, 1, 10, 0, 0).unwrap()
        );
        assert_eq!(
            Recurrence::Weekly.advance(base),
            Utc.with_ymd_and_hms(2026, 2, 7, 10, 0, 0).unwrap()
        );
        // Jan 31 + 1 month clamps to Feb 28.
        assert_eq!(
            Recurrence::Monthly.advance(base),
            Utc.with_ymd_and_hms(2026, 2, 28, 10, 0, 0).unwrap()
        );
    }

    #[test]
    fn enums_round_trip_through_strings() {
        for t in [TaskType::Task, TaskType::PromiseMine, TaskType::PromiseIncoming] {
            assert_eq!(t.to_string().parse::<TaskType>().unwrap(), t);
        }
        for s in [TaskStatus::Active, TaskStatus::Done, TaskStatus::Cancelled] {
            assert_eq!(s.to_string().parse::<TaskStatus>().unwrap(), s);
        }
        for r in [Recurrence::Daily, Recurrence::Weekly, Recurrence::Monthly] {
            assert_eq!(r.to_string().parse::<Recurrence>().unwrap(), r);
        }
    }

    #[test]
    fn unknown_strings_are_rejected() {
        assert!("sometimes".parse::<Recurrence>().is_err());
        assert!("pending".parse::<TaskStatus>().is_err());
        assert!("question".parse::<TaskType>().is_err());
    }
}
