use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// When a job runs. Wall-clock kinds are in the owner's local zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Schedule {
    /// Fixed interval in seconds (reminder scan, heartbeat).
    Interval { every_secs: u64 },
    /// Every day at the given local time.
    Daily { hour: u8, minute: u8 },
    /// Specific local weekday (0 = Monday … 6 = Sunday) and time.
    Weekly { day: u8, hour: u8, minute: u8 },
    /// Every hour at the given minute.
    Hourly { minute: u8 },
}

/// The periodic jobs the daemon routes to components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobName {
    MorningBriefing,
    DeadlineReview,
    ConfidenceBatch,
    EveningDigest,
    ReminderScan,
    TrackedTaskCheck,
    HistoryCompaction,
    WeeklyAnalysis,
    SchedulerHeartbeat,
}

impl std::fmt::Display for JobName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobName::MorningBriefing => "morning_briefing",
            JobName::DeadlineReview => "deadline_review",
            JobName::ConfidenceBatch => "confidence_batch",
            JobName::EveningDigest => "evening_digest",
            JobName::ReminderScan => "reminder_scan",
            JobName::TrackedTaskCheck => "tracked_task_check",
            JobName::HistoryCompaction => "history_compaction",
            JobName::WeeklyAnalysis => "weekly_analysis",
            JobName::SchedulerHeartbeat => "scheduler_heartbeat",
        };
        write!(f, "{s}")
    }
}

/// One entry of the job table.
#[derive(Debug, Clone)]
pub struct JobSpec {
    pub name: JobName,
    pub schedule: Schedule,
}

/// Delivered to the daemon's job router when a slot arrives.
#[derive(Debug, Clone)]
pub struct FiredJob {
    pub name: JobName,
    pub fired_at: DateTime<Utc>,
}
