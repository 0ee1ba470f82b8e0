//! The static job table of the daemon.

use adjutant_core::config::{ScheduleConfig, HEARTBEAT_INTERVAL_SECS};

use crate::types::{JobName, JobSpec, Schedule};

/// Local wall-clock slots for the tracked-task sweep, minutes past the hour
/// offset from the main briefing slots so the two never collide.
const TRACKED_CHECK_HOURS: [u8; 4] = [9, 13, 17, 21];

/// Build the full periodic job table from config.
pub fn system_jobs(cfg: &ScheduleConfig) -> Vec<JobSpec> {
    let mut jobs = vec![
        JobSpec {
            name: JobName::MorningBriefing,
            schedule: Schedule::Daily {
                hour: cfg.briefing_hour,
                minute: 0,
            },
        },
        JobSpec {
            name: JobName::DeadlineReview,
            schedule: Schedule::Daily {
                hour: cfg.deadline_review_hour,
                minute: 0,
            },
        },
        JobSpec {
            name: JobName::ConfidenceBatch,
            schedule: Schedule::Daily {
                hour: cfg.confidence_batch_hour,
                minute: 0,
            },
        },
        JobSpec {
            name: JobName::EveningDigest,
            schedule: Schedule::Daily {
                hour: cfg.digest_hour,
                minute: 0,
            },
        },
        JobSpec {
            name: JobName::ReminderScan,
            schedule: Schedule::Interval { every_secs: 60 },
        },
        JobSpec {
            name: JobName::HistoryCompaction,
            schedule: Schedule::Hourly { minute: 15 },
        },
        JobSpec {
            name: JobName::WeeklyAnalysis,
            schedule: Schedule::Weekly {
                day: cfg.weekly_analysis_day,
                hour: cfg.weekly_analysis_hour,
                minute: 0,
            },
        },
        JobSpec {
            name: JobName::SchedulerHeartbeat,
            schedule: Schedule::Interval {
                every_secs: HEARTBEAT_INTERVAL_SECS,
            },
        },
    ];

    for hour in TRACKED_CHECK_HOURS {
        jobs.push(JobSpec {
            name: JobName::TrackedTaskCheck,
            schedule: Schedule::Daily { hour, minute: 5 },
        });
    }

    jobs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_covers_every_job_kind() {
        let jobs = system_jobs(&ScheduleConfig::default());
        let tracked = jobs
            .iter()
            .filter(|j| j.name == JobName::TrackedTaskCheck)
            .count();
        assert_eq!(tracked, 4);
        for name in [
            JobName::MorningBriefing,
            JobName::DeadlineReview,
            JobName::ConfidenceBatch,
            JobName::EveningDigest,
            JobName::ReminderScan,
            JobName::HistoryCompaction,
            JobName::WeeklyAnalysis,
            JobName::SchedulerHeartbeat,
        ] {
            assert!(jobs.iter().any(|j| j.name == name), "missing {name}");
        }
    }

    #[test]
    fn reminder_scan_is_per_minute() {
        let jobs = system_jobs(&ScheduleConfig::default());
        let scan = jobs
            .iter()
            .find(|j| j.name == JobName::ReminderScan)
            .unwrap();
        assert_eq!(scan.schedule, Schedule::Interval { every_secs: 60 });
    }
}
