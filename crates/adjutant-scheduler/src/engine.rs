use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use crate::schedule::next_run;
use crate::types::{FiredJob, JobSpec};

/// Drives the job table at ±1 s precision and forwards fired jobs over mpsc.
pub struct SchedulerEngine {
    slots: Vec<Slot>,
    tz_offset_hours: i32,
    fired_tx: mpsc::Sender<FiredJob>,
}

struct Slot {
    spec: JobSpec,
    next: DateTime<Utc>,
}

impl SchedulerEngine {
    pub fn new(
        jobs: Vec<JobSpec>,
        tz_offset_hours: i32,
        fired_tx: mpsc::Sender<FiredJob>,
    ) -> Self {
        let now = Utc::now();
        let slots = jobs
            .into_iter()
            .map(|spec| Slot {
                next: next_run(&spec.schedule, now, tz_offset_hours),
                spec,
            })
            .collect();
        Self {
            slots,
            tz_offset_hours,
            fired_tx,
        }
    }

    /// Main loop. Polls every second until `shutdown` broadcasts `true`.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(jobs = self.slots.len(), "scheduler engine started");
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(1));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = interval.tick() => self.tick(Utc::now()),
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("scheduler engine shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Fire every due slot and recompute its next run.
    fn tick(&mut self, now: DateTime<Utc>) {
        for slot in &mut self.slots {
            if slot.next > now {
                continue;
            }
            // try_send keeps the tick loop from stalling on a slow consumer.
            if self
                .fired_tx
                .try_send(FiredJob {
                    name: slot.spec.name,
                    fired_at: now,
                })
                .is_err()
            {
                warn!(job = %slot.spec.name, "job channel full or closed — firing dropped");
            }
            slot.next = next_run(&slot.spec.schedule, now, self.tz_offset_hours);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{JobName, Schedule};

    #[tokio::test]
    async fn due_slot_fires_once_and_reschedules() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut engine = SchedulerEngine::new(
            vec![JobSpec {
                name: JobName::ReminderScan,
                schedule: Schedule::Interval { every_secs: 60 },
            }],
            0,
            tx,
        );
        // Force the slot due, then tick twice within the same minute.
        let now = Utc::now();
        engine.slots[0].next = now - chrono::Duration::seconds(1);
        engine.tick(now);
        engine.tick(now + chrono::Duration::seconds(1));

        assert_eq!(rx.try_recv().unwrap().name, JobName::ReminderScan);
        assert!(rx.try_recv().is_err(), "must not fire again before next_run");
        assert!(engine.slots[0].next > now);
    }

    #[tokio::test]
    async fn full_channel_does_not_block_the_tick() {
        let (tx, _rx) = mpsc::channel(1);
        let mut engine = SchedulerEngine::new(
            vec![
                JobSpec {
                    name: JobName::ReminderScan,
                    schedule: Schedule::Interval { every_secs: 60 },
                },
                JobSpec {
                    name: JobName::SchedulerHeartbeat,
                    schedule: Schedule::Interval { every_secs: 60 },
                },
            ],
            0,
            tx,
        );
        let now = Utc::now();
        for slot in &mut engine.slots {
            slot.next = now - chrono::Duration::seconds(1);
        }
        // Second firing overflows the 1-slot channel; tick must not hang.
        engine.tick(now);
        assert!(engine.slots.iter().all(|s| s.next > now));
    }
}
