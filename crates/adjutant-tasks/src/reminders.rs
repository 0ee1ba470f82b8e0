//! Per-minute reminder scan.

use chrono::{DateTime, Utc};
use tracing::{error, info};

use adjutant_core::intent::CallbackIntent;
use adjutant_core::notify::{Button, Notification};
use adjutant_core::time::format_local_short;
use adjutant_core::Result;

use crate::engine::TaskEngine;

impl TaskEngine {
    /// Fire every due, un-sent reminder. The sent stamp is written before the
    /// notification goes out, so a crash between the two can only lose a
    /// reminder, never duplicate one.
    pub async fn fire_due_reminders(&self, now: DateTime<Utc>) -> Result<usize> {
        let due = self.tasks.due_reminders(now)?;
        let mut fired = 0;
        for task in due {
            if let Err(e) = self.tasks.stamp_reminder_sent(task.id, now) {
                error!(task_id = task.id, error = %e, "failed to stamp reminder");
                continue;
            }

            let mut text = format!("🔔 Напоминание: {}", task.description);
            if let Some(deadline) = task.deadline {
                text.push_str(&format!(
                    "\n📅 Дедлайн: {}",
                    format_local_short(deadline, self.tz_offset_hours)
                ));
            }
            if let Some(who) = &task.who {
                text.push_str(&format!("\n👤 {who}"));
            }

            self.notify
                .send(Notification::with_keyboard(
                    text,
                    vec![vec![Button::new(
                        "✅ Выполнено",
                        CallbackIntent::TaskDone(task.id),
                    )]],
                ))
                .await;
            fired += 1;
            info!(task_id = task.id, "reminder fired");
        }
        Ok(fired)
    }
}

#[cfg(test)]
mod tests {
    use crate::engine::testutil::{engine, plain_task};
    use adjutant_core::intent::CallbackIntent;
    use chrono::Utc;

    #[tokio::test]
    async fn due_reminder_fires_once() {
        let (engine, mut rx) = engine();
        let mut new = plain_task("позвонить в банк");
        new.remind_at = Some(Utc::now() - chrono::Duration::minutes(1));
        engine.create(new).unwrap();

        let fired = engine.fire_due_reminders(Utc::now()).await.unwrap();
        assert_eq!(fired, 1);

        let note = rx.try_recv().unwrap();
        assert!(note.text.contains("позвонить в банк"));
        assert!(matches!(
            note.keyboard[0][0].intent,
            CallbackIntent::TaskDone(_)
        ));

        // Monotonic: the stamp blocks a second firing.
        let fired = engine.fire_due_reminders(Utc::now()).await.unwrap();
        assert_eq!(fired, 0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn future_reminder_stays_quiet() {
        let (engine, mut rx) = engine();
        let mut new = plain_task("завтрашнее");
        new.remind_at = Some(Utc::now() + chrono::Duration::hours(20));
        engine.create(new).unwrap();

        let fired = engine.fire_due_reminders(Utc::now()).await.unwrap();
        assert_eq!(fired, 0);
        assert!(rx.try_recv().is_err());
    }
}
