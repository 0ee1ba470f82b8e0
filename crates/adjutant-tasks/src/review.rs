//! Daily deadline review and the review grids shared with the digest.

use chrono::{TimeZone, Utc};
use tracing::info;

use adjutant_core::intent::CallbackIntent;
use adjutant_core::notify::{Button, Notification};
use adjutant_core::time::{format_local_short, local_today, owner_offset};
use adjutant_core::Result;
use adjutant_store::types::Task;

use crate::engine::TaskEngine;

impl TaskEngine {
    /// Active tasks whose deadline falls on the owner's current local day.
    pub fn deadlines_today(&self) -> Result<Vec<Task>> {
        let offset = owner_offset(self.tz_offset_hours);
        let today = local_today(self.tz_offset_hours);
        let start = offset
            .from_local_datetime(&today.and_hms_opt(0, 0, 0).unwrap())
            .single()
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);
        let end = start + chrono::Duration::days(1);
        self.tasks
            .deadline_between(start, end)
            .map_err(Into::into)
    }

    /// The 14:00 job: one message listing today's deadlines with a per-task
    /// ✅/➡️ grid. The per-day notification counter keeps a restarted daemon
    /// from sending the same review twice.
    pub async fn deadline_review(&self) -> Result<()> {
        let due = self.deadlines_today()?;
        if due.is_empty() {
            info!("deadline review: nothing due today");
            return Ok(());
        }

        let today = local_today(self.tz_offset_hours);
        let mut lines = vec!["⏰ Дедлайны сегодня:".to_string()];
        let mut keyboard = Vec::new();
        let mut fresh = 0;

        for task in &due {
            if self.tasks.bump_deadline_notification(task.id, today)? > 1 {
                continue; // already reviewed today
            }
            fresh += 1;
            let who = task
                .who
                .as_deref()
                .map(|w| format!(" [{w}]"))
                .unwrap_or_default();
            lines.push(format!("#{} {}{}", task.id, task.description, who));
            keyboard.push(vec![
                Button::new(
                    format!("✅ #{}", task.id),
                    CallbackIntent::TaskDone(task.id),
                ),
                Button::new(
                    format!("➡️ #{} +1д", task.id),
                    CallbackIntent::TaskPostpone(task.id),
                ),
            ]);
        }

        if fresh == 0 {
            info!("deadline review: all of today's deadlines already reviewed");
            return Ok(());
        }

        self.notify
            .send(Notification::with_keyboard(lines.join("\n"), keyboard))
            .await;
        info!(count = fresh, "deadline review sent");
        Ok(())
    }

    /// Compact listing of active tasks for the evening digest's review grid.
    pub fn review_grid(&self, limit: usize) -> Result<(String, Vec<Vec<Button>>)> {
        let active = self.active()?;
        let mut lines = Vec::new();
        let mut keyboard = Vec::new();
        for task in active.iter().take(limit) {
            let deadline = task
                .deadline
                .map(|d| format!(" | до {}", format_local_short(d, self.tz_offset_hours)))
                .unwrap_or_default();
            lines.push(format!("#{} {}{}", task.id, task.description, deadline));
            keyboard.push(vec![
                Button::new(format!("✅ #{}", task.id), CallbackIntent::TaskDone(task.id)),
                Button::new(
                    format!("✖ #{}", task.id),
                    CallbackIntent::TaskCancel(task.id),
                ),
            ]);
        }
        Ok((lines.join("\n"), keyboard))
    }
}

#[cfg(test)]
mod tests {
    use crate::engine::testutil::{engine, plain_task};
    use adjutant_core::intent::CallbackIntent;
    use chrono::Utc;

    #[tokio::test]
    async fn review_lists_only_todays_deadlines() {
        let (engine, mut rx) = engine();
        let mut today_task = plain_task("оплатить счёт");
        today_task.deadline = Some(Utc::now());
        engine.create(today_task).unwrap();

        let mut future_task = plain_task("подготовить отчёт");
        future_task.deadline = Some(Utc::now() + chrono::Duration::days(10));
        engine.create(future_task).unwrap();

        engine.deadline_review().await.unwrap();
        let note = rx.try_recv().unwrap();
        assert!(note.text.contains("оплатить счёт"));
        assert!(!note.text.contains("подготовить отчёт"));
        assert_eq!(note.keyboard.len(), 1);
        assert!(matches!(
            note.keyboard[0][1].intent,
            CallbackIntent::TaskPostpone(_)
        ));
    }

    #[tokio::test]
    async fn second_review_same_day_is_suppressed() {
        let (engine, mut rx) = engine();
        let mut task = plain_task("дедлайн");
        task.deadline = Some(Utc::now());
        engine.create(task).unwrap();

        engine.deadline_review().await.unwrap();
        assert!(rx.try_recv().is_ok());

        engine.deadline_review().await.unwrap();
        assert!(rx.try_recv().is_err(), "counter must dedup the rerun");
    }

    #[test]
    fn review_grid_caps_rows() {
        let (engine, _rx) = engine();
        for i in 0..10 {
            engine.create(plain_task(&format!("задача номер {i}"))).unwrap();
        }
        let (text, keyboard) = engine.review_grid(5).unwrap();
        assert_eq!(keyboard.len(), 5);
        assert_eq!(text.lines().count(), 5);
    }
}
