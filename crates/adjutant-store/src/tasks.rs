//! Task rows and the queries the task engine runs over them.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::Connection;

use crate::error::{Result, StoreError};
use crate::messages::parse_ts;
use crate::types::{NewTask, Recurrence, Task, TaskStatus, TaskType};

/// How many leading characters participate in the similarity check.
const DEDUP_PREFIX_CHARS: usize = 50;

#[derive(Clone)]
pub struct TaskStore {
    conn: Arc<Mutex<Connection>>,
}

/// Deliberate approximation: two descriptions are considered the same task
/// when the first 50 characters of one contain the first 50 of the other,
/// case-insensitively.
pub fn descriptions_similar(a: &str, b: &str) -> bool {
    let a = prefix_lower(a);
    let b = prefix_lower(b);
    if a.is_empty() || b.is_empty() {
        return false;
    }
    a.contains(&b) || b.contains(&a)
}

fn prefix_lower(s: &str) -> String {
    s.trim().chars().take(DEDUP_PREFIX_CHARS).collect::<String>().to_lowercase()
}

const TASK_COLUMNS: &str = "id, type, description, who, deadline, remind_at, remind_at_sent,
    recurrence, confidence, source, source_msg_id, chat_id, sender_id, sender_name,
    account, status, created_at, completed_at, track_completion, last_checked_at,
    check_interval_days";

impl TaskStore {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// Insert a new task row. Dedup is the engine's job - this is a plain write.
    pub fn insert(&self, new: &NewTask) -> Result<Task> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now();
        let task_type = new.task_type.unwrap_or(TaskType::Task);
        conn.execute(
            "INSERT INTO tasks
             (type, description, who, deadline, remind_at, recurrence, confidence,
              source, source_msg_id, chat_id, sender_id, sender_name, account,
              status, created_at, track_completion, check_interval_days)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13,
                     'active', ?14, ?15, 3)",
            rusqlite::params![
                task_type.to_string(),
                new.description,
                new.who,
                new.deadline.map(|d| d.to_rfc3339()),
                new.remind_at.map(|d| d.to_rfc3339()),
                new.recurrence.map(|r| r.to_string()),
                new.confidence,
                new.source,
                new.source_msg_id,
                new.chat_id,
                new.sender_id,
                new.sender_name,
                new.account,
                now.to_rfc3339(),
                new.track_completion as i64,
            ],
        )?;
        let id = conn.last_insert_rowid();
        drop(conn);
        self.get(id)?
            .ok_or_else(|| StoreError::NotFound(format!("task #{id} just inserted")))
    }

    /// First active task whose description collides with `description` under
    /// the 50-char containment rule.
    pub fn find_similar_active(&self, description: &str) -> Result<Option<Task>> {
        Ok(self
            .active()?
            .into_iter()
            .find(|t| descriptions_similar(&t.description, description)))
    }

    pub fn get(&self, id: i64) -> Result<Option<Task>> {
        let conn = self.conn.lock().unwrap();
        let sql = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1");
        let mut stmt = conn.prepare_cached(&sql)?;
        let mut rows = stmt.query_map([id], row_to_task)?;
        Ok(rows.next().transpose()?)
    }

    /// All active tasks, nearest deadline first, undated last.
    pub fn active(&self) -> Result<Vec<Task>> {
        let conn = self.conn.lock().unwrap();
        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE status = 'active'
             ORDER BY deadline IS NULL, deadline ASC, created_at DESC"
        );
        let mut stmt = conn.prepare_cached(&sql)?;
        let rows = stmt.query_map([], row_to_task)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Most recent task created from a given source message.
    pub fn find_by_source_msg(&self, source_msg_id: i64) -> Result<Option<Task>> {
        let conn = self.conn.lock().unwrap();
        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE source_msg_id = ?1
             ORDER BY id DESC LIMIT 1"
        );
        let mut stmt = conn.prepare_cached(&sql)?;
        let mut rows = stmt.query_map([source_msg_id], row_to_task)?;
        Ok(rows.next().transpose()?)
    }

    pub fn set_status(&self, id: i64, status: TaskStatus) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let completed_at = match status {
            TaskStatus::Done => Some(Utc::now().to_rfc3339()),
            _ => None,
        };
        let n = conn.execute(
            "UPDATE tasks SET status = ?1, completed_at = ?2 WHERE id = ?3",
            rusqlite::params![status.to_string(), completed_at, id],
        )?;
        if n == 0 {
            return Err(StoreError::NotFound(format!("task #{id}")));
        }
        Ok(())
    }

    /// Move deadline (and remind_at, when set) forward by whole days.
    pub fn postpone(&self, id: i64, days: i64) -> Result<()> {
        let task = self
            .get(id)?
            .ok_or_else(|| StoreError::NotFound(format!("task #{id}")))?;
        let shift = chrono::Duration::days(days);
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE tasks SET deadline = ?1, remind_at = ?2, remind_at_sent = NULL
             WHERE id = ?3",
            rusqlite::params![
                task.deadline.map(|d| (d + shift).to_rfc3339()),
                task.remind_at.map(|d| (d + shift).to_rfc3339()),
                id,
            ],
        )?;
        Ok(())
    }

    pub fn update_fields(
        &self,
        id: i64,
        description: Option<&str>,
        deadline: Option<DateTime<Utc>>,
        who: Option<&str>,
        remind_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let mut updates = Vec::new();
        let mut values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();
        if let Some(d) = description {
            updates.push(format!("description = ?{}", values.len() + 1));
            values.push(Box::new(d.to_string()));
        }
        if let Some(d) = deadline {
            updates.push(format!("deadline = ?{}", values.len() + 1));
            values.push(Box::new(d.to_rfc3339()));
        }
        if let Some(w) = who {
            updates.push(format!("who = ?{}", values.len() + 1));
            values.push(Box::new(w.to_string()));
        }
        if let Some(r) = remind_at {
            updates.push(format!("remind_at = ?{}, remind_at_sent = NULL", values.len() + 1));
            values.push(Box::new(r.to_rfc3339()));
        }
        if updates.is_empty() {
            return Ok(());
        }
        let sql = format!(
            "UPDATE tasks SET {} WHERE id = ?{}",
            updates.join(", "),
            values.len() + 1
        );
        values.push(Box::new(id));
        let n = conn.execute(
            &sql,
            rusqlite::params_from_iter(values.iter().map(|v| v.as_ref())),
        )?;
        if n == 0 {
            return Err(StoreError::NotFound(format!("task #{id}")));
        }
        Ok(())
    }

    /// Active tasks whose reminder is due and not yet fired.
    pub fn due_reminders(&self, now: DateTime<Utc>) -> Result<Vec<Task>> {
        let conn = self.conn.lock().unwrap();
        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM tasks
             WHERE status = 'active' AND remind_at IS NOT NULL
               AND remind_at <= ?1 AND remind_at_sent IS NULL
             ORDER BY remind_at"
        );
        let mut stmt = conn.prepare_cached(&sql)?;
        let rows = stmt.query_map([now.to_rfc3339()], row_to_task)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Stamp the reminder as fired. Must happen before the notification goes
    /// out so a crash cannot double-fire.
    pub fn stamp_reminder_sent(&self, id: i64, now: DateTime<Utc>) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE tasks SET remind_at_sent = ?1 WHERE id = ?2",
            rusqlite::params![now.to_rfc3339(), id],
        )?;
        Ok(())
    }

    /// Active tracked tasks bound to a specific chat.
    pub fn tracked_for_chat(&self, chat_id: i64) -> Result<Vec<Task>> {
        let conn = self.conn.lock().unwrap();
        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM tasks
             WHERE status = 'active' AND track_completion = 1 AND chat_id = ?1"
        );
        let mut stmt = conn.prepare_cached(&sql)?;
        let rows = stmt.query_map([chat_id], row_to_task)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// All active tracked tasks (the scheduled 4×/day sweep).
    pub fn tracked_all(&self) -> Result<Vec<Task>> {
        let conn = self.conn.lock().unwrap();
        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM tasks
             WHERE status = 'active' AND track_completion = 1"
        );
        let mut stmt = conn.prepare_cached(&sql)?;
        let rows = stmt.query_map([], row_to_task)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    pub fn stamp_checked(&self, id: i64, now: DateTime<Utc>) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE tasks SET last_checked_at = ?1 WHERE id = ?2",
            rusqlite::params![now.to_rfc3339(), id],
        )?;
        Ok(())
    }

    /// Active tasks whose deadline falls inside [start, end).
    pub fn deadline_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Task>> {
        let conn = self.conn.lock().unwrap();
        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM tasks
             WHERE status = 'active' AND deadline IS NOT NULL
               AND deadline >= ?1 AND deadline < ?2
             ORDER BY deadline"
        );
        let mut stmt = conn.prepare_cached(&sql)?;
        let rows = stmt.query_map(
            rusqlite::params![start.to_rfc3339(), end.to_rfc3339()],
            row_to_task,
        )?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Bump and return the deadline-reminder count for a task on a given day.
    pub fn bump_deadline_notification(&self, task_id: i64, date: NaiveDate) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO deadline_notifications (task_id, date, count)
             VALUES (?1, ?2, 1)
             ON CONFLICT(task_id, date) DO UPDATE SET count = count + 1",
            rusqlite::params![task_id, date.to_string()],
        )?;
        let count = conn.query_row(
            "SELECT count FROM deadline_notifications WHERE task_id = ?1 AND date = ?2",
            rusqlite::params![task_id, date.to_string()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    pub fn completed_since(&self, since: DateTime<Utc>) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        let n = conn.query_row(
            "SELECT COUNT(*) FROM tasks WHERE status = 'done' AND completed_at >= ?1",
            [since.to_rfc3339()],
            |row| row.get(0),
        )?;
        Ok(n)
    }

    pub fn created_since(&self, since: DateTime<Utc>) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        let n = conn.query_row(
            "SELECT COUNT(*) FROM tasks WHERE created_at >= ?1",
            [since.to_rfc3339()],
            |row| row.get(0),
        )?;
        Ok(n)
    }
}

fn row_to_task(row: &rusqlite::Row<'_>) -> rusqlite::Result<Task> {
    let type_str: String = row.get(1)?;
    let status_str: String = row.get(15)?;
    let recurrence: Option<String> = row.get(7)?;
    Ok(Task {
        id: row.get(0)?,
        task_type: type_str.parse().unwrap_or(TaskType::Task),
        description: row.get(2)?,
        who: row.get(3)?,
        deadline: row.get::<_, Option<String>>(4)?.map(|s| parse_ts(&s)),
        remind_at: row.get::<_, Option<String>>(5)?.map(|s| parse_ts(&s)),
        remind_at_sent: row.get::<_, Option<String>>(6)?.map(|s| parse_ts(&s)),
        recurrence: recurrence.and_then(|s| s.parse::<Recurrence>().ok()),
        confidence: row.get(8)?,
        source: row.get(9)?,
        source_msg_id: row.get(10)?,
        chat_id: row.get(11)?,
        sender_id: row.get(12)?,
        sender_name: row.get(13)?,
        account: row.get(14)?,
        status: status_str.parse().unwrap_or(TaskStatus::Active),
        created_at: parse_ts(&row.get::<_, String>(16)?),
        completed_at: row.get::<_, Option<String>>(17)?.map(|s| parse_ts(&s)),
        track_completion: row.get::<_, i64>(18)? != 0,
        last_checked_at: row.get::<_, Option<String>>(19)?.map(|s| parse_ts(&s)),
        check_interval_days: row.get(20)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Store;

    fn new_task(description: &str) -> NewTask {
        NewTask {
            description: description.into(),
            confidence: 100,
            source: "test".into(),
            ..Default::default()
        }
    }

    #[test]
    fn similarity_is_symmetric_containment() {
        assert!(descriptions_similar("оплатить счёт 12345", "Оплатить счёт"));
        assert!(descriptions_similar("счёт", "оплатить счёт 12345"));
        assert!(!descriptions_similar("купить ремень", "оплатить счёт"));
        assert!(!descriptions_similar("", "оплатить счёт"));
    }

    #[test]
    fn similarity_only_looks_at_prefix() {
        let long_a = format!("{} хвост А", "x".repeat(50));
        let long_b = format!("{} хвост Б", "x".repeat(50));
        // Identical 50-char prefixes, different tails - still similar.
        assert!(descriptions_similar(&long_a, &long_b));
    }

    #[test]
    fn insert_and_get_round_trip() {
        let store = Store::open_in_memory().unwrap();
        let tasks = store.tasks();
        let mut new = new_task("позвонить подрядчику");
        new.track_completion = true;
        new.chat_id = Some(77);
        let task = tasks.insert(&new).unwrap();
        assert_eq!(task.status, TaskStatus::Active);
        assert!(task.track_completion);
        assert!(task.completed_at.is_none());
        let fetched = tasks.get(task.id).unwrap().unwrap();
        assert_eq!(fetched.description, "позвонить подрядчику");
    }

    #[test]
    fn done_sets_completed_at() {
        let store = Store::open_in_memory().unwrap();
        let tasks = store.tasks();
        let task = tasks.insert(&new_task("сделать отчёт")).unwrap();
        tasks.set_status(task.id, TaskStatus::Done).unwrap();
        let done = tasks.get(task.id).unwrap().unwrap();
        assert_eq!(done.status, TaskStatus::Done);
        assert!(done.completed_at.is_some());
        assert!(tasks.active().unwrap().is_empty());
    }

    #[test]
    fn due_reminders_respects_sent_stamp() {
        let store = Store::open_in_memory().unwrap();
        let tasks = store.tasks();
        let mut new = new_task("напомнить про ремень");
        new.remind_at = Some(Utc::now() - chrono::Duration::minutes(1));
        let task = tasks.insert(&new).unwrap();

        let due = tasks.due_reminders(Utc::now()).unwrap();
        assert_eq!(due.len(), 1);

        tasks.stamp_reminder_sent(task.id, Utc::now()).unwrap();
        assert!(tasks.due_reminders(Utc::now()).unwrap().is_empty());
    }

    #[test]
    fn postpone_shifts_deadline_and_rearms_reminder() {
        let store = Store::open_in_memory().unwrap();
        let tasks = store.tasks();
        let deadline = Utc::now();
        let mut new = new_task("перенести встречу");
        new.deadline = Some(deadline);
        new.remind_at = Some(deadline - chrono::Duration::hours(2));
        let task = tasks.insert(&new).unwrap();
        tasks.stamp_reminder_sent(task.id, Utc::now()).unwrap();

        tasks.postpone(task.id, 1).unwrap();
        let moved = tasks.get(task.id).unwrap().unwrap();
        let diff = moved.deadline.unwrap() - deadline;
        assert_eq!(diff.num_days(), 1);
        assert!(moved.remind_at_sent.is_none(), "postpone re-arms the reminder");
    }

    #[test]
    fn deadline_notification_counter_increments_per_day() {
        let store = Store::open_in_memory().unwrap();
        let tasks = store.tasks();
        let task = tasks.insert(&new_task("дедлайн сегодня")).unwrap();
        let today = Utc::now().date_naive();
        assert_eq!(tasks.bump_deadline_notification(task.id, today).unwrap(), 1);
        assert_eq!(tasks.bump_deadline_notification(task.id, today).unwrap(), 2);
    }

    #[test]
    fn tracked_queries_filter_by_chat() {
        let store = Store::open_in_memory().unwrap();
        let tasks = store.tasks();
        let mut a = new_task("отправить договор");
        a.track_completion = true;
        a.chat_id = Some(100);
        tasks.insert(&a).unwrap();
        let mut b = new_task("получить счёт");
        b.track_completion = true;
        b.chat_id = Some(200);
        tasks.insert(&b).unwrap();

        assert_eq!(tasks.tracked_for_chat(100).unwrap().len(), 1);
        assert_eq!(tasks.tracked_all().unwrap().len(), 2);
    }
}
