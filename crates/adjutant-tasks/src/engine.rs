use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use dashmap::DashMap;
use tracing::{debug, info, warn};

use adjutant_core::notify::NotifySender;
use adjutant_core::{AdjutantError, Result};
use adjutant_llm::LlmRouter;
use adjutant_store::messages::MessageStore;
use adjutant_store::tasks::TaskStore;
use adjutant_store::types::{NewTask, Task, TaskStatus};

/// Tolerance for reminders that arrive slightly in the past (clock skew,
/// slow LLM rounds). Anything older is bumped to fire immediately.
const REMIND_AT_PAST_TOLERANCE_SECS: i64 = 300;

/// Result of a create call.
#[derive(Debug, Clone)]
pub enum CreateOutcome {
    Created(Task),
    /// A matching active task already exists; nothing was inserted.
    Duplicate(Task),
}

impl CreateOutcome {
    pub fn task(&self) -> &Task {
        match self {
            CreateOutcome::Created(t) | CreateOutcome::Duplicate(t) => t,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, CreateOutcome::Created(_))
    }
}

/// Owns every task mutation. Components and tools call in; nothing else
/// writes task rows.
pub struct TaskEngine {
    pub(crate) tasks: TaskStore,
    pub(crate) messages: MessageStore,
    pub(crate) llm: Arc<LlmRouter>,
    pub(crate) notify: NotifySender,
    pub(crate) tz_offset_hours: i32,
    /// chat_id → last event-driven tracked check.
    pub(crate) track_debounce: DashMap<i64, Instant>,
}

impl TaskEngine {
    pub fn new(
        tasks: TaskStore,
        messages: MessageStore,
        llm: Arc<LlmRouter>,
        notify: NotifySender,
        tz_offset_hours: i32,
    ) -> Self {
        Self {
            tasks,
            messages,
            llm,
            notify,
            tz_offset_hours,
            track_debounce: DashMap::new(),
        }
    }

    /// Create a task unless an equivalent active one exists.
    ///
    /// Guarantees at most one concurrent active task per semantically
    /// equivalent description (50-char containment rule).
    pub fn create(&self, mut new: NewTask) -> Result<CreateOutcome> {
        if let Some(existing) = self
            .tasks
            .find_similar_active(&new.description)
            .map_err(AdjutantError::from)?
        {
            info!(
                task_id = existing.id,
                description = %truncate(&new.description, 60),
                "duplicate task skipped"
            );
            return Ok(CreateOutcome::Duplicate(existing));
        }

        new.confidence = new.confidence.clamp(0, 100);

        // A reminder slightly in the past still fires; anything older than the
        // tolerance is pulled up to now so it fires on the next scan.
        if let Some(remind_at) = new.remind_at {
            let age = Utc::now() - remind_at;
            if age.num_seconds() > REMIND_AT_PAST_TOLERANCE_SECS {
                debug!(seconds_past = age.num_seconds(), "remind_at in the past — firing now");
                new.remind_at = Some(Utc::now());
            }
        }

        // Completion tracking needs a chat to watch.
        if new.track_completion && new.chat_id.is_none() {
            warn!("track_completion requested without chat_id — disabled");
            new.track_completion = false;
        }

        let task = self.tasks.insert(&new).map_err(AdjutantError::from)?;
        info!(task_id = task.id, confidence = task.confidence, "task created");
        Ok(CreateOutcome::Created(task))
    }

    /// Mark a task done. A recurring task is closed and respawned with the
    /// next occurrence's deadline and reminder.
    pub fn complete(&self, id: i64) -> Result<Task> {
        let task = self.require_active(id)?;
        self.tasks
            .set_status(id, TaskStatus::Done)
            .map_err(AdjutantError::from)?;
        info!(task_id = id, "task completed");

        if let Some(recurrence) = task.recurrence {
            let respawn = NewTask {
                task_type: Some(task.task_type),
                description: task.description.clone(),
                who: task.who.clone(),
                deadline: task.deadline.map(|d| recurrence.advance(d)),
                remind_at: task.remind_at.map(|r| recurrence.advance(r)),
                recurrence: Some(recurrence),
                confidence: task.confidence,
                source: "recurrence".to_string(),
                source_msg_id: task.source_msg_id,
                chat_id: task.chat_id,
                sender_id: task.sender_id,
                sender_name: task.sender_name.clone(),
                account: task.account.clone(),
                track_completion: task.track_completion,
            };
            let next = self.tasks.insert(&respawn).map_err(AdjutantError::from)?;
            info!(task_id = id, next_id = next.id, %recurrence, "recurring task respawned");
        }

        // Return the closed row.
        self.tasks
            .get(id)
            .map_err(AdjutantError::from)?
            .ok_or(AdjutantError::TaskNotFound { id })
    }

    pub fn cancel(&self, id: i64) -> Result<Task> {
        let _ = self.require_active(id)?;
        self.tasks
            .set_status(id, TaskStatus::Cancelled)
            .map_err(AdjutantError::from)?;
        info!(task_id = id, "task cancelled");
        self.tasks
            .get(id)
            .map_err(AdjutantError::from)?
            .ok_or(AdjutantError::TaskNotFound { id })
    }

    /// Move deadline and reminder forward by whole days.
    pub fn postpone(&self, id: i64, days: i64) -> Result<Task> {
        let _ = self.require_active(id)?;
        self.tasks.postpone(id, days).map_err(AdjutantError::from)?;
        info!(task_id = id, days, "task postponed");
        self.tasks
            .get(id)
            .map_err(AdjutantError::from)?
            .ok_or(AdjutantError::TaskNotFound { id })
    }

    pub fn update(
        &self,
        id: i64,
        description: Option<&str>,
        deadline: Option<chrono::DateTime<Utc>>,
        who: Option<&str>,
        remind_at: Option<chrono::DateTime<Utc>>,
    ) -> Result<Task> {
        let _ = self.require_active(id)?;
        self.tasks
            .update_fields(id, description, deadline, who, remind_at)
            .map_err(AdjutantError::from)?;
        self.tasks
            .get(id)
            .map_err(AdjutantError::from)?
            .ok_or(AdjutantError::TaskNotFound { id })
    }

    pub fn active(&self) -> Result<Vec<Task>> {
        self.tasks.active().map_err(AdjutantError::from)
    }

    pub fn get(&self, id: i64) -> Result<Option<Task>> {
        self.tasks.get(id).map_err(AdjutantError::from)
    }

    pub fn find_by_source_msg(&self, source_msg_id: i64) -> Result<Option<Task>> {
        self.tasks
            .find_by_source_msg(source_msg_id)
            .map_err(AdjutantError::from)
    }

    pub fn completed_count_since(&self, since: chrono::DateTime<Utc>) -> Result<i64> {
        self.tasks.completed_since(since).map_err(AdjutantError::from)
    }

    pub fn created_count_since(&self, since: chrono::DateTime<Utc>) -> Result<i64> {
        self.tasks.created_since(since).map_err(AdjutantError::from)
    }

    fn require_active(&self, id: i64) -> Result<Task> {
        match self.tasks.get(id).map_err(AdjutantError::from)? {
            Some(task) if task.status == TaskStatus::Active => Ok(task),
            _ => Err(AdjutantError::TaskNotFound { id }),
        }
    }
}

pub(crate) fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        s.chars().take(max_chars).collect::<String>() + "…"
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    use super::*;
    use adjutant_core::config::LlmConfig;
    use adjutant_store::Store;

    pub fn engine() -> (TaskEngine, tokio::sync::mpsc::Receiver<adjutant_core::notify::Notification>)
    {
        let store = Store::open_in_memory().unwrap();
        let (notify, rx) = NotifySender::channel(32);
        let llm = Arc::new(LlmRouter::new(
            &LlmConfig::default(),
            store.settings(),
            notify.clone(),
        ));
        (
            TaskEngine::new(store.tasks(), store.messages(), llm, notify, 7),
            rx,
        )
    }

    pub fn plain_task(description: &str) -> NewTask {
        NewTask {
            description: description.into(),
            confidence: 100,
            source: "test".into(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testutil::{engine, plain_task};
    use super::*;
    use adjutant_store::types::Recurrence;

    #[test]
    fn create_then_duplicate_returns_existing() {
        let (engine, _rx) = engine();
        let first = engine.create(plain_task("напомни про ремень")).unwrap();
        assert!(first.is_created());

        let second = engine.create(plain_task("Напомни про ремень")).unwrap();
        assert!(!second.is_created());
        assert_eq!(second.task().id, first.task().id);
        assert_eq!(engine.active().unwrap().len(), 1);
    }

    #[test]
    fn confidence_is_clamped() {
        let (engine, _rx) = engine();
        let mut new = plain_task("проверить почту");
        new.confidence = 250;
        let outcome = engine.create(new).unwrap();
        assert_eq!(outcome.task().confidence, 100);
    }

    #[test]
    fn stale_remind_at_is_pulled_to_now() {
        let (engine, _rx) = engine();
        let mut new = plain_task("давно пора");
        new.remind_at = Some(Utc::now() - chrono::Duration::hours(2));
        let outcome = engine.create(new).unwrap();
        let remind_at = outcome.task().remind_at.unwrap();
        assert!(Utc::now() - remind_at < chrono::Duration::seconds(10));
    }

    #[test]
    fn tracking_without_chat_is_disabled() {
        let (engine, _rx) = engine();
        let mut new = plain_task("отправить договор");
        new.track_completion = true;
        let outcome = engine.create(new).unwrap();
        assert!(!outcome.task().track_completion);
    }

    #[test]
    fn complete_respawns_recurring_task() {
        let (engine, _rx) = engine();
        let mut new = plain_task("еженедельный отчёт");
        new.recurrence = Some(Recurrence::Weekly);
        new.deadline = Some(Utc::now());
        let task = match engine.create(new).unwrap() {
            CreateOutcome::Created(t) => t,
            other => panic!("expected created, got {other:?}"),
        };

        let closed = engine.complete(task.id).unwrap();
        assert_eq!(closed.status, TaskStatus::Done);
        assert!(closed.completed_at.is_some());

        let active = engine.active().unwrap();
        assert_eq!(active.len(), 1, "exactly one respawned task");
        let respawned = &active[0];
        assert_ne!(respawned.id, task.id);
        let diff = respawned.deadline.unwrap() - task.deadline.unwrap();
        assert_eq!(diff.num_days(), 7);
    }

    #[test]
    fn complete_non_recurring_leaves_nothing_active() {
        let (engine, _rx) = engine();
        let task = engine
            .create(plain_task("разовая задача"))
            .unwrap()
            .task()
            .clone();
        engine.complete(task.id).unwrap();
        assert!(engine.active().unwrap().is_empty());
    }

    #[test]
    fn mutations_on_missing_task_fail() {
        let (engine, _rx) = engine();
        assert!(engine.complete(999).is_err());
        assert!(engine.cancel(999).is_err());
        assert!(engine.postpone(999, 1).is_err());
    }

    #[test]
    fn terminal_states_reject_further_mutations() {
        let (engine, _rx) = engine();
        let task = engine.create(plain_task("задача")).unwrap().task().clone();
        engine.cancel(task.id).unwrap();
        assert!(engine.complete(task.id).is_err(), "cancelled is terminal");
    }
}
