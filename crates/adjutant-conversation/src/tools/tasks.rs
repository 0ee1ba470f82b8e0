//! Task tools: create, list, complete, cancel, update.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde_json::{json, Value};

use adjutant_core::time::owner_offset;
use adjutant_store::types::{Recurrence, Task, TaskType};
use adjutant_tasks::{CreateOutcome, TaskEngine};

use super::{require_i64, require_str, Tool, ToolResult};

fn task_json(task: &Task, tz_offset_hours: i32) -> Value {
    let offset = owner_offset(tz_offset_hours);
    let mut obj = json!({
        "id": task.id,
        "type": task.task_type.to_string(),
        "description": task.description,
        "who": task.who,
        "created_at": task.created_at.with_timezone(&offset).format("%d.%m.%Y").to_string(),
    });
    if let Some(deadline) = task.deadline {
        obj["deadline"] = json!(deadline.with_timezone(&offset).format("%d.%m.%Y").to_string());
    }
    if let Some(remind_at) = task.remind_at {
        obj["remind_at"] = json!(remind_at.with_timezone(&offset).format("%d.%m.%Y %H:%M").to_string());
    }
    obj
}

/// Parse "YYYY-MM-DD" into a UTC midnight instant.
fn parse_deadline(s: &str) -> Option<chrono::DateTime<Utc>> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

/// Parse "YYYY-MM-DDTHH:MM" given in the owner's local zone.
fn parse_local_datetime(s: &str, tz_offset_hours: i32) -> Option<chrono::DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S"))
        .ok()?;
    owner_offset(tz_offset_hours)
        .from_local_datetime(&naive)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}

pub struct CreateTaskTool {
    engine: Arc<TaskEngine>,
    tz_offset_hours: i32,
}

impl CreateTaskTool {
    pub fn new(engine: Arc<TaskEngine>, tz_offset_hours: i32) -> Self {
        Self {
            engine,
            tz_offset_hours,
        }
    }
}

#[async_trait]
impl Tool for CreateTaskTool {
    fn name(&self) -> &str {
        "create_task"
    }

    fn description(&self) -> &str {
        "Создать задачу или напоминание. Используй когда пользователь явно просит: \
         'напомни', 'запиши', 'зафиксируй', 'создай задачу'. \
         НЕ создавай задачу если пользователь просто делится информацией."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "description": {
                    "type": "string",
                    "description": "Описание задачи. Копируй формулировку пользователя, не перефразируй."
                },
                "task_type": {
                    "type": "string",
                    "enum": ["task", "promise_mine", "promise_incoming"],
                    "description": "task — обычная задача/напоминание, promise_mine — я пообещал, promise_incoming — мне пообещали"
                },
                "deadline": {
                    "type": "string",
                    "description": "Дедлайн в формате YYYY-MM-DD. Если 'завтра' — вычисли дату. Если не указан — null."
                },
                "remind_at": {
                    "type": "string",
                    "description": "Время напоминания YYYY-MM-DDTHH:MM в часовом поясе владельца."
                },
                "recurrence": {
                    "type": "string",
                    "enum": ["daily", "weekly", "monthly"],
                    "description": "Повторение задачи, если просят напоминать регулярно."
                },
                "who": {
                    "type": "string",
                    "description": "Кто должен выполнить (имя). Если задача для самого пользователя — null."
                }
            },
            "required": ["description", "task_type"]
        })
    }

    async fn execute(&self, input: Value) -> ToolResult {
        let description = match require_str(&input, "description") {
            Ok(d) => d,
            Err(e) => return e,
        };
        let task_type = input
            .get("task_type")
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse::<TaskType>().ok())
            .unwrap_or(TaskType::Task);

        let deadline = match input.get("deadline").and_then(|v| v.as_str()) {
            Some(s) if !s.is_empty() => match parse_deadline(s) {
                Some(d) => Some(d),
                None => {
                    return ToolResult::error(format!(
                        "Некорректный формат даты: {s}. Нужен YYYY-MM-DD."
                    ))
                }
            },
            _ => None,
        };

        let remind_at = match input.get("remind_at").and_then(|v| v.as_str()) {
            Some(s) if !s.is_empty() => match parse_local_datetime(s, self.tz_offset_hours) {
                Some(r) => Some(r),
                None => {
                    return ToolResult::error(format!(
                        "Некорректное время напоминания: {s}. Нужен YYYY-MM-DDTHH:MM."
                    ))
                }
            },
            _ => None,
        };

        let recurrence = input
            .get("recurrence")
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse::<Recurrence>().ok());

        let outcome = match self.engine.create(adjutant_store::types::NewTask {
            task_type: Some(task_type),
            description: description.to_string(),
            who: input.get("who").and_then(|v| v.as_str()).map(String::from),
            deadline,
            remind_at,
            recurrence,
            confidence: 100,
            source: "owner_dialog".to_string(),
            ..Default::default()
        }) {
            Ok(outcome) => outcome,
            Err(e) => return ToolResult::error(e.to_string()),
        };

        match outcome {
            CreateOutcome::Created(task) => ToolResult::json(json!({
                "status": "created",
                "task_id": task.id,
                "task": task_json(&task, self.tz_offset_hours),
            })),
            CreateOutcome::Duplicate(existing) => ToolResult::json(json!({
                "status": "duplicate",
                "message": "Похожая задача уже существует.",
                "existing_task": task_json(&existing, self.tz_offset_hours),
            })),
        }
    }
}

pub struct ListTasksTool {
    engine: Arc<TaskEngine>,
    tz_offset_hours: i32,
}

impl ListTasksTool {
    pub fn new(engine: Arc<TaskEngine>, tz_offset_hours: i32) -> Self {
        Self {
            engine,
            tz_offset_hours,
        }
    }
}

#[async_trait]
impl Tool for ListTasksTool {
    fn name(&self) -> &str {
        "list_tasks"
    }

    fn description(&self) -> &str {
        "Показать активные задачи. Используй когда пользователь спрашивает: \
         'какие задачи', 'что на сегодня', 'что в работе', 'список дел'."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "filter_type": {
                    "type": "string",
                    "enum": ["all", "task", "promise_mine", "promise_incoming"],
                    "description": "Фильтр по типу. По умолчанию all."
                }
            }
        })
    }

    async fn execute(&self, input: Value) -> ToolResult {
        let tasks = match self.engine.active() {
            Ok(t) => t,
            Err(e) => return ToolResult::error(e.to_string()),
        };
        let filter = input
            .get("filter_type")
            .and_then(|v| v.as_str())
            .unwrap_or("all");
        let filtered: Vec<&Task> = tasks
            .iter()
            .filter(|t| filter == "all" || t.task_type.to_string() == filter)
            .collect();

        if filtered.is_empty() {
            return ToolResult::json(json!({
                "status": "empty",
                "message": "Активных задач нет.",
                "tasks": [],
            }));
        }

        ToolResult::json(json!({
            "status": "ok",
            "count": filtered.len(),
            "tasks": filtered
                .iter()
                .map(|t| task_json(t, self.tz_offset_hours))
                .collect::<Vec<_>>(),
        }))
    }
}

pub struct CompleteTaskTool {
    engine: Arc<TaskEngine>,
}

impl CompleteTaskTool {
    pub fn new(engine: Arc<TaskEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl Tool for CompleteTaskTool {
    fn name(&self) -> &str {
        "complete_task"
    }

    fn description(&self) -> &str {
        "Отметить задачу как выполненную. Используй когда пользователь говорит: \
         'сделано', 'выполнено', 'готово' — и из контекста понятно какая задача."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "task_id": { "type": "integer", "description": "ID задачи из списка задач." }
            },
            "required": ["task_id"]
        })
    }

    async fn execute(&self, input: Value) -> ToolResult {
        let task_id = match require_i64(&input, "task_id") {
            Ok(id) => id,
            Err(e) => return e,
        };
        match self.engine.complete(task_id) {
            Ok(task) => ToolResult::json(json!({
                "status": "completed",
                "task_id": task.id,
                "description": task.description,
            })),
            Err(_) => ToolResult::error(format!("Задача #{task_id} не найдена или уже завершена.")),
        }
    }
}

pub struct CancelTaskTool {
    engine: Arc<TaskEngine>,
}

impl CancelTaskTool {
    pub fn new(engine: Arc<TaskEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl Tool for CancelTaskTool {
    fn name(&self) -> &str {
        "cancel_task"
    }

    fn description(&self) -> &str {
        "Удалить/отменить задачу. Используй когда пользователь говорит: \
         'убери', 'удали', 'отмени задачу'."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "task_id": { "type": "integer", "description": "ID задачи для отмены." }
            },
            "required": ["task_id"]
        })
    }

    async fn execute(&self, input: Value) -> ToolResult {
        let task_id = match require_i64(&input, "task_id") {
            Ok(id) => id,
            Err(e) => return e,
        };
        match self.engine.cancel(task_id) {
            Ok(task) => ToolResult::json(json!({
                "status": "cancelled",
                "task_id": task.id,
                "description": task.description,
            })),
            Err(_) => ToolResult::error(format!("Задача #{task_id} не найдена или уже завершена.")),
        }
    }
}

pub struct UpdateTaskTool {
    engine: Arc<TaskEngine>,
    tz_offset_hours: i32,
}

impl UpdateTaskTool {
    pub fn new(engine: Arc<TaskEngine>, tz_offset_hours: i32) -> Self {
        Self {
            engine,
            tz_offset_hours,
        }
    }
}

#[async_trait]
impl Tool for UpdateTaskTool {
    fn name(&self) -> &str {
        "update_task"
    }

    fn description(&self) -> &str {
        "Изменить задачу — описание, дедлайн, время напоминания или ответственного. \
         Используй когда: 'перенеси на 20-е', 'поменяй описание'."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "task_id": { "type": "integer", "description": "ID задачи." },
                "new_description": { "type": "string", "description": "Новое описание (если меняется)." },
                "new_deadline": { "type": "string", "description": "Новый дедлайн YYYY-MM-DD (если меняется)." },
                "new_remind_at": { "type": "string", "description": "Новое время напоминания YYYY-MM-DDTHH:MM (если меняется)." },
                "new_who": { "type": "string", "description": "Новый ответственный (если меняется)." }
            },
            "required": ["task_id"]
        })
    }

    async fn execute(&self, input: Value) -> ToolResult {
        let task_id = match require_i64(&input, "task_id") {
            Ok(id) => id,
            Err(e) => return e,
        };

        let description = input.get("new_description").and_then(|v| v.as_str());
        let who = input.get("new_who").and_then(|v| v.as_str());

        let deadline = match input.get("new_deadline").and_then(|v| v.as_str()) {
            Some(s) if !s.is_empty() => match parse_deadline(s) {
                Some(d) => Some(d),
                None => return ToolResult::error(format!("Некорректная дата: {s}")),
            },
            _ => None,
        };
        let remind_at = match input.get("new_remind_at").and_then(|v| v.as_str()) {
            Some(s) if !s.is_empty() => match parse_local_datetime(s, self.tz_offset_hours) {
                Some(r) => Some(r),
                None => return ToolResult::error(format!("Некорректное время: {s}")),
            },
            _ => None,
        };

        if description.is_none() && who.is_none() && deadline.is_none() && remind_at.is_none() {
            return ToolResult::error("Нечего обновлять — не указаны новые значения.");
        }

        match self
            .engine
            .update(task_id, description, deadline, who, remind_at)
        {
            Ok(task) => ToolResult::json(json!({
                "status": "updated",
                "task_id": task.id,
                "task": task_json(&task, self.tz_offset_hours),
            })),
            Err(_) => ToolResult::error(format!("Задача #{task_id} не найдена или уже завершена.")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adjutant_core::config::LlmConfig;
    use adjutant_core::notify::NotifySender;
    use adjutant_llm::LlmRouter;
    use adjutant_store::Store;

    fn engine() -> (Arc<TaskEngine>, Store) {
        let store = Store::open_in_memory().unwrap();
        let (notify, _rx) = NotifySender::channel(8);
        let llm = Arc::new(LlmRouter::new(
            &LlmConfig::default(),
            store.settings(),
            notify.clone(),
        ));
        let engine = Arc::new(TaskEngine::new(
            store.tasks(),
            store.messages(),
            llm,
            notify,
            7,
        ));
        (engine, store)
    }

    #[tokio::test]
    async fn create_then_duplicate_round_trip() {
        let (engine, _store) = engine();
        let tool = CreateTaskTool::new(engine.clone(), 7);

        // A reminder tomorrow at 11:00 owner-local; must render back as 11:00.
        let tomorrow = (Utc::now() + chrono::Duration::days(1))
            .with_timezone(&owner_offset(7))
            .date_naive();
        let result = tool
            .execute(json!({
                "description": "ремень",
                "task_type": "task",
                "remind_at": format!("{tomorrow}T11:00"),
            }))
            .await;
        assert!(!result.is_error);
        let parsed: Value = serde_json::from_str(&result.content).unwrap();
        assert_eq!(parsed["status"], "created");
        assert!(parsed["task"]["remind_at"]
            .as_str()
            .unwrap()
            .contains("11:00"));

        let result = tool
            .execute(json!({"description": "ремень", "task_type": "task"}))
            .await;
        let parsed: Value = serde_json::from_str(&result.content).unwrap();
        assert_eq!(parsed["status"], "duplicate");
        assert!(parsed["existing_task"]["id"].is_i64());
    }

    #[tokio::test]
    async fn create_rejects_bad_deadline() {
        let (engine, _store) = engine();
        let tool = CreateTaskTool::new(engine, 7);
        let result = tool
            .execute(json!({"description": "x", "task_type": "task", "deadline": "завтра"}))
            .await;
        assert!(result.is_error);
    }

    #[tokio::test]
    async fn list_filters_by_type() {
        let (engine, _store) = engine();
        let create = CreateTaskTool::new(engine.clone(), 7);
        create
            .execute(json!({"description": "обычная", "task_type": "task"}))
            .await;
        create
            .execute(json!({"description": "обещал отчёт", "task_type": "promise_mine"}))
            .await;

        let list = ListTasksTool::new(engine, 7);
        let all: Value =
            serde_json::from_str(&list.execute(json!({})).await.content).unwrap();
        assert_eq!(all["count"], 2);

        let promises: Value = serde_json::from_str(
            &list
                .execute(json!({"filter_type": "promise_mine"}))
                .await
                .content,
        )
        .unwrap();
        assert_eq!(promises["count"], 1);
    }

    #[tokio::test]
    async fn complete_missing_task_is_an_error_result() {
        let (engine, _store) = engine();
        let tool = CompleteTaskTool::new(engine);
        let result = tool.execute(json!({"task_id": 404})).await;
        assert!(result.is_error);
        assert!(result.content.contains("404"));
    }

    #[tokio::test]
    async fn update_requires_at_least_one_field() {
        let (engine, _store) = engine();
        let create = CreateTaskTool::new(engine.clone(), 7);
        let created: Value = serde_json::from_str(
            &create
                .execute(json!({"description": "правки", "task_type": "task"}))
                .await
                .content,
        )
        .unwrap();
        let id = created["task_id"].as_i64().unwrap();

        let update = UpdateTaskTool::new(engine, 7);
        let result = update.execute(json!({"task_id": id})).await;
        assert!(result.is_error);

        let result = update
            .execute(json!({"task_id": id, "new_deadline": "2026-03-01"}))
            .await;
        assert!(!result.is_error);
    }
}
