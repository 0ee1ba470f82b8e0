//! Memory tools: full-text search and per-chat summaries.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};

use adjutant_core::time::{format_local, owner_offset};
use adjutant_store::messages::MessageStore;

use super::{require_i64, require_str, Tool, ToolResult};

const DEFAULT_SEARCH_LIMIT: usize = 20;
const CHAT_SUMMARY_LIMIT: usize = 200;

pub struct SearchMemoryTool {
    messages: MessageStore,
    tz_offset_hours: i32,
}

impl SearchMemoryTool {
    pub fn new(messages: MessageStore, tz_offset_hours: i32) -> Self {
        Self {
            messages,
            tz_offset_hours,
        }
    }
}

#[async_trait]
impl Tool for SearchMemoryTool {
    fn name(&self) -> &str {
        "search_memory"
    }

    fn description(&self) -> &str {
        "Поиск по всей базе сообщений. Используй когда пользователь спрашивает: \
         'что писал Козлов', 'найди про оплату', 'когда обсуждали'. \
         Полнотекстовый поиск, при неудаче ищет по подстроке."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Поисковый запрос (ключевые слова)." },
                "limit": { "type": "integer", "description": "Максимум результатов (по умолчанию 20)." }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, input: Value) -> ToolResult {
        let query = match require_str(&input, "query") {
            Ok(q) => q,
            Err(e) => return e,
        };
        let limit = input
            .get("limit")
            .and_then(|v| v.as_u64())
            .map(|l| l as usize)
            .unwrap_or(DEFAULT_SEARCH_LIMIT);

        let hits = match self.messages.search(query, limit) {
            Ok(h) => h,
            Err(e) => return ToolResult::error(e.to_string()),
        };

        if hits.is_empty() {
            return ToolResult::json(json!({
                "status": "empty",
                "message": format!("Ничего не найдено по запросу: {query}"),
            }));
        }

        let messages: Vec<Value> = hits
            .iter()
            .map(|m| {
                json!({
                    "sender": m.sender_name,
                    "chat": m.chat_title,
                    "text": m.text.chars().take(500).collect::<String>(),
                    "date": format_local(m.timestamp, self.tz_offset_hours),
                })
            })
            .collect();

        ToolResult::json(json!({
            "status": "ok",
            "count": messages.len(),
            "messages": messages,
        }))
    }
}

pub struct GetChatSummaryTool {
    messages: MessageStore,
    tz_offset_hours: i32,
}

impl GetChatSummaryTool {
    pub fn new(messages: MessageStore, tz_offset_hours: i32) -> Self {
        Self {
            messages,
            tz_offset_hours,
        }
    }
}

#[async_trait]
impl Tool for GetChatSummaryTool {
    fn name(&self) -> &str {
        "get_chat_summary"
    }

    fn description(&self) -> &str {
        "Получить сводку по чату/группе за период. Используй когда: \
         'что обсуждали в Логистике', 'сводка по группе', 'что нового в канале'."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "chat_id": { "type": "integer", "description": "ID чата. Если не знаешь — используй search_memory." },
                "hours": { "type": "integer", "description": "За сколько часов (по умолчанию 24)." }
            },
            "required": ["chat_id"]
        })
    }

    async fn execute(&self, input: Value) -> ToolResult {
        let chat_id = match require_i64(&input, "chat_id") {
            Ok(id) => id,
            Err(e) => return e,
        };
        let hours = input.get("hours").and_then(|v| v.as_i64()).unwrap_or(24);

        let since = Utc::now() - chrono::Duration::hours(hours);
        let messages = match self
            .messages
            .since(since, Some(&[chat_id]), CHAT_SUMMARY_LIMIT)
        {
            Ok(m) => m,
            Err(e) => return ToolResult::error(e.to_string()),
        };

        if messages.is_empty() {
            return ToolResult::json(json!({
                "status": "empty",
                "message": format!("Нет сообщений за последние {hours}ч в этом чате."),
            }));
        }

        let offset = owner_offset(self.tz_offset_hours);
        let formatted: Vec<Value> = messages
            .iter()
            .map(|m| {
                json!({
                    "sender": m.sender_name,
                    "text": m.text.chars().take(300).collect::<String>(),
                    "time": m.timestamp.with_timezone(&offset).format("%H:%M").to_string(),
                })
            })
            .collect();

        ToolResult::json(json!({
            "status": "ok",
            "chat_id": chat_id,
            "chat_title": messages[0].chat_title,
            "period_hours": hours,
            "message_count": formatted.len(),
            "messages": formatted,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adjutant_store::messages::NewMessage;
    use adjutant_store::Store;

    fn seed(store: &Store) {
        store
            .messages()
            .save(&NewMessage {
                upstream_msg_id: 1,
                chat_id: -100,
                chat_title: "Логистика".into(),
                sender_id: 9,
                sender_name: "Козлов".into(),
                text: "оплата прошла, накладную скинул".into(),
                media_kind: None,
                timestamp: Utc::now(),
                account: "primary".into(),
            })
            .unwrap();
    }

    #[tokio::test]
    async fn search_finds_and_formats() {
        let store = Store::open_in_memory().unwrap();
        seed(&store);
        let tool = SearchMemoryTool::new(store.messages(), 7);
        let result = tool.execute(json!({"query": "оплата"})).await;
        let parsed: Value = serde_json::from_str(&result.content).unwrap();
        assert_eq!(parsed["status"], "ok");
        assert_eq!(parsed["messages"][0]["sender"], "Козлов");
    }

    #[tokio::test]
    async fn empty_search_reports_status() {
        let store = Store::open_in_memory().unwrap();
        let tool = SearchMemoryTool::new(store.messages(), 7);
        let result = tool.execute(json!({"query": "несуществующее"})).await;
        let parsed: Value = serde_json::from_str(&result.content).unwrap();
        assert_eq!(parsed["status"], "empty");
    }

    #[tokio::test]
    async fn chat_summary_respects_window() {
        let store = Store::open_in_memory().unwrap();
        seed(&store);
        let tool = GetChatSummaryTool::new(store.messages(), 7);

        let result = tool.execute(json!({"chat_id": -100, "hours": 24})).await;
        let parsed: Value = serde_json::from_str(&result.content).unwrap();
        assert_eq!(parsed["status"], "ok");
        assert_eq!(parsed["chat_title"], "Логистика");

        let result = tool.execute(json!({"chat_id": -999})).await;
        let parsed: Value = serde_json::from_str(&result.content).unwrap();
        assert_eq!(parsed["status"], "empty");
    }
}
