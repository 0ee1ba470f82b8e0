//! Settings tools: whitelist management and owner preferences.

use async_trait::async_trait;
use serde_json::{json, Value};

use adjutant_store::settings::{
    SettingsStore, KEY_PREF_ADDRESS, KEY_PREF_EMOJI, KEY_PREF_STYLE, KEY_WHITELIST,
};

use super::{require_str, Tool, ToolResult};

pub struct ManageWhitelistTool {
    settings: SettingsStore,
}

impl ManageWhitelistTool {
    pub fn new(settings: SettingsStore) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl Tool for ManageWhitelistTool {
    fn name(&self) -> &str {
        "manage_whitelist"
    }

    fn description(&self) -> &str {
        "Управление whitelist чатов для мониторинга. \
         Используй когда: 'добавь этот канал', 'убери из мониторинга', 'покажи whitelist'."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action": {
                    "type": "string",
                    "enum": ["list", "add", "remove"],
                    "description": "list — показать, add — добавить, remove — убрать."
                },
                "chat_id": { "type": "integer", "description": "ID чата (для add/remove)." }
            },
            "required": ["action"]
        })
    }

    async fn execute(&self, input: Value) -> ToolResult {
        let action = match require_str(&input, "action") {
            Ok(a) => a,
            Err(e) => return e,
        };
        let chat_id = input.get("chat_id").and_then(|v| v.as_i64());

        match action {
            "list" => match self.settings.whitelist() {
                Ok(list) => ToolResult::json(json!({
                    "status": "ok",
                    "whitelist": list,
                    "count": list.len(),
                })),
                Err(e) => ToolResult::error(e.to_string()),
            },
            "add" => {
                let Some(id) = chat_id else {
                    return ToolResult::error("Не указан chat_id для добавления.");
                };
                match self.settings.list_add(KEY_WHITELIST, id) {
                    Ok(true) => ToolResult::json(json!({"status": "added", "chat_id": id})),
                    Ok(false) => ToolResult::json(json!({
                        "status": "already_exists",
                        "message": format!("Чат {id} уже в whitelist."),
                    })),
                    Err(e) => ToolResult::error(e.to_string()),
                }
            }
            "remove" => {
                let Some(id) = chat_id else {
                    return ToolResult::error("Не указан chat_id для удаления.");
                };
                match self.settings.list_remove(KEY_WHITELIST, id) {
                    Ok(true) => ToolResult::json(json!({"status": "removed", "chat_id": id})),
                    Ok(false) => ToolResult::json(json!({
                        "status": "not_found",
                        "message": format!("Чат {id} не в whitelist."),
                    })),
                    Err(e) => ToolResult::error(e.to_string()),
                }
            }
            other => ToolResult::error(format!("Неизвестное действие: {other}")),
        }
    }
}

pub struct UpdatePreferencesTool {
    settings: SettingsStore,
}

impl UpdatePreferencesTool {
    pub fn new(settings: SettingsStore) -> Self {
        Self { settings }
    }

    /// Whitelisted preference keys and their allowed values.
    fn setting_key(key: &str, value: &str) -> Option<&'static str> {
        match key {
            "address" if matches!(value, "ты" | "вы") => Some(KEY_PREF_ADDRESS),
            "style" if matches!(value, "formal" | "casual" | "business-casual") => {
                Some(KEY_PREF_STYLE)
            }
            "emoji" if matches!(value, "true" | "false") => Some(KEY_PREF_EMOJI),
            _ => None,
        }
    }
}

#[async_trait]
impl Tool for UpdatePreferencesTool {
    fn name(&self) -> &str {
        "update_preferences"
    }

    fn description(&self) -> &str {
        "Сохранить персональную настройку общения навсегда. Используй когда пользователь \
         просит изменить обращение (ты/вы), стиль или использование emoji. \
         НЕ просто отвечай 'понял' — сохрани через этот инструмент."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "key": {
                    "type": "string",
                    "enum": ["address", "style", "emoji"],
                    "description": "address — обращение (ты/вы), style — стиль, emoji — использовать ли emoji."
                },
                "value": {
                    "type": "string",
                    "description": "address: ты|вы; style: formal|casual|business-casual; emoji: true|false."
                }
            },
            "required": ["key", "value"]
        })
    }

    async fn execute(&self, input: Value) -> ToolResult {
        let key = match require_str(&input, "key") {
            Ok(k) => k,
            Err(e) => return e,
        };
        let value = match require_str(&input, "value") {
            Ok(v) => v,
            Err(e) => return e,
        };

        let Some(setting_key) = Self::setting_key(key, value) else {
            return ToolResult::error(format!("Недопустимая настройка: {key}={value}"));
        };

        match self.settings.set(setting_key, value) {
            Ok(()) => ToolResult::json(json!({"status": "saved", "key": key, "value": value})),
            Err(e) => ToolResult::error(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adjutant_store::Store;

    #[tokio::test]
    async fn whitelist_actions_round_trip() {
        let store = Store::open_in_memory().unwrap();
        let tool = ManageWhitelistTool::new(store.settings());

        let result = tool.execute(json!({"action": "add", "chat_id": -100500})).await;
        assert!(result.content.contains("added"));

        let result = tool.execute(json!({"action": "list"})).await;
        let parsed: Value = serde_json::from_str(&result.content).unwrap();
        assert_eq!(parsed["count"], 1);

        let result = tool.execute(json!({"action": "remove", "chat_id": -100500})).await;
        assert!(result.content.contains("removed"));
    }

    #[tokio::test]
    async fn whitelist_add_requires_chat_id() {
        let store = Store::open_in_memory().unwrap();
        let tool = ManageWhitelistTool::new(store.settings());
        let result = tool.execute(json!({"action": "add"})).await;
        assert!(result.is_error);
    }

    #[tokio::test]
    async fn preferences_accept_only_whitelisted_pairs() {
        let store = Store::open_in_memory().unwrap();
        let tool = UpdatePreferencesTool::new(store.settings());

        let ok = tool.execute(json!({"key": "address", "value": "вы"})).await;
        assert!(!ok.is_error);
        assert_eq!(store.settings().get(KEY_PREF_ADDRESS, "ты").unwrap(), "вы");

        let bad = tool.execute(json!({"key": "address", "value": "сударь"})).await;
        assert!(bad.is_error);

        let bad = tool.execute(json!({"key": "volume", "value": "11"})).await;
        assert!(bad.is_error);
    }
}
