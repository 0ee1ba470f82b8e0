//! Tool system for the assistant's tool calling.
//!
//! Every tool is a pure function over the store with a strict schema. Results
//! go back to the model as JSON strings; validation failures return a
//! structured `{"error": …}` so the model can self-correct and the loop
//! continues.

pub mod memory;
pub mod settings;
pub mod tasks;

use async_trait::async_trait;

use adjutant_llm::ToolDefinition;

/// Result of executing a tool.
#[derive(Debug, Clone)]
pub struct ToolResult {
    /// JSON payload returned to the LLM.
    pub content: String,
    pub is_error: bool,
}

impl ToolResult {
    pub fn json(value: serde_json::Value) -> Self {
        Self {
            content: value.to_string(),
            is_error: false,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: serde_json::json!({ "error": message.into() }).to_string(),
            is_error: true,
        }
    }
}

/// Trait every tool implements.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn input_schema(&self) -> serde_json::Value;
    async fn execute(&self, input: serde_json::Value) -> ToolResult;
}

/// Convert a slice of tools to API-level definitions.
pub fn to_definitions(tools: &[Box<dyn Tool>]) -> Vec<ToolDefinition> {
    tools
        .iter()
        .map(|t| ToolDefinition {
            name: t.name().to_string(),
            description: t.description().to_string(),
            input_schema: t.input_schema(),
        })
        .collect()
}

/// Find and execute the named tool. Unknown names come back as an error
/// result, not a loop failure.
pub async fn execute_tool(
    tools: &[Box<dyn Tool>],
    name: &str,
    input: serde_json::Value,
) -> ToolResult {
    match tools.iter().find(|t| t.name() == name) {
        Some(tool) => tool.execute(input).await,
        None => ToolResult::error(format!("Неизвестный инструмент: {name}")),
    }
}

/// Parse a required string field from tool input.
pub(crate) fn require_str<'a>(input: &'a serde_json::Value, field: &str) -> Result<&'a str, ToolResult> {
    input
        .get(field)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ToolResult::error(format!("не указано обязательное поле '{field}'")))
}

/// Parse a required integer field from tool input.
pub(crate) fn require_i64(input: &serde_json::Value, field: &str) -> Result<i64, ToolResult> {
    input
        .get(field)
        .and_then(|v| v.as_i64())
        .ok_or_else(|| ToolResult::error(format!("не указано обязательное поле '{field}'")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unknown_tool_returns_structured_error() {
        let tools: Vec<Box<dyn Tool>> = Vec::new();
        let result = execute_tool(&tools, "fly_to_moon", serde_json::json!({})).await;
        assert!(result.is_error);
        let parsed: serde_json::Value = serde_json::from_str(&result.content).unwrap();
        assert!(parsed["error"].as_str().unwrap().contains("fly_to_moon"));
    }

    #[test]
    fn require_helpers_validate_presence() {
        let input = serde_json::json!({"description": "ремень", "task_id": 7});
        assert_eq!(require_str(&input, "description").unwrap(), "ремень");
        assert_eq!(require_i64(&input, "task_id").unwrap(), 7);
        assert!(require_str(&input, "missing").is_err());
        assert!(require_i64(&input, "description").is_err());
    }
}
