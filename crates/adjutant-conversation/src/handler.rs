//! The bounded tool-use loop.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tracing::{info, warn};

use adjutant_core::Result;
use adjutant_llm::{ChatRequest, LlmRouter, SystemPrompt};
use adjutant_store::conversation::ConversationStore;
use adjutant_store::messages::MessageStore;
use adjutant_store::settings::SettingsStore;
use adjutant_store::types::{ConversationTurn, TurnRole};

use crate::context::{DynamicContext, ASSISTANT_SYSTEM_PROMPT};
use crate::tools::{execute_tool, to_definitions, Tool};

/// Maximum tool rounds per owner message.
const MAX_TOOL_ROUNDS: usize = 5;
/// How long a turn stays in the rolling history before compaction.
const HISTORY_MAX_AGE_HOURS: i64 = 24;

const TOO_MANY_STEPS: &str = "(Превышен лимит обработки. Попробуй переформулировать.)";
const NO_ANSWER: &str = "(модель не дала ответа)";

/// What the loop produced for one owner message.
#[derive(Debug)]
pub struct TurnOutcome {
    pub text: String,
    /// True when `list_tasks` ran - the bot attaches the review grid.
    pub listed_tasks: bool,
}

pub struct ConversationHandler {
    conversation: ConversationStore,
    messages: MessageStore,
    settings: SettingsStore,
    llm: Arc<LlmRouter>,
    tools: Vec<Box<dyn Tool>>,
    dynamic: DynamicContext,
    owner_id: i64,
    window: usize,
}

impl ConversationHandler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        conversation: ConversationStore,
        messages: MessageStore,
        settings: SettingsStore,
        llm: Arc<LlmRouter>,
        tools: Vec<Box<dyn Tool>>,
        dynamic: DynamicContext,
        owner_id: i64,
        window: usize,
    ) -> Self {
        Self {
            conversation,
            messages,
            settings,
            llm,
            tools,
            dynamic,
            owner_id,
            window,
        }
    }

    /// Handle one free-text owner message.
    pub async fn handle_text(&self, text: &str) -> Result<TurnOutcome> {
        self.conversation.append(TurnRole::User, text, None)?;
        let history = self.conversation.recent(self.window)?;

        let system_prompt = SystemPrompt::new(
            ASSISTANT_SYSTEM_PROMPT,
            self.dynamic
                .build(&self.messages, &self.settings, self.owner_id)?,
        );

        let mut raw_messages = history_to_raw(&history);
        let tool_definitions = to_definitions(&self.tools);

        let mut listed_tasks = false;
        let mut tool_log: Vec<serde_json::Value> = Vec::new();
        let mut final_text: Option<String> = None;

        for round in 0..MAX_TOOL_ROUNDS {
            let req = ChatRequest {
                model: self.llm.assistant_model().to_string(),
                system: system_prompt.to_plain_text(),
                system_prompt: Some(system_prompt.clone()),
                messages: Vec::new(),
                max_tokens: 4096,
                tools: tool_definitions.clone(),
                raw_messages: Some(raw_messages.clone()),
            };

            let response = self
                .llm
                .send_api(&req)
                .await
                .map_err(adjutant_core::AdjutantError::from)?;

            match response.stop_reason.as_str() {
                "end_turn" => {
                    final_text = Some(response.content);
                    break;
                }
                "tool_use" if !response.tool_calls.is_empty() => {
                    // Echo the assistant turn (text + tool_use blocks) back
                    // into the history, then execute each call in order.
                    let mut assistant_content = Vec::new();
                    if !response.content.is_empty() {
                        assistant_content.push(json!({"type": "text", "text": response.content}));
                    }
                    for call in &response.tool_calls {
                        assistant_content.push(json!({
                            "type": "tool_use",
                            "id": call.id,
                            "name": call.name,
                            "input": call.input,
                        }));
                    }
                    raw_messages.push(json!({"role": "assistant", "content": assistant_content}));

                    let mut tool_results = Vec::new();
                    for call in &response.tool_calls {
                        info!(round, tool = %call.name, "tool call");
                        if call.name == "list_tasks" {
                            listed_tasks = true;
                        }
                        let result =
                            execute_tool(&self.tools, &call.name, call.input.clone()).await;
                        tool_log.push(json!({
                            "name": call.name,
                            "input": call.input,
                            "result": result.content.chars().take(500).collect::<String>(),
                        }));
                        tool_results.push(json!({
                            "type": "tool_result",
                            "tool_use_id": call.id,
                            "content": result.content,
                            "is_error": result.is_error,
                        }));
                    }
                    raw_messages.push(json!({"role": "user", "content": tool_results}));
                }
                other => {
                    warn!(stop_reason = %other, "unexpected stop_reason — ending turn");
                    final_text = Some(if response.content.is_empty() {
                        NO_ANSWER.to_string()
                    } else {
                        response.content
                    });
                    break;
                }
            }
        }

        let text = final_text.unwrap_or_else(|| TOO_MANY_STEPS.to_string());
        let tool_log_json = if tool_log.is_empty() {
            None
        } else {
            Some(serde_json::to_string(&tool_log)?)
        };
        self.conversation
            .append(TurnRole::Assistant, &text, tool_log_json.as_deref())?;

        Ok(TurnOutcome { text, listed_tasks })
    }

    /// Hourly job: drop dialogue turns older than the rolling window.
    pub fn compact_history(&self) -> Result<usize> {
        let cutoff = Utc::now() - chrono::Duration::hours(HISTORY_MAX_AGE_HOURS);
        let removed = self.conversation.compact_older_than(cutoff)?;
        if removed > 0 {
            info!(removed, "conversation history compacted");
        }
        Ok(removed)
    }
}

/// Render stored turns into API message JSON.
fn history_to_raw(history: &[ConversationTurn]) -> Vec<serde_json::Value> {
    history
        .iter()
        .map(|turn| {
            json!({
                "role": match turn.role {
                    TurnRole::User => "user",
                    TurnRole::Assistant => "assistant",
                },
                "content": turn.content,
            })
        })
        .collect()
}
