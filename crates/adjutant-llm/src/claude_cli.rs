//! Claude CLI backend (`claude -p`).
//!
//! Covers plain completions when the subscription CLI is preferred over
//! metered API calls. No tool use and no prompt caching - the conversation
//! loop refuses this backend.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::provider::{ChatRequest, ChatResponse, LlmProvider, ProviderError};

const CLI_TIMEOUT_SECS: u64 = 120;

pub struct ClaudeCliProvider {
    command: String,
}

impl ClaudeCliProvider {
    pub fn new(command: String) -> Self {
        Self { command }
    }
}

#[async_trait]
impl LlmProvider for ClaudeCliProvider {
    fn name(&self) -> &str {
        "claude-cli"
    }

    fn supports_tools(&self) -> bool {
        false
    }

    async fn send(&self, req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        if !req.tools.is_empty() || req.raw_messages.is_some() {
            return Err(ProviderError::Unavailable(
                "tool use requires the API backend".to_string(),
            ));
        }

        // The CLI has no system parameter: prepend it to the prompt.
        let mut prompt = String::new();
        if !req.system.is_empty() {
            prompt.push_str(&req.system);
            prompt.push_str("\n\n");
        }
        for msg in &req.messages {
            prompt.push_str(&msg.content);
            prompt.push('\n');
        }

        debug!(command = %self.command, model = %req.model, prompt_len = prompt.len(), "sending to claude CLI");

        let mut child = tokio::process::Command::new(&self.command)
            .arg("-p")
            .arg("--model")
            .arg(&req.model)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| ProviderError::Unavailable(format!("failed to spawn claude CLI: {e}")))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(prompt.as_bytes())
                .await
                .map_err(|e| ProviderError::Unavailable(format!("CLI stdin write failed: {e}")))?;
        }

        let output = match tokio::time::timeout(
            Duration::from_secs(CLI_TIMEOUT_SECS),
            child.wait_with_output(),
        )
        .await
        {
            Ok(Ok(out)) => out,
            Ok(Err(e)) => {
                return Err(ProviderError::Unavailable(format!("CLI wait failed: {e}")))
            }
            Err(_) => {
                return Err(ProviderError::Timeout {
                    secs: CLI_TIMEOUT_SECS,
                })
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let message = if stderr.is_empty() {
                format!("exit code {:?}", output.status.code())
            } else {
                stderr
            };
            return Err(ProviderError::Unavailable(format!(
                "claude CLI error: {message}"
            )));
        }

        let content = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Ok(ChatResponse {
            content,
            model: req.model.clone(),
            tokens_in: 0,
            tokens_out: 0,
            stop_reason: "end_turn".to_string(),
            tool_calls: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ToolDefinition;

    #[tokio::test]
    async fn tool_requests_are_refused() {
        let provider = ClaudeCliProvider::new("claude".into());
        let mut req = ChatRequest::plain("sonnet", "", "hi");
        req.tools.push(ToolDefinition {
            name: "create_task".into(),
            description: "".into(),
            input_schema: serde_json::json!({}),
        });
        let err = provider.send(&req).await.unwrap_err();
        assert!(matches!(err, ProviderError::Unavailable(_)));
    }

    #[tokio::test]
    async fn missing_binary_reports_unavailable() {
        let provider = ClaudeCliProvider::new("definitely-not-a-real-binary-xyz".into());
        let req = ChatRequest::plain("sonnet", "", "hi");
        let err = provider.send(&req).await.unwrap_err();
        assert!(matches!(err, ProviderError::Unavailable(_)));
    }
}
