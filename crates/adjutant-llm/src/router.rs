//! Backend selection, retries, and cross-backend fallback.
//!
//! The `ai_mode` setting picks the primary backend per call. Failures retry
//! with 1-2-4 s backoff; when the primary is exhausted the alternate backend
//! gets exactly one shot, with an owner notice, before the error surfaces.

use std::sync::Mutex;

use tracing::{error, warn};

use adjutant_core::config::LlmConfig;
use adjutant_core::notify::NotifySender;
use adjutant_store::settings::{SettingsStore, KEY_AI_MODE};

use crate::anthropic::AnthropicProvider;
use crate::claude_cli::ClaudeCliProvider;
use crate::provider::{ChatRequest, ChatResponse, LlmProvider, ProviderError};

const MAX_ATTEMPTS: u32 = 3;

/// Model tier: the cheap judge or the capable assistant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelTier {
    Judge,
    Assistant,
}

/// USD per million tokens (input, output) per model id prefix.
const PRICES: &[(&str, f64, f64)] = &[
    ("claude-haiku-4-5", 0.80, 4.0),
    ("claude-sonnet-4-5", 3.0, 15.0),
    ("claude-opus-4", 15.0, 75.0),
];

pub struct LlmRouter {
    api: Option<AnthropicProvider>,
    cli: ClaudeCliProvider,
    settings: SettingsStore,
    notify: NotifySender,
    judge_model: String,
    assistant_model: String,
    default_mode: String,
    last_cost: Mutex<f64>,
    total_cost: Mutex<f64>,
}

impl LlmRouter {
    pub fn new(cfg: &LlmConfig, settings: SettingsStore, notify: NotifySender) -> Self {
        let api = cfg
            .anthropic_api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .map(|key| AnthropicProvider::new(key.to_string(), None));
        Self {
            api,
            cli: ClaudeCliProvider::new(cfg.cli_command.clone()),
            settings,
            notify,
            judge_model: cfg.judge_model.clone(),
            assistant_model: cfg.assistant_model.clone(),
            default_mode: cfg.default_mode.clone(),
            last_cost: Mutex::new(0.0),
            total_cost: Mutex::new(0.0),
        }
    }

    /// Current primary backend name: "api" or "cli".
    pub fn mode(&self) -> String {
        self.settings
            .get(KEY_AI_MODE, &self.default_mode)
            .unwrap_or_else(|_| self.default_mode.clone())
    }

    pub fn set_mode(&self, mode: &str) -> adjutant_core::Result<()> {
        if !matches!(mode, "api" | "cli") {
            return Err(adjutant_core::AdjutantError::Validation(format!(
                "неверный режим: {mode}. Допустимо: api, cli"
            )));
        }
        self.settings.set(KEY_AI_MODE, mode).map_err(Into::into)
    }

    pub fn model_for(&self, tier: ModelTier) -> &str {
        match tier {
            ModelTier::Judge => &self.judge_model,
            ModelTier::Assistant => &self.assistant_model,
        }
    }

    /// Footer label for owner-facing messages.
    pub fn mode_label(&self) -> String {
        if self.mode() == "cli" {
            "CLI mode".to_string()
        } else {
            format!("API mode (${:.3})", self.last_cost())
        }
    }

    pub fn last_cost(&self) -> f64 {
        *self.last_cost.lock().unwrap()
    }

    pub fn total_cost(&self) -> f64 {
        *self.total_cost.lock().unwrap()
    }

    /// Plain prompt → completion on the selected tier, with retries and
    /// cross-backend fallback.
    pub async fn ask(
        &self,
        system: &str,
        user: &str,
        tier: ModelTier,
    ) -> Result<String, ProviderError> {
        let req = ChatRequest::plain(self.model_for(tier), system, user);
        let mode = self.mode();
        let (primary, fallback) = self.pick_backends(&mode);

        let mut last_error = None;
        for attempt in 0..MAX_ATTEMPTS {
            match primary.send(&req).await {
                Ok(resp) => {
                    self.account(&resp);
                    return Ok(resp.content);
                }
                Err(e) => {
                    warn!(
                        backend = primary.name(),
                        attempt = attempt + 1,
                        error = %e,
                        "LLM attempt failed"
                    );
                    last_error = Some(e);
                    tokio::time::sleep(std::time::Duration::from_secs(1 << attempt)).await;
                }
            }
        }

        // Primary exhausted - one shot on the alternate backend.
        warn!(from = primary.name(), to = fallback.name(), "LLM falling back");
        match fallback.send(&req).await {
            Ok(resp) => {
                self.account(&resp);
                self.notify
                    .send_text(format!(
                        "AI: основной режим ({mode}) недоступен, использован {}.\nОшибка: {}",
                        fallback.name(),
                        last_error
                            .as_ref()
                            .map(|e| e.to_string())
                            .unwrap_or_default(),
                    ))
                    .await;
                Ok(resp.content)
            }
            Err(fallback_error) => {
                error!(
                    primary = primary.name(),
                    fallback = fallback.name(),
                    "LLM unavailable on both backends"
                );
                Err(ProviderError::Unavailable(format!(
                    "оба бэкенда недоступны. {}: {}. {}: {}",
                    primary.name(),
                    last_error.map(|e| e.to_string()).unwrap_or_default(),
                    fallback.name(),
                    fallback_error,
                )))
            }
        }
    }

    /// Send a structured request on the API backend (tool use, vision).
    /// No cross-backend fallback: the CLI cannot serve these requests.
    pub async fn send_api(&self, req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        let api = self.api.as_ref().ok_or_else(|| {
            ProviderError::Unavailable(
                "tool use требует API-режим, а anthropic_api_key не задан".to_string(),
            )
        })?;
        let resp = api.send(req).await?;
        self.account(&resp);
        Ok(resp)
    }

    pub fn assistant_model(&self) -> &str {
        &self.assistant_model
    }

    fn pick_backends(&self, mode: &str) -> (&dyn LlmProvider, &dyn LlmProvider) {
        match (mode, self.api.as_ref()) {
            ("cli", Some(api)) => (&self.cli as &dyn LlmProvider, api as &dyn LlmProvider),
            ("cli", None) => (&self.cli, &self.cli),
            (_, Some(api)) => (api as &dyn LlmProvider, &self.cli as &dyn LlmProvider),
            (_, None) => (&self.cli, &self.cli),
        }
    }

    fn account(&self, resp: &ChatResponse) {
        let cost = calc_cost(&resp.model, resp.tokens_in, resp.tokens_out);
        *self.last_cost.lock().unwrap() = cost;
        *self.total_cost.lock().unwrap() += cost;
    }
}

/// Per-call USD cost from the static price table. Unknown models use the
/// sonnet price.
pub fn calc_cost(model: &str, tokens_in: u32, tokens_out: u32) -> f64 {
    let (in_price, out_price) = PRICES
        .iter()
        .find(|(prefix, _, _)| model.starts_with(prefix))
        .map(|&(_, i, o)| (i, o))
        .unwrap_or((3.0, 15.0));
    (tokens_in as f64 * in_price + tokens_out as f64 * out_price) / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use adjutant_store::Store;

    fn router() -> LlmRouter {
        let store = Store::open_in_memory().unwrap();
        let (notify, _rx) = NotifySender::channel(8);
        let cfg = LlmConfig {
            anthropic_api_key: None,
            default_mode: "api".into(),
            judge_model: "claude-haiku-4-5-20251001".into(),
            assistant_model: "claude-sonnet-4-5-20250929".into(),
            cli_command: "claude".into(),
        };
        LlmRouter::new(&cfg, store.settings(), notify)
    }

    #[test]
    fn cost_table_matches_published_prices() {
        let cost = calc_cost("claude-haiku-4-5-20251001", 1_000_000, 0);
        assert!((cost - 0.80).abs() < 1e-9);
        let cost = calc_cost("claude-sonnet-4-5-20250929", 0, 1_000_000);
        assert!((cost - 15.0).abs() < 1e-9);
        // Unknown model falls back to sonnet pricing.
        let cost = calc_cost("mystery-model", 1_000_000, 0);
        assert!((cost - 3.0).abs() < 1e-9);
    }

    #[test]
    fn mode_defaults_then_persists() {
        let r = router();
        assert_eq!(r.mode(), "api");
        r.set_mode("cli").unwrap();
        assert_eq!(r.mode(), "cli");
        assert!(r.set_mode("turbo").is_err());
    }

    #[test]
    fn tier_resolution() {
        let r = router();
        assert!(r.model_for(ModelTier::Judge).contains("haiku"));
        assert!(r.model_for(ModelTier::Assistant).contains("sonnet"));
    }

    #[tokio::test]
    async fn send_api_without_key_is_a_configuration_error() {
        let r = router();
        let req = ChatRequest::plain("m", "s", "u");
        let err = r.send_api(&req).await.unwrap_err();
        assert!(matches!(err, ProviderError::Unavailable(_)));
    }
}
