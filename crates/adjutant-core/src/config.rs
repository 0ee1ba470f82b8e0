use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Heartbeat cadence for every long-lived component (seconds).
pub const HEARTBEAT_INTERVAL_SECS: u64 = 300;
/// A module is considered down after this many missed heartbeats.
pub const MAX_MISSED_HEARTBEATS: u32 = 3;
/// Whitelist/blacklist settings cache TTL (seconds).
pub const LIST_CACHE_TTL_SECS: u64 = 60;
/// Chat-title resolution cache TTL (seconds).
pub const CHAT_NAME_CACHE_TTL_SECS: u64 = 300;
/// Per-chat debounce for event-driven tracked-task checks (seconds).
pub const TRACK_CHECK_DEBOUNCE_SECS: u64 = 60;
/// Initial reconnect delay for the resilient listener (seconds).
pub const LISTENER_BACKOFF_START_SECS: u64 = 30;
/// Reconnect delay cap for the resilient listener (seconds).
pub const LISTENER_BACKOFF_CAP_SECS: u64 = 300;

/// Top-level config (adjutant.toml + ADJUTANT_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AdjutantConfig {
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub owner: OwnerConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
}

/// Upstream account + control-bot credentials.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TelegramConfig {
    pub api_id: i32,
    pub api_hash: String,
    pub phone: String,
    /// Label shown in task provenance and the briefing (e.g. "personal").
    #[serde(default = "default_account_label")]
    pub account_label: String,
    /// Optional second monitored account.
    pub secondary: Option<SecondaryAccountConfig>,
    /// Control-channel bot token.
    pub bot_token: String,
    /// The single user the system serves.
    pub owner_id: i64,
    pub proxy: Option<ProxyConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecondaryAccountConfig {
    pub api_id: i32,
    pub api_hash: String,
    pub phone: String,
    #[serde(default = "default_secondary_label")]
    pub account_label: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// "socks5", "socks4" or "http".
    pub kind: String,
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
}

/// LLM backend selection and model tiers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub anthropic_api_key: Option<String>,
    /// Startup default for the `ai_mode` setting: "api" or "cli".
    #[serde(default = "default_ai_mode")]
    pub default_mode: String,
    /// Cheap tier: classification and completion checks.
    #[serde(default = "default_judge_model")]
    pub judge_model: String,
    /// Capable tier: conversation loop, briefings, digests.
    #[serde(default = "default_assistant_model")]
    pub assistant_model: String,
    #[serde(default = "default_cli_command")]
    pub cli_command: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            anthropic_api_key: None,
            default_mode: default_ai_mode(),
            judge_model: default_judge_model(),
            assistant_model: default_assistant_model(),
            cli_command: default_cli_command(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Owner locale: the only place local time comes from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OwnerConfig {
    /// Whole hours east of UTC (e.g. 7 for Krasnoyarsk).
    #[serde(default = "default_tz_offset")]
    pub tz_offset_hours: i32,
    #[serde(default = "default_tz_label")]
    pub tz_label: String,
}

impl Default for OwnerConfig {
    fn default() -> Self {
        Self {
            tz_offset_hours: default_tz_offset(),
            tz_label: default_tz_label(),
        }
    }
}

/// Wall-clock hours for the periodic jobs, in the owner's zone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default = "default_briefing_hour")]
    pub briefing_hour: u8,
    #[serde(default = "default_deadline_review_hour")]
    pub deadline_review_hour: u8,
    #[serde(default = "default_confidence_batch_hour")]
    pub confidence_batch_hour: u8,
    #[serde(default = "default_digest_hour")]
    pub digest_hour: u8,
    /// 0 = Monday … 6 = Sunday.
    #[serde(default = "default_weekly_day")]
    pub weekly_analysis_day: u8,
    #[serde(default = "default_weekly_hour")]
    pub weekly_analysis_hour: u8,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            briefing_hour: default_briefing_hour(),
            deadline_review_hour: default_deadline_review_hour(),
            confidence_batch_hour: default_confidence_batch_hour(),
            digest_hour: default_digest_hour(),
            weekly_analysis_day: default_weekly_day(),
            weekly_analysis_hour: default_weekly_hour(),
        }
    }
}

/// Confidence bands and interruption budgets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Confidence strictly above this auto-creates tasks.
    #[serde(default = "default_confidence_high")]
    pub confidence_high: u8,
    /// Confidence strictly below this is informational only.
    #[serde(default = "default_confidence_low")]
    pub confidence_low: u8,
    /// Daily cap on urgent confidence prompts.
    #[serde(default = "default_urgent_daily_limit")]
    pub urgent_daily_limit: u32,
    /// Rolling conversation window (turns).
    #[serde(default = "default_conversation_window")]
    pub conversation_window: usize,
    /// Context window for classification (messages).
    #[serde(default = "default_context_window")]
    pub context_window: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            confidence_high: default_confidence_high(),
            confidence_low: default_confidence_low(),
            urgent_daily_limit: default_urgent_daily_limit(),
            conversation_window: default_conversation_window(),
            context_window: default_context_window(),
        }
    }
}

fn default_account_label() -> String {
    "primary".to_string()
}
fn default_secondary_label() -> String {
    "secondary".to_string()
}
fn default_ai_mode() -> String {
    "api".to_string()
}
fn default_judge_model() -> String {
    "claude-haiku-4-5-20251001".to_string()
}
fn default_assistant_model() -> String {
    "claude-sonnet-4-5-20250929".to_string()
}
fn default_cli_command() -> String {
    "claude".to_string()
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.adjutant/adjutant.db", home)
}
fn default_tz_offset() -> i32 {
    7
}
fn default_tz_label() -> String {
    "Красноярск".to_string()
}
fn default_briefing_hour() -> u8 {
    9
}
fn default_deadline_review_hour() -> u8 {
    14
}
fn default_confidence_batch_hour() -> u8 {
    17
}
fn default_digest_hour() -> u8 {
    21
}
fn default_weekly_day() -> u8 {
    6
}
fn default_weekly_hour() -> u8 {
    10
}
fn default_confidence_high() -> u8 {
    80
}
fn default_confidence_low() -> u8 {
    50
}
fn default_urgent_daily_limit() -> u32 {
    10
}
fn default_conversation_window() -> usize {
    20
}
fn default_context_window() -> usize {
    10
}

impl AdjutantConfig {
    /// Load config from a TOML file with ADJUTANT_* env var overrides.
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. ~/.adjutant/adjutant.toml
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: AdjutantConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("ADJUTANT_").split("_"))
            .extract()
            .map_err(|e| crate::error::AdjutantError::Config(e.to_string()))?;

        Ok(config)
    }

    /// Fail-fast startup check. Returns every missing mandatory value at once
    /// so the operator fixes the .toml/.env in one pass.
    pub fn validate(&self) -> crate::error::Result<()> {
        let mut missing = Vec::new();

        if self.telegram.api_id == 0 {
            missing.push("telegram.api_id");
        }
        if self.telegram.api_hash.is_empty() {
            missing.push("telegram.api_hash");
        }
        if self.telegram.phone.is_empty() {
            missing.push("telegram.phone");
        }
        if self.telegram.bot_token.is_empty() {
            missing.push("telegram.bot_token");
        }
        if self.telegram.owner_id == 0 {
            missing.push("telegram.owner_id");
        }
        if self.database.path.is_empty() {
            missing.push("database.path");
        }
        if self.llm.default_mode == "api"
            && self
                .llm
                .anthropic_api_key
                .as_deref()
                .unwrap_or("")
                .is_empty()
        {
            missing.push("llm.anthropic_api_key (required while llm.default_mode = \"api\")");
        }
        if !matches!(self.llm.default_mode.as_str(), "api" | "cli") {
            missing.push("llm.default_mode (must be \"api\" or \"cli\")");
        }
        if self.limits.confidence_low > self.limits.confidence_high {
            missing.push("limits.confidence_low must not exceed limits.confidence_high");
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(crate::error::AdjutantError::Config(format!(
                "missing or invalid configuration: {}",
                missing.join(", ")
            )))
        }
    }

    /// True when `id` is the owner on the upstream side.
    pub fn is_owner(&self, id: i64) -> bool {
        id == self.telegram.owner_id
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.adjutant/adjutant.toml", home)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> AdjutantConfig {
        let mut cfg = AdjutantConfig::default();
        cfg.telegram.api_id = 12345;
        cfg.telegram.api_hash = "hash".into();
        cfg.telegram.phone = "+70000000000".into();
        cfg.telegram.bot_token = "123:token".into();
        cfg.telegram.owner_id = 42;
        cfg.llm.anthropic_api_key = Some("sk-test".into());
        cfg
    }

    #[test]
    fn validate_accepts_complete_config() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn validate_lists_every_missing_field() {
        let err = AdjutantConfig::default().validate().unwrap_err().to_string();
        assert!(err.contains("telegram.api_id"));
        assert!(err.contains("telegram.bot_token"));
        assert!(err.contains("telegram.owner_id"));
        assert!(err.contains("anthropic_api_key"));
    }

    #[test]
    fn validate_allows_cli_mode_without_api_key() {
        let mut cfg = valid_config();
        cfg.llm.anthropic_api_key = None;
        cfg.llm.default_mode = "cli".into();
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn validate_rejects_inverted_bands() {
        let mut cfg = valid_config();
        cfg.limits.confidence_low = 90;
        cfg.limits.confidence_high = 50;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn default_hours_match_documented_schedule() {
        let sched = ScheduleConfig::default();
        assert_eq!(sched.briefing_hour, 9);
        assert_eq!(sched.deadline_review_hour, 14);
        assert_eq!(sched.confidence_batch_hour, 17);
        assert_eq!(sched.digest_hour, 21);
    }
}
