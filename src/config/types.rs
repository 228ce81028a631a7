use serde::{Deserialize, Serialize};

/// Security settings for the control surface.
///
/// Re-read from the environment on every request so that rotating
/// `FTG_CONTROL_TOKEN` in `.env` takes effect without a restart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    pub control_token: String,
}

impl SecurityConfig {
    pub fn from_env() -> Self {
        Self {
            control_token: std::env::var("FTG_CONTROL_TOKEN")
                .unwrap_or_else(|_| "changeme_local_token".to_string()),
        }
    }
}

/// Connection parameters for the OpenAI-compatible LLM endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub temperature: f64,
    pub max_tokens: u32,
    pub request_timeout_seconds: f64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: env_or("LLM_BASE_URL", "http://127.0.0.1:1234/v1"),
            model: env_or("LLM_MODEL", "gpt-oss:latest"),
            api_key: std::env::var("LLM_API_KEY").ok().filter(|k| !k.is_empty()),
            temperature: env_parsed("LLM_TEMPERATURE", 0.5),
            max_tokens: env_parsed("LLM_MAX_TOKENS", 1024),
            request_timeout_seconds: positive_timeout(
                env_parsed("LLM_REQUEST_TIMEOUT", 30.0),
                30.0,
            ),
        }
    }
}

/// Partial update for [`LlmConfig`]. Absent fields keep their prior values.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LlmConfigPatch {
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub api_key: Option<String>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
    pub request_timeout_seconds: Option<f64>,
}

impl LlmConfig {
    /// Produce a new config with the patch applied on top of `self`.
    pub fn merged(&self, patch: LlmConfigPatch) -> Self {
        Self {
            base_url: patch.base_url.unwrap_or_else(|| self.base_url.clone()),
            model: patch.model.unwrap_or_else(|| self.model.clone()),
            api_key: patch.api_key.or_else(|| self.api_key.clone()),
            temperature: patch.temperature.unwrap_or(self.temperature),
            max_tokens: patch.max_tokens.unwrap_or(self.max_tokens),
            request_timeout_seconds: positive_timeout(
                patch
                    .request_timeout_seconds
                    .unwrap_or(self.request_timeout_seconds),
                self.request_timeout_seconds,
            ),
        }
    }

    /// JSON view of the config with the API key replaced by a marker.
    pub fn redacted(&self) -> serde_json::Value {
        let mut value = serde_json::to_value(self).unwrap_or_default();
        if let Some(obj) = value.as_object_mut() {
            if obj.get("api_key").is_some() {
                obj.insert("api_key".into(), serde_json::Value::String("***".into()));
            }
        }
        value
    }
}

/// Passive auto-reply mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutoReplyMode {
    /// Never reply passively.
    Off,
    /// Reply only when the controlled account is mentioned.
    MentionsOnly,
    /// Reply to every message that passes the allow/block policy.
    All,
}

impl Default for AutoReplyMode {
    fn default() -> Self {
        Self::MentionsOnly
    }
}

/// Policy for the auto-reply worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    pub auto_reply_enabled: bool,
    pub auto_reply_mode: AutoReplyMode,
    /// Chat keys (numeric id, username, or title) to always allow.
    pub allowlist: Vec<String>,
    /// Chat keys to always drop; wins over the allowlist.
    pub blocklist: Vec<String>,
    /// Suppress presence indicators (typing) while processing.
    pub silent_reading: bool,
    pub min_reply_interval_seconds: u64,
    /// System prompt for generated replies. Empty means the built-in default.
    pub reply_prompt: String,
    pub humanize_typing_enabled: bool,
    pub typing_min_ms: u64,
    pub typing_max_ms: u64,
    /// Reserved knob, clamped to [0, 1]. Carried in config but not wired to
    /// any behavior.
    pub typo_rate: f64,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            auto_reply_enabled: false,
            auto_reply_mode: AutoReplyMode::default(),
            allowlist: Vec::new(),
            blocklist: Vec::new(),
            silent_reading: false,
            min_reply_interval_seconds: 30,
            reply_prompt: String::new(),
            humanize_typing_enabled: false,
            typing_min_ms: 800,
            typing_max_ms: 2500,
            typo_rate: 0.0,
        }
    }
}

/// Partial update for [`BotConfig`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BotConfigPatch {
    pub auto_reply_enabled: Option<bool>,
    pub auto_reply_mode: Option<AutoReplyMode>,
    pub allowlist: Option<Vec<String>>,
    pub blocklist: Option<Vec<String>>,
    pub silent_reading: Option<bool>,
    pub min_reply_interval_seconds: Option<u64>,
    pub reply_prompt: Option<String>,
    pub humanize_typing_enabled: Option<bool>,
    pub typing_min_ms: Option<u64>,
    pub typing_max_ms: Option<u64>,
    pub typo_rate: Option<f64>,
}

impl BotConfig {
    pub fn merged(&self, patch: BotConfigPatch) -> Self {
        Self {
            auto_reply_enabled: patch.auto_reply_enabled.unwrap_or(self.auto_reply_enabled),
            auto_reply_mode: patch.auto_reply_mode.unwrap_or(self.auto_reply_mode),
            allowlist: patch.allowlist.unwrap_or_else(|| self.allowlist.clone()),
            blocklist: patch.blocklist.unwrap_or_else(|| self.blocklist.clone()),
            silent_reading: patch.silent_reading.unwrap_or(self.silent_reading),
            min_reply_interval_seconds: patch
                .min_reply_interval_seconds
                .unwrap_or(self.min_reply_interval_seconds),
            reply_prompt: patch
                .reply_prompt
                .unwrap_or_else(|| self.reply_prompt.clone()),
            humanize_typing_enabled: patch
                .humanize_typing_enabled
                .unwrap_or(self.humanize_typing_enabled),
            typing_min_ms: patch.typing_min_ms.unwrap_or(self.typing_min_ms),
            typing_max_ms: patch.typing_max_ms.unwrap_or(self.typing_max_ms),
            typo_rate: patch.typo_rate.unwrap_or(self.typo_rate).clamp(0.0, 1.0),
        }
    }
}

/// Timeouts must be positive and finite; anything else keeps `fallback`.
/// Capped at one hour.
fn positive_timeout(value: f64, fallback: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value.min(3600.0)
    } else {
        fallback
    }
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_parsed<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
