//! LLM gateway client.
//!
//! Turns a prompt into a chat-completion request against an
//! OpenAI-compatible endpoint: resolves model aliases against local
//! inference servers, applies the configured timeout, classifies failures,
//! and trims output.

mod providers;

pub use providers::{provider_catalog, ProviderInfo};

use crate::config::LlmConfig;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Maximum characters returned to callers regardless of upstream length.
pub const MAX_OUTPUT_CHARS: usize = 4096;

/// Ceiling for the model-listing probe, independent of the chat timeout.
const MODEL_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Used when the configured timeout cannot form a `Duration`.
const FALLBACK_TIMEOUT: Duration = Duration::from_secs(30);

/// Hosts that identify a local inference server (LM Studio style) whose
/// endpoint may lack the `/v1` suffix and whose model ids are verbose.
const LOCAL_INFERENCE_HOSTS: &[&str] = &["127.0.0.1:1234", "localhost:1234"];

/// Failures surfaced to callers as a single error kind with a readable
/// cause.
#[derive(Debug, Error)]
pub enum LlmError {
    /// The request exceeded the configured timeout. Not retried; the caller
    /// decides.
    #[error("LLM request timed out")]
    Timeout,
    /// Non-2xx status or transport failure.
    #[error("LLM HTTP error: {0}")]
    Http(String),
    /// Anything else (malformed body, serialization).
    #[error("unexpected LLM error: {0}")]
    Unexpected(String),
}

/// Per-call parameters; `None` falls back to the configured value.
#[derive(Debug, Clone, Default)]
pub struct ChatOptions {
    pub system: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f64>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f64,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ModelList {
    #[serde(default)]
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: Option<String>,
    model: Option<String>,
}

impl ModelEntry {
    fn ident(&self) -> Option<&str> {
        self.id.as_deref().or(self.model.as_deref())
    }
}

/// Client for an OpenAI-compatible chat endpoint.
pub struct LlmClient {
    http: Client,
}

impl LlmClient {
    pub fn new() -> Self {
        Self {
            http: Client::new(),
        }
    }

    /// Issue a chat completion and return the trimmed response text.
    pub async fn chat(
        &self,
        cfg: &LlmConfig,
        prompt: &str,
        opts: ChatOptions,
    ) -> Result<String, LlmError> {
        let base = normalize_base_url(&cfg.base_url);
        let model = self.resolve_model(cfg, &base).await;

        let mut messages = Vec::with_capacity(2);
        if let Some(system) = opts.system.filter(|s| !s.is_empty()) {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: prompt.to_string(),
        });

        let body = ChatCompletionRequest {
            model,
            messages,
            max_tokens: opts.max_tokens.unwrap_or(cfg.max_tokens),
            temperature: opts.temperature.unwrap_or(cfg.temperature),
            stream: false,
        };

        let mut request = self
            .http
            .post(format!("{base}/chat/completions"))
            .timeout(timeout_from_secs(cfg.request_timeout_seconds))
            .json(&body);
        if let Some(ref key) = cfg.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(classify_transport)?;
        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(LlmError::Http(format!("status {status}: {text}")));
        }

        let data: serde_json::Value = response
            .json()
            .await
            .map_err(|e| LlmError::Unexpected(e.to_string()))?;

        Ok(trim_output(&extract_content(&data)))
    }

    /// Resolve a short model alias against a local inference server's model
    /// listing. Discovery failures are swallowed; the configured identifier
    /// is used unchanged.
    async fn resolve_model(&self, cfg: &LlmConfig, base: &str) -> String {
        if cfg.model.contains('/') || !is_local_inference_url(&cfg.base_url) {
            return cfg.model.clone();
        }

        let timeout = timeout_from_secs(cfg.request_timeout_seconds).min(MODEL_DISCOVERY_TIMEOUT);
        let listing = self
            .http
            .get(format!("{base}/models"))
            .timeout(timeout)
            .send()
            .await
            .ok()
            .filter(|r| r.status().is_success());

        let Some(listing) = listing else {
            return cfg.model.clone();
        };
        let Ok(models) = listing.json::<ModelList>().await else {
            return cfg.model.clone();
        };

        match pick_model(&cfg.model, &models) {
            Some(resolved) => {
                if resolved != cfg.model {
                    debug!(alias = %cfg.model, resolved = %resolved, "resolved model alias");
                }
                resolved
            }
            None => cfg.model.clone(),
        }
    }
}

impl Default for LlmClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Negative, NaN, or over-range values cannot form a `Duration`; fall back
/// rather than panic.
fn timeout_from_secs(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs).unwrap_or(FALLBACK_TIMEOUT)
}

fn classify_transport(err: reqwest::Error) -> LlmError {
    if err.is_timeout() {
        LlmError::Timeout
    } else {
        LlmError::Http(err.to_string())
    }
}

/// Append `/v1` to known local-inference endpoints that lack it.
pub fn normalize_base_url(base_url: &str) -> String {
    let base = base_url.trim_end_matches('/');
    if is_local_inference_url(base) && !base.ends_with("/v1") {
        format!("{base}/v1")
    } else {
        base.to_string()
    }
}

fn is_local_inference_url(url: &str) -> bool {
    // Match on a path boundary so ports like 12345 do not count.
    LOCAL_INFERENCE_HOSTS.iter().any(|host| {
        url.find(host).is_some_and(|idx| {
            let rest = &url[idx + host.len()..];
            rest.is_empty() || rest.starts_with('/')
        })
    })
}

/// Prefer a listed id containing the alias (case-insensitive), else the
/// first listed id.
fn pick_model(alias: &str, models: &ModelList) -> Option<String> {
    let alias_lower = alias.to_ascii_lowercase();
    models
        .data
        .iter()
        .filter_map(ModelEntry::ident)
        .find(|id| id.to_ascii_lowercase().contains(&alias_lower))
        .or_else(|| models.data.first().and_then(ModelEntry::ident))
        .map(String::from)
}

/// Extract response text, supporting both the chat-message shape and the
/// legacy completions shape. Missing content yields an empty string.
fn extract_content(data: &serde_json::Value) -> String {
    let first = &data["choices"][0];
    first["message"]["content"]
        .as_str()
        .or_else(|| first["text"].as_str())
        .unwrap_or_default()
        .to_string()
}

/// Trim whitespace and cap the output at [`MAX_OUTPUT_CHARS`] characters.
fn trim_output(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= MAX_OUTPUT_CHARS {
        trimmed.to_string()
    } else {
        trimmed.chars().take(MAX_OUTPUT_CHARS).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn normalizes_lmstudio_url_without_suffix() {
        assert_eq!(
            normalize_base_url("http://127.0.0.1:1234"),
            "http://127.0.0.1:1234/v1"
        );
        assert_eq!(
            normalize_base_url("http://localhost:1234/"),
            "http://localhost:1234/v1"
        );
    }

    #[test]
    fn leaves_suffixed_and_remote_urls_alone() {
        assert_eq!(
            normalize_base_url("http://127.0.0.1:1234/v1"),
            "http://127.0.0.1:1234/v1"
        );
        assert_eq!(
            normalize_base_url("https://api.openai.com/v1"),
            "https://api.openai.com/v1"
        );
        assert_eq!(
            normalize_base_url("https://api.groq.com/openai/v1/"),
            "https://api.groq.com/openai/v1"
        );
    }

    #[test]
    fn picks_substring_match_over_first() {
        let models = ModelList {
            data: vec![
                ModelEntry {
                    id: Some("other-model".into()),
                    model: None,
                },
                ModelEntry {
                    id: Some("Qwen2.5-7B-Instruct-GGUF".into()),
                    model: None,
                },
            ],
        };
        assert_eq!(
            pick_model("qwen2.5", &models),
            Some("Qwen2.5-7B-Instruct-GGUF".to_string())
        );
    }

    #[test]
    fn falls_back_to_first_listed_model() {
        let models = ModelList {
            data: vec![ModelEntry {
                id: None,
                model: Some("loaded-model".into()),
            }],
        };
        assert_eq!(pick_model("missing", &models), Some("loaded-model".to_string()));
    }

    #[test]
    fn empty_listing_resolves_nothing() {
        let models = ModelList { data: vec![] };
        assert_eq!(pick_model("anything", &models), None);
    }

    #[test]
    fn extracts_chat_message_content() {
        let data = json!({"choices": [{"message": {"content": "hello"}}]});
        assert_eq!(extract_content(&data), "hello");
    }

    #[test]
    fn extracts_legacy_completion_text() {
        let data = json!({"choices": [{"text": "legacy"}]});
        assert_eq!(extract_content(&data), "legacy");
    }

    #[test]
    fn missing_content_yields_empty_string() {
        assert_eq!(extract_content(&json!({"choices": []})), "");
        assert_eq!(extract_content(&json!({})), "");
    }

    #[test]
    fn invalid_timeouts_fall_back() {
        assert_eq!(timeout_from_secs(-1.0), FALLBACK_TIMEOUT);
        assert_eq!(timeout_from_secs(f64::NAN), FALLBACK_TIMEOUT);
        assert_eq!(timeout_from_secs(f64::INFINITY), FALLBACK_TIMEOUT);
        assert_eq!(timeout_from_secs(2.5), Duration::from_millis(2500));
    }

    #[tokio::test]
    async fn chat_with_invalid_timeout_errors_instead_of_panicking() {
        let cfg = LlmConfig {
            base_url: "http://127.0.0.1:9".into(),
            model: "test/model".into(),
            api_key: None,
            temperature: 0.5,
            max_tokens: 16,
            request_timeout_seconds: -1.0,
        };
        let result = LlmClient::new().chat(&cfg, "hi", ChatOptions::default()).await;
        assert!(result.is_err());
    }

    #[test]
    fn similar_ports_are_not_local_inference_hosts() {
        assert!(is_local_inference_url("http://127.0.0.1:1234"));
        assert!(is_local_inference_url("http://127.0.0.1:1234/v1"));
        assert!(!is_local_inference_url("http://127.0.0.1:12345"));
    }

    #[test]
    fn trims_output_to_cap() {
        let long = "x".repeat(10_000);
        assert_eq!(trim_output(&long).chars().count(), MAX_OUTPUT_CHARS);
    }

    #[test]
    fn trim_respects_char_boundaries() {
        let long = "ж".repeat(MAX_OUTPUT_CHARS + 10);
        let out = trim_output(&long);
        assert_eq!(out.chars().count(), MAX_OUTPUT_CHARS);
        assert!(out.chars().all(|c| c == 'ж'));
    }

    #[test]
    fn trim_strips_surrounding_whitespace() {
        assert_eq!(trim_output("  hi\n"), "hi");
    }
}
