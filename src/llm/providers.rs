use serde::{Deserialize, Serialize};

/// A known provider preset for the control UI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderInfo {
    pub id: &'static str,
    pub name: &'static str,
    pub base_url: &'static str,
}

/// Static catalog of OpenAI-compatible providers.
pub fn provider_catalog() -> Vec<ProviderInfo> {
    vec![
        ProviderInfo {
            id: "lmstudio",
            name: "LM Studio (local)",
            base_url: "http://127.0.0.1:1234/v1",
        },
        ProviderInfo {
            id: "openai",
            name: "OpenAI",
            base_url: "https://api.openai.com/v1",
        },
        ProviderInfo {
            id: "groq",
            name: "Groq",
            base_url: "https://api.groq.com/openai/v1",
        },
        ProviderInfo {
            id: "fireworks",
            name: "Fireworks.ai",
            base_url: "https://api.fireworks.ai/inference/v1",
        },
        ProviderInfo {
            id: "openrouter",
            name: "OpenRouter",
            base_url: "https://openrouter.ai/api/v1",
        },
        ProviderInfo {
            id: "ollama",
            name: "Ollama (local)",
            base_url: "http://127.0.0.1:11434/v1",
        },
    ]
}
