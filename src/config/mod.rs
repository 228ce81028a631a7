//! Process-wide, hot-swappable configuration.
//!
//! The store owns immutable snapshots behind an `Arc`; updates build a new
//! snapshot from a partial patch and swap it atomically. Readers clone the
//! `Arc` and never observe a half-applied update.

mod types;

pub use types::*;

use parking_lot::RwLock;
use std::sync::Arc;

/// Owned configuration handle shared by the request gate, supervisor, and
/// auto-reply worker.
pub struct ConfigStore {
    llm: RwLock<Arc<LlmConfig>>,
    bot: RwLock<Arc<BotConfig>>,
    /// Fixed control token for tests; production reads the environment.
    token_override: Option<String>,
}

impl ConfigStore {
    /// Build the store from environment defaults (`.env` should already be
    /// loaded by the caller).
    pub fn from_env() -> Self {
        Self {
            llm: RwLock::new(Arc::new(LlmConfig::default())),
            bot: RwLock::new(Arc::new(BotConfig::default())),
            token_override: None,
        }
    }

    /// Store with a fixed control token instead of the env-backed one.
    pub fn with_control_token(token: impl Into<String>) -> Self {
        Self {
            token_override: Some(token.into()),
            ..Self::from_env()
        }
    }

    /// Current security config. Read fresh each call so token rotation via
    /// the environment takes effect immediately.
    pub fn security(&self) -> SecurityConfig {
        match &self.token_override {
            Some(token) => SecurityConfig {
                control_token: token.clone(),
            },
            None => SecurityConfig::from_env(),
        }
    }

    pub fn llm(&self) -> Arc<LlmConfig> {
        self.llm.read().clone()
    }

    pub fn bot(&self) -> Arc<BotConfig> {
        self.bot.read().clone()
    }

    /// Apply a partial LLM-config update as a whole-value swap.
    pub fn update_llm(&self, patch: LlmConfigPatch) -> Arc<LlmConfig> {
        let mut slot = self.llm.write();
        let next = Arc::new(slot.merged(patch));
        *slot = next.clone();
        next
    }

    /// Apply a partial bot-config update as a whole-value swap.
    pub fn update_bot(&self, patch: BotConfigPatch) -> Arc<BotConfig> {
        let mut slot = self.bot.write();
        let next = Arc::new(slot.merged(patch));
        *slot = next.clone();
        next
    }
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::from_env()
    }
}
