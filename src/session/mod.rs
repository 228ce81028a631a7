//! Messaging Session seam.
//!
//! The core never speaks the messaging wire protocol itself; it depends on
//! the [`MessagingSession`] capability: an event stream of incoming
//! messages, send/reply, and chat identity lookup. The production
//! implementation lives in [`bridge`] and talks to a local userbot bridge
//! over HTTP.

mod bridge;

pub use bridge::BridgeConnector;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Identity of the controlled account, as reported by the session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountIdentity {
    pub user_id: Option<i64>,
    pub username: Option<String>,
}

/// A single incoming text-message event.
///
/// Fixed-shape record with optional fields; policy logic operates over
/// whatever fields are present.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageEvent {
    pub chat_id: i64,
    pub message_id: i64,
    #[serde(default)]
    pub chat_username: Option<String>,
    #[serde(default)]
    pub chat_title: Option<String>,
    #[serde(default)]
    pub sender_id: Option<i64>,
    #[serde(default)]
    pub text: String,
    /// True when the controlled account itself sent the message.
    #[serde(default)]
    pub outgoing: bool,
    /// True when the platform flagged an explicit mention of the account.
    #[serde(default)]
    pub mentions_me: bool,
}

/// Failures raised by session establishment or delivery.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("missing messaging session credential")]
    MissingCredential,
    #[error("messaging upstream unavailable: {0}")]
    Unavailable(String),
    #[error("send failed: {0}")]
    Send(String),
}

/// An authenticated connection to the chat platform.
#[async_trait]
pub trait MessagingSession: Send + Sync {
    /// Identity of the controlled account.
    fn me(&self) -> AccountIdentity;

    /// Next incoming message event, or `None` when the stream has ended.
    async fn next_event(&mut self) -> Option<MessageEvent>;

    /// Send a message to a chat addressed by id or username.
    async fn send_message(&self, chat: &str, text: &str) -> Result<(), SessionError>;

    /// Reply to a specific event in its chat.
    async fn reply(&self, event: &MessageEvent, text: &str) -> Result<(), SessionError>;

    /// Best-effort typing indicator; callers swallow errors.
    async fn set_typing(&self, chat_id: i64) -> Result<(), SessionError>;

    /// Detach from the platform. Best-effort.
    async fn disconnect(&mut self);
}

/// Factory for messaging sessions.
#[async_trait]
pub trait SessionConnector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn MessagingSession>, SessionError>;
}

/// Read the session credential from any of the accepted env keys.
pub fn credential_from_env() -> Option<String> {
    ["TELEGRAM_STRING_SESSION", "SESSION_STRING", "STRING_SESSION"]
        .iter()
        .find_map(|key| std::env::var(key).ok().filter(|v| !v.is_empty()))
}

/// Check whether a chat matches any entry of an allow/block list.
///
/// An entry matches when it equals the chat's decimal id, its username
/// (case-insensitive, leading `@` ignored), or its title (case-insensitive).
/// An empty list matches nothing.
pub fn chat_matches(event: &MessageEvent, entries: &[String]) -> bool {
    if entries.is_empty() {
        return false;
    }
    let id = event.chat_id.to_string();
    let username = event
        .chat_username
        .as_deref()
        .map(|u| u.trim_start_matches('@').to_ascii_lowercase());
    let title = event.chat_title.as_deref().map(str::to_ascii_lowercase);

    entries.iter().any(|entry| {
        let entry = entry.trim();
        if entry == id {
            return true;
        }
        let entry_lower = entry.trim_start_matches('@').to_ascii_lowercase();
        if username.as_deref() == Some(entry_lower.as_str()) {
            return true;
        }
        title.as_deref() == Some(entry.to_ascii_lowercase().as_str())
    })
}
