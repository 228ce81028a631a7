//! HTTP bridge session.
//!
//! Thin wrapper around a local userbot bridge process that exposes the
//! platform connection over loopback HTTP: `GET /me`, long-poll
//! `GET /events`, `POST /send`, `POST /reply`, `POST /typing`. The wire
//! protocol to the chat platform itself lives entirely in the bridge.

use super::{
    credential_from_env, AccountIdentity, MessageEvent, MessagingSession, SessionConnector,
    SessionError,
};

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::collections::VecDeque;
use std::time::Duration;
use tracing::{debug, warn};

/// Consecutive poll failures tolerated before the event stream is declared
/// dead.
const MAX_POLL_FAILURES: u32 = 5;

/// Connector for the local userbot bridge.
pub struct BridgeConnector {
    base_url: String,
    http: Client,
}

impl BridgeConnector {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http: Client::new(),
        }
    }

    /// Bridge endpoint from `FTG_BRIDGE_URL`, defaulting to loopback.
    pub fn from_env() -> Self {
        let url = std::env::var("FTG_BRIDGE_URL")
            .unwrap_or_else(|_| "http://127.0.0.1:8766".to_string());
        Self::new(url)
    }
}

#[derive(Debug, Deserialize)]
struct EventsResponse {
    #[serde(default)]
    events: Vec<MessageEvent>,
}

#[async_trait]
impl SessionConnector for BridgeConnector {
    async fn connect(&self) -> Result<Box<dyn MessagingSession>, SessionError> {
        let credential = credential_from_env().ok_or(SessionError::MissingCredential)?;

        let me: AccountIdentity = self
            .http
            .get(format!("{}/me", self.base_url))
            .bearer_auth(&credential)
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .map_err(|e| SessionError::Unavailable(e.to_string()))?
            .error_for_status()
            .map_err(|e| SessionError::Unavailable(e.to_string()))?
            .json()
            .await
            .map_err(|e| SessionError::Unavailable(e.to_string()))?;

        debug!(user_id = ?me.user_id, username = ?me.username, "bridge session established");

        Ok(Box::new(BridgeSession {
            base_url: self.base_url.clone(),
            http: self.http.clone(),
            credential,
            me,
            buffer: VecDeque::new(),
            poll_failures: 0,
        }))
    }
}

struct BridgeSession {
    base_url: String,
    http: Client,
    credential: String,
    me: AccountIdentity,
    buffer: VecDeque<MessageEvent>,
    poll_failures: u32,
}

impl BridgeSession {
    async fn post_json(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<(), SessionError> {
        self.http
            .post(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.credential)
            .json(body)
            .send()
            .await
            .map_err(|e| SessionError::Send(e.to_string()))?
            .error_for_status()
            .map_err(|e| SessionError::Send(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl MessagingSession for BridgeSession {
    fn me(&self) -> AccountIdentity {
        self.me.clone()
    }

    async fn next_event(&mut self) -> Option<MessageEvent> {
        loop {
            if let Some(event) = self.buffer.pop_front() {
                return Some(event);
            }

            let result = self
                .http
                .get(format!("{}/events", self.base_url))
                .bearer_auth(&self.credential)
                .query(&[("wait", "25")])
                .timeout(Duration::from_secs(30))
                .send()
                .await;

            match result {
                Ok(resp) if resp.status().is_success() => {
                    match resp.json::<EventsResponse>().await {
                        Ok(batch) => {
                            self.poll_failures = 0;
                            self.buffer.extend(batch.events);
                        }
                        Err(e) => {
                            warn!(error = %e, "discarding malformed event batch");
                            self.poll_failures += 1;
                        }
                    }
                }
                Ok(resp) => {
                    warn!(status = %resp.status(), "bridge event poll rejected");
                    self.poll_failures += 1;
                }
                Err(e) => {
                    debug!(error = %e, "bridge event poll failed");
                    self.poll_failures += 1;
                }
            }

            if self.poll_failures >= MAX_POLL_FAILURES {
                warn!("bridge event stream lost, ending session");
                return None;
            }
            if self.poll_failures > 0 {
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }

    async fn send_message(&self, chat: &str, text: &str) -> Result<(), SessionError> {
        self.post_json("/send", &serde_json::json!({ "chat": chat, "text": text }))
            .await
    }

    async fn reply(&self, event: &MessageEvent, text: &str) -> Result<(), SessionError> {
        self.post_json(
            "/reply",
            &serde_json::json!({
                "chat_id": event.chat_id,
                "message_id": event.message_id,
                "text": text,
            }),
        )
        .await
    }

    async fn set_typing(&self, chat_id: i64) -> Result<(), SessionError> {
        self.post_json("/typing", &serde_json::json!({ "chat_id": chat_id }))
            .await
    }

    async fn disconnect(&mut self) {
        // The bridge holds the platform connection; nothing to tear down on
        // our side beyond dropping the HTTP client.
        self.buffer.clear();
    }
}
