//! Shared test fixtures: a scripted in-memory messaging session and a
//! control-server harness on an ephemeral port.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use ftg_control::config::ConfigStore;
use ftg_control::llm::LlmClient;
use ftg_control::server::{build_routes, ControlState, RateLimiter};
use ftg_control::session::{
    AccountIdentity, MessageEvent, MessagingSession, SessionConnector, SessionError,
};
use ftg_control::supervisor::{CredentialPolicy, Supervisor};
use ftg_control::worker::AutoReplyWorker;

/// How a [`ScriptedConnector`] should fail `connect`, if at all.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum ConnectFailure {
    None,
    MissingCredential,
    Unavailable,
}

/// Connector handing out sessions that replay a scripted event list and
/// record everything the worker sends.
pub struct ScriptedConnector {
    pub me: AccountIdentity,
    pub events: Mutex<VecDeque<MessageEvent>>,
    /// Replies recorded as `(chat_id, text)`.
    pub replies: Arc<Mutex<Vec<(i64, String)>>>,
    /// Direct sends recorded as `(chat, text)`.
    pub sent: Arc<Mutex<Vec<(String, String)>>>,
    pub connect_count: AtomicUsize,
    pub failure: ConnectFailure,
    /// Keep the session open after the script drains instead of ending the
    /// stream.
    pub hang_when_drained: bool,
}

impl Default for ScriptedConnector {
    fn default() -> Self {
        Self {
            me: AccountIdentity::default(),
            events: Mutex::new(VecDeque::new()),
            replies: Arc::new(Mutex::new(Vec::new())),
            sent: Arc::new(Mutex::new(Vec::new())),
            connect_count: AtomicUsize::new(0),
            failure: ConnectFailure::None,
            hang_when_drained: false,
        }
    }
}

impl ScriptedConnector {
    pub fn with_events(events: Vec<MessageEvent>) -> Self {
        Self {
            events: Mutex::new(events.into()),
            ..Default::default()
        }
    }

    pub fn failing(failure: ConnectFailure) -> Self {
        Self {
            failure,
            ..Default::default()
        }
    }
}

#[async_trait]
impl SessionConnector for ScriptedConnector {
    async fn connect(&self) -> Result<Box<dyn MessagingSession>, SessionError> {
        self.connect_count.fetch_add(1, Ordering::SeqCst);
        match self.failure {
            ConnectFailure::MissingCredential => return Err(SessionError::MissingCredential),
            ConnectFailure::Unavailable => {
                return Err(SessionError::Unavailable("scripted outage".into()))
            }
            ConnectFailure::None => {}
        }
        Ok(Box::new(ScriptedSession {
            me: self.me.clone(),
            events: std::mem::take(&mut *self.events.lock()),
            replies: self.replies.clone(),
            sent: self.sent.clone(),
            hang_when_drained: self.hang_when_drained,
        }))
    }
}

struct ScriptedSession {
    me: AccountIdentity,
    events: VecDeque<MessageEvent>,
    replies: Arc<Mutex<Vec<(i64, String)>>>,
    sent: Arc<Mutex<Vec<(String, String)>>>,
    hang_when_drained: bool,
}

#[async_trait]
impl MessagingSession for ScriptedSession {
    fn me(&self) -> AccountIdentity {
        self.me.clone()
    }

    async fn next_event(&mut self) -> Option<MessageEvent> {
        if let Some(event) = self.events.pop_front() {
            return Some(event);
        }
        if self.hang_when_drained {
            std::future::pending::<()>().await;
        }
        None
    }

    async fn send_message(&self, chat: &str, text: &str) -> Result<(), SessionError> {
        self.sent.lock().push((chat.to_string(), text.to_string()));
        Ok(())
    }

    async fn reply(&self, event: &MessageEvent, text: &str) -> Result<(), SessionError> {
        self.replies.lock().push((event.chat_id, text.to_string()));
        Ok(())
    }

    async fn set_typing(&self, _chat_id: i64) -> Result<(), SessionError> {
        Ok(())
    }

    async fn disconnect(&mut self) {}
}

/// Everything a control-server test needs, with temp resources kept alive.
pub struct TestHarness {
    pub base_url: String,
    pub state: ControlState,
    pub connector: Arc<ScriptedConnector>,
    pub dir: tempfile::TempDir,
}

pub const TEST_TOKEN: &str = "test-token";

/// Build production-shaped state around a scripted connector and start a
/// real server on an ephemeral port.
pub async fn start_server(connector: ScriptedConnector) -> TestHarness {
    start_server_with(connector, RateLimiter::default(), true).await
}

pub async fn start_server_with(
    connector: ScriptedConnector,
    rate_limiter: RateLimiter,
    supervised_credential: bool,
) -> TestHarness {
    let dir = tempfile::tempdir().unwrap();
    let connector = Arc::new(connector);

    let config = Arc::new(ConfigStore::with_control_token(TEST_TOKEN));
    let llm = Arc::new(LlmClient::new());
    let worker = Arc::new(AutoReplyWorker::new(
        config.clone(),
        llm.clone(),
        connector.clone(),
    ));
    let credential = if supervised_credential {
        CredentialPolicy::Fixed(Some("scripted-session".into()))
    } else {
        CredentialPolicy::Fixed(None)
    };
    let supervisor = Arc::new(Supervisor::new(
        dir.path().join("runner.pid"),
        vec!["/bin/sleep".into(), "30".into()],
        credential,
    ));

    let state = ControlState {
        config,
        llm,
        supervisor,
        worker,
        connector: connector.clone(),
        rate_limiter: Arc::new(rate_limiter),
        log_path: dir.path().join("ftg.log"),
        start_time: Instant::now(),
        version: "test".to_string(),
    };

    let app = build_routes(state.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });

    TestHarness {
        base_url: format!("http://{addr}"),
        state,
        connector,
        dir,
    }
}

/// Poll until the worker task has exited or the timeout elapses.
pub async fn wait_for_worker_exit(worker: &AutoReplyWorker) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while worker.is_active() {
        assert!(Instant::now() < deadline, "worker did not exit in time");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Convenience: path kept for log-tail tests.
pub fn log_path(harness: &TestHarness) -> PathBuf {
    harness.state.log_path.clone()
}
