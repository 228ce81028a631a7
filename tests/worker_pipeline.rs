//! Worker behavior against a scripted in-memory session: cooldown,
//! allow/block policy, built-in commands, and lifecycle.

mod common;

use common::{wait_for_worker_exit, ConnectFailure, ScriptedConnector};
use ftg_control::config::{AutoReplyMode, BotConfigPatch, ConfigStore, LlmConfigPatch};
use ftg_control::llm::LlmClient;
use ftg_control::session::MessageEvent;
use ftg_control::worker::AutoReplyWorker;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn spawn_worker(
    connector: ScriptedConnector,
) -> (Arc<AutoReplyWorker>, Arc<ConfigStore>, Arc<ScriptedConnector>) {
    let connector = Arc::new(connector);
    let config = Arc::new(ConfigStore::with_control_token("test-token"));
    let worker = Arc::new(AutoReplyWorker::new(
        config.clone(),
        Arc::new(LlmClient::new()),
        connector.clone(),
    ));
    (worker, config, connector)
}

/// Mock LLM endpoint that always answers `text`. The returned config patch
/// points at it; the `/`-qualified model name skips model discovery.
async fn mock_llm(text: &str) -> (MockServer, LlmConfigPatch) {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{ "message": { "content": text } }]
        })))
        .mount(&server)
        .await;
    let patch = LlmConfigPatch {
        base_url: Some(server.uri()),
        model: Some("test/model".into()),
        ..Default::default()
    };
    (server, patch)
}

fn incoming(chat_id: i64, text: &str) -> MessageEvent {
    MessageEvent {
        chat_id,
        text: text.to_string(),
        ..Default::default()
    }
}

#[tokio::test]
async fn cooldown_allows_one_reply_per_chat() {
    let (_llm, llm_patch) = mock_llm("generated answer").await;
    let (worker, config, connector) = spawn_worker(ScriptedConnector::with_events(vec![
        incoming(1, "hello there"),
        incoming(1, "still there?"),
    ]));
    config.update_llm(llm_patch);
    config.update_bot(BotConfigPatch {
        auto_reply_enabled: Some(true),
        auto_reply_mode: Some(AutoReplyMode::All),
        min_reply_interval_seconds: Some(60),
        ..Default::default()
    });

    worker.ensure_running();
    wait_for_worker_exit(&worker).await;

    let replies = connector.replies.lock().clone();
    assert_eq!(replies, vec![(1, "generated answer".to_string())]);
}

#[tokio::test]
async fn separate_chats_have_independent_cooldowns() {
    let (_llm, llm_patch) = mock_llm("hi").await;
    let (worker, config, connector) = spawn_worker(ScriptedConnector::with_events(vec![
        incoming(1, "first chat"),
        incoming(2, "second chat"),
    ]));
    config.update_llm(llm_patch);
    config.update_bot(BotConfigPatch {
        auto_reply_enabled: Some(true),
        auto_reply_mode: Some(AutoReplyMode::All),
        min_reply_interval_seconds: Some(60),
        ..Default::default()
    });

    worker.ensure_running();
    wait_for_worker_exit(&worker).await;

    let replies = connector.replies.lock().clone();
    assert_eq!(replies, vec![(1, "hi".to_string()), (2, "hi".to_string())]);
}

#[tokio::test]
async fn blocklist_wins_over_allowlist() {
    let llm = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{ "message": { "content": "should not happen" } }]
        })))
        .expect(0)
        .mount(&llm)
        .await;

    let (worker, config, connector) =
        spawn_worker(ScriptedConnector::with_events(vec![incoming(7, "hello")]));
    config.update_llm(LlmConfigPatch {
        base_url: Some(llm.uri()),
        model: Some("test/model".into()),
        ..Default::default()
    });
    config.update_bot(BotConfigPatch {
        auto_reply_enabled: Some(true),
        auto_reply_mode: Some(AutoReplyMode::All),
        allowlist: Some(vec!["7".into()]),
        blocklist: Some(vec!["7".into()]),
        ..Default::default()
    });

    worker.ensure_running();
    wait_for_worker_exit(&worker).await;

    assert!(connector.replies.lock().is_empty());
}

#[tokio::test]
async fn ping_command_replies_without_the_llm() {
    // Auto-reply stays disabled; commands must still work, and nothing may
    // reach the LLM endpoint.
    let llm = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&llm)
        .await;

    let (worker, config, connector) =
        spawn_worker(ScriptedConnector::with_events(vec![incoming(3, ".ping")]));
    config.update_llm(LlmConfigPatch {
        base_url: Some(llm.uri()),
        model: Some("test/model".into()),
        ..Default::default()
    });
    config.update_bot(BotConfigPatch {
        min_reply_interval_seconds: Some(0),
        ..Default::default()
    });

    worker.ensure_running();
    wait_for_worker_exit(&worker).await;

    let replies = connector.replies.lock().clone();
    assert_eq!(replies, vec![(3, "pong".to_string())]);
}

#[tokio::test]
async fn explicit_trigger_bypasses_disabled_auto_reply() {
    let (_llm, llm_patch) = mock_llm("on demand").await;
    let (worker, config, connector) =
        spawn_worker(ScriptedConnector::with_events(vec![incoming(4, ".ai hi")]));
    config.update_llm(llm_patch);
    config.update_bot(BotConfigPatch {
        auto_reply_enabled: Some(false),
        min_reply_interval_seconds: Some(0),
        ..Default::default()
    });

    worker.ensure_running();
    wait_for_worker_exit(&worker).await;

    let replies = connector.replies.lock().clone();
    assert_eq!(replies, vec![(4, "on demand".to_string())]);
}

#[tokio::test]
async fn plain_own_messages_are_ignored() {
    let llm = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&llm)
        .await;

    let event = MessageEvent {
        chat_id: 5,
        text: "note to self".into(),
        outgoing: true,
        ..Default::default()
    };
    let (worker, config, connector) = spawn_worker(ScriptedConnector::with_events(vec![event]));
    config.update_llm(LlmConfigPatch {
        base_url: Some(llm.uri()),
        model: Some("test/model".into()),
        ..Default::default()
    });
    config.update_bot(BotConfigPatch {
        auto_reply_enabled: Some(true),
        auto_reply_mode: Some(AutoReplyMode::All),
        min_reply_interval_seconds: Some(0),
        ..Default::default()
    });

    worker.ensure_running();
    wait_for_worker_exit(&worker).await;

    assert!(connector.replies.lock().is_empty());
}

#[tokio::test]
async fn ensure_running_is_idempotent_while_active() {
    let mut connector = ScriptedConnector::default();
    connector.hang_when_drained = true;
    let (worker, _config, connector) = spawn_worker(connector);

    worker.ensure_running();
    worker.ensure_running();
    worker.ensure_running();

    // Give the single task a chance to connect.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert!(worker.is_active());
    assert_eq!(connector.connect_count.load(Ordering::SeqCst), 1);

    worker.stop();
    wait_for_worker_exit(&worker).await;
}

#[tokio::test]
async fn connect_failure_exits_quietly_and_retries_on_next_ensure() {
    let (worker, _config, connector) =
        spawn_worker(ScriptedConnector::failing(ConnectFailure::Unavailable));

    worker.ensure_running();
    wait_for_worker_exit(&worker).await;

    worker.ensure_running();
    wait_for_worker_exit(&worker).await;

    assert_eq!(connector.connect_count.load(Ordering::SeqCst), 2);
}
