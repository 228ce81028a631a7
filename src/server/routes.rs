use crate::config::{BotConfigPatch, LlmConfigPatch};
use crate::llm::{provider_catalog, ChatOptions};
use crate::server::{gate, ui, ControlState};
use crate::session::SessionError;
use crate::supervisor::SupervisorError;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse};
use axum::routing::{get, post};
use axum::{middleware, Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::VecDeque;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::error;

/// Build the control-surface router with the request gate applied.
pub fn build_routes(state: ControlState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/", get(root_handler))
        .route("/exec", post(exec_handler))
        .route("/send_message", post(send_message_handler))
        .route("/llm/chat", post(llm_chat_handler))
        .route("/llm/config", get(llm_get_config_handler).post(llm_update_config_handler))
        .route("/llm/providers", get(llm_providers_handler))
        .route("/bot/config", get(bot_get_config_handler).post(bot_update_config_handler))
        .route("/logs/tail", get(logs_tail_handler))
        .route("/ui", get(ui_handler))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            gate::request_gate,
        ))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ============================================================================
// Health / root
// ============================================================================

async fn health_handler(State(state): State<ControlState>) -> Json<Value> {
    let ftg = if state.supervisor.status() {
        "running"
    } else {
        "stopped"
    };
    Json(json!({
        "status": "ok",
        "ftg": ftg,
        "uptime_seconds": state.start_time.elapsed().as_secs(),
    }))
}

async fn root_handler() -> Json<Value> {
    Json(json!({ "name": "FTG Control Server", "status": "ok" }))
}

// ============================================================================
// Supervisor actions
// ============================================================================

#[derive(Debug, Deserialize)]
struct ExecRequest {
    action: String,
    #[serde(default)]
    #[allow(dead_code)]
    params: Option<Value>,
}

async fn exec_handler(
    State(state): State<ControlState>,
    Json(req): Json<ExecRequest>,
) -> Json<Value> {
    let action = req.action.to_lowercase();
    let result = match action.as_str() {
        "status" => {
            return Json(json!({ "ok": true, "running": state.supervisor.status() }));
        }
        "start" => state
            .supervisor
            .start()
            .await
            .map(|()| json!({ "ok": true, "started": true })),
        "stop" => state
            .supervisor
            .stop()
            .await
            .map(|()| json!({ "ok": true, "stopped": true })),
        "restart" => state
            .supervisor
            .restart()
            .await
            .map(|()| json!({ "ok": true, "started": true })),
        _ => {
            return Json(json!({ "ok": false, "error": "unknown_action" }));
        }
    };

    // The worker stays attached across supervisor transitions; re-ensure it
    // after every lifecycle action.
    state.worker.ensure_running();

    match result {
        Ok(body) => Json(body),
        Err(e) => Json(supervisor_error_body(&e)),
    }
}

fn supervisor_error_body(err: &SupervisorError) -> Value {
    json!({ "ok": false, "error": err.wire_code() })
}

// ============================================================================
// One-shot message send
// ============================================================================

#[derive(Debug, Deserialize)]
struct SendMessageRequest {
    /// Username or numeric chat id.
    chat: Value,
    text: String,
}

async fn send_message_handler(
    State(state): State<ControlState>,
    Json(req): Json<SendMessageRequest>,
) -> impl IntoResponse {
    let chat = match &req.chat {
        Value::String(s) if !s.is_empty() => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => "me".to_string(),
    };

    let mut session = match state.connector.connect().await {
        Ok(session) => session,
        Err(SessionError::MissingCredential) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "ok": false, "error": "missing_telegram_session" })),
            );
        }
        Err(e) => {
            error!(error = %e, "send_message: session unavailable");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "ok": false, "error": format!("upstream unavailable: {e}") })),
            );
        }
    };

    let result = session.send_message(&chat, &req.text).await;
    session.disconnect().await;

    match result {
        Ok(()) => (StatusCode::OK, Json(json!({ "ok": true }))),
        Err(e) => {
            error!(error = %e, "send_message failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "ok": false, "error": format!("send failed: {e}") })),
            )
        }
    }
}

// ============================================================================
// LLM
// ============================================================================

#[derive(Debug, Deserialize)]
struct LlmChatRequest {
    prompt: String,
    system: Option<String>,
    temperature: Option<f64>,
    max_tokens: Option<u32>,
}

async fn llm_chat_handler(
    State(state): State<ControlState>,
    Json(req): Json<LlmChatRequest>,
) -> impl IntoResponse {
    let cfg = state.config.llm();
    let opts = ChatOptions {
        system: req.system,
        max_tokens: req.max_tokens,
        temperature: req.temperature,
    };
    match state.llm.chat(&cfg, &req.prompt, opts).await {
        Ok(text) => (StatusCode::OK, Json(json!({ "ok": true, "text": text }))),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "ok": false, "error": e.to_string() })),
        ),
    }
}

async fn llm_get_config_handler(State(state): State<ControlState>) -> Json<Value> {
    Json(json!({ "ok": true, "config": state.config.llm().redacted() }))
}

async fn llm_update_config_handler(
    State(state): State<ControlState>,
    Json(patch): Json<LlmConfigPatch>,
) -> Json<Value> {
    let updated = state.config.update_llm(patch);
    Json(json!({ "ok": true, "config": updated.redacted() }))
}

async fn llm_providers_handler() -> Json<Value> {
    Json(json!({ "ok": true, "providers": provider_catalog() }))
}

// ============================================================================
// Bot policy
// ============================================================================

async fn bot_get_config_handler(State(state): State<ControlState>) -> Json<Value> {
    let cfg = state.config.bot();
    Json(json!({ "ok": true, "config": &*cfg }))
}

async fn bot_update_config_handler(
    State(state): State<ControlState>,
    Json(patch): Json<BotConfigPatch>,
) -> Json<Value> {
    let updated = state.config.update_bot(patch);
    // Policy changes must revive a worker that previously exited.
    state.worker.ensure_running();
    Json(json!({ "ok": true, "config": &*updated }))
}

// ============================================================================
// Logs
// ============================================================================

#[derive(Debug, Deserialize)]
struct TailParams {
    lines: Option<usize>,
}

async fn logs_tail_handler(
    State(state): State<ControlState>,
    Query(params): Query<TailParams>,
) -> Json<Value> {
    let limit = params.lines.unwrap_or(200).clamp(1, 2000);

    let lines = match tokio::fs::read_to_string(&state.log_path).await {
        Ok(content) => {
            let mut tail: VecDeque<&str> = VecDeque::with_capacity(limit);
            for line in content.lines() {
                if tail.len() == limit {
                    tail.pop_front();
                }
                tail.push_back(line);
            }
            tail.into_iter().map(String::from).collect::<Vec<_>>()
        }
        Err(_) => Vec::new(),
    };

    Json(json!({ "ok": true, "lines": lines }))
}

// ============================================================================
// Control page
// ============================================================================

async fn ui_handler() -> Html<&'static str> {
    Html(ui::CONTROL_PAGE)
}
