//! Request gate: sliding-window rate limiting followed by token auth.
//!
//! Every route is rate-limited; only the static control page skips the
//! token check. The token is re-read per request so rotation takes effect
//! without a restart.

use crate::server::ControlState;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use subtle::ConstantTimeEq;
use tracing::debug;

/// Header carrying the control token.
pub const TOKEN_HEADER: &str = "x-ftg-token";

const DEFAULT_RATE_WINDOW: Duration = Duration::from_secs(2);
const DEFAULT_RATE_MAX: usize = 10;

/// Per-process, in-memory sliding-window limiter keyed by client address.
/// Approximate by design — not a strict token bucket, not distributed.
pub struct RateLimiter {
    window: Duration,
    max_requests: usize,
    state: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl RateLimiter {
    pub fn new(window: Duration, max_requests: usize) -> Self {
        Self {
            window,
            max_requests,
            state: Mutex::new(HashMap::new()),
        }
    }

    /// Record a request for `key` and report whether it is within limits.
    ///
    /// Rejected requests still count toward the window, so a client
    /// hammering the endpoint stays saturated until it backs off.
    pub fn allow(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut state = self.state.lock();
        let timestamps = state.entry(key.to_string()).or_default();
        while timestamps
            .front()
            .is_some_and(|t| now.duration_since(*t) > self.window)
        {
            timestamps.pop_front();
        }
        timestamps.push_back(now);
        timestamps.len() <= self.max_requests
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_RATE_WINDOW, DEFAULT_RATE_MAX)
    }
}

/// Axum middleware enforcing rate limit then auth, in that order.
pub async fn request_gate(
    State(state): State<ControlState>,
    request: Request,
    next: Next,
) -> Response {
    let key = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip().to_string())
        .unwrap_or_else(|| "local".to_string());

    if !state.rate_limiter.allow(&key) {
        debug!(%key, "request rejected by rate limiter");
        return gate_error(StatusCode::TOO_MANY_REQUESTS, "too_many_requests");
    }

    // The static control page is the only unauthenticated route; it still
    // counts toward the rate limit above.
    if request.uri().path() == "/ui" {
        return next.run(request).await;
    }

    let expected = state.config.security().control_token;
    let provided = request
        .headers()
        .get(TOKEN_HEADER)
        .and_then(|v| v.to_str().ok());

    if !provided.is_some_and(|token| safe_equal(token, &expected)) {
        return gate_error(StatusCode::UNAUTHORIZED, "unauthorized");
    }

    next.run(request).await
}

fn gate_error(status: StatusCode, code: &str) -> Response {
    (
        status,
        Json(serde_json::json!({ "ok": false, "error": code })),
    )
        .into_response()
}

/// Timing-safe string comparison.
fn safe_equal(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.as_bytes().ct_eq(b.as_bytes()).into()
}
