//! Auto-reply worker.
//!
//! A long-lived task attaches to a Messaging Session, classifies each
//! incoming message through the [`pipeline`], applies the per-chat
//! cooldown, and optionally calls the LLM gateway before replying. The
//! worker never lets a per-message failure terminate its event loop.

mod pipeline;

pub use pipeline::{
    ai_trigger_prompt, classify_command, decide, BuiltinCommand, Decision, IgnoreReason,
    DEFAULT_SYSTEM_PROMPT, HELP_REPLY, PONG_REPLY,
};

use crate::config::ConfigStore;
use crate::llm::{ChatOptions, LlmClient};
use crate::session::{MessagingSession, SessionConnector};

use parking_lot::Mutex;
use rand::Rng;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

// ============================================================================
// Stop signal
// ============================================================================

/// Cooperative stop signal for the worker task. Signal once, await many;
/// safe to trigger before any waiter registers.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    stopped: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.stopped.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    pub fn is_triggered(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    pub async fn wait(&self) {
        loop {
            // Register before checking the flag so a trigger between the
            // check and the await is not lost.
            let notified = self.notify.notified();
            if self.stopped.load(Ordering::Acquire) {
                return;
            }
            notified.await;
        }
    }
}

// ============================================================================
// Reply throttle
// ============================================================================

/// Per-chat cooldown state keyed on a monotonic clock. Commands and
/// LLM-triggered replies share the same timestamp.
#[derive(Default)]
pub struct ReplyThrottle {
    last_reply: Mutex<HashMap<i64, Instant>>,
}

impl ReplyThrottle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a reply in this chat is allowed under the given interval.
    pub fn ready(&self, chat_id: i64, min_interval: Duration) -> bool {
        if min_interval.is_zero() {
            return true;
        }
        match self.last_reply.lock().get(&chat_id) {
            Some(last) => last.elapsed() >= min_interval,
            None => true,
        }
    }

    /// Record a reply in this chat at the current instant.
    pub fn stamp(&self, chat_id: i64) {
        self.last_reply.lock().insert(chat_id, Instant::now());
    }
}

// ============================================================================
// Worker
// ============================================================================

struct RunningWorker {
    stop: StopSignal,
    handle: JoinHandle<()>,
}

/// Owns the single worker task and its cooldown state.
pub struct AutoReplyWorker {
    config: Arc<ConfigStore>,
    llm: Arc<LlmClient>,
    connector: Arc<dyn SessionConnector>,
    throttle: Arc<ReplyThrottle>,
    task: Mutex<Option<RunningWorker>>,
}

impl AutoReplyWorker {
    pub fn new(
        config: Arc<ConfigStore>,
        llm: Arc<LlmClient>,
        connector: Arc<dyn SessionConnector>,
    ) -> Self {
        Self {
            config,
            llm,
            connector,
            throttle: Arc::new(ReplyThrottle::new()),
            task: Mutex::new(None),
        }
    }

    /// Idempotent: spawn the worker task unless one is already active.
    ///
    /// The worker stays attached independently of the supervised process —
    /// command handling must work even when the userbot instance is
    /// stopped. A worker that exited (e.g. session-establish failure) is
    /// replaced on the next call.
    pub fn ensure_running(&self) {
        let mut slot = self.task.lock();
        if let Some(running) = slot.as_ref() {
            if !running.handle.is_finished() {
                return;
            }
        }

        let stop = StopSignal::new();
        let ctx = WorkerContext {
            config: self.config.clone(),
            llm: self.llm.clone(),
            throttle: self.throttle.clone(),
        };
        let connector = self.connector.clone();
        let handle = tokio::spawn(run_worker(connector, ctx, stop.clone()));
        *slot = Some(RunningWorker { stop, handle });
        info!("auto-reply worker started");
    }

    /// Signal the worker to stop; it detaches from the session best-effort.
    pub fn stop(&self) {
        if let Some(running) = self.task.lock().take() {
            running.stop.trigger();
        }
    }

    /// Whether a worker task is currently active.
    pub fn is_active(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .is_some_and(|r| !r.handle.is_finished())
    }
}

struct WorkerContext {
    config: Arc<ConfigStore>,
    llm: Arc<LlmClient>,
    throttle: Arc<ReplyThrottle>,
}

async fn run_worker(
    connector: Arc<dyn SessionConnector>,
    ctx: WorkerContext,
    stop: StopSignal,
) {
    // Session-establish failures exit quietly; a later ensure_running call
    // (config update, supervisor action) retries.
    let mut session = match connector.connect().await {
        Ok(session) => session,
        Err(e) => {
            warn!(error = %e, "auto-reply worker could not establish session");
            return;
        }
    };

    let me = session.me();
    info!(username = ?me.username, "auto-reply worker attached");

    loop {
        let event = tokio::select! {
            _ = stop.wait() => break,
            event = session.next_event() => match event {
                Some(event) => event,
                None => {
                    info!("message stream ended, worker exiting");
                    break;
                }
            },
        };

        handle_event(&ctx, session.as_ref(), &me, &event).await;
    }

    session.disconnect().await;
    debug!("auto-reply worker detached");
}

/// Process one event. Every failure is logged and swallowed.
async fn handle_event(
    ctx: &WorkerContext,
    session: &dyn MessagingSession,
    me: &crate::session::AccountIdentity,
    event: &crate::session::MessageEvent,
) {
    let cfg = ctx.config.bot();
    let decision = decide(&cfg, event, me);

    // Self-filter runs before the cooldown so plain own messages never
    // consult throttle state.
    if decision == Decision::Ignore(IgnoreReason::SelfMessage) {
        return;
    }

    let interval = Duration::from_secs(cfg.min_reply_interval_seconds);
    if !ctx.throttle.ready(event.chat_id, interval) {
        debug!(chat_id = event.chat_id, "cooldown active, dropping event");
        return;
    }

    let prompt = match decision {
        Decision::Ignore(reason) => {
            debug!(chat_id = event.chat_id, ?reason, "event dropped");
            return;
        }
        Decision::Command(cmd) => {
            if let Err(e) = session.reply(event, cmd.reply()).await {
                warn!(error = %e, "command reply failed");
                return;
            }
            ctx.throttle.stamp(event.chat_id);
            return;
        }
        Decision::Prompt { text, explicit } => {
            debug!(chat_id = event.chat_id, explicit, "generating reply");
            text
        }
    };

    if cfg.humanize_typing_enabled {
        if !cfg.silent_reading {
            // Presence indicator is non-essential.
            let _ = session.set_typing(event.chat_id).await;
        }
        let delay_ms = {
            let low = cfg.typing_min_ms;
            let high = cfg.typing_max_ms.max(low);
            rand::thread_rng().gen_range(low..=high)
        };
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    }

    let system = if cfg.reply_prompt.is_empty() {
        DEFAULT_SYSTEM_PROMPT.to_string()
    } else {
        cfg.reply_prompt.clone()
    };

    let llm_cfg = ctx.config.llm();
    let answer = match ctx
        .llm
        .chat(
            &llm_cfg,
            &prompt,
            ChatOptions {
                system: Some(system),
                ..Default::default()
            },
        )
        .await
    {
        Ok(text) => text,
        Err(e) => {
            warn!(chat_id = event.chat_id, error = %e, "LLM generation failed");
            return;
        }
    };

    if answer.is_empty() {
        debug!(chat_id = event.chat_id, "empty LLM answer, nothing sent");
        return;
    }

    match session.reply(event, &answer).await {
        Ok(()) => ctx.throttle.stamp(event.chat_id),
        Err(e) => warn!(chat_id = event.chat_id, error = %e, "reply delivery failed"),
    }
}
