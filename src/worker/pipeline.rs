//! Per-message decision pipeline.
//!
//! Each stage yields an explicit value so every decision point is testable
//! on its own: self-filter, command match, explicit AI trigger, then the
//! passive allow/block/mode policy. The cooldown stage is stateful and
//! lives in the worker loop.

use crate::config::{AutoReplyMode, BotConfig};
use crate::session::{chat_matches, AccountIdentity, MessageEvent};

/// Prefix characters that mark a message as a command.
pub const COMMAND_PREFIXES: [char; 2] = ['.', '!'];

/// System prompt used when `reply_prompt` is empty.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a concise helpful assistant.";

pub const PONG_REPLY: &str = "pong";

pub const HELP_REPLY: &str = "Commands: .ping / .пинг — check the bot; \
.help / .помощь — this text; .ai <prompt>, ai:, ии:, бот, <prompt> — ask the AI.";

const PING_WORDS: [&str; 2] = ["ping", "пинг"];
const HELP_WORDS: [&str; 2] = ["help", "помощь"];

/// Explicit "ask AI" prefixes. Matching is case-insensitive; the remainder
/// of the message becomes the prompt.
const AI_TRIGGERS: [&str; 5] = [".ai ", "!ai ", "ai:", "ии:", "бот,"];

/// Built-in commands handled without the LLM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinCommand {
    Ping,
    Help,
}

impl BuiltinCommand {
    pub fn reply(&self) -> &'static str {
        match self {
            Self::Ping => PONG_REPLY,
            Self::Help => HELP_REPLY,
        }
    }
}

/// Why an event produced no action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Own message that is not a command.
    SelfMessage,
    /// Auto-reply disabled and no explicit trigger.
    Disabled,
    Blocklisted,
    NotAllowlisted,
    ModeOff,
    NotMentioned,
}

/// Outcome of the stateless pipeline stages for one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Ignore(IgnoreReason),
    Command(BuiltinCommand),
    Prompt {
        text: String,
        /// True when produced by an explicit AI trigger (bypasses passive
        /// gating).
        explicit: bool,
    },
}

/// Evaluate one event against the bot policy.
pub fn decide(cfg: &BotConfig, event: &MessageEvent, me: &AccountIdentity) -> Decision {
    // Own messages are only ever command invocations; anything else would
    // feed replies back into the pipeline.
    if event.outgoing && !starts_with_command_prefix(&event.text) {
        return Decision::Ignore(IgnoreReason::SelfMessage);
    }

    if let Some(cmd) = classify_command(&event.text) {
        return Decision::Command(cmd);
    }

    if let Some(prompt) = ai_trigger_prompt(&event.text) {
        return Decision::Prompt {
            text: prompt,
            explicit: true,
        };
    }

    if event.outgoing {
        return Decision::Ignore(IgnoreReason::SelfMessage);
    }

    match passive_gate(cfg, event, me) {
        Ok(()) => Decision::Prompt {
            text: event.text.clone(),
            explicit: false,
        },
        Err(reason) => Decision::Ignore(reason),
    }
}

/// Allow/block and mode gating for the passive auto-reply path.
///
/// Blocklist wins over allowlist; empty lists impose no restriction.
fn passive_gate(
    cfg: &BotConfig,
    event: &MessageEvent,
    me: &AccountIdentity,
) -> Result<(), IgnoreReason> {
    if !cfg.auto_reply_enabled {
        return Err(IgnoreReason::Disabled);
    }
    if chat_matches(event, &cfg.blocklist) {
        return Err(IgnoreReason::Blocklisted);
    }
    if !cfg.allowlist.is_empty() && !chat_matches(event, &cfg.allowlist) {
        return Err(IgnoreReason::NotAllowlisted);
    }
    match cfg.auto_reply_mode {
        AutoReplyMode::Off => Err(IgnoreReason::ModeOff),
        AutoReplyMode::All => Ok(()),
        AutoReplyMode::MentionsOnly => {
            if mentions_account(event, me) {
                Ok(())
            } else {
                Err(IgnoreReason::NotMentioned)
            }
        }
    }
}

fn starts_with_command_prefix(text: &str) -> bool {
    text.trim_start()
        .chars()
        .next()
        .is_some_and(|c| COMMAND_PREFIXES.contains(&c))
}

/// Match `.ping` / `!help` style literals, case-insensitive, in both
/// supported languages.
pub fn classify_command(text: &str) -> Option<BuiltinCommand> {
    let trimmed = text.trim();
    let mut chars = trimmed.chars();
    if !chars.next().is_some_and(|c| COMMAND_PREFIXES.contains(&c)) {
        return None;
    }
    let word = chars.as_str().trim().to_lowercase();
    if PING_WORDS.contains(&word.as_str()) {
        return Some(BuiltinCommand::Ping);
    }
    if HELP_WORDS.contains(&word.as_str()) {
        return Some(BuiltinCommand::Help);
    }
    None
}

/// Extract the prompt from an explicit AI trigger, if any.
pub fn ai_trigger_prompt(text: &str) -> Option<String> {
    let trimmed = text.trim_start();
    let lower = trimmed.to_lowercase();
    for trigger in AI_TRIGGERS {
        if lower.starts_with(trigger) {
            let rest = trimmed.get(trigger.len()..)?.trim();
            if !rest.is_empty() {
                return Some(rest.to_string());
            }
        }
    }
    None
}

/// Mention detection: explicit flag, or the account handle appearing in the
/// text. With no handle on record only the flag counts.
fn mentions_account(event: &MessageEvent, me: &AccountIdentity) -> bool {
    if event.mentions_me {
        return true;
    }
    match me.username.as_deref() {
        Some(handle) if !handle.is_empty() => {
            let needle = handle.trim_start_matches('@').to_lowercase();
            event.text.to_lowercase().contains(&needle)
        }
        _ => false,
    }
}
