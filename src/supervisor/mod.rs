//! Process supervisor for the external userbot process.
//!
//! A single-line PID marker file plus an OS liveness probe track the
//! supervised process; the file alone is never trusted (it may be stale).
//! Termination targets the whole process group so children spawned by the
//! supervised process are reaped too.

use nix::sys::signal::{kill, killpg, Signal};
use nix::unistd::Pid;
use std::os::unix::process::CommandExt;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Liveness polls performed by [`Supervisor::stop`] before giving up.
const STOP_POLL_ATTEMPTS: u32 = 100;
/// Delay between stop polls (ceiling: 100 × 100 ms = 10 s).
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(100);
/// Pause between stop and start during a restart, letting OS resources
/// release.
const RESTART_PAUSE: Duration = Duration::from_millis(500);

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("userbot already running")]
    AlreadyRunning,
    #[error("userbot not running")]
    NotRunning,
    #[error("no messaging session credential configured")]
    MissingCredential,
    #[error("failed to spawn userbot: {0}")]
    Spawn(#[from] std::io::Error),
}

impl SupervisorError {
    /// Stable wire identifier used in `{ok:false, error:...}` payloads.
    pub fn wire_code(&self) -> &'static str {
        match self {
            Self::AlreadyRunning => "already_running",
            Self::NotRunning => "not_running",
            Self::MissingCredential => "missing_telegram_session",
            Self::Spawn(_) => "spawn_failed",
        }
    }
}

/// How the supervisor determines whether a session credential is present.
pub enum CredentialPolicy {
    /// Reload `.env` and read the accepted env keys on each start.
    FromEnv,
    /// Fixed value, for tests.
    Fixed(Option<String>),
}

impl CredentialPolicy {
    fn resolve(&self) -> Option<String> {
        match self {
            Self::FromEnv => {
                // Pick up credential rotation without a restart.
                dotenvy::dotenv().ok();
                crate::session::credential_from_env()
            }
            Self::Fixed(value) => value.clone(),
        }
    }
}

pub struct Supervisor {
    pid_file: PathBuf,
    command: Vec<String>,
    credential: CredentialPolicy,
    /// Serializes lifecycle transitions. Without it, two concurrent start
    /// requests could both pass the liveness check and spawn twice.
    transition: Mutex<()>,
}

impl Supervisor {
    pub fn new(pid_file: PathBuf, command: Vec<String>, credential: CredentialPolicy) -> Self {
        Self {
            pid_file,
            command,
            credential,
            transition: Mutex::new(()),
        }
    }

    /// Supervisor configured from `FTG_PID_FILE` and `FTG_RUNNER_CMD`.
    pub fn from_env() -> Self {
        let pid_file = std::env::var("FTG_PID_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("ftg_runner.pid"));
        let command = std::env::var("FTG_RUNNER_CMD")
            .unwrap_or_else(|_| "bash ftg/run_ftg.sh".to_string())
            .split_whitespace()
            .map(String::from)
            .collect();
        Self::new(pid_file, command, CredentialPolicy::FromEnv)
    }

    /// Whether a live supervised process is on record. No side effects.
    pub fn status(&self) -> bool {
        self.live_pid().is_some()
    }

    /// Launch the supervised process detached in its own process group.
    pub async fn start(&self) -> Result<(), SupervisorError> {
        let _guard = self.transition.lock().await;
        self.start_locked()
    }

    /// Signal the supervised process group and wait (bounded) for death.
    ///
    /// Signaling errors are best-effort; if the process survives the poll
    /// ceiling the marker file is left in place so a retry can observe it.
    pub async fn stop(&self) -> Result<(), SupervisorError> {
        let _guard = self.transition.lock().await;
        self.stop_locked().await
    }

    /// Stop (if running) then start, with a brief pause between.
    pub async fn restart(&self) -> Result<(), SupervisorError> {
        let _guard = self.transition.lock().await;
        match self.stop_locked().await {
            Ok(()) | Err(SupervisorError::NotRunning) => {}
            Err(e) => return Err(e),
        }
        tokio::time::sleep(RESTART_PAUSE).await;
        self.start_locked()
    }

    fn start_locked(&self) -> Result<(), SupervisorError> {
        if self.live_pid().is_some() {
            return Err(SupervisorError::AlreadyRunning);
        }
        if self.credential.resolve().is_none() {
            return Err(SupervisorError::MissingCredential);
        }

        let (program, args) = self
            .command
            .split_first()
            .ok_or_else(|| SupervisorError::Spawn(std::io::Error::other("empty runner command")))?;

        let child = Command::new(program)
            .args(args)
            .env("NON_INTERACTIVE", "1")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .process_group(0)
            .spawn()?;

        self.write_pid(child.id() as i32)?;
        info!(pid = child.id(), "userbot started");
        Ok(())
    }

    async fn stop_locked(&self) -> Result<(), SupervisorError> {
        let pid = self.live_pid().ok_or(SupervisorError::NotRunning)?;

        // Prefer the whole group; fall back to the single PID if the group
        // signal fails (e.g. the child changed its group).
        if killpg(Pid::from_raw(pid), Signal::SIGTERM).is_err() {
            let _ = kill(Pid::from_raw(pid), Signal::SIGTERM);
        }

        for _ in 0..STOP_POLL_ATTEMPTS {
            if !is_pid_alive(pid) {
                let _ = std::fs::remove_file(&self.pid_file);
                info!(pid, "userbot stopped");
                return Ok(());
            }
            tokio::time::sleep(STOP_POLL_INTERVAL).await;
        }

        // Optimistic: report stopped, keep the marker so a later stop can
        // retry against the survivor.
        warn!(pid, "userbot still alive after stop ceiling");
        Ok(())
    }

    /// PID from the marker file, only if the process answers the liveness
    /// probe. Stale or unreadable markers are treated as absent.
    fn live_pid(&self) -> Option<i32> {
        let raw = std::fs::read_to_string(&self.pid_file).ok()?;
        let pid: i32 = raw.trim().parse().ok()?;
        is_pid_alive(pid).then_some(pid)
    }

    fn write_pid(&self, pid: i32) -> Result<(), SupervisorError> {
        if let Some(parent) = self.pid_file.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(&self.pid_file, pid.to_string())?;
        Ok(())
    }
}

/// Existence probe: signal 0 checks deliverability without delivering.
fn is_pid_alive(pid: i32) -> bool {
    kill(Pid::from_raw(pid), None).is_ok()
}
