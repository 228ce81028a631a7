//! Control server: composes the config store, LLM gateway client, process
//! supervisor, and auto-reply worker behind the HTTP API.

pub mod gate;
pub mod routes;
mod ui;

pub use gate::RateLimiter;
pub use routes::build_routes;

use crate::config::ConfigStore;
use crate::llm::LlmClient;
use crate::session::{BridgeConnector, SessionConnector};
use crate::supervisor::Supervisor;
use crate::worker::AutoReplyWorker;

use anyhow::Result;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::signal;
use tracing::info;

/// Shared state for the control server.
#[derive(Clone)]
pub struct ControlState {
    pub config: Arc<ConfigStore>,
    pub llm: Arc<LlmClient>,
    pub supervisor: Arc<Supervisor>,
    pub worker: Arc<AutoReplyWorker>,
    pub connector: Arc<dyn SessionConnector>,
    pub rate_limiter: Arc<RateLimiter>,
    pub log_path: PathBuf,
    pub start_time: Instant,
    pub version: String,
}

impl ControlState {
    /// Assemble production state from the environment.
    pub fn from_env() -> Self {
        let config = Arc::new(ConfigStore::from_env());
        let llm = Arc::new(LlmClient::new());
        let connector: Arc<dyn SessionConnector> = Arc::new(BridgeConnector::from_env());
        let worker = Arc::new(AutoReplyWorker::new(
            config.clone(),
            llm.clone(),
            connector.clone(),
        ));
        let log_path = std::env::var("FTG_LOG_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("ftg.log"));

        Self {
            config,
            llm,
            supervisor: Arc::new(Supervisor::from_env()),
            worker,
            connector,
            rate_limiter: Arc::new(RateLimiter::default()),
            log_path,
            start_time: Instant::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Listener options resolved by the CLI.
pub struct ServeOptions {
    pub bind: String,
    pub port: u16,
}

/// Run the control server until a shutdown signal arrives.
///
/// Failure to bind the listener is the only fatal startup condition.
pub async fn serve(opts: ServeOptions) -> Result<()> {
    let state = ControlState::from_env();
    let addr: SocketAddr = format!("{}:{}", opts.bind, opts.port).parse()?;

    let app = build_routes(state.clone());
    let listener = tokio::net::TcpListener::bind(addr).await?;

    // The worker is attached regardless of whether the supervised process
    // is running: command handling must work either way.
    state.worker.ensure_running();

    print_startup_banner(&state, &addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    state.worker.stop();
    info!("control server shut down gracefully");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown");
        }
    }
}

fn print_startup_banner(state: &ControlState, addr: &SocketAddr) {
    info!("-------------------------------------------");
    info!("  FTG Control v{}", state.version);
    info!("  Listening on: http://{}", addr);
    info!("  Health: http://{}/health", addr);
    info!("  Control page: http://{}/ui", addr);
    info!("  Log file: {}", state.log_path.display());
    info!("-------------------------------------------");
}
