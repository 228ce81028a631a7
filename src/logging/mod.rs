use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::prelude::*;

/// Initialize tracing with an env-filtered stdout layer plus a plain-text
/// append layer writing `log_path`. The file is what `/logs/tail` serves.
/// Falls back to stdout-only if the file cannot be opened.
pub fn init(log_path: &Path) {
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive("ftg_control=info".parse().unwrap());

    let stdout_layer = tracing_subscriber::fmt::layer();

    let file_layer = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .ok()
        .map(|file| {
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Arc::new(file))
        });

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();
}
