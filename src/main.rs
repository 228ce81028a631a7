use clap::Parser;
use ftg_control::cli::{Cli, Commands};
use ftg_control::config::ConfigStore;
use ftg_control::logging;
use ftg_control::server::{serve, ServeOptions};
use ftg_control::session::{BridgeConnector, SessionConnector};
use std::path::PathBuf;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let log_path = std::env::var("FTG_LOG_FILE")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("ftg.log"));
    logging::init(&log_path);

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve(opts) => {
            info!("Starting FTG control server");
            serve(ServeOptions {
                bind: opts.bind,
                port: opts.port,
            })
            .await?;
        }
        Commands::Send(opts) => {
            let connector = BridgeConnector::from_env();
            let mut session = connector.connect().await?;
            let result = session.send_message(&opts.chat, &opts.text).await;
            session.disconnect().await;
            result?;
            info!("Message sent");
        }
        Commands::Config => {
            let store = ConfigStore::from_env();
            let view = serde_json::json!({
                "llm": store.llm().redacted(),
                "bot": &*store.bot(),
            });
            println!("{}", serde_json::to_string_pretty(&view)?);
        }
        Commands::Version => {
            println!("ftgctl {}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
