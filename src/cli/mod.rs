use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "ftgctl", version, about = "Control plane for a personal chat-automation agent")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the control server.
    Serve(ServeOpts),
    /// Send a one-shot message through the messaging session.
    Send(SendOpts),
    /// Print the current configuration (secrets redacted).
    Config,
    Version,
}

#[derive(clap::Args)]
pub struct ServeOpts {
    #[arg(short, long, env = "FTG_CONTROL_BIND", default_value = "127.0.0.1")]
    pub bind: String,
    #[arg(short, long, env = "FTG_CONTROL_PORT", default_value_t = 8765)]
    pub port: u16,
}

#[derive(clap::Args)]
pub struct SendOpts {
    /// Username or numeric chat id.
    pub chat: String,
    pub text: String,
}
