pub mod cli;
pub mod config;
pub mod llm;
pub mod logging;
pub mod server;
pub mod session;
pub mod supervisor;
pub mod worker;
