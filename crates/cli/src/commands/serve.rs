//! Serve command handler.

use crate::server;
use clap::Args;
use marquee_core::{config::AppConfig, AppResult};

/// Serve the search API over HTTP
#[derive(Args, Debug)]
pub struct ServeCommand {
    /// Address to bind (default from config, e.g. 127.0.0.1:8081)
    #[arg(long)]
    pub bind: Option<String>,
}

impl ServeCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing serve command");
        server::run(config, self.bind.clone()).await
    }
}
