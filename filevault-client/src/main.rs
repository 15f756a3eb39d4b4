mod commands;
mod config;
mod diagnostics;

use anyhow::{Context, Result};
use clap::Parser;
use diagnostics::{Cli, Command};
use filevault_sync::HttpFileStore;
use std::sync::Arc;
use tracing::info;

use config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let cli = Cli::parse();

    // Initialize logging with CLI configuration
    diagnostics::init_logging(&cli).context("Failed to initialize logging")?;

    // Load configuration
    let config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;
    info!("API endpoint: {}", config.server.api_url);
    info!("Event endpoint: {}", config.server.events_url);

    let api = Arc::new(
        HttpFileStore::new(&config.http_config()).context("Failed to create HTTP client")?,
    );

    match cli.command {
        Command::Watch { view } => {
            let view = view.apply(config.list_view()?);
            commands::watch(&config, api, view).await
        }
        Command::Files { view } => {
            let view = view.apply(config.list_view()?);
            commands::files(api.as_ref(), &view).await
        }
        Command::Show { id } => commands::show(api.as_ref(), &id).await,
        Command::Download {
            id,
            output,
            preview,
        } => commands::download(api.as_ref(), &id, output, preview).await,
        Command::Upload { path } => commands::upload(api, config.notice_ttl(), &path).await,
    }
}
