//! Command line and logging

use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use filevault_sync::{ListViewConfig, SortDirection, SortKey, TypeFilter};
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::{fmt, EnvFilter};

/// FileVault command-line interface
#[derive(Parser, Debug)]
#[command(name = "filevault")]
#[command(about = "FileVault client with live server notifications", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Set log level (error, warn, info, debug, trace)
    #[arg(short, long, value_name = "LEVEL", default_value = "info")]
    pub log_level: String,

    /// Enable JSON structured logging
    #[arg(long)]
    pub json_logs: bool,

    /// Show timestamps in logs
    #[arg(long, value_name = "BOOL", default_value_t = true, action = ArgAction::Set)]
    pub timestamps: bool,

    /// Configuration file (default: <config_dir>/filevault/client.toml)
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Follow server events and keep the dashboard and file list current
    Watch {
        #[command(flatten)]
        view: ViewArgs,
    },

    /// List stored files once
    Files {
        #[command(flatten)]
        view: ViewArgs,
    },

    /// Show one file record and its analysis
    Show {
        /// File ID
        id: String,
    },

    /// Save a stored file (or its preview) to disk
    Download {
        /// File ID
        id: String,

        /// Output path (default: the stored filename)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Fetch the image preview instead of the file
        #[arg(long)]
        preview: bool,
    },

    /// Upload a file and report the server's verdict
    Upload {
        /// File to upload
        path: PathBuf,
    },
}

/// List view overrides
#[derive(Args, Debug, Clone, Default)]
pub struct ViewArgs {
    /// Case-insensitive filename filter
    #[arg(short, long)]
    pub search: Option<String>,

    /// all, document, image, spreadsheet, archive or other
    #[arg(short = 't', long = "type", value_name = "TYPE")]
    pub type_filter: Option<TypeFilter>,

    /// filename, size or upload_date
    #[arg(long, value_name = "KEY")]
    pub sort: Option<SortKey>,

    /// asc or desc
    #[arg(long, value_name = "ORDER")]
    pub order: Option<SortDirection>,
}

impl ViewArgs {
    /// Apply the overrides on top of the configured view
    pub fn apply(&self, mut view: ListViewConfig) -> ListViewConfig {
        if let Some(search) = &self.search {
            view.search_term = search.clone();
        }
        if let Some(type_filter) = self.type_filter {
            view.type_filter = type_filter;
        }
        // A new sort key starts ascending unless an order is given
        if let Some(sort) = self.sort {
            view.sort_key = sort;
            view.sort_direction = SortDirection::Ascending;
        }
        if let Some(order) = self.order {
            view.sort_direction = order;
        }
        view
    }
}

/// Initialize logging based on CLI configuration
///
/// Logs go to stderr so listings on stdout stay clean.
pub fn init_logging(cli: &Cli) -> Result<()> {
    let log_level = cli.log_level.parse::<Level>().with_context(|| {
        format!(
            "Invalid log level '{}'. Valid levels: error, warn, info, debug, trace",
            cli.log_level
        )
    })?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level.as_str()))
        .context("Failed to create log filter")?;

    let subscriber = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false);

    match (cli.json_logs, cli.timestamps) {
        (true, true) => subscriber.json().init(),
        (true, false) => subscriber.without_time().json().init(),
        (false, true) => subscriber.init(),
        (false, false) => subscriber.without_time().init(),
    }

    info!(
        "Logging initialized: level={}, json={}, timestamps={}",
        log_level, cli.json_logs, cli.timestamps
    );

    Ok(())
}
