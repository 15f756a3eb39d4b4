//! Subcommand handlers

use crate::config::Config;
use anyhow::{bail, Context, Result};
use filevault_sync::{
    derive, ConnectionManager, ConnectionState, DashboardData, DashboardQuery, FileListQuery,
    FileRecord, FileStore, ListViewConfig, Notification, NotificationStore, RefreshTrigger,
    SelectedFile, SocketIoSource, UploadAttempt, UploadMachine, UploadOutcome, UploadPhase,
    Uploader, ViewSnapshot,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Follow push events until Ctrl-C
pub async fn watch(config: &Config, api: Arc<dyn FileStore>, view: ListViewConfig) -> Result<()> {
    let notifications = NotificationStore::new();
    let connection = config.connection_config();
    let source = SocketIoSource::from_config(&connection);
    let manager = ConnectionManager::new(Arc::new(source), notifications.clone(), connection);

    let dashboard = RefreshTrigger::spawn(DashboardQuery::new(api.clone()), notifications.subscribe());
    let files = RefreshTrigger::spawn(FileListQuery::new(api), notifications.subscribe());

    let mut status = manager.subscribe_status();
    let mut versions = notifications.subscribe();
    let mut dashboard_updates = dashboard.subscribe();
    let mut file_updates = files.subscribe();

    manager.start();
    info!("Watching for server events, press Ctrl-C to stop");

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut last_notice = 0u64;

    loop {
        tokio::select! {
            result = &mut ctrl_c => {
                result.context("Failed to listen for Ctrl-C")?;
                info!("Shutting down");
                break;
            }
            Ok(()) = status.changed() => {
                let current = *status.borrow_and_update();
                match current.state {
                    ConnectionState::Connected => println!("* connected"),
                    ConnectionState::Connecting if current.failed_attempts > 0 => println!(
                        "* reconnecting (attempt {} of {})",
                        current.failed_attempts + 1,
                        config.connection.max_attempts
                    ),
                    ConnectionState::Connecting => println!("* connecting"),
                    ConnectionState::Disconnected => {
                        println!("* disconnected; restart the watch to try again")
                    }
                }
            }
            Ok(()) = versions.changed() => {
                versions.borrow_and_update();
                last_notice = print_new_notices(&notifications.list(), last_notice);
            }
            Ok(()) = dashboard_updates.changed() => {
                let snapshot = dashboard_updates.borrow_and_update().clone();
                print_dashboard(&snapshot);
            }
            Ok(()) = file_updates.changed() => {
                let snapshot = file_updates.borrow_and_update().clone();
                if snapshot.loading {
                    continue;
                }
                if let Some(error) = &snapshot.error {
                    warn!("File list may be stale: {}", error);
                }
                if let Some(data) = &snapshot.data {
                    print_files(&derive(data, &view));
                }
            }
        }
    }

    manager.stop().await;
    dashboard.stop();
    files.stop();
    notifications.clear();
    Ok(())
}

/// Print notices newer than `last_seen`, oldest first; returns the newest id
fn print_new_notices(notices: &[Notification], last_seen: u64) -> u64 {
    let mut newest = last_seen;
    for notice in notices.iter().rev() {
        let id = notice.id.get();
        if id > last_seen {
            println!(
                "[{}] {} {}",
                notice.created_at.format("%H:%M:%S"),
                notice.kind,
                notice.message
            );
            newest = newest.max(id);
        }
    }
    newest
}

fn print_dashboard(snapshot: &ViewSnapshot<DashboardData>) {
    if snapshot.loading {
        return;
    }
    if let Some(error) = &snapshot.error {
        warn!("Dashboard may be stale: {}", error);
    }
    let Some(data) = &snapshot.data else {
        return;
    };
    let stats = &data.stats;
    let storage = stats
        .total_storage_formatted
        .clone()
        .unwrap_or_else(|| format_size(stats.total_storage));
    println!(
        "== {} files, {} duplicates, {} anomalies, {} stored",
        stats.total_files, stats.duplicates_detected, stats.anomalies_detected, storage
    );
}

/// Fetch, derive and print the file list
pub async fn files(api: &dyn FileStore, view: &ListViewConfig) -> Result<()> {
    let all = api.list_files().await.context("Failed to list files")?;
    let shown = derive(&all, view);
    print_files(&shown);
    if shown.len() != all.len() {
        println!("({} of {} files shown)", shown.len(), all.len());
    }
    Ok(())
}

pub async fn show(api: &dyn FileStore, id: &str) -> Result<()> {
    let record = api
        .file(id)
        .await
        .with_context(|| format!("Failed to fetch file {}", id))?;

    println!("ID:        {}", record.id);
    println!("Filename:  {}", record.filename);
    println!("Type:      {}", record.category());
    println!("Size:      {}", format_size(record.size));
    println!("Uploaded:  {}", format_date(&record));
    if let Some(content_type) = &record.content_type {
        println!("Content:   {}", content_type);
    }
    if let Some(checksum) = &record.checksum {
        println!("Checksum:  {}", checksum);
    }
    println!("Duplicate: {}", yes_no(record.is_duplicate()));
    println!("Anomaly:   {}", yes_no(record.is_anomaly()));
    if let Some(analysis) = &record.analysis {
        println!(
            "Analysis:\n{}",
            serde_json::to_string_pretty(analysis).context("Failed to format analysis")?
        );
    }
    Ok(())
}

pub async fn download(
    api: &dyn FileStore,
    id: &str,
    output: Option<PathBuf>,
    preview: bool,
) -> Result<()> {
    let record = api
        .file(id)
        .await
        .with_context(|| format!("Failed to fetch file {}", id))?;
    let stored_name = Path::new(&record.filename)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| record.id.clone());

    let (bytes, default_name) = if preview {
        let bytes = api.preview(id).await.context("Failed to fetch preview")?;
        (bytes, format!("preview-{}", stored_name))
    } else {
        let bytes = api.download(id).await.context("Failed to download file")?;
        (bytes, stored_name)
    };

    let output = output.unwrap_or_else(|| PathBuf::from(default_name));
    tokio::fs::write(&output, &bytes)
        .await
        .with_context(|| format!("Failed to write {}", output.display()))?;
    println!(
        "Saved {} ({}) to {}",
        record.filename,
        format_size(bytes.len() as u64),
        output.display()
    );
    Ok(())
}

/// Upload one file through the upload state machine
pub async fn upload(api: Arc<dyn Uploader>, notice_ttl: Duration, path: &Path) -> Result<()> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .context("Upload path has no file name")?;

    let notifications = NotificationStore::new();
    let machine = UploadMachine::with_notice_ttl(api, notifications.clone(), notice_ttl);
    let mut attempts = machine.subscribe();

    machine.select(SelectedFile::new(name, bytes))?;
    machine.submit()?;

    let mut reported = None;
    let attempt = loop {
        let attempt = attempts.borrow_and_update().clone();
        if attempt.phase.is_terminal() {
            break attempt;
        }
        if attempt.phase == UploadPhase::Uploading && reported != Some(attempt.progress_percent) {
            info!("Upload progress: {}%", attempt.progress_percent);
            reported = Some(attempt.progress_percent);
        }
        attempts
            .changed()
            .await
            .context("Upload state machine stopped")?;
    };

    for notice in notifications.list() {
        info!("{}: {}", notice.kind, notice.message);
    }
    report_upload(&attempt)
}

fn report_upload(attempt: &UploadAttempt) -> Result<()> {
    let Some(outcome) = &attempt.result else {
        bail!("Upload ended without a result");
    };

    println!("{}", outcome.message());
    match outcome {
        UploadOutcome::Succeeded { .. } => return Ok(()),
        UploadOutcome::Duplicate {
            existing_file,
            similarity,
            ..
        } => {
            if let Some(existing) = existing_file {
                println!(
                    "Existing file: {} (uploaded {})",
                    existing.filename,
                    existing.upload_date.as_deref().unwrap_or("unknown")
                );
            }
            println!("Similarity: {:.0}%", similarity * 100.0);
        }
        UploadOutcome::Anomaly { details, .. } => {
            for (key, value) in details {
                println!("  {}: {}", key, value);
            }
        }
        UploadOutcome::Failed { .. } => {}
    }
    bail!("Upload {}", attempt.phase)
}

fn print_files(files: &[FileRecord]) {
    if files.is_empty() {
        println!("No files");
        return;
    }
    println!(
        "{:<26} {:<40} {:>10}  {:<16}  {:<11}  FLAGS",
        "ID", "FILENAME", "SIZE", "UPLOADED", "TYPE"
    );
    for file in files {
        let mut flags = Vec::new();
        if file.is_duplicate() {
            flags.push("duplicate");
        }
        if file.is_anomaly() {
            flags.push("anomaly");
        }
        println!(
            "{:<26} {:<40} {:>10}  {:<16}  {:<11}  {}",
            file.id,
            file.filename,
            format_size(file.size),
            format_date(file),
            file.category(),
            flags.join(",")
        );
    }
}

fn format_date(file: &FileRecord) -> String {
    file.uploaded_at()
        .map(|date| date.format("%Y-%m-%d %H:%M").to_string())
        .or_else(|| file.upload_date_formatted.clone())
        .unwrap_or_else(|| file.upload_date.clone())
}

fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "yes"
    } else {
        "no"
    }
}
