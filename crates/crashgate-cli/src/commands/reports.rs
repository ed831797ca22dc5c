//! Reports command - Inspect and purge stored crash reports
//!
//! Provides the `crashgate reports` CLI command with subcommands:
//! - `list`: Show all stored reports, oldest first
//! - `view <id>`: Display one report and its exception chain
//! - `delete`: Remove one report, or every local artifact with `--all`

use anyhow::{Context, Result};
use clap::Subcommand;
use tracing::info;

use crashgate_core::config::CrashesConfig;
use crashgate_core::domain::{ExceptionInfo, ReportId};
use crashgate_storage::{ErrorStorage, StoredReport};

use crate::output::{format_size, get_formatter, Align, OutputFormat, Table};

/// Frames shown per exception in human output
const FRAMES_SHOWN: usize = 8;

/// Report management subcommands
#[derive(Debug, Subcommand)]
pub enum ReportsCommand {
    /// List stored crash reports
    List,
    /// View a specific report
    View {
        /// Report ID
        id: String,
        /// Show every frame instead of the top of each stack
        #[arg(long)]
        all_frames: bool,
    },
    /// Delete reports from local storage
    Delete {
        /// Specific report ID to delete
        id: Option<String>,
        /// Delete every report and minidump
        #[arg(long)]
        all: bool,
    },
}

impl ReportsCommand {
    pub async fn execute(&self, config: &CrashesConfig, format: OutputFormat) -> Result<()> {
        let storage = ErrorStorage::new(&config.storage.root);
        info!(root = %storage.root().display(), "Using report storage");

        match self {
            ReportsCommand::List => list(&storage, format),
            ReportsCommand::View { id, all_frames } => view(&storage, id, *all_frames, format),
            ReportsCommand::Delete { id, all } => delete(&storage, id.as_deref(), *all, format),
        }
    }
}

fn parse_id(id: &str) -> Result<ReportId> {
    id.parse::<ReportId>()
        .with_context(|| format!("'{}' is not a report ID", id))
}

fn status_of(report: &StoredReport) -> &'static str {
    if report.enqueued {
        "enqueued"
    } else {
        "pending"
    }
}

fn list(storage: &ErrorStorage, format: OutputFormat) -> Result<()> {
    let formatter = get_formatter(format);
    let reports = storage
        .list_stored_reports()
        .context("Failed to list stored reports")?;

    if format.is_json() {
        let json: Vec<serde_json::Value> = reports
            .iter()
            .map(|r| {
                serde_json::json!({
                    "id": r.log.id.to_string(),
                    "type": r.log.exception.kind,
                    "thread": r.log.error_thread_name,
                    "crashed_at": r.log.timestamp.to_rfc3339(),
                    "status": status_of(r),
                    "has_throwable": r.has_raw,
                    "size_bytes": r.size_bytes,
                })
            })
            .collect();
        formatter.print_json(&serde_json::json!(json));
        return Ok(());
    }

    if reports.is_empty() {
        formatter.info("No reports found.");
        return Ok(());
    }

    let mut table = Table::new()
        .column("ID", 36, Align::Left)
        .column("Crashed at", 19, Align::Left)
        .column("Type", 18, Align::Left)
        .column("Status", 8, Align::Left)
        .column("Size", 9, Align::Right);
    for report in &reports {
        table.row(vec![
            report.log.id.to_string(),
            report.log.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
            truncate(&report.log.exception.kind, 18),
            status_of(report).to_string(),
            format_size(report.size_bytes),
        ]);
    }
    table.print();
    println!();
    println!("Total: {} report(s)", reports.len());
    Ok(())
}

fn view(storage: &ErrorStorage, id: &str, all_frames: bool, format: OutputFormat) -> Result<()> {
    let formatter = get_formatter(format);
    let id = parse_id(id)?;

    let Some(log) = storage
        .read_error_log(&id)
        .with_context(|| format!("Failed to read report {}", id))?
    else {
        formatter.error(&format!("Report '{}' not found", id));
        return Ok(());
    };
    let throwable = storage.read_raw_failure(&id);
    let minidump = storage.pending_minidump(&id);

    if format.is_json() {
        let mut json = serde_json::to_value(&log).context("Failed to serialize report")?;
        if let Some(obj) = json.as_object_mut() {
            obj.insert(
                "throwable".into(),
                serde_json::to_value(&throwable).context("Failed to serialize throwable")?,
            );
            obj.insert(
                "enqueued".into(),
                serde_json::Value::Bool(storage.is_enqueued(&id)),
            );
            obj.insert(
                "minidump".into(),
                minidump
                    .as_ref()
                    .map(|p| serde_json::Value::String(p.display().to_string()))
                    .unwrap_or(serde_json::Value::Null),
            );
        }
        formatter.print_json(&json);
        return Ok(());
    }

    println!("Report:       {}", log.id);
    println!("Crashed at:   {}", log.timestamp.to_rfc3339());
    println!("App started:  {}", log.app_launch_timestamp.to_rfc3339());
    println!("Process:      {} ({})", log.process_name, log.process_id);
    println!("Thread:       {}", log.error_thread_name);
    println!(
        "App:          {} {}",
        log.device.app_name, log.device.app_version
    );
    println!(
        "OS:           {} {} ({})",
        log.device.os, log.device.arch, log.device.kernel
    );
    println!(
        "Status:       {}",
        if storage.is_enqueued(&id) { "enqueued" } else { "pending" }
    );
    println!(
        "Throwable:    {}",
        if throwable.is_some() {
            "available"
        } else {
            "not reconstructable"
        }
    );
    if let Some(path) = &minidump {
        println!("Minidump:     {}", path.display());
    }
    println!();

    let mut current = Some(&log.exception);
    let mut depth = 0;
    while let Some(exception) = current {
        print_exception(exception, depth, all_frames);
        current = exception.inner_exceptions.first();
        depth += 1;
    }
    Ok(())
}

fn print_exception(exception: &ExceptionInfo, depth: usize, all_frames: bool) {
    let heading = if depth == 0 { "Exception" } else { "Caused by" };
    match &exception.message {
        Some(message) => println!("{}: {}: {}", heading, exception.kind, message),
        None => println!("{}: {}", heading, exception.kind),
    }

    let shown = if all_frames {
        exception.frames.len()
    } else {
        FRAMES_SHOWN.min(exception.frames.len())
    };
    for frame in &exception.frames[..shown] {
        println!("    at {}", frame);
    }
    if shown < exception.frames.len() {
        println!("    ... {} more", exception.frames.len() - shown);
    }
}

fn delete(storage: &ErrorStorage, id: Option<&str>, all: bool, format: OutputFormat) -> Result<()> {
    let formatter = get_formatter(format);

    if all {
        let count = storage.delete_all();
        formatter.success(&format!("Deleted {} report(s)", count));
        return Ok(());
    }

    let Some(id) = id else {
        formatter.error("Specify a report ID or use --all");
        return Ok(());
    };
    let id = parse_id(id)?;
    if storage.log_path(&id).exists() {
        storage.delete_report(&id);
        formatter.success(&format!("Deleted report '{}'", id));
    } else {
        formatter.error(&format!("Report '{}' not found", id));
    }
    Ok(())
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        text.to_string()
    } else {
        let kept: String = text.chars().take(width.saturating_sub(1)).collect();
        format!("{}\u{2026}", kept)
    }
}
