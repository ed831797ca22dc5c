//! Minidumps command - Show native crash artifacts in the storage directory
//!
//! Lists dumps still in `minidump/new` (not yet associated with a report)
//! and dumps in `minidump/pending/{id}` waiting to be sent with report `id`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;

use crashgate_core::config::CrashesConfig;
use crashgate_core::domain::ReportId;
use crashgate_storage::ErrorStorage;

use crate::output::{format_size, get_formatter, Align, OutputFormat, Table};

#[derive(Debug, Args)]
pub struct MinidumpsCommand {
    /// Only show dumps already associated with a report
    #[arg(long)]
    pending: bool,
}

#[derive(Debug)]
struct MinidumpEntry {
    path: PathBuf,
    report: Option<ReportId>,
    size_bytes: u64,
}

impl MinidumpsCommand {
    pub async fn execute(&self, config: &CrashesConfig, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(format);
        let storage = ErrorStorage::new(&config.storage.root);

        let mut entries = if self.pending {
            Vec::new()
        } else {
            new_minidumps(&storage)?
        };
        entries.extend(pending_minidumps(&storage)?);

        if format.is_json() {
            let json: Vec<serde_json::Value> = entries
                .iter()
                .map(|e| {
                    serde_json::json!({
                        "path": e.path.display().to_string(),
                        "report_id": e.report.map(|id| id.to_string()),
                        "size_bytes": e.size_bytes,
                    })
                })
                .collect();
            formatter.print_json(&serde_json::json!(json));
            return Ok(());
        }

        if entries.is_empty() {
            formatter.info("No minidumps found.");
            return Ok(());
        }

        let mut table = Table::new()
            .column("Report", 36, Align::Left)
            .column("Size", 9, Align::Right)
            .column("Path", 4, Align::Left);
        for entry in &entries {
            table.row(vec![
                entry
                    .report
                    .map(|id| id.to_string())
                    .unwrap_or_else(|| "(not associated)".to_string()),
                format_size(entry.size_bytes),
                entry.path.display().to_string(),
            ]);
        }
        table.print();
        Ok(())
    }
}

fn entry(path: PathBuf, report: Option<ReportId>) -> MinidumpEntry {
    let size_bytes = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
    MinidumpEntry {
        path,
        report,
        size_bytes,
    }
}

fn new_minidumps(storage: &ErrorStorage) -> Result<Vec<MinidumpEntry>> {
    let dumps = storage
        .list_new_minidumps()
        .context("Failed to list new minidumps")?;
    Ok(dumps.into_iter().map(|path| entry(path, None)).collect())
}

fn pending_minidumps(storage: &ErrorStorage) -> Result<Vec<MinidumpEntry>> {
    let dir = storage.pending_minidump_directory();
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut entries = Vec::new();
    let items =
        std::fs::read_dir(&dir).with_context(|| format!("Failed to read {}", dir.display()))?;
    for item in items {
        let item = item?;
        let Some(id) = report_id_of(&item.path()) else {
            continue;
        };
        if let Some(path) = storage.pending_minidump(&id) {
            entries.push(entry(path, Some(id)));
        }
    }
    entries.sort_by(|a, b| a.report.cmp(&b.report));
    Ok(entries)
}

fn report_id_of(path: &Path) -> Option<ReportId> {
    path.file_name()?.to_str()?.parse().ok()
}
