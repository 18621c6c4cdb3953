use std::path::{Path, PathBuf};

use super::catalog::{BackupArchive, list_archives};
use crate::errors::{BackupError, Result};
use crate::events::EventSink;

pub const MAX_BACKUP_RETENTION: usize = 4;

#[derive(Debug, Default)]
pub struct PruneReport {
    pub found: usize,
    pub deleted: Vec<PathBuf>,
    /// `PruneEntryFailed` for every archive that could not be removed.
    pub failures: Vec<BackupError>,
}

/// Keeps the `keep` most recently modified archives in `location` and deletes the rest.
///
/// A failed delete is recorded and logged; the remaining archives are still pruned.
/// `label` only names the location in log lines ("local", "Google Drive", ...).
pub async fn prune(
    location: &Path,
    keep: usize,
    label: &str,
    events: &EventSink,
) -> Result<PruneReport> {
    if !location.exists() {
        events
            .info(format!(
                "No cleanup needed in {label}: {} does not exist",
                location.display()
            ))
            .await;
        return Ok(PruneReport::default());
    }

    events
        .info(format!("Cleaning up old backups from {label}..."))
        .await;

    let archives = list_archives(location)?;
    let mut report = PruneReport {
        found: archives.len(),
        ..PruneReport::default()
    };

    if archives.len() <= keep {
        events
            .info(format!(
                "No cleanup needed in {label} ({} backup(s) found)",
                archives.len()
            ))
            .await;
        return Ok(report);
    }

    let expired = &archives[keep..];
    events
        .info(format!(
            "Keeping {keep} newest backups, deleting {} old backup(s) from {label}",
            expired.len()
        ))
        .await;

    remove_expired(expired, &mut report, events).await;
    Ok(report)
}

async fn remove_expired(expired: &[BackupArchive], report: &mut PruneReport, events: &EventSink) {
    for archive in expired {
        match tokio::fs::remove_file(&archive.path).await {
            Ok(()) => {
                events
                    .info(format!("Deleted old backup: {}", archive.file_name()))
                    .await;
                report.deleted.push(archive.path.clone());
            }
            // Someone else got there first.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                report.deleted.push(archive.path.clone());
            }
            Err(e) => {
                let failure = BackupError::PruneEntryFailed {
                    path: archive.path.clone(),
                    reason: e.to_string(),
                };
                events.error(failure.to_string()).await;
                report.failures.push(failure);
            }
        }
    }
}
