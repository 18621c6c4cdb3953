pub mod archive;
pub mod catalog;
pub mod db_dump;
pub mod replication;
pub mod retention;

use chrono::Local;
use std::sync::Arc;
use tempfile::Builder as TempFileBuilder;

use crate::config::BackupSettings;
use crate::credentials::{CredentialMode, CredentialStaging};
use crate::errors::{BackupError, Result};
use crate::events::{EventSink, Operation};
use crate::orchestrator::OperationState;
use crate::process::ProcessRunner;
use crate::utils::platform::Platform;
use crate::utils::{find_executable, format_file_size};

use archive::ArchiveCipher;
use catalog::{BackupArchive, unique_archive_path};
use db_dump::MysqlDump;
use replication::ReplicationOutcome;
use retention::PruneReport;

pub const SNAPSHOT_FILE_PREFIX: &str = "db_dump_";

#[derive(Debug)]
pub enum ReplicationStatus {
    NotConfigured,
    Completed(ReplicationOutcome),
    /// Copy failed; the local archive is still valid.
    Failed(BackupError),
}

#[derive(Debug)]
pub struct BackupReport {
    pub archive: BackupArchive,
    pub replication: ReplicationStatus,
    pub pruned: Option<PruneReport>,
}

impl BackupReport {
    pub fn summary(&self) -> String {
        let replication = match &self.replication {
            ReplicationStatus::NotConfigured => "not configured".to_string(),
            ReplicationStatus::Completed(ReplicationOutcome::Skipped { .. }) => {
                "skipped".to_string()
            }
            ReplicationStatus::Completed(ReplicationOutcome::Replicated { destination, .. }) => {
                format!("copied to {}", destination.display())
            }
            ReplicationStatus::Failed(_) => "failed".to_string(),
        };
        let pruning = match &self.pruned {
            Some(report) if report.failures.is_empty() => {
                format!("{} old backup(s) removed", report.deleted.len())
            }
            Some(report) => format!(
                "{} old backup(s) removed, {} could not be deleted",
                report.deleted.len(),
                report.failures.len()
            ),
            None => "cleanup skipped".to_string(),
        };
        format!(
            "Backup completed: {} ({}); sync {}; {}",
            self.archive.file_name(),
            format_file_size(self.archive.size_bytes),
            replication,
            pruning
        )
    }
}

/// One full backup run: dump, encrypt, replicate, prune.
///
/// Credential files and the clear-text snapshot are deleted on every exit path.
pub async fn run_backup_flow(
    settings: &BackupSettings,
    runner: Arc<dyn ProcessRunner>,
    platform: Platform,
    events: &EventSink,
) -> Result<BackupReport> {
    let op = Operation::Backup;
    events.state(op, OperationState::Preparing).await;
    events.info("Starting backup process...").await;

    let password = settings
        .backup_password
        .as_deref()
        .ok_or_else(|| BackupError::PrerequisiteMissing("Backup password not configured".into()))?;
    let archiver_dir = settings
        .archiver_dir
        .as_deref()
        .ok_or_else(|| BackupError::PrerequisiteMissing("Archiver path not configured".into()))?;
    if !archiver_dir.is_dir() {
        return Err(BackupError::PrerequisiteMissing(format!(
            "Archiver directory not found: {}",
            archiver_dir.display()
        )));
    }
    let archiver = find_executable(Some(archiver_dir), platform.archiver_executable())?;
    let mysqldump = find_executable(settings.mysql_bin_dir.as_deref(), platform.dump_executable())?;
    if settings.retention_count < 1 {
        return Err(BackupError::PrerequisiteMissing(
            "Retention count must be at least 1".into(),
        ));
    }
    let profile = settings.resolve_profile()?;
    events
        .info(format!("Backing up database {} on {}", profile.database, profile.host))
        .await;

    tokio::fs::create_dir_all(&settings.backup_dir).await?;
    tokio::fs::create_dir_all(&settings.temp_dir).await?;

    let credentials = CredentialStaging::new(&settings.temp_dir, platform)
        .stage(&profile, CredentialMode::Dump, events)
        .await?;
    let snapshot = TempFileBuilder::new()
        .prefix(SNAPSHOT_FILE_PREFIX)
        .suffix(".sql")
        .tempfile_in(&settings.temp_dir)?
        .into_temp_path();

    events.state(op, OperationState::Dumping).await;
    let dumped = MysqlDump::new(mysqldump, runner.clone())
        .dump(&profile, &credentials, &snapshot, events)
        .await;
    credentials.release(events).await;
    dumped?;

    events.state(op, OperationState::Encrypting).await;
    let archive_path = unique_archive_path(&settings.backup_dir, &profile.database, &Local::now());
    ArchiveCipher::new(archiver, runner)
        .encrypt(&snapshot, password, &archive_path, events)
        .await?;
    // The archiver already moved the snapshot into the archive; this only
    // catches a tool that ignored -df.
    drop(snapshot);

    let archive = BackupArchive::from_path(&archive_path)?;
    events
        .success(format!("Backup created successfully: {}", archive.file_name()))
        .await;

    events.state(op, OperationState::Replicating).await;
    let replication = match &settings.replication_root {
        Some(root) => {
            match replication::replicate(&archive_path, root, settings.retention_count, events)
                .await
            {
                Ok(outcome) => ReplicationStatus::Completed(outcome),
                Err(e) => {
                    events.warning(format!("Cloud sync failed: {e}")).await;
                    ReplicationStatus::Failed(e)
                }
            }
        }
        None => {
            events
                .info("No replication root configured. Skipping cloud sync.")
                .await;
            ReplicationStatus::NotConfigured
        }
    };

    events.state(op, OperationState::Pruning).await;
    let pruned =
        match retention::prune(&settings.backup_dir, settings.retention_count, "local", events)
            .await
        {
            Ok(report) => {
                if !report.failures.is_empty() {
                    events
                        .warning(format!(
                            "{} old backup(s) could not be deleted",
                            report.failures.len()
                        ))
                        .await;
                }
                Some(report)
            }
            Err(e) => {
                events.warning(format!("Cleanup error: {e}")).await;
                None
            }
        };

    Ok(BackupReport {
        archive,
        replication,
        pruned,
    })
}
