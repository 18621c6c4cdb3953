pub mod db_restore;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::Builder as TempFileBuilder;

use crate::backup::archive::ArchiveCipher;
use crate::backup::catalog::is_archive_path;
use crate::config::BackupSettings;
use crate::credentials::{CredentialMode, CredentialStaging, StagedCredentialFile};
use crate::errors::{BackupError, Result};
use crate::events::{EventSink, Operation};
use crate::orchestrator::OperationState;
use crate::process::ProcessRunner;
use crate::profile::DatabaseConnectionProfile;
use crate::utils::find_executable;
use crate::utils::platform::Platform;

use db_restore::MysqlRestore;

pub const EXTRACT_DIR_PREFIX: &str = "restore_";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreReport {
    pub archive: PathBuf,
    pub database: String,
}

impl RestoreReport {
    pub fn summary(&self) -> String {
        format!(
            "Database {} restored successfully from {}",
            self.database,
            self.archive
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default()
        )
    }
}

struct RestoreTools {
    cipher: ArchiveCipher,
    client: MysqlRestore,
}

/// Decrypts `archive` and replays it into the configured database.
///
/// A wrong password stops the run before the `mysql` client is started.
pub async fn run_restore_flow(
    settings: &BackupSettings,
    runner: Arc<dyn ProcessRunner>,
    platform: Platform,
    archive: &Path,
    password: &str,
    events: &EventSink,
) -> Result<RestoreReport> {
    let op = Operation::Restore;
    events.state(op, OperationState::RestorePreparing).await;
    events
        .info(format!("Starting restore from {}", archive.display()))
        .await;

    if password.is_empty() {
        return Err(BackupError::PrerequisiteMissing(
            "Archive password is required".into(),
        ));
    }
    if !archive.is_file() {
        return Err(BackupError::PrerequisiteMissing(format!(
            "Backup file not found: {}",
            archive.display()
        )));
    }
    if !is_archive_path(archive) {
        return Err(BackupError::PrerequisiteMissing(format!(
            "Not a .rar backup archive: {}",
            archive.display()
        )));
    }
    let archiver_dir = settings
        .archiver_dir
        .as_deref()
        .ok_or_else(|| BackupError::PrerequisiteMissing("Archiver path not configured".into()))?;
    let archiver = find_executable(Some(archiver_dir), platform.archiver_executable())?;
    let mysql = find_executable(settings.mysql_bin_dir.as_deref(), platform.client_executable())?;
    let profile = settings.resolve_profile()?;
    tokio::fs::create_dir_all(&settings.temp_dir).await?;

    let tools = RestoreTools {
        cipher: ArchiveCipher::new(archiver, runner.clone()),
        client: MysqlRestore::new(mysql, runner),
    };
    let credentials = CredentialStaging::new(&settings.temp_dir, platform)
        .stage(&profile, CredentialMode::Client, events)
        .await?;

    let restored = extract_and_restore(
        &tools,
        settings,
        &profile,
        &credentials,
        archive,
        password,
        events,
    )
    .await;
    credentials.release(events).await;
    restored?;

    Ok(RestoreReport {
        archive: archive.to_path_buf(),
        database: profile.database,
    })
}

async fn extract_and_restore(
    tools: &RestoreTools,
    settings: &BackupSettings,
    profile: &DatabaseConnectionProfile,
    credentials: &StagedCredentialFile,
    archive: &Path,
    password: &str,
    events: &EventSink,
) -> Result<()> {
    let op = Operation::Restore;
    let extract_dir = TempFileBuilder::new()
        .prefix(EXTRACT_DIR_PREFIX)
        .tempdir_in(&settings.temp_dir)?;

    events.state(op, OperationState::Extracting).await;
    let snapshot = tools
        .cipher
        .decrypt(archive, password, extract_dir.path(), events)
        .await?;

    events.state(op, OperationState::Restoring).await;
    tools
        .client
        .restore(profile, credentials, &snapshot, events)
        .await?;

    let shown = extract_dir.path().to_path_buf();
    if let Err(e) = extract_dir.close() {
        events
            .warning(format!(
                "Failed to delete temp directory: {} ({e})",
                shown.display()
            ))
            .await;
    }
    Ok(())
}
