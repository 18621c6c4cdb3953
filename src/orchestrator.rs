//! Single-slot coordinator for backup and restore runs.
//!
//! Runs execute on a spawned tokio task. Only one run may be active per
//! orchestrator; a second request is rejected with [`BackupError::Busy`] instead
//! of being queued.

use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;

use crate::backup::catalog::{self, BackupArchive};
use crate::backup::{self, BackupReport};
use crate::config::BackupSettings;
use crate::errors::{BackupError, Result};
use crate::events::{EventSink, Operation, RunOutcome};
use crate::process::{ProcessRunner, SystemProcessRunner};
use crate::restore::{self, RestoreReport};
use crate::utils::platform::Platform;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationState {
    Idle,
    Preparing,
    Dumping,
    Encrypting,
    Replicating,
    Pruning,
    Done,
    Failed,
    RestorePreparing,
    Extracting,
    Restoring,
}

pub struct BackupOrchestrator {
    settings: Arc<BackupSettings>,
    runner: Arc<dyn ProcessRunner>,
    platform: Platform,
    slot: Arc<Semaphore>,
    events: EventSink,
}

impl BackupOrchestrator {
    pub fn new(settings: BackupSettings, events: EventSink) -> Self {
        Self::with_runner(
            settings,
            Arc::new(SystemProcessRunner),
            Platform::detect(),
            events,
        )
    }

    pub fn with_runner(
        settings: BackupSettings,
        runner: Arc<dyn ProcessRunner>,
        platform: Platform,
        events: EventSink,
    ) -> Self {
        Self {
            settings: Arc::new(settings),
            runner,
            platform,
            slot: Arc::new(Semaphore::new(1)),
            events,
        }
    }

    pub fn settings(&self) -> &BackupSettings {
        &self.settings
    }

    pub fn is_busy(&self) -> bool {
        self.slot.available_permits() == 0
    }

    fn claim_slot(&self) -> Result<OwnedSemaphorePermit> {
        self.slot.clone().try_acquire_owned().map_err(|_| BackupError::Busy)
    }

    /// Starts a backup in the background.
    ///
    /// Returns `Busy` right away if another run holds the slot.
    pub fn create_backup(&self) -> Result<JoinHandle<Result<BackupReport>>> {
        let permit = self.claim_slot()?;
        let settings = self.settings.clone();
        let runner = self.runner.clone();
        let platform = self.platform;
        let events = self.events.clone();

        Ok(tokio::spawn(async move {
            let _permit = permit;
            let result = backup::run_backup_flow(&settings, runner, platform, &events).await;
            match &result {
                Ok(report) => succeed(Operation::Backup, report.summary(), &events).await,
                Err(e) => fail(Operation::Backup, e, &events).await,
            }
            result
        }))
    }

    /// Starts a restore of `archive` in the background.
    pub fn restore_backup(
        &self,
        archive: impl Into<PathBuf>,
        password: impl Into<String>,
    ) -> Result<JoinHandle<Result<RestoreReport>>> {
        let permit = self.claim_slot()?;
        let archive = archive.into();
        let password = password.into();
        let settings = self.settings.clone();
        let runner = self.runner.clone();
        let platform = self.platform;
        let events = self.events.clone();

        Ok(tokio::spawn(async move {
            let _permit = permit;
            let result = restore::run_restore_flow(
                &settings, runner, platform, &archive, &password, &events,
            )
            .await;
            match &result {
                Ok(report) => succeed(Operation::Restore, report.summary(), &events).await,
                Err(e) => fail(Operation::Restore, e, &events).await,
            }
            result
        }))
    }

    /// Local archives, newest first.
    pub fn list_archives(&self) -> Result<Vec<BackupArchive>> {
        Ok(catalog::list_archives(&self.settings.backup_dir)?)
    }

    /// Logs every configuration problem found at startup and returns them.
    ///
    /// Nothing here is fatal; the same checks run again, strictly, when a
    /// backup or restore starts. A restore takes its password from the caller,
    /// so the configured one is only required for backups.
    pub async fn validate_configuration(&self, operation: Operation) -> Vec<String> {
        let mut problems = Vec::new();

        match &self.settings.mysql_bin_dir {
            Some(dir) if !dir.is_dir() => {
                problems.push(format!("MySQL bin directory not found: {}", dir.display()))
            }
            Some(_) => {}
            None => {
                if which::which(self.platform.dump_executable()).is_err() {
                    problems.push(format!(
                        "{} not found in PATH and no mysql_bin_path configured",
                        self.platform.dump_executable()
                    ));
                }
            }
        }

        match &self.settings.archiver_dir {
            None => problems.push("Archiver path not configured".to_string()),
            Some(dir) if !dir.is_dir() => {
                problems.push(format!("Archiver directory not found: {}", dir.display()))
            }
            Some(dir) => {
                let exe = dir.join(self.platform.archiver_executable());
                if !exe.is_file() {
                    problems.push(format!(
                        "{} not found in: {}",
                        self.platform.archiver_executable(),
                        dir.display()
                    ));
                }
            }
        }

        if operation == Operation::Backup && self.settings.backup_password.is_none() {
            problems.push("Backup password not configured".to_string());
        }

        for problem in &problems {
            self.events.error(problem.clone()).await;
        }
        problems
    }
}

async fn succeed(operation: Operation, summary: String, events: &EventSink) {
    events.state(operation, OperationState::Done).await;
    events.success(summary.clone()).await;
    events
        .finished(operation, RunOutcome::Succeeded(summary))
        .await;
}

async fn fail(operation: Operation, error: &BackupError, events: &EventSink) {
    events.state(operation, OperationState::Failed).await;
    let message = match operation {
        Operation::Backup => format!("Backup failed: {error}"),
        Operation::Restore => format!("Restore failed: {error}"),
    };
    events.error(message.clone()).await;
    events.finished(operation, RunOutcome::Failed(message)).await;
}
