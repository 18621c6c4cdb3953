use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::credentials::StagedCredentialFile;
use crate::errors::{BackupError, Result};
use crate::events::EventSink;
use crate::process::{Invocation, ProcessRunner};
use crate::profile::DatabaseConnectionProfile;
use crate::utils::format_file_size;

/// Logical dump of one database through `mysqldump`.
pub struct MysqlDump {
    executable: PathBuf,
    runner: Arc<dyn ProcessRunner>,
}

impl MysqlDump {
    pub fn new(executable: impl Into<PathBuf>, runner: Arc<dyn ProcessRunner>) -> Self {
        Self {
            executable: executable.into(),
            runner,
        }
    }

    fn invocation(
        &self,
        profile: &DatabaseConnectionProfile,
        credentials: &Path,
        destination: &Path,
    ) -> Invocation {
        Invocation::new(&self.executable)
            .arg(format!("--defaults-extra-file={}", credentials.display()))
            .arg("--single-transaction")
            .arg("--routines")
            .arg("--triggers")
            .arg("--events")
            .arg("--hex-blob")
            .arg("--set-gtid-purged=OFF")
            .arg(&profile.database)
            .stdout_to(destination)
    }

    /// Streams a dump of `profile.database` into `destination` and returns its size.
    pub async fn dump(
        &self,
        profile: &DatabaseConnectionProfile,
        credentials: &StagedCredentialFile,
        destination: &Path,
        events: &EventSink,
    ) -> Result<u64> {
        events.info("Exporting database to SQL file...").await;

        let invocation = self.invocation(profile, credentials.path(), destination);
        let output = self.runner.run(&invocation).await?;

        if !output.success() {
            for line in output.lines.iter().filter(|l| !l.trim().is_empty()) {
                events.error(format!("mysqldump: {line}")).await;
            }
            return Err(BackupError::DumpFailed {
                exit_code: output.exit_code,
            });
        }
        for line in output.lines.iter().filter(|l| !l.trim().is_empty()) {
            events.info(format!("mysqldump: {line}")).await;
        }

        let size = tokio::fs::metadata(destination).await?.len();
        events
            .info(format!("Database export completed: {}", format_file_size(size)))
            .await;
        Ok(size)
    }
}
