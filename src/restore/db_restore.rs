use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::credentials::StagedCredentialFile;
use crate::errors::{BackupError, Result};
use crate::events::EventSink;
use crate::process::{Invocation, ProcessRunner};
use crate::profile::DatabaseConnectionProfile;

/// Replays a plain SQL snapshot through the `mysql` client.
///
/// Not transactional: a failure halfway leaves the database partially restored.
pub struct MysqlRestore {
    executable: PathBuf,
    runner: Arc<dyn ProcessRunner>,
}

impl MysqlRestore {
    pub fn new(executable: impl Into<PathBuf>, runner: Arc<dyn ProcessRunner>) -> Self {
        Self {
            executable: executable.into(),
            runner,
        }
    }

    pub async fn restore(
        &self,
        profile: &DatabaseConnectionProfile,
        credentials: &StagedCredentialFile,
        snapshot: &Path,
        events: &EventSink,
    ) -> Result<()> {
        if !snapshot.is_file() {
            return Err(BackupError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("SQL file not found: {}", snapshot.display()),
            )));
        }
        events.info("Restoring database from SQL file...").await;

        let invocation = Invocation::new(&self.executable)
            .arg(format!(
                "--defaults-extra-file={}",
                credentials.path().display()
            ))
            .arg(&profile.database)
            .stdin_from(snapshot);

        let output = self.runner.run(&invocation).await?;
        for line in output.lines.iter().filter(|l| !l.trim().is_empty()) {
            if output.success() {
                events.info(format!("MySQL: {line}")).await;
            } else {
                events.error(format!("MySQL: {line}")).await;
            }
        }

        if !output.success() {
            return Err(BackupError::RestoreFailed {
                exit_code: output.exit_code,
            });
        }

        events.info("Database restore completed successfully").await;
        Ok(())
    }
}
