//! Password-protected single-file archives through the external `rar` tool.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::catalog::SNAPSHOT_EXTENSION;
use crate::errors::{BackupError, Result};
use crate::events::EventSink;
use crate::process::{Invocation, ProcessOutput, ProcessRunner};
use crate::utils::format_file_size;

/// rar exit codes that mean a wrong password or a damaged archive.
const BAD_PASSWORD_OR_CORRUPT: [i32; 2] = [3, 11];

pub struct ArchiveCipher {
    executable: PathBuf,
    runner: Arc<dyn ProcessRunner>,
}

impl ArchiveCipher {
    pub fn new(executable: impl Into<PathBuf>, runner: Arc<dyn ProcessRunner>) -> Self {
        Self {
            executable: executable.into(),
            runner,
        }
    }

    /// Encrypts `plain` into `archive` and deletes `plain` on success.
    ///
    /// File names inside the archive are encrypted too (`-hp`), compression is
    /// maximal and the RAR5 format is used. A failed run never leaves a partial
    /// archive behind.
    pub async fn encrypt(
        &self,
        plain: &Path,
        password: &str,
        archive: &Path,
        events: &EventSink,
    ) -> Result<u64> {
        events.info("Encrypting and compressing backup file...").await;

        let invocation = Invocation::new(&self.executable)
            .arg("a")
            .secret_arg(format!("-hp{password}"))
            .secret_arg(format!("-p{password}"))
            .arg("-m5")
            .arg("-ma5")
            .arg("-ep1")
            .arg("-df")
            .arg("-y")
            .arg("-inul")
            .arg(archive.display().to_string())
            .arg(plain.display().to_string());

        let output = match self.runner.run(&invocation).await {
            Ok(output) => output,
            Err(e) => {
                remove_partial(archive, events).await;
                return Err(e);
            }
        };
        log_tool_output(&output, events).await;

        if !output.success() {
            remove_partial(archive, events).await;
            return Err(BackupError::ArchiveToolFailed {
                exit_code: output.exit_code,
            });
        }

        let size = match tokio::fs::metadata(archive).await {
            Ok(meta) => meta.len(),
            Err(_) => return Err(BackupError::ArchiveNotCreated(archive.to_path_buf())),
        };
        events
            .info(format!("Encryption completed: {}", format_file_size(size)))
            .await;
        Ok(size)
    }

    /// Extracts `archive` into `destination` and returns the snapshot it contained.
    pub async fn decrypt(
        &self,
        archive: &Path,
        password: &str,
        destination: &Path,
        events: &EventSink,
    ) -> Result<PathBuf> {
        events.info("Decrypting and extracting backup file...").await;

        let invocation = Invocation::new(&self.executable)
            .arg("x")
            .secret_arg(format!("-p{password}"))
            .arg("-o+")
            .arg("-inul")
            .arg("-y")
            .arg(archive.display().to_string())
            .arg(format!(
                "{}{}",
                destination.display(),
                std::path::MAIN_SEPARATOR
            ));

        let output = self.runner.run(&invocation).await?;
        log_tool_output(&output, events).await;

        if !output.success() {
            if BAD_PASSWORD_OR_CORRUPT.contains(&output.exit_code) {
                return Err(BackupError::InvalidPasswordOrCorruptArchive);
            }
            return Err(BackupError::ArchiveToolFailed {
                exit_code: output.exit_code,
            });
        }

        let snapshot = find_snapshot(destination)?
            .ok_or_else(|| BackupError::NoSnapshotInArchive(archive.to_path_buf()))?;
        let size = tokio::fs::metadata(&snapshot).await?.len();
        events
            .info(format!("Decryption successful: {}", format_file_size(size)))
            .await;
        Ok(snapshot)
    }
}

fn find_snapshot(dir: &Path) -> Result<Option<PathBuf>> {
    let mut candidates: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| e.eq_ignore_ascii_case(SNAPSHOT_EXTENSION))
        })
        .collect();
    candidates.sort();
    Ok(candidates.into_iter().next())
}

async fn remove_partial(archive: &Path, events: &EventSink) {
    if tokio::fs::try_exists(archive).await.unwrap_or(false) {
        if let Err(e) = tokio::fs::remove_file(archive).await {
            events
                .warning(format!(
                    "Failed to remove partial archive {}: {e}",
                    archive.display()
                ))
                .await;
        }
    }
}

fn is_progress_line(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.is_empty()
        || trimmed.starts_with("Extracting")
        || trimmed.starts_with("Adding")
        || trimmed.trim_end_matches('%').chars().all(|c| c.is_ascii_digit() || c.is_whitespace())
}

async fn log_tool_output(output: &ProcessOutput, events: &EventSink) {
    for line in output.lines.iter().filter(|l| !is_progress_line(l)) {
        events.info(format!("rar: {}", line.trim())).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::BackupEvent;
    use crate::process::fake::{SAMPLE_DUMP, ScriptedRunner, write_fake_archive};

    fn cipher(runner: &Arc<ScriptedRunner>) -> ArchiveCipher {
        ArchiveCipher::new("/opt/rar/rar", runner.clone())
    }

    #[tokio::test]
    async fn round_trip_restores_identical_bytes() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let extract = tempfile::tempdir()?;
        let (events, _rx) = EventSink::channel(64);
        let runner = Arc::new(ScriptedRunner::default());
        let plain = dir.path().join("db_dump_42.sql");
        std::fs::write(&plain, SAMPLE_DUMP)?;
        let archive = dir.path().join("schooldb_backup_2024-01-01_00-00-00.rar");

        cipher(&runner).encrypt(&plain, "hunter2", &archive, &events).await?;
        assert!(!plain.exists(), "plaintext must be removed after encryption");

        let snapshot = cipher(&runner)
            .decrypt(&archive, "hunter2", extract.path(), &events)
            .await?;
        assert_eq!(std::fs::read(snapshot)?, SAMPLE_DUMP);
        Ok(())
    }

    #[tokio::test]
    async fn encrypt_uses_hardened_flags() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let (events, _rx) = EventSink::channel(64);
        let runner = Arc::new(ScriptedRunner::default());
        let plain = dir.path().join("db_dump_1.sql");
        std::fs::write(&plain, SAMPLE_DUMP)?;
        let archive = dir.path().join("a.rar");

        cipher(&runner).encrypt(&plain, "pw", &archive, &events).await?;

        let call = &runner.calls()[0];
        for flag in ["a", "-hppw", "-ppw", "-m5", "-ma5", "-ep1", "-df", "-y", "-inul"] {
            assert!(call.args.iter().any(|a| a == flag), "missing {flag}");
        }
        assert!(!call.to_string().contains("-ppw"), "password leaked: {call}");
        Ok(())
    }

    #[tokio::test]
    async fn wrong_password_is_reported_distinctly() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let extract = tempfile::tempdir()?;
        let (events, _rx) = EventSink::channel(64);
        let runner = Arc::new(ScriptedRunner::default());
        let archive = dir.path().join("db.rar");
        write_fake_archive(&archive, "right", "db_dump_1.sql", SAMPLE_DUMP);

        let err = cipher(&runner)
            .decrypt(&archive, "wrong", extract.path(), &events)
            .await
            .unwrap_err();

        assert!(matches!(err, BackupError::InvalidPasswordOrCorruptArchive));
        assert_eq!(std::fs::read_dir(extract.path())?.count(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn corrupt_archive_maps_to_same_error() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let extract = tempfile::tempdir()?;
        let (events, _rx) = EventSink::channel(64);
        let runner = Arc::new(ScriptedRunner::default());
        let archive = dir.path().join("db.rar");
        std::fs::write(&archive, b"garbage")?;

        let err = cipher(&runner)
            .decrypt(&archive, "pw", extract.path(), &events)
            .await
            .unwrap_err();
        assert!(matches!(err, BackupError::InvalidPasswordOrCorruptArchive));
        Ok(())
    }

    #[tokio::test]
    async fn other_exit_codes_are_generic_failures() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let extract = tempfile::tempdir()?;
        let (events, _rx) = EventSink::channel(64);
        let runner = Arc::new(ScriptedRunner::default());

        let err = cipher(&runner)
            .decrypt(&dir.path().join("missing.rar"), "pw", extract.path(), &events)
            .await
            .unwrap_err();
        assert!(matches!(err, BackupError::ArchiveToolFailed { exit_code: 10 }));
        Ok(())
    }

    #[tokio::test]
    async fn archive_without_snapshot_is_an_error() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let extract = tempfile::tempdir()?;
        let (events, _rx) = EventSink::channel(64);
        let runner = Arc::new(ScriptedRunner::default());
        let archive = dir.path().join("db.rar");
        write_fake_archive(&archive, "pw", "photo.jpg", b"\xff\xd8");

        let err = cipher(&runner)
            .decrypt(&archive, "pw", extract.path(), &events)
            .await
            .unwrap_err();
        assert!(matches!(err, BackupError::NoSnapshotInArchive(_)));
        Ok(())
    }

    #[tokio::test]
    async fn failed_encryption_leaves_no_partial_archive() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let (events, _rx) = EventSink::channel(64);
        let runner = Arc::new(ScriptedRunner {
            encrypt_exit_code: 5,
            ..ScriptedRunner::default()
        });
        let plain = dir.path().join("db_dump_1.sql");
        std::fs::write(&plain, SAMPLE_DUMP)?;
        let archive = dir.path().join("a.rar");
        std::fs::write(&archive, b"half written")?;

        let err = cipher(&runner)
            .encrypt(&plain, "pw", &archive, &events)
            .await
            .unwrap_err();
        assert!(matches!(err, BackupError::ArchiveToolFailed { exit_code: 5 }));
        assert!(!archive.exists());
        Ok(())
    }

    #[tokio::test]
    async fn progress_lines_are_not_logged() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let extract = tempfile::tempdir()?;
        let (events, mut rx) = EventSink::channel(64);
        let runner = Arc::new(ScriptedRunner::default());
        let archive = dir.path().join("db.rar");
        write_fake_archive(&archive, "pw", "db_dump_1.sql", SAMPLE_DUMP);

        cipher(&runner)
            .decrypt(&archive, "pw", extract.path(), &events)
            .await?;
        drop(events);

        let mut tool_lines = Vec::new();
        while let Some(event) = rx.recv().await {
            if let BackupEvent::Log(line) = event {
                if line.message.starts_with("rar: ") {
                    tool_lines.push(line.message);
                }
            }
        }
        assert_eq!(tool_lines, vec!["rar: All OK".to_string()]);
        Ok(())
    }

    #[test]
    fn recognises_progress_lines() {
        assert!(is_progress_line("   "));
        assert!(is_progress_line("Extracting  db_dump.sql   OK"));
        assert!(is_progress_line(" 45%"));
        assert!(!is_progress_line("All OK"));
        assert!(!is_progress_line("ERROR: CRC failed"));
    }
}
