use std::path::PathBuf;
use thiserror::Error;

/// Everything a backup or restore run can fail with.
///
/// The variants mirror the component that produced them, so a caller can tell a
/// wrong password apart from a crashed dump without parsing messages.
#[derive(Error, Debug)]
pub enum BackupError {
    #[error("Prerequisite missing: {0}")]
    PrerequisiteMissing(String),

    #[error("mysqldump failed with exit code: {exit_code}")]
    DumpFailed { exit_code: i32 },

    #[error("Database restore failed with exit code: {exit_code}")]
    RestoreFailed { exit_code: i32 },

    #[error("Archiver failed with exit code: {exit_code}")]
    ArchiveToolFailed { exit_code: i32 },

    #[error("Invalid password or corrupted archive")]
    InvalidPasswordOrCorruptArchive,

    #[error("No SQL file found in extracted backup: {}", .0.display())]
    NoSnapshotInArchive(PathBuf),

    #[error("Archiver reported success but no archive exists at {}", .0.display())]
    ArchiveNotCreated(PathBuf),

    #[error("Replication failed: {0}")]
    ReplicationFailed(String),

    #[error("Failed to delete {}: {reason}", .path.display())]
    PruneEntryFailed { path: PathBuf, reason: String },

    #[error("Another backup or restore is already in progress")]
    Busy,

    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, BackupError>;
