use std::path::{Path, PathBuf};

use super::retention::{self, PruneReport};
use crate::errors::{BackupError, Result};
use crate::events::EventSink;

/// Folder created under the replication root to hold archive copies.
pub const REPLICATION_SUBDIR: &str = "School Backup";

#[derive(Debug)]
pub enum ReplicationOutcome {
    /// The root was not reachable; nothing was copied.
    Skipped { reason: String },
    Replicated {
        destination: PathBuf,
        pruned: Option<PruneReport>,
    },
}

/// Copies `archive` into `<remote_root>/School Backup` and prunes that folder.
///
/// An unreachable root is a skip, not an error. Callers treat an `Err` here as a
/// warning; the local archive is already complete.
pub async fn replicate(
    archive: &Path,
    remote_root: &Path,
    keep: usize,
    events: &EventSink,
) -> Result<ReplicationOutcome> {
    events
        .info(format!(
            "Attempting to sync backup to {}...",
            remote_root.display()
        ))
        .await;

    if !tokio::fs::try_exists(remote_root).await.unwrap_or(false) {
        let reason = format!(
            "Replication root {} not accessible. Skipping cloud sync.",
            remote_root.display()
        );
        events.warning(reason.clone()).await;
        return Ok(ReplicationOutcome::Skipped { reason });
    }

    let target_dir = remote_root.join(REPLICATION_SUBDIR);
    tokio::fs::create_dir_all(&target_dir).await.map_err(|e| {
        BackupError::ReplicationFailed(format!(
            "failed to create {}: {e}",
            target_dir.display()
        ))
    })?;

    let file_name = archive.file_name().ok_or_else(|| {
        BackupError::ReplicationFailed(format!("not a file: {}", archive.display()))
    })?;
    let destination = target_dir.join(file_name);
    if is_same_file(archive, &destination).await {
        // Copying onto itself would truncate the archive.
        events
            .info(format!(
                "Backup already present at {}",
                destination.display()
            ))
            .await;
    } else {
        tokio::fs::copy(archive, &destination).await.map_err(|e| {
            BackupError::ReplicationFailed(format!(
                "failed to copy {} to {}: {e}",
                archive.display(),
                destination.display()
            ))
        })?;
        events
            .success(format!("Backup synced to {}", destination.display()))
            .await;
    }

    let pruned = match retention::prune(&target_dir, keep, "replica", events).await {
        Ok(report) => Some(report),
        Err(e) => {
            events
                .warning(format!("Cleanup error in replica: {e}"))
                .await;
            None
        }
    };

    Ok(ReplicationOutcome::Replicated {
        destination,
        pruned,
    })
}

async fn is_same_file(a: &Path, b: &Path) -> bool {
    match (
        tokio::fs::canonicalize(a).await,
        tokio::fs::canonicalize(b).await,
    ) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
