use chrono::{DateTime, Local, NaiveDateTime};
use regex::Regex;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use crate::utils::{format_file_date, format_file_size};

pub const ARCHIVE_EXTENSION: &str = "rar";
pub const SNAPSHOT_EXTENSION: &str = "sql";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

static ARCHIVE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<db>.+)_backup_(?P<ts>\d{4}-\d{2}-\d{2}_\d{2}-\d{2}-\d{2})(?:_\d+)?\.rar$")
        .expect("archive name pattern is valid")
});

/// One encrypted snapshot on a storage location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupArchive {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub modified: DateTime<Local>,
    pub database_name: Option<String>,
}

impl BackupArchive {
    pub fn from_path(path: &Path) -> io::Result<Self> {
        let metadata = fs::metadata(path)?;
        let modified: DateTime<Local> = metadata.modified()?.into();
        let parsed = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(parse_archive_name);
        Ok(Self {
            path: path.to_path_buf(),
            size_bytes: metadata.len(),
            modified,
            database_name: parsed.map(|(db, _)| db),
        })
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// `name  (size) - date`, as shown in backup listings.
    pub fn describe(&self) -> String {
        format!(
            "{}  ({}) - {}",
            self.file_name(),
            format_file_size(self.size_bytes),
            format_file_date(&self.modified)
        )
    }
}

pub fn archive_file_name(database: &str, timestamp: &DateTime<Local>) -> String {
    format!(
        "{}_backup_{}.{}",
        database,
        timestamp.format(TIMESTAMP_FORMAT),
        ARCHIVE_EXTENSION
    )
}

/// Picks a fresh archive path in `dir`; archives are never appended to.
pub fn unique_archive_path(dir: &Path, database: &str, timestamp: &DateTime<Local>) -> PathBuf {
    let candidate = dir.join(archive_file_name(database, timestamp));
    if !candidate.exists() {
        return candidate;
    }
    let stem = format!("{}_backup_{}", database, timestamp.format(TIMESTAMP_FORMAT));
    (2..)
        .map(|n| dir.join(format!("{stem}_{n}.{ARCHIVE_EXTENSION}")))
        .find(|p| !p.exists())
        .unwrap_or(candidate)
}

pub fn parse_archive_name(name: &str) -> Option<(String, NaiveDateTime)> {
    let caps = ARCHIVE_NAME.captures(name)?;
    let ts = NaiveDateTime::parse_from_str(&caps["ts"], TIMESTAMP_FORMAT).ok()?;
    Some((caps["db"].to_string(), ts))
}

pub fn is_archive_path(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(ARCHIVE_EXTENSION))
}

/// Archives in `dir`, newest first. A missing directory holds no archives.
pub fn list_archives(dir: &Path) -> io::Result<Vec<BackupArchive>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut archives = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if !entry.file_type()?.is_file() || !is_archive_path(&path) {
            continue;
        }
        match BackupArchive::from_path(&path) {
            Ok(archive) => archives.push(archive),
            // Deleted between read_dir and stat.
            Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
            Err(e) => return Err(e),
        }
    }
    archives.sort_by(|a, b| {
        b.modified
            .cmp(&a.modified)
            .then_with(|| b.file_name().cmp(&a.file_name()))
    });
    Ok(archives)
}
