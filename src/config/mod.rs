// dumpvault/src/config/mod.rs
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::backup::retention::MAX_BACKUP_RETENTION;
use crate::errors::BackupError;
use crate::profile::DatabaseConnectionProfile;

const DEFAULT_BACKUP_DIR: &str = "./backups";
pub const DEFAULT_CONFIG_FILE: &str = "config.json";
pub const CONFIG_PATH_ENV: &str = "DUMPVAULT_CONFIG";
pub const BACKUP_PASSWORD_ENV: &str = "DUMPVAULT_BACKUP_PASSWORD";
pub const DB_PASSWORD_ENV: &str = "DUMPVAULT_DB_PASSWORD";
const MAX_RETENTION_COUNT: usize = 365;

// Structs for deserializing config.json
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawJsonConfig {
    pub backup_dir: Option<PathBuf>,
    pub temp_dump_root: Option<PathBuf>,
    pub mysql_bin_path: Option<PathBuf>,
    pub archiver_path: Option<PathBuf>,
    pub backup_password: Option<String>,
    pub database_url: Option<String>,
    pub database_username: Option<String>,
    pub database_password: Option<String>,
    pub database_name: Option<String>,
    pub replication_root: Option<PathBuf>,
    pub retention_count: Option<usize>,
}

/// Validated settings shared by every backup and restore run.
#[derive(Clone)]
pub struct BackupSettings {
    pub backup_dir: PathBuf,
    pub temp_dir: PathBuf,
    /// `None` means "look the MySQL tools up on PATH".
    pub mysql_bin_dir: Option<PathBuf>,
    pub archiver_dir: Option<PathBuf>,
    pub backup_password: Option<String>,
    pub connection_string: String,
    pub database_username: Option<String>,
    pub database_password: Option<String>,
    pub database_name: Option<String>,
    pub replication_root: Option<PathBuf>,
    pub retention_count: usize,
}

impl fmt::Debug for BackupSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mask = |s: &Option<String>| s.as_ref().map(|_| "***");
        f.debug_struct("BackupSettings")
            .field("backup_dir", &self.backup_dir)
            .field("temp_dir", &self.temp_dir)
            .field("mysql_bin_dir", &self.mysql_bin_dir)
            .field("archiver_dir", &self.archiver_dir)
            .field("backup_password", &mask(&self.backup_password))
            .field(
                "connection_string",
                &crate::profile::redact_url(&self.connection_string),
            )
            .field("database_username", &self.database_username)
            .field("database_password", &mask(&self.database_password))
            .field("database_name", &self.database_name)
            .field("replication_root", &self.replication_root)
            .field("retention_count", &self.retention_count)
            .finish()
    }
}

impl BackupSettings {
    pub fn resolve_profile(&self) -> Result<DatabaseConnectionProfile, BackupError> {
        DatabaseConnectionProfile::resolve(
            &self.connection_string,
            self.database_username.as_deref(),
            self.database_password.as_deref(),
            self.database_name.as_deref(),
        )
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub settings: BackupSettings,
}

impl AppConfig {
    pub fn load_from_json(config_path: &Path) -> Result<Self> {
        let config_content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file at {}", config_path.display()))?;
        let mut raw_json_config: RawJsonConfig = serde_json::from_str(&config_content)
            .with_context(|| {
                format!(
                    "Failed to parse JSON from config file at {}",
                    config_path.display()
                )
            })?;

        apply_env_overrides(&mut raw_json_config, |key| std::env::var(key).ok());
        let settings = settings_from_raw(&raw_json_config)?;

        Ok(AppConfig { settings })
    }
}

/// Path of the config file: `$DUMPVAULT_CONFIG` or `./config.json`.
pub fn config_path() -> PathBuf {
    std::env::var(CONFIG_PATH_ENV)
        .ok()
        .filter(|s| !s.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
}

/// Secrets may come from the environment (or `.env`) instead of config.json.
pub fn apply_env_overrides(raw: &mut RawJsonConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(password) = lookup(BACKUP_PASSWORD_ENV).filter(|s| !s.is_empty()) {
        raw.backup_password = Some(password);
    }
    if let Some(password) = lookup(DB_PASSWORD_ENV) {
        raw.database_password = Some(password);
    }
}

pub fn settings_from_raw(raw: &RawJsonConfig) -> Result<BackupSettings> {
    let retention_count = raw.retention_count.unwrap_or(MAX_BACKUP_RETENTION);
    if !(1..=MAX_RETENTION_COUNT).contains(&retention_count) {
        return Err(anyhow::anyhow!(
            "retention_count must be between 1 and {MAX_RETENTION_COUNT}, got {retention_count}"
        ));
    }

    let backup_dir = non_empty_path(&raw.backup_dir).unwrap_or_else(|| PathBuf::from(DEFAULT_BACKUP_DIR));
    let temp_dir = non_empty_path(&raw.temp_dump_root).unwrap_or_else(std::env::temp_dir);

    Ok(BackupSettings {
        backup_dir,
        temp_dir,
        mysql_bin_dir: non_empty_path(&raw.mysql_bin_path),
        archiver_dir: non_empty_path(&raw.archiver_path),
        backup_password: non_blank(&raw.backup_password),
        connection_string: raw.database_url.clone().unwrap_or_default(),
        database_username: non_blank(&raw.database_username),
        // An empty database password is legitimate.
        database_password: raw.database_password.clone(),
        database_name: non_blank(&raw.database_name),
        replication_root: non_empty_path(&raw.replication_root),
        retention_count,
    })
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value.as_ref().filter(|s| !s.trim().is_empty()).cloned()
}

fn non_empty_path(value: &Option<PathBuf>) -> Option<PathBuf> {
    value
        .as_ref()
        .filter(|p| !p.as_os_str().is_empty())
        .cloned()
}
