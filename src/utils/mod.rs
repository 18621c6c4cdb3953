pub mod platform;

use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};
use which::which;

use crate::errors::{BackupError, Result};

/// Locates `name` inside `bin_dir`, or on `PATH` when no directory is configured.
pub fn find_executable(bin_dir: Option<&Path>, name: &str) -> Result<PathBuf> {
    match bin_dir {
        Some(dir) => {
            let candidate = dir.join(name);
            if candidate.is_file() {
                Ok(candidate)
            } else {
                Err(BackupError::PrerequisiteMissing(format!(
                    "{} executable not found: {}",
                    name,
                    candidate.display()
                )))
            }
        }
        None => which(name).map_err(|_| {
            BackupError::PrerequisiteMissing(format!(
                "{name} executable not found in PATH. Please ensure MySQL client tools are installed or configure mysql_bin_path."
            ))
        }),
    }
}

/// Human readable byte count, e.g. `1.50 KB`.
pub fn format_file_size(size: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    if size == 0 {
        return "0 B".to_string();
    }
    let mut value = size as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.2} {}", value, UNITS[unit])
}

pub fn format_file_date(timestamp: &DateTime<Local>) -> String {
    timestamp.format("%b %d, %Y %H:%M").to_string()
}
