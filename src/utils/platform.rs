use std::io;
use std::path::Path;

/// Host flavour, picked once at startup.
///
/// Only executable names and permission handling differ between the two; nothing
/// else in the crate branches on the operating system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Windows,
    Posix,
}

impl Platform {
    pub fn detect() -> Self {
        if cfg!(windows) {
            Platform::Windows
        } else {
            Platform::Posix
        }
    }

    pub fn dump_executable(&self) -> &'static str {
        match self {
            Platform::Windows => "mysqldump.exe",
            Platform::Posix => "mysqldump",
        }
    }

    pub fn client_executable(&self) -> &'static str {
        match self {
            Platform::Windows => "mysql.exe",
            Platform::Posix => "mysql",
        }
    }

    pub fn archiver_executable(&self) -> &'static str {
        match self {
            Platform::Windows => "Rar.exe",
            Platform::Posix => "rar",
        }
    }

    /// Restricts `path` to owner read/write.
    ///
    /// Returns `Ok(false)` when the platform has no such notion, so callers can warn
    /// instead of failing.
    pub fn restrict_to_owner(&self, path: &Path) -> io::Result<bool> {
        match self {
            Platform::Windows => Ok(false),
            Platform::Posix => set_owner_only(path),
        }
    }
}

#[cfg(unix)]
fn set_owner_only(path: &Path) -> io::Result<bool> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    Ok(true)
}

#[cfg(not(unix))]
fn set_owner_only(_path: &Path) -> io::Result<bool> {
    Ok(false)
}
