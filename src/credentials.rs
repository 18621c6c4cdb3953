//! Short-lived MySQL option files so passwords never appear on a command line.

use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::{Builder as TempFileBuilder, TempPath};

use crate::errors::Result;
use crate::events::EventSink;
use crate::profile::DatabaseConnectionProfile;
use crate::utils::platform::Platform;

pub const CREDENTIAL_FILE_PREFIX: &str = "mysql_conf_";
pub const CREDENTIAL_FILE_SUFFIX: &str = ".cnf";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialMode {
    Dump,
    Client,
}

impl CredentialMode {
    fn section(&self) -> &'static str {
        match self {
            CredentialMode::Dump => "[mysqldump]",
            CredentialMode::Client => "[mysql]",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CredentialStaging {
    temp_dir: PathBuf,
    platform: Platform,
}

impl CredentialStaging {
    pub fn new(temp_dir: impl Into<PathBuf>, platform: Platform) -> Self {
        Self {
            temp_dir: temp_dir.into(),
            platform,
        }
    }

    /// Writes an option file for `profile` and restricts it to the owner.
    pub async fn stage(
        &self,
        profile: &DatabaseConnectionProfile,
        mode: CredentialMode,
        events: &EventSink,
    ) -> Result<StagedCredentialFile> {
        let mut file = TempFileBuilder::new()
            .prefix(CREDENTIAL_FILE_PREFIX)
            .suffix(CREDENTIAL_FILE_SUFFIX)
            .tempfile_in(&self.temp_dir)?;
        file.write_all(render_option_file(profile, mode).as_bytes())?;
        file.flush()?;
        let path = file.into_temp_path();

        match self.platform.restrict_to_owner(&path) {
            Ok(true) => {}
            Ok(false) => {
                events
                    .warning("Unable to set POSIX permissions on temp config file")
                    .await
            }
            Err(e) => {
                events
                    .warning(format!("Unable to set POSIX permissions on temp config file: {e}"))
                    .await
            }
        }

        Ok(StagedCredentialFile { path: Some(path) })
    }
}

/// Handle to a staged option file.
///
/// Dropping the handle also removes the file, so early returns and panics are
/// covered; [`StagedCredentialFile::release`] is the explicit path that reports
/// a failed delete.
#[derive(Debug)]
pub struct StagedCredentialFile {
    path: Option<TempPath>,
}

impl StagedCredentialFile {
    pub fn path(&self) -> &Path {
        self.path.as_deref().unwrap_or_else(|| Path::new(""))
    }

    pub async fn release(mut self, events: &EventSink) {
        if let Some(path) = self.path.take() {
            let shown = path.to_path_buf();
            if let Err(e) = path.close() {
                events
                    .warning(format!("Failed to delete temp file: {} ({e})", shown.display()))
                    .await;
            }
        }
    }
}

fn render_option_file(profile: &DatabaseConnectionProfile, mode: CredentialMode) -> String {
    let mut content = format!(
        "{}\nuser={}\npassword={}\nhost={}\n",
        mode.section(),
        option_value(&profile.username),
        option_value(&profile.password),
        option_value(&profile.host)
    );
    if let Some(port) = profile.port {
        content.push_str(&format!("port={port}\n"));
    }
    content
}

/// Quotes a value when the option-file parser would otherwise mangle it.
fn option_value(raw: &str) -> String {
    let needs_quotes = raw
        .chars()
        .any(|c| c.is_whitespace() || matches!(c, '#' | ';' | '"' | '\'' | '\\'));
    if !needs_quotes {
        return raw.to_string();
    }
    let escaped = raw.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}
