//! External process capability.
//!
//! Dump, restore and archive steps describe what they want to run as an
//! [`Invocation`] and hand it to a [`ProcessRunner`]. Production code uses
//! [`SystemProcessRunner`]; tests substitute a scripted fake.

#[cfg(test)]
pub(crate) mod fake;

use async_trait::async_trait;
use log::debug;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::Command;

use crate::errors::{BackupError, Result};

/// Where a child's stdout goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StdoutTarget {
    /// Collected line by line into [`ProcessOutput::lines`].
    Capture,
    /// Streamed straight into a file, never buffered in memory.
    File(PathBuf),
}

/// A single external command.
#[derive(Clone)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<String>,
    secret_args: Vec<usize>,
    pub stdin: Option<PathBuf>,
    pub stdout: StdoutTarget,
}

impl Invocation {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            secret_args: Vec::new(),
            stdin: None,
            stdout: StdoutTarget::Capture,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Like [`Invocation::arg`] but masked whenever the invocation is displayed.
    pub fn secret_arg(mut self, arg: impl Into<String>) -> Self {
        self.secret_args.push(self.args.len());
        self.args.push(arg.into());
        self
    }

    pub fn stdin_from(mut self, path: impl Into<PathBuf>) -> Self {
        self.stdin = Some(path.into());
        self
    }

    pub fn stdout_to(mut self, path: impl Into<PathBuf>) -> Self {
        self.stdout = StdoutTarget::File(path.into());
        self
    }

    pub fn program_name(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.program.display().to_string())
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for (i, arg) in self.args.iter().enumerate() {
            if self.secret_args.contains(&i) {
                write!(f, " ***")?;
            } else {
                write!(f, " {arg}")?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invocation({self})")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    pub exit_code: i32,
    /// Captured stdout lines (when not redirected to a file) followed by stderr lines.
    pub lines: Vec<String>,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn run(&self, invocation: &Invocation) -> Result<ProcessOutput>;
}

/// Runs invocations as real child processes via `tokio::process`.
#[derive(Debug, Default, Clone)]
pub struct SystemProcessRunner;

#[async_trait]
impl ProcessRunner for SystemProcessRunner {
    async fn run(&self, invocation: &Invocation) -> Result<ProcessOutput> {
        debug!("Running command: {invocation}");

        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args)
            .stdin(if invocation.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|source| BackupError::Spawn {
            program: invocation.program_name(),
            source,
        })?;

        let child_stdin = child.stdin.take();
        let child_stdout = child.stdout.take();
        let child_stderr = child.stderr.take();

        let feed = feed_stdin(invocation.stdin.as_deref(), child_stdin);
        let drain = drain_stdout(&invocation.stdout, child_stdout);
        let errors = async {
            match child_stderr {
                Some(stderr) => read_lines_lossy(stderr).await,
                None => Ok(Vec::new()),
            }
        };

        let ((), mut lines, stderr_lines) = tokio::try_join!(feed, drain, errors)?;
        let status = child.wait().await?;
        lines.extend(stderr_lines);

        // Killed by a signal: no exit code, treat as a generic failure.
        let exit_code = status.code().unwrap_or(-1);
        debug!("{} exited with code {exit_code}", invocation.program_name());

        Ok(ProcessOutput { exit_code, lines })
    }
}

async fn feed_stdin(
    source: Option<&Path>,
    pipe: Option<tokio::process::ChildStdin>,
) -> io::Result<()> {
    let (Some(source), Some(mut pipe)) = (source, pipe) else {
        return Ok(());
    };
    let mut file = tokio::fs::File::open(source).await?;
    match tokio::io::copy(&mut file, &mut pipe).await {
        Ok(_) => {}
        // The child quit before reading everything; its exit code tells the story.
        Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
            debug!("Child closed stdin early: {e}");
            return Ok(());
        }
        Err(e) => return Err(e),
    }
    pipe.shutdown().await.or_else(|e| {
        if e.kind() == io::ErrorKind::BrokenPipe {
            Ok(())
        } else {
            Err(e)
        }
    })
}

async fn drain_stdout(
    target: &StdoutTarget,
    stdout: Option<tokio::process::ChildStdout>,
) -> io::Result<Vec<String>> {
    let Some(mut stdout) = stdout else {
        return Ok(Vec::new());
    };
    match target {
        StdoutTarget::Capture => read_lines_lossy(stdout).await,
        StdoutTarget::File(path) => {
            let mut file = tokio::fs::File::create(path).await?;
            tokio::io::copy(&mut stdout, &mut file).await?;
            file.flush().await?;
            Ok(Vec::new())
        }
    }
}

/// Reads newline-separated output without insisting on valid UTF-8.
pub(crate) async fn read_lines_lossy<R: AsyncRead + Unpin>(reader: R) -> io::Result<Vec<String>> {
    let mut reader = BufReader::new(reader);
    let mut lines = Vec::new();
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            break;
        }
        let line = String::from_utf8_lossy(&buf);
        lines.push(line.trim_end_matches(['\r', '\n']).to_string());
    }
    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_masks_secret_arguments() {
        let invocation = Invocation::new("/usr/bin/rar")
            .arg("a")
            .secret_arg("-hpsecret")
            .secret_arg("-psecret")
            .arg("-m5");
        let shown = invocation.to_string();
        assert_eq!(shown, "/usr/bin/rar a *** *** -m5");
        assert!(!format!("{invocation:?}").contains("secret"));
        assert_eq!(invocation.program_name(), "rar");
    }

    #[tokio::test]
    async fn lossy_reader_splits_lines_and_tolerates_bad_bytes() -> anyhow::Result<()> {
        let data: &[u8] = b"first\r\nsec\xffond\nlast";
        let lines = read_lines_lossy(data).await?;
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "first");
        assert!(lines[1].starts_with("sec"));
        assert_eq!(lines[2], "last");
        Ok(())
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn system_runner_reports_exit_code_and_output() -> anyhow::Result<()> {
        let invocation = Invocation::new("sh")
            .arg("-c")
            .arg("echo out; echo err 1>&2; exit 3");
        let output = SystemProcessRunner.run(&invocation).await?;
        assert_eq!(output.exit_code, 3);
        assert_eq!(output.lines, vec!["out".to_string(), "err".to_string()]);
        Ok(())
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn system_runner_streams_stdin_to_stdout_file() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let source = dir.path().join("in.sql");
        let dest = dir.path().join("out.sql");
        std::fs::write(&source, "CREATE TABLE t (id INT);\n")?;

        let invocation = Invocation::new("cat").stdin_from(&source).stdout_to(&dest);
        let output = SystemProcessRunner.run(&invocation).await?;
        assert!(output.success());
        assert_eq!(std::fs::read_to_string(&dest)?, "CREATE TABLE t (id INT);\n");
        Ok(())
    }

    #[tokio::test]
    async fn missing_program_is_a_spawn_error() {
        let invocation = Invocation::new("/definitely/not/here/mysqldump");
        let err = SystemProcessRunner.run(&invocation).await.unwrap_err();
        assert!(matches!(err, BackupError::Spawn { ref program, .. } if program == "mysqldump"));
    }
}
