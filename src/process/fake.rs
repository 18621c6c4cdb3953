//! Scripted stand-in for `mysqldump`, `mysql` and `rar` used by unit tests.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

use super::{Invocation, ProcessOutput, ProcessRunner, StdoutTarget};
use crate::errors::Result;

const FAKE_ARCHIVE_MAGIC: &str = "FAKERAR5";

pub(crate) const SAMPLE_DUMP: &[u8] =
    b"-- MySQL dump\nCREATE TABLE student (id INT);\nINSERT INTO student VALUES (1);\n";

pub(crate) struct ScriptedRunner {
    pub dump_exit_code: i32,
    pub dump_content: Vec<u8>,
    pub encrypt_exit_code: i32,
    pub restore_exit_code: i32,
    pub dump_gate: Option<Arc<Notify>>,
    pub(crate) calls: Mutex<Vec<Invocation>>,
    pub(crate) restored: Mutex<Vec<u8>>,
    pub(crate) credentials_seen: Mutex<Vec<String>>,
}

impl Default for ScriptedRunner {
    fn default() -> Self {
        Self {
            dump_exit_code: 0,
            dump_content: SAMPLE_DUMP.to_vec(),
            encrypt_exit_code: 0,
            restore_exit_code: 0,
            dump_gate: None,
            calls: Mutex::new(Vec::new()),
            restored: Mutex::new(Vec::new()),
            credentials_seen: Mutex::new(Vec::new()),
        }
    }
}

impl ScriptedRunner {
    pub fn programs(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|c| tool_name(&c.program))
            .collect()
    }

    pub fn calls(&self) -> Vec<Invocation> {
        self.calls.lock().unwrap().clone()
    }

    pub fn restored(&self) -> Vec<u8> {
        self.restored.lock().unwrap().clone()
    }

    pub fn credentials_seen(&self) -> Vec<String> {
        self.credentials_seen.lock().unwrap().clone()
    }

    fn remember_credentials(&self, invocation: &Invocation) {
        for arg in &invocation.args {
            if let Some(path) = arg.strip_prefix("--defaults-extra-file=") {
                let content = std::fs::read_to_string(path).unwrap_or_default();
                self.credentials_seen.lock().unwrap().push(content);
            }
        }
    }

    async fn dump(&self, invocation: &Invocation) -> ProcessOutput {
        self.remember_credentials(invocation);
        if let Some(gate) = &self.dump_gate {
            gate.notified().await;
        }
        if let StdoutTarget::File(path) = &invocation.stdout {
            std::fs::write(path, &self.dump_content).unwrap();
        }
        ProcessOutput {
            exit_code: self.dump_exit_code,
            lines: if self.dump_exit_code == 0 {
                Vec::new()
            } else {
                vec!["mysqldump: Got error: 1045: Access denied".to_string()]
            },
        }
    }

    fn restore(&self, invocation: &Invocation) -> ProcessOutput {
        self.remember_credentials(invocation);
        if let Some(stdin) = &invocation.stdin {
            let data = std::fs::read(stdin).unwrap();
            self.restored.lock().unwrap().extend(data);
        }
        ProcessOutput {
            exit_code: self.restore_exit_code,
            lines: Vec::new(),
        }
    }

    fn archive(&self, invocation: &Invocation) -> ProcessOutput {
        let args = &invocation.args;
        let n = args.len();
        match args.first().map(String::as_str) {
            Some("a") => {
                if self.encrypt_exit_code != 0 {
                    return exit(self.encrypt_exit_code, "Cannot create archive");
                }
                let password = find_flag(args, "-hp").unwrap_or_default();
                let archive = PathBuf::from(&args[n - 2]);
                let source = PathBuf::from(&args[n - 1]);
                let content = std::fs::read(&source).unwrap();
                let entry = source.file_name().unwrap().to_string_lossy().into_owned();
                let mut out = format!("{FAKE_ARCHIVE_MAGIC}\n{password}\n{entry}\n").into_bytes();
                out.extend(content);
                std::fs::write(&archive, out).unwrap();
                if args.iter().any(|a| a == "-df") {
                    std::fs::remove_file(&source).unwrap();
                }
                exit(0, "Done")
            }
            Some("x") => {
                let password = find_flag(args, "-p").unwrap_or_default();
                let archive = PathBuf::from(&args[n - 2]);
                let dest = PathBuf::from(&args[n - 1]);
                let Ok(bytes) = std::fs::read(&archive) else {
                    return exit(10, "Cannot open archive");
                };
                let Some((stored, entry, content)) = parse_fake_archive(&bytes) else {
                    return exit(3, "CRC failed");
                };
                if stored != password {
                    return exit(11, "Incorrect password");
                }
                std::fs::write(dest.join(entry), content).unwrap();
                ProcessOutput {
                    exit_code: 0,
                    lines: vec![format!("Extracting  {entry}  OK"), "All OK".to_string()],
                }
            }
            _ => exit(7, "Unknown command"),
        }
    }
}

#[async_trait]
impl ProcessRunner for ScriptedRunner {
    async fn run(&self, invocation: &Invocation) -> Result<ProcessOutput> {
        self.calls.lock().unwrap().push(invocation.clone());
        let output = match tool_name(&invocation.program).as_str() {
            "mysqldump" => self.dump(invocation).await,
            "mysql" => self.restore(invocation),
            "rar" => self.archive(invocation),
            other => exit(127, &format!("{other}: not found")),
        };
        Ok(output)
    }
}

pub(crate) fn write_fake_archive(path: &Path, password: &str, entry: &str, content: &[u8]) {
    let mut out = format!("{FAKE_ARCHIVE_MAGIC}\n{password}\n{entry}\n").into_bytes();
    out.extend_from_slice(content);
    std::fs::write(path, out).unwrap();
}

fn parse_fake_archive(bytes: &[u8]) -> Option<(&str, &str, &[u8])> {
    let mut parts = bytes.splitn(4, |b| *b == b'\n');
    let magic = std::str::from_utf8(parts.next()?).ok()?;
    if magic != FAKE_ARCHIVE_MAGIC {
        return None;
    }
    let password = std::str::from_utf8(parts.next()?).ok()?;
    let entry = std::str::from_utf8(parts.next()?).ok()?;
    Some((password, entry, parts.next().unwrap_or_default()))
}

fn find_flag(args: &[String], prefix: &str) -> Option<String> {
    args.iter()
        .find_map(|a| a.strip_prefix(prefix).map(str::to_string))
}

fn tool_name(program: &Path) -> String {
    program
        .file_stem()
        .map(|s| s.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

fn exit(code: i32, line: &str) -> ProcessOutput {
    ProcessOutput {
        exit_code: code,
        lines: vec![line.to_string()],
    }
}
