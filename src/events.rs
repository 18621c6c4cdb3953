//! Progress and audit events handed from background runs to the UI side.
//!
//! The orchestrator never touches UI state. It pushes [`BackupEvent`]s into a bounded
//! channel and whoever owns the receiving end renders them.

use chrono::{DateTime, Local};
use log::{debug, error, info, warn};
use std::fmt;
use tokio::sync::mpsc;

use crate::orchestrator::OperationState;

pub const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Success,
    Warning,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Info => "INFO",
            LogLevel::Success => "SUCCESS",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
        }
    }

    fn marker(&self) -> &'static str {
        match self {
            LogLevel::Info => "",
            LogLevel::Success => "✓ ",
            LogLevel::Warning => "⚠ ",
            LogLevel::Error => "✗ ",
        }
    }
}

/// One line of the user-visible audit trail.
#[derive(Debug, Clone)]
pub struct LogLine {
    pub timestamp: DateTime<Local>,
    pub level: LogLevel,
    pub message: String,
}

impl fmt::Display for LogLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] [{}] {}{}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S"),
            self.level.as_str(),
            self.level.marker(),
            self.message
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Backup,
    Restore,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Backup => write!(f, "backup"),
            Operation::Restore => write!(f, "restore"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Succeeded(String),
    Failed(String),
}

#[derive(Debug, Clone)]
pub enum BackupEvent {
    Log(LogLine),
    StateChanged {
        operation: Operation,
        state: OperationState,
    },
    Finished {
        operation: Operation,
        outcome: RunOutcome,
    },
}

/// Sending half of the event channel. Cheap to clone.
///
/// Every log line is mirrored into the `log` facade so the same trail ends up in
/// whatever `env_logger` is writing to.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::Sender<BackupEvent>,
}

impl EventSink {
    pub fn new(tx: mpsc::Sender<BackupEvent>) -> Self {
        Self { tx }
    }

    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<BackupEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }

    pub async fn log(&self, level: LogLevel, message: impl Into<String>) {
        let message = message.into();
        match level {
            LogLevel::Info | LogLevel::Success => info!("{message}"),
            LogLevel::Warning => warn!("{message}"),
            LogLevel::Error => error!("{message}"),
        }
        self.emit(BackupEvent::Log(LogLine {
            timestamp: Local::now(),
            level,
            message,
        }))
        .await;
    }

    pub async fn info(&self, message: impl Into<String>) {
        self.log(LogLevel::Info, message).await;
    }

    pub async fn success(&self, message: impl Into<String>) {
        self.log(LogLevel::Success, message).await;
    }

    pub async fn warning(&self, message: impl Into<String>) {
        self.log(LogLevel::Warning, message).await;
    }

    pub async fn error(&self, message: impl Into<String>) {
        self.log(LogLevel::Error, message).await;
    }

    pub async fn state(&self, operation: Operation, state: OperationState) {
        debug!("{operation} -> {state:?}");
        self.emit(BackupEvent::StateChanged { operation, state }).await;
    }

    pub async fn finished(&self, operation: Operation, outcome: RunOutcome) {
        self.emit(BackupEvent::Finished { operation, outcome }).await;
    }

    async fn emit(&self, event: BackupEvent) {
        // A closed receiver only means nobody is watching any more.
        if self.tx.send(event).await.is_err() {
            debug!("Event receiver dropped; event discarded");
        }
    }
}
