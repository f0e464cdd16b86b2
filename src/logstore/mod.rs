//! Request log store
//!
//! Bounded in-memory record list persisted as a static HTML document:
//! - holds the most recent `capacity` records, oldest dropped first
//! - every append/clear re-renders and writes the whole document
//! - one writer task applies appends and clears in call order; a caller
//!   that stops waiting does not cancel its write
//! - each write is temp file + rename, readers never see a partial document

mod render;

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::config::LogConfig;
use crate::error::{Error, Result};

pub use render::{escape_html, render_document};

/// Default number of records kept
pub const DEFAULT_CAPACITY: usize = 500;

/// Severity of a request log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
    Success,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Info => "info",
            LogLevel::Warning => "warning",
            LogLevel::Error => "error",
            LogLevel::Success => "success",
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One persisted log line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub timestamp: OffsetDateTime,
    pub level: LogLevel,
    pub message: String,
}

impl LogRecord {
    pub fn now(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp: OffsetDateTime::now_utc(),
            level,
            message: message.into(),
        }
    }
}

/// Owned, bounded, ordered request log
pub struct LogStore {
    path: PathBuf,
    capacity: usize,
    commands: mpsc::UnboundedSender<Command>,
}

enum Command {
    Append {
        record: LogRecord,
        done: oneshot::Sender<Result<()>>,
    },
    Clear {
        done: oneshot::Sender<Result<()>>,
    },
    Snapshot {
        reply: oneshot::Sender<Vec<LogRecord>>,
    },
}

impl LogStore {
    /// Spawns the writer task, so this must run inside a tokio runtime
    pub fn new(dir: impl Into<PathBuf>, file: &str, capacity: usize) -> Self {
        let path = dir.into().join(file);
        let (commands, rx) = mpsc::unbounded_channel();
        let writer = Writer {
            path: path.clone(),
            capacity,
            records: VecDeque::with_capacity(capacity.min(DEFAULT_CAPACITY)),
        };
        tokio::spawn(writer.run(rx));
        Self {
            path,
            capacity,
            commands,
        }
    }

    pub fn from_config(config: &LogConfig) -> Self {
        Self::new(config.dir.clone(), &config.file, config.capacity)
    }

    /// Rendered document location
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append a record and persist the document.
    ///
    /// The record is kept in memory even when the write fails. Once this is
    /// first polled the write is queued and completes even if the caller is
    /// dropped.
    pub async fn append(&self, level: LogLevel, message: impl Into<String>) -> Result<()> {
        let (done, result) = oneshot::channel();
        self.send(Command::Append {
            record: LogRecord::now(level, message),
            done,
        })?;
        result.await.map_err(|_| writer_stopped())?
    }

    /// Drop every record and persist the empty document
    pub async fn clear(&self) -> Result<()> {
        let (done, result) = oneshot::channel();
        self.send(Command::Clear { done })?;
        result.await.map_err(|_| writer_stopped())?
    }

    /// Snapshot of the current records, oldest first
    pub async fn records(&self) -> Vec<LogRecord> {
        let (reply, records) = oneshot::channel();
        if self.send(Command::Snapshot { reply }).is_err() {
            return Vec::new();
        }
        records.await.unwrap_or_default()
    }

    fn send(&self, command: Command) -> Result<()> {
        self.commands.send(command).map_err(|_| writer_stopped())
    }
}

/// Sole owner of the records and the document file
struct Writer {
    path: PathBuf,
    capacity: usize,
    records: VecDeque<LogRecord>,
}

impl Writer {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        while let Some(command) = commands.recv().await {
            match command {
                Command::Append { record, done } => {
                    self.records.push_back(record);
                    while self.records.len() > self.capacity {
                        self.records.pop_front();
                    }
                    let _ = done.send(self.persist().await);
                }
                Command::Clear { done } => {
                    self.records.clear();
                    let _ = done.send(self.persist().await);
                }
                Command::Snapshot { reply } => {
                    let _ = reply.send(self.records.iter().cloned().collect());
                }
            }
        }
        debug!("[logstore] writer for {} stopped", self.path.display());
    }

    async fn persist(&self) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() {
                tokio::fs::create_dir_all(dir)
                    .await
                    .map_err(|e| write_error(dir, e))?;
            }
        }

        let html = render_document(self.records.iter(), self.capacity, OffsetDateTime::now_utc());
        atomic_write(&self.path, html.as_bytes()).await?;
        debug!(
            "[logstore] wrote {} records to {}",
            self.records.len(),
            self.path.display()
        );
        Ok(())
    }
}

/// Write `content` beside `path` then rename over it
async fn atomic_write(path: &Path, content: &[u8]) -> Result<()> {
    let file_name = path
        .file_name()
        .ok_or_else(|| Error::LogStore(format!("not a file path: {}", path.display())))?;
    let tmp = path.with_file_name(format!(".{}.tmp", file_name.to_string_lossy()));

    tokio::fs::write(&tmp, content)
        .await
        .map_err(|e| write_error(&tmp, e))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| write_error(path, e))
}

fn write_error(path: &Path, e: std::io::Error) -> Error {
    Error::LogStore(format!("failed to write {}: {}", path.display(), e))
}

fn writer_stopped() -> Error {
    Error::LogStore("log writer stopped".to_string())
}
