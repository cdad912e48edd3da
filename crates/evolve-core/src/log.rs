//! Append-only job log with replay-from-start observers.
//!
//! A `LogStream` is owned by exactly one running job. Readers obtained from
//! [`LogStream::reader`] can open any number of [`LogCursor`]s; each cursor
//! starts at the first entry and yields entries as they are appended. A
//! cursor ends once the stream has been dropped and every entry was seen.

use chrono::{DateTime, Utc};
use futures::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{error, info};
use uuid::Uuid;

use crate::telemetry::JOB_LOG_TARGET;

/// Severity of a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Info,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Info => "INFO",
            LogLevel::Error => "ERROR",
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One line of the job log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Strictly increasing within a job, starting at 1
    pub seq: u64,
    pub level: LogLevel,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl LogEntry {
    pub fn is_error(&self) -> bool {
        self.level == LogLevel::Error
    }
}

impl std::fmt::Display for LogEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.level, self.message)
    }
}

/// Writer side of a job log.
#[derive(Debug)]
pub struct LogStream {
    job_id: Uuid,
    tx: watch::Sender<Vec<LogEntry>>,
}

impl LogStream {
    pub fn new(job_id: Uuid) -> Self {
        let (tx, _rx) = watch::channel(Vec::new());
        Self { job_id, tx }
    }

    pub fn job_id(&self) -> Uuid {
        self.job_id
    }

    /// Append an entry and wake every live cursor.
    ///
    /// The entry is also mirrored to `tracing` under [`JOB_LOG_TARGET`].
    pub fn append(&self, level: LogLevel, message: impl Into<String>) -> LogEntry {
        let mut entry = LogEntry {
            seq: 0,
            level,
            message: message.into(),
            timestamp: Utc::now(),
        };
        self.tx.send_modify(|entries| {
            entry.seq = entries.len() as u64 + 1;
            entries.push(entry.clone());
        });

        match level {
            LogLevel::Info => info!(
                target: JOB_LOG_TARGET,
                job_id = %self.job_id,
                seq = entry.seq,
                "{}",
                entry.message
            ),
            LogLevel::Error => error!(
                target: JOB_LOG_TARGET,
                job_id = %self.job_id,
                seq = entry.seq,
                "{}",
                entry.message
            ),
        }
        entry
    }

    pub fn info(&self, message: impl Into<String>) -> LogEntry {
        self.append(LogLevel::Info, message)
    }

    pub fn error(&self, message: impl Into<String>) -> LogEntry {
        self.append(LogLevel::Error, message)
    }

    /// Number of entries appended so far.
    pub fn len(&self) -> usize {
        self.tx.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of every entry appended so far.
    pub fn snapshot(&self) -> Vec<LogEntry> {
        self.tx.borrow().clone()
    }

    /// Read handle that outlives this stream.
    pub fn reader(&self) -> LogReader {
        LogReader {
            rx: self.tx.subscribe(),
        }
    }
}

/// Cloneable read handle on a job log.
#[derive(Debug, Clone)]
pub struct LogReader {
    rx: watch::Receiver<Vec<LogEntry>>,
}

impl LogReader {
    /// Cursor positioned before the first entry.
    pub fn cursor(&self) -> LogCursor {
        LogCursor {
            rx: self.rx.clone(),
            pos: 0,
        }
    }

    /// Entries appended so far.
    pub fn snapshot(&self) -> Vec<LogEntry> {
        self.rx.borrow().clone()
    }

    /// Whether the writer has gone away.
    pub fn is_closed(&self) -> bool {
        self.rx.has_changed().is_err()
    }
}

/// Sequential position in a job log.
#[derive(Debug)]
pub struct LogCursor {
    rx: watch::Receiver<Vec<LogEntry>>,
    pos: usize,
}

impl LogCursor {
    /// Next entry, waiting for it if necessary.
    ///
    /// Returns `None` once the writer is dropped and all entries were read.
    pub async fn next(&mut self) -> Option<LogEntry> {
        loop {
            if let Some(entry) = self.take_buffered() {
                return Some(entry);
            }
            if self.rx.changed().await.is_err() {
                return self.take_buffered();
            }
        }
    }

    fn take_buffered(&mut self) -> Option<LogEntry> {
        let entries = self.rx.borrow_and_update();
        let entry = entries.get(self.pos).cloned()?;
        self.pos += 1;
        Some(entry)
    }

    /// Adapt into a `futures::Stream`.
    pub fn into_stream(self) -> impl Stream<Item = LogEntry> + Send {
        stream::unfold(self, |mut cursor| async move {
            cursor.next().await.map(|entry| (entry, cursor))
        })
    }
}
