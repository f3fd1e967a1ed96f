/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! Durable message log.
//!
//! Every raw wire message and every execution record is written to two
//! sinks: a session-scoped file partitioned by UTC day and a communal file
//! shared by all sessions of the process. Layout under the log directory:
//!
//! ```text
//! {YYYY-MM-DD}_{session}.messages.log
//! {YYYY-MM-DD}_{session}.executions.log
//! communal.messages.log
//! communal.executions.log
//! ```
//!
//! Files are opened in append mode and never truncated. Each entry is one
//! line handed to the file in a single unbuffered write, so an entry that
//! failed is never written later behind the caller's back.

use chrono::{NaiveDate, Utc};
use fixmux_core::error::LogWriteError;
use fixmux_core::execution::ExecutionRecord;
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

const MESSAGES_SUFFIX: &str = "messages.log";
const EXECUTIONS_SUFFIX: &str = "executions.log";

/// One append-only file.
#[derive(Debug)]
struct LogSink<W = File> {
    path: PathBuf,
    writer: W,
}

impl LogSink {
    fn open(path: PathBuf) -> Result<Self, LogWriteError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| LogWriteError::new(&path, &e))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| LogWriteError::new(&path, &e))?;
        Ok(Self { path, writer: file })
    }
}

impl<W: Write> LogSink<W> {
    fn append_line(&mut self, line: &[u8]) -> Result<(), LogWriteError> {
        let mut entry = Vec::with_capacity(line.len() + 1);
        entry.extend_from_slice(line);
        entry.push(b'\n');
        self.writer
            .write_all(&entry)
            .and_then(|()| self.writer.flush())
            .map_err(|e| LogWriteError::new(&self.path, &e))
    }
}

/// Cross-session sinks shared by every session of the process.
///
/// Each sink sits behind its own mutex so concurrent sessions never
/// interleave partial lines.
#[derive(Debug)]
pub struct CommunalLog {
    messages: Mutex<LogSink>,
    executions: Mutex<LogSink>,
}

impl CommunalLog {
    /// Opens the communal sinks under `dir`, creating it if needed.
    ///
    /// # Errors
    /// Returns `LogWriteError` if a file cannot be opened.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, LogWriteError> {
        let dir = dir.as_ref();
        Ok(Self {
            messages: Mutex::new(LogSink::open(
                dir.join(format!("communal.{MESSAGES_SUFFIX}")),
            )?),
            executions: Mutex::new(LogSink::open(
                dir.join(format!("communal.{EXECUTIONS_SUFFIX}")),
            )?),
        })
    }

    /// Returns the path of the communal message log.
    #[must_use]
    pub fn messages_path(&self) -> PathBuf {
        self.messages.lock().path.clone()
    }

    /// Returns the path of the communal execution log.
    #[must_use]
    pub fn executions_path(&self) -> PathBuf {
        self.executions.lock().path.clone()
    }

    fn append_message(&self, line: &[u8]) -> Result<(), LogWriteError> {
        self.messages.lock().append_line(line)
    }

    fn append_execution(&self, line: &[u8]) -> Result<(), LogWriteError> {
        self.executions.lock().append_line(line)
    }
}

/// Session-scoped sinks for the current UTC day.
#[derive(Debug)]
struct DailySinks {
    day: NaiveDate,
    messages: Option<LogSink>,
    executions: Option<LogSink>,
}

/// Durable log of one session.
///
/// Owned by one session's message pipeline, so writes to the session sinks
/// happen in invocation order. The communal half is shared through an `Arc`.
#[derive(Debug)]
pub struct SessionLog {
    dir: PathBuf,
    session_key: String,
    communal: Arc<CommunalLog>,
    daily: Option<DailySinks>,
}

impl SessionLog {
    /// Creates the log for one session.
    ///
    /// Session files are opened lazily on the first write of each UTC day.
    ///
    /// # Arguments
    /// * `dir` - Directory holding the session files
    /// * `session_key` - File-name key of the session (`BEGIN-SENDER-TARGET`)
    /// * `communal` - The process-wide communal sinks
    #[must_use]
    pub fn new(
        dir: impl Into<PathBuf>,
        session_key: impl Into<String>,
        communal: Arc<CommunalLog>,
    ) -> Self {
        Self {
            dir: dir.into(),
            session_key: session_key.into(),
            communal,
            daily: None,
        }
    }

    /// Appends a raw wire message to the session and communal message logs.
    ///
    /// Both sinks are always attempted.
    ///
    /// # Errors
    /// Returns the first `LogWriteError` encountered.
    pub fn log_raw(&mut self, raw: &[u8]) -> Result<(), LogWriteError> {
        self.log_raw_on(Utc::now().date_naive(), raw)
    }

    /// Appends an execution record line to the session and communal
    /// execution logs.
    ///
    /// # Errors
    /// Returns the first `LogWriteError` encountered.
    pub fn log_execution(&mut self, record: &ExecutionRecord) -> Result<(), LogWriteError> {
        self.log_execution_on(Utc::now().date_naive(), record)
    }

    /// Returns the session message log path for `day`.
    #[must_use]
    pub fn messages_path(&self, day: NaiveDate) -> PathBuf {
        self.daily_path(day, MESSAGES_SUFFIX)
    }

    /// Returns the session execution log path for `day`.
    #[must_use]
    pub fn executions_path(&self, day: NaiveDate) -> PathBuf {
        self.daily_path(day, EXECUTIONS_SUFFIX)
    }

    fn log_raw_on(&mut self, day: NaiveDate, raw: &[u8]) -> Result<(), LogWriteError> {
        let session = self
            .session_messages(day)
            .and_then(|sink| sink.append_line(raw));
        let communal = self.communal.append_message(raw);
        first_error(session, communal)
    }

    fn log_execution_on(
        &mut self,
        day: NaiveDate,
        record: &ExecutionRecord,
    ) -> Result<(), LogWriteError> {
        let line = record.to_string();
        let session = self
            .session_executions(day)
            .and_then(|sink| sink.append_line(line.as_bytes()));
        let communal = self.communal.append_execution(line.as_bytes());
        first_error(session, communal)
    }

    fn daily_path(&self, day: NaiveDate, suffix: &str) -> PathBuf {
        self.dir.join(format!(
            "{}_{}.{}",
            day.format("%Y-%m-%d"),
            self.session_key,
            suffix
        ))
    }

    fn daily_for(&mut self, day: NaiveDate) -> &mut DailySinks {
        if self.daily.as_ref().is_some_and(|d| d.day != day) {
            debug!(session = %self.session_key, %day, "rolling session logs");
            self.daily = None;
        }
        self.daily.get_or_insert_with(|| DailySinks {
            day,
            messages: None,
            executions: None,
        })
    }

    fn session_messages(&mut self, day: NaiveDate) -> Result<&mut LogSink, LogWriteError> {
        let path = self.messages_path(day);
        let daily = self.daily_for(day);
        open_slot(&mut daily.messages, path)
    }

    fn session_executions(&mut self, day: NaiveDate) -> Result<&mut LogSink, LogWriteError> {
        let path = self.executions_path(day);
        let daily = self.daily_for(day);
        open_slot(&mut daily.executions, path)
    }
}

fn open_slot(slot: &mut Option<LogSink>, path: PathBuf) -> Result<&mut LogSink, LogWriteError> {
    let sink = match slot.take() {
        Some(sink) => sink,
        None => LogSink::open(path)?,
    };
    Ok(slot.insert(sink))
}

fn first_error(
    session: Result<(), LogWriteError>,
    communal: Result<(), LogWriteError>,
) -> Result<(), LogWriteError> {
    match (session, communal) {
        (Err(first), Err(second)) => {
            warn!(error = %second, "communal log write failed");
            Err(first)
        }
        (Err(e), Ok(())) | (Ok(()), Err(e)) => Err(e),
        (Ok(()), Ok(())) => Ok(()),
    }
}
