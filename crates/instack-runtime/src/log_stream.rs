//! Per-job live log stream: offset tracking, history replay and client fan-out.
//!
//! A stream owns two locks. The tail lock guards the read offset and the
//! terminal state; the clients lock guards the attached client set. Whenever
//! both are needed the tail lock is taken first. Neither lock is held across
//! an `.await`, and client sends never block, so a slow observer cannot stall
//! the tail monitor or other observers.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::Result;
use thiserror::Error;
use tokio::sync::{mpsc, watch};

use crate::locks::lock_unpoisoned;
use crate::log_message::{parse_log_line, LogMessage};
use crate::log_sink::{read_appended_lines, read_lines_until};

/// Filesystem timestamps may trail the wall clock by a scheduler tick.
const SENTINEL_MTIME_SLACK: Duration = Duration::from_secs(1);

/// Error returned by a client that could not accept a message.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LogStreamClientError {
    #[error("client queue is full")]
    QueueFull,
    #[error("client disconnected")]
    Disconnected,
    #[error("client transport failed: {0}")]
    Transport(String),
}

/// Send capability for one observer of a log stream.
///
/// `send` must not block: implementations either enqueue the message or fail
/// immediately, in which case the stream drops the client.
pub trait LogStreamClient: Send + Sync {
    fn send(&self, message: &LogMessage) -> Result<(), LogStreamClientError>;
    fn close(&self);
}

/// Client backed by a bounded tokio channel; the receiving half is drained by a transport.
pub struct ChannelLogStreamClient {
    sender: Mutex<Option<mpsc::Sender<LogMessage>>>,
}

impl ChannelLogStreamClient {
    pub fn new(capacity: usize) -> (Arc<Self>, mpsc::Receiver<LogMessage>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (
            Arc::new(Self {
                sender: Mutex::new(Some(sender)),
            }),
            receiver,
        )
    }
}

impl LogStreamClient for ChannelLogStreamClient {
    fn send(&self, message: &LogMessage) -> Result<(), LogStreamClientError> {
        let sender = lock_unpoisoned(&self.sender);
        let Some(sender) = sender.as_ref() else {
            return Err(LogStreamClientError::Disconnected);
        };
        sender.try_send(message.clone()).map_err(|error| match error {
            mpsc::error::TrySendError::Full(_) => LogStreamClientError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => LogStreamClientError::Disconnected,
        })
    }

    fn close(&self) {
        // Dropping the sender lets the receiver drain what is queued, then observe the end.
        lock_unpoisoned(&self.sender).take();
    }
}

/// How the job behind a stream ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogStreamOutcome {
    Succeeded,
    Failed { detail: String },
}

impl LogStreamOutcome {
    pub fn failed(detail: impl Into<String>) -> Self {
        Self::Failed {
            detail: detail.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }

    fn terminal_message(&self) -> LogMessage {
        match self {
            Self::Succeeded => LogMessage::completed(),
            Self::Failed { detail } => LogMessage::failed(detail),
        }
    }
}

/// Point-in-time view of a stream, used by the status surfaces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogStreamStatus {
    pub completed: bool,
    pub progress: u8,
    pub last_offset: u64,
    pub clients: usize,
}

/// What a newly attached client must be sent before live messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogStreamAttachment {
    pub history: Vec<LogMessage>,
    pub log_file_exists: bool,
    /// Set when the stream already finished; the client was not registered.
    pub terminal: Option<LogMessage>,
    pub registered: bool,
}

#[derive(Debug, Default)]
struct LogStreamTailState {
    last_offset: u64,
    completed: bool,
    shut_down: bool,
    progress: u8,
    terminal_message: Option<LogMessage>,
    outcome: Option<LogStreamOutcome>,
}

pub struct LogStream {
    task_id: String,
    log_file_path: PathBuf,
    software_key: String,
    sentinel_path: Option<PathBuf>,
    created_at: SystemTime,
    tail: Mutex<LogStreamTailState>,
    clients: Mutex<BTreeMap<String, Arc<dyn LogStreamClient>>>,
    cancel_tx: watch::Sender<bool>,
    completion_tx: watch::Sender<bool>,
}

impl std::fmt::Debug for LogStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogStream")
            .field("task_id", &self.task_id)
            .field("log_file_path", &self.log_file_path)
            .field("software_key", &self.software_key)
            .finish_non_exhaustive()
    }
}

impl LogStream {
    /// Creates a stream over `log_file_path`. When `sentinel_path` is set, the
    /// appearance of that file is treated as a successful completion, unless
    /// its modification time predates this stream.
    pub fn new(
        task_id: impl Into<String>,
        log_file_path: impl Into<PathBuf>,
        software_key: impl Into<String>,
        sentinel_path: Option<PathBuf>,
    ) -> Self {
        let (cancel_tx, _) = watch::channel(false);
        let (completion_tx, _) = watch::channel(false);
        Self {
            task_id: task_id.into(),
            log_file_path: log_file_path.into(),
            software_key: software_key.into(),
            sentinel_path,
            created_at: SystemTime::now(),
            tail: Mutex::new(LogStreamTailState::default()),
            clients: Mutex::new(BTreeMap::new()),
            cancel_tx,
            completion_tx,
        }
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub fn log_file_path(&self) -> &Path {
        &self.log_file_path
    }

    pub fn software_key(&self) -> &str {
        &self.software_key
    }

    pub fn is_completed(&self) -> bool {
        lock_unpoisoned(&self.tail).completed
    }

    pub fn outcome(&self) -> Option<LogStreamOutcome> {
        lock_unpoisoned(&self.tail).outcome.clone()
    }

    pub fn status(&self) -> LogStreamStatus {
        let tail = lock_unpoisoned(&self.tail);
        let clients = lock_unpoisoned(&self.clients).len();
        LogStreamStatus {
            completed: tail.completed,
            progress: tail.progress,
            last_offset: tail.last_offset,
            clients,
        }
    }

    /// Sends `message` to every attached client, dropping the ones that fail.
    /// Returns the number of clients that accepted the message.
    pub fn broadcast(&self, message: &LogMessage) -> usize {
        let mut clients = lock_unpoisoned(&self.clients);
        let mut failed = Vec::new();
        for (client_id, client) in clients.iter() {
            if let Err(error) = client.send(message) {
                tracing::debug!(
                    task_id = %self.task_id,
                    client_id = %client_id,
                    %error,
                    "dropping log stream client"
                );
                failed.push(client_id.clone());
            }
        }
        for client_id in &failed {
            if let Some(client) = clients.remove(client_id) {
                client.close();
            }
        }
        clients.len()
    }

    /// Replays history to a new client and registers it for live messages.
    ///
    /// History covers exactly the bytes before the current offset, and the
    /// client is registered before the tail lock is released, so every line is
    /// delivered once: either in the replay or by a later broadcast.
    ///
    /// The replay is a blocking file read of up to the whole log, performed
    /// while the tail lock is held. Async callers should run it on the blocking
    /// pool; the tail monitor of this stream waits for it either way.
    pub fn attach(
        &self,
        client_id: impl Into<String>,
        client: Arc<dyn LogStreamClient>,
    ) -> Result<LogStreamAttachment> {
        let client_id = client_id.into();
        let tail = lock_unpoisoned(&self.tail);
        let replayed = read_lines_until(&self.log_file_path, tail.last_offset)?;
        let log_file_exists = replayed.is_some() || self.log_file_path.exists();
        let history = replayed
            .unwrap_or_default()
            .iter()
            .map(|line| parse_log_line(line))
            .collect();

        if tail.completed || tail.shut_down {
            return Ok(LogStreamAttachment {
                history,
                log_file_exists,
                terminal: tail.terminal_message.clone(),
                registered: false,
            });
        }

        let replaced = lock_unpoisoned(&self.clients).insert(client_id.clone(), client);
        if let Some(previous) = replaced {
            previous.close();
        }
        tracing::debug!(
            task_id = %self.task_id,
            client_id = %client_id,
            offset = tail.last_offset,
            "log stream client attached"
        );
        Ok(LogStreamAttachment {
            history,
            log_file_exists,
            terminal: None,
            registered: true,
        })
    }

    /// Removes a client without closing it; returns whether it was attached.
    pub fn detach(&self, client_id: &str) -> bool {
        lock_unpoisoned(&self.clients).remove(client_id).is_some()
    }

    /// One tail tick: broadcast newly appended complete lines, then honor the sentinel.
    /// Returns the number of lines broadcast.
    pub fn poll_once(&self) -> Result<usize> {
        let mut tail = lock_unpoisoned(&self.tail);
        if tail.completed || tail.shut_down {
            return Ok(0);
        }
        let mut broadcast_lines = 0;
        if let Some(chunk) = read_appended_lines(&self.log_file_path, tail.last_offset, false)? {
            broadcast_lines = chunk.lines.len();
            for line in &chunk.lines {
                self.broadcast_line(&mut tail, line);
            }
            tail.last_offset = tail.last_offset.max(chunk.next_offset);
        }

        if self.sentinel_written_for_this_stream() {
            tracing::info!(
                task_id = %self.task_id,
                software_key = %self.software_key,
                "completion sentinel observed"
            );
            self.complete_locked(&mut tail, LogStreamOutcome::Succeeded);
        }
        Ok(broadcast_lines)
    }

    /// Drains remaining output (including a trailing partial line), broadcasts
    /// the terminal message and marks the stream completed. Returns `false`
    /// when the stream had already completed.
    pub fn complete(&self, outcome: LogStreamOutcome) -> bool {
        let mut tail = lock_unpoisoned(&self.tail);
        self.complete_locked(&mut tail, outcome)
    }

    /// Resolves to `true` once the terminal message has been broadcast.
    pub fn subscribe_completion(&self) -> watch::Receiver<bool> {
        self.completion_tx.subscribe()
    }

    pub(crate) fn subscribe_cancellation(&self) -> watch::Receiver<bool> {
        self.cancel_tx.subscribe()
    }

    /// Stops the tail monitor and closes every attached client.
    pub fn shutdown(&self) {
        let mut tail = lock_unpoisoned(&self.tail);
        tail.shut_down = true;
        self.cancel_tx.send_replace(true);
        let clients = std::mem::take(&mut *lock_unpoisoned(&self.clients));
        drop(tail);
        for client in clients.into_values() {
            client.close();
        }
    }

    fn sentinel_written_for_this_stream(&self) -> bool {
        let Some(path) = self.sentinel_path.as_ref() else {
            return false;
        };
        let Ok(metadata) = std::fs::metadata(path) else {
            return false;
        };
        let oldest_accepted = self
            .created_at
            .checked_sub(SENTINEL_MTIME_SLACK)
            .unwrap_or(UNIX_EPOCH);
        metadata
            .modified()
            .map_or(true, |modified| modified >= oldest_accepted)
    }

    fn broadcast_line(&self, tail: &mut LogStreamTailState, line: &str) {
        let message = parse_log_line(line);
        if let Some(progress) = message.progress {
            tail.progress = progress;
        }
        self.broadcast(&message);
    }

    fn complete_locked(&self, tail: &mut LogStreamTailState, outcome: LogStreamOutcome) -> bool {
        if tail.completed {
            return false;
        }
        match read_appended_lines(&self.log_file_path, tail.last_offset, true) {
            Ok(Some(chunk)) => {
                for line in &chunk.lines {
                    self.broadcast_line(tail, line);
                }
                tail.last_offset = tail.last_offset.max(chunk.next_offset);
            }
            Ok(None) => {}
            Err(error) => {
                tracing::warn!(
                    task_id = %self.task_id,
                    path = %self.log_file_path.display(),
                    %error,
                    "final log drain failed"
                );
            }
        }

        let terminal = outcome.terminal_message();
        if outcome.is_success() {
            tail.progress = 100;
        }
        self.broadcast(&terminal);
        tail.completed = true;
        tail.terminal_message = Some(terminal);
        tail.outcome = Some(outcome);

        let clients = std::mem::take(&mut *lock_unpoisoned(&self.clients));
        for client in clients.into_values() {
            client.close();
        }
        self.cancel_tx.send_replace(true);
        self.completion_tx.send_replace(true);
        tracing::debug!(
            task_id = %self.task_id,
            offset = tail.last_offset,
            "log stream completed"
        );
        true
    }
}
