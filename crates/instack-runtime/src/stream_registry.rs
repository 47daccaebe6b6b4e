//! Task-id indexed registry of live log streams.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use thiserror::Error;

use crate::locks::{read_unpoisoned, write_unpoisoned};
use crate::log_sink::SENTINEL_FILE_SUFFIX;
use crate::log_stream::LogStream;
use crate::tail_monitor::{spawn_tail_monitor, DEFAULT_TAIL_INTERVAL_MS};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LogStreamRegistryError {
    #[error("log stream already exists for task '{0}'")]
    AlreadyExists(String),
    #[error("log stream for task '{0}' requires a running tokio runtime")]
    RuntimeUnavailable(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogStreamRegistryConfig {
    pub tail_interval: Duration,
    /// Directory holding `<software_key>-end.log` markers; `None` disables them.
    pub sentinel_dir: Option<PathBuf>,
}

impl Default for LogStreamRegistryConfig {
    fn default() -> Self {
        Self {
            tail_interval: Duration::from_millis(DEFAULT_TAIL_INTERVAL_MS),
            sentinel_dir: None,
        }
    }
}

/// Shared handle to the set of live streams. Clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct LogStreamRegistry {
    inner: Arc<LogStreamRegistryInner>,
}

#[derive(Debug, Default)]
struct LogStreamRegistryInner {
    config: LogStreamRegistryConfig,
    streams: RwLock<HashMap<String, Arc<LogStream>>>,
}

impl LogStreamRegistry {
    pub fn new(config: LogStreamRegistryConfig) -> Self {
        Self {
            inner: Arc::new(LogStreamRegistryInner {
                config,
                streams: RwLock::new(HashMap::new()),
            }),
        }
    }

    pub fn config(&self) -> &LogStreamRegistryConfig {
        &self.inner.config
    }

    /// Registers a stream for `task_id` and starts its tail monitor.
    pub fn create(
        &self,
        task_id: &str,
        log_file_path: impl Into<PathBuf>,
        software_key: &str,
    ) -> Result<Arc<LogStream>, LogStreamRegistryError> {
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(LogStreamRegistryError::RuntimeUnavailable(
                task_id.to_string(),
            ));
        }
        let sentinel_path = self
            .inner
            .config
            .sentinel_dir
            .as_ref()
            .map(|dir| dir.join(format!("{software_key}{SENTINEL_FILE_SUFFIX}")));
        let stream = {
            let mut streams = write_unpoisoned(&self.inner.streams);
            if streams.contains_key(task_id) {
                return Err(LogStreamRegistryError::AlreadyExists(task_id.to_string()));
            }
            let stream = Arc::new(LogStream::new(
                task_id,
                log_file_path,
                software_key,
                sentinel_path,
            ));
            streams.insert(task_id.to_string(), stream.clone());
            stream
        };
        spawn_tail_monitor(stream.clone(), self.inner.config.tail_interval);
        tracing::debug!(task_id, software_key, "log stream registered");
        Ok(stream)
    }

    pub fn get(&self, task_id: &str) -> Option<Arc<LogStream>> {
        read_unpoisoned(&self.inner.streams).get(task_id).cloned()
    }

    /// Cancels the tail monitor, closes clients and forgets the stream.
    /// Returns `false` when nothing was registered under `task_id`.
    pub fn remove(&self, task_id: &str) -> bool {
        let removed = write_unpoisoned(&self.inner.streams).remove(task_id);
        match removed {
            Some(stream) => {
                stream.shutdown();
                tracing::debug!(task_id, "log stream removed");
                true
            }
            None => false,
        }
    }

    /// Removes `task_id` once `delay` has elapsed.
    pub fn remove_after(&self, task_id: &str, delay: Duration) {
        if delay.is_zero() {
            self.remove(task_id);
            return;
        }
        let registry = self.clone();
        let task_id = task_id.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            registry.remove(&task_id);
        });
    }

    pub fn task_ids(&self) -> Vec<String> {
        let mut task_ids: Vec<String> = read_unpoisoned(&self.inner.streams)
            .keys()
            .cloned()
            .collect();
        task_ids.sort();
        task_ids
    }

    pub fn len(&self) -> usize {
        read_unpoisoned(&self.inner.streams).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
