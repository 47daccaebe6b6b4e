//! Shell-driven install/uninstall job runner.
//!
//! A job renders its script to disk, runs `<shell> <script>` with stdout and
//! stderr appended to a fresh log file, and streams that log through a
//! registered [`LogStream`] until the process exits. Terminal state is decided
//! here, from the process wait, exactly once per job.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use instack_core::{
    current_unix_timestamp_ms, format_rfc3339_now, remove_file_if_exists, write_text_atomic,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::process::{Child, Command};
use tokio::task::JoinError;

use crate::job_store::{JobStatusStore, JobStatusUpdate, SoftwareStatus};
use crate::locks::{read_unpoisoned, write_unpoisoned};
use crate::log_sink::{create_log_file, read_history_lines, InstallLogLayout};
use crate::log_stream::{LogStream, LogStreamOutcome};
use crate::script_resolver::is_safe_identifier;
use crate::stream_registry::{LogStreamRegistry, LogStreamRegistryConfig, LogStreamRegistryError};
use crate::tail_monitor::DEFAULT_TAIL_INTERVAL_MS;

pub const DEFAULT_JOB_SHELL: &str = "bash";
pub const DEFAULT_CLIENT_QUEUE_CAPACITY: usize = 1_024;
pub const DEFAULT_STREAM_RETENTION_MS: u64 = 300_000;

const INSTALL_JOB_REASON_QUEUED: &str = "job_queued";
const INSTALL_JOB_REASON_STARTED: &str = "job_started";
const INSTALL_JOB_REASON_SUCCEEDED: &str = "job_succeeded";
const INSTALL_JOB_REASON_NON_ZERO_EXIT: &str = "job_non_zero_exit";
const INSTALL_JOB_REASON_SPAWN_FAILED: &str = "job_spawn_failed";
const INSTALL_JOB_REASON_RUNTIME_ERROR: &str = "job_runtime_error";
const INSTALL_JOB_REASON_PANICKED: &str = "job_panicked";

static INSTALL_JOB_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum InstallJobKind {
    Install,
    Uninstall,
}

impl InstallJobKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Install => "install",
            Self::Uninstall => "uninstall",
        }
    }
}

impl fmt::Display for InstallJobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of one job: `Pending -> Running -> {Succeeded, Failed}`, or
/// `Pending -> Failed` when the process never started.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InstallJobState {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl InstallJobState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallJobRequest {
    pub kind: InstallJobKind,
    pub software_key: String,
    pub version: String,
    /// Script body written to disk and run by the configured shell.
    pub script: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InstallJobRecord {
    pub task_id: String,
    pub kind: InstallJobKind,
    pub software_key: String,
    pub version: String,
    pub state: InstallJobState,
    pub log_file_name: String,
    pub log_file_path: PathBuf,
    pub created_unix_ms: u64,
    #[serde(default)]
    pub started_unix_ms: Option<u64>,
    #[serde(default)]
    pub completed_unix_ms: Option<u64>,
    #[serde(default)]
    pub exit_code: Option<i32>,
    #[serde(default)]
    pub error: Option<String>,
    pub reason_code: String,
    #[serde(default)]
    pub progress: u8,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct InstallJobStatus {
    pub task_id: String,
    pub state: InstallJobState,
    pub completed: bool,
    pub progress: u8,
    pub clients: usize,
    pub exit_code: Option<i32>,
    pub reason_code: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct InstallJobHistory {
    pub task_id: String,
    pub content: Vec<String>,
    pub completed: bool,
    pub progress: u8,
}

#[derive(Debug, Error)]
pub enum InstallJobError {
    #[error("invalid install job request: {0}")]
    InvalidRequest(String),
    #[error("install task '{0}' not found")]
    TaskNotFound(String),
    #[error("software '{software_key}' already has an unfinished job '{task_id}'")]
    AlreadyRunning {
        software_key: String,
        task_id: String,
    },
    #[error("install task '{task_id}' failed to spawn: {message}")]
    SpawnFailed { task_id: String, message: String },
    #[error("install task '{task_id}' could not register its log stream: {source}")]
    Stream {
        task_id: String,
        source: LogStreamRegistryError,
    },
    #[error("install task '{task_id}' log read failed: {message}")]
    LogRead { task_id: String, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallJobRunnerConfig {
    pub layout: InstallLogLayout,
    pub shell: String,
    pub tail_interval: Duration,
    pub client_queue_capacity: usize,
    /// How long a completed stream stays attachable before it is retired.
    pub stream_retention: Duration,
    /// Treat `<sentinel_dir>/<key>-end.log` appearing as successful completion.
    pub legacy_sentinel: bool,
}

impl Default for InstallJobRunnerConfig {
    fn default() -> Self {
        Self {
            layout: InstallLogLayout::default(),
            shell: DEFAULT_JOB_SHELL.to_string(),
            tail_interval: Duration::from_millis(DEFAULT_TAIL_INTERVAL_MS),
            client_queue_capacity: DEFAULT_CLIENT_QUEUE_CAPACITY,
            stream_retention: Duration::from_millis(DEFAULT_STREAM_RETENTION_MS),
            legacy_sentinel: true,
        }
    }
}

#[derive(Clone)]
pub struct InstallJobRunner {
    inner: Arc<InstallJobRunnerInner>,
}

struct InstallJobRunnerInner {
    config: InstallJobRunnerConfig,
    registry: LogStreamRegistry,
    store: Arc<dyn JobStatusStore>,
    jobs: RwLock<HashMap<String, InstallJobRecord>>,
}

impl fmt::Debug for InstallJobRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstallJobRunner")
            .field("config", &self.inner.config)
            .field("streams", &self.inner.registry.len())
            .finish_non_exhaustive()
    }
}

impl InstallJobRunner {
    pub fn new(config: InstallJobRunnerConfig, store: Arc<dyn JobStatusStore>) -> Self {
        let registry = LogStreamRegistry::new(LogStreamRegistryConfig {
            tail_interval: config.tail_interval,
            sentinel_dir: config
                .legacy_sentinel
                .then(|| config.layout.sentinel_dir.clone()),
        });
        Self {
            inner: Arc::new(InstallJobRunnerInner {
                config,
                registry,
                store,
                jobs: RwLock::new(HashMap::new()),
            }),
        }
    }

    pub fn config(&self) -> &InstallJobRunnerConfig {
        &self.inner.config
    }

    pub fn registry(&self) -> &LogStreamRegistry {
        &self.inner.registry
    }

    /// Starts a job and returns its task id once the process is running.
    ///
    /// At most one unfinished job exists per software key: the key names the
    /// shared completion sentinel, so a second job would observe the first
    /// one's sentinel as its own completion.
    pub async fn start(&self, request: InstallJobRequest) -> Result<String, InstallJobError> {
        validate_request(&request)?;
        let layout = &self.inner.config.layout;
        let created = current_unix_timestamp_ms();
        let task_id = next_install_task_id(&request.software_key, &request.version, created);
        let log_file_name = layout.next_log_file_name(request.kind.as_str());
        let log_file_path = layout.log_file_path(&log_file_name);
        let script_path = layout.script_path(&task_id);

        let mut jobs = write_unpoisoned(&self.inner.jobs);
        if let Some(active) = jobs
            .values()
            .find(|job| job.software_key == request.software_key && !job.state.is_terminal())
        {
            tracing::info!(
                software_key = %request.software_key,
                active_task_id = %active.task_id,
                "rejecting job while another one for the same software is unfinished"
            );
            return Err(InstallJobError::AlreadyRunning {
                software_key: request.software_key.clone(),
                task_id: active.task_id.clone(),
            });
        }
        jobs.insert(
            task_id.clone(),
            InstallJobRecord {
                task_id: task_id.clone(),
                kind: request.kind,
                software_key: request.software_key.clone(),
                version: request.version.clone(),
                state: InstallJobState::Pending,
                log_file_name: log_file_name.clone(),
                log_file_path: log_file_path.clone(),
                created_unix_ms: created,
                started_unix_ms: None,
                completed_unix_ms: None,
                exit_code: None,
                error: None,
                reason_code: INSTALL_JOB_REASON_QUEUED.to_string(),
                progress: 0,
            },
        );
        drop(jobs);

        let log_file = match create_log_file(&log_file_path) {
            Ok(file) => file,
            Err(error) => return Err(self.fail_before_start(&task_id, &request, &error)),
        };
        let sentinel_path = layout.sentinel_path(&request.software_key);
        if let Err(error) = remove_file_if_exists(&sentinel_path) {
            tracing::warn!(
                task_id = %task_id,
                path = %sentinel_path.display(),
                %error,
                "failed to remove stale completion sentinel"
            );
        }
        if let Err(error) = write_text_atomic(&script_path, &request.script) {
            return Err(self.fail_before_start(&task_id, &request, &error));
        }

        self.persist(
            &task_id,
            &request.software_key,
            &request.version,
            &JobStatusUpdate {
                status: SoftwareStatus::Installing,
                log_file: Some(log_file_name.clone()),
                task_id: Some(task_id.clone()),
                ..JobStatusUpdate::default()
            },
        );

        let stderr_file = match log_file.try_clone() {
            Ok(file) => file,
            Err(error) => return Err(self.fail_before_start(&task_id, &request, &error)),
        };
        let mut command = Command::new(self.inner.config.shell.as_str());
        command.arg(&script_path);
        command.kill_on_drop(true);
        command.stdin(Stdio::null());
        command.stdout(Stdio::from(log_file));
        command.stderr(Stdio::from(stderr_file));
        let child = match command.spawn() {
            Ok(child) => child,
            Err(error) => return Err(self.fail_before_start(&task_id, &request, &error)),
        };

        let stream = match self.inner.registry.create(
            &task_id,
            log_file_path.clone(),
            &request.software_key,
        ) {
            Ok(stream) => stream,
            Err(source) => {
                // The child is killed on drop; record the failure like a spawn error.
                drop(child);
                let _ = self.fail_before_start(&task_id, &request, &source);
                return Err(InstallJobError::Stream { task_id, source });
            }
        };

        self.update_record(&task_id, |record| {
            record.state = InstallJobState::Running;
            record.reason_code = INSTALL_JOB_REASON_STARTED.to_string();
            record.started_unix_ms = Some(current_unix_timestamp_ms());
        });
        tracing::info!(
            task_id = %task_id,
            kind = request.kind.as_str(),
            software_key = %request.software_key,
            version = %request.version,
            path = %log_file_path.display(),
            "install job started"
        );

        let runner = self.clone();
        let supervised_task_id = task_id.clone();
        tokio::spawn(async move {
            runner
                .supervise(supervised_task_id, request, child, stream, script_path)
                .await;
        });
        Ok(task_id)
    }

    pub fn job(&self, task_id: &str) -> Result<InstallJobRecord, InstallJobError> {
        read_unpoisoned(&self.inner.jobs)
            .get(task_id)
            .cloned()
            .ok_or_else(|| InstallJobError::TaskNotFound(task_id.to_string()))
    }

    /// Every known job, oldest first.
    pub fn list_jobs(&self) -> Vec<InstallJobRecord> {
        let mut jobs: Vec<InstallJobRecord> =
            read_unpoisoned(&self.inner.jobs).values().cloned().collect();
        jobs.sort_by(|left, right| {
            left.created_unix_ms
                .cmp(&right.created_unix_ms)
                .then_with(|| left.task_id.cmp(&right.task_id))
        });
        jobs
    }

    pub fn status(&self, task_id: &str) -> Result<InstallJobStatus, InstallJobError> {
        let record = self.job(task_id)?;
        let live = self
            .inner
            .registry
            .get(task_id)
            .map(|stream| stream.status());
        let (completed, progress, clients) = match live {
            Some(status) => (
                status.completed || record.state.is_terminal(),
                status.progress,
                status.clients,
            ),
            None => (record.state.is_terminal(), record.progress, 0),
        };
        Ok(InstallJobStatus {
            task_id: record.task_id,
            state: record.state,
            completed,
            progress,
            clients,
            exit_code: record.exit_code,
            reason_code: record.reason_code,
        })
    }

    /// Line-paginated log history; works after the live stream was retired.
    pub fn history(
        &self,
        task_id: &str,
        offset: usize,
        limit: usize,
    ) -> Result<InstallJobHistory, InstallJobError> {
        let status = self.status(task_id)?;
        let record = self.job(task_id)?;
        let content = read_history_lines(&record.log_file_path, offset, limit).map_err(|error| {
            InstallJobError::LogRead {
                task_id: task_id.to_string(),
                message: format!("{error:#}"),
            }
        })?;
        Ok(InstallJobHistory {
            task_id: status.task_id,
            content,
            completed: status.completed,
            progress: status.progress,
        })
    }

    /// Retires every live stream; running processes keep their supervisors.
    pub fn shutdown_streams(&self) -> usize {
        self.inner
            .registry
            .task_ids()
            .iter()
            .filter(|task_id| self.inner.registry.remove(task_id))
            .count()
    }

    async fn supervise(
        self,
        task_id: String,
        request: InstallJobRequest,
        mut child: Child,
        stream: Arc<LogStream>,
        script_path: PathBuf,
    ) {
        // The wait and the finish step each run in their own task so a panic in
        // the process wait, the status store or a client still ends the job.
        let waited = tokio::spawn(async move { child.wait().await }).await;
        let completion = classify_exit(waited);

        let runner = self.clone();
        let finish_task_id = task_id.clone();
        let finish_request = request.clone();
        let finish_stream = stream.clone();
        let finish_completion = completion.clone();
        let finished = tokio::spawn(async move {
            runner.finish(
                &finish_task_id,
                &finish_request,
                &finish_stream,
                finish_completion,
            );
        })
        .await;
        if let Err(error) = finished {
            self.recover_from_failed_finish(&task_id, &request, &stream, completion, error)
                .await;
        }

        if let Err(error) = remove_file_if_exists(&script_path) {
            tracing::warn!(
                task_id = %task_id,
                path = %script_path.display(),
                %error,
                "failed to remove job script"
            );
        }
        if stream.is_completed() {
            self.inner
                .registry
                .remove_after(&task_id, self.inner.config.stream_retention);
        } else {
            // No terminal message went out; retire now so observers and the tail monitor stop.
            self.inner.registry.remove(&task_id);
        }
    }

    /// Settles the record and retries the final persist after `finish` panicked.
    /// Observers that already received a terminal message keep that outcome.
    async fn recover_from_failed_finish(
        &self,
        task_id: &str,
        request: &InstallJobRequest,
        stream: &LogStream,
        completion: JobCompletion,
        error: JoinError,
    ) {
        let message = if error.is_panic() {
            format!(
                "job finish panicked: {}",
                panic_message(&*error.into_panic())
            )
        } else {
            format!("job finish aborted: {error}")
        };
        tracing::error!(task_id, error = %message, "install job finish step failed");

        let settled = if stream.outcome().is_some() {
            completion
        } else {
            JobCompletion {
                state: InstallJobState::Failed,
                reason_code: INSTALL_JOB_REASON_PANICKED,
                exit_code: completion.exit_code,
                error: Some(message),
            }
        };

        let runner = self.clone();
        let persist_task_id = task_id.to_string();
        let update = final_status_update(request, settled.state == InstallJobState::Succeeded);
        let software_key = request.software_key.clone();
        let version = request.version.clone();
        let persisted = tokio::spawn(async move {
            runner.persist(&persist_task_id, &software_key, &version, &update);
        })
        .await;
        if persisted.is_err() {
            tracing::warn!(task_id, "final job status could not be persisted");
        }
        self.record_completion(task_id, &settled, stream.status().progress);
    }

    /// Completes the stream, writes the sentinel and persists the final status.
    /// The record turns terminal last; a terminal record admits the next job
    /// for the same software, which must not see this job's sentinel.
    fn finish(
        &self,
        task_id: &str,
        request: &InstallJobRequest,
        stream: &LogStream,
        completion: JobCompletion,
    ) {
        let already_terminal = read_unpoisoned(&self.inner.jobs)
            .get(task_id)
            .map_or(true, |record| record.state.is_terminal());
        if already_terminal {
            return;
        }

        if !stream.complete(completion.outcome()) {
            tracing::debug!(task_id, "log stream already completed by sentinel");
        }
        let succeeded = completion.state == InstallJobState::Succeeded;
        if succeeded {
            self.write_sentinel(task_id, &request.software_key);
        }
        self.persist(
            task_id,
            &request.software_key,
            &request.version,
            &final_status_update(request, succeeded),
        );
        self.record_completion(task_id, &completion, stream.status().progress);
        tracing::info!(
            task_id,
            state = completion.state.as_str(),
            reason_code = completion.reason_code,
            exit_code = ?completion.exit_code,
            "install job finished"
        );
    }

    fn record_completion(&self, task_id: &str, completion: &JobCompletion, progress: u8) {
        self.update_record(task_id, |record| {
            if record.state.is_terminal() {
                return;
            }
            record.state = completion.state;
            record.reason_code = completion.reason_code.to_string();
            record.exit_code = completion.exit_code;
            record.error = completion.error.clone();
            record.completed_unix_ms = Some(current_unix_timestamp_ms());
            record.progress = progress;
        });
    }

    fn fail_before_start(
        &self,
        task_id: &str,
        request: &InstallJobRequest,
        error: &dyn fmt::Display,
    ) -> InstallJobError {
        let message = error.to_string();
        self.update_record(task_id, |record| {
            record.state = InstallJobState::Failed;
            record.reason_code = INSTALL_JOB_REASON_SPAWN_FAILED.to_string();
            record.error = Some(message.clone());
            record.completed_unix_ms = Some(current_unix_timestamp_ms());
        });
        self.persist(
            task_id,
            &request.software_key,
            &request.version,
            &final_status_update(request, false),
        );
        let script_path = self.inner.config.layout.script_path(task_id);
        if let Err(error) = remove_file_if_exists(&script_path) {
            tracing::debug!(task_id, %error, "failed to remove job script");
        }
        tracing::warn!(task_id, error = %message, "install job failed to start");
        InstallJobError::SpawnFailed {
            task_id: task_id.to_string(),
            message,
        }
    }

    fn write_sentinel(&self, task_id: &str, software_key: &str) {
        let path = self.inner.config.layout.sentinel_path(software_key);
        let content = format!("Installation completed at: {}\n", format_rfc3339_now());
        if let Err(error) = write_text_atomic(&path, &content) {
            tracing::warn!(
                task_id,
                path = %path.display(),
                %error,
                "failed to write completion sentinel"
            );
        }
    }

    fn persist(&self, task_id: &str, software_key: &str, version: &str, update: &JobStatusUpdate) {
        if let Err(error) = self
            .inner
            .store
            .update_job_status(software_key, version, update)
        {
            tracing::warn!(
                task_id,
                software_key,
                status = update.status.as_str(),
                error = %format!("{error:#}"),
                "failed to persist job status"
            );
        }
    }

    fn update_record<F>(&self, task_id: &str, mutate: F)
    where
        F: FnOnce(&mut InstallJobRecord),
    {
        if let Some(record) = write_unpoisoned(&self.inner.jobs).get_mut(task_id) {
            mutate(record);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct JobCompletion {
    state: InstallJobState,
    reason_code: &'static str,
    exit_code: Option<i32>,
    error: Option<String>,
}

impl JobCompletion {
    fn outcome(&self) -> LogStreamOutcome {
        if self.state == InstallJobState::Succeeded {
            return LogStreamOutcome::Succeeded;
        }
        LogStreamOutcome::failed(self.error.clone().unwrap_or_default())
    }
}

fn classify_exit(waited: Result<std::io::Result<ExitStatus>, JoinError>) -> JobCompletion {
    match waited {
        Ok(Ok(status)) if status.success() => JobCompletion {
            state: InstallJobState::Succeeded,
            reason_code: INSTALL_JOB_REASON_SUCCEEDED,
            exit_code: status.code(),
            error: None,
        },
        Ok(Ok(status)) => JobCompletion {
            state: InstallJobState::Failed,
            reason_code: INSTALL_JOB_REASON_NON_ZERO_EXIT,
            exit_code: status.code(),
            error: Some(match status.code() {
                Some(code) => format!("exit code {code}"),
                None => "terminated by signal".to_string(),
            }),
        },
        Ok(Err(error)) => JobCompletion {
            state: InstallJobState::Failed,
            reason_code: INSTALL_JOB_REASON_RUNTIME_ERROR,
            exit_code: None,
            error: Some(format!("process wait failed: {error}")),
        },
        Err(error) if error.is_panic() => JobCompletion {
            state: InstallJobState::Failed,
            reason_code: INSTALL_JOB_REASON_PANICKED,
            exit_code: None,
            error: Some(format!(
                "job supervisor panicked: {}",
                panic_message(&*error.into_panic())
            )),
        },
        Err(error) => JobCompletion {
            state: InstallJobState::Failed,
            reason_code: INSTALL_JOB_REASON_RUNTIME_ERROR,
            exit_code: None,
            error: Some(format!("process wait aborted: {error}")),
        },
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        return (*message).to_string();
    }
    if let Some(message) = payload.downcast_ref::<String>() {
        return message.clone();
    }
    "unknown panic".to_string()
}

fn final_status_update(request: &InstallJobRequest, succeeded: bool) -> JobStatusUpdate {
    match (request.kind, succeeded) {
        (InstallJobKind::Install, true) => JobStatusUpdate {
            status: SoftwareStatus::Succeeded,
            installed: Some(true),
            install_version: Some(request.version.clone()),
            ..JobStatusUpdate::default()
        },
        (InstallJobKind::Uninstall, true) => JobStatusUpdate {
            status: SoftwareStatus::Succeeded,
            installed: Some(false),
            install_version: Some(String::new()),
            ..JobStatusUpdate::default()
        },
        (InstallJobKind::Install, false) => JobStatusUpdate {
            status: SoftwareStatus::Failed,
            installed: Some(false),
            ..JobStatusUpdate::default()
        },
        (InstallJobKind::Uninstall, false) => JobStatusUpdate {
            status: SoftwareStatus::Failed,
            ..JobStatusUpdate::default()
        },
    }
}

fn validate_request(request: &InstallJobRequest) -> Result<(), InstallJobError> {
    if request.software_key.trim().is_empty() {
        return Err(InstallJobError::InvalidRequest(
            "software key cannot be empty".to_string(),
        ));
    }
    // The key and version name files under the sentinel and script directories.
    if !is_safe_identifier(&request.software_key) {
        return Err(InstallJobError::InvalidRequest(format!(
            "software key '{}' must only contain letters, digits, '-', '_' or '.'",
            request.software_key
        )));
    }
    if !request.version.is_empty() && !is_safe_identifier(&request.version) {
        return Err(InstallJobError::InvalidRequest(format!(
            "version '{}' must only contain letters, digits, '-', '_' or '.'",
            request.version
        )));
    }
    if request.script.trim().is_empty() {
        return Err(InstallJobError::InvalidRequest(
            "script body cannot be empty".to_string(),
        ));
    }
    Ok(())
}

fn next_install_task_id(software_key: &str, version: &str, created_unix_ms: u64) -> String {
    let sequence = INSTALL_JOB_ID_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{software_key}_{version}_{created_unix_ms}_{sequence}")
}
