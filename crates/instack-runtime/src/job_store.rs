//! Persistence boundary for per-software install status.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use instack_core::{current_unix_timestamp_ms, write_text_atomic};
use serde::{Deserialize, Serialize};

use crate::locks::lock_unpoisoned;

const SOFTWARE_STATUS_SCHEMA_VERSION: u32 = 1;

fn software_status_schema_version() -> u32 {
    SOFTWARE_STATUS_SCHEMA_VERSION
}

/// Persisted lifecycle state of one software key + version.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SoftwareStatus {
    /// Nothing is running for this software.
    #[default]
    Default,
    Installing,
    Succeeded,
    Failed,
}

impl SoftwareStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Installing => "installing",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }
}

/// Partial update; `None` fields leave the stored value untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobStatusUpdate {
    pub status: SoftwareStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub installed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
}

/// Merged status for one software key + version.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SoftwareStatusRecord {
    #[serde(default = "software_status_schema_version")]
    pub schema_version: u32,
    pub software_key: String,
    pub version: String,
    pub status: SoftwareStatus,
    #[serde(default)]
    pub installed: bool,
    #[serde(default)]
    pub install_version: String,
    #[serde(default)]
    pub log_file: String,
    #[serde(default)]
    pub task_id: String,
    #[serde(default)]
    pub updated_unix_ms: u64,
}

impl SoftwareStatusRecord {
    fn new(software_key: &str, version: &str) -> Self {
        Self {
            schema_version: SOFTWARE_STATUS_SCHEMA_VERSION,
            software_key: software_key.to_string(),
            version: version.to_string(),
            ..Self::default()
        }
    }

    /// Applies the present fields of `update`; last write wins.
    pub fn apply(&mut self, update: &JobStatusUpdate) {
        self.status = update.status;
        if let Some(installed) = update.installed {
            self.installed = installed;
        }
        if let Some(install_version) = update.install_version.as_ref() {
            self.install_version = install_version.clone();
        }
        if let Some(log_file) = update.log_file.as_ref() {
            self.log_file = log_file.clone();
        }
        if let Some(task_id) = update.task_id.as_ref() {
            self.task_id = task_id.clone();
        }
        self.updated_unix_ms = current_unix_timestamp_ms();
    }
}

/// Collaborator the job runner reports status transitions to.
pub trait JobStatusStore: Send + Sync {
    fn update_job_status(
        &self,
        software_key: &str,
        version: &str,
        update: &JobStatusUpdate,
    ) -> Result<()>;
}

/// Stores one JSON manifest per software key + version under a state directory.
#[derive(Debug, Clone)]
pub struct JsonFileJobStatusStore {
    root: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl JsonFileJobStatusStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn manifest_path(&self, software_key: &str, version: &str) -> PathBuf {
        self.root
            .join(sanitize_path_component(software_key))
            .join(format!("{}.json", sanitize_path_component(version)))
    }

    pub fn load(&self, software_key: &str, version: &str) -> Result<Option<SoftwareStatusRecord>> {
        let path = self.manifest_path(software_key, version);
        if !path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let record = serde_json::from_str::<SoftwareStatusRecord>(&raw)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        Ok(Some(record))
    }
}

impl JobStatusStore for JsonFileJobStatusStore {
    fn update_job_status(
        &self,
        software_key: &str,
        version: &str,
        update: &JobStatusUpdate,
    ) -> Result<()> {
        let _guard = lock_unpoisoned(&self.write_lock);
        let mut record = self
            .load(software_key, version)?
            .unwrap_or_else(|| SoftwareStatusRecord::new(software_key, version));
        record.apply(update);
        let path = self.manifest_path(software_key, version);
        let mut payload =
            serde_json::to_string_pretty(&record).context("failed to encode software status")?;
        payload.push('\n');
        write_text_atomic(&path, &payload)
            .with_context(|| format!("failed to write {}", path.display()))
    }
}

/// Keeps merged records and the raw update history in memory.
#[derive(Debug, Default)]
pub struct InMemoryJobStatusStore {
    records: Mutex<BTreeMap<(String, String), SoftwareStatusRecord>>,
    updates: Mutex<Vec<(String, String, JobStatusUpdate)>>,
}

impl InMemoryJobStatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, software_key: &str, version: &str) -> Option<SoftwareStatusRecord> {
        lock_unpoisoned(&self.records)
            .get(&(software_key.to_string(), version.to_string()))
            .cloned()
    }

    pub fn updates(&self) -> Vec<(String, String, JobStatusUpdate)> {
        lock_unpoisoned(&self.updates).clone()
    }
}

impl JobStatusStore for InMemoryJobStatusStore {
    fn update_job_status(
        &self,
        software_key: &str,
        version: &str,
        update: &JobStatusUpdate,
    ) -> Result<()> {
        lock_unpoisoned(&self.records)
            .entry((software_key.to_string(), version.to_string()))
            .or_insert_with(|| SoftwareStatusRecord::new(software_key, version))
            .apply(update);
        lock_unpoisoned(&self.updates).push((
            software_key.to_string(),
            version.to_string(),
            update.clone(),
        ));
        Ok(())
    }
}

fn sanitize_path_component(raw: &str) -> String {
    let sanitized: String = raw
        .trim()
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.') {
                ch
            } else {
                '_'
            }
        })
        .collect();
    if sanitized.trim_matches('.').is_empty() {
        return "_".to_string();
    }
    sanitized
}
