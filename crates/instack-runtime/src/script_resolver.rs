//! Resolves the shell script body for an install or uninstall request.

use std::path::PathBuf;

use thiserror::Error;

use crate::job_runner::InstallJobKind;

const SCRIPT_FILE_EXTENSION: &str = "sh";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ScriptResolveError {
    #[error("no {kind} script for '{software_key}' version '{version}'")]
    NotFound {
        kind: InstallJobKind,
        software_key: String,
        version: String,
    },
    #[error("invalid script name '{0}'")]
    InvalidName(String),
    #[error("failed to read script {path}: {message}")]
    Io { path: PathBuf, message: String },
}

pub trait ScriptResolver: Send + Sync {
    fn resolve(
        &self,
        kind: InstallJobKind,
        software_key: &str,
        version: &str,
    ) -> Result<String, ScriptResolveError>;
}

/// Reads `<root>/<kind>/<key>-<version>.sh`, falling back to `<root>/<kind>/<key>.sh`.
#[derive(Debug, Clone)]
pub struct DirectoryScriptResolver {
    root: PathBuf,
}

impl DirectoryScriptResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn kind_dir(&self, kind: InstallJobKind) -> PathBuf {
        self.root.join(kind.as_str())
    }
}

impl ScriptResolver for DirectoryScriptResolver {
    fn resolve(
        &self,
        kind: InstallJobKind,
        software_key: &str,
        version: &str,
    ) -> Result<String, ScriptResolveError> {
        validate_script_name(software_key)?;
        let dir = self.kind_dir(kind);
        let mut candidates = Vec::with_capacity(2);
        if !version.trim().is_empty() {
            validate_script_name(version)?;
            candidates.push(dir.join(format!(
                "{software_key}-{version}.{SCRIPT_FILE_EXTENSION}"
            )));
        }
        candidates.push(dir.join(format!("{software_key}.{SCRIPT_FILE_EXTENSION}")));

        for path in candidates {
            match std::fs::read_to_string(&path) {
                Ok(body) => {
                    tracing::debug!(path = %path.display(), "resolved job script");
                    return Ok(body);
                }
                Err(error) if error.kind() == std::io::ErrorKind::NotFound => continue,
                Err(error) => {
                    return Err(ScriptResolveError::Io {
                        path,
                        message: error.to_string(),
                    })
                }
            }
        }
        Err(ScriptResolveError::NotFound {
            kind,
            software_key: software_key.to_string(),
            version: version.to_string(),
        })
    }
}

/// Whether `value` can name a file inside a managed directory: ASCII letters,
/// digits, `-`, `_` and `.`, and never `.` or `..` on its own.
pub(crate) fn is_safe_identifier(value: &str) -> bool {
    !value.is_empty()
        && value != "."
        && value != ".."
        && value
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.'))
}

fn validate_script_name(raw: &str) -> Result<(), ScriptResolveError> {
    if is_safe_identifier(raw.trim()) {
        Ok(())
    } else {
        Err(ScriptResolveError::InvalidName(raw.to_string()))
    }
}
