//! Install log message model and best-effort line annotation.
//!
//! Every line of an install log becomes one [`LogMessage`]. Progress and step
//! annotations are extracted when a line matches one of the known shapes;
//! lines that match nothing are plain `INFO` messages.

use std::sync::OnceLock;

use instack_core::current_unix_timestamp_ms;
use regex::Regex;
use serde::{Deserialize, Serialize};

pub const LOG_MESSAGE_PREPARING_TEXT: &str = "installation starting, preparing...";
pub const LOG_MESSAGE_COMPLETED_TEXT: &str = "installation complete";
pub const LOG_MESSAGE_FAILED_TEXT: &str = "installation failed";

/// Severity attached to a streamed log message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
    Success,
}

impl LogLevel {
    /// Returns the stable uppercase wire representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
            Self::Success => "SUCCESS",
        }
    }
}

/// One observable event of a log stream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LogMessage {
    pub timestamp_unix_ms: u64,
    pub level: LogLevel,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_step: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_steps: Option<u32>,
}

impl LogMessage {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp_unix_ms: current_unix_timestamp_ms(),
            level,
            message: message.into(),
            progress: None,
            step: None,
            current_step: None,
            total_steps: None,
        }
    }

    pub fn with_progress(mut self, progress: u8) -> Self {
        self.progress = Some(progress.min(100));
        self
    }

    /// Sent to a client that attaches before the script wrote its log file.
    pub fn preparing() -> Self {
        Self::new(LogLevel::Info, LOG_MESSAGE_PREPARING_TEXT).with_progress(0)
    }

    /// Terminal message broadcast once a job succeeded.
    pub fn completed() -> Self {
        Self::new(LogLevel::Success, LOG_MESSAGE_COMPLETED_TEXT).with_progress(100)
    }

    /// Terminal message broadcast once a job failed.
    pub fn failed(detail: &str) -> Self {
        let detail = detail.trim();
        let message = if detail.is_empty() {
            LOG_MESSAGE_FAILED_TEXT.to_string()
        } else {
            format!("{LOG_MESSAGE_FAILED_TEXT}: {detail}")
        };
        Self::new(LogLevel::Error, message)
    }

    /// True for the synthetic messages produced by [`Self::completed`] and [`Self::failed`].
    pub fn is_terminal(&self) -> bool {
        match self.level {
            LogLevel::Success => {
                self.progress == Some(100) && self.message == LOG_MESSAGE_COMPLETED_TEXT
            }
            LogLevel::Error => self.message.starts_with(LOG_MESSAGE_FAILED_TEXT),
            LogLevel::Info | LogLevel::Warn => false,
        }
    }
}

/// Parses one log line into a message, annotating level, progress and step when recognized.
pub fn parse_log_line(line: &str) -> LogMessage {
    let text = line.trim_end_matches(['\r', '\n']);
    let mut message = LogMessage::new(extract_level(text), text);

    if let Some(step) = extract_step(text) {
        message.step = Some(step.label);
        message.current_step = Some(step.current);
        message.total_steps = Some(step.total);
        if step.total > 0 {
            let derived = (u64::from(step.current.min(step.total)) * 100) / u64::from(step.total);
            message.progress = u8::try_from(derived).ok();
        }
    }
    if let Some(progress) = extract_progress(text) {
        message.progress = Some(progress);
    }
    message
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct StepAnnotation {
    label: String,
    current: u32,
    total: u32,
}

fn level_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(r"(?i)^\s*\[?(error|warn|warning|success|info)\]?(?:[:\s]|$)").ok()
        })
        .as_ref()
}

fn progress_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r"(?i)\bprogress\s*[:=]?\s*(\d{1,3})\s*%",
            r"^\s*\[\s*(\d{1,3})\s*%\s*\]",
        ]
        .iter()
        .filter_map(|raw| Regex::new(raw).ok())
        .collect()
    })
}

fn step_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"(?i)\bstep\s+(\d+)\s*/\s*(\d+)\s*[:\-]?\s*(.*)$").ok())
        .as_ref()
}

fn extract_level(line: &str) -> LogLevel {
    let Some(captures) = level_pattern().and_then(|pattern| pattern.captures(line)) else {
        return LogLevel::Info;
    };
    match captures
        .get(1)
        .map(|tag| tag.as_str().to_ascii_lowercase())
        .as_deref()
    {
        Some("error") => LogLevel::Error,
        Some("warn") | Some("warning") => LogLevel::Warn,
        Some("success") => LogLevel::Success,
        _ => LogLevel::Info,
    }
}

fn extract_progress(line: &str) -> Option<u8> {
    progress_patterns().iter().find_map(|pattern| {
        let value = pattern.captures(line)?.get(1)?.as_str().parse::<u8>().ok()?;
        (value <= 100).then_some(value)
    })
}

fn extract_step(line: &str) -> Option<StepAnnotation> {
    let captures = step_pattern()?.captures(line)?;
    let current = captures.get(1)?.as_str().parse::<u32>().ok()?;
    let total = captures.get(2)?.as_str().parse::<u32>().ok()?;
    let label = captures
        .get(3)
        .map(|value| value.as_str().trim())
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("step {current}/{total}"));
    Some(StepAnnotation {
        label,
        current,
        total,
    })
}
