//! Install log file layout and incremental, lock-free readers.
//!
//! The spawned script is the single writer of its log file; the tail monitor,
//! history replay and the history query surface are readers that never take a
//! lock on the file and tolerate concurrent appends.

use std::fs::File;
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result};
use instack_core::format_log_file_timestamp;

pub const DEFAULT_INSTALL_LOG_DIR: &str = "/data/wwwlogs/install";
pub const DEFAULT_SENTINEL_DIR: &str = "/usr/local/one/logs";
pub const DEFAULT_SCRIPT_DIR: &str = "/tmp/instack/scripts";
pub const SENTINEL_FILE_SUFFIX: &str = "-end.log";
pub const HISTORY_DEFAULT_LIMIT: usize = 1_000;
pub const HISTORY_MAX_LIMIT: usize = 10_000;

static LOG_FILE_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Directory layout for install logs, completion markers and rendered scripts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallLogLayout {
    pub install_log_dir: PathBuf,
    pub sentinel_dir: PathBuf,
    pub script_dir: PathBuf,
}

impl Default for InstallLogLayout {
    fn default() -> Self {
        Self {
            install_log_dir: PathBuf::from(DEFAULT_INSTALL_LOG_DIR),
            sentinel_dir: PathBuf::from(DEFAULT_SENTINEL_DIR),
            script_dir: PathBuf::from(DEFAULT_SCRIPT_DIR),
        }
    }
}

impl InstallLogLayout {
    /// Lays every directory out under one root; used by tests and local runs.
    pub fn rooted_at(root: &Path) -> Self {
        Self {
            install_log_dir: root.join("install"),
            sentinel_dir: root.join("logs"),
            script_dir: root.join("scripts"),
        }
    }

    /// Returns a fresh log file name derived from the job kind and the wall clock.
    pub fn next_log_file_name(&self, kind_label: &str) -> String {
        let sequence = LOG_FILE_COUNTER.fetch_add(1, Ordering::Relaxed);
        format!(
            "{kind_label}_{}_{sequence:04}.log",
            format_log_file_timestamp()
        )
    }

    pub fn log_file_path(&self, log_file_name: &str) -> PathBuf {
        self.install_log_dir.join(log_file_name)
    }

    /// Legacy completion marker for one software key.
    pub fn sentinel_path(&self, software_key: &str) -> PathBuf {
        self.sentinel_dir
            .join(format!("{software_key}{SENTINEL_FILE_SUFFIX}"))
    }

    pub fn script_path(&self, task_id: &str) -> PathBuf {
        self.script_dir.join(format!("{task_id}.sh"))
    }
}

/// Creates (or truncates) a log file, creating parent directories as needed.
pub fn create_log_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
    }
    std::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)
        .with_context(|| format!("failed to open {}", path.display()))
}

/// Lines read from a log file past a byte offset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppendedChunk {
    pub lines: Vec<String>,
    pub next_offset: u64,
}

/// Reads complete lines appended after `offset`.
///
/// Returns `Ok(None)` when the file does not exist yet. A trailing line with
/// no newline is left unread unless `include_partial` is set, so the returned
/// `next_offset` always sits on a line boundary while the writer is active.
pub fn read_appended_lines(
    path: &Path,
    offset: u64,
    include_partial: bool,
) -> Result<Option<AppendedChunk>> {
    read_line_range(path, offset, None, include_partial)
}

/// Reads every line before `end_offset`; used to replay history to late joiners.
pub fn read_lines_until(path: &Path, end_offset: u64) -> Result<Option<Vec<String>>> {
    Ok(read_line_range(path, 0, Some(end_offset), true)?.map(|chunk| chunk.lines))
}

/// Line-oriented pagination over a whole log file, skipping blank lines.
pub fn read_history_lines(path: &Path, offset: usize, limit: usize) -> Result<Vec<String>> {
    let limit = if limit == 0 {
        HISTORY_DEFAULT_LIMIT
    } else {
        limit.min(HISTORY_MAX_LIMIT)
    };
    let file = match File::open(path) {
        Ok(file) => file,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(error) => {
            return Err(error).with_context(|| format!("failed to open {}", path.display()))
        }
    };
    let mut reader = BufReader::new(file);
    let mut buffer = Vec::new();
    let mut lines = Vec::new();
    let mut seen = 0_usize;
    loop {
        buffer.clear();
        let read = reader
            .read_until(b'\n', &mut buffer)
            .with_context(|| format!("failed to read {}", path.display()))?;
        if read == 0 {
            break;
        }
        let Some(line) = decode_line(&buffer) else {
            continue;
        };
        if seen >= offset {
            lines.push(line);
            if lines.len() >= limit {
                break;
            }
        }
        seen = seen.saturating_add(1);
    }
    Ok(lines)
}

fn read_line_range(
    path: &Path,
    start: u64,
    end: Option<u64>,
    include_partial: bool,
) -> Result<Option<AppendedChunk>> {
    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(error) => {
            return Err(error).with_context(|| format!("failed to open {}", path.display()))
        }
    };
    let current_size = file
        .metadata()
        .with_context(|| format!("failed to stat {}", path.display()))?
        .len();
    let end = end.map_or(current_size, |end| end.min(current_size));
    if end <= start {
        return Ok(Some(AppendedChunk {
            lines: Vec::new(),
            next_offset: start,
        }));
    }

    file.seek(SeekFrom::Start(start))
        .with_context(|| format!("failed to seek {} to {start}", path.display()))?;
    let mut bytes = Vec::new();
    file.take(end - start)
        .read_to_end(&mut bytes)
        .with_context(|| format!("failed to read {}", path.display()))?;

    let consumed = if include_partial {
        bytes.len()
    } else {
        match bytes.iter().rposition(|byte| *byte == b'\n') {
            Some(index) => index + 1,
            None => 0,
        }
    };
    let lines = bytes[..consumed]
        .split(|byte| *byte == b'\n')
        .filter_map(decode_line)
        .collect();
    Ok(Some(AppendedChunk {
        lines,
        next_offset: start + consumed as u64,
    }))
}

fn decode_line(raw: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(raw);
    let text = text.trim_end_matches(['\r', '\n']);
    if text.trim().is_empty() {
        return None;
    }
    Some(text.to_string())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::{
        create_log_file, read_appended_lines, read_history_lines, read_lines_until,
        InstallLogLayout,
    };
    use tempfile::tempdir;

    #[test]
    fn unit_layout_names_sentinel_and_log_files() {
        let temp = tempdir().expect("tempdir");
        let layout = InstallLogLayout::rooted_at(temp.path());
        assert_eq!(
            layout.sentinel_path("nginx"),
            temp.path().join("logs").join("nginx-end.log")
        );
        let first = layout.next_log_file_name("install");
        let second = layout.next_log_file_name("install");
        assert!(first.starts_with("install_"));
        assert!(first.ends_with(".log"));
        assert_ne!(first, second);
    }

    #[test]
    fn functional_read_appended_lines_returns_none_before_file_exists() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("missing.log");
        assert!(read_appended_lines(&path, 0, false)
            .expect("read missing")
            .is_none());
    }

    #[test]
    fn functional_read_appended_lines_holds_back_partial_line_until_newline() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("install").join("job.log");
        let mut file = create_log_file(&path).expect("create log");
        write!(file, "line1\nline2\npart").expect("write");
        file.flush().expect("flush");

        let first = read_appended_lines(&path, 0, false)
            .expect("read")
            .expect("file exists");
        assert_eq!(first.lines, vec!["line1".to_string(), "line2".to_string()]);
        assert_eq!(first.next_offset, 12);

        write!(file, "ial\r\n\nline4\n").expect("append");
        file.flush().expect("flush");
        let second = read_appended_lines(&path, first.next_offset, false)
            .expect("read")
            .expect("file exists");
        assert_eq!(second.lines, vec!["partial".to_string(), "line4".to_string()]);

        let idle = read_appended_lines(&path, second.next_offset, false)
            .expect("read")
            .expect("file exists");
        assert!(idle.lines.is_empty());
        assert_eq!(idle.next_offset, second.next_offset);
    }

    #[test]
    fn functional_read_appended_lines_with_partial_consumes_trailing_bytes() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("job.log");
        std::fs::write(&path, "done\nno-newline").expect("write");
        let chunk = read_appended_lines(&path, 5, true)
            .expect("read")
            .expect("file exists");
        assert_eq!(chunk.lines, vec!["no-newline".to_string()]);
        assert_eq!(chunk.next_offset, 15);
    }

    #[test]
    fn functional_read_lines_until_stops_at_offset() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("job.log");
        std::fs::write(&path, "a\nb\nc\n").expect("write");
        let lines = read_lines_until(&path, 4)
            .expect("read")
            .expect("file exists");
        assert_eq!(lines, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn functional_read_history_lines_paginates_non_blank_lines() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("job.log");
        std::fs::write(&path, "one\n\ntwo\nthree\nfour\n").expect("write");
        assert_eq!(
            read_history_lines(&path, 1, 2).expect("page"),
            vec!["two".to_string(), "three".to_string()]
        );
        assert_eq!(read_history_lines(&path, 0, 0).expect("default").len(), 4);
        assert!(read_history_lines(&temp.path().join("missing.log"), 0, 10)
            .expect("missing file")
            .is_empty());
    }
}
