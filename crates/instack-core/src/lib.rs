//! Low-level helpers shared across instack crates.
//!
//! Provides atomic file writes for manifests and completion markers, plus the
//! clock helpers used to stamp jobs, log messages and log file names.

pub mod atomic_io;
pub mod time_utils;

pub use atomic_io::{remove_file_if_exists, write_text_atomic};
pub use time_utils::{
    current_unix_timestamp, current_unix_timestamp_ms, format_log_file_timestamp,
    format_rfc3339_now,
};

#[cfg(test)]
mod tests {
    use std::fs::read_to_string;

    use super::*;

    #[test]
    fn unit_time_utils_second_and_millisecond_clocks_agree() {
        let now_s = current_unix_timestamp();
        let now_ms = current_unix_timestamp_ms();
        let now_ms_s = now_ms / 1_000;
        assert!(now_ms_s >= now_s);
        assert!(now_ms_s <= now_s.saturating_add(1));
    }

    #[test]
    fn functional_write_text_atomic_writes_and_replaces_content() {
        let tempdir = tempfile::tempdir().expect("tempdir");
        let path = tempdir.path().join("nested/marker.log");
        write_text_atomic(&path, "first").expect("write first");
        write_text_atomic(&path, "second").expect("write second");
        let contents = read_to_string(&path).expect("read");
        assert_eq!(contents, "second");
    }

    #[test]
    fn regression_remove_file_if_exists_tolerates_missing_file() {
        let tempdir = tempfile::tempdir().expect("tempdir");
        let path = tempdir.path().join("absent-end.log");
        assert!(!remove_file_if_exists(&path).expect("missing file is not an error"));
        std::fs::write(&path, "done").expect("seed");
        assert!(remove_file_if_exists(&path).expect("remove existing"));
        assert!(!path.exists());
    }
}
