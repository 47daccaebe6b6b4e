#![no_main]

use instack_runtime::{parse_log_line, LogMessage};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let raw = String::from_utf8_lossy(data);
    for line in raw.lines() {
        let message = parse_log_line(line);
        assert!(message.progress.map_or(true, |progress| progress <= 100));
        assert_eq!(message.current_step.is_some(), message.total_steps.is_some());

        let encoded = serde_json::to_string(&message).expect("log message serializes");
        let decoded: LogMessage = serde_json::from_str(&encoded).expect("log message decodes");
        assert_eq!(decoded, message);
    }
});
