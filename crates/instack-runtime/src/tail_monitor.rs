//! Periodic tail loop driving [`LogStream::poll_once`].

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::log_stream::LogStream;

pub const DEFAULT_TAIL_INTERVAL_MS: u64 = 1_000;
pub const MIN_TAIL_INTERVAL_MS: u64 = 10;

/// Spawns the tail loop for `stream` on the current tokio runtime.
pub fn spawn_tail_monitor(stream: Arc<LogStream>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(run_tail_monitor(stream, interval))
}

/// Ticks until the stream completes or its cancellation signal fires.
/// Read errors are logged and retried on the next tick.
pub async fn run_tail_monitor(stream: Arc<LogStream>, interval: Duration) {
    let mut cancel_rx = stream.subscribe_cancellation();
    let interval = interval.max(Duration::from_millis(MIN_TAIL_INTERVAL_MS));
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        if *cancel_rx.borrow() || stream.is_completed() {
            break;
        }
        tokio::select! {
            _ = ticker.tick() => {
                match stream.poll_once() {
                    Ok(0) => {}
                    Ok(lines) => {
                        tracing::debug!(task_id = %stream.task_id(), lines, "tail broadcast");
                    }
                    Err(error) => {
                        tracing::warn!(
                            task_id = %stream.task_id(),
                            path = %stream.log_file_path().display(),
                            %error,
                            "log tail read failed; retrying next tick"
                        );
                    }
                }
            }
            changed = cancel_rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }
    tracing::debug!(task_id = %stream.task_id(), "tail monitor stopped");
}
