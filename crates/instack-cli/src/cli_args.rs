use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Parser};
use instack_gateway::{
    GatewayServerConfig, DEFAULT_CLIENT_WRITE_TIMEOUT_MS, DEFAULT_GATEWAY_BIND,
    DEFAULT_HEARTBEAT_INTERVAL_MS,
};
use instack_runtime::{
    InstallJobRunnerConfig, InstallLogLayout, DEFAULT_CLIENT_QUEUE_CAPACITY,
    DEFAULT_INSTALL_LOG_DIR, DEFAULT_JOB_SHELL, DEFAULT_SCRIPT_DIR, DEFAULT_SENTINEL_DIR,
    DEFAULT_STREAM_RETENTION_MS, DEFAULT_TAIL_INTERVAL_MS, MIN_TAIL_INTERVAL_MS,
};

const DEFAULT_SCRIPTS_ROOT: &str = ".instack/scripts";
const DEFAULT_STATE_DIR: &str = ".instack/state";

fn parse_positive_usize(value: &str) -> Result<usize, String> {
    let parsed = value
        .parse::<usize>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

fn parse_positive_u64(value: &str) -> Result<u64, String> {
    let parsed = value
        .parse::<u64>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

fn parse_tail_interval_ms(value: &str) -> Result<u64, String> {
    let parsed = parse_positive_u64(value)?;
    if parsed < MIN_TAIL_INTERVAL_MS {
        return Err(format!("value must be at least {MIN_TAIL_INTERVAL_MS}"));
    }
    Ok(parsed)
}

#[derive(Debug, Parser)]
#[command(
    name = "instack",
    about = "Runs install and uninstall scripts and streams their logs to live observers",
    version
)]
pub(crate) struct Cli {
    #[arg(
        long,
        env = "INSTACK_BIND",
        default_value = DEFAULT_GATEWAY_BIND,
        help = "Socket address the install gateway listens on"
    )]
    pub(crate) bind: String,

    #[arg(
        long = "install-log-dir",
        env = "INSTACK_INSTALL_LOG_DIR",
        default_value = DEFAULT_INSTALL_LOG_DIR,
        help = "Directory receiving one log file per job"
    )]
    pub(crate) install_log_dir: PathBuf,

    #[arg(
        long = "sentinel-dir",
        env = "INSTACK_SENTINEL_DIR",
        default_value = DEFAULT_SENTINEL_DIR,
        help = "Directory holding <key>-end.log completion sentinels"
    )]
    pub(crate) sentinel_dir: PathBuf,

    #[arg(
        long = "script-dir",
        env = "INSTACK_SCRIPT_DIR",
        default_value = DEFAULT_SCRIPT_DIR,
        help = "Scratch directory where job scripts are written before execution"
    )]
    pub(crate) script_dir: PathBuf,

    #[arg(
        long = "scripts-root",
        env = "INSTACK_SCRIPTS_ROOT",
        default_value = DEFAULT_SCRIPTS_ROOT,
        help = "Catalog root containing install/ and uninstall/ script directories"
    )]
    pub(crate) scripts_root: PathBuf,

    #[arg(
        long = "state-dir",
        env = "INSTACK_STATE_DIR",
        default_value = DEFAULT_STATE_DIR,
        help = "Directory for per-software status manifests"
    )]
    pub(crate) state_dir: PathBuf,

    #[arg(
        long,
        env = "INSTACK_SHELL",
        default_value = DEFAULT_JOB_SHELL,
        help = "Shell used to run job scripts"
    )]
    pub(crate) shell: String,

    #[arg(
        long = "tail-interval-ms",
        env = "INSTACK_TAIL_INTERVAL_MS",
        default_value_t = DEFAULT_TAIL_INTERVAL_MS,
        value_parser = parse_tail_interval_ms,
        help = "Polling interval of each log tail monitor"
    )]
    pub(crate) tail_interval_ms: u64,

    #[arg(
        long = "client-queue-capacity",
        env = "INSTACK_CLIENT_QUEUE_CAPACITY",
        default_value_t = DEFAULT_CLIENT_QUEUE_CAPACITY,
        value_parser = parse_positive_usize,
        help = "Messages buffered per observer before it is dropped"
    )]
    pub(crate) client_queue_capacity: usize,

    #[arg(
        long = "client-write-timeout-ms",
        env = "INSTACK_CLIENT_WRITE_TIMEOUT_MS",
        default_value_t = DEFAULT_CLIENT_WRITE_TIMEOUT_MS,
        value_parser = parse_positive_u64,
        help = "Upper bound for one WebSocket write before the observer is dropped"
    )]
    pub(crate) client_write_timeout_ms: u64,

    #[arg(
        long = "heartbeat-interval-ms",
        env = "INSTACK_HEARTBEAT_INTERVAL_MS",
        default_value_t = DEFAULT_HEARTBEAT_INTERVAL_MS,
        value_parser = parse_positive_u64,
        help = "Interval between WebSocket heartbeat pings"
    )]
    pub(crate) heartbeat_interval_ms: u64,

    #[arg(
        long = "stream-retention-ms",
        env = "INSTACK_STREAM_RETENTION_MS",
        default_value_t = DEFAULT_STREAM_RETENTION_MS,
        help = "How long a completed log stream stays attachable (0 retires it immediately)"
    )]
    pub(crate) stream_retention_ms: u64,

    #[arg(
        long = "legacy-sentinel",
        env = "INSTACK_LEGACY_SENTINEL",
        default_value_t = true,
        action = ArgAction::Set,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true",
        help = "Treat a <key>-end.log file written by a script as successful completion"
    )]
    pub(crate) legacy_sentinel: bool,
}

impl Cli {
    pub(crate) fn runner_config(&self) -> InstallJobRunnerConfig {
        InstallJobRunnerConfig {
            layout: InstallLogLayout {
                install_log_dir: self.install_log_dir.clone(),
                sentinel_dir: self.sentinel_dir.clone(),
                script_dir: self.script_dir.clone(),
            },
            shell: self.shell.clone(),
            tail_interval: Duration::from_millis(self.tail_interval_ms),
            client_queue_capacity: self.client_queue_capacity,
            stream_retention: Duration::from_millis(self.stream_retention_ms),
            legacy_sentinel: self.legacy_sentinel,
        }
    }

    pub(crate) fn gateway_config(&self) -> GatewayServerConfig {
        GatewayServerConfig {
            bind: self.bind.clone(),
            client_write_timeout: Duration::from_millis(self.client_write_timeout_ms),
            heartbeat_interval: Duration::from_millis(self.heartbeat_interval_ms),
        }
    }
}
