use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::cli_args::Cli;

#[test]
fn unit_cli_defaults_match_runtime_defaults() {
    let cli = Cli::try_parse_from(["instack"]).expect("parse defaults");
    let runner = cli.runner_config();
    let defaults = instack_runtime::InstallJobRunnerConfig::default();
    assert_eq!(runner, defaults);

    let gateway = cli.gateway_config();
    assert_eq!(gateway, instack_gateway::GatewayServerConfig::default());
}

#[test]
fn functional_cli_flags_override_runner_and_gateway_config() {
    let cli = Cli::try_parse_from([
        "instack",
        "--bind",
        "0.0.0.0:9000",
        "--install-log-dir",
        "/tmp/logs/install",
        "--sentinel-dir",
        "/tmp/logs/end",
        "--script-dir",
        "/tmp/run",
        "--shell",
        "sh",
        "--tail-interval-ms",
        "250",
        "--client-queue-capacity",
        "64",
        "--client-write-timeout-ms",
        "1500",
        "--stream-retention-ms",
        "0",
        "--legacy-sentinel=false",
    ])
    .expect("parse flags");

    let runner = cli.runner_config();
    assert_eq!(runner.layout.install_log_dir, PathBuf::from("/tmp/logs/install"));
    assert_eq!(runner.layout.sentinel_dir, PathBuf::from("/tmp/logs/end"));
    assert_eq!(runner.layout.script_dir, PathBuf::from("/tmp/run"));
    assert_eq!(runner.shell, "sh");
    assert_eq!(runner.tail_interval, Duration::from_millis(250));
    assert_eq!(runner.client_queue_capacity, 64);
    assert_eq!(runner.stream_retention, Duration::ZERO);
    assert!(!runner.legacy_sentinel);

    let gateway = cli.gateway_config();
    assert_eq!(gateway.bind, "0.0.0.0:9000");
    assert_eq!(gateway.client_write_timeout, Duration::from_millis(1500));
}

#[test]
fn regression_cli_rejects_zero_capacity_and_too_fast_tail_interval() {
    assert!(Cli::try_parse_from(["instack", "--client-queue-capacity", "0"]).is_err());
    assert!(Cli::try_parse_from(["instack", "--tail-interval-ms", "5"]).is_err());
    assert!(Cli::try_parse_from(["instack", "--client-write-timeout-ms", "abc"]).is_err());
}
