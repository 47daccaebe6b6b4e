use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use instack_runtime::{
    ChannelLogStreamClient, InstallJobKind, InstallJobRequest, InstallJobRunner,
    InstallJobRunnerConfig, InstallJobState, InstallLogLayout, JsonFileJobStatusStore, LogLevel,
    LogMessage, SoftwareStatus, SoftwareStatusRecord,
};
use serde_json::Value;
use tempfile::tempdir;

fn runner_config(root: &Path, stream_retention: Duration) -> InstallJobRunnerConfig {
    InstallJobRunnerConfig {
        layout: InstallLogLayout::rooted_at(root),
        shell: "sh".to_string(),
        tail_interval: Duration::from_millis(20),
        client_queue_capacity: 128,
        stream_retention,
        legacy_sentinel: true,
    }
}

fn request(kind: InstallJobKind, script: &str) -> InstallJobRequest {
    InstallJobRequest {
        kind,
        software_key: "mysql".to_string(),
        version: "8.0".to_string(),
        script: script.to_string(),
    }
}

fn read_manifest(store: &JsonFileJobStatusStore) -> SoftwareStatusRecord {
    let path = store.manifest_path("mysql", "8.0");
    let raw = std::fs::read_to_string(&path).expect("read status manifest");
    serde_json::from_str(&raw).expect("parse status manifest")
}

async fn observe_until_closed(runner: &InstallJobRunner, task_id: &str) -> Vec<LogMessage> {
    let stream = runner.registry().get(task_id).expect("live stream");
    let (client, mut receiver) = ChannelLogStreamClient::new(128);
    let attachment = stream.attach("observer", client).expect("attach observer");
    let mut messages = attachment.history;
    messages.extend(attachment.terminal);
    if attachment.registered {
        tokio::time::timeout(Duration::from_secs(10), async {
            while let Some(message) = receiver.recv().await {
                messages.push(message);
            }
        })
        .await
        .expect("stream should complete");
    }
    messages
}

async fn wait_until_terminal(runner: &InstallJobRunner, task_id: &str) -> InstallJobState {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let state = runner.job(task_id).expect("job record").state;
        if state.is_terminal() {
            return state;
        }
        assert!(tokio::time::Instant::now() < deadline, "job never finished");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn integration_install_persists_manifest_and_writes_completion_sentinel() {
    let temp = tempdir().expect("tempdir");
    let store = Arc::new(JsonFileJobStatusStore::new(temp.path().join("state")));
    let runner = InstallJobRunner::new(
        runner_config(&temp.path().join("run"), Duration::from_secs(60)),
        store.clone(),
    );

    let task_id = runner
        .start(request(
            InstallJobKind::Install,
            "echo 'step 1/2: download'\nsleep 0.1\necho 'progress: 80%'\necho 'step 2/2: configure'\n",
        ))
        .await
        .expect("start install");
    let messages = observe_until_closed(&runner, &task_id).await;

    let download = messages
        .iter()
        .find(|message| message.message.contains("download"))
        .expect("download step line");
    assert_eq!(download.current_step, Some(1));
    assert_eq!(download.total_steps, Some(2));
    assert_eq!(download.progress, Some(50));
    assert!(messages.iter().any(|message| message.progress == Some(80)));
    let terminal = messages.last().expect("terminal message");
    assert_eq!(terminal.level, LogLevel::Success);
    assert!(terminal.is_terminal());
    assert_eq!(messages.iter().filter(|message| message.is_terminal()).count(), 1);

    assert_eq!(
        wait_until_terminal(&runner, &task_id).await,
        InstallJobState::Succeeded
    );
    let record = runner.job(&task_id).expect("job record");
    let manifest = read_manifest(&store);
    assert_eq!(manifest.status, SoftwareStatus::Succeeded);
    assert!(manifest.installed);
    assert_eq!(manifest.install_version, "8.0");
    assert_eq!(manifest.task_id, task_id);
    assert_eq!(manifest.log_file, record.log_file_name);

    let sentinel = runner.config().layout.sentinel_path("mysql");
    let content = std::fs::read_to_string(&sentinel).expect("completion sentinel");
    assert!(content.starts_with("Installation completed at:"));
}

#[tokio::test]
async fn integration_uninstall_after_install_clears_installed_flag() {
    let temp = tempdir().expect("tempdir");
    let store = Arc::new(JsonFileJobStatusStore::new(temp.path().join("state")));
    let runner = InstallJobRunner::new(
        runner_config(&temp.path().join("run"), Duration::from_secs(60)),
        store.clone(),
    );

    let install = runner
        .start(request(InstallJobKind::Install, "echo installing\n"))
        .await
        .expect("start install");
    assert_eq!(
        wait_until_terminal(&runner, &install).await,
        InstallJobState::Succeeded
    );
    assert!(read_manifest(&store).installed);

    let uninstall = runner
        .start(request(InstallJobKind::Uninstall, "echo removing\n"))
        .await
        .expect("start uninstall");
    assert_eq!(
        wait_until_terminal(&runner, &uninstall).await,
        InstallJobState::Succeeded
    );
    let manifest = read_manifest(&store);
    assert_eq!(manifest.status, SoftwareStatus::Succeeded);
    assert!(!manifest.installed);
    assert_eq!(manifest.install_version, "");
    assert_eq!(manifest.task_id, uninstall);
}

#[tokio::test]
async fn integration_failed_install_keeps_history_after_stream_retirement() {
    let temp = tempdir().expect("tempdir");
    let store = Arc::new(JsonFileJobStatusStore::new(temp.path().join("state")));
    let runner = InstallJobRunner::new(
        runner_config(&temp.path().join("run"), Duration::ZERO),
        store.clone(),
    );

    let task_id = runner
        .start(request(
            InstallJobKind::Install,
            "echo 'ERROR: disk full' >&2\nexit 7\n",
        ))
        .await
        .expect("start install");
    assert_eq!(
        wait_until_terminal(&runner, &task_id).await,
        InstallJobState::Failed
    );

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while runner.registry().get(&task_id).is_some() {
        assert!(tokio::time::Instant::now() < deadline, "stream never retired");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let history = runner.history(&task_id, 0, 0).expect("history after retirement");
    assert_eq!(history.content, vec!["ERROR: disk full".to_string()]);
    assert!(history.completed);

    let status = serde_json::to_value(runner.status(&task_id).expect("status")).expect("json");
    assert_eq!(status["state"], Value::from("failed"));
    assert_eq!(status["exit_code"], Value::from(7));
    assert_eq!(status["clients"], Value::from(0));

    let manifest = read_manifest(&store);
    assert_eq!(manifest.status, SoftwareStatus::Failed);
    assert!(!manifest.installed);
    assert!(!runner.config().layout.sentinel_path("mysql").exists());
}
