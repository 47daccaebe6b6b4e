//! HTTP handlers for job start, history, status and listing.
use super::*;

pub(super) async fn handle_start_install(
    State(state): State<Arc<GatewayServerState>>,
    body: Bytes,
) -> Response {
    match start_job(&state, InstallJobKind::Install, &body).await {
        Ok(response) => response.into_response(),
        Err(error) => error.into_response(),
    }
}

pub(super) async fn handle_start_uninstall(
    State(state): State<Arc<GatewayServerState>>,
    body: Bytes,
) -> Response {
    match start_job(&state, InstallJobKind::Uninstall, &body).await {
        Ok(response) => response.into_response(),
        Err(error) => error.into_response(),
    }
}

async fn start_job(
    state: &GatewayServerState,
    kind: InstallJobKind,
    body: &Bytes,
) -> Result<Json<StartJobResponse>, InstallApiError> {
    let request = serde_json::from_slice::<StartJobRequest>(body).map_err(|error| {
        InstallApiError::bad_request("invalid_json", format!("failed to parse request body: {error}"))
    })?;
    let software_key = request.key.trim().to_string();
    if software_key.is_empty() {
        return Err(InstallApiError::bad_request(
            "invalid_software_key",
            "field 'key' cannot be empty",
        ));
    }
    let version = request.version.trim().to_string();
    let script = state.scripts.resolve(kind, &software_key, &version)?;
    let task_id = state
        .runner
        .start(InstallJobRequest {
            kind,
            software_key,
            version,
            script,
        })
        .await?;
    let job = state.runner.job(&task_id)?;
    Ok(Json(StartJobResponse {
        task_id,
        log_file: job.log_file_name,
    }))
}

pub(super) async fn handle_install_history(
    State(state): State<Arc<GatewayServerState>>,
    Query(query): Query<LogTaskQuery>,
) -> Response {
    match read_install_history(&state, &query).await {
        Ok(history) => Json(history).into_response(),
        Err(error) => error.into_response(),
    }
}

async fn read_install_history(
    state: &GatewayServerState,
    query: &LogTaskQuery,
) -> Result<InstallJobHistory, InstallApiError> {
    let task_id = query.required_task_id()?;
    let offset = query.offset.unwrap_or_default();
    let limit = query.limit.unwrap_or_default();
    let runner = state.runner.clone();
    // History pages are read from disk synchronously.
    tokio::task::spawn_blocking(move || runner.history(&task_id, offset, limit))
        .await
        .map_err(|error| {
            InstallApiError::internal("log_read_failed", format!("history read aborted: {error}"))
        })?
        .map_err(InstallApiError::from)
}

pub(super) async fn handle_install_status(
    State(state): State<Arc<GatewayServerState>>,
    Query(query): Query<LogTaskQuery>,
) -> Response {
    let result = query.required_task_id().and_then(|task_id| {
        state
            .runner
            .status(&task_id)
            .map_err(InstallApiError::from)
    });
    match result {
        Ok(status) => Json(status).into_response(),
        Err(error) => error.into_response(),
    }
}

pub(super) async fn handle_install_jobs(State(state): State<Arc<GatewayServerState>>) -> Response {
    let jobs = state.runner.list_jobs();
    Json(json!({
        "jobs": jobs,
        "live_streams": state.runner.registry().len(),
    }))
    .into_response()
}
