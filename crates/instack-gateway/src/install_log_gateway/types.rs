//! Request, response and error envelope types for the install gateway.
use super::*;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct InstallApiError {
    pub(super) status: StatusCode,
    pub(super) code: &'static str,
    pub(super) message: String,
}

impl InstallApiError {
    pub(super) fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    pub(super) fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, code, message)
    }

    pub(super) fn not_found(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, code, message)
    }

    pub(super) fn internal(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, code, message)
    }

    pub(super) fn missing_task_id() -> Self {
        Self::bad_request("missing_task_id", "query parameter 'task_id' is required")
    }
}

impl From<InstallJobError> for InstallApiError {
    fn from(error: InstallJobError) -> Self {
        let message = error.to_string();
        match error {
            InstallJobError::InvalidRequest(_) => Self::bad_request("invalid_request", message),
            InstallJobError::TaskNotFound(_) => Self::not_found("task_not_found", message),
            InstallJobError::AlreadyRunning { .. } => {
                Self::new(StatusCode::CONFLICT, "job_already_running", message)
            }
            InstallJobError::SpawnFailed { .. } => Self::internal("job_spawn_failed", message),
            InstallJobError::Stream { .. } => Self::internal("log_stream_unavailable", message),
            InstallJobError::LogRead { .. } => Self::internal("log_read_failed", message),
        }
    }
}

impl From<ScriptResolveError> for InstallApiError {
    fn from(error: ScriptResolveError) -> Self {
        let message = error.to_string();
        match error {
            ScriptResolveError::NotFound { .. } => Self::not_found("script_not_found", message),
            ScriptResolveError::InvalidName(_) => Self::bad_request("invalid_software_key", message),
            ScriptResolveError::Io { .. } => Self::internal("script_read_failed", message),
        }
    }
}

impl IntoResponse for InstallApiError {
    fn into_response(self) -> Response {
        let error_type = if self.status.is_client_error() {
            "invalid_request_error"
        } else {
            "server_error"
        };
        (
            self.status,
            Json(json!({
                "error": {
                    "type": error_type,
                    "code": self.code,
                    "message": self.message,
                }
            })),
        )
            .into_response()
    }
}

/// Body of `POST /v1/install` and `POST /v1/uninstall`.
#[derive(Debug, Clone, Deserialize)]
pub(super) struct StartJobRequest {
    pub(super) key: String,
    #[serde(default)]
    pub(super) version: String,
}

#[derive(Debug, Clone, Serialize)]
pub(super) struct StartJobResponse {
    pub(super) task_id: String,
    pub(super) log_file: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(super) struct LogTaskQuery {
    #[serde(default)]
    pub(super) task_id: Option<String>,
    #[serde(default)]
    pub(super) offset: Option<usize>,
    #[serde(default)]
    pub(super) limit: Option<usize>,
}

impl LogTaskQuery {
    pub(super) fn required_task_id(&self) -> Result<String, InstallApiError> {
        self.task_id
            .as_deref()
            .map(str::trim)
            .filter(|task_id| !task_id.is_empty())
            .map(str::to_string)
            .ok_or_else(InstallApiError::missing_task_id)
    }
}
