//! Install job gateway: router, shared state and server configuration.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::body::Bytes;
use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::{SinkExt, StreamExt};
use instack_runtime::{
    ChannelLogStreamClient, InstallJobError, InstallJobHistory, InstallJobKind, InstallJobRequest,
    InstallJobRunner, LogMessage, LogStreamAttachment, LogStreamClientError, ScriptResolveError, ScriptResolver,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::net::TcpListener;

mod handlers;
mod log_ws;
mod server_bootstrap;
mod types;

use handlers::{
    handle_install_history, handle_install_jobs, handle_install_status, handle_start_install,
    handle_start_uninstall,
};
use log_ws::handle_install_log_ws_upgrade;
pub use server_bootstrap::run_install_log_gateway_server;
use types::{InstallApiError, LogTaskQuery, StartJobRequest, StartJobResponse};

pub const INSTALL_ENDPOINT: &str = "/v1/install";
pub const UNINSTALL_ENDPOINT: &str = "/v1/uninstall";
pub const INSTALL_LOG_WS_ENDPOINT: &str = "/v1/install/log/ws";
pub const INSTALL_LOG_HISTORY_ENDPOINT: &str = "/v1/install/log/history";
pub const INSTALL_LOG_STATUS_ENDPOINT: &str = "/v1/install/log/status";
pub const INSTALL_JOBS_ENDPOINT: &str = "/v1/install/jobs";

pub const DEFAULT_GATEWAY_BIND: &str = "127.0.0.1:8089";
pub const DEFAULT_CLIENT_WRITE_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 15_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayServerConfig {
    pub bind: String,
    /// Upper bound for a single WebSocket write before the client is dropped.
    pub client_write_timeout: Duration,
    pub heartbeat_interval: Duration,
}

impl Default for GatewayServerConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_GATEWAY_BIND.to_string(),
            client_write_timeout: Duration::from_millis(DEFAULT_CLIENT_WRITE_TIMEOUT_MS),
            heartbeat_interval: Duration::from_millis(DEFAULT_HEARTBEAT_INTERVAL_MS),
        }
    }
}

pub struct GatewayServerState {
    config: GatewayServerConfig,
    runner: InstallJobRunner,
    scripts: Arc<dyn ScriptResolver>,
    client_sequence: AtomicU64,
}

impl GatewayServerState {
    pub fn new(
        config: GatewayServerConfig,
        runner: InstallJobRunner,
        scripts: Arc<dyn ScriptResolver>,
    ) -> Self {
        Self {
            config,
            runner,
            scripts,
            client_sequence: AtomicU64::new(1),
        }
    }

    pub fn config(&self) -> &GatewayServerConfig {
        &self.config
    }

    pub fn runner(&self) -> &InstallJobRunner {
        &self.runner
    }

    fn next_client_id(&self) -> String {
        format!("ws-{}", self.client_sequence.fetch_add(1, Ordering::Relaxed))
    }
}

pub fn build_install_log_gateway_router(state: Arc<GatewayServerState>) -> Router {
    Router::new()
        .route(INSTALL_ENDPOINT, post(handle_start_install))
        .route(UNINSTALL_ENDPOINT, post(handle_start_uninstall))
        .route(INSTALL_LOG_WS_ENDPOINT, get(handle_install_log_ws_upgrade))
        .route(INSTALL_LOG_HISTORY_ENDPOINT, get(handle_install_history))
        .route(INSTALL_LOG_STATUS_ENDPOINT, get(handle_install_status))
        .route(INSTALL_JOBS_ENDPOINT, get(handle_install_jobs))
        .with_state(state)
}
