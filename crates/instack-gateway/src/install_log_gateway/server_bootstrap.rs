//! Install gateway server bootstrap.

use super::*;

/// Binds `config.bind`, serves the install gateway until ctrl-c, then closes
/// every live log stream.
pub async fn run_install_log_gateway_server(
    config: GatewayServerConfig,
    runner: InstallJobRunner,
    scripts: Arc<dyn ScriptResolver>,
) -> Result<()> {
    let bind_addr = config
        .bind
        .parse::<SocketAddr>()
        .with_context(|| format!("invalid --bind '{}'", config.bind))?;
    let listener = TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("failed to bind install gateway on {bind_addr}"))?;
    let local_addr = listener
        .local_addr()
        .context("failed to resolve bound install gateway address")?;

    tracing::info!(
        addr = %local_addr,
        install_log_dir = %runner.config().layout.install_log_dir.display(),
        shell = %runner.config().shell,
        "install gateway listening"
    );

    let state = Arc::new(GatewayServerState::new(config, runner.clone(), scripts));
    let app = build_install_log_gateway_router(state);
    let serve_result = axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await;
    let closed_streams = runner.shutdown_streams();
    tracing::info!(closed_streams, "install gateway stopped");
    serve_result.context("install gateway server exited unexpectedly")?;
    Ok(())
}
