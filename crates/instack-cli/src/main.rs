mod bootstrap_helpers;
mod cli_args;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use instack_gateway::run_install_log_gateway_server;
use instack_runtime::{DirectoryScriptResolver, InstallJobRunner, JsonFileJobStatusStore};

use crate::bootstrap_helpers::init_tracing;
use crate::cli_args::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    run_cli(cli).await
}

async fn run_cli(cli: Cli) -> Result<()> {
    std::fs::create_dir_all(&cli.state_dir)
        .with_context(|| format!("failed to create {}", cli.state_dir.display()))?;
    if !cli.scripts_root.is_dir() {
        tracing::warn!(
            path = %cli.scripts_root.display(),
            "scripts root does not exist; every start request will report script_not_found"
        );
    }

    let runner = InstallJobRunner::new(
        cli.runner_config(),
        Arc::new(JsonFileJobStatusStore::new(cli.state_dir.clone())),
    );
    let scripts = Arc::new(DirectoryScriptResolver::new(cli.scripts_root.clone()));
    run_install_log_gateway_server(cli.gateway_config(), runner, scripts).await
}

#[cfg(test)]
mod tests;
