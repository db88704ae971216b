// Agent cowork bridge
//
// Serves the orchestration core to a UI process over stdin/stdout, one JSON
// envelope per line. Logs go to stderr; RUST_LOG controls the filter.

use agent_cowork::control::run_stdio_bridge;
use agent_cowork::{CoreConfig, Orchestrator, ProcessRuntime, ToolRegistry};
use anyhow::{Context, Result};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = CoreConfig::from_env().context("Failed to load configuration")?;
    log::info!(
        "agent-cowork-bridge {} (agent: {}, data: {})",
        agent_cowork::VERSION,
        config.agent_command.program,
        config.archive_dir.display()
    );

    let runtime = ProcessRuntime::new(config.agent_command.clone(), config.max_line_bytes);
    let max_line_bytes = config.max_line_bytes;
    let (events_tx, events_rx) = tokio::sync::mpsc::unbounded_channel();
    let orchestrator = Orchestrator::new(
        config,
        Arc::new(runtime),
        Arc::new(ToolRegistry::with_builtin_tools()),
        events_tx,
    );
    orchestrator
        .restore()
        .await
        .context("Failed to restore archived sessions")?;

    run_stdio_bridge(&orchestrator, events_rx, max_line_bytes)
        .await
        .context("Bridge failed")?;
    Ok(())
}
