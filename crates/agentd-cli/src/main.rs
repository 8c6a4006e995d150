//! agentd — process entry point for one agent workspace.
//!
//! `agentd [WORKSPACE]` starts the HTTP surface and the executor loop for a
//! single workspace, initialising it from role templates on first run.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};

use agentd_agent::{Executor, Role, StatusHandle};
use agentd_core::{QueueMessage, Workspace};

const BASE_SYSTEM_PROMPT: &str = "You are agentd, a persistent, self-modifying agent. \
    You read and write your own workspace; tools you call take effect immediately.";

/// Default HTTP port.
const DEFAULT_PORT: u16 = 3000;

#[derive(Parser)]
#[command(name = "agentd", version, about, long_about = None)]
struct Cli {
    /// Workspace directory this process owns.
    #[arg(default_value = "./workspace")]
    workspace: PathBuf,
}

/// Environment-derived configuration, read once at startup. A single
/// workspace needs nothing beyond these env vars — the workspace's own
/// `agent.json` is this system's per-agent configuration.
struct RuntimeConfig {
    port: u16,
    repair_agent_url: Option<String>,
    spawn_worker: bool,
}

impl RuntimeConfig {
    fn from_env() -> Self {
        RuntimeConfig {
            port: std::env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_PORT),
            repair_agent_url: std::env::var("REPAIR_AGENT_URL").ok(),
            spawn_worker: std::env::var("SPAWN_WORKER").as_deref() == Ok("true"),
        }
    }
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    init_logging();
    let cli = Cli::parse();
    let workspace_path = agentd_core::utils::expand_home(&cli.workspace.to_string_lossy());

    match run(workspace_path.clone()).await {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "unhandled failure, writing crash.log");
            let ws = Workspace::new(&workspace_path);
            let line = serde_json::json!({
                "timestamp": agentd_core::utils::timestamp(),
                "source": "unknown",
                "message": err.to_string(),
                "stack": format!("{err:?}"),
                "pid": std::process::id(),
                "workspace": workspace_path.display().to_string(),
            })
            .to_string();
            if let Err(log_err) = ws.append_crash_line(&line).await {
                error!(error = %log_err, "failed to write crash.log");
            }
            std::process::ExitCode::FAILURE
        }
    }
}

fn init_logging() {
    use tracing_subscriber::EnvFilter;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .compact()
        .init();
}

async fn run(workspace_path: PathBuf) -> Result<()> {
    let config = RuntimeConfig::from_env();

    // SPAWN_WORKER elects root role for this run only; consumed so a child
    // process launched by this one (via the `bash` tool) doesn't inherit it
    //.
    std::env::remove_var("SPAWN_WORKER");
    std::env::set_var("WORKSPACE", &workspace_path);

    let workspace = Workspace::new(&workspace_path);
    let role = if config.spawn_worker { Role::Root } else { Role::Worker };

    let is_fresh = !tokio::fs::try_exists(workspace.agent_json_path())
        .await
        .unwrap_or(false);
    if is_fresh {
        let provider = agentd_agent::detect_provider(&workspace).await;
        agentd_agent::scaffold_fresh(&workspace, role, &provider, BASE_SYSTEM_PROMPT)
            .await
            .context("failed to scaffold fresh workspace")?;
        info!(role = role.as_str(), workspace = %workspace_path.display(), "initialised fresh workspace");
    } else {
        workspace.ensure_dirs().await?;
        if role == Role::Worker {
            let state = workspace.read_agent_state().await?;
            let context = workspace.read_context().await.unwrap_or_default();
            if agentd_agent::needs_worker_reset(&state, &context) {
                agentd_agent::reset_to_worker(&workspace)
                    .await
                    .context("failed to reset inherited root state")?;
            }
        }
    }

    if let Err(e) = agentd_agent::run_setup_scripts(&workspace.skills_dir()).await {
        warn!(error = %e, "skill setup scripts failed");
    }

    inject_boot_or_restart(&workspace, role).await?;

    let queue = agentd_core::MessageQueue::new();
    let status = StatusHandle::new();
    let mut executor = Executor::new(
        workspace.clone(),
        queue.clone(),
        status.clone(),
        config.repair_agent_url,
    );

    let http_state = agentd_http::AppState::new(workspace, queue, status);
    let http_server = tokio::spawn(agentd_http::serve(http_state, config.port));

    tokio::select! {
        result = executor.run() => result.context("executor loop failed"),
        result = http_server => match result {
            Ok(inner) => inner.context("HTTP surface failed"),
            Err(join_err) => Err(anyhow::anyhow!(join_err)),
        },
    }
}

/// Boot/crash injection: a fresh root gets a synthetic
/// `system:boot` message telling it to spawn a worker; a worker resuming
/// with non-empty context gets a `system:restart` notice, including the
/// last `crash.log` line if one exists.
async fn inject_boot_or_restart(workspace: &Workspace, role: Role) -> Result<()> {
    match role {
        Role::Root => {
            let msg = QueueMessage::new(
                "system:boot",
                "Spawn a worker agent to handle incoming user tasks.",
            );
            append_boot_message(workspace, msg).await
        }
        Role::Worker => {
            let context = workspace.read_context().await.unwrap_or_default();
            if context.is_empty() {
                return Ok(());
            }
            let last_crash = workspace.last_crash_line().await.unwrap_or(None);
            let content = match last_crash {
                Some(line) => format!(
                    "The process restarted after a crash. Last crash.log entry: {line}"
                ),
                None => "The process restarted. Resuming from persisted context.".to_string(),
            };
            append_boot_message(workspace, QueueMessage::new("system:restart", content)).await
        }
    }
}

/// Queue messages injected before the executor starts can't go through the
/// live `MessageQueue` (it doesn't exist yet) — they're written straight
/// into context as the first user message of the resumed run, mirroring
/// how an ordinary inbound message is folded in at drain time.
async fn append_boot_message(workspace: &Workspace, msg: QueueMessage) -> Result<()> {
    let mut context = workspace.read_context().await.unwrap_or_default();
    context.push(agentd_core::Message::user(format!("[{}] {}", msg.source, msg.content)));
    workspace.write_context(&context).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn cli_defaults_workspace_to_local_dir() {
        let cli = Cli::parse_from(["agentd"]);
        assert_eq!(cli.workspace, PathBuf::from("./workspace"));
    }

    #[test]
    fn cli_accepts_positional_workspace() {
        let cli = Cli::parse_from(["agentd", "/tmp/ws"]);
        assert_eq!(cli.workspace, PathBuf::from("/tmp/ws"));
    }

    #[tokio::test]
    async fn root_boot_injection_adds_boot_message() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::new(dir.path());
        ws.ensure_dirs().await.unwrap();

        inject_boot_or_restart(&ws, Role::Root).await.unwrap();

        let context = ws.read_context().await.unwrap();
        assert_eq!(context.len(), 1);
        match &context[0] {
            agentd_core::Message::User { content } => {
                assert!(content.starts_with("[system:boot]"));
            }
            other => panic!("expected a user message, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn worker_restart_injection_skipped_when_context_empty() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::new(dir.path());
        ws.ensure_dirs().await.unwrap();

        inject_boot_or_restart(&ws, Role::Worker).await.unwrap();

        assert!(ws.read_context().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn worker_restart_injection_includes_last_crash_line() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::new(dir.path());
        ws.ensure_dirs().await.unwrap();
        ws.write_context(&[agentd_core::Message::user("leftover turn")])
            .await
            .unwrap();
        ws.append_crash_line(r#"{"message":"llm_call timeout"}"#)
            .await
            .unwrap();

        inject_boot_or_restart(&ws, Role::Worker).await.unwrap();

        let context = ws.read_context().await.unwrap();
        let last = context.last().unwrap();
        match last {
            agentd_core::Message::User { content } => {
                assert!(content.contains("llm_call timeout"));
            }
            other => panic!("expected a user message, got {other:?}"),
        }
    }
}
