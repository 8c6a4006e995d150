//! Role templating and inherited-state reset. An onboarding flow that
//! copies default template files into a fresh workspace only if they don't
//! already exist, generalized into a `_base` + `<role>` template pair, plus
//! reset-to-worker detection for a workspace that was cloned from a
//! running root agent's on-disk state.

use agentd_core::{AgentState, Message, Workspace};
use tracing::info;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    Root,
    Worker,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Root => "root",
            Role::Worker => "worker",
        }
    }
}

const BASE_SKILL_README: &str = "# skills\n\n\
    Each subdirectory here may contribute a `setup.sh` (run once at boot) \
    and markdown guidance you can read with a file-reading tool.\n";

const ROOT_PROMPT_MD: &str = "## Role: root\n\n\
    You supervise worker agents. Spawn a worker to handle incoming user \
    tasks rather than handling them directly yourself.\n";

const WORKER_PROMPT_MD: &str = "## Role: worker\n\n\
    You handle tasks directly. Use `reply` to respond to the source that \
    messaged you, and `wait_for` once you have nothing further to do.\n";

fn role_prompt(role: Role) -> &'static str {
    match role {
        Role::Root => ROOT_PROMPT_MD,
        Role::Worker => WORKER_PROMPT_MD,
    }
}

const DEFAULT_PROVIDER: &str = "anthropic";

/// Detect which provider a fresh workspace should declare in `agent.json`
///: the lexicographically-first `scripts/providers/*.js`
/// module stem, or [`DEFAULT_PROVIDER`] if none has been dropped in yet.
pub async fn detect_provider(workspace: &Workspace) -> String {
    let mut entries = match tokio::fs::read_dir(workspace.providers_dir()).await {
        Ok(entries) => entries,
        Err(_) => return DEFAULT_PROVIDER.to_string(),
    };

    let mut stems = Vec::new();
    while let Ok(Some(entry)) = entries.next_entry().await {
        if let Some(stem) = entry.path().file_stem().and_then(|s| s.to_str()) {
            if entry.path().extension().and_then(|e| e.to_str()) == Some("js") {
                stems.push(stem.to_string());
            }
        }
    }
    stems.sort();
    stems.into_iter().next().unwrap_or_else(|| DEFAULT_PROVIDER.to_string())
}

/// Populate a brand-new workspace: `_base` layer (shared skill scaffolding)
/// then the role layer (`prompt.md`), then `agent.json`.
pub async fn scaffold_fresh(
    workspace: &Workspace,
    role: Role,
    provider: &str,
    base_system_prompt: &str,
) -> anyhow::Result<()> {
    workspace.ensure_dirs().await?;

    tokio::fs::create_dir_all(workspace.skills_dir()).await?;
    let readme = workspace.skills_dir().join("README.md");
    if !tokio::fs::try_exists(&readme).await.unwrap_or(false) {
        tokio::fs::write(&readme, BASE_SKILL_README).await?;
    }

    tokio::fs::write(workspace.prompt_md_path(), role_prompt(role)).await?;

    let state = AgentState {
        provider: provider.to_string(),
        model: String::new(),
        round: 0,
        max_rounds: None,
        system_prompt: base_system_prompt.to_string(),
        role: role.as_str().to_string(),
    };
    workspace.write_agent_state(&state).await?;
    info!(role = role.as_str(), "scaffolded fresh workspace");
    Ok(())
}

/// True when a process starting as a worker has inherited root-role
/// artefacts and must reset: a `[system:boot]` message
/// anywhere in context, OR `agent.json.role == "root"`, OR `round > 0` with
/// an effectively empty context.
pub fn needs_worker_reset(state: &AgentState, context: &[Message]) -> bool {
    let has_boot_message = context.iter().any(|m| match m {
        Message::User { content } => content.starts_with("[system:boot]"),
        _ => false,
    });
    let context_effectively_empty = context
        .iter()
        .all(|m| matches!(m, Message::System { .. }));

    has_boot_message || state.role == "root" || (state.round > 0 && context_effectively_empty)
}

/// Reset a workspace to a fresh worker role: clear context,
/// `role := worker`, `round := 0`, overwrite `prompt.md`, wipe and
/// re-layer `skills/`, delete `history/round-*`.
pub async fn reset_to_worker(workspace: &Workspace) -> anyhow::Result<()> {
    workspace.write_context(&[]).await?;

    let mut state = workspace.read_agent_state().await?;
    state.role = Role::Worker.as_str().to_string();
    state.round = 0;
    workspace.write_agent_state(&state).await?;

    tokio::fs::write(workspace.prompt_md_path(), WORKER_PROMPT_MD).await?;

    if tokio::fs::try_exists(workspace.skills_dir()).await.unwrap_or(false) {
        tokio::fs::remove_dir_all(workspace.skills_dir()).await?;
    }
    tokio::fs::create_dir_all(workspace.skills_dir()).await?;
    tokio::fs::write(workspace.skills_dir().join("README.md"), BASE_SKILL_README).await?;

    workspace.clear_history().await?;

    info!("reset workspace to worker role");
    Ok(())
}
