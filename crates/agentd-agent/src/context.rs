//! System prompt assembly: base prompt + `prompt.md` (if present) + a
//! trailer naming the workspace's absolute path. Kept as a single function
//! so role reset never needs to special-case where role material lives —
//! all of it is in `prompt.md`, never in `agent.json`'s `systemPrompt`.

use agentd_core::Workspace;

/// Assemble the system prompt for one round's provider call.
pub async fn assemble_system_prompt(workspace: &Workspace, base_prompt: &str) -> String {
    let mut sections = vec![base_prompt.to_string()];

    if let Ok(fragment) = tokio::fs::read_to_string(workspace.prompt_md_path()).await {
        let trimmed = fragment.trim();
        if !trimmed.is_empty() {
            sections.push(trimmed.to_string());
        }
    }

    sections.push(format!("Workspace: {}", workspace.root().display()));

    sections.join("\n\n")
}
