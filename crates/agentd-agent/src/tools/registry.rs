//! Combines the fixed built-ins with the workspace's `scripts/tools/*.js`
//! modules, reloaded fresh every round so edits to a tool module take effect
//! on the very next dispatch: a name-keyed `HashMap<String, Arc<dyn Tool>>`
//! where the script half is rebuilt every round instead of once at startup.

use std::collections::HashMap;
use std::sync::Arc;

use agentd_core::{Message, MessageQueue, ToolCall, ToolDefinition, ToolResult, Workspace};
use agentd_scripts::ScriptLoader;

use crate::router::ReplyRouter;
use crate::tools::base::{dispatch_all_with_actions, Tool};
use crate::tools::bash::{BackgroundJobRegistry, BashKillTool, BashTool};
use crate::tools::builtin::{ReplyTool, ThinkTool, WaitForTool};
use crate::tools::script::ScriptToolAdapter;

/// Holds the tools that never change (`think`, `reply`, `wait_for`, `bash`,
/// `bash_kill`) plus everything needed to rebuild the script half on demand.
pub struct ToolRegistry {
    workspace: Workspace,
    builtins: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new(workspace: Workspace, queue: MessageQueue) -> Self {
        let jobs = BackgroundJobRegistry::new();
        let router = ReplyRouter::new(workspace.clone());

        let mut builtins: HashMap<String, Arc<dyn Tool>> = HashMap::new();
        builtins.insert("think".into(), Arc::new(ThinkTool));
        builtins.insert("reply".into(), Arc::new(ReplyTool::new(router)));
        builtins.insert("wait_for".into(), Arc::new(WaitForTool));
        builtins.insert(
            "bash".into(),
            Arc::new(BashTool::new(workspace.clone(), jobs.clone(), queue)),
        );
        builtins.insert("bash_kill".into(), Arc::new(BashKillTool::new(jobs)));

        ToolRegistry { workspace, builtins }
    }

    /// Re-read `scripts/tools/*.js`, probing each via `describe`, and return
    /// the combined built-in + script tool set plus their definitions for
    /// the provider call. A script load failure is returned to the caller
    /// rather than silently dropping that tool — the executor treats it as
    /// an `AgentError::ScriptLoad` and enters the repair loop.
    pub async fn load_round(
        &self,
    ) -> Result<(HashMap<String, Arc<dyn Tool>>, Vec<ToolDefinition>), agentd_scripts::loader::LoadError>
    {
        let loader = ScriptLoader::new(&self.workspace);
        let loaded = loader.load_tools().await?;

        let mut tools = self.builtins.clone();
        for entry in loaded {
            let adapter: Arc<dyn Tool> = Arc::new(ScriptToolAdapter::new(entry.tool));
            // Built-ins win on a name collision — a user script can't shadow
            // think/reply/wait_for/bash/bash_kill.
            tools.entry(adapter.name().to_string()).or_insert(adapter);
        }

        let defs = tools.values().map(|t| t.definition()).collect();
        Ok((tools, defs))
    }

    /// Dispatch one assistant turn's tool calls against an already-loaded
    /// tool set (from [`Self::load_round`]), returning both the context
    /// messages to append and the raw results (for wait-state detection).
    pub async fn dispatch(
        tools: &HashMap<String, Arc<dyn Tool>>,
        calls: &[ToolCall],
    ) -> (Vec<Message>, Vec<ToolResult>) {
        dispatch_all_with_actions(calls, |name| tools.get(name).map(|t| t.as_ref())).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn workspace() -> (tempfile::TempDir, Workspace) {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::new(dir.path());
        ws.ensure_dirs().await.unwrap();
        (dir, ws)
    }

    #[tokio::test]
    async fn load_round_includes_all_builtins() {
        let (_dir, ws) = workspace().await;
        let registry = ToolRegistry::new(ws, MessageQueue::new());
        let (tools, defs) = registry.load_round().await.unwrap();
        for name in ["think", "reply", "wait_for", "bash", "bash_kill"] {
            assert!(tools.contains_key(name), "missing builtin {name}");
        }
        assert_eq!(defs.len(), 5);
    }

    #[tokio::test]
    async fn dispatch_runs_think_builtin() {
        let (_dir, ws) = workspace().await;
        let registry = ToolRegistry::new(ws, MessageQueue::new());
        let (tools, _) = registry.load_round().await.unwrap();
        let calls = vec![ToolCall::new("1", "think", json!({"thought": "plan"}))];
        let (messages, results) = ToolRegistry::dispatch(&tools, &calls).await;
        assert_eq!(messages.len(), 1);
        assert_eq!(results[0].result, "OK");
    }
}
