//! The three built-ins that are never present in user scripts: `think`, `reply`, `wait_for`.

use async_trait::async_trait;
use serde_json::{json, Value};

use agentd_core::{ToolDefinition, ToolResult};
use tracing::debug;

use crate::router::ReplyRouter;
use crate::tools::base::Tool;

/// Logs the model's reasoning and returns `"OK"`. No side effect beyond the
/// log line — this is the agent's scratch space, not part of context
/// pruning's char budget in any special way.
pub struct ThinkTool;

#[async_trait]
impl Tool for ThinkTool {
    fn name(&self) -> &str {
        "think"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "think".into(),
            description: "Record a private reasoning step. Has no side effect; use it to plan \
                          before acting."
                .into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "thought": { "type": "string", "description": "The reasoning to record" }
                },
                "required": ["thought"]
            }),
        }
    }

    async fn execute(&self, args: Value) -> anyhow::Result<ToolResult> {
        let thought = args
            .get("thought")
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        debug!(thought = %thought, "agent think");
        Ok(ToolResult::ok("OK"))
    }
}

/// Invokes the [`ReplyRouter`] and returns a confirmation string naming
/// whichever destination (route URL or outbox) the reply actually went to.
pub struct ReplyTool {
    router: ReplyRouter,
}

impl ReplyTool {
    pub fn new(router: ReplyRouter) -> Self {
        ReplyTool { router }
    }
}

#[async_trait]
impl Tool for ReplyTool {
    fn name(&self) -> &str {
        "reply"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "reply".into(),
            description: "Send a reply to a message source, delivered via a configured route or \
                          the filesystem outbox."
                .into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "source": { "type": "string", "description": "The source to reply to, e.g. \"telegram:123\"" },
                    "content": { "type": "string", "description": "The reply content" }
                },
                "required": ["source", "content"]
            }),
        }
    }

    async fn execute(&self, args: Value) -> anyhow::Result<ToolResult> {
        let source = args
            .get("source")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("missing required parameter: source"))?;
        let content = args
            .get("content")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("missing required parameter: content"))?;

        // A delivery failure (route POST non-2xx, and outbox write also
        // failing) is surfaced to the agent as a tool-result error rather
        // than propagated, so it can retry with a different source or
        // repair routes.json.
        match self.router.deliver(source, content).await {
            Ok(dest) => Ok(ToolResult::ok(format!("Delivered via {dest}"))),
            Err(e) => Ok(ToolResult::ok(format!("ERROR: delivery failed: {e}"))),
        }
    }
}

/// Signals the executor to end the round in wait state once all tool
/// results of this turn are persisted.
pub struct WaitForTool;

#[async_trait]
impl Tool for WaitForTool {
    fn name(&self) -> &str {
        "wait_for"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "wait_for".into(),
            description: "Suspend the agent until the next inbound message arrives.".into(),
            parameters: json!({"type": "object", "properties": {}, "required": []}),
        }
    }

    async fn execute(&self, _args: Value) -> anyhow::Result<ToolResult> {
        Ok(ToolResult::wait("Waiting for the next message"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn think_returns_ok_without_side_effect() {
        let tool = ThinkTool;
        let result = tool.execute(json!({"thought": "plan the approach"})).await.unwrap();
        assert_eq!(result.result, "OK");
        assert!(!result.is_wait());
    }

    #[tokio::test]
    async fn wait_for_sets_wait_action() {
        let tool = WaitForTool;
        let result = tool.execute(json!({})).await.unwrap();
        assert!(result.is_wait());
    }
}
