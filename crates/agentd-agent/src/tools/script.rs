//! Adapts a loaded [`agentd_scripts::ScriptTool`] to the [`Tool`] trait so the
//! registry can dispatch built-ins and user script tools uniformly.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use agentd_core::{ToolDefinition, ToolResult};
use agentd_scripts::ScriptTool;

use crate::tools::base::Tool;

/// Wall-clock budget for a user tool's `execute` call. Only
/// script-loaded tools are wrapped by this — built-ins are synchronous and
/// exempt. A failing tool becomes a string result, never a propagated
/// `Err`.
const USER_TOOL_TIMEOUT: Duration = Duration::from_secs(30);

pub struct ScriptToolAdapter {
    inner: ScriptTool,
}

impl ScriptToolAdapter {
    pub fn new(inner: ScriptTool) -> Self {
        ScriptToolAdapter { inner }
    }
}

#[async_trait]
impl Tool for ScriptToolAdapter {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn definition(&self) -> ToolDefinition {
        self.inner.definition().clone()
    }

    async fn execute(&self, args: Value) -> anyhow::Result<ToolResult> {
        // A script crashing, emitting malformed JSON, or timing out is
        // surfaced to the model as an error string, not a dispatcher
        // failure — a broken user tool shouldn't take the whole round down
        //.
        match tokio::time::timeout(USER_TOOL_TIMEOUT, self.inner.execute(&args)).await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(e)) => Ok(ToolResult::ok(format!("ERROR: tool script failed: {e}"))),
            Err(_) => Ok(ToolResult::ok(format!(
                "ERROR: Tool \"{}\" timed out after {}ms",
                self.inner.name(),
                USER_TOOL_TIMEOUT.as_millis()
            ))),
        }
    }
}
