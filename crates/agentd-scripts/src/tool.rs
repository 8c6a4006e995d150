//! The tool contract: `describe` / `execute` over a `scripts/tools/<name>.js`
//! module. A [`ScriptTool`] is a loaded handle onto one such
//! file; the agent-side [`agentd_core::ToolResult`] is what `execute`
//! ultimately returns once a caller wraps this in their own tool-executor
//! abstraction.

use std::path::{Path, PathBuf};

use agentd_core::{ToolDefinition, ToolResult};
use serde_json::Value;

use crate::protocol::{ToolDescribeWire, ToolExecuteWire};
use crate::runner::{run_json, ScriptError};

/// A loaded user tool module.
#[derive(Clone, Debug)]
pub struct ScriptTool {
    path: PathBuf,
    def: ToolDefinition,
}

impl ScriptTool {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn definition(&self) -> &ToolDefinition {
        &self.def
    }

    pub fn name(&self) -> &str {
        &self.def.name
    }

    /// Load a tool module by calling its `describe` operation, which must
    /// answer with `{name, description, parameters}` before the tool can be
    /// registered and advertised to the provider.
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self, ScriptError> {
        let path = path.into();
        let wire: ToolDescribeWire = run_json(&path, "describe", None).await?;
        Ok(ScriptTool {
            path,
            def: ToolDefinition {
                name: wire.name,
                description: wire.description,
                parameters: wire.parameters,
            },
        })
    }

    /// Invoke the tool's `execute` operation with the given arguments.
    /// Wall-clock timeout enforcement is the tool executor's job, not this
    /// call's — `run_json` only guards against a hung subprocess at the
    /// 60s script-level ceiling.
    pub async fn execute(&self, args: &Value) -> Result<ToolResult, ScriptError> {
        let arg = serde_json::to_string(args).map_err(|source| ScriptError::InvalidJson {
            path: self.path.display().to_string(),
            source,
        })?;
        let wire: ToolExecuteWire = run_json(&self.path, "execute", Some(&arg)).await?;
        Ok(ToolResult {
            result: wire.result,
            action: wire.action,
        })
    }
}
