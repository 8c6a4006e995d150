//! The provider contract: `node <script> chat '<json-request>'`.
//! One [`ScriptProvider`] wraps one `scripts/providers/<name>.js`
//! file; it carries no process handle of its own — every `chat()` call is a
//! fresh spawn via [`crate::runner::run_json`].

use std::path::{Path, PathBuf};

use agentd_core::{LlmResponse, Message, ToolDefinition};

use crate::protocol::{ChatRequest, ChatResponseWire};
use crate::runner::{run_json, ScriptError};

/// A loaded provider adapter, identified by the filename stem matching
/// `agent.json`'s `provider` field.
#[derive(Clone, Debug)]
pub struct ScriptProvider {
    path: PathBuf,
}

impl ScriptProvider {
    /// `path` must point at an existing `scripts/providers/<name>.js` file;
    /// the loader is responsible for resolving that lookup.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        ScriptProvider { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Call the provider's `chat` operation. A transport error (spawn
    /// failure, non-zero exit, unparsable JSON) becomes a [`ScriptError`];
    /// the executor loop's retry policy lives above this call, not inside
    /// it.
    pub async fn chat(
        &self,
        messages: &[Message],
        tool_defs: &[ToolDefinition],
        model: Option<&str>,
    ) -> Result<LlmResponse, ScriptError> {
        let request = ChatRequest {
            messages,
            tool_defs,
            model,
        };
        let arg = serde_json::to_string(&request).map_err(|source| ScriptError::InvalidJson {
            path: self.path.display().to_string(),
            source,
        })?;
        let wire: ChatResponseWire = run_json(&self.path, "chat", Some(&arg)).await?;
        Ok(LlmResponse {
            content: wire.content,
            tool_calls: wire.tool_calls,
            usage: wire.usage,
        })
    }

    /// Liveness probe used by the repair path: the provider is considered
    /// loadable if invoking it with an empty chat request spawns, runs to
    /// completion, and returns parsable JSON. Any `ScriptError` — including
    /// one the script itself raised because the backend rejected the empty
    /// request (e.g. missing API key) — fails the probe; this call can't
    /// distinguish "the module is broken" from "the module ran fine but its
    /// backend call failed", so it treats both as not yet loadable.
    pub async fn probe(&self) -> Result<(), ScriptError> {
        self.chat(&[], &[], None).await.map(|_| ())
    }
}
