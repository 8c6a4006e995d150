//! Wire shapes for the subprocess stdio contract. These
//! are distinct from `agentd_core::types` because the wire format uses
//! JavaScript's camelCase conventions (`toolCalls`) while the in-process
//! types use Rust's usual `snake_case` fields — the conversion happens once,
//! at the boundary, in [`crate::provider`] and [`crate::tool`].

use agentd_core::{Message, ToolCall, ToolDefinition, UsageInfo};
use serde::{Deserialize, Serialize};

/// Argument bundle passed to `node <script> chat '<json>'`.
#[derive(Clone, Debug, Serialize)]
pub struct ChatRequest<'a> {
    pub messages: &'a [Message],
    #[serde(rename = "toolDefs")]
    pub tool_defs: &'a [ToolDefinition],
    pub model: Option<&'a str>,
}

/// Raw stdout payload of a `chat` invocation.
#[derive(Clone, Debug, Deserialize, Default)]
pub struct ChatResponseWire {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default, rename = "toolCalls")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(default)]
    pub usage: Option<UsageInfo>,
}

/// Raw stdout payload of a `describe` invocation against a tool module.
#[derive(Clone, Debug, Deserialize)]
pub struct ToolDescribeWire {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Raw stdout payload of an `execute` invocation against a tool module.
#[derive(Clone, Debug, Deserialize, Default)]
pub struct ToolExecuteWire {
    pub result: String,
    #[serde(default)]
    pub action: Option<String>,
}
