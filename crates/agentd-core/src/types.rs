//! Core wire types shared by every crate in the workspace.
//!
//! These are the typed Rust shapes for the JSON structures the runtime
//! works with: chat messages, tool calls, queue/outbox envelopes, background
//! jobs, and the on-disk `agent.json` / `routes.json` / round-history
//! records. Keeping
//! them in one crate with no I/O lets every other crate (scripts, agent,
//! http, cli) share one definition of "what a message looks like" without
//! circular dependencies.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ─────────────────────────────────────────────
// Conversation messages
// ─────────────────────────────────────────────

/// A single entry in the agent's conversation context.
///
/// Tagged by `role` so the on-disk JSON (`memory/context.json`,
/// `history/round-NNNNN.json`) is exactly the shape a hand-written script
/// provider expects to receive and return.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "role")]
pub enum Message {
    #[serde(rename = "system")]
    System { content: String },

    #[serde(rename = "user")]
    User { content: String },

    #[serde(rename = "assistant")]
    Assistant {
        #[serde(skip_serializing_if = "Option::is_none")]
        content: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        tool_calls: Option<Vec<ToolCall>>,
    },

    #[serde(rename = "tool")]
    Tool {
        content: String,
        tool_call_id: String,
    },
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Message::System {
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Message::User {
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Message::Assistant {
            content: Some(content.into()),
            tool_calls: None,
        }
    }

    pub fn assistant_tool_calls(tool_calls: Vec<ToolCall>) -> Self {
        Message::Assistant {
            content: None,
            tool_calls: Some(tool_calls),
        }
    }

    pub fn assistant_with_calls(content: Option<String>, tool_calls: Vec<ToolCall>) -> Self {
        Message::Assistant {
            content,
            tool_calls: if tool_calls.is_empty() {
                None
            } else {
                Some(tool_calls)
            },
        }
    }

    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Message::Tool {
            content: content.into(),
            tool_call_id: tool_call_id.into(),
        }
    }

    /// True for `Tool` messages — used by the memory manager, which prunes
    /// only tool messages.
    pub fn is_tool(&self) -> bool {
        matches!(self, Message::Tool { .. })
    }

    /// Rough size in characters, used by the memory manager's char budget.
    pub fn char_len(&self) -> usize {
        match self {
            Message::System { content } => content.len(),
            Message::User { content } => content.len(),
            Message::Assistant {
                content,
                tool_calls,
            } => {
                let content_len = content.as_deref().map(str::len).unwrap_or(0);
                let calls_len: usize = tool_calls
                    .iter()
                    .flatten()
                    .map(|c| c.name.len() + c.args.to_string().len())
                    .sum();
                content_len + calls_len
            }
            Message::Tool { content, .. } => content.len(),
        }
    }
}

/// A single tool invocation requested by the assistant.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub args: Value,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, args: Value) -> Self {
        ToolCall {
            id: id.into(),
            name: name.into(),
            args,
        }
    }
}

/// Result of a tool's `execute`. `action` carries the built-in `"wait"`
/// signal (`wait_for`, or a user tool that wants the round to suspend until
/// the next inbound message) per
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Default)]
pub struct ToolResult {
    pub result: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
}

impl ToolResult {
    pub fn ok(result: impl Into<String>) -> Self {
        ToolResult {
            result: result.into(),
            action: None,
        }
    }

    pub fn wait(result: impl Into<String>) -> Self {
        ToolResult {
            result: result.into(),
            action: Some("wait".to_string()),
        }
    }

    pub fn is_wait(&self) -> bool {
        self.action.as_deref() == Some("wait")
    }
}

/// A tool's JSON-schema-like advertisement, handed to the provider alongside
/// the conversation so the model knows what it can call.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Token accounting returned by a provider, when it chooses to report one.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Default)]
pub struct UsageInfo {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

/// Normalized response from `chat()`, whatever the underlying provider
/// script actually returned on stdout.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Default)]
pub struct LlmResponse {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(default)]
    pub usage: Option<UsageInfo>,
}

impl LlmResponse {
    pub fn has_tool_calls(&self) -> bool {
        self.tool_calls.as_ref().is_some_and(|c| !c.is_empty())
    }
}

// ─────────────────────────────────────────────
// Message queue envelopes
// ─────────────────────────────────────────────

/// One entry pushed onto an agent's inbound FIFO.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct QueueMessage {
    pub id: String,
    pub source: String,
    pub content: String,
    #[serde(default)]
    pub metadata: Value,
    pub received_at: String,
}

impl QueueMessage {
    pub fn new(source: impl Into<String>, content: impl Into<String>) -> Self {
        QueueMessage {
            id: uuid::Uuid::new_v4().to_string(),
            source: source.into(),
            content: content.into(),
            metadata: Value::Null,
            received_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// A reply the agent could not deliver live, persisted to
/// `outbox/<uuid>.json` for later pickup. Field names match the wire
/// contract external pollers (`GET /outbox`) depend on.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct OutboxMessage {
    pub id: String,
    pub source: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub metadata: Value,
    pub timestamp: String,
}

impl OutboxMessage {
    pub fn new(source: impl Into<String>, content: impl Into<String>) -> Self {
        OutboxMessage {
            id: uuid::Uuid::new_v4().to_string(),
            source: source.into(),
            content: content.into(),
            metadata: Value::Null,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Entry in `routes.json` mapping a destination name to a webhook URL.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RouteEntry {
    pub name: String,
    pub url: String,
}

// ─────────────────────────────────────────────
// Background jobs (bash tool)
// ─────────────────────────────────────────────

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Running,
    Completed,
    Failed,
    Killed,
}

/// State tracked for one async `bash` invocation, shared between the
/// executor loop and the HTTP surface.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct BackgroundJob {
    pub id: String,
    pub command: String,
    pub status: JobStatus,
    pub output_path: String,
    pub started_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
}

/// Generates an 8-hex-character id used for background job identifiers.
pub fn short_hex_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..8].to_string()
}

// ─────────────────────────────────────────────
// agent.json — per-workspace agent state
// ─────────────────────────────────────────────

/// The mutable, self-editable state every round reads and (partially)
/// rewrites. Field names are camelCase on the wire to match the rest of the
/// workspace's JSON files.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AgentState {
    pub provider: String,
    pub model: String,
    #[serde(default)]
    pub round: u64,
    pub max_rounds: Option<u64>,
    pub system_prompt: String,
    #[serde(default = "default_role")]
    pub role: String,
}

fn default_role() -> String {
    "root".to_string()
}

impl AgentState {
    /// True once `round` has reached `max_rounds`, if a cap is set.
    pub fn rounds_exhausted(&self) -> bool {
        self.max_rounds.is_some_and(|max| self.round >= max)
    }
}

// ─────────────────────────────────────────────
// Round history
// ─────────────────────────────────────────────

/// One persisted entry under `history/round-NNNNN.json` — the full record
/// of a single executor round, used for audit and for the `/history`
/// endpoint.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RoundRecord {
    pub round: u64,
    pub started_at: String,
    pub finished_at: String,
    #[serde(default)]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    pub inbound: Vec<QueueMessage>,
    pub messages_appended: Vec<Message>,
    #[serde(default)]
    pub usage: Option<UsageInfo>,
    #[serde(default)]
    pub error: Option<String>,
}

/// One tool call's contribution to a [`HistorySummary`] — name plus a
/// truncated rendering of its arguments, never the full tool result (that
/// stays in the full record behind `/history/:round`).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CallSummary {
    pub name: String,
    pub args_summary: String,
}

/// Lightweight projection of [`RoundRecord`] for `/history?limit=n`
/// so callers aren't forced to pull every message body over
/// the wire just to list rounds.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HistorySummary {
    pub round: u64,
    pub started_at: String,
    pub finished_at: String,
    pub provider: String,
    pub model: Option<String>,
    pub message_count: usize,
    pub tool_call_count: usize,
    pub tool_names: Vec<String>,
    pub calls: Vec<CallSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_preview: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assistant_preview: Option<String>,
    pub usage: Option<UsageInfo>,
    pub had_error: bool,
}

impl From<&RoundRecord> for HistorySummary {
    fn from(r: &RoundRecord) -> Self {
        let mut tool_names: Vec<String> = Vec::new();
        let mut calls = Vec::new();
        let mut tool_call_count = 0;
        let mut user_preview = None;
        let mut assistant_preview = None;

        for msg in &r.messages_appended {
            match msg {
                Message::User { content } if user_preview.is_none() => {
                    user_preview = Some(crate::utils::truncate_string(content, 120));
                }
                Message::Assistant {
                    content,
                    tool_calls,
                } => {
                    if assistant_preview.is_none() {
                        if let Some(content) = content {
                            assistant_preview = Some(crate::utils::truncate_string(content, 200));
                        }
                    }
                    for call in tool_calls.iter().flatten() {
                        tool_call_count += 1;
                        if !tool_names.contains(&call.name) {
                            tool_names.push(call.name.clone());
                        }
                        calls.push(CallSummary {
                            name: call.name.clone(),
                            args_summary: crate::utils::truncate_string(&call.args.to_string(), 120),
                        });
                    }
                }
                _ => {}
            }
        }

        HistorySummary {
            round: r.round,
            started_at: r.started_at.clone(),
            finished_at: r.finished_at.clone(),
            provider: r.provider.clone(),
            model: r.model.clone(),
            message_count: r.messages_appended.len(),
            tool_call_count,
            tool_names,
            calls,
            user_preview,
            assistant_preview,
            usage: r.usage.clone(),
            had_error: r.error.is_some(),
        }
    }
}
