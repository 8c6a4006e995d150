//! Core types and the workspace state store shared by every `agentd` crate.

pub mod error;
pub mod queue;
pub mod types;
pub mod utils;
pub mod workspace;

pub use error::AgentError;
pub use queue::MessageQueue;
pub use types::{
    AgentState, BackgroundJob, HistorySummary, JobStatus, LlmResponse, Message, OutboxMessage,
    QueueMessage, RouteEntry, RoundRecord, ToolCall, ToolDefinition, ToolResult, UsageInfo,
    short_hex_id,
};
pub use workspace::{Route, RoutesTable, Workspace};
