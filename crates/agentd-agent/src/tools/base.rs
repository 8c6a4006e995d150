//! The tool trait every built-in and loaded-script tool implements, plus the
//! concurrent-dispatch-with-ordered-collection helper the executor loop uses.

use async_trait::async_trait;
use serde_json::Value;

use agentd_core::{Message, ToolCall, ToolDefinition, ToolResult};

/// Every dispatchable tool — built-in (`think`, `reply`, `wait_for`, `bash`,
/// `bash_kill`) or a loaded `scripts/tools/*.js` module wrapped by
/// [`crate::tools::script::ScriptToolAdapter`] — implements this.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn definition(&self) -> ToolDefinition;

    /// Run the tool. A returned `Err` is still surfaced to the model as an
    /// `"ERROR: ..."` tool result — it never propagates past
    /// the dispatcher, so implementors may use `?` freely.
    async fn execute(&self, args: Value) -> anyhow::Result<ToolResult>;
}

/// True if any of the dispatched results requested the round end in wait
/// state (`wait_for`, or a user tool's `action: "wait"`).
pub fn any_requested_wait(results: &[ToolResult]) -> bool {
    results.iter().any(ToolResult::is_wait)
}

/// Dispatch every call of one assistant turn concurrently, but collect
/// results in call-declaration order so the model sees deterministic replay.
/// `lookup` resolves a call to the `Tool` that should handle it, or `None`
/// for an unknown name. Returns both the context [`Message`]s to append and
/// the raw [`ToolResult`]s (so the executor can inspect `action`).
pub async fn dispatch_all_with_actions<'a, F>(
    calls: &'a [ToolCall],
    lookup: F,
) -> (Vec<Message>, Vec<ToolResult>)
where
    F: Fn(&str) -> Option<&'a (dyn Tool + 'a)>,
{
    let futures = calls.iter().map(|call| {
        let tool = lookup(&call.name);
        async move {
            let result = match tool {
                Some(tool) => match tool.execute(call.args.clone()).await {
                    Ok(r) => r,
                    Err(e) => ToolResult::ok(format!("ERROR: {e}")),
                },
                None => ToolResult::ok(format!("ERROR: unknown tool \"{}\"", call.name)),
            };
            (call.id.clone(), result)
        }
    });

    let resolved = futures::future::join_all(futures).await;
    let messages = resolved
        .iter()
        .map(|(id, result)| Message::tool_result(id.clone(), result.result.clone()))
        .collect();
    let results = resolved.into_iter().map(|(_, r)| r).collect();
    (messages, results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;

    struct SlowTool {
        delay_ms: u64,
        reply: String,
    }

    #[async_trait]
    impl Tool for SlowTool {
        fn name(&self) -> &str {
            "slow"
        }
        fn definition(&self) -> ToolDefinition {
            ToolDefinition {
                name: "slow".into(),
                description: "slow".into(),
                parameters: serde_json::json!({}),
            }
        }
        async fn execute(&self, _args: Value) -> anyhow::Result<ToolResult> {
            tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;
            Ok(ToolResult::ok(self.reply.clone()))
        }
    }

    struct WaitTool;

    #[async_trait]
    impl Tool for WaitTool {
        fn name(&self) -> &str {
            "wait_for"
        }
        fn definition(&self) -> ToolDefinition {
            ToolDefinition {
                name: "wait_for".into(),
                description: "wait".into(),
                parameters: serde_json::json!({}),
            }
        }
        async fn execute(&self, _args: Value) -> anyhow::Result<ToolResult> {
            Ok(ToolResult::wait("waiting"))
        }
    }

    #[tokio::test]
    async fn results_collected_in_call_order_despite_concurrency() {
        let tools: HashMap<String, Arc<dyn Tool>> = {
            let mut m: HashMap<String, Arc<dyn Tool>> = HashMap::new();
            m.insert(
                "slow".into(),
                Arc::new(SlowTool {
                    delay_ms: 30,
                    reply: "slow-done".into(),
                }),
            );
            m
        };
        let calls = vec![
            ToolCall::new("1", "slow", serde_json::json!({})),
            ToolCall::new("2", "slow", serde_json::json!({})),
        ];
        let (messages, _) =
            dispatch_all_with_actions(&calls, |name| tools.get(name).map(|t| t.as_ref())).await;
        assert_eq!(messages.len(), 2);
        match &messages[0] {
            Message::Tool { tool_call_id, .. } => assert_eq!(tool_call_id, "1"),
            _ => panic!("expected tool message"),
        }
        match &messages[1] {
            Message::Tool { tool_call_id, .. } => assert_eq!(tool_call_id, "2"),
            _ => panic!("expected tool message"),
        }
    }

    #[tokio::test]
    async fn unknown_tool_becomes_error_string() {
        let tools: HashMap<String, Arc<dyn Tool>> = HashMap::new();
        let calls = vec![ToolCall::new("1", "nope", serde_json::json!({}))];
        let (messages, _) =
            dispatch_all_with_actions(&calls, |name| tools.get(name).map(|t| t.as_ref())).await;
        match &messages[0] {
            Message::Tool { content, .. } => {
                assert!(content.starts_with("ERROR: unknown tool"))
            }
            _ => panic!("expected tool message"),
        }
    }

    #[tokio::test]
    async fn wait_action_is_detected() {
        let tools: HashMap<String, Arc<dyn Tool>> = {
            let mut m: HashMap<String, Arc<dyn Tool>> = HashMap::new();
            m.insert("wait_for".into(), Arc::new(WaitTool));
            m
        };
        let calls = vec![ToolCall::new("1", "wait_for", serde_json::json!({}))];
        let (_, results) =
            dispatch_all_with_actions(&calls, |name| tools.get(name).map(|t| t.as_ref())).await;
        assert!(any_requested_wait(&results));
    }
}
