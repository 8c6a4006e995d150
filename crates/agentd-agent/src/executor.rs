//! The executor loop: the per-round state machine. Generalizes an
//! iterate-until-no-tool-calls loop bounded by a maximum iteration count,
//! with no persistence between turns, into a persistent, round-based loop
//! that persists context at every suspension point and survives a restart.

use std::sync::Arc;
use std::time::Duration;

use agentd_core::{
    AgentError, AgentState, Message, QueueMessage, RoundRecord, ToolCall, Workspace,
};
use agentd_scripts::ScriptLoader;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::memory;
use crate::tools::registry::ToolRegistry;

const MAX_RETRY_ATTEMPTS: u32 = 3;
const RETRY_BACKOFF: [Duration; 2] = [Duration::from_secs(2), Duration::from_secs(4)];
const MAX_NUDGES: u32 = 2;
const REPAIR_POLL_INTERVAL: Duration = Duration::from_secs(15);
const REPAIR_TIMEOUT: Duration = Duration::from_secs(600);

const NUDGE_TEXT: &str =
    "You produced no tool calls. Use a tool (e.g. reply, wait_for) to proceed.";

/// Snapshot of `/status`'s current view onto the loop, shared with the HTTP
/// surface.
#[derive(Clone, Debug, Default, serde::Serialize)]
pub struct StatusSnapshot {
    pub status: String,
    pub round: u64,
    pub provider: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetail>,
}

#[derive(Clone, Debug, serde::Serialize)]
pub struct ErrorDetail {
    pub source: String,
    pub message: String,
    pub stack: String,
    pub timestamp: String,
}

/// Shared, cheaply-cloned handle onto the loop's current status, read by
/// the HTTP surface's `/status` handler.
#[derive(Clone)]
pub struct StatusHandle(Arc<Mutex<StatusSnapshot>>);

impl StatusHandle {
    pub fn new() -> Self {
        StatusHandle(Arc::new(Mutex::new(StatusSnapshot {
            status: "waiting".to_string(),
            ..Default::default()
        })))
    }

    pub async fn snapshot(&self) -> StatusSnapshot {
        self.0.lock().await.clone()
    }

    async fn set(&self, f: impl FnOnce(&mut StatusSnapshot)) {
        let mut guard = self.0.lock().await;
        f(&mut guard);
    }
}

impl Default for StatusHandle {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Executor {
    workspace: Workspace,
    queue: agentd_core::MessageQueue,
    registry: ToolRegistry,
    status: StatusHandle,
    repair_agent_url: Option<String>,
    http: reqwest::Client,
    empty_turn_streak: u32,
}

impl Executor {
    pub fn new(
        workspace: Workspace,
        queue: agentd_core::MessageQueue,
        status: StatusHandle,
        repair_agent_url: Option<String>,
    ) -> Self {
        let registry = ToolRegistry::new(workspace.clone(), queue.clone());
        Executor {
            workspace,
            queue,
            registry,
            status,
            repair_agent_url,
            http: reqwest::Client::new(),
            empty_turn_streak: 0,
        }
    }

    pub fn status_handle(&self) -> StatusHandle {
        self.status.clone()
    }

    /// Run rounds until `maxRounds` is reached (exit 0) or a repair timeout
    /// occurs (exit 1 — the caller translates this into the process exit
    /// code and a `crash.log` entry).
    pub async fn run(&mut self) -> anyhow::Result<()> {
        loop {
            let state = self.workspace.read_agent_state().await?;
            if state.rounds_exhausted() {
                info!(round = state.round, "max rounds reached, stopping");
                return Ok(());
            }

            match self.run_round(&state).await {
                Ok(RoundOutcome::Continue) => {}
                Ok(RoundOutcome::Wait) => {
                    self.status
                        .set(|s| s.status = "waiting".to_string())
                        .await;
                    self.queue.wait().await;
                }
                Err(err) => {
                    self.enter_error_state(&err).await;
                    self.run_repair_loop(&err).await?;
                }
            }
        }
    }

    async fn run_round(&mut self, state: &AgentState) -> Result<RoundOutcome, AgentError> {
        self.status
            .set(|s| {
                s.status = "running".to_string();
                s.round = state.round;
                s.provider = state.provider.clone();
                s.model = if state.model.is_empty() {
                    None
                } else {
                    Some(state.model.clone())
                };
                s.error = None;
            })
            .await;

        let started_at = agentd_core::utils::timestamp();

        // Step 2: load provider + tools via the script loader.
        let loader = ScriptLoader::new(&self.workspace);
        let provider = loader
            .load_provider(&state.provider)
            .await
            .map_err(|e| AgentError::ScriptLoad(e.into()))?;
        let (tools, tool_defs) = self
            .registry
            .load_round()
            .await
            .map_err(|e| AgentError::ScriptLoad(e.into()))?;

        // Step 3: drain the queue, append as user messages, persist
        // immediately so inbound messages survive a crash before the LLM
        // responds.
        let inbound = self.queue.drain().await;
        let mut context = self
            .workspace
            .read_context()
            .await
            .map_err(AgentError::Unknown)?;
        for msg in &inbound {
            context.push(Message::user(format!("[{}] {}", msg.source, msg.content)));
        }
        self.workspace
            .write_context(&context)
            .await
            .map_err(AgentError::Unknown)?;

        // Step 4: prune/compact.
        context = memory::run(&self.workspace, context, &provider).await;
        self.workspace
            .write_context(&context)
            .await
            .map_err(AgentError::Unknown)?;

        // Step 5: assemble the system prompt.
        let system_prompt =
            crate::context::assemble_system_prompt(&self.workspace, &state.system_prompt).await;

        // Step 6: call the provider with retry.
        let mut call_messages = vec![Message::system(system_prompt)];
        call_messages.extend(context.iter().cloned());
        let model = if state.model.is_empty() {
            None
        } else {
            Some(state.model.as_str())
        };
        let response = self
            .call_provider_with_retry(&provider, &call_messages, &tool_defs, model)
            .await?;

        // Step 7: append the assistant message, dispatch tools concurrently.
        let tool_calls: Vec<ToolCall> = response.tool_calls.clone().unwrap_or_default();
        let assistant_msg = Message::assistant_with_calls(response.content.clone(), tool_calls.clone());
        context.push(assistant_msg.clone());

        let mut appended = vec![assistant_msg];
        let mut requested_wait = false;
        if !tool_calls.is_empty() {
            let (tool_messages, tool_results) = ToolRegistry::dispatch(&tools, &tool_calls).await;
            requested_wait = crate::tools::base::any_requested_wait(&tool_results);
            context.extend(tool_messages.clone());
            appended.extend(tool_messages);
        }

        // Step 8: persist context + a history record of only this round's
        // new messages.
        self.workspace
            .write_context(&context)
            .await
            .map_err(AgentError::Unknown)?;

        let finished_at = agentd_core::utils::timestamp();
        let record = RoundRecord {
            round: state.round,
            started_at,
            finished_at,
            provider: state.provider.clone(),
            model: if state.model.is_empty() {
                None
            } else {
                Some(state.model.clone())
            },
            inbound,
            messages_appended: appended,
            usage: response.usage.clone(),
            error: None,
        };
        self.workspace
            .write_history_record(&record)
            .await
            .map_err(AgentError::Unknown)?;

        // Step 9: re-read agent.json, bump only the round counter.
        self.workspace
            .bump_round()
            .await
            .map_err(AgentError::Unknown)?;

        // Step 10: nudge-on-empty-turn.
        if tool_calls.is_empty() {
            self.empty_turn_streak += 1;
            if self.empty_turn_streak <= MAX_NUDGES {
                self.queue
                    .push(QueueMessage::new("system:nudge", NUDGE_TEXT))
                    .await;
                return Ok(RoundOutcome::Continue);
            }
            return Ok(RoundOutcome::Wait);
        }
        self.empty_turn_streak = 0;

        // Step 11: wait if any tool requested it.
        if requested_wait {
            return Ok(RoundOutcome::Wait);
        }
        Ok(RoundOutcome::Continue)
    }

    async fn call_provider_with_retry(
        &self,
        provider: &agentd_scripts::ScriptProvider,
        messages: &[Message],
        tool_defs: &[agentd_core::ToolDefinition],
        model: Option<&str>,
    ) -> Result<agentd_core::LlmResponse, AgentError> {
        let mut last_err = None;
        for attempt in 0..MAX_RETRY_ATTEMPTS {
            match provider.chat(messages, tool_defs, model).await {
                Ok(resp) => return Ok(resp),
                Err(e) => {
                    warn!(attempt, error = %e, "provider call failed");
                    last_err = Some(e);
                    if let Some(delay) = RETRY_BACKOFF.get(attempt as usize) {
                        tokio::time::sleep(*delay).await;
                    }
                }
            }
        }
        Err(AgentError::LlmCall(anyhow::anyhow!(
            last_err.expect("at least one attempt recorded an error")
        )))
    }

    async fn enter_error_state(&self, err: &AgentError) {
        let timestamp = agentd_core::utils::timestamp();
        let detail = ErrorDetail {
            source: err.source_tag().to_string(),
            message: err.to_string(),
            stack: format!("{err:?}"),
            timestamp: timestamp.clone(),
        };
        error!(source = %detail.source, message = %detail.message, "entering error state");
        self.status
            .set(|s| {
                s.status = "error".to_string();
                s.error = Some(detail.clone());
            })
            .await;

        if let Some(url) = &self.repair_agent_url {
            let body = serde_json::json!({
                "content": format!("{}: {}", detail.source, detail.message),
                "source": "repair:worker",
                "metadata": {"timestamp": detail.timestamp, "stack": detail.stack},
            });
            // Best-effort notification — a dead parent doesn't change
            // this agent's repair behaviour.
            let _ = self.http.post(format!("{url}/message")).json(&body).send().await;
        }
    }

    /// Poll for `.repair-signal` or a clean script-probe every
    /// [`REPAIR_POLL_INTERVAL`] for up to [`REPAIR_TIMEOUT`]. Returns `Ok`
    /// once repaired; an error once the timeout is exceeded (fatal).
    async fn run_repair_loop(&self, original: &AgentError) -> anyhow::Result<()> {
        let deadline = tokio::time::Instant::now() + REPAIR_TIMEOUT;
        loop {
            tokio::time::sleep(REPAIR_POLL_INTERVAL).await;

            if self.workspace.has_repair_signal().await {
                self.workspace.consume_repair_signal().await?;
                info!("repair signal consumed, resuming");
                self.status.set(|s| s.status = "waiting".to_string()).await;
                return Ok(());
            }

            let state = self.workspace.read_agent_state().await?;
            let loader = ScriptLoader::new(&self.workspace);
            if loader.probe(&state.provider).await.is_ok() {
                info!("script probe succeeded, resuming");
                self.status.set(|s| s.status = "waiting".to_string()).await;
                return Ok(());
            }

            if tokio::time::Instant::now() >= deadline {
                return Err(anyhow::anyhow!(
                    "repair timeout exceeded after original {} error: {}",
                    original.source_tag(),
                    original
                ));
            }
        }
    }
}

enum RoundOutcome {
    Continue,
    Wait,
}
