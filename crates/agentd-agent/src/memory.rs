//! The memory manager: pruning, LLM-driven compaction, and tool-pair repair
//! over the persisted conversation context.
//!
//! This is unrelated to long-term agent-authored notes (a `MEMORY.md` plus
//! daily notes the agent writes to itself) — that's agent-authored
//! knowledge, not context-window management, so the pruning/compaction
//! algorithm here is built fresh against a fixed set of char-budget
//! thresholds. The chunked summarization call reuses `ScriptProvider::chat`
//! the same way the executor loop's main turn does, keeping the provider
//! call call-site-agnostic.

use agentd_core::Message;
use agentd_scripts::ScriptProvider;
use tracing::{info, warn};

const SOFT_PRUNE_THRESHOLD: usize = 80_000;
const HARD_PRUNE_THRESHOLD: usize = 120_000;
const COMPACTION_THRESHOLD: usize = 160_000;
const COMPACTION_CHUNK_SIZE: usize = 30_000;
const SOFT_TRIM_RESULT_LEN: usize = 4_000;
const SOFT_TRIM_HEAD: usize = 1_500;
const SOFT_TRIM_TAIL: usize = 1_500;
const HARD_CLEAR_RESULT_LEN: usize = 100;
const HARD_CLEAR_PLACEHOLDER: &str = "[Tool result cleared to save context space]";
const REPAIR_PLACEHOLDER: &str = "[Result cleared during context compaction]";
const TRAILING_ASSISTANT_PROTECTED: usize = 3;

const SUMMARIZER_SYSTEM_PROMPT: &str = "Summarize the following conversation excerpt concisely, \
    preserving facts, decisions, and open threads the agent will need later. Write plain prose, \
    no preamble.";

fn total_chars(context: &[Message]) -> usize {
    context.iter().map(Message::char_len).sum()
}

/// Index of the first message that is NOT protected from pruning: the
/// boundary before the last [`TRAILING_ASSISTANT_PROTECTED`] assistant
/// messages.
fn prune_cutoff(context: &[Message]) -> usize {
    let mut seen = 0;
    for (idx, msg) in context.iter().enumerate().rev() {
        if matches!(msg, Message::Assistant { .. }) {
            seen += 1;
            if seen == TRAILING_ASSISTANT_PROTECTED {
                return idx;
            }
        }
    }
    0
}

fn soft_trim(content: &str) -> String {
    let head: String = content.chars().take(SOFT_TRIM_HEAD).collect();
    let tail: String = content
        .chars()
        .rev()
        .take(SOFT_TRIM_TAIL)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    format!(
        "{head}\n...[trimmed {} chars to save context space]...\n{tail}",
        content.chars().count().saturating_sub(SOFT_TRIM_HEAD + SOFT_TRIM_TAIL)
    )
}

/// Pruning: soft-trim or hard-clear tool results
/// earlier than the protected trailing window, in place. Returns the total
/// char count after pruning so the caller can decide whether to compact.
pub fn prune(context: &mut [Message]) -> usize {
    let before = total_chars(context);
    if before < SOFT_PRUNE_THRESHOLD {
        return before;
    }

    let cutoff = prune_cutoff(context);
    let hard = before >= HARD_PRUNE_THRESHOLD;

    for msg in context.iter_mut().take(cutoff) {
        if let Message::Tool { content, .. } = msg {
            if hard {
                if content.len() > HARD_CLEAR_RESULT_LEN {
                    *content = HARD_CLEAR_PLACEHOLDER.to_string();
                }
            } else if content.len() > SOFT_TRIM_RESULT_LEN {
                *content = soft_trim(content);
            }
        }
    }

    let after = total_chars(context);
    info!(before, after, hard, "pruned context");
    after
}

/// Tool-pair repair: drop orphaned/duplicate tool
/// messages and insert placeholders for assistant tool calls missing a
/// result, so the next provider call never sees a broken pairing.
pub fn repair_tool_pairs(context: Vec<Message>) -> Vec<Message> {
    use std::collections::HashSet;

    let mut known_call_ids: HashSet<String> = HashSet::new();
    for msg in &context {
        if let Message::Assistant {
            tool_calls: Some(calls),
            ..
        } = msg
        {
            for call in calls {
                known_call_ids.insert(call.id.clone());
            }
        }
    }

    // Ids that have a real tool message *somewhere* in the context, computed
    // up front so the assistant branch below knows not to synthesize a
    // placeholder for a call whose result simply hasn't been reached yet in
    // iteration order.
    let mut result_ids: HashSet<String> = HashSet::new();
    for msg in &context {
        if let Message::Tool { tool_call_id, .. } = msg {
            result_ids.insert(tool_call_id.clone());
        }
    }

    let mut seen_tool_ids: HashSet<String> = HashSet::new();
    let mut repaired: Vec<Message> = Vec::with_capacity(context.len());

    for msg in context {
        match &msg {
            Message::Tool { tool_call_id, .. } => {
                if !known_call_ids.contains(tool_call_id) || seen_tool_ids.contains(tool_call_id) {
                    continue; // drop orphan or duplicate
                }
                seen_tool_ids.insert(tool_call_id.clone());
                repaired.push(msg);
            }
            Message::Assistant {
                tool_calls: Some(calls),
                ..
            } => {
                repaired.push(msg.clone());
                for call in calls {
                    if !result_ids.contains(&call.id) {
                        repaired.push(Message::tool_result(call.id.clone(), REPAIR_PLACEHOLDER));
                    }
                }
            }
            _ => repaired.push(msg),
        }
    }

    repaired
}

/// Splits `messages` into chunks of at most [`COMPACTION_CHUNK_SIZE`] chars,
/// never splitting inside a message.
fn chunk_for_summary<'a>(messages: &'a [Message]) -> Vec<Vec<&'a Message>> {
    let mut chunks: Vec<Vec<&Message>> = Vec::new();
    let mut current: Vec<&Message> = Vec::new();
    let mut current_len = 0usize;

    for msg in messages {
        let len = msg.char_len();
        if current_len + len > COMPACTION_CHUNK_SIZE && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }
        current_len += len;
        current.push(msg);
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

fn render_chunk(chunk: &[&Message]) -> String {
    chunk
        .iter()
        .map(|m| match m {
            Message::System { content } => format!("[system] {content}"),
            Message::User { content } => format!("[user] {content}"),
            Message::Assistant { content, tool_calls } => {
                let text = content.as_deref().unwrap_or("");
                let calls = tool_calls
                    .iter()
                    .flatten()
                    .map(|c| format!("{}({})", c.name, c.args))
                    .collect::<Vec<_>>()
                    .join(", ");
                if calls.is_empty() {
                    format!("[assistant] {text}")
                } else {
                    format!("[assistant] {text} <tool calls: {calls}>")
                }
            }
            Message::Tool { content, .. } => format!("[tool result] {content}"),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Choose the split index for compaction: target the start of the last
/// third of messages, then walk forward to the next `User` message so a
/// tool-call/tool-result pairing is never split across the boundary.
fn compaction_split_index(context: &[Message]) -> usize {
    let target = context.len() - context.len() / 3;
    let mut idx = target.min(context.len());
    while idx < context.len() && !matches!(context[idx], Message::User { .. }) {
        idx += 1;
    }
    idx
}

/// Compaction: summarise the prefix before the split
/// index via the provider, append the summary to `memory/summary.md`, and
/// replace the prefix with a single synthetic user message. Best-effort: a
/// provider failure here is logged and the caller continues with the
/// pruned-but-uncompacted context.
pub async fn compact(
    workspace: &agentd_core::Workspace,
    context: Vec<Message>,
    provider: &ScriptProvider,
) -> Vec<Message> {
    let split = compaction_split_index(&context);
    if split == 0 {
        return context;
    }
    let (prefix, suffix) = context.split_at(split);
    let chunks = chunk_for_summary(prefix);

    let mut partials = Vec::with_capacity(chunks.len());
    for chunk in &chunks {
        let rendered = render_chunk(chunk);
        let request = vec![
            Message::system(SUMMARIZER_SYSTEM_PROMPT),
            Message::user(rendered),
        ];
        match provider.chat(&request, &[], None).await {
            Ok(resp) => partials.push(resp.content.unwrap_or_default()),
            Err(e) => {
                warn!(error = %e, "compaction chunk summary failed; keeping pruned context");
                return context.clone();
            }
        }
    }

    let summary = partials.join("\n\n");
    if let Err(e) = workspace.append_summary(&summary).await {
        warn!(error = %e, "failed to append compaction summary to summary.md");
    }

    let mut result = vec![Message::user(format!("[Previous context summary]\n{summary}"))];
    result.extend_from_slice(suffix);
    result
}

/// Runs pruning, then compaction if the pruned context is still over
/// [`COMPACTION_THRESHOLD`], then tool-pair repair — the full memory-manager
/// pass the executor loop runs once per round.
pub async fn run(
    workspace: &agentd_core::Workspace,
    mut context: Vec<Message>,
    provider: &ScriptProvider,
) -> Vec<Message> {
    let pruned_chars = prune(&mut context);
    if pruned_chars >= COMPACTION_THRESHOLD {
        context = compact(workspace, context, provider).await;
    }
    repair_tool_pairs(context)
}
