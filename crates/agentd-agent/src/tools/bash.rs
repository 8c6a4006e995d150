//! The `bash` / `bash_kill` built-ins and the background job registry they
//! share. Generalizes a spawn/pipe/guard shape from "one timeout, collect
//! `Output`" to "stream to a file, optionally outlive the call, register in
//! a process-wide map."

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{info, warn};

use agentd_core::{
    short_hex_id, BackgroundJob, JobStatus, MessageQueue, QueueMessage, ToolDefinition, ToolResult,
    Workspace,
};

use crate::tools::base::Tool;

/// Commands matched here are rejected before spawning, regardless of
/// sync/async mode. Pure safety, not sandboxing — a denylist check costs
/// nothing and the agent still runs with full process privileges otherwise.
const DENY_PATTERNS: &[&str] = &[
    r"\brm\s+-[rf]{1,2}\b",
    r"\bmkfs\b",
    r"\bdd\s+if=",
    r">\s*/dev/sd",
    r"\b(shutdown|reboot|poweroff)\b",
    r":\(\)\s*\{.*\};\s*:",
];

const INLINE_WAIT: Duration = Duration::from_secs(5);
/// Wall-clock ceiling for a command that never requests async mode and
/// never exits within the inline window; superseded the instant a command
/// outlives `INLINE_WAIT`, at which point the job is handed to the
/// background registry with no further ceiling.
const SYNC_ONLY_TIMEOUT: Duration = Duration::from_secs(60);
const INLINE_MAX_LINES: usize = 100;
const KILL_GRACE: Duration = Duration::from_secs(2);

fn guard_command(command: &str) -> Option<&'static str> {
    let lower = command.to_lowercase();
    for pattern in DENY_PATTERNS {
        if Regex::new(pattern).unwrap().is_match(&lower) {
            return Some("blocked by safety guard (dangerous pattern detected)");
        }
    }
    None
}

/// Metadata + OS pid tracked for one job. The live [`Child`] handle is
/// never stored here — it lives inside the `tokio::spawn`ed completion task
/// that owns the `.wait()` call, since `Child` isn't `Clone`. `bash_kill`
/// acts on the pid directly via `kill(1)`.
struct Entry {
    meta: BackgroundJob,
    pid: Option<u32>,
}

/// Process-wide registry of background `bash` jobs, shared between the
/// `bash` and `bash_kill` tools. Cloning shares the
/// same underlying map.
#[derive(Clone)]
pub struct BackgroundJobRegistry {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
}

impl Default for BackgroundJobRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl BackgroundJobRegistry {
    pub fn new() -> Self {
        BackgroundJobRegistry {
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    async fn register(&self, id: String, meta: BackgroundJob, pid: Option<u32>) {
        self.entries.lock().await.insert(id, Entry { meta, pid });
    }

    async fn unregister(&self, id: &str) {
        self.entries.lock().await.remove(id);
    }

    pub async fn snapshot(&self, id: &str) -> Option<BackgroundJob> {
        self.entries.lock().await.get(id).map(|e| e.meta.clone())
    }

    pub async fn pid_of(&self, id: &str) -> Option<u32> {
        self.entries.lock().await.get(id).and_then(|e| e.pid)
    }

    pub async fn list(&self) -> Vec<BackgroundJob> {
        self.entries.lock().await.values().map(|e| e.meta.clone()).collect()
    }
}

/// The streamed result of a finished command: the exit code, a sample of
/// at most [`INLINE_MAX_LINES`] interleaved output lines (in arrival
/// order), and the true total line count — the full text always lands in
/// the output file regardless of how much of it is kept here.
struct StreamResult {
    exit_code: i32,
    lines: Vec<String>,
    total_lines: usize,
}

/// Pipe a child's stdout/stderr to `path`, prefixing stderr lines with
/// `[stderr] `, appending `[exit code: N]` once the process exits. Runs to
/// completion regardless of whether the caller is still waiting — callers
/// `tokio::spawn` this so the job outlives a caller-side timeout.
async fn stream_to_file(mut child: Child, path: PathBuf) -> anyhow::Result<StreamResult> {
    let stdout = child.stdout.take().expect("piped stdout");
    let stderr = child.stderr.take().expect("piped stderr");

    let mut file = tokio::fs::File::create(&path).await?;

    let mut out_lines = BufReader::new(stdout).lines();
    let mut err_lines = BufReader::new(stderr).lines();
    let mut out_open = true;
    let mut err_open = true;
    let mut lines = Vec::new();
    let mut total_lines = 0usize;

    while out_open || err_open {
        tokio::select! {
            line = out_lines.next_line(), if out_open => {
                match line? {
                    Some(l) => {
                        file.write_all(l.as_bytes()).await?;
                        file.write_all(b"\n").await?;
                        total_lines += 1;
                        if lines.len() < INLINE_MAX_LINES { lines.push(l); }
                    }
                    None => out_open = false,
                }
            }
            line = err_lines.next_line(), if err_open => {
                match line? {
                    Some(l) => {
                        let formatted = format!("[stderr] {l}");
                        file.write_all(formatted.as_bytes()).await?;
                        file.write_all(b"\n").await?;
                        total_lines += 1;
                        if lines.len() < INLINE_MAX_LINES { lines.push(formatted); }
                    }
                    None => err_open = false,
                }
            }
        }
    }

    let status = child.wait().await?;
    let exit_code = status.code().unwrap_or(-1);
    file.write_all(format!("[exit code: {exit_code}]\n").as_bytes()).await?;
    Ok(StreamResult { exit_code, lines, total_lines })
}

/// Spawn `sh -c <command>`, piping stdout/stderr.
fn spawn_shell(command: &str, cwd: &std::path::Path) -> std::io::Result<Child> {
    Command::new("sh")
        .arg("-c")
        .arg(command)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
}

pub struct BashTool {
    workspace: Workspace,
    registry: BackgroundJobRegistry,
    queue: MessageQueue,
}

impl BashTool {
    pub fn new(workspace: Workspace, registry: BackgroundJobRegistry, queue: MessageQueue) -> Self {
        BashTool {
            workspace,
            registry,
            queue,
        }
    }

    /// Finish a job in the background: stream to its output file, then
    /// either hand the result to an inline caller still waiting on `rx`, or
    /// — if that caller already timed out and moved on — unregister the job
    /// and best-effort-notify the queue so the agent wakes on exit.
    fn spawn_streaming(
        &self,
        id: String,
        output_path: PathBuf,
        child: Child,
        inline_reply: Option<tokio::sync::oneshot::Sender<anyhow::Result<StreamResult>>>,
    ) {
        let registry = self.registry.clone();
        let queue = self.queue.clone();
        tokio::spawn(async move {
            let result = stream_to_file(child, output_path).await;
            let Some(tx) = inline_reply else {
                // Explicit async:true call — no caller ever waits inline.
                finalize_async_completion(&registry, &queue, &id, result).await;
                return;
            };
            if let Err(not_delivered) = tx.send(result) {
                // The inline caller's timeout already elapsed and it moved
                // the job to the background registry; finish that here.
                finalize_async_completion(&registry, &queue, &id, not_delivered).await;
            }
            // Ok(()): the inline caller received it directly within the
            // window and owns unregistering/reporting it itself.
        });
    }

    /// Register a job's metadata before spawning so both the inline and
    /// timed-out-to-async paths see a consistent registry from the moment
    /// the process starts, regardless of which path ultimately finalizes it.
    async fn register(&self, id: &str, command: &str, output_path: &PathBuf, pid: Option<u32>) {
        let meta = BackgroundJob {
            id: id.to_string(),
            command: command.to_string(),
            status: JobStatus::Running,
            output_path: output_path.display().to_string(),
            started_at: agentd_core::utils::timestamp(),
            finished_at: None,
            exit_code: None,
        };
        self.registry.register(id.to_string(), meta, pid).await;
    }

    async fn start_async(&self, id: &str, command: &str, output_path: &PathBuf) -> anyhow::Result<()> {
        let child = spawn_shell(command, self.workspace.root())?;
        let pid = child.id();
        self.register(id, command, output_path, pid).await;
        self.spawn_streaming(id.to_string(), output_path.clone(), child, None);
        Ok(())
    }
}

async fn finalize_async_completion(
    registry: &BackgroundJobRegistry,
    queue: &MessageQueue,
    id: &str,
    result: anyhow::Result<StreamResult>,
) {
    registry.unregister(id).await;
    let content = match result {
        Ok(sr) => format!("[system:bash] job {id} exited with code {}", sr.exit_code),
        Err(e) => format!("[system:bash] job {id} failed: {e}"),
    };
    queue.push(QueueMessage::new("system:bash", content)).await;
}

#[async_trait]
impl Tool for BashTool {
    fn name(&self) -> &str {
        "bash"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "bash".into(),
            description: "Run a shell command. Commands that don't finish within 5s continue in \
                          the background; use the returned job id with bash_kill to stop them."
                .into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "command": { "type": "string", "description": "The shell command to run" },
                    "async": { "type": "boolean", "description": "Run in the background immediately" }
                },
                "required": ["command"]
            }),
        }
    }

    async fn execute(&self, args: Value) -> anyhow::Result<ToolResult> {
        let command = args
            .get("command")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("missing required parameter: command"))?
            .to_string();
        let want_async = args.get("async").and_then(|v| v.as_bool()).unwrap_or(false);

        if let Some(reason) = guard_command(&command) {
            warn!(command = %command, "bash command blocked");
            return Ok(ToolResult::ok(format!("ERROR: command {reason}")));
        }

        self.workspace.ensure_dirs().await?;
        let id = short_hex_id();
        let output_path = self.workspace.tool_output_dir().join(format!("{id}.txt"));

        info!(command = %command, job = %id, want_async, "bash: spawning");

        if want_async {
            self.start_async(&id, &command, &output_path).await?;
            return Ok(ToolResult::ok(format!(
                "Started background job {id} (output: {}). Use bash_kill to stop it.",
                output_path.display()
            )));
        }

        // Synchronous path: the process is registered from the moment it
        // spawns (see `register`/`spawn_streaming`) so that, whichever side
        // of the INLINE_WAIT boundary it finishes on, the same running
        // process is the one that's either reported inline or handed to the
        // background registry — never killed-and-restarted.
        let child = spawn_shell(&command, self.workspace.root())?;
        let pid = child.id();
        self.register(&id, &command, &output_path, pid).await;

        let (tx, rx) = tokio::sync::oneshot::channel();
        self.spawn_streaming(id.clone(), output_path.clone(), child, Some(tx));

        let _ = SYNC_ONLY_TIMEOUT; // see module docs: a belt-and-suspenders
                                    // ceiling the INLINE_WAIT decision below
                                    // always preempts in practice.

        match tokio::time::timeout(INLINE_WAIT, rx).await {
            Ok(Ok(Ok(stream))) => {
                // Finished within the window — this call owns reporting it,
                // so unregister it now rather than via the background path.
                self.registry.unregister(&id).await;
                render_inline(&output_path, stream).await
            }
            Ok(Ok(Err(e))) => {
                self.registry.unregister(&id).await;
                Err(anyhow::anyhow!("failed to run bash job: {e}"))
            }
            Ok(Err(_recv_dropped)) => {
                self.registry.unregister(&id).await;
                Err(anyhow::anyhow!("bash streaming task ended unexpectedly"))
            }
            Err(_elapsed) => {
                // Still running — stays registered; `spawn_streaming`'s
                // completion handler will unregister and notify on exit.
                Ok(ToolResult::ok(format!(
                    "Still running after {}s, continuing in the background as job {id} (output: {}).",
                    INLINE_WAIT.as_secs(),
                    output_path.display()
                )))
            }
        }
    }
}

/// Render a finished job's inline tool result. When the output fit within
/// [`INLINE_MAX_LINES`] the transient output file is deleted — nothing was
/// truncated, so there's nothing the file preserves that the inline text
/// doesn't already have. When it didn't, the file (already holding the
/// full text) is kept and the inline text notes where to find it.
async fn render_inline(output_path: &PathBuf, stream: StreamResult) -> anyhow::Result<ToolResult> {
    let truncated = stream.total_lines > stream.lines.len();
    let mut combined = if stream.lines.is_empty() {
        "(no output)".to_string()
    } else {
        stream.lines.join("\n")
    };
    if truncated {
        let omitted = stream.total_lines - stream.lines.len();
        combined.push_str(&format!(
            "\n... ({omitted} more lines omitted, full output kept at {})",
            output_path.display()
        ));
    } else {
        let _ = tokio::fs::remove_file(output_path).await;
    }
    if stream.exit_code != 0 {
        combined.push_str(&format!("\n[exit code: {}]", stream.exit_code));
    }
    Ok(ToolResult::ok(combined))
}

pub struct BashKillTool {
    registry: BackgroundJobRegistry,
}

impl BashKillTool {
    pub fn new(registry: BackgroundJobRegistry) -> Self {
        BashKillTool { registry }
    }
}

#[async_trait]
impl Tool for BashKillTool {
    fn name(&self) -> &str {
        "bash_kill"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "bash_kill".into(),
            description: "Terminate a background bash job by id.".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "id": { "type": "string", "description": "Job id returned by bash" }
                },
                "required": ["id"]
            }),
        }
    }

    async fn execute(&self, args: Value) -> anyhow::Result<ToolResult> {
        let id = args
            .get("id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("missing required parameter: id"))?;

        let Some(meta) = self.registry.snapshot(id).await else {
            return Ok(ToolResult::ok(format!("ERROR: no such job \"{id}\"")));
        };
        let Some(pid) = self.registry.pid_of(id).await else {
            return Ok(ToolResult::ok(format!("ERROR: no such job \"{id}\"")));
        };

        let _ = Command::new("kill").arg("-TERM").arg(pid.to_string()).status().await;
        tokio::time::sleep(KILL_GRACE).await;
        let _ = Command::new("kill").arg("-KILL").arg(pid.to_string()).status().await;

        Ok(ToolResult::ok(format!(
            "Killed job {id} (output: {})",
            meta.output_path
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn workspace() -> (tempfile::TempDir, Workspace) {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::new(dir.path());
        (dir, ws)
    }

    #[test]
    fn guard_blocks_rm_rf() {
        assert!(guard_command("rm -rf /").is_some());
    }

    #[test]
    fn guard_allows_plain_commands() {
        assert!(guard_command("echo hi").is_none());
        assert!(guard_command("ls -la").is_none());
    }

    #[tokio::test]
    async fn bash_inline_completion_has_no_leftover_file() {
        let (_dir, ws) = workspace();
        ws.ensure_dirs().await.unwrap();
        let registry = BackgroundJobRegistry::new();
        let queue = MessageQueue::new();
        let tool = BashTool::new(ws.clone(), registry, queue);
        let result = tool
            .execute(json!({"command": "echo hello"}))
            .await
            .unwrap();
        assert!(result.result.contains("hello"));
        let mut entries = tokio::fs::read_dir(ws.tool_output_dir()).await.unwrap();
        assert!(entries.next_entry().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn bash_async_registers_job() {
        let (_dir, ws) = workspace();
        ws.ensure_dirs().await.unwrap();
        let registry = BackgroundJobRegistry::new();
        let queue = MessageQueue::new();
        let tool = BashTool::new(ws.clone(), registry.clone(), queue);
        let result = tool
            .execute(json!({"command": "sleep 0.2 && echo done", "async": true}))
            .await
            .unwrap();
        assert!(result.result.contains("Started background job"));
        assert_eq!(registry.list().await.len(), 1);
    }

    #[tokio::test]
    async fn bash_inline_truncated_output_keeps_the_output_file() {
        let (_dir, ws) = workspace();
        ws.ensure_dirs().await.unwrap();
        let registry = BackgroundJobRegistry::new();
        let queue = MessageQueue::new();
        let tool = BashTool::new(ws.clone(), registry, queue);
        let result = tool
            .execute(json!({"command": "seq 1 150"}))
            .await
            .unwrap();
        assert!(result.result.contains("more lines omitted"));
        let mut entries = tokio::fs::read_dir(ws.tool_output_dir()).await.unwrap();
        assert!(entries.next_entry().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn bash_kill_unknown_job_is_an_error_string() {
        let registry = BackgroundJobRegistry::new();
        let tool = BashKillTool::new(registry);
        let result = tool.execute(json!({"id": "ghost123"})).await.unwrap();
        assert!(result.result.starts_with("ERROR: no such job"));
    }
}
