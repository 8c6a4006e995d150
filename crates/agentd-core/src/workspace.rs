//! The workspace state store — the only authoritative state in the system.
//! Every other component reads and writes through this type rather than
//! touching paths directly.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::warn;

use crate::types::{AgentState, Message, OutboxMessage, RoundRecord};

/// An entry in `routes.json`: `{"<prefix>": {"url": "..."}}`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Route {
    pub url: String,
}

pub type RoutesTable = HashMap<String, Route>;

/// Handle onto a workspace directory. Cheap to clone — just a `PathBuf`.
#[derive(Clone, Debug)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Workspace { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    // ── paths ──────────────────────────────────────────────

    pub fn agent_json_path(&self) -> PathBuf {
        self.root.join("agent.json")
    }

    pub fn prompt_md_path(&self) -> PathBuf {
        self.root.join("prompt.md")
    }

    pub fn routes_json_path(&self) -> PathBuf {
        self.root.join("routes.json")
    }

    pub fn providers_dir(&self) -> PathBuf {
        self.root.join("scripts").join("providers")
    }

    pub fn tools_dir(&self) -> PathBuf {
        self.root.join("scripts").join("tools")
    }

    pub fn skills_dir(&self) -> PathBuf {
        self.root.join("skills")
    }

    pub fn context_json_path(&self) -> PathBuf {
        self.root.join("memory").join("context.json")
    }

    pub fn summary_md_path(&self) -> PathBuf {
        self.root.join("memory").join("summary.md")
    }

    pub fn history_dir(&self) -> PathBuf {
        self.root.join("history")
    }

    pub fn history_path(&self, round: u64) -> PathBuf {
        self.history_dir().join(format!("round-{:05}.json", round))
    }

    pub fn outbox_dir(&self) -> PathBuf {
        self.root.join("outbox")
    }

    pub fn tool_output_dir(&self) -> PathBuf {
        self.root.join(".tool-output")
    }

    pub fn repair_signal_path(&self) -> PathBuf {
        self.root.join(".repair-signal")
    }

    pub fn crash_log_path(&self) -> PathBuf {
        self.root.join("crash.log")
    }

    /// Create every directory this workspace needs, idempotently. Does not
    /// touch files that already exist.
    pub async fn ensure_dirs(&self) -> anyhow::Result<()> {
        for dir in [
            self.root.clone(),
            self.providers_dir(),
            self.tools_dir(),
            self.skills_dir(),
            self.context_json_path().parent().unwrap().to_path_buf(),
            self.history_dir(),
            self.outbox_dir(),
            self.tool_output_dir(),
        ] {
            fs::create_dir_all(&dir).await?;
        }
        Ok(())
    }

    // ── agent.json ─────────────────────────────────────────

    pub async fn read_agent_state(&self) -> anyhow::Result<AgentState> {
        let raw = fs::read_to_string(self.agent_json_path()).await?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub async fn write_agent_state(&self, state: &AgentState) -> anyhow::Result<()> {
        let raw = serde_json::to_string_pretty(state)?;
        fs::write(self.agent_json_path(), raw).await?;
        Ok(())
    }

    /// Re-read `agent.json` from disk and bump only the round counter,
    /// preserving any concurrent self-edit to other fields.
    pub async fn bump_round(&self) -> anyhow::Result<AgentState> {
        let mut state = self.read_agent_state().await?;
        state.round += 1;
        self.write_agent_state(&state).await?;
        Ok(state)
    }

    // ── routes.json ────────────────────────────────────────

    pub async fn read_routes(&self) -> anyhow::Result<RoutesTable> {
        match fs::read_to_string(self.routes_json_path()).await {
            Ok(raw) => Ok(serde_json::from_str(&raw)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(RoutesTable::new()),
            Err(e) => Err(e.into()),
        }
    }

    // ── memory/context.json ────────────────────────────────

    pub async fn read_context(&self) -> anyhow::Result<Vec<Message>> {
        match fs::read_to_string(self.context_json_path()).await {
            Ok(raw) if raw.trim().is_empty() => Ok(Vec::new()),
            Ok(raw) => Ok(serde_json::from_str(&raw)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn write_context(&self, messages: &[Message]) -> anyhow::Result<()> {
        let raw = serde_json::to_string_pretty(messages)?;
        fs::write(self.context_json_path(), raw).await?;
        Ok(())
    }

    pub async fn append_summary(&self, text: &str) -> anyhow::Result<()> {
        use tokio::io::AsyncWriteExt;
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.summary_md_path())
            .await?;
        file.write_all(text.as_bytes()).await?;
        if !text.ends_with('\n') {
            file.write_all(b"\n").await?;
        }
        Ok(())
    }

    // ── history ─────────────────────────────────────────────

    pub async fn write_history_record(&self, record: &RoundRecord) -> anyhow::Result<()> {
        let raw = serde_json::to_string_pretty(record)?;
        fs::write(self.history_path(record.round), raw).await?;
        Ok(())
    }

    pub async fn read_history_record(&self, round: u64) -> anyhow::Result<Option<RoundRecord>> {
        match fs::read_to_string(self.history_path(round)).await {
            Ok(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// List every round number with a history file on disk, ascending.
    pub async fn list_history_rounds(&self) -> anyhow::Result<Vec<u64>> {
        let mut rounds = Vec::new();
        let mut entries = match fs::read_dir(self.history_dir()).await {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(rounds),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if let Some(stripped) = name
                .strip_prefix("round-")
                .and_then(|s| s.strip_suffix(".json"))
            {
                if let Ok(n) = stripped.parse::<u64>() {
                    rounds.push(n);
                }
            }
        }
        rounds.sort_unstable();
        Ok(rounds)
    }

    /// Delete every `history/round-*.json` file — used by the worker
    /// inherited-state reset.
    pub async fn clear_history(&self) -> anyhow::Result<()> {
        for round in self.list_history_rounds().await? {
            let _ = fs::remove_file(self.history_path(round)).await;
        }
        Ok(())
    }

    // ── outbox ──────────────────────────────────────────────

    pub async fn write_outbox(&self, message: &OutboxMessage) -> anyhow::Result<()> {
        let path = self.outbox_dir().join(format!("{}.json", message.id));
        let raw = serde_json::to_string_pretty(message)?;
        fs::write(path, raw).await?;
        Ok(())
    }

    pub async fn list_outbox(&self) -> anyhow::Result<Vec<OutboxMessage>> {
        let mut messages = Vec::new();
        let mut entries = match fs::read_dir(self.outbox_dir()).await {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(messages),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let raw = fs::read_to_string(&path).await?;
            match serde_json::from_str::<OutboxMessage>(&raw) {
                Ok(msg) => messages.push(msg),
                Err(e) => warn!(path = %path.display(), error = %e, "skipping malformed outbox entry"),
            }
        }
        messages.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        Ok(messages)
    }

    /// Remove one outbox entry by id. Returns `true` if a file was removed.
    pub async fn delete_outbox(&self, id: &str) -> anyhow::Result<bool> {
        let path = self.outbox_dir().join(format!("{}.json", id));
        match fs::remove_file(path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    // ── repair signal ───────────────────────────────────────

    pub async fn has_repair_signal(&self) -> bool {
        fs::metadata(self.repair_signal_path()).await.is_ok()
    }

    pub async fn write_repair_signal(&self) -> anyhow::Result<()> {
        fs::write(self.repair_signal_path(), b"").await?;
        Ok(())
    }

    /// Remove the repair signal file if present. Idempotent.
    pub async fn consume_repair_signal(&self) -> anyhow::Result<()> {
        match fs::remove_file(self.repair_signal_path()).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    // ── crash log ───────────────────────────────────────────

    pub async fn append_crash_line(&self, line: &str) -> anyhow::Result<()> {
        use tokio::io::AsyncWriteExt;
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.crash_log_path())
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.write_all(b"\n").await?;
        Ok(())
    }

    pub async fn last_crash_line(&self) -> anyhow::Result<Option<String>> {
        match fs::read_to_string(self.crash_log_path()).await {
            Ok(raw) => Ok(raw.lines().last().map(|s| s.to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Message;

    fn workspace() -> (tempfile::TempDir, Workspace) {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::new(dir.path());
        (dir, ws)
    }

    #[tokio::test]
    async fn ensure_dirs_creates_the_full_layout() {
        let (_dir, ws) = workspace();
        ws.ensure_dirs().await.unwrap();
        assert!(ws.providers_dir().is_dir());
        assert!(ws.tools_dir().is_dir());
        assert!(ws.history_dir().is_dir());
        assert!(ws.outbox_dir().is_dir());
        assert!(ws.tool_output_dir().is_dir());
    }

    #[tokio::test]
    async fn agent_state_round_trips_through_disk() {
        let (_dir, ws) = workspace();
        ws.ensure_dirs().await.unwrap();
        let state = AgentState {
            provider: "mock".into(),
            model: "m1".into(),
            round: 0,
            max_rounds: None,
            system_prompt: "hello".into(),
            role: "worker".into(),
        };
        ws.write_agent_state(&state).await.unwrap();
        let loaded = ws.read_agent_state().await.unwrap();
        assert_eq!(loaded, state);
    }

    #[tokio::test]
    async fn bump_round_preserves_concurrent_field_edits() {
        let (_dir, ws) = workspace();
        ws.ensure_dirs().await.unwrap();
        let state = AgentState {
            provider: "mock".into(),
            model: "m1".into(),
            round: 3,
            max_rounds: None,
            system_prompt: "hello".into(),
            role: "worker".into(),
        };
        ws.write_agent_state(&state).await.unwrap();

        // simulate the agent self-editing `model` mid-round
        let mut edited = ws.read_agent_state().await.unwrap();
        edited.model = "m2".into();
        ws.write_agent_state(&edited).await.unwrap();

        let bumped = ws.bump_round().await.unwrap();
        assert_eq!(bumped.round, 4);
        assert_eq!(bumped.model, "m2");
    }

    #[tokio::test]
    async fn missing_routes_json_yields_empty_table() {
        let (_dir, ws) = workspace();
        let routes = ws.read_routes().await.unwrap();
        assert!(routes.is_empty());
    }

    #[tokio::test]
    async fn context_round_trips_messages() {
        let (_dir, ws) = workspace();
        ws.ensure_dirs().await.unwrap();
        let messages = vec![Message::user("hi"), Message::assistant("hello")];
        ws.write_context(&messages).await.unwrap();
        let loaded = ws.read_context().await.unwrap();
        assert_eq!(loaded, messages);
    }

    #[tokio::test]
    async fn outbox_write_list_delete_round_trip() {
        let (_dir, ws) = workspace();
        ws.ensure_dirs().await.unwrap();
        let msg = OutboxMessage::new("other:s2", "hello");
        ws.write_outbox(&msg).await.unwrap();

        let listed = ws.list_outbox().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, msg.id);

        assert!(ws.delete_outbox(&msg.id).await.unwrap());
        assert!(!ws.delete_outbox(&msg.id).await.unwrap());
        assert!(ws.list_outbox().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn repair_signal_write_and_consume() {
        let (_dir, ws) = workspace();
        assert!(!ws.has_repair_signal().await);
        ws.write_repair_signal().await.unwrap();
        assert!(ws.has_repair_signal().await);
        ws.consume_repair_signal().await.unwrap();
        assert!(!ws.has_repair_signal().await);
        // consuming twice is a no-op, not an error
        ws.consume_repair_signal().await.unwrap();
    }

    #[tokio::test]
    async fn history_round_trip_and_listing() {
        let (_dir, ws) = workspace();
        ws.ensure_dirs().await.unwrap();
        let record = RoundRecord {
            round: 1,
            started_at: "t0".into(),
            finished_at: "t1".into(),
            provider: "anthropic".into(),
            model: None,
            inbound: vec![],
            messages_appended: vec![Message::user("hi")],
            usage: None,
            error: None,
        };
        ws.write_history_record(&record).await.unwrap();
        let loaded = ws.read_history_record(1).await.unwrap().unwrap();
        assert_eq!(loaded.round, 1);
        assert!(ws.read_history_record(2).await.unwrap().is_none());
        assert_eq!(ws.list_history_rounds().await.unwrap(), vec![1]);
    }

    #[tokio::test]
    async fn clear_history_removes_all_round_files() {
        let (_dir, ws) = workspace();
        ws.ensure_dirs().await.unwrap();
        for round in [1, 2, 3] {
            let record = RoundRecord {
                round,
                started_at: "t0".into(),
                finished_at: "t1".into(),
                provider: "anthropic".into(),
                model: None,
                inbound: vec![],
                messages_appended: vec![],
                usage: None,
                error: None,
            };
            ws.write_history_record(&record).await.unwrap();
        }
        ws.clear_history().await.unwrap();
        assert!(ws.list_history_rounds().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn crash_log_appends_and_reads_last_line() {
        let (_dir, ws) = workspace();
        ws.append_crash_line(r#"{"n":1}"#).await.unwrap();
        ws.append_crash_line(r#"{"n":2}"#).await.unwrap();
        let last = ws.last_crash_line().await.unwrap().unwrap();
        assert_eq!(last, r#"{"n":2}"#);
    }
}
