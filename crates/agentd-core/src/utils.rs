//! Small string/path helpers shared across the workspace, trimmed down to
//! what this runtime actually needs once the `~/.oxibot` global data
//! directory concept (no workspace-local runtime has one — the workspace
//! path itself is the CLI's only configuration surface) drops out.

use std::path::PathBuf;

/// Current ISO 8601 timestamp, used throughout `agent.json`/history/crash
/// records.
pub fn timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Truncate a string to `max_len` characters, adding "..." if truncated.
/// Unicode-safe.
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", truncated)
    }
}

/// Expand a leading `~` to the home directory in a path string — used to
/// resolve the CLI's workspace-path argument.
pub fn expand_home(path: &str) -> PathBuf {
    if path.starts_with("~/") || path == "~" {
        let home = std::env::var("HOME")
            .ok()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));
        if path == "~" {
            home
        } else {
            home.join(&path[2..])
        }
    } else {
        PathBuf::from(path)
    }
}
