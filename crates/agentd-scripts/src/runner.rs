//! Subprocess invocation shared by providers and tools. Every call spawns a
//! fresh `node <script> <command> [json-arg]` process and parses one JSON
//! object from stdout.
//!
//! There is deliberately no module cache: a fresh process per call is what
//! makes edits to the `.js` file observable on the very next round.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use thiserror::Error;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, error, warn};

/// Wall-clock budget for one script invocation. Provider calls have their
/// own retry policy above this layer; this timeout
/// only guards against a genuinely hung subprocess.
const SCRIPT_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("failed to spawn script {path}: {source}")]
    Spawn {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("script {path} timed out after {secs}s")]
    Timeout { path: String, secs: u64 },

    #[error("script {path} exited with status {code}: {stderr}")]
    NonZeroExit {
        path: String,
        code: i32,
        stderr: String,
    },

    #[error("script {path} produced invalid JSON on stdout: {source}")]
    InvalidJson {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Run `node <path> <command> [arg]`, returning parsed JSON from stdout.
pub async fn run_json<T: serde::de::DeserializeOwned>(
    path: &Path,
    command: &str,
    arg: Option<&str>,
) -> Result<T, ScriptError> {
    let path_str = path.display().to_string();
    debug!(path = %path_str, command, "spawning script");
    let mut cmd = Command::new("node");
    cmd.arg(path);
    cmd.arg(command);
    if let Some(arg) = arg {
        cmd.arg(arg);
    }
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());

    let child = cmd.spawn().map_err(|source| ScriptError::Spawn {
        path: path_str.clone(),
        source,
    })?;

    let output = timeout(SCRIPT_TIMEOUT, child.wait_with_output())
        .await
        .map_err(|_| {
            warn!(path = %path_str, secs = SCRIPT_TIMEOUT.as_secs(), "script timed out");
            ScriptError::Timeout {
                path: path_str.clone(),
                secs: SCRIPT_TIMEOUT.as_secs(),
            }
        })?
        .map_err(|source| ScriptError::Spawn {
            path: path_str.clone(),
            source,
        })?;

    if !output.status.success() {
        let code = output.status.code().unwrap_or(-1);
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        error!(path = %path_str, code, stderr = %stderr, "script exited non-zero");
        return Err(ScriptError::NonZeroExit {
            path: path_str,
            code,
            stderr,
        });
    }

    serde_json::from_slice(&output.stdout).map_err(|source| ScriptError::InvalidJson {
        path: path_str,
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_script(dir: &tempfile::TempDir, name: &str, body: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(body.as_bytes()).unwrap();
        path
    }

    #[tokio::test]
    #[ignore = "requires a `node` binary on PATH"]
    async fn run_json_parses_stdout() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(
            &dir,
            "echo.js",
            "console.log(JSON.stringify({result: 'ok'}))",
        );
        #[derive(serde::Deserialize)]
        struct Out {
            result: String,
        }
        let out: Out = run_json(&script, "execute", Some("{}")).await.unwrap();
        assert_eq!(out.result, "ok");
    }

    #[tokio::test]
    #[ignore = "requires a `node` binary on PATH"]
    async fn non_zero_exit_surfaces_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(
            &dir,
            "fail.js",
            "console.error('bad module'); process.exit(1)",
        );
        let result: Result<serde_json::Value, _> =
            run_json(&script, "describe", None).await;
        match result {
            Err(ScriptError::NonZeroExit { stderr, .. }) => {
                assert!(stderr.contains("bad module"))
            }
            other => panic!("expected NonZeroExit, got {other:?}"),
        }
    }
}
