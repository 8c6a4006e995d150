//! Loads the active provider and every tool module out of a workspace's
//! `scripts/` directory. Every call re-reads the directory
//! from scratch — there is no cache to invalidate, which is exactly the
//! property that makes self-editing scripts work.

use agentd_core::Workspace;
use thiserror::Error;

use crate::provider::ScriptProvider;
use crate::runner::ScriptError;
use crate::tool::ScriptTool;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("no provider module found for '{0}' under scripts/providers/")]
    ProviderNotFound(String),

    #[error("failed to read scripts directory: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Script(#[from] ScriptError),
}

/// One tool module discovered under `scripts/tools/`, already probed via
/// `describe`.
pub struct LoadedTool {
    pub tool: ScriptTool,
}

pub struct ScriptLoader<'a> {
    workspace: &'a Workspace,
}

impl<'a> ScriptLoader<'a> {
    pub fn new(workspace: &'a Workspace) -> Self {
        ScriptLoader { workspace }
    }

    /// Resolve `scripts/providers/<name>.js` for the given provider name
    /// (the `agent.json` `provider` field) and load it.
    pub async fn load_provider(&self, name: &str) -> Result<ScriptProvider, LoadError> {
        let path = self.workspace.providers_dir().join(format!("{name}.js"));
        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Err(LoadError::ProviderNotFound(name.to_string()));
        }
        Ok(ScriptProvider::new(path))
    }

    /// Load every `.js` file under `scripts/tools/`, probing each via
    /// `describe`. A single bad tool module fails the whole load (the
    /// repair protocol treats any script_load failure uniformly) rather
    /// than silently registering a partial tool set.
    pub async fn load_tools(&self) -> Result<Vec<LoadedTool>, LoadError> {
        let dir = self.workspace.tools_dir();
        let mut loaded = Vec::new();
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(loaded),
            Err(e) => return Err(e.into()),
        };
        let mut paths = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("js") {
                paths.push(path);
            }
        }
        paths.sort();
        for path in paths {
            let tool = ScriptTool::load(&path).await?;
            loaded.push(LoadedTool { tool });
        }
        Ok(loaded)
    }

    /// The repair path's probe operation: load the active provider and
    /// every tool, surfacing the first failure. A clean probe means the
    /// scripts are once again valid and the error state can clear.
    pub async fn probe(&self, provider_name: &str) -> Result<(), LoadError> {
        let provider = self.load_provider(provider_name).await?;
        provider.probe().await?;
        self.load_tools().await?;
        Ok(())
    }
}
