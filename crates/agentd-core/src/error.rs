//! The four-category error taxonomy the executor loop distinguishes. Kept
//! as a `thiserror` enum rather than a string tag so the executor's
//! dispatch on error *source* is exhaustive and compiler-checked.

use thiserror::Error;

/// An error surfaced by one round of the executor loop. Only
/// [`AgentError::ScriptLoad`], [`AgentError::LlmCall`], and
/// [`AgentError::Unknown`] ever put the loop into the error state; a
/// [`AgentError::Tool`] is isolated to a single tool result and never
/// escalates.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("script load failed: {0}")]
    ScriptLoad(#[source] anyhow::Error),

    #[error("llm call failed: {0}")]
    LlmCall(#[source] anyhow::Error),

    #[error("tool execution failed: {0}")]
    Tool(#[source] anyhow::Error),

    #[error("unexpected failure: {0}")]
    Unknown(#[source] anyhow::Error),
}

impl AgentError {
    /// The string used for this category in `/status` and `crash.log`
    /// (`script_load` | `llm_call` | `tool` | `unknown`).
    pub fn source_tag(&self) -> &'static str {
        match self {
            AgentError::ScriptLoad(_) => "script_load",
            AgentError::LlmCall(_) => "llm_call",
            AgentError::Tool(_) => "tool",
            AgentError::Unknown(_) => "unknown",
        }
    }

    /// True for the categories that halt the loop and require repair,
    /// as opposed to `Tool`, which is always isolated to one round.
    pub fn enters_error_state(&self) -> bool {
        !matches!(self, AgentError::Tool(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_errors_do_not_enter_error_state() {
        let err = AgentError::Tool(anyhow::anyhow!("boom"));
        assert_eq!(err.source_tag(), "tool");
        assert!(!err.enters_error_state());
    }

    #[test]
    fn script_load_and_llm_call_and_unknown_enter_error_state() {
        assert!(AgentError::ScriptLoad(anyhow::anyhow!("x")).enters_error_state());
        assert!(AgentError::LlmCall(anyhow::anyhow!("x")).enters_error_state());
        assert!(AgentError::Unknown(anyhow::anyhow!("x")).enters_error_state());
    }

    #[test]
    fn source_tags_match_spec_vocabulary() {
        assert_eq!(
            AgentError::ScriptLoad(anyhow::anyhow!("x")).source_tag(),
            "script_load"
        );
        assert_eq!(
            AgentError::LlmCall(anyhow::anyhow!("x")).source_tag(),
            "llm_call"
        );
        assert_eq!(
            AgentError::Unknown(anyhow::anyhow!("x")).source_tag(),
            "unknown"
        );
    }
}
