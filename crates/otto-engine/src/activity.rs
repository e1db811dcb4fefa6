// SPDX-License-Identifier: Apache-2.0
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use otto_config::EngineConfig;
use otto_model::{AssistantReply, CompletionRequest, LanguageModel, ToolResult};
use otto_runtime::{execute_activity, ActivityOptions};
use otto_tools::ToolRegistry;

use crate::dispatch::{is_engine_tool, is_terminal_tool};

/// Failure of one `tool_execute` activity attempt.
#[derive(Debug, Error)]
pub enum ToolExecuteError {
    #[error("tool not found: {0}")]
    NotFound(String),

    /// Engine-immediate tools must never reach the activity boundary.
    #[error("tool {0} is handled inside the execution, not as an activity")]
    Refused(String),

    #[error("tool {tool} failed: {cause}")]
    Failed { tool: String, cause: anyhow::Error },
}

impl ToolExecuteError {
    /// Only genuine tool failures are worth another attempt; a registry
    /// miss or a refused builtin will not change on retry.
    pub fn retryable(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// Activity: call the language model once and return the whole assistant
/// turn.  Retried per `opts`; the reason–act loop treats any terminal
/// failure as recoverable conversation material.
pub async fn lm_complete(
    model: &Arc<dyn LanguageModel>,
    opts: &ActivityOptions,
    request: CompletionRequest,
) -> anyhow::Result<AssistantReply> {
    debug!(model = %request.model, messages = request.messages.len(), "lm_complete activity");
    execute_activity(opts, |_: &anyhow::Error| true, || {
        let model = Arc::clone(model);
        let request = request.clone();
        async move { model.complete(request).await }
    })
    .await
    .map_err(|e| anyhow!("{e}"))
}

/// Activity: look up `name` in the registry and run it.
///
/// Runs outside the cooperative task, so the tool is free to do I/O.  The
/// registry lookup happens here, never inside the execution body.
pub async fn tool_execute(
    registry: &ToolRegistry,
    name: &str,
    args: &Value,
) -> Result<ToolResult, ToolExecuteError> {
    if is_engine_tool(name) || is_terminal_tool(name) {
        return Err(ToolExecuteError::Refused(name.to_string()));
    }
    let Some(tool) = registry.get(name) else {
        return Err(ToolExecuteError::NotFound(name.to_string()));
    };
    debug!(tool = name, "tool_execute activity");
    match tool.execute(args).await {
        Ok(output) => Ok(ToolResult::success(
            name,
            args.clone(),
            output.content,
            output.image_urls,
        )),
        Err(cause) => Err(ToolExecuteError::Failed { tool: name.to_string(), cause }),
    }
}

/// Retry policy for external tool activities.
pub fn tool_activity_options(cfg: &EngineConfig) -> ActivityOptions {
    ActivityOptions::new(Duration::from_secs(cfg.tool_timeout_secs), cfg.tool_attempts)
}

/// Retry policy for model-completion activities.
pub fn lm_activity_options(cfg: &EngineConfig) -> ActivityOptions {
    ActivityOptions::new(Duration::from_secs(cfg.lm_timeout_secs), cfg.lm_attempts)
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
