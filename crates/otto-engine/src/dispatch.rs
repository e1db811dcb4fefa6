// SPDX-License-Identifier: Apache-2.0
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tracing::debug;

use otto_model::{ToolCall, ToolResult, ToolSchema};
use otto_runtime::{execute_activity, ActivityFailure, ActivityOptions, WorkflowContext};
use otto_tools::ToolRegistry;

use crate::activity::{tool_execute, ToolExecuteError};
use crate::EngineError;

/// Terminal tool names handled by the plan execution itself.
pub const FINAL_RESPONSE_TOOL: &str = "final_response";
pub const COMPLETE_WORKFLOW_TOOL: &str = "complete_workflow";
/// Engine-immediate tool names: handled inline, may suspend the execution.
pub const SLEEP_TOOL: &str = "sleep";
pub const SLEEP_UNTIL_TOOL: &str = "sleep_until";

/// Longest single suspension a tool call may request.
pub const MAX_TOOL_SLEEP: Duration = Duration::from_secs(24 * 60 * 60);

/// True for calls the plan execution terminates on.
pub fn is_terminal_tool(name: &str) -> bool {
    name == FINAL_RESPONSE_TOOL || name == COMPLETE_WORKFLOW_TOOL
}

/// True for calls handled inside the cooperative task via runtime
/// primitives.
pub fn is_engine_tool(name: &str) -> bool {
    name == SLEEP_TOOL || name == SLEEP_UNTIL_TOOL
}

/// Schemas for the engine's own tools, advertised to the model alongside
/// the selected registry tools.
pub fn builtin_schemas() -> Vec<ToolSchema> {
    vec![
        ToolSchema {
            name: SLEEP_TOOL.into(),
            description: "Pause the plan for a number of seconds, then continue. \
                          Use this to wait for an external process or to space out work."
                .into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "duration": {
                        "type": "number",
                        "description": "Seconds to sleep; must be positive, capped at 24 hours"
                    },
                    "reason": {
                        "type": "string",
                        "description": "Why the plan is waiting"
                    }
                },
                "required": ["duration"],
                "additionalProperties": false
            }),
        },
        ToolSchema {
            name: SLEEP_UNTIL_TOOL.into(),
            description: "Pause the plan until an absolute RFC-3339 timestamp, then continue. \
                          Past timestamps are a no-op."
                .into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "timestamp": {
                        "type": "string",
                        "description": "RFC-3339 timestamp to wake at, e.g. 2026-01-01T09:00:00Z"
                    },
                    "reason": {
                        "type": "string",
                        "description": "Why the plan is waiting"
                    }
                },
                "required": ["timestamp"],
                "additionalProperties": false
            }),
        },
        ToolSchema {
            name: FINAL_RESPONSE_TOOL.into(),
            description: "Finish the plan and report its outcome. Call this exactly once, \
                          when nothing remains to be done."
                .into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "output": {
                        "type": "string",
                        "description": "The final result of the plan"
                    }
                },
                "required": ["output"],
                "additionalProperties": false
            }),
        },
    ]
}

/// Classifies tool calls and routes them: engine-immediate tools run inline
/// inside the cooperative task (and may suspend it), everything else is
/// handed to the runtime as a retryable `tool_execute` activity.
pub struct ToolDispatcher {
    tools: Arc<ToolRegistry>,
    tool_opts: ActivityOptions,
}

impl ToolDispatcher {
    pub fn new(tools: Arc<ToolRegistry>, tool_opts: ActivityOptions) -> Self {
        Self { tools, tool_opts }
    }

    /// Dispatch one tool call and return its result.
    ///
    /// Terminal tools (`final_response`, `complete_workflow`) must be
    /// handled by the caller before dispatching.
    pub async fn dispatch(
        &self,
        ctx: &WorkflowContext,
        call: &ToolCall,
    ) -> Result<ToolResult, EngineError> {
        debug!(tool = %call.name, id = %call.id, "dispatching tool call");
        match call.name.as_str() {
            SLEEP_TOOL => self.sleep(ctx, call).await,
            SLEEP_UNTIL_TOOL => self.sleep_until(ctx, call).await,
            _ => self.external(ctx, call).await,
        }
    }

    async fn sleep(&self, ctx: &WorkflowContext, call: &ToolCall) -> Result<ToolResult, EngineError> {
        let requested = parse_duration_secs(&call.arguments)?;
        let seconds = requested.min(MAX_TOOL_SLEEP.as_secs_f64());
        ctx.record("tool_sleep");
        ctx.sleep(Duration::from_secs_f64(seconds)).await?;
        let content = format!(
            "Slept for {seconds:.2} seconds. Reason: {}",
            reason_of(&call.arguments)
        );
        Ok(ToolResult::success(SLEEP_TOOL, call.arguments.clone(), content, vec![]))
    }

    async fn sleep_until(
        &self,
        ctx: &WorkflowContext,
        call: &ToolCall,
    ) -> Result<ToolResult, EngineError> {
        let Some(raw) = call.arguments.get("timestamp").and_then(Value::as_str) else {
            return Err(EngineError::InvalidArgument(
                "sleep_until requires an RFC-3339 'timestamp'".into(),
            ));
        };
        let target = chrono::DateTime::parse_from_rfc3339(raw)
            .map_err(|e| EngineError::InvalidArgument(format!("invalid timestamp {raw:?}: {e}")))?
            .with_timezone(&chrono::Utc);

        let now = ctx.now();
        if target <= now {
            let content = format!("Requested time {raw} is in the past. No sleep performed.");
            return Ok(ToolResult::success(
                SLEEP_UNTIL_TOOL,
                call.arguments.clone(),
                content,
                vec![],
            ));
        }

        let delta = (target - now).to_std().unwrap_or_default().min(MAX_TOOL_SLEEP);
        ctx.record("tool_sleep_until");
        ctx.sleep(delta).await?;
        let content = format!(
            "Slept until {} (sleep duration: {:.2}s). Reason: {}",
            ctx.now().to_rfc3339(),
            delta.as_secs_f64(),
            reason_of(&call.arguments)
        );
        Ok(ToolResult::success(SLEEP_UNTIL_TOOL, call.arguments.clone(), content, vec![]))
    }

    async fn external(
        &self,
        ctx: &WorkflowContext,
        call: &ToolCall,
    ) -> Result<ToolResult, EngineError> {
        ctx.record("activity_tool_execute");
        let registry = Arc::clone(&self.tools);
        let outcome = execute_activity(&self.tool_opts, ToolExecuteError::retryable, || {
            let registry = Arc::clone(&registry);
            let name = call.name.clone();
            let args = call.arguments.clone();
            async move { tool_execute(&registry, &name, &args).await }
        })
        .await;

        match outcome {
            Ok(result) => Ok(result),
            Err(ActivityFailure::NonRetryable(ToolExecuteError::NotFound(name))) => {
                Err(EngineError::ToolNotFound(name))
            }
            Err(e) => Err(EngineError::ToolFailure {
                tool: call.name.clone(),
                reason: e.to_string(),
            }),
        }
    }
}

/// Seconds accepted as a JSON number or a numeric string; must be positive
/// and finite.
fn parse_duration_secs(args: &Value) -> Result<f64, EngineError> {
    let value = args.get("duration");
    let seconds = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match seconds {
        Some(s) if s.is_finite() && s > 0.0 => Ok(s),
        _ => Err(EngineError::InvalidArgument(
            "sleep requires a positive 'duration' in seconds".into(),
        )),
    }
}

fn reason_of(args: &Value) -> String {
    args.get("reason")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .unwrap_or("No reason specified")
        .to_string()
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
