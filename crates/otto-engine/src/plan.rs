// SPDX-License-Identifier: Apache-2.0
use std::sync::Arc;

use serde_json::{json, Value};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use otto_config::EngineConfig;
use otto_model::{CompletionRequest, LanguageModel, Message, ToolCall, ToolSchema};
use otto_runtime::{ActivityOptions, WorkflowContext};
use otto_tools::ToolRegistry;

use crate::activity::{lm_activity_options, lm_complete, tool_activity_options};
use crate::dispatch::{builtin_schemas, is_terminal_tool, ToolDispatcher, FINAL_RESPONSE_TOOL};
use crate::prompts;
use crate::state::{HistoryKind, PlanInput, PlanState, DEFAULT_MAX_STEPS, DEFAULT_MODEL};
use crate::EngineError;

/// Control signals an execution accepts while running.
///
/// Signals enqueue; the loop applies them at its next iteration boundary,
/// letting the current iteration drain first.
#[derive(Debug, Clone)]
pub enum ControlSignal {
    /// `stop_execution`: mark the execution completed
    Stop,
    /// `update_plan`: replace the plan text mid-flight
    UpdatePlan(String),
}

/// One reason–act execution: owns the conversation, the step bookkeeping
/// and the audit history, and publishes immutable state snapshots after
/// every mutation batch.
pub struct PlanExecution {
    ctx: WorkflowContext,
    model: Arc<dyn LanguageModel>,
    tools: Arc<ToolRegistry>,
    dispatcher: ToolDispatcher,
    lm_opts: ActivityOptions,
    signals: mpsc::UnboundedReceiver<ControlSignal>,
    snapshot: watch::Sender<PlanState>,
    state: PlanState,
    model_name: String,
    max_steps: u32,
}

impl PlanExecution {
    pub fn new(
        ctx: WorkflowContext,
        model: Arc<dyn LanguageModel>,
        tools: Arc<ToolRegistry>,
        config: &EngineConfig,
        signals: mpsc::UnboundedReceiver<ControlSignal>,
        snapshot: watch::Sender<PlanState>,
    ) -> Self {
        let dispatcher = ToolDispatcher::new(Arc::clone(&tools), tool_activity_options(config));
        Self {
            ctx,
            model,
            tools,
            dispatcher,
            lm_opts: lm_activity_options(config),
            signals,
            snapshot,
            state: PlanState::default(),
            model_name: String::new(),
            max_steps: 0,
        }
    }

    /// Run the execution to completion and return its output.
    pub async fn run(mut self, input: PlanInput) -> Result<String, EngineError> {
        if let Err(e) = self.start(input) {
            return Err(self.fail(e));
        }

        loop {
            self.apply_signals();
            if self.state.is_completed() {
                break;
            }

            // Step gate: a budget-exhausted execution gets one final
            // tool-free turn to summarise itself instead of a hard stop.
            if self.state.current_step >= self.max_steps {
                self.exhaustion_coda().await;
                break;
            }
            self.state.current_step += 1;
            self.publish();

            // Keep the model's notion of "now" current.  Best-effort.
            let now = self.ctx.now();
            if let Some(first) = self.state.messages.first_mut() {
                prompts::refresh_system_time(first.content_mut(), now);
            }

            // Reason: one model turn.
            self.ctx.record("activity_lm_complete");
            let request = CompletionRequest {
                model: self.model_name.clone(),
                messages: self.state.messages.clone(),
                tools: self.tool_schemas(),
            };
            let reply = match lm_complete(&self.model, &self.lm_opts, request).await {
                Ok(reply) => reply,
                Err(e) => {
                    self.recover_from_lm_error(&e);
                    continue;
                }
            };

            // Integrate the turn into transcript and history.
            let mut calls = reply.tool_calls.clone();
            self.state
                .messages
                .push(Message::assistant_with_calls(reply.content.clone(), reply.tool_calls));
            let now = self.ctx.now();
            if !reply.content.is_empty() {
                self.state.push_history(HistoryKind::Thought, reply.content.clone(), now);
            }

            if calls.is_empty() {
                // A content-only turn is the model's final answer: synthesise
                // the terminal call so bookkeeping stays uniform.
                calls.push(ToolCall::new(
                    format!("final_response_{}", now.timestamp_millis()),
                    FINAL_RESPONSE_TOOL,
                    json!({"output": reply.content}),
                ));
            } else {
                let names: Vec<&str> = calls.iter().map(|c| c.name.as_str()).collect();
                self.state.push_history(
                    HistoryKind::Actions,
                    format!("executing {} tool call(s): {}", calls.len(), names.join(", ")),
                    now,
                );
            }
            self.publish();

            // Act: process the calls sequentially, in emission order.
            if let Err(e) = self.process_tool_calls(calls).await {
                return Err(self.fail(e));
            }

            if self.state.is_completed() {
                break;
            }
        }

        self.publish();
        info!(
            task = %self.ctx.task_id(),
            steps = self.state.current_step,
            "plan execution finished"
        );
        Ok(self.state.output.clone())
    }

    /// Validate the input, apply defaults, seed transcript and history.
    fn start(&mut self, input: PlanInput) -> Result<(), EngineError> {
        if input.plan.trim().is_empty() {
            return Err(EngineError::InvalidArgument("plan must not be empty".into()));
        }

        self.model_name = if input.model.trim().is_empty() {
            DEFAULT_MODEL.to_string()
        } else {
            input.model
        };
        self.max_steps = if input.max_steps == 0 { DEFAULT_MAX_STEPS } else { input.max_steps };

        let now = self.ctx.now();
        self.state.name = input.name;
        self.state.plan = input.plan.clone();
        self.state.selected_tools = input.tools;
        self.state.started_at = Some(now);

        let system = prompts::build_system_prompt(input.system_prompt.as_deref(), &input.origin);
        self.state.messages.push(Message::system(system));
        self.state.messages.push(Message::user(input.plan.clone()));
        self.state.push_history(
            HistoryKind::Thought,
            format!("I'm starting to execute the plan: {}", input.plan),
            now,
        );

        info!(task = %self.ctx.task_id(), name = %self.state.name, "plan execution started");
        self.ctx.record("execution_started");
        self.publish();
        Ok(())
    }

    /// Apply queued control signals.  Stop is idempotent: once the
    /// execution is completed, further signals are no-ops.
    fn apply_signals(&mut self) {
        while let Ok(signal) = self.signals.try_recv() {
            if self.state.is_completed() {
                continue;
            }
            match signal {
                ControlSignal::Stop => {
                    let now = self.ctx.now();
                    self.state.output = "execution stopped by signal".into();
                    self.state.completed_at = Some(now);
                    self.state
                        .push_history(HistoryKind::System, "execution stopped by signal", now);
                    self.ctx.record("signal_stop");
                    info!(task = %self.ctx.task_id(), "execution stopped by signal");
                    self.publish();
                }
                ControlSignal::UpdatePlan(plan) => {
                    if plan.trim().is_empty() {
                        continue;
                    }
                    let now = self.ctx.now();
                    let note = format!("The plan has been updated to: {plan}");
                    self.state.messages.push(Message::system(note.clone()));
                    self.state.push_history(HistoryKind::System, note, now);
                    self.state.plan = plan;
                    self.ctx.record("signal_update_plan");
                    self.publish();
                }
            }
        }
    }

    /// Fold a model failure back into the conversation: the model is told
    /// what went wrong and asked to try differently on the next turn.
    fn recover_from_lm_error(&mut self, error: &anyhow::Error) {
        warn!(task = %self.ctx.task_id(), error = %error, "model call failed; recovering");
        let now = self.ctx.now();
        self.state
            .push_history(HistoryKind::Error, format!("model call failed: {error}"), now);
        let dummy_id = format!("recovery_{}", now.timestamp_millis());
        self.state.messages.push(Message::tool(
            format!("Error: {error}. Please try a different approach."),
            dummy_id,
        ));
        self.publish();
    }

    /// Process one turn's tool calls in order.  Terminal calls complete the
    /// execution; dispatch errors become error-shaped results the model can
    /// react to; only runtime failures abort.
    async fn process_tool_calls(&mut self, calls: Vec<ToolCall>) -> Result<(), EngineError> {
        for call in calls {
            self.state.tool_calls.push(call.clone());

            if is_terminal_tool(&call.name) {
                self.state.output = final_output(&call.arguments);
                self.state.completed_at = Some(self.ctx.now());
                self.ctx.record("final_response");
                self.publish();
                break;
            }

            match self.dispatcher.dispatch(&self.ctx, &call).await {
                Ok(result) => {
                    let now = self.ctx.now();
                    self.state.messages.push(Message::tool(result.content(), &call.id));
                    self.state
                        .push_history(HistoryKind::Observation, result.content(), now);
                    self.state.image_urls.extend(result.image_urls().iter().cloned());
                    self.state.tool_results.push(result);
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    let now = self.ctx.now();
                    debug!(tool = %call.name, error = %e, "tool call failed");
                    self.state.push_history(
                        HistoryKind::Error,
                        format!("tool {} failed: {e}", call.name),
                        now,
                    );
                    let content = format!("Error executing {}: {e}", call.name);
                    self.state.tool_results.push(otto_model::ToolResult::failure(
                        &call.name,
                        call.arguments.clone(),
                        content.clone(),
                        e.to_string(),
                    ));
                    self.state.messages.push(Message::tool(content, &call.id));
                }
            }
            self.publish();
        }
        Ok(())
    }

    /// Step budget exhausted: ask the model for a tool-free wrap-up and
    /// use it as the execution's output.
    async fn exhaustion_coda(&mut self) {
        let now = self.ctx.now();
        self.state.push_history(
            HistoryKind::System,
            format!("reached max steps ({})", self.max_steps),
            now,
        );
        self.state.messages.push(Message::user(
            "You have reached the maximum number of steps for this plan. Do not call any more \
             tools. Write a concise summary of what has been done so far and what still remains \
             to be done.",
        ));

        self.ctx.record("activity_lm_complete");
        let request = CompletionRequest {
            model: self.model_name.clone(),
            messages: self.state.messages.clone(),
            tools: vec![],
        };
        let output = match lm_complete(&self.model, &self.lm_opts, request).await {
            Ok(reply) if !reply.content.is_empty() => reply.content,
            Ok(_) | Err(_) => format!(
                "Reached the maximum number of steps ({}) before completing the plan.",
                self.max_steps
            ),
        };

        let now = self.ctx.now();
        self.state.push_history(HistoryKind::Thought, output.clone(), now);
        self.state.output = output;
        self.state.completed_at = Some(now);
        self.publish();
    }

    /// Terminal failure: record the error, mirror it into an empty output,
    /// and propagate.
    fn fail(&mut self, error: EngineError) -> EngineError {
        warn!(task = %self.ctx.task_id(), error = %error, "plan execution failed");
        self.state.error = Some(error.to_string());
        if self.state.output.is_empty() {
            self.state.output = error.to_string();
        }
        self.state.completed_at = Some(self.ctx.now());
        self.publish();
        error
    }

    /// Selected registry tools plus the engine's own schemas.
    fn tool_schemas(&self) -> Vec<ToolSchema> {
        let mut schemas = self.tools.schemas_for(&self.state.selected_tools);
        schemas.extend(builtin_schemas());
        schemas
    }

    fn publish(&self) {
        self.snapshot.send_replace(self.state.clone());
    }
}

/// Extract the `output` field of a terminal call.  Non-string outputs are
/// serialised; a missing field is an empty output.
fn final_output(args: &Value) -> String {
    match args.get("output") {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn final_output_prefers_the_string_field() {
        assert_eq!(final_output(&json!({"output": "done"})), "done");
    }

    #[test]
    fn final_output_serialises_non_string_values() {
        assert_eq!(final_output(&json!({"output": {"n": 1}})), r#"{"n":1}"#);
    }

    #[test]
    fn final_output_missing_field_is_empty() {
        assert_eq!(final_output(&json!({})), "");
    }
}
