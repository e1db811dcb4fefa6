// SPDX-License-Identifier: Apache-2.0
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};
use uuid::Uuid;

use otto_config::EngineConfig;
use otto_model::{LanguageModel, ToolCall};
use otto_runtime::{Clock, WorkflowContext};
use otto_tools::ToolRegistry;

use crate::plan::{ControlSignal, PlanExecution};
use crate::scheduler;
use crate::state::{HistoryEntry, PlanInput, PlanState, ScheduleInput, SchedulerState};
use crate::EngineError;

/// Well-known id of the coordinator that owns all submissions.
pub const ROOT_WORKFLOW_ID: &str = "otto-root";

/// Arguments to [`Engine::submit_plan`].
#[derive(Debug, Clone, Default)]
pub struct SubmitArgs {
    pub name: String,
    pub plan: String,
    /// Tool names; `function.` / `functions.` prefixes are stripped
    pub tools: Vec<String>,
    /// iCalendar RRULE; empty/absent means a one-shot execution
    pub schedule: Option<String>,
    pub model: Option<String>,
    pub max_steps: Option<u32>,
    /// Scheduled submissions only
    pub max_runs: Option<u32>,
    pub run_timeout: Option<Duration>,
    pub wait_for_runs: bool,
    /// Opaque provenance, serialised into the system prompt
    pub origin: BTreeMap<String, Value>,
    pub system_prompt: Option<String>,
}

/// Synchronous acknowledgement of a submission; completion is asynchronous
/// and observable through queries against `task_id`.
#[derive(Debug, Clone, Serialize)]
pub struct SubmitReceipt {
    pub command_id: String,
    pub task_id: String,
    pub name: String,
    pub scheduled: bool,
    pub schedule: Option<String>,
}

/// A submission in flight to the root coordinator.
enum Submission {
    OneShot {
        cmd_id: String,
        task_id: String,
        input: PlanInput,
        run_timeout: Option<Duration>,
    },
    Scheduled {
        cmd_id: String,
        task_id: String,
        state: SchedulerState,
    },
}

// ─── Handles ─────────────────────────────────────────────────────────────────

/// Observer/controller handle for one plan execution.
///
/// Queries are snapshot reads of the state the execution last published:
/// they never block and never mutate.  Signals enqueue and are applied at
/// the execution's next iteration boundary.
#[derive(Clone)]
pub struct PlanHandle {
    pub(crate) task_id: String,
    pub(crate) snapshot: watch::Receiver<PlanState>,
    pub(crate) signals: mpsc::UnboundedSender<ControlSignal>,
}

impl PlanHandle {
    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// Query `get_state`.
    pub fn state(&self) -> PlanState {
        self.snapshot.borrow().clone()
    }

    /// Query `get_history`.
    pub fn history(&self) -> Vec<HistoryEntry> {
        self.snapshot.borrow().history.clone()
    }

    /// Query `get_output`.
    pub fn output(&self) -> String {
        self.snapshot.borrow().output.clone()
    }

    /// Query `get_tool_calls`.
    pub fn tool_calls(&self) -> Vec<ToolCall> {
        self.snapshot.borrow().tool_calls.clone()
    }

    /// Query `get_current_step`.
    pub fn current_step(&self) -> u32 {
        self.snapshot.borrow().current_step
    }

    /// String-keyed query surface with bit-stable names.
    pub fn query(&self, name: &str) -> Result<Value, EngineError> {
        let value = match name {
            "get_state" => serde_json::to_value(self.state()),
            "get_history" => serde_json::to_value(self.history()),
            "get_output" => serde_json::to_value(self.output()),
            "get_tool_calls" => serde_json::to_value(self.tool_calls()),
            "get_current_step" => serde_json::to_value(self.current_step()),
            other => return Err(EngineError::InvalidArgument(format!("unknown query: {other}"))),
        };
        value.map_err(|e| EngineError::InvalidArgument(e.to_string()))
    }

    /// Signal `stop_execution`.  A no-op once the execution has finished.
    pub fn stop(&self) {
        let _ = self.signals.send(ControlSignal::Stop);
    }

    /// Signal `update_plan`.
    pub fn update_plan(&self, plan: impl Into<String>) {
        let _ = self.signals.send(ControlSignal::UpdatePlan(plan.into()));
    }

    /// String-keyed signal surface with bit-stable names.
    pub fn signal(&self, name: &str, payload: Value) -> Result<(), EngineError> {
        match name {
            "stop_execution" => {
                self.stop();
                Ok(())
            }
            "update_plan" => {
                let plan = payload.as_str().unwrap_or_default();
                self.update_plan(plan);
                Ok(())
            }
            other => Err(EngineError::InvalidArgument(format!("unknown signal: {other}"))),
        }
    }

    /// Wait for the execution to finish and return its final state.
    pub async fn wait(&self) -> PlanState {
        let mut rx = self.snapshot.clone();
        loop {
            {
                let state = rx.borrow_and_update();
                if state.completed_at.is_some() || state.error.is_some() {
                    return state.clone();
                }
            }
            if rx.changed().await.is_err() {
                // Task gone (e.g. run timeout); last snapshot is all there is.
                return rx.borrow().clone();
            }
        }
    }
}

/// Observer handle for one schedule.
#[derive(Clone)]
pub struct SchedulerHandle {
    task_id: String,
    snapshot: watch::Receiver<SchedulerState>,
}

impl SchedulerHandle {
    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// Query `get_scheduler_state`.
    pub fn state(&self) -> SchedulerState {
        self.snapshot.borrow().clone()
    }

    /// String-keyed query surface with bit-stable names.
    pub fn query(&self, name: &str) -> Result<Value, EngineError> {
        match name {
            "get_scheduler_state" => serde_json::to_value(self.state())
                .map_err(|e| EngineError::InvalidArgument(e.to_string())),
            other => Err(EngineError::InvalidArgument(format!("unknown query: {other}"))),
        }
    }

    /// Wait until the scheduler terminates and return its final state.
    pub async fn wait(&self) -> SchedulerState {
        let mut rx = self.snapshot.clone();
        while rx.changed().await.is_ok() {}
        let state = rx.borrow().clone();
        state
    }
}

// ─── Engine ──────────────────────────────────────────────────────────────────

pub(crate) struct EngineInner {
    pub(crate) model: Arc<dyn LanguageModel>,
    pub(crate) tools: Arc<ToolRegistry>,
    pub(crate) config: EngineConfig,
    pub(crate) clock: Clock,
    pub(crate) plans: Mutex<HashMap<String, PlanHandle>>,
    pub(crate) schedulers: Mutex<HashMap<String, SchedulerHandle>>,
}

impl EngineInner {
    /// Start one plan execution as its own cooperative task.
    pub(crate) fn spawn_plan(
        self: &Arc<Self>,
        task_id: String,
        input: PlanInput,
        run_timeout: Option<Duration>,
    ) -> Result<PlanHandle, EngineError> {
        let mut plans = self.plans.lock().expect("plan registry poisoned");
        if plans.contains_key(&task_id) {
            return Err(EngineError::ChildSpawnFailure(format!(
                "execution id already in use: {task_id}"
            )));
        }

        let ctx = WorkflowContext::new(task_id.clone(), self.clock.clone());
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(PlanState::default());
        let execution = PlanExecution::new(
            ctx,
            Arc::clone(&self.model),
            Arc::clone(&self.tools),
            &self.config,
            signal_rx,
            snapshot_tx,
        );

        let id = task_id.clone();
        tokio::spawn(async move {
            let run = execution.run(input);
            let outcome = match run_timeout {
                Some(timeout) => match tokio::time::timeout(timeout, run).await {
                    Ok(result) => result,
                    Err(_) => {
                        warn!(task = %id, "run timeout exceeded; execution aborted");
                        return;
                    }
                },
                None => run.await,
            };
            if let Err(e) = outcome {
                warn!(task = %id, error = %e, "plan execution failed");
            }
        });

        let handle = PlanHandle { task_id: task_id.clone(), snapshot: snapshot_rx, signals: signal_tx };
        plans.insert(task_id, handle.clone());
        Ok(handle)
    }

    /// Start one scheduler as its own cooperative task.
    pub(crate) fn spawn_scheduler(
        self: &Arc<Self>,
        task_id: String,
        state: SchedulerState,
    ) -> Result<SchedulerHandle, EngineError> {
        let mut schedulers = self.schedulers.lock().expect("scheduler registry poisoned");
        if schedulers.contains_key(&task_id) {
            return Err(EngineError::ChildSpawnFailure(format!(
                "scheduler id already in use: {task_id}"
            )));
        }

        let ctx = WorkflowContext::new(task_id.clone(), self.clock.clone());
        let (snapshot_tx, snapshot_rx) = watch::channel(state.clone());
        let inner = Arc::clone(self);
        let id = task_id.clone();
        tokio::spawn(async move {
            match scheduler::drive(inner, ctx, snapshot_tx, state).await {
                Ok(final_state) => {
                    info!(task = %id, completed_runs = final_state.completed_runs, "schedule complete")
                }
                Err(e) => warn!(task = %id, error = %e, "scheduler failed"),
            }
        });

        let handle = SchedulerHandle { task_id: task_id.clone(), snapshot: snapshot_rx };
        schedulers.insert(task_id, handle.clone());
        Ok(handle)
    }
}

/// The engine facade: owns the root coordinator and the registry of live
/// tasks, and is the front door for submissions and observability.
pub struct Engine {
    inner: Arc<EngineInner>,
    root_tx: mpsc::UnboundedSender<Submission>,
}

impl Engine {
    pub fn new(model: Arc<dyn LanguageModel>, tools: Arc<ToolRegistry>) -> Self {
        Self::with_config(model, tools, EngineConfig::default())
    }

    pub fn with_config(
        model: Arc<dyn LanguageModel>,
        tools: Arc<ToolRegistry>,
        config: EngineConfig,
    ) -> Self {
        let inner = Arc::new(EngineInner {
            model,
            tools,
            config,
            clock: Clock::new(),
            plans: Mutex::new(HashMap::new()),
            schedulers: Mutex::new(HashMap::new()),
        });
        let (root_tx, root_rx) = mpsc::unbounded_channel();
        tokio::spawn(root_coordinator(Arc::clone(&inner), root_rx));
        Self { inner, root_tx }
    }

    /// Submit a plan for execution, one-shot or scheduled.
    ///
    /// Returns synchronously with a receipt; the execution itself is
    /// started by the root coordinator and observed through
    /// [`plan`](Self::plan) / [`scheduler`](Self::scheduler) handles.
    pub fn submit_plan(&self, mut args: SubmitArgs) -> Result<SubmitReceipt, EngineError> {
        if args.name.trim().is_empty() {
            return Err(EngineError::InvalidArgument("name is required".into()));
        }
        if args.plan.trim().is_empty() {
            return Err(EngineError::InvalidArgument("plan is required".into()));
        }

        let tools: Vec<String> = args
            .tools
            .iter()
            .map(|t| {
                t.strip_prefix("functions.")
                    .or_else(|| t.strip_prefix("function."))
                    .unwrap_or(t)
                    .to_string()
            })
            .collect();

        // Ids are minted here, outside any workflow body, so task bodies
        // stay deterministic.
        let task_id = Uuid::new_v4().to_string();
        let cmd_id = Uuid::new_v4().to_string();

        let schedule = args.schedule.take().filter(|s| !s.trim().is_empty());
        let submission = match &schedule {
            None => Submission::OneShot {
                cmd_id: cmd_id.clone(),
                task_id: task_id.clone(),
                input: PlanInput {
                    name: args.name.clone(),
                    plan: args.plan,
                    tools,
                    model: args.model.unwrap_or_default(),
                    max_steps: args.max_steps.unwrap_or(0),
                    origin: args.origin,
                    system_prompt: args.system_prompt,
                },
                run_timeout: args.run_timeout,
            },
            Some(schedule) => Submission::Scheduled {
                cmd_id: cmd_id.clone(),
                task_id: task_id.clone(),
                state: SchedulerState::new(ScheduleInput {
                    name: args.name.clone(),
                    plan: args.plan,
                    schedule: schedule.clone(),
                    tools,
                    model: args.model.unwrap_or_default(),
                    max_steps: args.max_steps.unwrap_or(0),
                    max_runs: args.max_runs.unwrap_or(0),
                    run_timeout_secs: args.run_timeout.map(|d| d.as_secs()),
                    wait_for_runs: args.wait_for_runs,
                    origin: args.origin,
                    system_prompt: args.system_prompt,
                }),
            },
        };

        let scheduled = matches!(submission, Submission::Scheduled { .. });
        self.root_tx
            .send(submission)
            .map_err(|_| EngineError::SubmissionFailed("root coordinator unavailable".into()))?;

        Ok(SubmitReceipt { command_id: cmd_id, task_id, name: args.name, scheduled, schedule })
    }

    /// Look up the handle of a one-shot or scheduled run by task id.
    pub fn plan(&self, task_id: &str) -> Option<PlanHandle> {
        self.inner.plans.lock().expect("plan registry poisoned").get(task_id).cloned()
    }

    /// Look up a scheduler handle by task id.
    pub fn scheduler(&self, task_id: &str) -> Option<SchedulerHandle> {
        self.inner
            .schedulers
            .lock()
            .expect("scheduler registry poisoned")
            .get(task_id)
            .cloned()
    }

    /// Wait until the submission identified by `task_id` has a live handle.
    ///
    /// Submissions are started asynchronously by the root coordinator, so a
    /// freshly returned receipt may briefly precede the handle.
    pub async fn wait_for_plan(&self, task_id: &str) -> PlanHandle {
        loop {
            if let Some(handle) = self.plan(task_id) {
                return handle;
            }
            tokio::task::yield_now().await;
        }
    }

    /// Scheduler counterpart of [`wait_for_plan`](Self::wait_for_plan).
    pub async fn wait_for_scheduler(&self, task_id: &str) -> SchedulerHandle {
        loop {
            if let Some(handle) = self.scheduler(task_id) {
                return handle;
            }
            tokio::task::yield_now().await;
        }
    }

    #[cfg(test)]
    pub(crate) fn inner(&self) -> &Arc<EngineInner> {
        &self.inner
    }
}

/// The root coordinator: the single well-known task that turns submissions
/// into child executions.
async fn root_coordinator(inner: Arc<EngineInner>, mut rx: mpsc::UnboundedReceiver<Submission>) {
    info!(id = ROOT_WORKFLOW_ID, "root coordinator started");
    while let Some(submission) = rx.recv().await {
        match submission {
            Submission::OneShot { cmd_id, task_id, input, run_timeout } => {
                info!(%cmd_id, %task_id, name = %input.name, "starting plan execution");
                if let Err(e) = inner.spawn_plan(task_id.clone(), input, run_timeout) {
                    warn!(%cmd_id, %task_id, error = %e, "failed to start execution");
                }
            }
            Submission::Scheduled { cmd_id, task_id, state } => {
                info!(%cmd_id, %task_id, name = %state.input.name, "starting scheduler");
                if let Err(e) = inner.spawn_scheduler(task_id.clone(), state) {
                    warn!(%cmd_id, %task_id, error = %e, "failed to start scheduler");
                }
            }
        }
    }
}
