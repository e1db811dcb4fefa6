// SPDX-License-Identifier: Apache-2.0
//! The otto execution engine.
//!
//! A submitted plan becomes a [`PlanExecution`]: a cooperative task that
//! alternates model turns with tool execution until the model returns a
//! final response or the step budget runs out.  A submission carrying an
//! RRULE becomes a scheduler that launches one execution per occurrence.
//! Both kinds of task are observable through snapshot queries and
//! controllable through signals while they run.
mod activity;
mod dispatch;
mod error;
mod plan;
mod prompts;
mod scheduler;
mod state;
mod submit;

pub use activity::{lm_complete, tool_execute, ToolExecuteError};
pub use dispatch::{
    builtin_schemas, is_engine_tool, is_terminal_tool, ToolDispatcher, COMPLETE_WORKFLOW_TOOL,
    FINAL_RESPONSE_TOOL, MAX_TOOL_SLEEP, SLEEP_TOOL, SLEEP_UNTIL_TOOL,
};
pub use error::EngineError;
pub use plan::{ControlSignal, PlanExecution};
pub use prompts::{build_system_prompt, refresh_system_time, DEFAULT_SYSTEM_PROMPT};
pub use scheduler::parse_schedule;
pub use state::{
    HistoryEntry, HistoryKind, PlanInput, PlanState, ScheduleInput, SchedulerState,
    CHILD_RUN_ID_TAIL, DEFAULT_MAX_SCHEDULED_RUNS, DEFAULT_MAX_STEPS, DEFAULT_MODEL,
};
pub use submit::{
    Engine, PlanHandle, SchedulerHandle, SubmitArgs, SubmitReceipt, ROOT_WORKFLOW_ID,
};
