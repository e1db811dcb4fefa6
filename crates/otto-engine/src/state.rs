// SPDX-License-Identifier: Apache-2.0
use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use otto_model::{Message, ToolCall, ToolResult};

/// Model used when a submission does not name one.
pub const DEFAULT_MODEL: &str = "gpt-4o";
/// Step budget applied when a submission carries none.
pub const DEFAULT_MAX_STEPS: u32 = 500;
/// Run budget applied to schedules that carry none.
pub const DEFAULT_MAX_SCHEDULED_RUNS: u32 = 1000;
/// Number of child run ids a scheduler keeps across a checkpoint.
pub const CHILD_RUN_ID_TAIL: usize = 20;

// ─── History ─────────────────────────────────────────────────────────────────

/// Classification of a history entry.
///
/// History is the human-visible audit of an execution; it parallels but is
/// not identical to the model-visible transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryKind {
    Thought,
    Actions,
    Observation,
    Error,
    System,
}

/// One typed journal entry in an execution's audit log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub kind: HistoryKind,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn new(kind: HistoryKind, content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self { kind, content: content.into(), timestamp }
    }
}

// ─── Plan execution ──────────────────────────────────────────────────────────

/// Input to a single plan execution.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlanInput {
    pub name: String,
    /// Free-form natural-language plan
    pub plan: String,
    /// Tool names the model may see (resolved against the registry)
    #[serde(default)]
    pub tools: Vec<String>,
    /// Empty means [`DEFAULT_MODEL`]
    #[serde(default)]
    pub model: String,
    /// Zero means [`DEFAULT_MAX_STEPS`]
    #[serde(default)]
    pub max_steps: u32,
    /// Opaque provenance map, serialised into the system prompt
    #[serde(default)]
    pub origin: BTreeMap<String, Value>,
    /// Overrides the canonical system prompt when set
    #[serde(default)]
    pub system_prompt: Option<String>,
}

/// The whole observable state of one plan execution.
///
/// Owned exclusively by the execution's task; observers see cloned
/// snapshots.  All collections are append-only while the execution runs,
/// and `completed_at == None` exactly while it is running.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlanState {
    pub name: String,
    pub plan: String,
    pub current_step: u32,
    pub completed_at: Option<DateTime<Utc>>,
    pub output: String,
    pub error: Option<String>,
    /// The model-visible transcript; the first entry is always the system
    /// message
    pub messages: Vec<Message>,
    pub selected_tools: Vec<String>,
    /// Cumulative, including engine-synthesised final responses
    pub tool_calls: Vec<ToolCall>,
    /// Cumulative, 1:1 with `tool_calls` on success, error-shaped otherwise
    pub tool_results: Vec<ToolResult>,
    pub history: Vec<HistoryEntry>,
    /// Image URLs flattened out of tool results
    pub image_urls: Vec<String>,
    pub started_at: Option<DateTime<Utc>>,
}

impl PlanState {
    pub fn is_completed(&self) -> bool {
        self.completed_at.is_some()
    }

    pub fn push_history(
        &mut self,
        kind: HistoryKind,
        content: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) {
        self.history.push(HistoryEntry::new(kind, content, timestamp));
    }
}

// ─── Scheduler ───────────────────────────────────────────────────────────────

/// Input to a recurring schedule.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScheduleInput {
    pub name: String,
    pub plan: String,
    /// iCalendar RRULE, either a single rule or a rule set; a leading
    /// `RRULE:` literal is tolerated
    pub schedule: String,
    #[serde(default)]
    pub tools: Vec<String>,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub max_steps: u32,
    /// Zero means [`DEFAULT_MAX_SCHEDULED_RUNS`]
    #[serde(default)]
    pub max_runs: u32,
    /// Per-run timeout in seconds
    #[serde(default)]
    pub run_timeout_secs: Option<u64>,
    /// Serialise runs: each run awaits the previous one
    #[serde(default)]
    pub wait_for_runs: bool,
    #[serde(default)]
    pub origin: BTreeMap<String, Value>,
    #[serde(default)]
    pub system_prompt: Option<String>,
}

impl ScheduleInput {
    pub fn run_timeout(&self) -> Option<Duration> {
        self.run_timeout_secs.map(Duration::from_secs)
    }
}

/// The whole observable state of one schedule; the only value handed
/// across a checkpoint boundary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchedulerState {
    pub input: ScheduleInput,
    pub started_at: Option<DateTime<Utc>>,
    pub next_run_time: Option<DateTime<Utc>>,
    pub last_run_time: Option<DateTime<Utc>>,
    pub completed_runs: u32,
    /// Bounded tail of spawned run ids (pruned at each checkpoint)
    pub child_run_ids: Vec<String>,
    pub error: Option<String>,
}

impl SchedulerState {
    pub fn new(input: ScheduleInput) -> Self {
        Self { input, ..Default::default() }
    }

    /// Keep only the last [`CHILD_RUN_ID_TAIL`] run ids.
    pub fn prune_child_run_ids(&mut self) {
        if self.child_run_ids.len() > CHILD_RUN_ID_TAIL {
            let drop = self.child_run_ids.len() - CHILD_RUN_ID_TAIL;
            self.child_run_ids.drain(..drop);
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_plan_state_is_running() {
        let s = PlanState::default();
        assert!(!s.is_completed());
        assert_eq!(s.current_step, 0);
        assert!(s.messages.is_empty());
    }

    #[test]
    fn push_history_appends_in_order() {
        let mut s = PlanState::default();
        let t = Utc::now();
        s.push_history(HistoryKind::Thought, "a", t);
        s.push_history(HistoryKind::Observation, "b", t);
        assert_eq!(s.history.len(), 2);
        assert_eq!(s.history[0].kind, HistoryKind::Thought);
        assert_eq!(s.history[1].content, "b");
    }

    #[test]
    fn history_kind_serialises_lowercase() {
        let json = serde_json::to_string(&HistoryKind::Observation).unwrap();
        assert_eq!(json, "\"observation\"");
    }

    #[test]
    fn plan_state_round_trips_through_json() {
        let mut s = PlanState {
            name: "n".into(),
            plan: "p".into(),
            current_step: 3,
            output: "done".into(),
            ..Default::default()
        };
        s.messages.push(Message::system("sys"));
        s.tool_calls.push(ToolCall::new("id", "echo", serde_json::json!({})));
        let json = serde_json::to_string(&s).unwrap();
        let back: PlanState = serde_json::from_str(&json).unwrap();
        assert_eq!(back.current_step, 3);
        assert_eq!(back.messages[0].content(), "sys");
        assert_eq!(back.tool_calls[0].name, "echo");
    }

    #[test]
    fn prune_keeps_last_twenty_ids() {
        let mut s = SchedulerState::default();
        s.child_run_ids = (0..50).map(|i| format!("run_{i}")).collect();
        s.prune_child_run_ids();
        assert_eq!(s.child_run_ids.len(), CHILD_RUN_ID_TAIL);
        assert_eq!(s.child_run_ids[0], "run_30");
        assert_eq!(s.child_run_ids.last().unwrap(), "run_49");
    }

    #[test]
    fn prune_is_a_noop_below_the_tail() {
        let mut s = SchedulerState::default();
        s.child_run_ids = vec!["a".into(), "b".into()];
        s.prune_child_run_ids();
        assert_eq!(s.child_run_ids, vec!["a", "b"]);
    }

    #[test]
    fn run_timeout_maps_seconds_to_duration() {
        let mut input = ScheduleInput::default();
        assert!(input.run_timeout().is_none());
        input.run_timeout_secs = Some(90);
        assert_eq!(input.run_timeout(), Some(Duration::from_secs(90)));
    }
}
