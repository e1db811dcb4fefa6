// SPDX-License-Identifier: Apache-2.0
use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rrule::{RRule, RRuleSet, Tz, Unvalidated};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use otto_runtime::WorkflowContext;

use crate::state::{PlanInput, SchedulerState, DEFAULT_MAX_SCHEDULED_RUNS};
use crate::submit::EngineInner;
use crate::EngineError;

/// How far ahead occurrences are computed.  A schedule whose next
/// occurrence lies beyond this window terminates cleanly.
const OCCURRENCE_WINDOW_DAYS: i64 = 365;

/// Outcome of one scheduler incarnation.
pub enum SchedulerTurn {
    /// Journal grew past the checkpoint threshold: reincarnate with this
    /// state and a fresh journal.
    Continue(SchedulerState),
    /// The schedule is finished (recurrence exhausted or max runs reached).
    Done(SchedulerState),
}

/// Long-lived state machine that launches one plan execution per RRULE
/// occurrence.
pub struct Scheduler {
    ctx: WorkflowContext,
    engine: Arc<EngineInner>,
    snapshot: watch::Sender<SchedulerState>,
    checkpoint_events: u64,
}

impl Scheduler {
    pub(crate) fn new(
        ctx: WorkflowContext,
        engine: Arc<EngineInner>,
        snapshot: watch::Sender<SchedulerState>,
    ) -> Self {
        let checkpoint_events = engine.config.checkpoint_events;
        Self { ctx, engine, snapshot, checkpoint_events }
    }

    /// Run until the schedule finishes or the journal calls for a
    /// checkpoint.  Accepts either a fresh state or a continuation from a
    /// previous incarnation.
    pub async fn run_segment(&self, mut state: SchedulerState) -> Result<SchedulerTurn, EngineError> {
        if state.input.plan.trim().is_empty() {
            return Err(EngineError::InvalidArgument("plan must not be empty".into()));
        }
        if state.input.schedule.trim().is_empty() {
            return Err(EngineError::InvalidArgument("schedule must not be empty".into()));
        }
        let max_runs = if state.input.max_runs == 0 {
            DEFAULT_MAX_SCHEDULED_RUNS
        } else {
            state.input.max_runs
        };
        let rule_set = parse_schedule(&state.input.schedule, self.ctx.now())?;

        if state.started_at.is_none() {
            state.started_at = Some(self.ctx.now());
            info!(
                task = %self.ctx.task_id(),
                name = %state.input.name,
                schedule = %state.input.schedule,
                max_runs,
                "schedule started"
            );
        }
        self.publish(&state);

        while state.completed_runs < max_runs {
            let now = self.ctx.now();
            let Some(next) = next_occurrence(&rule_set, now) else {
                info!(task = %self.ctx.task_id(), "recurrence exhausted; schedule complete");
                break;
            };
            state.next_run_time = Some(next);
            self.publish(&state);

            debug!(task = %self.ctx.task_id(), next = %next, "sleeping until next occurrence");
            self.ctx.sleep_until(next).await?;
            state.last_run_time = Some(self.ctx.now());

            let n = state.completed_runs + 1;
            let run_id = format!(
                "{}_{}_{}",
                self.ctx.task_id(),
                state.input.name.replace(' ', "_"),
                n
            );
            let child_input = PlanInput {
                name: format!("{} (Run {})", state.input.name, n),
                plan: state.input.plan.clone(),
                tools: state.input.tools.clone(),
                model: state.input.model.clone(),
                max_steps: state.input.max_steps,
                origin: state.input.origin.clone(),
                system_prompt: state.input.system_prompt.clone(),
            };

            self.ctx.record("child_start");
            let handle = match self.engine.spawn_plan(
                run_id.clone(),
                child_input,
                state.input.run_timeout(),
            ) {
                Ok(handle) => handle,
                Err(e) => {
                    // One failed launch must not kill the schedule.
                    warn!(task = %self.ctx.task_id(), run_id = %run_id, error = %e, "failed to start scheduled run");
                    state.error = Some(e.to_string());
                    self.publish(&state);
                    continue;
                }
            };
            state.child_run_ids.push(run_id.clone());
            self.publish(&state);

            if state.input.wait_for_runs {
                self.ctx.record("child_await");
                let final_state = handle.wait().await;
                if let Some(e) = &final_state.error {
                    warn!(run_id = %run_id, error = %e, "scheduled run failed");
                } else if final_state.completed_at.is_none() {
                    warn!(run_id = %run_id, "scheduled run ended without completing");
                } else {
                    info!(run_id = %run_id, output = %final_state.output, "scheduled run completed");
                }
            }

            state.completed_runs += 1;
            self.publish(&state);
            if state.completed_runs >= max_runs {
                info!(task = %self.ctx.task_id(), runs = state.completed_runs, "max runs reached");
                break;
            }

            // The only mechanism bounding journal growth for long-running
            // schedules: hand the state to a fresh incarnation.
            if self.ctx.history_len() > self.checkpoint_events {
                state.prune_child_run_ids();
                self.publish(&state);
                return Ok(SchedulerTurn::Continue(state));
            }
        }

        self.publish(&state);
        Ok(SchedulerTurn::Done(state))
    }

    fn publish(&self, state: &SchedulerState) {
        self.snapshot.send_replace(state.clone());
    }
}

/// Drive a scheduler through its checkpoint reincarnations until the
/// schedule finishes.
pub(crate) async fn drive(
    engine: Arc<EngineInner>,
    ctx: WorkflowContext,
    snapshot: watch::Sender<SchedulerState>,
    mut state: SchedulerState,
) -> Result<SchedulerState, EngineError> {
    let mut ctx = ctx;
    loop {
        let scheduler = Scheduler::new(ctx.clone(), Arc::clone(&engine), snapshot.clone());
        match scheduler.run_segment(state).await? {
            SchedulerTurn::Done(final_state) => return Ok(final_state),
            SchedulerTurn::Continue(next_state) => {
                info!(
                    task = %ctx.task_id(),
                    completed_runs = next_state.completed_runs,
                    journal = ctx.history_len(),
                    "scheduler checkpoint: reincarnating with fresh journal"
                );
                state = next_state;
                ctx = ctx.reincarnate();
            }
        }
    }
}

/// Parse an iCalendar recurrence: a full rule set first, then a bare rule
/// anchored to `dtstart`.  A leading `RRULE:` literal is tolerated.
pub fn parse_schedule(schedule: &str, dtstart: DateTime<Utc>) -> Result<RRuleSet, EngineError> {
    let trimmed = schedule.trim();
    let body = trimmed.strip_prefix("RRULE:").unwrap_or(trimmed);

    if let Ok(set) = trimmed.parse::<RRuleSet>() {
        return Ok(set);
    }

    let rule: RRule<Unvalidated> = body
        .parse()
        .map_err(|e| EngineError::InvalidSchedule(format!("{trimmed:?}: {e}")))?;
    rule.build(dtstart.with_timezone(&Tz::UTC))
        .map_err(|e| EngineError::InvalidSchedule(e.to_string()))
}

/// First occurrence strictly after `now` within the look-ahead window.
fn next_occurrence(rule_set: &RRuleSet, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let window_end = now + ChronoDuration::days(OCCURRENCE_WINDOW_DAYS);
    let result = rule_set
        .clone()
        .after(now.with_timezone(&Tz::UTC))
        .before(window_end.with_timezone(&Tz::UTC))
        .all(16);
    result
        .dates
        .into_iter()
        .map(|d| d.with_timezone(&Utc))
        .find(|d| *d > now)
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    // ── Schedule parsing ──────────────────────────────────────────────────────

    #[test]
    fn parses_bare_rule() {
        assert!(parse_schedule("FREQ=DAILY", now()).is_ok());
    }

    #[test]
    fn parses_rule_with_rrule_prefix() {
        assert!(parse_schedule("RRULE:FREQ=MINUTELY;INTERVAL=1", now()).is_ok());
    }

    #[test]
    fn parses_full_rule_set_with_dtstart() {
        let set = "DTSTART:20240101T000000Z\nRRULE:FREQ=DAILY;COUNT=3";
        assert!(parse_schedule(set, now()).is_ok());
    }

    #[test]
    fn garbage_is_invalid_schedule() {
        let err = parse_schedule("every other tuesday", now()).unwrap_err();
        assert!(matches!(err, EngineError::InvalidSchedule(_)));
    }

    #[test]
    fn empty_rule_is_invalid_schedule() {
        assert!(parse_schedule("RRULE:", now()).is_err());
    }

    // ── Occurrence computation ────────────────────────────────────────────────

    #[test]
    fn next_occurrence_is_strictly_in_the_future() {
        let t = now();
        let set = parse_schedule("FREQ=MINUTELY;INTERVAL=1", t).unwrap();
        let next = next_occurrence(&set, t).unwrap();
        assert!(next > t);
        assert!(next <= t + ChronoDuration::minutes(2));
    }

    #[test]
    fn exhausted_count_yields_no_occurrence() {
        let t = now();
        // Anchored three days in the past with COUNT=2: both occurrences
        // are already spent.
        let set = parse_schedule(
            &format!(
                "DTSTART:{}\nRRULE:FREQ=DAILY;COUNT=2",
                (t - ChronoDuration::days(3)).format("%Y%m%dT%H%M%SZ")
            ),
            t,
        )
        .unwrap();
        assert!(next_occurrence(&set, t).is_none());
    }

    #[test]
    fn occurrence_beyond_the_window_is_ignored() {
        let t = now();
        let far = t + ChronoDuration::days(400);
        let set = parse_schedule(
            &format!(
                "DTSTART:{}\nRRULE:FREQ=YEARLY;COUNT=1",
                far.format("%Y%m%dT%H%M%SZ")
            ),
            t,
        )
        .unwrap();
        assert!(next_occurrence(&set, t).is_none());
    }

    #[test]
    fn yearly_rule_within_window_is_found() {
        let t = now();
        let soon = t + ChronoDuration::days(30);
        let set = parse_schedule(
            &format!(
                "DTSTART:{}\nRRULE:FREQ=YEARLY;COUNT=1",
                soon.format("%Y%m%dT%H%M%SZ")
            ),
            t,
        )
        .unwrap();
        let next = next_occurrence(&set, t).unwrap();
        assert!((next - soon).num_seconds().abs() < 2);
    }
}
