// SPDX-License-Identifier: MIT
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::trace;

use crate::{Clock, RuntimeError};

/// Per-task handle onto the runtime: clock, durable timers and journal
/// accounting.
///
/// Every suspension point and state transition a task takes is recorded as
/// one journal entry; [`history_len`](Self::history_len) is what long-lived
/// tasks compare against their checkpoint threshold.  The journal itself is
/// owned by the runtime and opaque to tasks.
#[derive(Debug, Clone)]
pub struct WorkflowContext {
    task_id: Arc<str>,
    clock: Clock,
    journal: Arc<AtomicU64>,
}

impl WorkflowContext {
    pub fn new(task_id: impl Into<String>, clock: Clock) -> Self {
        Self {
            task_id: task_id.into().into(),
            clock,
            journal: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// Current time on the runtime's time line.  Task bodies must use this
    /// instead of the ambient host clock.
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    /// Append one entry to the task's journal.
    pub fn record(&self, event: &str) {
        let n = self.journal.fetch_add(1, Ordering::Relaxed) + 1;
        trace!(task = %self.task_id, event, entry = n, "journal");
    }

    /// Number of journal entries recorded since this incarnation started.
    pub fn history_len(&self) -> u64 {
        self.journal.load(Ordering::Relaxed)
    }

    /// Durable timer: suspend for `duration`.
    pub async fn sleep(&self, duration: Duration) -> Result<(), RuntimeError> {
        self.record("timer_sleep");
        tokio::time::sleep(duration).await;
        Ok(())
    }

    /// Durable timer: suspend until `deadline`.  Past deadlines return
    /// immediately.
    pub async fn sleep_until(&self, deadline: DateTime<Utc>) -> Result<(), RuntimeError> {
        self.record("timer_sleep_until");
        tokio::time::sleep_until(self.clock.instant_at(deadline)).await;
        Ok(())
    }

    /// Context for a child task.  The child gets its own journal on the
    /// shared time line.
    pub fn child(&self, task_id: impl Into<String>) -> WorkflowContext {
        WorkflowContext::new(task_id, self.clock.clone())
    }

    /// Context for a checkpoint reincarnation of this task: same identity,
    /// fresh journal, so the runtime can discard the journal tail.
    pub fn reincarnate(&self) -> WorkflowContext {
        WorkflowContext::new(self.task_id.to_string(), self.clock.clone())
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
