// SPDX-License-Identifier: MIT
use thiserror::Error;

/// Failures of the runtime substrate itself.  These are fatal to the owning
/// task: a task cannot reason about a broken journal or a torn timer, so
/// they propagate out of the task's top-level operation.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("durable timer interrupted: {0}")]
    TimerInterrupted(String),

    #[error("signal channel closed")]
    SignalChannelClosed,

    #[error("journal failure: {0}")]
    Journal(String),
}
