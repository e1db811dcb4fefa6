// SPDX-License-Identifier: Apache-2.0
use thiserror::Error;

use otto_runtime::RuntimeError;

/// The engine's error taxonomy.
///
/// Only `Runtime` is fatal to a running execution; tool errors are folded
/// back into the conversation as error-shaped results, and model errors
/// never leave the reason–act loop at all.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Rejected input: empty plan/name, malformed sleep arguments.  Not
    /// retried; surfaced to the submitter or, for tool arguments, to the
    /// model as an error result.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The recurrence string could not be interpreted.  Fatal to the
    /// scheduler.
    #[error("invalid schedule: {0}")]
    InvalidSchedule(String),

    /// Registry miss.  Not retried; the model sees an error result and can
    /// adapt.
    #[error("tool not found: {0}")]
    ToolNotFound(String),

    /// An external tool returned an error or its activity exhausted its
    /// retry policy.
    #[error("tool {tool} failed: {reason}")]
    ToolFailure { tool: String, reason: String },

    /// The runtime substrate itself failed.  Fatal to the owning task.
    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    /// A scheduler could not start a child run.  Recorded into the
    /// scheduler state; the schedule continues with the next occurrence.
    #[error("child spawn failed: {0}")]
    ChildSpawnFailure(String),

    /// The submission could not be delivered to the root coordinator.
    #[error("submission failed: {0}")]
    SubmissionFailed(String),
}

impl EngineError {
    /// True for errors that must abort the owning task rather than being
    /// folded back into the conversation.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Runtime(_))
    }
}
