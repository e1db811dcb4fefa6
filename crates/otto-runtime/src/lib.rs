// SPDX-License-Identifier: Apache-2.0
//! The engine-side contract of the durable-workflow runtime, realised
//! in-process on tokio.
//!
//! Cooperative tasks (plan executions, schedulers) obtain time, timers and
//! journal accounting exclusively through a [`WorkflowContext`]; side effects
//! run behind [`execute_activity`] with retry and timeout policy.  Nothing
//! here reads the ambient host clock inside a task body, which is what keeps
//! executions replayable on a journalling runtime.
mod activity;
mod clock;
mod context;
mod error;

pub use activity::{execute_activity, ActivityFailure, ActivityOptions};
pub use clock::Clock;
pub use context::WorkflowContext;
pub use error::RuntimeError;
