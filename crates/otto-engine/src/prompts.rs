// SPDX-License-Identifier: Apache-2.0
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use regex::{NoExpand, Regex};
use serde_json::Value;

/// The canonical helper-assistant prompt used when a submission does not
/// carry its own.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant executing a plan on behalf \
     of a user. Work through the plan step by step. Call the available tools whenever they help, \
     wait for their results before deciding the next action, and finish by returning a final \
     response that summarises the outcome of the plan.";

/// Build the first (system) message of an execution.
///
/// The origin map is provenance only; it rides along in the prompt so the
/// model can mention where the task came from.
pub fn build_system_prompt(custom: Option<&str>, origin: &BTreeMap<String, Value>) -> String {
    let mut prompt = custom
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(DEFAULT_SYSTEM_PROMPT)
        .to_string();
    if !origin.is_empty() {
        if let Ok(json) = serde_json::to_string(origin) {
            prompt.push_str("\n\nTask Origin: ");
            prompt.push_str(&json);
        }
    }
    prompt
}

/// Rewrite the `Current System Time:` line inside a system prompt, or append
/// one if the prompt has none yet.  Best-effort: callers treat a failure to
/// refresh as non-fatal, so this never errors.
pub fn refresh_system_time(content: &mut String, now: DateTime<Utc>) {
    let Ok(re) = Regex::new(r"Current System Time: [^\n]*") else {
        return;
    };
    let stamp = format!("Current System Time: {}", now.to_rfc3339());
    if re.is_match(content) {
        *content = re.replace(content, NoExpand(&stamp)).into_owned();
    } else {
        content.push_str("\n\n");
        content.push_str(&stamp);
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
