// SPDX-License-Identifier: MIT
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::anyhow;
use async_trait::async_trait;
use serde_json::Value;

use crate::{AssistantReply, CompletionRequest, LanguageModel, Role, ToolCall};

/// Deterministic mock model for tests.  Echoes the last user message back
/// as the assistant reply.
#[derive(Default)]
pub struct MockModel;

#[async_trait]
impl LanguageModel for MockModel {
    fn name(&self) -> &str {
        "mock"
    }

    async fn complete(&self, req: CompletionRequest) -> anyhow::Result<AssistantReply> {
        let reply = req
            .messages
            .iter()
            .rev()
            .find(|m| m.role() == Role::User)
            .map(|m| m.content())
            .unwrap_or("[no input]");
        Ok(AssistantReply::text(format!("MOCK: {reply}")))
    }
}

/// One scripted model turn: a reply or an injected failure.
pub type ScriptedTurn = Result<AssistantReply, String>;

/// A pre-scripted model.  Each `complete` call pops the next turn from the
/// front of the queue, so tests can specify exact conversations – including
/// tool calls and transient failures – without network access.
pub struct ScriptedModel {
    turns: Mutex<Vec<ScriptedTurn>>,
    calls: AtomicUsize,
    /// The last `CompletionRequest` seen by this model.
    /// Written on each `complete()` call so tests can inspect what was sent.
    pub last_request: Arc<Mutex<Option<CompletionRequest>>>,
}

impl ScriptedModel {
    pub fn new(turns: Vec<ScriptedTurn>) -> Self {
        Self {
            turns: Mutex::new(turns),
            calls: AtomicUsize::new(0),
            last_request: Arc::new(Mutex::new(None)),
        }
    }

    /// Convenience: model that always returns a single text reply.
    pub fn always_text(reply: impl Into<String>) -> Self {
        Self::new(vec![Ok(AssistantReply::text(reply))])
    }

    /// Convenience: model that returns one tool call, then a text reply.
    pub fn tool_then_text(
        tool_id: impl Into<String>,
        tool_name: impl Into<String>,
        args: Value,
        final_text: impl Into<String>,
    ) -> Self {
        Self::new(vec![
            Ok(AssistantReply::with_calls(
                "",
                vec![ToolCall::new(tool_id, tool_name, args)],
            )),
            Ok(AssistantReply::text(final_text)),
        ])
    }

    /// Number of `complete` calls made so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    fn name(&self) -> &str {
        "scripted-mock"
    }

    async fn complete(&self, req: CompletionRequest) -> anyhow::Result<AssistantReply> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().unwrap() = Some(req);
        let next = {
            let mut turns = self.turns.lock().unwrap();
            if turns.is_empty() {
                // Default fallback when all turns are consumed
                Ok(AssistantReply::text("[no more scripts]"))
            } else {
                turns.remove(0)
            }
        };
        next.map_err(|e| anyhow!(e))
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::Message;

    fn req(messages: Vec<Message>) -> CompletionRequest {
        CompletionRequest { model: "m".into(), messages, tools: vec![] }
    }

    #[tokio::test]
    async fn mock_echoes_last_user_message() {
        let reply = MockModel.complete(req(vec![Message::user("hi")])).await.unwrap();
        assert!(reply.content.contains("MOCK: hi"));
    }

    #[tokio::test]
    async fn scripted_pops_turns_in_order() {
        let model = ScriptedModel::new(vec![
            Ok(AssistantReply::text("one")),
            Ok(AssistantReply::text("two")),
        ]);
        assert_eq!(model.complete(req(vec![])).await.unwrap().content, "one");
        assert_eq!(model.complete(req(vec![])).await.unwrap().content, "two");
        assert_eq!(model.calls(), 2);
    }

    #[tokio::test]
    async fn scripted_tool_then_text_two_rounds() {
        let model = ScriptedModel::tool_then_text("c1", "echo", json!({"text": "hi"}), "done");
        let first = model.complete(req(vec![])).await.unwrap();
        assert_eq!(first.tool_calls[0].name, "echo");
        let second = model.complete(req(vec![])).await.unwrap();
        assert_eq!(second.content, "done");
    }

    #[tokio::test]
    async fn scripted_failure_turn_returns_error() {
        let model = ScriptedModel::new(vec![Err("boom".into()), Ok(AssistantReply::text("ok"))]);
        assert!(model.complete(req(vec![])).await.is_err());
        assert_eq!(model.complete(req(vec![])).await.unwrap().content, "ok");
    }

    #[tokio::test]
    async fn scripted_fallback_when_turns_exhausted() {
        let model = ScriptedModel::new(vec![]);
        let reply = model.complete(req(vec![])).await.unwrap();
        assert!(reply.content.contains("no more scripts"));
    }

    #[tokio::test]
    async fn scripted_records_last_request() {
        let model = ScriptedModel::always_text("ok");
        model.complete(req(vec![Message::user("payload")])).await.unwrap();
        let seen = model.last_request.lock().unwrap();
        assert_eq!(seen.as_ref().unwrap().messages[0].content(), "payload");
    }
}
