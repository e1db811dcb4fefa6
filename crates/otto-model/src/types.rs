// SPDX-License-Identifier: MIT
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ─── Message types ────────────────────────────────────────────────────────────

/// The role of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
            Role::Tool => write!(f, "tool"),
        }
    }
}

/// A single turn in the conversation history.
///
/// Each role carries its own payload: assistant turns carry the ordered
/// tool-call list, tool turns carry the id of the call they answer.  The
/// conversation is append-only while an execution runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum Message {
    System {
        content: String,
    },
    User {
        content: String,
    },
    Assistant {
        content: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCall>,
    },
    Tool {
        content: String,
        tool_call_id: String,
    },
}

impl Message {
    pub fn system(text: impl Into<String>) -> Self {
        Self::System { content: text.into() }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::User { content: text.into() }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::Assistant { content: text.into(), tool_calls: Vec::new() }
    }

    pub fn assistant_with_calls(text: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self::Assistant { content: text.into(), tool_calls }
    }

    /// A tool-result turn answering the call identified by `tool_call_id`.
    pub fn tool(text: impl Into<String>, tool_call_id: impl Into<String>) -> Self {
        Self::Tool { content: text.into(), tool_call_id: tool_call_id.into() }
    }

    pub fn role(&self) -> Role {
        match self {
            Self::System { .. } => Role::System,
            Self::User { .. } => Role::User,
            Self::Assistant { .. } => Role::Assistant,
            Self::Tool { .. } => Role::Tool,
        }
    }

    pub fn content(&self) -> &str {
        match self {
            Self::System { content }
            | Self::User { content }
            | Self::Assistant { content, .. }
            | Self::Tool { content, .. } => content,
        }
    }

    pub fn content_mut(&mut self) -> &mut String {
        match self {
            Self::System { content }
            | Self::User { content }
            | Self::Assistant { content, .. }
            | Self::Tool { content, .. } => content,
        }
    }

    /// Tool calls carried by an assistant turn; empty for every other role.
    pub fn tool_calls(&self) -> &[ToolCall] {
        match self {
            Self::Assistant { tool_calls, .. } => tool_calls,
            _ => &[],
        }
    }

    /// The call id a tool turn answers, if this is a tool turn.
    pub fn tool_call_id(&self) -> Option<&str> {
        match self {
            Self::Tool { tool_call_id, .. } => Some(tool_call_id),
            _ => None,
        }
    }
}

// ─── Tool call / result types ─────────────────────────────────────────────────

/// A single tool invocation requested by the model (or synthesised by the
/// engine for final responses).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Stable identifier; forwarded verbatim in the answering tool turn
    pub id: String,
    pub name: String,
    /// Parsed JSON argument object
    #[serde(default)]
    pub arguments: Value,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self { id: id.into(), name: name.into(), arguments }
    }
}

/// The outcome of dispatching one tool call.  Every call produces exactly
/// one result, error-shaped when the dispatch failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ToolResult {
    Success {
        tool: String,
        params: Value,
        content: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        image_urls: Vec<String>,
    },
    Error {
        tool: String,
        params: Value,
        content: String,
        error: String,
    },
}

impl ToolResult {
    pub fn success(
        tool: impl Into<String>,
        params: Value,
        content: impl Into<String>,
        image_urls: Vec<String>,
    ) -> Self {
        Self::Success { tool: tool.into(), params, content: content.into(), image_urls }
    }

    pub fn failure(
        tool: impl Into<String>,
        params: Value,
        content: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self::Error {
            tool: tool.into(),
            params,
            content: content.into(),
            error: error.into(),
        }
    }

    pub fn tool(&self) -> &str {
        match self {
            Self::Success { tool, .. } | Self::Error { tool, .. } => tool,
        }
    }

    pub fn params(&self) -> &Value {
        match self {
            Self::Success { params, .. } | Self::Error { params, .. } => params,
        }
    }

    /// The user-visible observation text; for error shapes this is the error
    /// message, so it is always printable.
    pub fn content(&self) -> &str {
        match self {
            Self::Success { content, .. } | Self::Error { content, .. } => content,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Success { .. } => None,
            Self::Error { error, .. } => Some(error),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }

    pub fn image_urls(&self) -> &[String] {
        match self {
            Self::Success { image_urls, .. } => image_urls,
            Self::Error { .. } => &[],
        }
    }
}

// ─── Model request/response types ─────────────────────────────────────────────

/// A tool schema provided to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    /// JSON Schema of the parameters object
    pub parameters: Value,
}

/// Request sent to a language-model driver.
#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    /// Model name forwarded to the provider; selected per execution
    pub model: String,
    pub messages: Vec<Message>,
    pub tools: Vec<ToolSchema>,
}

/// One whole assistant turn: text plus the ordered tool calls the model
/// wants executed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssistantReply {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
}

impl AssistantReply {
    pub fn text(content: impl Into<String>) -> Self {
        Self { content: content.into(), tool_calls: Vec::new() }
    }

    pub fn with_calls(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self { content: content.into(), tool_calls }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    // ── Message construction ──────────────────────────────────────────────────

    #[test]
    fn message_system_sets_role_and_text() {
        let m = Message::system("prompt");
        assert_eq!(m.role(), Role::System);
        assert_eq!(m.content(), "prompt");
    }

    #[test]
    fn message_user_sets_role_and_text() {
        let m = Message::user("hello");
        assert_eq!(m.role(), Role::User);
        assert_eq!(m.content(), "hello");
    }

    #[test]
    fn assistant_without_calls_has_empty_call_slice() {
        let m = Message::assistant("reply");
        assert_eq!(m.role(), Role::Assistant);
        assert!(m.tool_calls().is_empty());
    }

    #[test]
    fn assistant_with_calls_preserves_order() {
        let calls = vec![
            ToolCall::new("a", "first", json!({})),
            ToolCall::new("b", "second", json!({})),
        ];
        let m = Message::assistant_with_calls("", calls);
        let names: Vec<&str> = m.tool_calls().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["first", "second"]);
    }

    #[test]
    fn tool_message_carries_call_id() {
        let m = Message::tool("output", "call-7");
        assert_eq!(m.role(), Role::Tool);
        assert_eq!(m.tool_call_id(), Some("call-7"));
        assert_eq!(m.content(), "output");
    }

    #[test]
    fn tool_call_id_is_none_for_other_roles() {
        assert!(Message::user("x").tool_call_id().is_none());
        assert!(Message::assistant("x").tool_call_id().is_none());
    }

    // ── Serialisation ─────────────────────────────────────────────────────────

    #[test]
    fn message_serialises_with_role_tag() {
        let json = serde_json::to_string(&Message::user("hi")).unwrap();
        assert!(json.contains(r#""role":"user""#), "{json}");
    }

    #[test]
    fn assistant_without_calls_omits_tool_calls_field() {
        let json = serde_json::to_string(&Message::assistant("hi")).unwrap();
        assert!(!json.contains("tool_calls"), "{json}");
    }

    #[test]
    fn message_round_trips() {
        let original = Message::assistant_with_calls(
            "thinking",
            vec![ToolCall::new("id-1", "echo", json!({"text": "hi"}))],
        );
        let json = serde_json::to_string(&original).unwrap();
        let back: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(back, original);
    }

    #[test]
    fn tool_message_round_trips() {
        let original = Message::tool("result text", "call-1");
        let json = serde_json::to_string(&original).unwrap();
        let back: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(back, original);
    }

    // ── ToolResult ────────────────────────────────────────────────────────────

    #[test]
    fn success_result_content_is_observation() {
        let r = ToolResult::success("echo", json!({"text": "hi"}), "hi", vec![]);
        assert!(!r.is_error());
        assert_eq!(r.content(), "hi");
        assert!(r.error().is_none());
    }

    #[test]
    fn error_result_exposes_error_and_content() {
        let r = ToolResult::failure("echo", json!({}), "Error executing echo: boom", "boom");
        assert!(r.is_error());
        assert_eq!(r.error(), Some("boom"));
        assert_eq!(r.content(), "Error executing echo: boom");
        assert!(r.image_urls().is_empty());
    }

    #[test]
    fn result_serialises_with_status_tag() {
        let r = ToolResult::success("t", json!({}), "ok", vec!["u1".into()]);
        let json = serde_json::to_string(&r).unwrap();
        assert!(json.contains(r#""status":"success""#), "{json}");
        let back: ToolResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back.image_urls(), ["u1".to_string()]);
    }
}
