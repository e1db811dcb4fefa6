// SPDX-License-Identifier: MIT
use anyhow::{anyhow, Context};
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, warn};

use otto_config::ModelConfig;

use crate::{AssistantReply, CompletionRequest, LanguageModel, Message, ToolCall};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Driver for any OpenAI-compatible `/chat/completions` endpoint.
///
/// Non-streaming: the engine wants whole assistant turns, so the request is
/// sent with `stream: false` and the first choice is mapped back onto the
/// engine's message types.
pub struct OpenAiCompatModel {
    client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
}

impl OpenAiCompatModel {
    pub fn new(api_key: Option<String>, base_url: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.into()),
            max_tokens: None,
            temperature: None,
        }
    }

    pub fn from_config(cfg: &ModelConfig) -> anyhow::Result<Self> {
        let api_key = resolve_api_key(cfg);
        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: cfg.base_url.clone().unwrap_or_else(|| DEFAULT_BASE_URL.into()),
            max_tokens: cfg.max_tokens,
            temperature: cfg.temperature,
        })
    }

    fn request_body(&self, req: &CompletionRequest) -> Value {
        let messages: Vec<Value> = req.messages.iter().map(wire_message).collect();
        let mut body = json!({
            "model": req.model,
            "messages": messages,
            "stream": false,
        });
        if !req.tools.is_empty() {
            body["tools"] = Value::Array(
                req.tools
                    .iter()
                    .map(|t| {
                        json!({
                            "type": "function",
                            "function": {
                                "name": t.name,
                                "description": t.description,
                                "parameters": t.parameters,
                            }
                        })
                    })
                    .collect(),
            );
        }
        if let Some(mt) = self.max_tokens {
            body["max_tokens"] = json!(mt);
        }
        if let Some(temp) = self.temperature {
            body["temperature"] = json!(temp);
        }
        body
    }
}

#[async_trait]
impl LanguageModel for OpenAiCompatModel {
    fn name(&self) -> &str {
        "openai"
    }

    async fn complete(&self, req: CompletionRequest) -> anyhow::Result<AssistantReply> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        debug!(model = %req.model, tools = req.tools.len(), "chat completion request");

        let mut http = self.client.post(&url).json(&self.request_body(&req));
        if let Some(key) = &self.api_key {
            http = http.bearer_auth(key);
        }

        let response = http.send().await.context("model request failed")?;
        let status = response.status();
        let body = response.text().await.context("reading model response")?;
        if !status.is_success() {
            return Err(anyhow!("model API error {status}: {body}"));
        }

        let parsed: Value = serde_json::from_str(&body).context("parsing model response")?;
        let message = parsed["choices"]
            .get(0)
            .map(|c| &c["message"])
            .ok_or_else(|| anyhow!("model response has no choices"))?;

        let content = message["content"].as_str().unwrap_or_default().to_string();
        let tool_calls = message["tool_calls"]
            .as_array()
            .map(|calls| calls.iter().filter_map(wire_tool_call).collect())
            .unwrap_or_default();

        Ok(AssistantReply { content, tool_calls })
    }
}

/// Map one engine message onto the OpenAI wire shape.
fn wire_message(msg: &Message) -> Value {
    match msg {
        Message::System { content } => json!({"role": "system", "content": content}),
        Message::User { content } => json!({"role": "user", "content": content}),
        Message::Assistant { content, tool_calls } => {
            let mut m = json!({"role": "assistant", "content": content});
            if !tool_calls.is_empty() {
                m["tool_calls"] = Value::Array(
                    tool_calls
                        .iter()
                        .map(|tc| {
                            json!({
                                "id": tc.id,
                                "type": "function",
                                "function": {
                                    "name": tc.name,
                                    "arguments": tc.arguments.to_string(),
                                }
                            })
                        })
                        .collect(),
                );
            }
            m
        }
        Message::Tool { content, tool_call_id } => {
            json!({"role": "tool", "content": content, "tool_call_id": tool_call_id})
        }
    }
}

/// Map one wire tool call back onto the engine shape.  Calls without a
/// function name cannot be dispatched and are dropped; invalid argument
/// JSON degrades to an empty object so the turn still completes.
fn wire_tool_call(call: &Value) -> Option<ToolCall> {
    let function = &call["function"];
    let name = function["name"].as_str()?;
    if name.is_empty() {
        warn!("dropping tool call with empty name from model");
        return None;
    }
    let arguments = match function["arguments"].as_str() {
        Some("") | None => Value::Object(Default::default()),
        Some(raw) => serde_json::from_str(raw).unwrap_or_else(|e| {
            warn!(tool = name, error = %e, "invalid tool-call argument JSON; substituting {{}}");
            Value::Object(Default::default())
        }),
    };
    Some(ToolCall::new(call["id"].as_str().unwrap_or_default(), name, arguments))
}

fn resolve_api_key(cfg: &ModelConfig) -> Option<String> {
    if let Some(key) = &cfg.api_key {
        return Some(key.clone());
    }
    let var = cfg.api_key_env.as_deref().unwrap_or("OPENAI_API_KEY");
    std::env::var(var).ok()
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::ToolSchema;

    #[test]
    fn wire_message_tool_turn_carries_call_id() {
        let v = wire_message(&Message::tool("out", "call-1"));
        assert_eq!(v["role"], "tool");
        assert_eq!(v["tool_call_id"], "call-1");
    }

    #[test]
    fn wire_message_assistant_serialises_arguments_as_string() {
        let m = Message::assistant_with_calls(
            "",
            vec![ToolCall::new("id", "echo", json!({"text": "hi"}))],
        );
        let v = wire_message(&m);
        let args = v["tool_calls"][0]["function"]["arguments"].as_str().unwrap();
        let parsed: Value = serde_json::from_str(args).unwrap();
        assert_eq!(parsed["text"], "hi");
    }

    #[test]
    fn wire_tool_call_parses_argument_string() {
        let call = json!({
            "id": "c1",
            "function": {"name": "echo", "arguments": r#"{"text":"hi"}"#}
        });
        let tc = wire_tool_call(&call).unwrap();
        assert_eq!(tc.name, "echo");
        assert_eq!(tc.arguments["text"], "hi");
    }

    #[test]
    fn wire_tool_call_invalid_json_degrades_to_empty_object() {
        let call = json!({
            "id": "c1",
            "function": {"name": "echo", "arguments": "{not json"}
        });
        let tc = wire_tool_call(&call).unwrap();
        assert!(tc.arguments.as_object().unwrap().is_empty());
    }

    #[test]
    fn wire_tool_call_without_name_is_dropped() {
        let call = json!({"id": "c1", "function": {"arguments": "{}"}});
        assert!(wire_tool_call(&call).is_none());
    }

    #[test]
    fn request_body_includes_tools_when_present() {
        let model = OpenAiCompatModel::new(None, None);
        let req = CompletionRequest {
            model: "gpt-4o".into(),
            messages: vec![Message::system("s")],
            tools: vec![ToolSchema {
                name: "echo".into(),
                description: "echoes".into(),
                parameters: json!({"type": "object"}),
            }],
        };
        let body = model.request_body(&req);
        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["tools"][0]["function"]["name"], "echo");
    }

    #[test]
    fn request_body_omits_tools_when_empty() {
        let model = OpenAiCompatModel::new(None, None);
        let req = CompletionRequest {
            model: "gpt-4o".into(),
            messages: vec![Message::system("s")],
            tools: vec![],
        };
        assert!(model.request_body(&req).get("tools").is_none());
    }
}
