// SPDX-License-Identifier: MIT
use anyhow::bail;
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::tool::{Tool, ToolOutput};

/// Returns its `text` argument unchanged.  Mostly useful for wiring tests
/// and for plans that need to surface a literal value as an observation.
pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Echo the given text back as the tool result."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "text": {
                    "type": "string",
                    "description": "The text to echo back"
                }
            },
            "required": ["text"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, args: &Value) -> anyhow::Result<ToolOutput> {
        let Some(text) = args.get("text").and_then(Value::as_str) else {
            bail!("missing 'text'");
        };
        Ok(ToolOutput::text(text))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn echoes_text_argument() {
        let out = EchoTool.execute(&json!({"text": "hi"})).await.unwrap();
        assert_eq!(out.content, "hi");
    }

    #[tokio::test]
    async fn missing_text_is_error() {
        assert!(EchoTool.execute(&json!({})).await.is_err());
    }
}
