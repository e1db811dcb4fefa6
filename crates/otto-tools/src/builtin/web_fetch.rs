// SPDX-License-Identifier: MIT
use anyhow::bail;
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::tool::{Tool, ToolOutput};

const DEFAULT_MAX_CHARS: usize = 50_000;

/// Fetch a URL and convert the response to readable text.
///
/// HTML is rendered to plain text, JSON is pretty-printed, everything else
/// is returned as-is.  Output is capped at `max_chars` characters.
pub struct WebFetchTool {
    client: reqwest::Client,
    max_chars: usize,
}

impl WebFetchTool {
    pub fn new(max_chars: usize) -> Self {
        // One client per tool instance; registered tools live for the
        // process lifetime, so connections get reused across calls.
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .redirect(reqwest::redirect::Policy::limited(3))
            .user_agent("otto-agent/0.4")
            .build()
            .unwrap_or_default();
        Self { client, max_chars }
    }

    async fn fetch(&self, url: &str, max_chars: usize) -> anyhow::Result<String> {
        let response = self.client.get(url).send().await?;
        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_lowercase();
        let body = response.text().await?;
        Ok(truncate_to_chars(render_body(&content_type, body), max_chars))
    }
}

impl Default for WebFetchTool {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CHARS)
    }
}

#[async_trait]
impl Tool for WebFetchTool {
    fn name(&self) -> &str {
        "web_fetch"
    }

    fn description(&self) -> &str {
        "Fetch content from a URL and convert it to readable text.\n\
         - HTTP and HTTPS URLs only; the URL must be fully-formed\n\
         - HTML is converted to plain text, JSON is pretty-printed\n\
         - Read-only; no authentication, no binary content\n\
         - Output is truncated to the configured character cap"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "url": {
                    "type": "string",
                    "description": "The URL to fetch (http or https)"
                },
                "max_chars": {
                    "type": "integer",
                    "description": "Maximum characters to return (default 50000)"
                }
            },
            "required": ["url"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, args: &Value) -> anyhow::Result<ToolOutput> {
        let Some(url) = args.get("url").and_then(Value::as_str) else {
            bail!("missing 'url'");
        };
        let max_chars = args
            .get("max_chars")
            .and_then(Value::as_u64)
            .map(|n| n as usize)
            .unwrap_or(self.max_chars);

        debug!(url = %url, "web_fetch tool");
        let content = self.fetch(url, max_chars).await?;
        Ok(ToolOutput::text(content))
    }
}

/// Pick a text rendering for the response body based on its content type.
fn render_body(content_type: &str, body: String) -> String {
    if content_type.contains("html") {
        return html2text::from_read(body.as_bytes(), 100);
    }
    if content_type.contains("json") {
        return match serde_json::from_str::<Value>(&body) {
            Ok(v) => serde_json::to_string_pretty(&v).unwrap_or(body),
            Err(_) => body,
        };
    }
    body
}

/// Cap `content` at `max_chars` bytes without splitting a UTF-8 sequence:
/// the cut point backs up to the nearest character boundary, so multi-byte
/// text never produces an invalid slice.
fn truncate_to_chars(content: String, max_chars: usize) -> String {
    if content.len() <= max_chars {
        return content;
    }
    let mut cut = max_chars;
    while !content.is_char_boundary(cut) {
        cut -= 1;
    }
    format!(
        "{}...[truncated at {max_chars} chars; total {} chars]",
        &content[..cut],
        content.len()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn html_body_renders_to_plain_text() {
        let page = "<main><p>otto is <em>durable</em></p><a href=\"/docs\">docs</a></main>";
        let text = render_body("text/html; charset=utf-8", page.into());
        assert!(text.contains("otto is"));
        assert!(text.contains("durable"));
        assert!(!text.contains("<p>"), "{text}");
    }

    #[test]
    fn json_body_is_pretty_printed() {
        let rendered = render_body("application/json", r#"{"a":{"b":1}}"#.into());
        assert!(rendered.contains('\n'), "pretty-printing adds newlines: {rendered}");
        let back: Value = serde_json::from_str(&rendered).unwrap();
        assert_eq!(back["a"]["b"], 1);
    }

    #[test]
    fn malformed_json_and_plain_text_pass_through() {
        assert_eq!(render_body("application/json", "{oops".into()), "{oops");
        assert_eq!(render_body("text/plain", "as is".into()), "as is");
    }

    #[test]
    fn truncation_is_a_noop_under_the_cap() {
        assert_eq!(truncate_to_chars("short".into(), 10), "short");
    }

    #[test]
    fn truncation_appends_a_marker_over_the_cap() {
        let out = truncate_to_chars("abcdefghij".into(), 4);
        assert!(out.starts_with("abcd..."));
        assert!(out.contains("truncated at 4 chars; total 10 chars"));
    }

    #[test]
    fn truncation_never_splits_a_multi_byte_character() {
        // "héllo" is h(1) é(2) l(1) l(1) o(1) bytes; a cap of 2 lands in
        // the middle of the é sequence and must back up to the boundary.
        let out = truncate_to_chars("héllo".into(), 2);
        assert!(out.starts_with("h..."), "{out}");
        // The result is valid UTF-8 by construction; also check the cut
        // kept only whole characters.
        assert!(!out.contains('\u{FFFD}'));
    }

    #[test]
    fn schema_requires_url() {
        let schema = WebFetchTool::default().parameters_schema();
        let required = schema["required"].as_array().unwrap();
        assert!(required.iter().any(|v| v.as_str() == Some("url")));
    }

    #[tokio::test]
    async fn missing_url_is_error() {
        let out = WebFetchTool::default().execute(&json!({})).await;
        assert!(out.is_err());
    }
}
