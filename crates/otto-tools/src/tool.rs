// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::Value;

/// What a tool hands back to the engine on success.
///
/// `content` is always the plain-text observation fed to the model.  Tools
/// that produce images list their URLs separately; the engine flattens them
/// into the execution state.
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    pub content: String,
    pub image_urls: Vec<String>,
}

impl ToolOutput {
    /// Plain-text result.
    pub fn text(content: impl Into<String>) -> Self {
        Self { content: content.into(), image_urls: Vec::new() }
    }

    /// Result with image URLs attached.
    pub fn with_images(content: impl Into<String>, image_urls: Vec<String>) -> Self {
        Self { content: content.into(), image_urls }
    }
}

/// Trait that every registered tool must implement.
///
/// Tools run inside activities, outside any cooperative task, so they are
/// free to perform I/O.  Failures are returned as errors; the activity
/// boundary wraps them into the engine's error taxonomy.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    /// JSON Schema for parameters
    fn parameters_schema(&self) -> Value;
    /// Execute the tool against its parsed JSON arguments.
    async fn execute(&self, args: &Value) -> anyhow::Result<ToolOutput>;
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_output_has_no_images() {
        let out = ToolOutput::text("hello");
        assert_eq!(out.content, "hello");
        assert!(out.image_urls.is_empty());
    }

    #[test]
    fn with_images_keeps_urls() {
        let out = ToolOutput::with_images("chart", vec!["https://x/y.png".into()]);
        assert_eq!(out.image_urls.len(), 1);
    }
}
