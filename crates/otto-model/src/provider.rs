// SPDX-License-Identifier: Apache-2.0
use std::sync::Arc;

use anyhow::bail;
use async_trait::async_trait;

use otto_config::ModelConfig;

use crate::{AssistantReply, CompletionRequest};

/// A language-model service.
///
/// The engine consumes whole assistant turns, so the contract is a single
/// non-streaming `complete` call.  Errors are the service's own; the
/// execution loop treats every failure as transient and recovers
/// conversationally.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Human-readable driver name for status display.
    fn name(&self) -> &str;

    /// Send a completion request and return the assistant's reply.
    async fn complete(&self, req: CompletionRequest) -> anyhow::Result<AssistantReply>;
}

/// Construct a shared [`LanguageModel`] from configuration.
pub fn from_config(cfg: &ModelConfig) -> anyhow::Result<Arc<dyn LanguageModel>> {
    match cfg.provider.as_str() {
        "openai" => Ok(Arc::new(crate::OpenAiCompatModel::from_config(cfg)?)),
        "mock" => Ok(Arc::new(crate::MockModel)),
        other => bail!("unknown model provider: {other}"),
    }
}
