// SPDX-License-Identifier: MIT
mod mock;
mod openai_compat;
mod provider;
mod types;

pub use mock::{MockModel, ScriptedModel};
pub use openai_compat::OpenAiCompatModel;
pub use provider::{from_config, LanguageModel};
pub use types::*;
