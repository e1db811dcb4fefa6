// SPDX-License-Identifier: Apache-2.0
pub mod builtin;
pub mod registry;
pub mod tool;

pub use builtin::echo::EchoTool;
pub use builtin::web_fetch::WebFetchTool;
pub use registry::ToolRegistry;
pub use tool::{Tool, ToolOutput};
