//! Inheritance-free tool polymorphism: every tool the fork-local toolset
//! exposes implements the same `handle(args) -> Result<..>` entry point
//! rather than subclassing a base type. The eight fork tools in
//! [`fork_tools`] are the only tools this crate concerns itself with —
//! the agent SDK's general-purpose tools (file/edit/bash/etc.) are opaque
//! to us and pass through the permission gate in [`crate::gate`] untouched.

pub mod fork_tools;

use async_trait::async_trait;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput(pub String);

impl ToolOutput {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ToolError {
    /// Policy refused the call (fork mode, budget, busy state, allow_ping).
    #[error("{0}")]
    Denied(String),
    /// The arguments themselves were malformed.
    #[error("{0}")]
    Invalid(String),
    /// Policy allowed it but delivering the result failed.
    #[error("{0}")]
    Failed(String),
}

/// A fork tool: given its raw JSON input, produce the text handed back
/// to the model as the tool result, or a denial/validation error.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    async fn handle(&self, input: serde_json::Value) -> Result<ToolOutput, ToolError>;
}
