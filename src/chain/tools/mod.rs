//! Tools that stages may call, and the policy that gates them.
//!
//! ```text
//! stage ──ToolRequest──► ToolGateway ──► ToolGuard (allow-list) ──► Tool
//!                              │                 │
//!                              │            audit log
//!                              └──► ToolOutcome::{Completed, Rejected, Failed}
//! ```
//!
//! A tool that is not on the plan's allow-list is never executed. The gateway
//! only tries the fallbacks the request names itself; it never picks another
//! tool on its own.

pub mod builtin;
pub mod gateway;
pub mod guard;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use super::stage::PolicyRejection;
use crate::context::RequestInfo;
use crate::error::Result;

pub use builtin::{AcceptanceStatsTool, ConversationRecallTool, EditHistoryTool};
pub use gateway::ToolGateway;
pub use guard::{AuditEntry, EnforcementMode, ToolGuard};

/// A named, read-only data lookup a stage may call.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    async fn invoke(&self, request: &RequestInfo, args: &Value) -> Result<Value>;
}

/// Tool implementations by name.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `tool`, replacing any tool with the same name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(mut self, tool: Arc<dyn Tool>) -> Self {
        self.register(tool);
        self
    }

    /// Look a tool up by name.
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Registered tool names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tools.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.tools.keys()).finish()
    }
}

/// A stage's request for one tool, plus the fallbacks it accepts.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolRequest {
    pub tool: String,
    pub args: Value,
    pub fallbacks: Vec<String>,
}

impl ToolRequest {
    /// Request for `tool` with no fallbacks.
    pub fn new(tool: impl Into<String>, args: Value) -> Self {
        Self {
            tool: tool.into(),
            args,
            fallbacks: Vec::new(),
        }
    }

    /// Append a fallback, tried after the earlier candidates.
    pub fn with_fallback(mut self, tool: impl Into<String>) -> Self {
        self.fallbacks.push(tool.into());
        self
    }

    /// The primary tool, then fallbacks in order.
    pub fn candidates(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.tool.as_str()).chain(self.fallbacks.iter().map(String::as_str))
    }
}

/// Result of one gateway call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolOutcome {
    Completed { tool: String, output: Value },
    /// Every candidate was refused by policy; none was executed.
    Rejected(PolicyRejection),
    /// At least one candidate passed policy but failed to run.
    Failed { tool: String, error: String },
}

impl ToolOutcome {
    /// True when some candidate produced output.
    pub fn is_completed(&self) -> bool {
        matches!(self, ToolOutcome::Completed { .. })
    }
}

/// One successful tool call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolFinding {
    pub tool: String,
    pub output: Value,
}

/// Everything the context-gathering stage learned.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ToolFindings {
    pub findings: Vec<ToolFinding>,
    pub rejections: Vec<PolicyRejection>,
    pub failures: Vec<(String, String)>,
}

impl ToolFindings {
    pub fn is_empty(&self) -> bool {
        self.findings.is_empty()
    }

    /// Compact multi-line summary for prompts.
    pub fn summary(&self) -> String {
        self.findings
            .iter()
            .map(|f| format!("- {}: {}", f.tool, f.output))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
