//! Context gathering: calls the plan's tools through the gateway.

use async_trait::async_trait;
use serde_json::json;

use crate::chain::stage::{Stage, StageId, StageOutcome};
use crate::chain::tools::{ToolFinding, ToolFindings, ToolGateway, ToolOutcome, ToolRequest};
use crate::context::keys::{AGENT_PLAN, RESOLVED_TOOLS, TOOL_FINDINGS};
use crate::context::RequestContext;
use crate::error::Result;

/// Optional stage that runs the plan's tool needs through a [`ToolGateway`].
pub struct ContextGatherStage {
    gateway: ToolGateway,
}

impl ContextGatherStage {
    pub const ORDER: i32 = 25;

    pub fn new(gateway: ToolGateway) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl Stage for ContextGatherStage {
    fn id(&self) -> StageId {
        StageId::CONTEXT_GATHER
    }

    fn order(&self) -> i32 {
        Self::ORDER
    }

    fn optional(&self) -> bool {
        true
    }

    async fn execute(&self, ctx: &mut RequestContext) -> Result<StageOutcome> {
        let plan = ctx.get(AGENT_PLAN)?;
        let resolved = ctx.get(RESOLVED_TOOLS)?;
        // Allowed tools that did not resolve are never requested. Unlisted ones
        // still go to the gateway so the guard can reject them.
        let unresolved =
            |tool: &str| plan.tool_allow_list.contains(tool) && !resolved.contains(tool);

        let mut requests = Vec::new();
        let mut findings = ToolFindings::default();
        for need in &plan.tool_needs {
            let mut candidates = std::iter::once(&need.tool)
                .chain(&need.fallbacks)
                .filter(|tool| !unresolved(tool.as_str()));
            let Some(primary) = candidates.next() else {
                log::warn!(
                    "[{}] context_gather: no resolved tool for '{}'",
                    ctx.trace_id(),
                    need.tool
                );
                findings
                    .failures
                    .push((need.tool.clone(), "not resolved for this request".to_string()));
                continue;
            };
            let mut request = ToolRequest::new(primary.clone(), json!({ "limit": 5 }));
            for fallback in candidates {
                request = request.with_fallback(fallback.clone());
            }
            requests.push((need.required, request));
        }

        for (required, request) in &requests {
            match self.gateway.invoke(ctx, request).await {
                ToolOutcome::Completed { tool, output } => {
                    findings.findings.push(ToolFinding { tool, output });
                }
                ToolOutcome::Rejected(rejection) => {
                    if *required {
                        ctx.put(TOOL_FINDINGS, findings)?;
                        return Ok(StageOutcome::Rejected(rejection));
                    }
                    findings.rejections.push(rejection);
                }
                ToolOutcome::Failed { tool, error } => {
                    findings.failures.push((tool, error));
                }
            }
        }

        ctx.put(TOOL_FINDINGS, findings)?;
        Ok(StageOutcome::Continue)
    }
}
