//! Dynamic context: turns the plan into the concrete stages and tools for this request.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;

use crate::chain::plan::{ActiveStages, ResolvedTools};
use crate::chain::stage::{Stage, StageId, StageOutcome};
use crate::chain::tools::ToolRegistry;
use crate::context::keys::{ACTIVE_STAGES, AGENT_PLAN, RESOLVED_TOOLS};
use crate::context::RequestContext;
use crate::error::Result;

/// Materializes [`ActiveStages`] and [`ResolvedTools`] from the plan.
pub struct DynamicContextStage {
    known_stages: BTreeSet<StageId>,
    tools: Arc<ToolRegistry>,
}

impl DynamicContextStage {
    pub const ORDER: i32 = 10;

    /// `known_stages` are the ids registered in the chain.
    pub fn new(known_stages: impl IntoIterator<Item = StageId>, tools: Arc<ToolRegistry>) -> Self {
        Self {
            known_stages: known_stages.into_iter().collect(),
            tools,
        }
    }
}

#[async_trait]
impl Stage for DynamicContextStage {
    fn id(&self) -> StageId {
        StageId::DYNAMIC_CONTEXT
    }

    fn order(&self) -> i32 {
        Self::ORDER
    }

    async fn execute(&self, ctx: &mut RequestContext) -> Result<StageOutcome> {
        let plan = ctx.get(AGENT_PLAN)?;
        let trace_id = ctx.trace_id();

        let mut stages = Vec::new();
        for stage in &plan.selected_stages {
            if self.known_stages.contains(stage) {
                stages.push(stage.clone());
            } else {
                log::warn!("[{}] dynamic_context: plan names unknown stage '{}'", trace_id, stage);
            }
        }

        let mut tools = Vec::new();
        for tool in &plan.tool_allow_list {
            if self.tools.contains(tool) {
                tools.push(tool.clone());
            } else {
                log::warn!("[{}] dynamic_context: dropping unknown tool '{}'", trace_id, tool);
            }
        }

        log::debug!(
            "[{}] dynamic_context: active={:?} tools={:?}",
            trace_id,
            stages,
            tools
        );
        ctx.put(ACTIVE_STAGES, ActiveStages::new(stages))?;
        ctx.put(RESOLVED_TOOLS, ResolvedTools(tools))?;
        Ok(StageOutcome::Continue)
    }
}
