//! Tool policy: installs the request's [`ToolGuard`] from the plan.

use async_trait::async_trait;

use crate::chain::stage::{Stage, StageId, StageOutcome};
use crate::chain::tools::{EnforcementMode, ToolGuard};
use crate::context::keys::{AGENT_PLAN, TOOL_GUARD};
use crate::context::RequestContext;
use crate::error::Result;

/// Installs the request's frozen [`ToolGuard`].
pub struct ToolPolicyStage {
    enforcement: EnforcementMode,
}

impl ToolPolicyStage {
    pub const ORDER: i32 = 20;

    pub fn new(enforcement: EnforcementMode) -> Self {
        Self { enforcement }
    }
}

#[async_trait]
impl Stage for ToolPolicyStage {
    fn id(&self) -> StageId {
        StageId::TOOL_POLICY
    }

    fn order(&self) -> i32 {
        Self::ORDER
    }

    async fn execute(&self, ctx: &mut RequestContext) -> Result<StageOutcome> {
        let allow_list = ctx.get(AGENT_PLAN)?.tool_allow_list.clone();
        if self.enforcement == EnforcementMode::AuditOnly {
            log::warn!(
                "[{}] tool_policy: running in audit-only mode",
                ctx.trace_id()
            );
        }
        ctx.put_frozen(TOOL_GUARD, ToolGuard::new(allow_list, self.enforcement))?;
        Ok(StageOutcome::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::plan::{AgentPlan, Strategy};
    use crate::error::BrainError;
    use crate::testing::ctx_for;
    use std::collections::BTreeSet;

    #[tokio::test]
    async fn test_guard_mirrors_plan_allow_list() {
        let mut ctx = ctx_for("x");
        ctx.put_frozen(
            AGENT_PLAN,
            AgentPlan {
                strategy: Strategy::QuickFix,
                selected_stages: Vec::new(),
                tool_allow_list: std::iter::once("edit_history".to_string()).collect(),
                tool_needs: Vec::new(),
                rationale: String::new(),
            },
        )
        .unwrap();
        ToolPolicyStage::new(EnforcementMode::Strict)
            .execute(&mut ctx)
            .await
            .unwrap();
        let guard = ctx.get(TOOL_GUARD).unwrap();
        assert!(guard.is_allowed("edit_history"));
        assert!(!guard.is_allowed("conversation_recall"));
        assert_eq!(guard.enforcement(), EnforcementMode::Strict);

        // Frozen: a later stage cannot swap in a looser guard, but audits still land.
        assert!(guard.authorize("conversation_recall", "context_gather").is_err());
        assert_eq!(guard.audit_count(), 1);
        let looser = ToolGuard::new(BTreeSet::new(), EnforcementMode::AuditOnly);
        assert!(matches!(
            ctx.put(TOOL_GUARD, looser),
            Err(BrainError::FrozenContextKey { key: "toolGuard", .. })
        ));
    }
}
