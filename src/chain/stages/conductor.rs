//! Conductor: picks a strategy and writes the frozen [`AgentPlan`].

use std::collections::BTreeSet;

use async_trait::async_trait;

use crate::chain::plan::{AgentPlan, Strategy, StrategyTable};
use crate::chain::stage::{Stage, StageId, StageOutcome};
use crate::context::keys::{AGENT_PLAN, EMOTIONAL_CONTEXT, HISTORY, MENTAL_MODEL};
use crate::context::RequestContext;
use crate::emotion::{EmotionalContext, EmotionalState};
use crate::error::Result;
use crate::heuristics;
use crate::mental::UserMentalModel;
use crate::provider::ConversationHistory;

/// Overlap with an earlier user message above which a query counts as repeated.
const REPEAT_OVERLAP: f32 = 0.6;
/// Longitudinal level above which the user model alone steers the strategy.
const SUSTAINED_LEVEL: f32 = 0.5;

/// Order 0: picks the strategy and freezes the [`AgentPlan`].
pub struct ConductorStage {
    table: StrategyTable,
    denied_tools: BTreeSet<String>,
    registered_tools: BTreeSet<String>,
}

impl ConductorStage {
    pub const ORDER: i32 = 0;

    /// `registered_tools` bounds every allow-list; `denied_tools` are removed from it.
    pub fn new(
        table: StrategyTable,
        denied_tools: impl IntoIterator<Item = String>,
        registered_tools: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            table,
            denied_tools: denied_tools.into_iter().collect(),
            registered_tools: registered_tools.into_iter().collect(),
        }
    }

    /// Build the plan without touching a context. Used by `execute` and tests.
    pub fn plan(
        &self,
        message: &str,
        emotion: &EmotionalContext,
        model: Option<&UserMentalModel>,
        history: Option<&ConversationHistory>,
    ) -> AgentPlan {
        let (strategy, rationale) = choose_strategy(message, emotion, model, history);
        let profile = self.table.profile(strategy);

        let mut selected_stages = Vec::new();
        for stage in profile.stages {
            if !selected_stages.contains(&stage) {
                selected_stages.push(stage);
            }
        }

        let tool_allow_list: BTreeSet<String> = profile
            .tools
            .iter()
            .flat_map(|need| need.candidates())
            .filter(|t| !self.denied_tools.contains(*t))
            .filter(|t| self.registered_tools.contains(*t))
            .map(str::to_string)
            .collect();

        AgentPlan {
            strategy,
            selected_stages,
            tool_allow_list,
            tool_needs: profile.tools,
            rationale,
        }
    }
}

fn choose_strategy(
    message: &str,
    emotion: &EmotionalContext,
    model: Option<&UserMentalModel>,
    history: Option<&ConversationHistory>,
) -> (Strategy, String) {
    use EmotionalState::*;

    let state = emotion.current_state();
    if matches!(state, Rushed | Urgent) || emotion.urgency_level() >= 0.5 {
        return (Strategy::QuickFix, format!("user is {}", state));
    }
    if matches!(state, Frustrated | Negative) {
        return (Strategy::Troubleshoot, format!("user is {}", state));
    }
    if let Some(repeat) = history.and_then(|h| repeated_question(message, h)) {
        return (
            Strategy::Troubleshoot,
            format!("question repeats an earlier one ({:.0}% overlap)", repeat * 100.0),
        );
    }
    if model.is_some_and(|m| m.frustration_level >= SUSTAINED_LEVEL) {
        return (Strategy::Troubleshoot, "sustained frustration".to_string());
    }
    if matches!(state, Confused | Curious) || emotion.learning_intent() {
        return (Strategy::Explain, format!("user is {}", state));
    }
    if model.is_some_and(|m| m.confusion_level >= SUSTAINED_LEVEL) {
        return (Strategy::Explain, "sustained confusion".to_string());
    }
    if state == Confident {
        return (Strategy::Advanced, "user is confident".to_string());
    }
    (Strategy::Direct, "no strong signal".to_string())
}

/// Highest overlap with an earlier user message, if it crosses the threshold.
fn repeated_question(message: &str, history: &ConversationHistory) -> Option<f32> {
    if heuristics::content_words(message).len() < 2 {
        return None;
    }
    history
        .user_messages()
        .filter(|earlier| !earlier.trim().is_empty())
        .map(|earlier| heuristics::relevance(message, earlier))
        .filter(|overlap| *overlap >= REPEAT_OVERLAP)
        .reduce(f32::max)
}

#[async_trait]
impl Stage for ConductorStage {
    fn id(&self) -> StageId {
        StageId::CONDUCTOR
    }

    fn order(&self) -> i32 {
        Self::ORDER
    }

    async fn execute(&self, ctx: &mut RequestContext) -> Result<StageOutcome> {
        let emotion = *ctx.get(EMOTIONAL_CONTEXT)?;
        let plan = self.plan(
            &ctx.request().message,
            &emotion,
            ctx.try_get(MENTAL_MODEL),
            ctx.try_get(HISTORY),
        );
        log::info!(
            "[{}] conductor: strategy={} ({}), stages={:?}, tools={:?}",
            ctx.trace_id(),
            plan.strategy,
            plan.rationale,
            plan.selected_stages,
            plan.tool_allow_list
        );
        ctx.put_frozen(AGENT_PLAN, plan)?;
        Ok(StageOutcome::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emotion::EmotionalAnalyzer;
    use crate::error::BrainError;
    use crate::provider::ConversationTurn;
    use crate::testing::ctx_for;

    fn conductor(denied: &[&str]) -> ConductorStage {
        ConductorStage::new(
            StrategyTable::builtin(),
            denied.iter().map(|s| s.to_string()),
            ["edit_history", "acceptance_stats", "conversation_recall"]
                .iter()
                .map(|s| s.to_string()),
        )
    }

    fn emotion(text: &str) -> EmotionalContext {
        EmotionalAnalyzer::default().analyze(text)
    }

    #[test]
    fn test_strategy_follows_emotion() {
        let c = conductor(&[]);
        let cases = [
            ("need this fixed asap", Strategy::QuickFix),
            ("I'm stuck, the build is not working", Strategy::Troubleshoot),
            ("I'm confused about lifetimes", Strategy::Explain),
            ("rename the variable", Strategy::Direct),
        ];
        for (text, expected) in cases {
            let plan = c.plan(text, &emotion(text), None, None);
            assert_eq!(plan.strategy, expected, "{text}");
        }
    }

    #[test]
    fn test_sustained_frustration_from_model() {
        let c = conductor(&[]);
        let mut model = UserMentalModel::new("u");
        model.frustration_level = 0.7;
        let plan = c.plan("rename the variable", &emotion("rename the variable"), Some(&model), None);
        assert_eq!(plan.strategy, Strategy::Troubleshoot);
        assert_eq!(plan.rationale, "sustained frustration");
    }

    #[test]
    fn test_repeated_question_escalates() {
        let c = conductor(&[]);
        let history = ConversationHistory {
            conversation_id: "c".into(),
            turns: vec![
                ConversationTurn::user("configure redis cache eviction policy"),
                ConversationTurn::assistant("Set maxmemory-policy."),
            ],
        };
        let text = "how do I configure redis cache eviction";
        let plan = c.plan(text, &emotion(text), None, Some(&history));
        assert_eq!(plan.strategy, Strategy::Troubleshoot);
        assert!(plan.rationale.contains("repeats"));
    }

    #[test]
    fn test_allow_list_excludes_denied_and_unregistered() {
        let c = ConductorStage::new(
            StrategyTable::builtin(),
            vec!["acceptance_stats".to_string()],
            vec!["edit_history".to_string(), "acceptance_stats".to_string()],
        );
        let text = "I'm stuck";
        let plan = c.plan(text, &emotion(text), None, None);
        assert_eq!(plan.strategy, Strategy::Troubleshoot);
        // conversation_recall is a fallback but not registered here.
        assert_eq!(
            plan.tool_allow_list.iter().collect::<Vec<_>>(),
            vec!["edit_history"]
        );
        assert!(plan.selects(&StageId::CONTEXT_GATHER));
    }

    #[tokio::test]
    async fn test_plan_is_frozen_once_written() {
        let mut ctx = ctx_for("rename the variable");
        ctx.put(EMOTIONAL_CONTEXT, EmotionalContext::neutral()).unwrap();
        let stage = conductor(&[]);
        stage.execute(&mut ctx).await.unwrap();
        assert_eq!(ctx.get(AGENT_PLAN).unwrap().strategy, Strategy::Direct);
        assert!(matches!(
            stage.execute(&mut ctx).await,
            Err(BrainError::FrozenContextKey { key: "agentPlan", .. })
        ));
    }

    #[tokio::test]
    async fn test_requires_emotional_context() {
        let mut ctx = ctx_for("hello");
        assert!(matches!(
            conductor(&[]).execute(&mut ctx).await,
            Err(BrainError::MissingContextKey { .. })
        ));
    }
}
