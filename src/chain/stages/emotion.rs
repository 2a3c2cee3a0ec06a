//! Early stages: emotional detection and per-user mental-state update.

use std::sync::Arc;

use async_trait::async_trait;

use crate::chain::stage::{Stage, StageId, StageOutcome};
use crate::context::keys::{EMOTIONAL_CONTEXT, EMOTIONAL_READING, MENTAL_MODEL};
use crate::context::RequestContext;
use crate::emotion::EmotionalAnalyzer;
use crate::error::Result;
use crate::mental::MentalStateInferencer;

/// Analyzes the message and freezes its [`EmotionalContext`](crate::emotion::EmotionalContext).
pub struct EmotionStage {
    analyzer: Arc<EmotionalAnalyzer>,
}

impl EmotionStage {
    pub const ORDER: i32 = -20;

    pub fn new(analyzer: Arc<EmotionalAnalyzer>) -> Self {
        Self { analyzer }
    }
}

#[async_trait]
impl Stage for EmotionStage {
    fn id(&self) -> StageId {
        StageId::EMOTION
    }

    fn order(&self) -> i32 {
        Self::ORDER
    }

    async fn execute(&self, ctx: &mut RequestContext) -> Result<StageOutcome> {
        let reading = self.analyzer.analyze_detailed(&ctx.request().message);
        log::debug!(
            "[{}] emotion: {} (intensity {:.2})",
            ctx.trace_id(),
            reading.context.current_state(),
            reading.context.emotional_intensity()
        );
        ctx.put_frozen(EMOTIONAL_CONTEXT, reading.context)?;
        ctx.put(EMOTIONAL_READING, reading)?;
        Ok(StageOutcome::Continue)
    }
}

/// Folds this message's reading into the user's longitudinal model.
pub struct MentalStateStage {
    inferencer: Arc<MentalStateInferencer>,
}

impl MentalStateStage {
    pub const ORDER: i32 = -10;

    pub fn new(inferencer: Arc<MentalStateInferencer>) -> Self {
        Self { inferencer }
    }
}

#[async_trait]
impl Stage for MentalStateStage {
    fn id(&self) -> StageId {
        StageId::MENTAL_STATE
    }

    fn order(&self) -> i32 {
        Self::ORDER
    }

    async fn execute(&self, ctx: &mut RequestContext) -> Result<StageOutcome> {
        let reading = ctx.get(EMOTIONAL_READING)?;
        // Synchronous: the per-user lock is released before this returns.
        let model = self.inferencer.observe(&ctx.request().user_id, reading);
        ctx.put(MENTAL_MODEL, model)?;
        Ok(StageOutcome::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InferencerConfig;
    use crate::emotion::{EmotionalContext, EmotionalState};
    use crate::error::BrainError;
    use crate::testing::ctx_for;

    #[tokio::test]
    async fn test_emotion_then_mental_state() {
        let analyzer = Arc::new(EmotionalAnalyzer::default());
        let inferencer = Arc::new(MentalStateInferencer::new(
            Arc::clone(&analyzer),
            InferencerConfig::default(),
        ));
        let mut ctx = ctx_for("I'm really frustrated, this isn't working!!");

        EmotionStage::new(analyzer).execute(&mut ctx).await.unwrap();
        let emotional = *ctx.get(EMOTIONAL_CONTEXT).unwrap();
        assert_eq!(emotional.current_state(), EmotionalState::Frustrated);
        assert!(matches!(
            ctx.put(EMOTIONAL_CONTEXT, EmotionalContext::neutral()),
            Err(BrainError::FrozenContextKey { key: "emotionalContext", .. })
        ));

        MentalStateStage::new(Arc::clone(&inferencer))
            .execute(&mut ctx)
            .await
            .unwrap();
        let model = ctx.get(MENTAL_MODEL).unwrap();
        assert_eq!(model.user_id, "user-1");
        assert!(model.frustration_level > 0.0);
        assert_eq!(inferencer.get_mental_model("user-1").observations, 1);
    }

    #[tokio::test]
    async fn test_mental_state_requires_reading() {
        let inferencer = Arc::new(MentalStateInferencer::new(
            Arc::new(EmotionalAnalyzer::default()),
            InferencerConfig::default(),
        ));
        let mut ctx = ctx_for("hello");
        let err = MentalStateStage::new(inferencer)
            .execute(&mut ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, BrainError::MissingContextKey { key: "emotionalReading" }));
    }
}
