//! Tone: wraps the judged draft for the user's emotional state.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::chain::stage::{Stage, StageId, StageOutcome};
use crate::context::keys::{DRAFT, EMOTIONAL_CONTEXT, FINAL_TEXT, TONE_ADVICE};
use crate::context::RequestContext;
use crate::emotion::EmotionalToneAdjuster;
use crate::error::Result;

/// Presentation flags derived from the emotional context.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToneAdvice {
    pub include_examples: bool,
    pub include_step_by_step: bool,
}

/// Applies the tone table to the judged draft.
pub struct ToneStage {
    adjuster: Arc<EmotionalToneAdjuster>,
}

impl ToneStage {
    pub const ORDER: i32 = 50;

    pub fn new(adjuster: Arc<EmotionalToneAdjuster>) -> Self {
        Self { adjuster }
    }
}

#[async_trait]
impl Stage for ToneStage {
    fn id(&self) -> StageId {
        StageId::TONE
    }

    fn order(&self) -> i32 {
        Self::ORDER
    }

    async fn execute(&self, ctx: &mut RequestContext) -> Result<StageOutcome> {
        let emotion = *ctx.get(EMOTIONAL_CONTEXT)?;
        let text = self.adjuster.adjust_tone(&ctx.get(DRAFT)?.text, &emotion);
        let advice = ToneAdvice {
            include_examples: self.adjuster.should_include_examples(&emotion),
            include_step_by_step: self.adjuster.should_include_step_by_step(&emotion),
        };
        ctx.put(FINAL_TEXT, text)?;
        ctx.put(TONE_ADVICE, advice)?;
        Ok(StageOutcome::Continue)
    }
}
