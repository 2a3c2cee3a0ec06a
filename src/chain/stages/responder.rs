//! Responder: drafts the answer through the completion capability.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::chain::plan::{Draft, DraftSource};
use crate::chain::stage::{Stage, StageId, StageOutcome};
use crate::chain::tools::ToolFindings;
use crate::context::keys::{AGENT_PLAN, DRAFT, EMOTIONAL_CONTEXT, TOOL_FINDINGS};
use crate::context::RequestContext;
use crate::emotion::EmotionalToneAdjuster;
use crate::error::Result;
use crate::llm::{with_timeout, TextCompletion};

/// Last-resort reply when nothing better is available.
pub const APOLOGY: &str =
    "Sorry, I couldn't put together an answer just now. Please try again in a moment.";

/// Drafts the answer through the completion backend.
pub struct ResponderStage {
    completion: Arc<dyn TextCompletion>,
    tone: Arc<EmotionalToneAdjuster>,
    timeout: Duration,
}

impl ResponderStage {
    pub const ORDER: i32 = 30;

    pub fn new(
        completion: Arc<dyn TextCompletion>,
        tone: Arc<EmotionalToneAdjuster>,
        timeout: Duration,
    ) -> Self {
        Self {
            completion,
            tone,
            timeout,
        }
    }

    fn prompt(&self, ctx: &RequestContext) -> Result<String> {
        let plan = ctx.get(AGENT_PLAN)?;
        let emotion = ctx.get(EMOTIONAL_CONTEXT)?;

        let mut lines = vec![
            "You are a senior developer helping a colleague.".to_string(),
            format!("Strategy: {} - {}", plan.strategy, plan.strategy.instruction()),
        ];
        if self.tone.should_include_step_by_step(emotion) {
            lines.push("Break the answer into numbered steps.".to_string());
        }
        if self.tone.should_include_examples(emotion) {
            lines.push("Include a short, concrete example.".to_string());
        }
        if let Some(findings) = ctx.try_get(TOOL_FINDINGS).filter(|f| !f.is_empty()) {
            lines.push(format!("Context about this user:\n{}", findings.summary()));
        }
        lines.push(format!("Question: {}", one_line(&ctx.request().message)));
        Ok(lines.join("\n"))
    }
}

fn one_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Draft used when the completion capability is unavailable.
pub fn fallback_draft(findings: Option<&ToolFindings>) -> String {
    match findings.filter(|f| !f.is_empty()) {
        Some(f) => format!(
            "I couldn't generate a full answer right now, but here is what I found that may help:\n\n{}",
            f.summary()
        ),
        None => APOLOGY.to_string(),
    }
}

#[async_trait]
impl Stage for ResponderStage {
    fn id(&self) -> StageId {
        StageId::RESPONDER
    }

    fn order(&self) -> i32 {
        Self::ORDER
    }

    async fn execute(&self, ctx: &mut RequestContext) -> Result<StageOutcome> {
        let prompt = self.prompt(ctx)?;
        let result = with_timeout("completion", self.timeout, self.completion.complete(&prompt)).await;

        let draft = match result {
            Ok(text) if !text.trim().is_empty() => Draft::new(text, DraftSource::Completion),
            Ok(_) => {
                log::warn!("[{}] responder: completion returned empty text", ctx.trace_id());
                Draft::new(fallback_draft(ctx.try_get(TOOL_FINDINGS)), DraftSource::Fallback)
            }
            Err(e) => {
                log::warn!(
                    "[{}] responder: {} failed: {}",
                    ctx.trace_id(),
                    self.completion.name(),
                    e
                );
                Draft::new(fallback_draft(ctx.try_get(TOOL_FINDINGS)), DraftSource::Fallback)
            }
        };
        ctx.put(DRAFT, draft)?;
        Ok(StageOutcome::Continue)
    }
}
