//! Mental simulation: scores alternative renderings of the final text and keeps the best.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::chain::stage::{Stage, StageId, StageOutcome};
use crate::context::keys::{DRAFT, FINAL_TEXT, SIMULATION_RECORD};
use crate::context::RequestContext;
use crate::error::{BrainError, Result};
use crate::mental::{Framing, MentalSimulator, ResponseScenario};

/// What the simulation stage picked, for explainability.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationRecord {
    pub scenario: ResponseScenario,
    pub predicted_reaction: String,
    /// Scenarios considered.
    pub candidates: usize,
}

/// Optional stage that keeps the best-scoring rendering of the final text.
pub struct MentalSimulationStage {
    simulator: Arc<MentalSimulator>,
}

impl MentalSimulationStage {
    pub const ORDER: i32 = 60;

    pub fn new(simulator: Arc<MentalSimulator>) -> Self {
        Self { simulator }
    }
}

#[async_trait]
impl Stage for MentalSimulationStage {
    fn id(&self) -> StageId {
        StageId::MENTAL_SIMULATION
    }

    fn order(&self) -> i32 {
        Self::ORDER
    }

    fn optional(&self) -> bool {
        true
    }

    async fn execute(&self, ctx: &mut RequestContext) -> Result<StageOutcome> {
        let candidate = ctx.get(FINAL_TEXT)?;
        // Tone framing shows up as a difference from the judged draft.
        let framing = match ctx.try_get(DRAFT) {
            Some(draft) if draft.text.trim() != candidate.trim() => Framing::ToneApplied,
            _ => Framing::Plain,
        };
        let scenarios =
            self.simulator
                .simulate_scenarios_with(&ctx.request().message, candidate, framing);
        let best = self
            .simulator
            .evaluate_and_select_best(&scenarios)
            .cloned()
            .ok_or_else(|| BrainError::StageFailed {
                stage: StageId::MENTAL_SIMULATION.to_string(),
                message: "no scenarios to choose from".into(),
            })?;

        let record = SimulationRecord {
            predicted_reaction: self.simulator.predict_user_reaction(&best),
            candidates: scenarios.len(),
            scenario: best,
        };
        log::debug!(
            "[{}] mental_simulation: picked {:?} (overall {:.2}) of {}",
            ctx.trace_id(),
            record.scenario.style,
            record.scenario.overall_score,
            record.candidates
        );

        ctx.put(FINAL_TEXT, record.scenario.text.clone())?;
        ctx.put(SIMULATION_RECORD, record)?;
        Ok(StageOutcome::Continue)
    }
}
