//! Judge/refine loop over the responder's draft.
//!
//! Each iteration runs every [`QualityCheck`] against the current draft. If
//! any check misses its threshold and iterations remain, the draft is sent
//! back through the completion capability with the failing checks' guidance.
//! At most `max_iterations` judging passes run per request.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::chain::stage::{Stage, StageId, StageOutcome};
use crate::config::JudgeConfig;
use crate::context::keys::{DRAFT, REFINEMENT_REPORT};
use crate::context::RequestContext;
use crate::error::Result;
use crate::heuristics;
use crate::llm::{with_timeout, TextCompletion};

/// One independent quality measurement, scored in `[0, 1]`.
pub trait QualityCheck: Send + Sync {
    /// Key into `judge.thresholds`.
    fn name(&self) -> &str;

    fn score(&self, query: &str, response: &str) -> f32;

    /// Instruction handed to the refiner when this check fails.
    fn guidance(&self) -> &str;
}

/// Penalizes long sentences.
#[derive(Debug, Default, Clone, Copy)]
pub struct Clarity;

impl QualityCheck for Clarity {
    fn name(&self) -> &str {
        "clarity"
    }

    fn score(&self, _query: &str, response: &str) -> f32 {
        heuristics::clarity(response)
    }

    fn guidance(&self) -> &str {
        "Use shorter sentences and plain words."
    }
}

/// Rewards mentioning the query's content words.
#[derive(Debug, Default, Clone, Copy)]
pub struct Relevance;

impl QualityCheck for Relevance {
    fn name(&self) -> &str {
        "relevance"
    }

    fn score(&self, query: &str, response: &str) -> f32 {
        heuristics::relevance(query, response)
    }

    fn guidance(&self) -> &str {
        "Answer the question that was asked and refer to its key terms."
    }
}

/// Penalizes overclaiming and self-undermining hedges.
#[derive(Debug, Default, Clone, Copy)]
pub struct FactualConsistency;

const ABSOLUTES: &[&str] = &["always", "never", "guaranteed", "100%"];
const HEDGES: &[&str] = &["i'm not sure", "i don't know", "as an ai"];

impl QualityCheck for FactualConsistency {
    fn name(&self) -> &str {
        "factual_consistency"
    }

    fn score(&self, _query: &str, response: &str) -> f32 {
        let lower = response.to_lowercase();
        let hits: usize = ABSOLUTES
            .iter()
            .chain(HEDGES)
            .map(|phrase| lower.matches(phrase).count())
            .sum();
        (1.0 - 0.2 * hits as f32).max(0.0)
    }

    fn guidance(&self) -> &str {
        "Avoid absolute claims and do not hedge about your own knowledge."
    }
}

/// Rewards answers the reader can act on.
#[derive(Debug, Default, Clone, Copy)]
pub struct Helpfulness;

/// Word count at which an answer stops gaining points for length.
const SUBSTANTIAL_WORDS: f32 = 30.0;

impl QualityCheck for Helpfulness {
    fn name(&self) -> &str {
        "helpfulness"
    }

    fn score(&self, _query: &str, response: &str) -> f32 {
        if response.trim().is_empty() {
            return 0.0;
        }
        let structure = if heuristics::has_actionable_structure(response) {
            0.6
        } else {
            0.0
        };
        let substance = (heuristics::word_count(response) as f32 / SUBSTANTIAL_WORDS).min(1.0);
        structure + 0.4 * substance
    }

    fn guidance(&self) -> &str {
        "Give concrete steps, commands, or code the user can apply."
    }
}

/// One check's result on one draft.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Verdict {
    pub check: String,
    pub score: f32,
    pub threshold: f32,
    pub passed: bool,
}

/// Outcome of the judge/refine loop.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefinementReport {
    /// Judging passes that ran.
    pub iterations: u32,
    pub passed: bool,
    /// Verdicts of the last pass.
    pub verdicts: Vec<Verdict>,
    pub refinements_failed: u32,
}

/// Scores the draft and refines it until every check passes or the budget is spent.
pub struct JudgeStage {
    completion: Arc<dyn TextCompletion>,
    checks: Vec<Arc<dyn QualityCheck>>,
    config: JudgeConfig,
    timeout: Duration,
}

impl JudgeStage {
    pub const ORDER: i32 = 40;

    /// Judge with the four built-in checks.
    pub fn new(completion: Arc<dyn TextCompletion>, config: JudgeConfig, timeout: Duration) -> Self {
        Self {
            completion,
            checks: vec![
                Arc::new(Clarity),
                Arc::new(Relevance),
                Arc::new(FactualConsistency),
                Arc::new(Helpfulness),
            ],
            config,
            timeout,
        }
    }

    /// Replace the built-in checks.
    pub fn with_checks(mut self, checks: Vec<Arc<dyn QualityCheck>>) -> Self {
        self.checks = checks;
        self
    }

    /// Run every check over `response`.
    pub fn judge(&self, query: &str, response: &str) -> Vec<Verdict> {
        self.checks
            .iter()
            .map(|check| {
                let score = check.score(query, response).clamp(0.0, 1.0);
                let threshold = self.config.threshold(check.name());
                Verdict {
                    check: check.name().to_string(),
                    score,
                    threshold,
                    passed: score >= threshold,
                }
            })
            .collect()
    }

    fn refine_prompt(&self, query: &str, draft: &str, verdicts: &[Verdict]) -> String {
        let mut prompt = String::from("Revise the answer below so that it:\n");
        for verdict in verdicts.iter().filter(|v| !v.passed) {
            if let Some(check) = self.checks.iter().find(|c| c.name() == verdict.check) {
                prompt.push_str(&format!(
                    "- {} ({} scored {:.2}, needs {:.2})\n",
                    check.guidance(),
                    verdict.check,
                    verdict.score,
                    verdict.threshold
                ));
            }
        }
        prompt.push_str("\nAnswer:\n");
        prompt.push_str(draft);
        prompt.push_str("\n\nQuestion: ");
        prompt.push_str(&query.split_whitespace().collect::<Vec<_>>().join(" "));
        prompt
    }
}

#[async_trait]
impl Stage for JudgeStage {
    fn id(&self) -> StageId {
        StageId::JUDGE
    }

    fn order(&self) -> i32 {
        Self::ORDER
    }

    async fn execute(&self, ctx: &mut RequestContext) -> Result<StageOutcome> {
        let query = ctx.request().message.clone();
        let mut draft = ctx.get(DRAFT)?.clone();
        let max_iterations = self.config.max_iterations.max(1);
        let mut report = RefinementReport::default();

        for iteration in 1..=max_iterations {
            report.iterations = iteration;
            report.verdicts = self.judge(&query, &draft.text);
            if report.verdicts.iter().all(|v| v.passed) {
                report.passed = true;
                break;
            }
            if iteration == max_iterations {
                break;
            }

            let prompt = self.refine_prompt(&query, &draft.text, &report.verdicts);
            match with_timeout("refinement", self.timeout, self.completion.complete(&prompt)).await
            {
                Ok(text) if !text.trim().is_empty() => draft = draft.refined(text),
                Ok(_) => {
                    report.refinements_failed += 1;
                    log::warn!("[{}] judge: refinement returned empty text", ctx.trace_id());
                }
                Err(e) => {
                    report.refinements_failed += 1;
                    log::warn!("[{}] judge: refinement failed: {}", ctx.trace_id(), e);
                }
            }
        }

        log::debug!(
            "[{}] judge: passed={} after {} iteration(s)",
            ctx.trace_id(),
            report.passed,
            report.iterations
        );

        let outcome = if report.passed {
            StageOutcome::Continue
        } else {
            let failing: Vec<&str> = report
                .verdicts
                .iter()
                .filter(|v| !v.passed)
                .map(|v| v.check.as_str())
                .collect();
            StageOutcome::Degraded {
                reason: format!(
                    "quality checks still failing after {} iteration(s): {}",
                    report.iterations,
                    failing.join(", ")
                ),
            }
        };

        ctx.put(DRAFT, draft)?;
        ctx.put(REFINEMENT_REPORT, report)?;
        Ok(outcome)
    }
}
