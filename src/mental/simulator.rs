//! Multi-scenario response simulation.
//!
//! Given a query and a candidate answer, the simulator builds a fixed set of
//! stylistic variants, scores each against weighted criteria for the
//! hypothetical user described by the query's emotional reading, and picks
//! the best. Nothing here is ever shown to a real user except the winning
//! text; the predicted reaction is for logs and debugging.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::SimulatorConfig;
use crate::emotion::{EmotionalAnalyzer, EmotionalContext, EmotionalState};
use crate::heuristics;

/// A scoring criterion. Declaration order breaks ties for the dominant criterion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Criterion {
    Clarity,
    Relevance,
    EmpathyFit,
    /// Scored so that 1.0 means *low* risk of misunderstanding.
    MisunderstandingRisk,
}

impl Criterion {
    pub const ALL: [Criterion; 4] = [
        Criterion::Clarity,
        Criterion::Relevance,
        Criterion::EmpathyFit,
        Criterion::MisunderstandingRisk,
    ];

    fn describe(self) -> &'static str {
        match self {
            Criterion::Clarity => "clarity",
            Criterion::Relevance => "relevance to the question",
            Criterion::EmpathyFit => "fit with how they are feeling",
            Criterion::MisunderstandingRisk => "low risk of being misunderstood",
        }
    }
}

impl fmt::Display for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Criterion::Clarity => "clarity",
            Criterion::Relevance => "relevance",
            Criterion::EmpathyFit => "empathy_fit",
            Criterion::MisunderstandingRisk => "misunderstanding_risk",
        })
    }
}

/// Stylistic variant, in generation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioStyle {
    EmpatheticDetailed,
    ConciseDirect,
    TechnicalAdvanced,
}

impl ScenarioStyle {
    pub const ALL: [ScenarioStyle; 3] = [
        ScenarioStyle::EmpatheticDetailed,
        ScenarioStyle::ConciseDirect,
        ScenarioStyle::TechnicalAdvanced,
    ];

    fn label(self) -> &'static str {
        match self {
            ScenarioStyle::EmpatheticDetailed => "empathetic, detailed",
            ScenarioStyle::ConciseDirect => "concise, direct",
            ScenarioStyle::TechnicalAdvanced => "technical, advanced",
        }
    }

    /// How well this style suits a user in `state`, before intensity scaling.
    fn fit(self, state: EmotionalState) -> f32 {
        use EmotionalState::*;
        use ScenarioStyle::*;
        match (state, self) {
            (Frustrated | Negative, EmpatheticDetailed) => 1.0,
            (Frustrated | Negative, ConciseDirect) => 0.5,
            (Frustrated | Negative, TechnicalAdvanced) => 0.2,
            (Confused, EmpatheticDetailed) => 0.9,
            (Confused, ConciseDirect) => 0.4,
            (Confused, TechnicalAdvanced) => 0.2,
            (Rushed | Urgent, EmpatheticDetailed) => 0.3,
            (Rushed | Urgent, ConciseDirect) => 1.0,
            (Rushed | Urgent, TechnicalAdvanced) => 0.4,
            (Confident, EmpatheticDetailed) => 0.3,
            (Confident, ConciseDirect) => 0.6,
            (Confident, TechnicalAdvanced) => 1.0,
            (Curious, EmpatheticDetailed) => 0.6,
            (Curious, ConciseDirect) => 0.3,
            (Curious, TechnicalAdvanced) => 0.9,
            (Neutral | Positive, EmpatheticDetailed) => 0.5,
            (Neutral | Positive, ConciseDirect) => 0.8,
            (Neutral | Positive, TechnicalAdvanced) => 0.6,
        }
    }
}

/// Whether the candidate already carries tone framing (an opener or closer).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Framing {
    #[default]
    Plain,
    /// The empathetic variant then adds no framing of its own.
    ToneApplied,
}

/// One candidate variant with its scores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseScenario {
    pub style: ScenarioStyle,
    /// The emotional state the scenario was scored for.
    pub audience: EmotionalState,
    pub text: String,
    pub criteria_scores: BTreeMap<Criterion, f32>,
    pub overall_score: f32,
}

impl ResponseScenario {
    /// Highest-scoring criterion; ties go to the earlier-declared criterion.
    pub fn dominant_criterion(&self) -> Option<(Criterion, f32)> {
        let mut best: Option<(Criterion, f32)> = None;
        for criterion in Criterion::ALL {
            if let Some(score) = self.criteria_scores.get(&criterion) {
                if best.map_or(true, |(_, b)| *score > b) {
                    best = Some((criterion, *score));
                }
            }
        }
        best
    }
}

/// Generates, scores, and selects response scenarios.
#[derive(Debug, Clone)]
pub struct MentalSimulator {
    analyzer: Arc<EmotionalAnalyzer>,
    weights: BTreeMap<Criterion, f32>,
}

impl MentalSimulator {
    /// `config.weights` are expected to be validated (see [`BrainConfig::validate`](crate::config::BrainConfig::validate)).
    pub fn new(analyzer: Arc<EmotionalAnalyzer>, config: &SimulatorConfig) -> Self {
        Self {
            analyzer,
            weights: config.weights.clone(),
        }
    }

    /// One scenario per [`ScenarioStyle`], in generation order.
    pub fn simulate_scenarios(&self, query: &str, candidate: &str) -> Vec<ResponseScenario> {
        self.simulate_scenarios_with(query, candidate, Framing::Plain)
    }

    /// Like [`simulate_scenarios`](Self::simulate_scenarios) for a candidate
    /// whose framing is described by `framing`.
    pub fn simulate_scenarios_with(
        &self,
        query: &str,
        candidate: &str,
        framing: Framing,
    ) -> Vec<ResponseScenario> {
        let audience = self.analyzer.analyze(query);
        ScenarioStyle::ALL
            .iter()
            .map(|style| {
                let text = render(*style, candidate, framing);
                self.score(*style, &audience, query, text)
            })
            .collect()
    }

    /// Maximum `overall_score`; ties keep the earliest scenario.
    pub fn evaluate_and_select_best<'a>(
        &self,
        scenarios: &'a [ResponseScenario],
    ) -> Option<&'a ResponseScenario> {
        let mut best: Option<&ResponseScenario> = None;
        for scenario in scenarios {
            if best.map_or(true, |b| scenario.overall_score > b.overall_score) {
                best = Some(scenario);
            }
        }
        best
    }

    /// One-line guess at how the scenario's audience would react.
    pub fn predict_user_reaction(&self, scenario: &ResponseScenario) -> String {
        let verdict = if scenario.overall_score >= 0.75 {
            "helpful and well pitched"
        } else if scenario.overall_score >= 0.5 {
            "useful, if not perfectly pitched"
        } else {
            "hard to act on"
        };
        match scenario.dominant_criterion() {
            Some((criterion, score)) => format!(
                "A {} user would likely find the {} response {}; its strongest quality is {} ({:.2}), overall {:.2}.",
                scenario.audience,
                scenario.style.label(),
                verdict,
                criterion.describe(),
                score,
                scenario.overall_score,
            ),
            None => format!(
                "A {} user would likely find the {} response {} (overall {:.2}).",
                scenario.audience,
                scenario.style.label(),
                verdict,
                scenario.overall_score,
            ),
        }
    }

    fn score(
        &self,
        style: ScenarioStyle,
        audience: &EmotionalContext,
        query: &str,
        text: String,
    ) -> ResponseScenario {
        let state = audience.current_state();
        let mut criteria_scores = BTreeMap::new();
        criteria_scores.insert(Criterion::Clarity, heuristics::clarity(&text));
        criteria_scores.insert(Criterion::Relevance, heuristics::relevance(query, &text));
        criteria_scores.insert(Criterion::EmpathyFit, empathy_fit(style, audience));
        criteria_scores.insert(
            Criterion::MisunderstandingRisk,
            1.0 - misunderstanding_risk(&text, state),
        );

        let overall_score = criteria_scores
            .iter()
            .map(|(c, s)| self.weights.get(c).copied().unwrap_or(0.0) * s)
            .sum::<f32>()
            .clamp(0.0, 1.0);

        ResponseScenario {
            style,
            audience: state,
            text,
            criteria_scores,
            overall_score,
        }
    }
}

/// Stronger emotions pull the fit further from the neutral baseline.
fn empathy_fit(style: ScenarioStyle, audience: &EmotionalContext) -> f32 {
    let baseline = style.fit(EmotionalState::Neutral);
    let target = style.fit(audience.current_state());
    let pull = 0.5 + 0.5 * audience.emotional_intensity();
    (baseline + (target - baseline) * pull).clamp(0.0, 1.0)
}

fn misunderstanding_risk(text: &str, state: EmotionalState) -> f32 {
    let jargon = (heuristics::jargon_density(text) * 4.0).min(0.7);
    let words = heuristics::word_count(text) as f32;
    let length = ((words - 250.0) / 500.0).clamp(0.0, 0.3);
    let sensitivity = match state {
        EmotionalState::Confused | EmotionalState::Frustrated => 1.5,
        _ => 1.0,
    };
    ((jargon + length) * sensitivity).clamp(0.0, 1.0)
}

fn render(style: ScenarioStyle, candidate: &str, framing: Framing) -> String {
    let candidate = candidate.trim();
    match style {
        ScenarioStyle::EmpatheticDetailed if framing == Framing::ToneApplied => {
            candidate.to_string()
        }
        ScenarioStyle::EmpatheticDetailed => format!(
            "Let's walk through this together.\n\n{candidate}\n\nIf any part is unclear, tell me which one and I'll go deeper."
        ),
        ScenarioStyle::ConciseDirect => condense(candidate),
        ScenarioStyle::TechnicalAdvanced => format!(
            "{candidate}\n\nUnder the hood: weigh the performance and correctness trade-offs of this approach, especially around concurrency and error propagation."
        ),
    }
}

/// Keep code blocks and the first two sentences of prose.
fn condense(candidate: &str) -> String {
    let mut kept: Vec<String> = Vec::new();
    let mut prose_sentences = 0usize;
    let mut fence: Option<Vec<&str>> = None;

    for line in candidate.lines() {
        let is_fence = line.trim_start().starts_with("```");
        match (&mut fence, is_fence) {
            (Some(block), true) => {
                block.push(line);
                kept.push(block.join("\n"));
                fence = None;
            }
            (Some(block), false) => block.push(line),
            (None, true) => fence = Some(vec![line]),
            (None, false) => {
                if prose_sentences >= 2 || line.trim().is_empty() {
                    continue;
                }
                let mut taken = Vec::new();
                for sentence in line.split_inclusive(['.', '!', '?']) {
                    if prose_sentences >= 2 {
                        break;
                    }
                    if !sentence.trim().is_empty() {
                        taken.push(sentence.trim());
                        prose_sentences += 1;
                    }
                }
                if !taken.is_empty() {
                    kept.push(taken.join(" "));
                }
            }
        }
    }
    if let Some(block) = fence {
        kept.push(block.join("\n"));
    }

    let condensed = kept.join("\n\n");
    if condensed.trim().is_empty() {
        candidate.to_string()
    } else {
        condensed
    }
}
