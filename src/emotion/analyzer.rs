//! Message text → [`EmotionalContext`].
//!
//! Pure and deterministic: the same text always yields the same context, and
//! no input (empty, whitespace, emoji soup) can make it fail.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::lexicon::{normalize, CompiledLexicon, Lexicon};
use super::state::{clamp_unit, EmotionalContext, EmotionalState};

/// Weight of the Negative score in `frustration_level`.
const NEGATIVE_FRUSTRATION_WEIGHT: f32 = 0.5;

/// Raw and normalized per-state scores for one message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct StateScores {
    raw: BTreeMap<EmotionalState, f32>,
    saturation: f32,
}

impl StateScores {
    /// Summed trigger weight for `state`.
    pub fn raw(&self, state: EmotionalState) -> f32 {
        self.raw.get(&state).copied().unwrap_or(0.0)
    }

    /// `raw / (raw + k)`: strictly increasing in `raw`, bounded below 1.
    pub fn normalized(&self, state: EmotionalState) -> f32 {
        saturate(self.raw(state), self.saturation)
    }
}

/// Detailed analyzer output: the context plus the per-state scores behind it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct EmotionalReading {
    pub context: EmotionalContext,
    pub scores: StateScores,
}

impl EmotionalReading {
    /// Normalized intensity of one state, whether or not it won.
    pub fn state_intensity(&self, state: EmotionalState) -> f32 {
        self.scores.normalized(state)
    }
}

/// Keyword/phrase-based emotional state detector.
#[derive(Debug, Clone)]
pub struct EmotionalAnalyzer {
    lexicon: CompiledLexicon,
    saturation: f32,
}

impl Default for EmotionalAnalyzer {
    fn default() -> Self {
        Self::new(&Lexicon::builtin(), 2.0)
    }
}

impl EmotionalAnalyzer {
    /// Build from a phrase table and the normalization constant `k`.
    pub fn new(lexicon: &Lexicon, saturation: f32) -> Self {
        Self {
            lexicon: CompiledLexicon::compile(lexicon),
            saturation: if saturation > 0.0 { saturation } else { 2.0 },
        }
    }

    /// Classify `message`. Never fails; empty input is Neutral.
    pub fn analyze(&self, message: &str) -> EmotionalContext {
        self.analyze_detailed(message).context
    }

    /// Like [`analyze`](Self::analyze), keeping the per-state scores.
    pub fn analyze_detailed(&self, message: &str) -> EmotionalReading {
        let text = normalize(message);
        if text.trim().is_empty() {
            return EmotionalReading {
                context: EmotionalContext::neutral(),
                scores: StateScores {
                    raw: BTreeMap::new(),
                    saturation: self.saturation,
                },
            };
        }

        let scores = StateScores {
            raw: self.lexicon.raw_scores(&text),
            saturation: self.saturation,
        };

        let winner = select_winner(&scores);
        let intensity = match winner {
            EmotionalState::Neutral => 0.0,
            state => scores.normalized(state),
        };

        let frustration = saturate(
            scores.raw(EmotionalState::Frustrated)
                + NEGATIVE_FRUSTRATION_WEIGHT * scores.raw(EmotionalState::Negative),
            self.saturation,
        );
        let urgency = saturate(
            scores.raw(EmotionalState::Rushed) + scores.raw(EmotionalState::Urgent),
            self.saturation,
        );
        let confidence = scores.normalized(EmotionalState::Confident);

        let context = EmotionalContext::new(
            winner,
            intensity,
            frustration,
            urgency,
            confidence,
            self.lexicon.has_learning_intent(&text),
        );

        log::trace!(
            "Emotional analysis: state={} intensity={:.2} frustration={:.2} urgency={:.2}",
            winner,
            intensity,
            frustration,
            urgency
        );

        EmotionalReading { context, scores }
    }
}

/// Highest raw score wins, searched within the distress tier first.
/// Walking [`EmotionalState::PRIORITY`] and replacing only on a strictly
/// greater score breaks ties by priority.
fn select_winner(scores: &StateScores) -> EmotionalState {
    let any_distress = EmotionalState::PRIORITY
        .iter()
        .any(|s| s.is_distress() && scores.raw(*s) > 0.0);

    let mut best = EmotionalState::Neutral;
    let mut best_raw = 0.0f32;
    for state in EmotionalState::PRIORITY {
        if state == EmotionalState::Neutral || (any_distress && !state.is_distress()) {
            continue;
        }
        let raw = scores.raw(state);
        if raw > best_raw {
            best = state;
            best_raw = raw;
        }
    }
    best
}

fn saturate(raw: f32, k: f32) -> f32 {
    if raw <= 0.0 {
        0.0
    } else {
        clamp_unit(raw / (raw + k))
    }
}
